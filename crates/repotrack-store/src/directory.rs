use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use repotrack_types::{Organization, OrganizationId, Owner, User, UserId};

use crate::error::{StoreError, StoreResult};

/// Users, organizations and memberships.
///
/// The catalog and the ownership authority resolve names and check
/// permissions through this trait; they never manage accounts themselves.
pub trait Directory: Send + Sync {
    fn user(&self, id: &UserId) -> StoreResult<Option<User>>;

    fn user_by_alias(&self, alias: &str) -> StoreResult<Option<User>>;

    fn organization(&self, id: &OrganizationId) -> StoreResult<Option<Organization>>;

    fn organization_by_name(&self, name: &str) -> StoreResult<Option<Organization>>;

    /// Whether `user` belongs to `organization`.
    fn is_member(&self, user: &UserId, organization: &OrganizationId) -> StoreResult<bool>;

    /// Whether `user` may act for `owner`: it is the user, or the user is a
    /// member of the owning organization.
    fn acts_for(&self, user: &UserId, owner: &Owner) -> StoreResult<bool> {
        match owner {
            Owner::User(id) => Ok(id == user),
            Owner::Organization(org) => self.is_member(user, org),
        }
    }
}

#[derive(Default)]
struct DirectoryInner {
    users: HashMap<UserId, User>,
    organizations: HashMap<OrganizationId, Organization>,
    members: HashSet<(OrganizationId, UserId)>,
}

/// In-memory [`Directory`] for tests and single-process deployments.
#[derive(Default)]
pub struct InMemoryDirectory {
    inner: RwLock<DirectoryInner>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_user(&self, user: User) -> StoreResult<()> {
        let mut inner = self.inner.write().map_err(|_| StoreError::LockPoisoned)?;
        inner.users.insert(user.id, user);
        Ok(())
    }

    pub fn insert_organization(&self, organization: Organization) -> StoreResult<()> {
        let mut inner = self.inner.write().map_err(|_| StoreError::LockPoisoned)?;
        inner.organizations.insert(organization.id, organization);
        Ok(())
    }

    pub fn add_member(&self, organization: OrganizationId, user: UserId) -> StoreResult<()> {
        let mut inner = self.inner.write().map_err(|_| StoreError::LockPoisoned)?;
        inner.members.insert((organization, user));
        Ok(())
    }

    pub fn remove_member(&self, organization: OrganizationId, user: UserId) -> StoreResult<bool> {
        let mut inner = self.inner.write().map_err(|_| StoreError::LockPoisoned)?;
        Ok(inner.members.remove(&(organization, user)))
    }

    fn read<T>(&self, f: impl FnOnce(&DirectoryInner) -> T) -> StoreResult<T> {
        let inner = self.inner.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(f(&inner))
    }
}

impl Directory for InMemoryDirectory {
    fn user(&self, id: &UserId) -> StoreResult<Option<User>> {
        self.read(|d| d.users.get(id).cloned())
    }

    fn user_by_alias(&self, alias: &str) -> StoreResult<Option<User>> {
        self.read(|d| d.users.values().find(|u| u.alias == alias).cloned())
    }

    fn organization(&self, id: &OrganizationId) -> StoreResult<Option<Organization>> {
        self.read(|d| d.organizations.get(id).cloned())
    }

    fn organization_by_name(&self, name: &str) -> StoreResult<Option<Organization>> {
        self.read(|d| d.organizations.values().find(|o| o.name == name).cloned())
    }

    fn is_member(&self, user: &UserId, organization: &OrganizationId) -> StoreResult<bool> {
        self.read(|d| d.members.contains(&(*organization, *user)))
    }
}
