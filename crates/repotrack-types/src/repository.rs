use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{OrganizationId, RepositoryId, UserId};
use crate::kind::RepositoryKind;

/// The single principal that owns a repository.
///
/// A repository is owned by exactly one user or exactly one organization,
/// never both and never neither.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Owner {
    User(UserId),
    Organization(OrganizationId),
}

impl Owner {
    pub fn user_id(&self) -> Option<UserId> {
        match self {
            Self::User(id) => Some(*id),
            Self::Organization(_) => None,
        }
    }

    pub fn organization_id(&self) -> Option<OrganizationId> {
        match self {
            Self::User(_) => None,
            Self::Organization(id) => Some(*id),
        }
    }
}

impl fmt::Display for Owner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User(id) => write!(f, "user:{id}"),
            Self::Organization(id) => write!(f, "org:{id}"),
        }
    }
}

/// Secret material needed to read an authenticated remote.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// A cataloged external repository.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Repository {
    pub id: RepositoryId,
    /// Globally unique slug.
    pub name: String,
    pub display_name: Option<String>,
    pub url: String,
    /// Branch to track for source-controlled kinds.
    pub branch: Option<String>,
    pub kind: RepositoryKind,
    pub owner: Owner,
    pub verified_publisher: bool,
    pub official: bool,
    pub disabled: bool,
    pub credentials: Option<Credentials>,
    /// Digest of the most recently tracked content.
    pub digest: Option<String>,
    pub last_tracking_ts: Option<DateTime<Utc>>,
    pub last_tracking_errors: Option<String>,
    /// The last cycle moved the digest but left packages unprocessed, so
    /// the next cycle must fetch even if the remote digest is unchanged.
    pub retry_pending: bool,
    pub created_at: DateTime<Utc>,
}

impl Repository {
    /// Build a fresh record from a draft: not disabled, no digest, never
    /// tracked, not verified.
    pub fn from_draft(draft: RepositoryDraft, owner: Owner) -> Self {
        Self {
            id: RepositoryId::new(),
            name: draft.name,
            display_name: draft.display_name,
            url: draft.url,
            branch: draft.branch,
            kind: draft.kind,
            owner,
            verified_publisher: false,
            official: false,
            disabled: false,
            credentials: draft.credentials,
            digest: None,
            last_tracking_ts: None,
            last_tracking_errors: None,
            retry_pending: false,
            created_at: Utc::now(),
        }
    }

    /// Merge caller-editable fields into this record. Ownership, flags and
    /// tracking state are left alone, except that a new URL drops the
    /// digest and any pending retry, which describe the old remote.
    pub fn apply_edit(&mut self, edit: &RepositoryEdit) {
        if edit.url != self.url {
            self.digest = None;
            self.retry_pending = false;
        }
        self.name = edit.name.clone();
        self.display_name = edit.display_name.clone();
        self.url = edit.url.clone();
        self.branch = edit.branch.clone();
        self.disabled = edit.disabled;
        match &edit.credentials {
            CredentialsEdit::Keep => {}
            CredentialsEdit::Set(credentials) => self.credentials = Some(credentials.clone()),
            CredentialsEdit::Clear => self.credentials = None,
        }
    }

    /// Drop the credentials unless the caller asked for them.
    pub fn with_credentials(self, include_credentials: bool) -> Self {
        if include_credentials {
            self
        } else {
            Self {
                credentials: None,
                ..self
            }
        }
    }

    /// Whether the last tracking cycle finished without errors.
    pub fn is_healthy(&self) -> bool {
        self.last_tracking_errors
            .as_deref()
            .map_or(true, str::is_empty)
    }
}

/// What to do with stored credentials when a record is edited.
///
/// Reads scrub credentials by default, so an absent value in an edited
/// record means "unchanged", never "remove".
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CredentialsEdit {
    #[default]
    Keep,
    Set(Credentials),
    Clear,
}

/// The caller-editable fields of an existing repository.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryEdit {
    pub name: String,
    pub display_name: Option<String>,
    pub url: String,
    pub branch: Option<String>,
    pub disabled: bool,
    pub credentials: CredentialsEdit,
}

impl RepositoryEdit {
    /// The edit carried by a full record. `None` credentials keep the
    /// stored ones.
    pub fn from_record(repository: &Repository) -> Self {
        Self {
            name: repository.name.clone(),
            display_name: repository.display_name.clone(),
            url: repository.url.clone(),
            branch: repository.branch.clone(),
            disabled: repository.disabled,
            credentials: match &repository.credentials {
                Some(credentials) => CredentialsEdit::Set(credentials.clone()),
                None => CredentialsEdit::Keep,
            },
        }
    }
}

/// The caller-provided fields of a new repository.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryDraft {
    pub name: String,
    pub display_name: Option<String>,
    pub url: String,
    pub branch: Option<String>,
    pub kind: RepositoryKind,
    pub credentials: Option<Credentials>,
}

impl RepositoryDraft {
    pub fn new(name: impl Into<String>, url: impl Into<String>, kind: RepositoryKind) -> Self {
        Self {
            name: name.into(),
            display_name: None,
            url: url.into(),
            branch: None,
            kind,
            credentials: None,
        }
    }

    pub fn display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = Some(display_name.into());
        self
    }

    pub fn branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = Some(branch.into());
        self
    }

    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.credentials = Some(Credentials {
            username: username.into(),
            password: password.into(),
        });
        self
    }
}
