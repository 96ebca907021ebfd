use crate::error::{DigestError, DigestResult};

/// Domain-separated BLAKE3 content hasher.
///
/// Each hasher carries a domain tag that is prepended to every hash
/// computation, so a package and a repository with identical bytes produce
/// different digests.
pub struct ContentHasher {
    domain: &'static str,
}

impl ContentHasher {
    /// Hasher for individual package content.
    pub const PACKAGE: Self = Self {
        domain: "repotrack-package-v1",
    };
    /// Hasher for whole-repository digests.
    pub const REPOSITORY: Self = Self {
        domain: "repotrack-repository-v1",
    };
    /// Hasher for index documents.
    pub const INDEX: Self = Self {
        domain: "repotrack-index-v1",
    };

    /// Create a hasher with a custom domain tag.
    pub const fn new(domain: &'static str) -> Self {
        Self { domain }
    }

    /// Start an incremental hash with the domain prefix already applied.
    pub fn start(&self) -> blake3::Hasher {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.domain.as_bytes());
        hasher.update(b":");
        hasher
    }

    /// Hash raw bytes with domain separation, returning lowercase hex.
    pub fn hash(&self, data: &[u8]) -> String {
        let mut hasher = self.start();
        hasher.update(data);
        hex::encode(hasher.finalize().as_bytes())
    }

    /// Hash a serializable value as JSON with domain separation.
    pub fn hash_json<T: serde::Serialize>(&self, value: &T) -> DigestResult<String> {
        let data =
            serde_json::to_vec(value).map_err(|e| DigestError::Serialization(e.to_string()))?;
        Ok(self.hash(&data))
    }

    /// Verify that data produces the expected digest.
    pub fn verify(&self, data: &[u8], expected: &str) -> bool {
        self.hash(data).eq_ignore_ascii_case(expected)
    }

    /// The domain tag used by this hasher.
    pub fn domain(&self) -> &str {
        self.domain
    }
}
