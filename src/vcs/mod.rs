//! Version control abstraction used by the publisher.
//!
//! Every operation names the working copy it acts on, so nothing here depends
//! on the process's current directory.

mod git;
pub mod memory;

use std::path::Path;

use crate::error::{ArchiveError, Result};

pub use git::GitCli;
pub use memory::MemoryVcs;

/// Commit identity read from the host's global version control configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub name: String,
    pub email: String,
}

impl Credentials {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Credentials {
            name: name.into(),
            email: email.into(),
        }
    }

    /// Both name and email are non-blank.
    pub fn is_complete(&self) -> bool {
        !self.name.trim().is_empty() && !self.email.trim().is_empty()
    }

    /// Read `user.name` and `user.email` from global configuration.
    ///
    /// Fails with [`ArchiveError::CredentialsMissing`] if either is unset or blank.
    pub fn from_global_config(client: &dyn VersionControlClient) -> Result<Self> {
        let name = client.global_config("user.name")?.unwrap_or_default();
        let email = client.global_config("user.email")?.unwrap_or_default();

        let credentials = Credentials::new(name.trim(), email.trim());
        if credentials.is_complete() {
            Ok(credentials)
        } else {
            Err(ArchiveError::CredentialsMissing)
        }
    }
}

/// Operations the publish state machine needs from a version control tool.
pub trait VersionControlClient: Send + Sync {
    /// Read a key from the user's global configuration. `Ok(None)` if unset.
    fn global_config(&self, key: &str) -> Result<Option<String>>;

    /// Check whether `path` is already a working copy.
    fn is_working_copy(&self, path: &Path) -> bool;

    /// Initialize an empty working copy at `path`, creating the directory if needed.
    fn init(&self, path: &Path) -> Result<()>;

    /// Clone `url` into `path`, which must be absent or empty.
    fn clone_repo(&self, url: &str, path: &Path) -> Result<()>;

    /// Set the commit identity for this working copy only.
    fn set_local_identity(&self, path: &Path, credentials: &Credentials) -> Result<()>;

    /// Stage every addition, modification, and deletion.
    fn stage_all(&self, path: &Path) -> Result<()>;

    /// Check whether the index differs from the current commit.
    fn has_staged_changes(&self, path: &Path) -> Result<bool>;

    fn commit(&self, path: &Path, message: &str) -> Result<()>;

    /// Commit even when nothing is staged.
    fn commit_empty(&self, path: &Path, message: &str) -> Result<()>;

    fn branch_exists(&self, path: &Path, branch: &str) -> Result<bool>;

    /// Switch to `branch`, creating it from the current state when `create` is set.
    fn checkout(&self, path: &Path, branch: &str, create: bool) -> Result<()>;

    fn has_remote(&self, path: &Path, name: &str) -> bool;

    fn add_remote(&self, path: &Path, name: &str, url: &str) -> Result<()>;

    /// Push `branch` to `remote`, setting upstream. Returns the tool's output.
    fn push(&self, path: &Path, remote: &str, branch: &str) -> Result<String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credentials_complete() {
        assert!(Credentials::new("Severus", "severus@example.com").is_complete());
        assert!(!Credentials::new("", "severus@example.com").is_complete());
        assert!(!Credentials::new("Severus", "   ").is_complete());
    }

    #[test]
    fn test_from_global_config_reads_identity() {
        let vcs = MemoryVcs::new().with_global_identity("Severus", "severus@example.com");
        let credentials = Credentials::from_global_config(&vcs).unwrap();
        assert_eq!(credentials, Credentials::new("Severus", "severus@example.com"));
    }

    #[test]
    fn test_from_global_config_missing_email() {
        let vcs = MemoryVcs::new().with_global_config("user.name", "Severus");
        let err = Credentials::from_global_config(&vcs).unwrap_err();
        assert!(matches!(err, ArchiveError::CredentialsMissing));
    }
}
