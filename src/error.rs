//! Error taxonomy for the scan, archive and publish pipeline.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ArchiveError {
    /// The scan root was missing, or not a directory, when the scanner was created.
    #[error("Root directory not found: {}", path.display())]
    NotFound { path: PathBuf },

    /// The destination tree (or a working copy directory) could not be prepared.
    #[error("Filesystem error at '{}': {source}", path.display())]
    Filesystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(
        "Git credentials not found. Please configure:\n  \
         git config --global user.name \"Your Name\"\n  \
         git config --global user.email \"your.email@example.com\""
    )]
    CredentialsMissing,

    /// An unrecoverable step of the publish state machine failed.
    #[error("Failed to publish archive: {message}{}", format_output(output))]
    Publish { message: String, output: String },

    #[error("Invalid configuration: {0}")]
    Config(String),
}

fn format_output(output: &str) -> String {
    let trimmed = output.trim();
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("\n{trimmed}")
    }
}

impl ArchiveError {
    pub(crate) fn filesystem(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ArchiveError::Filesystem {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn publish(message: impl Into<String>, output: impl Into<String>) -> Self {
        ArchiveError::Publish {
            message: message.into(),
            output: output.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ArchiveError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_error_includes_command_output() {
        let err = ArchiveError::publish("git commit failed", "fatal: not a git repository\n");
        let msg = err.to_string();
        assert!(msg.contains("git commit failed"));
        assert!(msg.contains("fatal: not a git repository"));
    }

    #[test]
    fn test_publish_error_without_output() {
        let err = ArchiveError::publish("git init failed", "  ");
        assert_eq!(err.to_string(), "Failed to publish archive: git init failed");
    }

    #[test]
    fn test_not_found_mentions_path() {
        let err = ArchiveError::NotFound {
            path: PathBuf::from("/no/such/dir"),
        };
        assert!(err.to_string().contains("/no/such/dir"));
    }
}
