//! # workshop-archive
//!
//! Collects the sources and documents of a workshop tree into an archive
//! directory and optionally publishes that archive to a git remote.
//!
//! ## Pipeline
//!
//! 1. [`scanner`] walks the root and applies the [`filter`] rules
//!    (extension allow-list, `.git` and `build` directories never included).
//! 2. [`archive`] recreates the destination and copies every matched file
//!    under the same relative path.
//! 3. [`publish`] commits the archive into a working copy and pushes it,
//!    through the [`vcs::VersionControlClient`] trait.
//!
//! [`pipeline::run`] ties the three together for the command-line tool.

/// Copying a manifest into a freshly recreated destination directory.
pub mod archive;

/// Configuration directory management and the persisted `config.toml` defaults.
pub mod config;

/// Error types shared by the scan, archive and publish stages.
pub mod error;

/// Extension allow-lists and the reserved directory exclusion rules.
pub mod filter;

/// Console and file logging setup.
pub mod logger;

/// The end-to-end run used by the binary.
pub mod pipeline;

/// Publish state machine: working copy preparation, commit, and push.
pub mod publish;

/// Scan statistics and console summaries.
pub mod report;

/// Recursive directory traversal producing the archive manifest.
pub mod scanner;

/// Version control client trait with a git CLI backend and an in-memory fake.
pub mod vcs;

pub use error::{ArchiveError, Result};

/// Verbosity level for console output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VerbosityLevel {
    /// Errors only
    Quiet,
    /// Standard output
    #[default]
    Normal,
    /// Debug output including every git command
    Verbose,
}
