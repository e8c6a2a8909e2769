//! Publishing an archive directory to a remote repository.
//!
//! The publisher never changes the process's current directory: every
//! version control call receives the working copy path explicitly.

use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use crate::error::{ArchiveError, Result};
use crate::vcs::{Credentials, VersionControlClient};

pub const REMOTE_NAME: &str = "origin";

/// Branches tried in order when no target branch is given.
pub const FALLBACK_BRANCHES: &[&str] = &["main", "master"];

/// Where to publish an archive.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishTarget {
    pub repository_url: String,
    /// Folder inside the remote repository. `None` publishes the archive root itself.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
}

impl PublishTarget {
    pub fn new(repository_url: impl Into<String>) -> Self {
        PublishTarget {
            repository_url: repository_url.into(),
            folder: None,
            branch: None,
        }
    }

    pub fn with_folder(mut self, folder: impl Into<String>) -> Self {
        self.folder = Some(folder.into());
        self
    }

    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = Some(branch.into());
        self
    }

    fn folder(&self) -> Option<&str> {
        non_blank(self.folder.as_deref())
    }

    fn branch(&self) -> Option<&str> {
        non_blank(self.branch.as_deref())
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|s| !s.is_empty())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CommitKind {
    Changes,
    /// Nothing differed from the previous commit.
    Empty,
}

/// Result of one publish call.
#[derive(Debug, Clone, Serialize)]
pub struct PublishReport {
    pub working_copy: PathBuf,
    pub commit_message: String,
    pub commit_kind: CommitKind,
    /// Branch that reached the remote, or `None` if every push attempt failed.
    pub pushed_branch: Option<String>,
    /// Output of the last failed push attempt.
    pub push_output: Option<String>,
}

impl PublishReport {
    pub fn pushed(&self) -> bool {
        self.pushed_branch.is_some()
    }
}

/// Drives the publish state machine over a [`VersionControlClient`].
pub struct Publisher<'a> {
    client: &'a dyn VersionControlClient,
    workspace_root: Option<PathBuf>,
}

impl<'a> Publisher<'a> {
    pub fn new(client: &'a dyn VersionControlClient) -> Self {
        Publisher {
            client,
            workspace_root: None,
        }
    }

    /// Create temporary clone workspaces under `dir` instead of the system temp directory.
    pub fn with_workspace_root(mut self, dir: impl Into<PathBuf>) -> Self {
        self.workspace_root = Some(dir.into());
        self
    }

    /// Commit the archive and push it to `target`.
    ///
    /// Fails with [`ArchiveError::CredentialsMissing`] before touching anything
    /// if `credentials` is incomplete. A rejected push is not an error: the
    /// local commit is kept and the push output is returned in the report.
    pub fn publish(
        &self,
        archive_root: &Path,
        target: &PublishTarget,
        credentials: &Credentials,
    ) -> Result<PublishReport> {
        if !credentials.is_complete() {
            return Err(ArchiveError::CredentialsMissing);
        }
        if !archive_root.is_dir() {
            return Err(ArchiveError::NotFound {
                path: archive_root.to_path_buf(),
            });
        }
        let archive_root = std::path::absolute(archive_root)
            .map_err(|e| ArchiveError::filesystem(archive_root, e))?;

        log::info!(
            "Publishing {} to {}",
            archive_root.display(),
            target.repository_url
        );
        log::info!("Using credentials: {} <{}>", credentials.name, credentials.email);

        // Stage 1: working copy
        let working_copy = match target.folder() {
            None => self.prepare_in_place(&archive_root)?,
            Some(folder) => self.prepare_clone(&archive_root, &target.repository_url, folder)?,
        };

        // Stage 2: identity, scoped to this working copy
        self.client.set_local_identity(&working_copy, credentials)?;

        // Stage 3: stage everything, then pick the branch so staged changes carry over
        log::info!("Adding files to git...");
        self.client.stage_all(&working_copy)?;

        if let Some(branch) = target.branch() {
            let exists = self.client.branch_exists(&working_copy, branch)?;
            log::info!(
                "{} branch '{branch}'",
                if exists { "Switching to" } else { "Creating" }
            );
            self.client.checkout(&working_copy, branch, !exists)?;
        }

        // Stage 4: commit, falling back to an empty commit
        let mut commit_message = commit_message();
        let commit_kind = if self.client.has_staged_changes(&working_copy)? {
            self.client.commit(&working_copy, &commit_message)?;
            CommitKind::Changes
        } else {
            log::info!("No changes since last publish, creating an empty commit");
            commit_message.push_str(" (empty)");
            self.client.commit_empty(&working_copy, &commit_message)?;
            CommitKind::Empty
        };

        // Stage 5: remote
        if !self.client.has_remote(&working_copy, REMOTE_NAME) {
            log::info!("Adding remote '{REMOTE_NAME}' -> {}", target.repository_url);
            self.client
                .add_remote(&working_copy, REMOTE_NAME, &target.repository_url)?;
        }

        // Stage 6: push
        let (pushed_branch, push_output) = self.push(&working_copy, target.branch());

        match &pushed_branch {
            Some(branch) => log::info!("Pushed '{branch}' to {}", target.repository_url),
            None => log::warn!(
                "Push to {} failed; the commit is kept locally in {}",
                target.repository_url,
                working_copy.display()
            ),
        }

        Ok(PublishReport {
            working_copy,
            commit_message,
            commit_kind,
            pushed_branch,
            push_output,
        })
    }

    fn prepare_in_place(&self, archive_root: &Path) -> Result<PathBuf> {
        if !self.client.is_working_copy(archive_root) {
            log::info!("Initializing git repository in {}", archive_root.display());
            self.client.init(archive_root)?;
        }
        Ok(archive_root.to_path_buf())
    }

    fn prepare_clone(&self, archive_root: &Path, url: &str, folder: &str) -> Result<PathBuf> {
        let working_copy = self.create_workspace()?;

        log::info!("Cloning {url} into {}", working_copy.display());
        if let Err(e) = self.client.clone_repo(url, &working_copy) {
            log::info!("Repository could not be cloned, creating a new one ({e})");
            self.client.init(&working_copy)?;
        }

        let target_dir = working_copy.join(folder);
        fs::create_dir_all(&target_dir).map_err(|e| ArchiveError::filesystem(&target_dir, e))?;

        log::info!("Copying archive into {folder}/");
        copy_archive_contents(archive_root, &target_dir, folder);

        Ok(working_copy)
    }

    fn create_workspace(&self) -> Result<PathBuf> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("workshop-publish-");

        let dir = match &self.workspace_root {
            Some(root) => {
                fs::create_dir_all(root).map_err(|e| ArchiveError::filesystem(root, e))?;
                builder.tempdir_in(root)
            }
            None => builder.tempdir(),
        }
        .map_err(|e| ArchiveError::filesystem(std::env::temp_dir(), e))?;

        // The workspace outlives this call so a failed push never loses the commit.
        Ok(dir.keep())
    }

    fn push(&self, working_copy: &Path, branch: Option<&str>) -> (Option<String>, Option<String>) {
        let candidates: Vec<&str> = match branch {
            Some(branch) => vec![branch],
            None => FALLBACK_BRANCHES.to_vec(),
        };

        let mut last_output = None;
        for candidate in candidates {
            log::info!("Pushing '{candidate}' to {REMOTE_NAME}...");
            match self.client.push(working_copy, REMOTE_NAME, candidate) {
                Ok(_) => return (Some(candidate.to_string()), None),
                Err(e) => {
                    log::debug!("Push of '{candidate}' failed: {e}");
                    last_output = Some(e.to_string());
                }
            }
        }

        (None, last_output)
    }
}

/// Generated commit message with the local timestamp.
pub fn commit_message() -> String {
    format!(
        "Workshop archive - {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    )
}

/// Copy each top-level archive entry into `target_dir`, overwriting existing files.
///
/// An entry named like the target folder is skipped so repeated publishes do
/// not nest the folder inside itself. Per-entry failures are logged and skipped.
fn copy_archive_contents(archive_root: &Path, target_dir: &Path, folder: &str) {
    let folder_name = Path::new(folder).file_name();

    let entries = match fs::read_dir(archive_root) {
        Ok(entries) => entries,
        Err(e) => {
            log::warn!("Could not read archive {}: {}", archive_root.display(), e);
            return;
        }
    };

    for entry in entries.flatten() {
        let name = entry.file_name();
        if Some(name.as_os_str()) == folder_name || name == OsStr::new(".git") {
            log::debug!("Skipping {}", entry.path().display());
            continue;
        }

        let dest = target_dir.join(&name);
        if let Err(e) = copy_recursive(&entry.path(), &dest) {
            log::warn!("Could not copy {}: {}", entry.path().display(), e);
        }
    }
}

fn copy_recursive(source: &Path, dest: &Path) -> std::io::Result<()> {
    if !source.is_dir() {
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(source, dest)?;
        return Ok(());
    }

    for entry in WalkDir::new(source).follow_links(false) {
        let entry = entry.map_err(std::io::Error::other)?;
        let relative = entry.path().strip_prefix(source).unwrap_or(entry.path());
        let target = dest.join(relative);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)?;
        } else if entry.file_type().is_file() {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}
