//! In-memory version control client for exercising the publisher without `git`.
//!
//! Working copies are real directories on disk (the publisher writes files
//! into them) but all history, branches and remotes live in memory.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use walkdir::WalkDir;

use super::{Credentials, VersionControlClient};
use crate::error::{ArchiveError, Result};

type Tree = BTreeMap<PathBuf, Vec<u8>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryCommit {
    pub message: String,
    pub tree: Tree,
    pub empty: bool,
    pub author: Option<Credentials>,
}

#[derive(Debug, Clone, Default)]
struct Repository {
    current_branch: String,
    branches: BTreeMap<String, Vec<MemoryCommit>>,
    index: Option<Tree>,
    remotes: BTreeMap<String, String>,
    identity: Option<Credentials>,
}

impl Repository {
    fn head_tree(&self) -> Tree {
        self.branches
            .get(&self.current_branch)
            .and_then(|commits| commits.last())
            .map(|c| c.tree.clone())
            .unwrap_or_default()
    }
}

#[derive(Debug, Default)]
struct State {
    global_config: HashMap<String, String>,
    repositories: HashMap<PathBuf, Repository>,
    servers: HashMap<String, BTreeMap<String, Vec<MemoryCommit>>>,
    rejected_pushes: HashSet<String>,
    operations: Vec<String>,
}

/// Fake [`VersionControlClient`] that records every call.
#[derive(Debug)]
pub struct MemoryVcs {
    default_branch: String,
    state: Mutex<State>,
}

impl Default for MemoryVcs {
    fn default() -> Self {
        MemoryVcs {
            default_branch: "master".to_string(),
            state: Mutex::new(State::default()),
        }
    }
}

impl MemoryVcs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Branch name given to freshly initialized working copies.
    pub fn with_default_branch(mut self, branch: &str) -> Self {
        self.default_branch = branch.to_string();
        self
    }

    pub fn with_global_config(self, key: &str, value: &str) -> Self {
        self.lock()
            .global_config
            .insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_global_identity(self, name: &str, email: &str) -> Self {
        self.with_global_config("user.name", name)
            .with_global_config("user.email", email)
    }

    /// Register a reachable remote repository at `url` with no branches.
    pub fn with_server(self, url: &str) -> Self {
        self.lock().servers.entry(url.to_string()).or_default();
        self
    }

    /// Register a reachable remote that already holds one commit on `branch`.
    pub fn with_server_branch(self, url: &str, branch: &str, files: &[(&str, &str)]) -> Self {
        let tree = files
            .iter()
            .map(|(path, content)| (PathBuf::from(path), content.as_bytes().to_vec()))
            .collect();
        let commit = MemoryCommit {
            message: "initial".to_string(),
            tree,
            empty: false,
            author: None,
        };
        self.lock()
            .servers
            .entry(url.to_string())
            .or_default()
            .insert(branch.to_string(), vec![commit]);
        self
    }

    /// Make every push of `branch` fail as if the remote rejected it.
    pub fn reject_push(self, branch: &str) -> Self {
        self.lock().rejected_pushes.insert(branch.to_string());
        self
    }

    /// Names of every mutating call made so far, in order.
    pub fn operations(&self) -> Vec<String> {
        self.lock().operations.clone()
    }

    pub fn is_tracked(&self, path: &Path) -> bool {
        self.lock().repositories.contains_key(&key(path))
    }

    pub fn current_branch(&self, path: &Path) -> Option<String> {
        self.lock()
            .repositories
            .get(&key(path))
            .map(|r| r.current_branch.clone())
    }

    pub fn commits(&self, path: &Path, branch: &str) -> Vec<MemoryCommit> {
        self.lock()
            .repositories
            .get(&key(path))
            .and_then(|r| r.branches.get(branch).cloned())
            .unwrap_or_default()
    }

    pub fn remote_url(&self, path: &Path, name: &str) -> Option<String> {
        self.lock()
            .repositories
            .get(&key(path))
            .and_then(|r| r.remotes.get(name).cloned())
    }

    pub fn local_identity(&self, path: &Path) -> Option<Credentials> {
        self.lock()
            .repositories
            .get(&key(path))
            .and_then(|r| r.identity.clone())
    }

    /// Commits the remote at `url` holds for `branch`.
    pub fn server_commits(&self, url: &str, branch: &str) -> Vec<MemoryCommit> {
        self.lock()
            .servers
            .get(url)
            .and_then(|branches| branches.get(branch).cloned())
            .unwrap_or_default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn with_repo<T>(
        &self,
        path: &Path,
        op: &str,
        f: impl FnOnce(&mut Repository) -> Result<T>,
    ) -> Result<T> {
        let mut state = self.lock();
        state.operations.push(format!("{op} {}", path.display()));
        let repo = state.repositories.get_mut(&key(path)).ok_or_else(|| {
            ArchiveError::publish(
                format!("{op} failed"),
                format!("fatal: not a git repository: {}", path.display()),
            )
        })?;
        f(repo)
    }
}

fn key(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}

fn snapshot(path: &Path) -> Result<Tree> {
    let mut tree = Tree::new();
    for entry in WalkDir::new(path).follow_links(false) {
        let entry = entry.map_err(|e| ArchiveError::publish("stage failed", e.to_string()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(path)
            .unwrap_or(entry.path())
            .to_path_buf();
        let bytes =
            std::fs::read(entry.path()).map_err(|e| ArchiveError::filesystem(entry.path(), e))?;
        tree.insert(relative, bytes);
    }
    Ok(tree)
}

fn write_tree(path: &Path, tree: &Tree) -> Result<()> {
    for (relative, bytes) in tree {
        let dest = path.join(relative);
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ArchiveError::filesystem(parent, e))?;
        }
        std::fs::write(&dest, bytes).map_err(|e| ArchiveError::filesystem(&dest, e))?;
    }
    Ok(())
}

impl VersionControlClient for MemoryVcs {
    fn global_config(&self, key: &str) -> Result<Option<String>> {
        Ok(self.lock().global_config.get(key).cloned())
    }

    fn is_working_copy(&self, path: &Path) -> bool {
        self.is_tracked(path)
    }

    fn init(&self, path: &Path) -> Result<()> {
        std::fs::create_dir_all(path).map_err(|e| ArchiveError::filesystem(path, e))?;
        let mut state = self.lock();
        state.operations.push(format!("init {}", path.display()));
        state.repositories.entry(key(path)).or_insert_with(|| Repository {
            current_branch: self.default_branch.clone(),
            ..Default::default()
        });
        Ok(())
    }

    fn clone_repo(&self, url: &str, path: &Path) -> Result<()> {
        let mut state = self.lock();
        state.operations.push(format!("clone {url} {}", path.display()));

        let Some(branches) = state.servers.get(url).cloned() else {
            return Err(ArchiveError::publish(
                format!("git clone {url} failed"),
                format!("fatal: repository '{url}' not found"),
            ));
        };

        let current_branch = if branches.contains_key("main") {
            "main".to_string()
        } else {
            branches
                .keys()
                .next()
                .cloned()
                .unwrap_or_else(|| self.default_branch.clone())
        };

        std::fs::create_dir_all(path).map_err(|e| ArchiveError::filesystem(path, e))?;
        if let Some(head) = branches.get(&current_branch).and_then(|c| c.last()) {
            write_tree(path, &head.tree)?;
        }

        let mut remotes = BTreeMap::new();
        remotes.insert("origin".to_string(), url.to_string());
        let local_branches = branches
            .get(&current_branch)
            .map(|commits| BTreeMap::from([(current_branch.clone(), commits.clone())]))
            .unwrap_or_default();

        state.repositories.insert(
            key(path),
            Repository {
                current_branch,
                branches: local_branches,
                index: None,
                remotes,
                identity: None,
            },
        );
        Ok(())
    }

    fn set_local_identity(&self, path: &Path, credentials: &Credentials) -> Result<()> {
        self.with_repo(path, "config", |repo| {
            repo.identity = Some(credentials.clone());
            Ok(())
        })
    }

    fn stage_all(&self, path: &Path) -> Result<()> {
        let tree = snapshot(path)?;
        self.with_repo(path, "add", |repo| {
            repo.index = Some(tree);
            Ok(())
        })
    }

    fn has_staged_changes(&self, path: &Path) -> Result<bool> {
        let state = self.lock();
        let repo = state.repositories.get(&key(path)).ok_or_else(|| {
            ArchiveError::publish("diff failed", "fatal: not a git repository")
        })?;
        Ok(repo
            .index
            .as_ref()
            .is_some_and(|index| *index != repo.head_tree()))
    }

    fn commit(&self, path: &Path, message: &str) -> Result<()> {
        self.with_repo(path, "commit", |repo| {
            let head = repo.head_tree();
            let index = repo.index.clone().unwrap_or_else(|| head.clone());
            if index == head {
                return Err(ArchiveError::publish(
                    "git commit failed",
                    "nothing to commit, working tree clean",
                ));
            }
            let commit = MemoryCommit {
                message: message.to_string(),
                tree: index,
                empty: false,
                author: repo.identity.clone(),
            };
            let branch = repo.current_branch.clone();
            repo.branches.entry(branch).or_default().push(commit);
            Ok(())
        })
    }

    fn commit_empty(&self, path: &Path, message: &str) -> Result<()> {
        self.with_repo(path, "commit --allow-empty", |repo| {
            let commit = MemoryCommit {
                message: message.to_string(),
                tree: repo.index.clone().unwrap_or_else(|| repo.head_tree()),
                empty: true,
                author: repo.identity.clone(),
            };
            let branch = repo.current_branch.clone();
            repo.branches.entry(branch).or_default().push(commit);
            Ok(())
        })
    }

    fn branch_exists(&self, path: &Path, branch: &str) -> Result<bool> {
        let state = self.lock();
        Ok(state
            .repositories
            .get(&key(path))
            .is_some_and(|r| r.branches.contains_key(branch)))
    }

    fn checkout(&self, path: &Path, branch: &str, create: bool) -> Result<()> {
        self.with_repo(path, "checkout", |repo| {
            let exists = repo.branches.contains_key(branch);
            if create {
                if exists {
                    return Err(ArchiveError::publish(
                        "git checkout failed",
                        format!("fatal: a branch named '{branch}' already exists"),
                    ));
                }
                if let Some(commits) = repo.branches.get(&repo.current_branch).cloned() {
                    repo.branches.insert(branch.to_string(), commits);
                }
            } else if !exists {
                return Err(ArchiveError::publish(
                    "git checkout failed",
                    format!("error: pathspec '{branch}' did not match any file(s) known to git"),
                ));
            }
            repo.current_branch = branch.to_string();
            Ok(())
        })
    }

    fn has_remote(&self, path: &Path, name: &str) -> bool {
        self.remote_url(path, name).is_some()
    }

    fn add_remote(&self, path: &Path, name: &str, url: &str) -> Result<()> {
        self.with_repo(path, "remote add", |repo| {
            if repo.remotes.contains_key(name) {
                return Err(ArchiveError::publish(
                    "git remote add failed",
                    format!("error: remote {name} already exists."),
                ));
            }
            repo.remotes.insert(name.to_string(), url.to_string());
            Ok(())
        })
    }

    fn push(&self, path: &Path, remote: &str, branch: &str) -> Result<String> {
        let mut state = self.lock();
        state
            .operations
            .push(format!("push {remote} {branch} {}", path.display()));

        let rejected = state.rejected_pushes.contains(branch);
        let repo = state
            .repositories
            .get(&key(path))
            .ok_or_else(|| ArchiveError::publish("push failed", "fatal: not a git repository"))?;
        let url = repo.remotes.get(remote).cloned().ok_or_else(|| {
            ArchiveError::publish(
                "push failed",
                format!("fatal: '{remote}' does not appear to be a git repository"),
            )
        })?;
        let commits = repo.branches.get(branch).cloned().ok_or_else(|| {
            ArchiveError::publish(
                "push failed",
                format!("error: src refspec {branch} does not match any"),
            )
        })?;

        if rejected {
            return Err(ArchiveError::publish(
                format!("Failed to push '{branch}' to remote '{remote}'"),
                format!("! [remote rejected] {branch} -> {branch} (pre-receive hook declined)"),
            ));
        }

        let Some(server) = state.servers.get_mut(&url) else {
            return Err(ArchiveError::publish(
                format!("Failed to push '{branch}' to remote '{remote}'"),
                format!("fatal: repository '{url}' not found"),
            ));
        };
        server.insert(branch.to_string(), commits);
        Ok(format!("branch '{branch}' set up to track '{remote}/{branch}'."))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_commit_requires_staged_changes() {
        let temp = TempDir::new().unwrap();
        let vcs = MemoryVcs::new();
        vcs.init(temp.path()).unwrap();
        std::fs::write(temp.path().join("a.txt"), "a").unwrap();

        vcs.stage_all(temp.path()).unwrap();
        assert!(vcs.has_staged_changes(temp.path()).unwrap());
        vcs.commit(temp.path(), "first").unwrap();

        vcs.stage_all(temp.path()).unwrap();
        assert!(!vcs.has_staged_changes(temp.path()).unwrap());
        assert!(vcs.commit(temp.path(), "second").is_err());
        vcs.commit_empty(temp.path(), "second").unwrap();

        assert_eq!(vcs.commits(temp.path(), "master").len(), 2);
    }

    #[test]
    fn test_clone_copies_server_files() {
        let temp = TempDir::new().unwrap();
        let url = "https://example.com/workshop.git";
        let vcs = MemoryVcs::new().with_server_branch(url, "main", &[("docs/old.md", "old")]);

        let clone = temp.path().join("clone");
        vcs.clone_repo(url, &clone).unwrap();

        assert_eq!(std::fs::read_to_string(clone.join("docs/old.md")).unwrap(), "old");
        assert_eq!(vcs.current_branch(&clone).as_deref(), Some("main"));
        assert_eq!(vcs.remote_url(&clone, "origin").as_deref(), Some(url));
    }

    #[test]
    fn test_push_unborn_branch_fails() {
        let temp = TempDir::new().unwrap();
        let url = "https://example.com/workshop.git";
        let vcs = MemoryVcs::new().with_server(url);
        vcs.init(temp.path()).unwrap();
        vcs.add_remote(temp.path(), "origin", url).unwrap();

        let err = vcs.push(temp.path(), "origin", "main").unwrap_err();
        assert!(err.to_string().contains("src refspec main"));
    }
}
