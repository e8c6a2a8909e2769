//! Git backend using CLI commands.

use std::io::Read;
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::sync::mpsc::{self, Receiver};
use std::thread;
use std::time::{Duration, Instant};

use super::{Credentials, VersionControlClient};
use crate::error::{ArchiveError, Result};

/// Default bound on a single git invocation.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// How long to wait for buffered stderr once a timed-out command is killed.
const KILL_GRACE: Duration = Duration::from_millis(200);

/// Captured result of one git invocation.
#[derive(Debug)]
struct GitOutput {
    success: bool,
    stdout: String,
    stderr: String,
}

impl GitOutput {
    fn combined(&self) -> String {
        match (self.stdout.trim().is_empty(), self.stderr.trim().is_empty()) {
            (false, false) => format!("{}\n{}", self.stdout.trim_end(), self.stderr.trim_end()),
            (false, true) => self.stdout.trim_end().to_string(),
            _ => self.stderr.trim_end().to_string(),
        }
    }
}

/// Git client that shells out to the `git` executable.
///
/// Success is decided by exit status only. Each command is killed and
/// reported as a publish error once it exceeds the configured timeout.
#[derive(Debug, Clone)]
pub struct GitCli {
    program: String,
    timeout: Duration,
}

impl Default for GitCli {
    fn default() -> Self {
        GitCli {
            program: "git".to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl GitCli {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Use another executable in place of `git` on the PATH.
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Check whether the git executable can be run at all.
    pub fn is_available(&self) -> bool {
        Command::new(&self.program)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    }

    fn run(&self, workdir: Option<&Path>, args: &[&str]) -> Result<GitOutput> {
        let mut command = Command::new(&self.program);
        command
            .args(args)
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = workdir {
            command.current_dir(dir);
        }

        log::debug!("Running: git {}", args.join(" "));

        let child = command
            .spawn()
            .map_err(|e| ArchiveError::publish(format!("Failed to run 'git {}'", args.join(" ")), e.to_string()))?;

        self.wait_bounded(child, args)
    }

    fn wait_bounded(&self, mut child: Child, args: &[&str]) -> Result<GitOutput> {
        let stdout = child.stdout.take().map(spawn_reader);
        let stderr = child.stderr.take().map(spawn_reader);

        let deadline = Instant::now() + self.timeout;
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) if Instant::now() >= deadline => {
                    let _ = child.kill();
                    let _ = child.wait();
                    // Processes git spawned may still hold the pipes open.
                    let partial = collect_reader(stderr, Instant::now() + KILL_GRACE);
                    return Err(ArchiveError::publish(
                        format!(
                            "'git {}' timed out after {}s",
                            args.join(" "),
                            self.timeout.as_secs()
                        ),
                        partial,
                    ));
                }
                Ok(None) => thread::sleep(POLL_INTERVAL),
                Err(e) => {
                    return Err(ArchiveError::publish(
                        format!("Failed to wait for 'git {}'", args.join(" ")),
                        e.to_string(),
                    ))
                }
            }
        };

        let drain_deadline = deadline.max(Instant::now() + KILL_GRACE);
        Ok(GitOutput {
            success: status.success(),
            stdout: collect_reader(stdout, drain_deadline),
            stderr: collect_reader(stderr, drain_deadline),
        })
    }

    /// Run a git command and fail with a publish error on non-zero exit.
    fn run_checked(&self, workdir: &Path, args: &[&str]) -> Result<GitOutput> {
        let output = self.run(Some(workdir), args)?;
        if !output.success {
            return Err(ArchiveError::publish(
                format!("git {} failed", args.join(" ")),
                output.combined(),
            ));
        }
        Ok(output)
    }

    fn git_succeeds(&self, workdir: &Path, args: &[&str]) -> bool {
        self.run(Some(workdir), args)
            .map(|o| o.success)
            .unwrap_or(false)
    }
}

/// Drain `pipe` on a detached thread; the text arrives once the pipe closes.
fn spawn_reader<R: Read + Send + 'static>(mut pipe: R) -> Receiver<String> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        let _ = tx.send(String::from_utf8_lossy(&buf).into_owned());
    });
    rx
}

/// Output of a reader, or empty if its pipe is still open at `deadline`.
fn collect_reader(reader: Option<Receiver<String>>, deadline: Instant) -> String {
    reader
        .and_then(|rx| {
            rx.recv_timeout(deadline.saturating_duration_since(Instant::now()))
                .ok()
        })
        .unwrap_or_default()
}

impl VersionControlClient for GitCli {
    fn global_config(&self, key: &str) -> Result<Option<String>> {
        let output = self.run(None, &["config", "--global", "--get", key])?;
        if !output.success {
            // Exit status 1 means the key is unset.
            return Ok(None);
        }
        let value = output.stdout.trim().to_string();
        Ok((!value.is_empty()).then_some(value))
    }

    fn is_working_copy(&self, path: &Path) -> bool {
        path.join(".git").exists()
    }

    fn init(&self, path: &Path) -> Result<()> {
        std::fs::create_dir_all(path).map_err(|e| ArchiveError::filesystem(path, e))?;
        self.run_checked(path, &["init"])?;
        Ok(())
    }

    fn clone_repo(&self, url: &str, path: &Path) -> Result<()> {
        let target = path.to_string_lossy();
        let output = self.run(None, &["clone", url, &target])?;
        if !output.success {
            return Err(ArchiveError::publish(
                format!("git clone {url} failed"),
                output.combined(),
            ));
        }
        Ok(())
    }

    fn set_local_identity(&self, path: &Path, credentials: &Credentials) -> Result<()> {
        self.run_checked(path, &["config", "--local", "user.name", &credentials.name])?;
        self.run_checked(path, &["config", "--local", "user.email", &credentials.email])?;
        Ok(())
    }

    fn stage_all(&self, path: &Path) -> Result<()> {
        self.run_checked(path, &["add", "-A"])?;
        Ok(())
    }

    fn has_staged_changes(&self, path: &Path) -> Result<bool> {
        // --quiet exits 1 when there are differences.
        let output = self.run(Some(path), &["diff", "--cached", "--quiet"])?;
        Ok(!output.success)
    }

    fn commit(&self, path: &Path, message: &str) -> Result<()> {
        self.run_checked(path, &["commit", "-m", message])?;
        Ok(())
    }

    fn commit_empty(&self, path: &Path, message: &str) -> Result<()> {
        self.run_checked(path, &["commit", "--allow-empty", "-m", message])?;
        Ok(())
    }

    fn branch_exists(&self, path: &Path, branch: &str) -> Result<bool> {
        let output = self.run_checked(path, &["branch", "--list", branch])?;
        Ok(!output.stdout.trim().is_empty())
    }

    fn checkout(&self, path: &Path, branch: &str, create: bool) -> Result<()> {
        if create {
            self.run_checked(path, &["checkout", "-b", branch])?;
        } else {
            self.run_checked(path, &["checkout", branch])?;
        }
        Ok(())
    }

    fn has_remote(&self, path: &Path, name: &str) -> bool {
        self.git_succeeds(path, &["remote", "get-url", name])
    }

    fn add_remote(&self, path: &Path, name: &str, url: &str) -> Result<()> {
        self.run_checked(path, &["remote", "add", name, url])?;
        Ok(())
    }

    fn push(&self, path: &Path, remote: &str, branch: &str) -> Result<String> {
        let output = self.run(Some(path), &["push", "-u", remote, branch])?;
        if !output.success {
            return Err(ArchiveError::publish(
                format!("Failed to push '{branch}' to remote '{remote}'"),
                output.combined(),
            ));
        }
        Ok(output.combined())
    }
}
