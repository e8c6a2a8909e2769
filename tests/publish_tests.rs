//! Publish state machine tests against the in-memory client.

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use workshop_archive::publish::{CommitKind, PublishTarget, Publisher};
use workshop_archive::vcs::{Credentials, MemoryVcs};
use workshop_archive::ArchiveError;

const URL: &str = "https://example.com/hogwarts/potions.git";

fn credentials() -> Credentials {
    Credentials::new("Severus Snape", "snape@hogwarts.example")
}

fn create_archive() -> TempDir {
    let temp = TempDir::new().unwrap();
    fs::create_dir_all(temp.path().join("src")).unwrap();
    fs::write(temp.path().join("src/a.cpp"), "int a;").unwrap();
    fs::write(temp.path().join("notes.md"), "# notes").unwrap();
    temp
}

fn tree_paths(vcs: &MemoryVcs, url: &str, branch: &str) -> Vec<PathBuf> {
    vcs.server_commits(url, branch)
        .last()
        .map(|c| c.tree.keys().cloned().collect())
        .unwrap_or_default()
}

#[test]
fn test_in_place_publish_without_branch_falls_back_to_master() {
    let archive = create_archive();
    let vcs = MemoryVcs::new().with_server(URL);

    let report = Publisher::new(&vcs)
        .publish(archive.path(), &PublishTarget::new(URL), &credentials())
        .unwrap();

    assert_eq!(report.commit_kind, CommitKind::Changes);
    assert_eq!(report.pushed_branch.as_deref(), Some("master"));
    assert_eq!(vcs.remote_url(archive.path(), "origin").as_deref(), Some(URL));
    assert_eq!(vcs.commits(archive.path(), "master").len(), 1);
    assert_eq!(vcs.server_commits(URL, "master").len(), 1);
}

#[test]
fn test_in_place_publish_prefers_main() {
    let archive = create_archive();
    let vcs = MemoryVcs::new().with_default_branch("main").with_server(URL);

    let report = Publisher::new(&vcs)
        .publish(archive.path(), &PublishTarget::new(URL), &credentials())
        .unwrap();

    assert_eq!(report.pushed_branch.as_deref(), Some("main"));
    assert!(vcs.server_commits(URL, "master").is_empty());
    assert_eq!(
        tree_paths(&vcs, URL, "main"),
        vec![PathBuf::from("notes.md"), PathBuf::from("src/a.cpp")]
    );
}

#[test]
fn test_unchanged_archive_creates_empty_commit() {
    let archive = create_archive();
    let vcs = MemoryVcs::new().with_default_branch("main").with_server(URL);
    let publisher = Publisher::new(&vcs);
    let target = PublishTarget::new(URL);

    publisher.publish(archive.path(), &target, &credentials()).unwrap();
    let second = publisher.publish(archive.path(), &target, &credentials()).unwrap();

    assert_eq!(second.commit_kind, CommitKind::Empty);
    assert!(second.commit_message.ends_with("(empty)"));
    let commits = vcs.server_commits(URL, "main");
    assert_eq!(commits.len(), 2);
    assert!(commits[1].empty);
}

#[test]
fn test_target_branch_is_created_and_pushed() {
    let archive = create_archive();
    let vcs = MemoryVcs::new().with_server(URL);
    let target = PublishTarget::new(URL).with_branch("workshop-14");

    let report = Publisher::new(&vcs)
        .publish(archive.path(), &target, &credentials())
        .unwrap();

    assert_eq!(report.pushed_branch.as_deref(), Some("workshop-14"));
    assert_eq!(vcs.current_branch(archive.path()).as_deref(), Some("workshop-14"));
    // Staged changes carried across the branch switch into the commit.
    assert_eq!(
        tree_paths(&vcs, URL, "workshop-14"),
        vec![PathBuf::from("notes.md"), PathBuf::from("src/a.cpp")]
    );
}

#[test]
fn test_existing_target_branch_is_switched_to() {
    let archive = create_archive();
    let vcs = MemoryVcs::new().with_server(URL);
    let publisher = Publisher::new(&vcs);
    let target = PublishTarget::new(URL).with_branch("archive");

    publisher.publish(archive.path(), &target, &credentials()).unwrap();
    fs::write(archive.path().join("notes.md"), "# updated").unwrap();
    let report = publisher.publish(archive.path(), &target, &credentials()).unwrap();

    assert_eq!(report.commit_kind, CommitKind::Changes);
    assert_eq!(vcs.server_commits(URL, "archive").len(), 2);
}

#[test]
fn test_folder_publish_clones_and_nests_archive() {
    let archive = create_archive();
    let workspaces = TempDir::new().unwrap();
    let vcs = MemoryVcs::new().with_server_branch(URL, "main", &[("docs/old.md", "old")]);
    let target = PublishTarget::new(URL).with_folder("potions");

    let report = Publisher::new(&vcs)
        .with_workspace_root(workspaces.path())
        .publish(archive.path(), &target, &credentials())
        .unwrap();

    assert!(report.working_copy.starts_with(workspaces.path()));
    assert!(report.working_copy.join("potions/src/a.cpp").exists());
    assert_eq!(report.pushed_branch.as_deref(), Some("main"));
    assert_eq!(
        tree_paths(&vcs, URL, "main"),
        vec![
            PathBuf::from("docs/old.md"),
            PathBuf::from("potions/notes.md"),
            PathBuf::from("potions/src/a.cpp"),
        ]
    );
    // The archive itself is not turned into a working copy.
    assert!(!vcs.is_tracked(archive.path()));
}

#[test]
fn test_folder_publish_skips_entry_named_like_folder() {
    let archive = create_archive();
    fs::create_dir_all(archive.path().join("potions")).unwrap();
    fs::write(archive.path().join("potions/nested.md"), "nested").unwrap();
    let workspaces = TempDir::new().unwrap();
    let vcs = MemoryVcs::new().with_server_branch(URL, "main", &[]);

    let report = Publisher::new(&vcs)
        .with_workspace_root(workspaces.path())
        .publish(
            archive.path(),
            &PublishTarget::new(URL).with_folder("potions"),
            &credentials(),
        )
        .unwrap();

    assert!(!report.working_copy.join("potions/potions").exists());
    assert!(report.working_copy.join("potions/notes.md").exists());
}

#[test]
fn test_failed_clone_falls_back_to_init_and_registers_origin() {
    let archive = create_archive();
    let workspaces = TempDir::new().unwrap();
    let vcs = MemoryVcs::new();

    let report = Publisher::new(&vcs)
        .with_workspace_root(workspaces.path())
        .publish(
            archive.path(),
            &PublishTarget::new(URL).with_folder("potions"),
            &credentials(),
        )
        .unwrap();

    assert!(vcs.is_tracked(&report.working_copy));
    assert_eq!(vcs.remote_url(&report.working_copy, "origin").as_deref(), Some(URL));
    assert_eq!(vcs.commits(&report.working_copy, "master").len(), 1);
    // Nothing is listening at URL, so the push is reported rather than raised.
    assert!(!report.pushed());
    assert!(report.push_output.is_some());
}

#[test]
fn test_rejected_push_keeps_local_commit() {
    let archive = create_archive();
    let vcs = MemoryVcs::new().with_server(URL).reject_push("release");

    let report = Publisher::new(&vcs)
        .publish(
            archive.path(),
            &PublishTarget::new(URL).with_branch("release"),
            &credentials(),
        )
        .unwrap();

    assert!(!report.pushed());
    assert!(report.push_output.as_deref().unwrap().contains("rejected"));
    assert_eq!(vcs.commits(archive.path(), "release").len(), 1);
    assert!(vcs.server_commits(URL, "release").is_empty());
}

#[test]
fn test_identity_is_set_on_working_copy() {
    let archive = create_archive();
    let vcs = MemoryVcs::new().with_server(URL);

    Publisher::new(&vcs)
        .publish(archive.path(), &PublishTarget::new(URL), &credentials())
        .unwrap();

    assert_eq!(vcs.local_identity(archive.path()), Some(credentials()));
    let commit = vcs.commits(archive.path(), "master").pop().unwrap();
    assert_eq!(commit.author, Some(credentials()));
}

#[test]
fn test_missing_credentials_fail_before_any_change() {
    let archive = create_archive();
    let vcs = MemoryVcs::new().with_server(URL);

    let err = Publisher::new(&vcs)
        .publish(
            archive.path(),
            &PublishTarget::new(URL),
            &Credentials::new("Severus Snape", ""),
        )
        .unwrap_err();

    assert!(matches!(err, ArchiveError::CredentialsMissing));
    assert!(vcs.operations().is_empty());
    assert!(!vcs.is_tracked(archive.path()));
}

#[test]
fn test_missing_archive_is_not_found() {
    let temp = TempDir::new().unwrap();
    let vcs = MemoryVcs::new();

    let err = Publisher::new(&vcs)
        .publish(
            &temp.path().join("missing"),
            &PublishTarget::new(URL),
            &credentials(),
        )
        .unwrap_err();

    assert!(matches!(err, ArchiveError::NotFound { .. }));
}

#[test]
fn test_current_directory_is_untouched() {
    let before = std::env::current_dir().unwrap();
    let archive = create_archive();
    let workspaces = TempDir::new().unwrap();
    let vcs = MemoryVcs::new().with_server(URL);
    let publisher = Publisher::new(&vcs).with_workspace_root(workspaces.path());

    publisher
        .publish(
            archive.path(),
            &PublishTarget::new(URL).with_folder("potions"),
            &credentials(),
        )
        .unwrap();
    assert_eq!(std::env::current_dir().unwrap(), before);

    let _ = publisher.publish(
        Path::new("definitely/not/here"),
        &PublishTarget::new(URL),
        &credentials(),
    );
    assert_eq!(std::env::current_dir().unwrap(), before);
}
