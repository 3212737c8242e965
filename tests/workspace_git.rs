//! Workspace tests against real git repositories in temp directories.

use std::path::Path;
use std::process::Command;

use autograft::domain::models::EditOperation;
use autograft::domain::ports::SourceControl;
use autograft::infrastructure::git::Workspace;

fn git(dir: &Path, args: &[&str]) {
    let status = Command::new("git")
        .args(args)
        .current_dir(dir)
        .status()
        .expect("git not available");
    assert!(status.success(), "git {args:?} failed");
}

/// A local repository on branch `main` with one committed file.
fn seeded_repo() -> tempfile::TempDir {
    let tmp = tempfile::tempdir().unwrap();
    let dir = tmp.path();
    git(dir, &["init", "-q"]);
    git(dir, &["config", "user.email", "test@example.com"]);
    git(dir, &["config", "user.name", "Test"]);
    // Name the unborn branch main regardless of the git default.
    git(dir, &["symbolic-ref", "HEAD", "refs/heads/main"]);
    std::fs::write(dir.join("greet.txt"), "hello foo\ngoodbye foo\n").unwrap();
    git(dir, &["add", "-A"]);
    git(dir, &["commit", "-q", "-m", "initial"]);
    tmp
}

fn workspace(tmp: &tempfile::TempDir) -> Workspace {
    Workspace::local(tmp.path(), "main", "autograft/")
}

#[tokio::test]
async fn create_branch_normalizes_title() {
    let tmp = seeded_repo();
    let ws = workspace(&tmp);
    let branch = ws.create_branch("Fix: Flaky CI! (#42)").await.unwrap();
    assert_eq!(branch, "autograft/fix-flaky-ci-42");

    let head = String::from_utf8(
        Command::new("git")
            .args(["rev-parse", "--abbrev-ref", "HEAD"])
            .current_dir(tmp.path())
            .output()
            .unwrap()
            .stdout,
    )
    .unwrap();
    assert_eq!(head.trim(), "autograft/fix-flaky-ci-42");
}

#[tokio::test]
async fn replace_requires_exactly_one_match() {
    let tmp = seeded_repo();
    let ws = workspace(&tmp);

    // "foo" occurs twice: ambiguous, file unchanged.
    let err = ws
        .apply_edits(&[EditOperation::Replace {
            path: "greet.txt".into(),
            old_string: "foo".into(),
            new_string: "bar".into(),
        }])
        .await
        .unwrap_err();
    assert!(err.to_string().contains("matches multiple locations"));
    let content = std::fs::read_to_string(tmp.path().join("greet.txt")).unwrap();
    assert_eq!(content, "hello foo\ngoodbye foo\n");

    // Absent string.
    let err = ws
        .apply_edits(&[EditOperation::Replace {
            path: "greet.txt".into(),
            old_string: "missing".into(),
            new_string: "x".into(),
        }])
        .await
        .unwrap_err();
    assert!(err.to_string().contains("not found"));

    // Unique match succeeds.
    ws.apply_edits(&[EditOperation::Replace {
        path: "greet.txt".into(),
        old_string: "hello foo".into(),
        new_string: "hello bar".into(),
    }])
    .await
    .unwrap();
    let content = std::fs::read_to_string(tmp.path().join("greet.txt")).unwrap();
    assert_eq!(content, "hello bar\ngoodbye foo\n");
}

#[tokio::test]
async fn create_then_delete_restores_state() {
    let tmp = seeded_repo();
    let ws = workspace(&tmp);
    let path = "nested/dir/new.txt";

    ws.apply_edits(&[
        EditOperation::Create {
            path: path.into(),
            content: "fresh".into(),
        },
        EditOperation::Delete { path: path.into() },
    ])
    .await
    .unwrap();
    assert!(!tmp.path().join(path).exists());
}

#[tokio::test]
async fn failures_collect_and_successes_stay_on_disk() {
    let tmp = seeded_repo();
    let ws = workspace(&tmp);

    let err = ws
        .apply_edits(&[
            EditOperation::Create {
                path: "created.txt".into(),
                content: "kept".into(),
            },
            EditOperation::Delete {
                path: "does-not-exist.txt".into(),
            },
        ])
        .await
        .unwrap_err();

    // Partial success is retained on disk.
    assert!(tmp.path().join("created.txt").exists());
    assert!(err.to_string().contains("does-not-exist.txt"));
}

#[tokio::test]
async fn diff_abbreviates_created_and_deleted() {
    let tmp = seeded_repo();
    let ws = workspace(&tmp);
    git(tmp.path(), &["checkout", "-q", "-b", "autograft/test"]);

    ws.apply_edits(&[
        EditOperation::Create {
            path: "added.txt".into(),
            content: "one\ntwo\nthree\n".into(),
        },
        EditOperation::Delete {
            path: "greet.txt".into(),
        },
    ])
    .await
    .unwrap();

    let diff = ws.diff().await.unwrap();
    assert!(diff.contains("Created: added.txt (3 lines)"), "diff was: {diff}");
    assert!(diff.contains("Deleted: greet.txt"), "diff was: {diff}");
}

#[tokio::test]
async fn reset_workspace_discards_local_changes() {
    let tmp = seeded_repo();
    let ws = workspace(&tmp);
    git(tmp.path(), &["checkout", "-q", "-b", "autograft/scratch"]);

    std::fs::write(tmp.path().join("greet.txt"), "mangled").unwrap();
    std::fs::write(tmp.path().join("untracked.txt"), "junk").unwrap();

    ws.reset_workspace().await.unwrap();

    let head = String::from_utf8(
        Command::new("git")
            .args(["rev-parse", "--abbrev-ref", "HEAD"])
            .current_dir(tmp.path())
            .output()
            .unwrap()
            .stdout,
    )
    .unwrap();
    assert_eq!(head.trim(), "main");
    assert!(!tmp.path().join("untracked.txt").exists());
    let content = std::fs::read_to_string(tmp.path().join("greet.txt")).unwrap();
    assert_eq!(content, "hello foo\ngoodbye foo\n");
}

#[tokio::test]
async fn head_sha_and_recent_log() {
    let tmp = seeded_repo();
    let ws = workspace(&tmp);

    let sha = ws.head_sha().await.unwrap();
    assert_eq!(sha.len(), 40);

    let log = ws.recent_log(5).await.unwrap();
    assert!(log.contains("initial"));
}
