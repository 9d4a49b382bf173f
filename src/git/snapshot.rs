use crate::error::PiError;
use crate::git::repository::{Repository, exec_git};
use crate::utils::debug_log;
use std::collections::HashSet;
use std::path::PathBuf;
use std::process::Command;

/// Opaque content-addressed identifier of a working-tree state. Concretely a
/// git tree object id; equality is byte-identical-tree equality by
/// construction (git tree ids are content hashes).
pub type SnapshotId = String;

/// Capture the current working tree into a tree object without disturbing
/// HEAD or the real index. Builds an isolated index on a temp path, stages
/// everything tracked and untracked into it, writes a tree, and removes the
/// temp index on every exit path.
pub fn snapshot_working_tree(repo: &Repository) -> Result<SnapshotId, PiError> {
    let tmp_index = temp_index_path();
    let result = (|| -> Result<SnapshotId, PiError> {
        run_with_index(repo, &tmp_index, &["add", "-A"])?;
        let tree = run_with_index(repo, &tmp_index, &["write-tree"])?;
        Ok(tree.trim().to_string())
    })();

    let _ = std::fs::remove_file(&tmp_index);
    result
}

/// Check out `snapshot` into the working tree, replacing its contents
/// wholesale (files absent from the snapshot are removed). Does not touch
/// HEAD.
pub fn restore_snapshot(repo: &Repository, snapshot: &SnapshotId) -> Result<(), PiError> {
    repo.git(&["read-tree", "--reset", "-u", snapshot])?;
    Ok(())
}

/// List all file paths present in the current HEAD commit.
pub fn list_head_files(repo: &Repository) -> Result<Vec<String>, PiError> {
    if repo.head_commit().is_none() {
        return Ok(Vec::new());
    }
    let out = repo.git(&["ls-tree", "-r", "--name-only", "HEAD"])?;
    Ok(out.lines().map(|l| l.to_string()).collect())
}

/// List file paths that differ between two snapshots (tree-ish or
/// commit-ish). Cheap existence/membership check; does not parse hunks.
pub fn changed_paths(repo: &Repository, before: &str, after: &str) -> Result<Vec<String>, PiError> {
    if before == after {
        return Ok(Vec::new());
    }
    let out = repo.git(&["diff", "--name-only", before, after])?;
    Ok(out.lines().map(|l| l.to_string()).collect())
}

/// Paths in the working tree with uncommitted modifications (relative to
/// HEAD), used by the Commit Finalizer's GC step ("clean" means absent here).
pub fn dirty_paths(repo: &Repository) -> Result<HashSet<String>, PiError> {
    let out = repo.git(&["status", "--porcelain=v1", "--no-renames"])?;
    Ok(out
        .lines()
        .filter_map(|line| line.get(3..).map(|p| p.to_string()))
        .collect())
}

fn temp_index_path() -> PathBuf {
    std::env::temp_dir().join(format!(
        "pi-trace-index-{}-{}",
        std::process::id(),
        chrono::Utc::now().timestamp_nanos_opt().unwrap_or(0)
    ))
}

fn run_with_index(repo: &Repository, index_path: &PathBuf, args: &[&str]) -> Result<String, PiError> {
    let mut full_args = repo.global_args_for_exec();
    full_args.extend(args.iter().map(|s| s.to_string()));

    debug_log(&format!("git (isolated index) {}", full_args.join(" ")));

    let mut cmd = Command::new(crate::config::Config::get().git_cmd());
    cmd.args(&full_args);
    cmd.env("GIT_INDEX_FILE", index_path);

    let output = cmd.output().map_err(PiError::IoError)?;
    if !output.status.success() {
        return Err(PiError::GitCliError {
            code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            args: full_args,
        });
    }
    Ok(String::from_utf8(output.stdout)?)
}

/// The well-known empty tree object id, useful for diffing against an
/// add-only or delete-only snapshot.
pub const EMPTY_TREE: &str = "4b825dc642cb6eb9a060e54bf8d69288fbee4904";

#[allow(dead_code)]
fn ensure_git_available() -> Result<(), PiError> {
    exec_git(&["--version".to_string()]).map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::test_utils::TmpRepo;

    #[test]
    fn snapshot_and_restore_round_trip() {
        let tmp = TmpRepo::new().expect("tmp repo");
        tmp.write_file("a.txt", "hello\n").unwrap();
        tmp.commit_with_message("init").unwrap();

        let snap1 = snapshot_working_tree(tmp.pi_repo()).expect("snapshot1");

        tmp.write_file("a.txt", "goodbye\n").unwrap();
        tmp.write_file("b.txt", "new file\n").unwrap();
        let snap2 = snapshot_working_tree(tmp.pi_repo()).expect("snapshot2");
        assert_ne!(snap1, snap2);

        restore_snapshot(tmp.pi_repo(), &snap1).expect("restore");
        assert_eq!(
            std::fs::read_to_string(tmp.path().join("a.txt")).unwrap(),
            "hello\n"
        );
        assert!(!tmp.path().join("b.txt").exists());
    }

    #[test]
    fn snapshot_does_not_move_head() {
        let tmp = TmpRepo::new().expect("tmp repo");
        tmp.write_file("a.txt", "hello\n").unwrap();
        let head_before = tmp.commit_with_message("init").unwrap();

        tmp.write_file("a.txt", "changed\n").unwrap();
        snapshot_working_tree(tmp.pi_repo()).expect("snapshot");

        assert_eq!(tmp.head_commit_sha().unwrap(), head_before);
    }

    #[test]
    fn changed_paths_identity_is_empty() {
        let tmp = TmpRepo::new().expect("tmp repo");
        let sha = tmp.commit_with_message("init").unwrap();
        assert!(changed_paths(tmp.pi_repo(), &sha, &sha).unwrap().is_empty());
    }

    #[test]
    fn list_head_files_on_empty_repo() {
        let tmp = TmpRepo::new().expect("tmp repo");
        assert!(list_head_files(tmp.pi_repo()).unwrap().is_empty());
    }
}
