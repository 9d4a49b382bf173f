use crate::error::PiError;
use crate::git::repository::{Repository, exec_git, exec_git_stdin};

pub const CHECKPOINT_REF_PREFIX: &str = "refs/pi-checkpoints/";
pub const TRACE_SHA_REF_PREFIX: &str = "refs/pi-trace-shas/";
pub const TRACE_NOTES_REF: &str = "pi-trace";

/// List full ref names under a prefix (e.g. `refs/pi-checkpoints/`), stripped
/// of the prefix. Empty vec (not an error) if the namespace doesn't exist
/// yet -- that's the common case before the first checkpoint is taken.
pub fn list_refs_with_prefix(repo: &Repository, prefix: &str) -> Result<Vec<String>, PiError> {
    let mut args = repo.global_args_for_exec();
    args.push("for-each-ref".to_string());
    args.push("--format=%(refname)".to_string());
    args.push(prefix.to_string());

    let output = exec_git(&args)?;
    let stdout = String::from_utf8(output.stdout)?;
    Ok(stdout
        .lines()
        .filter_map(|l| l.strip_prefix(prefix))
        .map(|s| s.to_string())
        .collect())
}

/// Point `ref_name` (full path, e.g. `refs/pi-checkpoints/<name>`) at `target`
/// (a commit or tree oid). Creates the ref if absent, moves it if present.
pub fn update_ref(repo: &Repository, ref_name: &str, target: &str) -> Result<(), PiError> {
    let mut args = repo.global_args_for_exec();
    args.push("update-ref".to_string());
    args.push(ref_name.to_string());
    args.push(target.to_string());
    exec_git(&args)?;
    Ok(())
}

pub fn delete_ref(repo: &Repository, ref_name: &str) -> Result<(), PiError> {
    let mut args = repo.global_args_for_exec();
    args.push("update-ref".to_string());
    args.push("-d".to_string());
    args.push(ref_name.to_string());
    exec_git(&args)?;
    Ok(())
}

pub fn resolve_ref(repo: &Repository, ref_name: &str) -> Option<String> {
    let mut args = repo.global_args_for_exec();
    args.push("rev-parse".to_string());
    args.push("--verify".to_string());
    args.push("-q".to_string());
    args.push(ref_name.to_string());

    exec_git(&args)
        .ok()
        .and_then(|o| String::from_utf8(o.stdout).ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

pub fn ref_exists(repo: &Repository, ref_name: &str) -> bool {
    let mut args = repo.global_args_for_exec();
    args.push("show-ref".to_string());
    args.push("--verify".to_string());
    args.push("--quiet".to_string());
    args.push(ref_name.to_string());
    exec_git(&args).is_ok()
}

/// Write (force-overwrite) a note under `refs/notes/pi-trace` for `commit_sha`.
pub fn notes_add(repo: &Repository, commit_sha: &str, note_content: &str) -> Result<(), PiError> {
    let mut args = repo.global_args_for_exec();
    args.push("notes".to_string());
    args.push(format!("--ref={}", TRACE_NOTES_REF));
    args.push("add".to_string());
    args.push("-f".to_string());
    args.push("-F".to_string());
    args.push("-".to_string());
    args.push(commit_sha.to_string());

    exec_git_stdin(&args, note_content.as_bytes())?;
    Ok(())
}

/// Read the raw note content for `commit_sha`, or `None` if no note exists.
pub fn notes_show(repo: &Repository, commit_sha: &str) -> Option<String> {
    let mut args = repo.global_args_for_exec();
    args.push("notes".to_string());
    args.push(format!("--ref={}", TRACE_NOTES_REF));
    args.push("show".to_string());
    args.push(commit_sha.to_string());

    match exec_git(&args) {
        Ok(output) => String::from_utf8(output.stdout)
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty()),
        Err(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::test_utils::TmpRepo;

    #[test]
    fn notes_add_and_show_round_trip() {
        let tmp = TmpRepo::new().expect("tmp repo");
        let sha = tmp.commit_with_message("initial").expect("commit");

        notes_add(tmp.pi_repo(), &sha, "hello trace note").expect("notes_add");
        assert_eq!(
            notes_show(tmp.pi_repo(), &sha),
            Some("hello trace note".to_string())
        );
    }

    #[test]
    fn notes_show_missing_commit_returns_none() {
        let tmp = TmpRepo::new().expect("tmp repo");
        assert_eq!(
            notes_show(tmp.pi_repo(), "0000000000000000000000000000000000000000"),
            None
        );
    }

    #[test]
    fn update_and_delete_ref_round_trip() {
        let tmp = TmpRepo::new().expect("tmp repo");
        let sha = tmp.commit_with_message("initial").expect("commit");
        let ref_name = format!("{}demo", CHECKPOINT_REF_PREFIX);

        update_ref(tmp.pi_repo(), &ref_name, &sha).expect("update_ref");
        assert!(ref_exists(tmp.pi_repo(), &ref_name));
        assert_eq!(resolve_ref(tmp.pi_repo(), &ref_name), Some(sha));

        delete_ref(tmp.pi_repo(), &ref_name).expect("delete_ref");
        assert!(!ref_exists(tmp.pi_repo(), &ref_name));
    }

    #[test]
    fn list_refs_with_prefix_strips_prefix() {
        let tmp = TmpRepo::new().expect("tmp repo");
        let sha = tmp.commit_with_message("initial").expect("commit");
        update_ref(tmp.pi_repo(), &format!("{}a", CHECKPOINT_REF_PREFIX), &sha).unwrap();
        update_ref(tmp.pi_repo(), &format!("{}b", CHECKPOINT_REF_PREFIX), &sha).unwrap();

        let mut names = list_refs_with_prefix(tmp.pi_repo(), CHECKPOINT_REF_PREFIX).unwrap();
        names.sort();
        assert_eq!(names, vec!["a".to_string(), "b".to_string()]);
    }
}
