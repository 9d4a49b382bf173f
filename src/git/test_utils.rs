use crate::error::PiError;
use crate::git::repository::Repository;
use std::fs;
use std::path::PathBuf;
use std::process::Command;
use std::sync::atomic::{AtomicU64, Ordering};

/// Create a guaranteed-unique temporary directory under the OS temp dir.
fn create_unique_tmp_dir(prefix: &str) -> Result<PathBuf, PiError> {
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let base = std::env::temp_dir();

    for _attempt in 0..100u32 {
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        let pid = std::process::id();
        let seq = COUNTER.fetch_add(1, Ordering::Relaxed);
        let path = base.join(format!("{}-{}-{}-{}", prefix, now, pid, seq));

        match fs::create_dir(&path) {
            Ok(()) => return Ok(path),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(PiError::IoError(e)),
        }
    }

    Err(PiError::Generic(
        "failed to create a unique temporary directory".to_string(),
    ))
}

/// A disposable real git repository, for integration-style tests. Grounded on
/// the teacher's `TmpRepo` fixture, trimmed to plain `git` CLI calls (no
/// libgit2 dependency) since that's all this crate needs for its own tests.
pub struct TmpRepo {
    path: PathBuf,
    repo: Repository,
}

impl TmpRepo {
    pub fn new() -> Result<Self, PiError> {
        let tmp_dir = create_unique_tmp_dir("pi-trace-tmp")?;

        run_git(&tmp_dir, &["init", "-q", "-b", "main"])?;
        run_git(&tmp_dir, &["config", "user.name", "Test User"])?;
        run_git(&tmp_dir, &["config", "user.email", "test@example.com"])?;

        let repo = Repository::discover(&tmp_dir)?
            .ok_or_else(|| PiError::Generic("newly-init repo not discoverable".to_string()))?;

        Ok(TmpRepo { path: tmp_dir, repo })
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    pub fn pi_repo(&self) -> &Repository {
        &self.repo
    }

    pub fn write_file(&self, filename: &str, contents: &str) -> Result<PathBuf, PiError> {
        let file_path = self.path.join(filename);
        if let Some(parent) = file_path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&file_path, contents)?;
        Ok(file_path)
    }

    pub fn stage_file(&self, filename: &str) -> Result<(), PiError> {
        run_git(&self.path, &["add", filename])?;
        Ok(())
    }

    pub fn commit_with_message(&self, message: &str) -> Result<String, PiError> {
        run_git(&self.path, &["add", "-A"])?;
        run_git(&self.path, &["commit", "-q", "-m", message, "--allow-empty"])?;
        self.head_commit_sha()
    }

    pub fn head_commit_sha(&self) -> Result<String, PiError> {
        Ok(run_git(&self.path, &["rev-parse", "HEAD"])?.trim().to_string())
    }

    pub fn current_branch(&self) -> Result<String, PiError> {
        Ok(run_git(&self.path, &["branch", "--show-current"])?
            .trim()
            .to_string())
    }

    pub fn create_branch(&self, name: &str) -> Result<(), PiError> {
        run_git(&self.path, &["branch", name])?;
        Ok(())
    }

    pub fn switch_branch(&self, name: &str) -> Result<(), PiError> {
        run_git(&self.path, &["switch", "-q", name])?;
        Ok(())
    }

    pub fn git_command(&self, args: &[&str]) -> Result<String, PiError> {
        run_git(&self.path, args)
    }
}

fn run_git(dir: &std::path::Path, args: &[&str]) -> Result<String, PiError> {
    let output = Command::new("git")
        .current_dir(dir)
        .args(args)
        .output()
        .map_err(PiError::IoError)?;

    if !output.status.success() {
        return Err(PiError::GitCliError {
            code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            args: args.iter().map(|s| s.to_string()).collect(),
        });
    }

    Ok(String::from_utf8(output.stdout)?)
}
