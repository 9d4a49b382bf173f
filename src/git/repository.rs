use crate::config;
use crate::error::PiError;

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

#[cfg(windows)]
use crate::utils::CREATE_NO_WINDOW;
#[cfg(windows)]
use std::os::windows::process::CommandExt;

/// A thin wrapper around the `git` CLI binary. Owns no git-level state of its
/// own beyond the paths needed to run commands against a stable repository
/// root; every other component (refs, diff, blame, snapshot) calls through
/// `Repository::git`/`exec_git`.
#[derive(Debug, Clone)]
pub struct Repository {
    git_dir: PathBuf,
    workdir: PathBuf,
}

impl Repository {
    /// Global args passed before the subcommand on every invocation, pinning
    /// the command to this repository's root regardless of the caller's cwd.
    pub fn global_args_for_exec(&self) -> Vec<String> {
        vec![
            "-C".to_string(),
            self.workdir.display().to_string(),
            "--no-pager".to_string(),
        ]
    }

    /// Run an arbitrary git command and return stdout as a string.
    pub fn git(&self, args: &[&str]) -> Result<String, PiError> {
        let mut full_args = self.global_args_for_exec();
        full_args.extend(args.iter().map(|s| s.to_string()));
        let output = exec_git(&full_args)?;
        Ok(String::from_utf8(output.stdout)?)
    }

    /// The resolved name of HEAD (`refs/heads/main`) when it is a symbolic
    /// ref, or the literal string `"HEAD"` when it can't be resolved (e.g. an
    /// empty repository with no commits yet). Never errors: an unresolvable
    /// HEAD is a normal state, not an environment failure.
    pub fn head_name(&self) -> String {
        self.git(&["symbolic-ref", "HEAD"])
            .map(|s| s.trim().to_string())
            .unwrap_or_else(|_| "HEAD".to_string())
    }

    /// The commit HEAD currently resolves to, if any commit exists.
    pub fn head_commit(&self) -> Option<String> {
        self.git(&["rev-parse", "--verify", "-q", "HEAD"])
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    pub fn git_dir(&self) -> &Path {
        &self.git_dir
    }

    pub fn is_bare(&self) -> Result<bool, PiError> {
        Ok(self.git(&["rev-parse", "--is-bare-repository"])?.trim() == "true")
    }

    /// Discover the repository containing `start_path`. Returns `Ok(None)`
    /// (not an error) when `start_path` is not inside a git repository --
    /// per the environment-error category, the core degrades to a no-op
    /// rather than treating "not a repo" as a failure.
    pub fn discover(start_path: &Path) -> Result<Option<Repository>, PiError> {
        let cwd_args = vec!["-C".to_string(), start_path.display().to_string()];
        let mut args = cwd_args.clone();
        args.push("rev-parse".to_string());
        args.push("--show-toplevel".to_string());

        let output = match exec_git(&args) {
            Ok(o) => o,
            Err(PiError::GitCliError { .. }) => return Ok(None),
            Err(e) => return Err(e),
        };
        let workdir = PathBuf::from(String::from_utf8(output.stdout)?.trim());

        let mut git_dir_args = cwd_args;
        git_dir_args.push("rev-parse".to_string());
        git_dir_args.push("--git-dir".to_string());
        let git_dir_output = exec_git(&git_dir_args)?;
        let git_dir_str = String::from_utf8(git_dir_output.stdout)?.trim().to_string();
        let git_dir = if Path::new(&git_dir_str).is_relative() {
            workdir.join(git_dir_str)
        } else {
            PathBuf::from(git_dir_str)
        };

        Ok(Some(Repository { git_dir, workdir }))
    }
}

pub fn exec_git(args: &[String]) -> Result<Output, PiError> {
    let mut cmd = Command::new(config::Config::get().git_cmd());
    cmd.args(args);

    #[cfg(windows)]
    {
        cmd.creation_flags(CREATE_NO_WINDOW);
    }

    let output = cmd.output().map_err(PiError::IoError)?;

    if !output.status.success() {
        return Err(PiError::GitCliError {
            code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            args: args.to_vec(),
        });
    }

    Ok(output)
}

pub fn exec_git_stdin(args: &[String], stdin_data: &[u8]) -> Result<Output, PiError> {
    let mut cmd = Command::new(config::Config::get().git_cmd());
    cmd.args(args)
        .stdin(std::process::Stdio::piped())
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped());

    #[cfg(windows)]
    {
        cmd.creation_flags(CREATE_NO_WINDOW);
    }

    let mut child = cmd.spawn().map_err(PiError::IoError)?;

    if let Some(mut stdin) = child.stdin.take() {
        use std::io::Write;
        stdin.write_all(stdin_data).map_err(PiError::IoError)?;
    }

    let output = child.wait_with_output().map_err(PiError::IoError)?;

    if !output.status.success() {
        return Err(PiError::GitCliError {
            code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            args: args.to_vec(),
        });
    }

    Ok(output)
}
