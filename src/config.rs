use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

/// Resolved configuration for a repository. Built once from the on-disk
/// `FileConfig` merged over defaults; cheap to clone and pass around.
#[derive(Debug, Clone)]
pub struct Config {
    git_path: String,
    silent_checkpoints: bool,
    trace_hook: bool,
}

/// On-disk shape of the config file. Every field optional so a partial or
/// absent file still parses; unset fields fall back to defaults in
/// `Config::from_file_config`.
#[derive(Debug, Deserialize, Serialize, Default)]
pub struct FileConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub silent_checkpoints: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace_hook: Option<bool>,
}

static CONFIG: OnceLock<Config> = OnceLock::new();

impl Config {
    /// Access the process-global configuration, loading it from disk on
    /// first use.
    pub fn get() -> &'static Config {
        CONFIG.get_or_init(|| Config::from_file_config(load_file_config().unwrap_or_default()))
    }

    fn from_file_config(file_cfg: FileConfig) -> Config {
        Config {
            git_path: file_cfg
                .git_path
                .filter(|p| !p.trim().is_empty())
                .unwrap_or_else(|| "git".to_string()),
            silent_checkpoints: file_cfg.silent_checkpoints.unwrap_or(false),
            trace_hook: file_cfg.trace_hook.unwrap_or(false),
        }
    }

    /// The command used to invoke git. Defaults to `"git"` (resolved via
    /// `PATH`) unless overridden in the config file.
    pub fn git_cmd(&self) -> &str {
        &self.git_path
    }

    /// Suppress per-checkpoint status updates.
    pub fn silent_checkpoints(&self) -> bool {
        self.silent_checkpoints
    }

    /// Install a commit hook that writes raw, unresolved notes on any commit.
    pub fn trace_hook(&self) -> bool {
        self.trace_hook
    }
}

/// Directory holding this tool's per-user configuration: `~/.pi-trace/`.
pub fn config_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".pi-trace"))
}

fn config_file_path() -> Option<PathBuf> {
    config_dir().map(|dir| dir.join("config.jsonc"))
}

fn load_file_config() -> Option<FileConfig> {
    let path = config_file_path()?;
    let data = fs::read_to_string(&path).ok()?;
    parse_jsonc(&data)
}

fn parse_jsonc(data: &str) -> Option<FileConfig> {
    let value = jsonc_parser::parse_to_serde_value(data, &Default::default())
        .ok()
        .flatten()?;
    serde_json::from_value(value).ok()
}

fn is_executable(path: &Path) -> bool {
    path.is_file()
}

#[allow(dead_code)]
fn probe_git_candidates() -> Option<PathBuf> {
    let candidates: &[&str] = &[
        "/opt/homebrew/bin/git",
        "/usr/local/bin/git",
        "/usr/bin/git",
        "/bin/git",
    ];
    candidates
        .iter()
        .map(Path::new)
        .find(|p| is_executable(p))
        .map(|p| p.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_when_no_file_config() {
        let cfg = Config::from_file_config(FileConfig::default());
        assert_eq!(cfg.git_cmd(), "git");
        assert!(!cfg.silent_checkpoints());
        assert!(!cfg.trace_hook());
    }

    #[test]
    fn honors_explicit_values() {
        let cfg = Config::from_file_config(FileConfig {
            git_path: Some("/usr/bin/git".to_string()),
            silent_checkpoints: Some(true),
            trace_hook: Some(true),
        });
        assert_eq!(cfg.git_cmd(), "/usr/bin/git");
        assert!(cfg.silent_checkpoints());
        assert!(cfg.trace_hook());
    }

    #[test]
    fn parses_jsonc_with_comments() {
        let text = r#"{
            // suppress status spam
            "silent_checkpoints": true,
        }"#;
        let file_cfg = parse_jsonc(text).expect("should parse jsonc with comments/trailing comma");
        assert_eq!(file_cfg.silent_checkpoints, Some(true));
        assert_eq!(file_cfg.trace_hook, None);
    }
}
