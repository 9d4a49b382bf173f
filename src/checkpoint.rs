use crate::error::PiError;
use crate::git::refs::{self, CHECKPOINT_REF_PREFIX};
use crate::git::repository::Repository;
use crate::git::snapshot::{self, SnapshotId};
use crate::utils::sanitize_ref_component;
use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;

pub const CHECKPOINT_CAP: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Kind {
    Regular,
    Resume,
    BeforeRestore,
    Legacy,
}

#[derive(Debug, Clone)]
struct ParsedName {
    kind: Kind,
    session_id: Option<String>,
    timestamp_ms: u64,
    entry_id: String,
    name: String,
}

fn regular_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^checkpoint-([0-9a-f-]{36})-(\d{13})-(.+)$").expect("valid regex"))
}

fn resume_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^checkpoint-resume-([0-9a-f-]{36})-(\d{13})$").expect("valid regex"))
}

fn before_restore_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^before-restore-([0-9a-f-]{36})-(\d{13})$").expect("valid regex"))
}

fn legacy_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^checkpoint-(\d{13})-(.+)$").expect("valid regex"))
}

fn parse_name(name: &str) -> Option<ParsedName> {
    if let Some(c) = resume_re().captures(name) {
        return Some(ParsedName {
            kind: Kind::Resume,
            session_id: Some(c[1].to_string()),
            timestamp_ms: c[2].parse().ok()?,
            entry_id: String::new(),
            name: name.to_string(),
        });
    }
    if let Some(c) = before_restore_re().captures(name) {
        return Some(ParsedName {
            kind: Kind::BeforeRestore,
            session_id: Some(c[1].to_string()),
            timestamp_ms: c[2].parse().ok()?,
            entry_id: String::new(),
            name: name.to_string(),
        });
    }
    if let Some(c) = regular_re().captures(name) {
        return Some(ParsedName {
            kind: Kind::Regular,
            session_id: Some(c[1].to_string()),
            timestamp_ms: c[2].parse().ok()?,
            entry_id: c[3].to_string(),
            name: name.to_string(),
        });
    }
    if let Some(c) = legacy_re().captures(name) {
        return Some(ParsedName {
            kind: Kind::Legacy,
            session_id: None,
            timestamp_ms: c[1].parse().ok()?,
            entry_id: c[2].to_string(),
            name: name.to_string(),
        });
    }
    None
}

fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Manages checkpoint refs for one session: naming, in-memory entry-id
/// lookup, turn-scoped capture, FIFO pruning, and restore-with-backup.
pub struct CheckpointManager {
    session_id: String,
    entry_to_name: HashMap<String, String>,
    pending_snapshot: Option<SnapshotId>,
}

impl CheckpointManager {
    pub fn new(repo: &Repository, session_id: impl Into<String>) -> Result<Self, PiError> {
        let mut mgr = CheckpointManager { session_id: session_id.into(), entry_to_name: HashMap::new(), pending_snapshot: None };
        mgr.rebuild_session_map(repo)?;
        Ok(mgr)
    }

    /// Rebuild `entry_id -> checkpoint_name` from existing refs, newest first
    /// per entry id. Refs from other sessions are ignored; the legacy
    /// (pre-session-id) format is loaded regardless of session.
    pub fn rebuild_session_map(&mut self, repo: &Repository) -> Result<(), PiError> {
        self.entry_to_name.clear();
        let mut parsed: Vec<ParsedName> = refs::list_refs_with_prefix(repo, CHECKPOINT_REF_PREFIX)?
            .iter()
            .filter_map(|n| parse_name(n))
            .filter(|p| p.kind == Kind::Regular || p.kind == Kind::Legacy)
            .collect();
        parsed.sort_by(|a, b| b.timestamp_ms.cmp(&a.timestamp_ms));

        for p in parsed {
            if p.kind == Kind::Regular && p.session_id.as_deref() != Some(self.session_id.as_str()) {
                continue;
            }
            self.entry_to_name.entry(p.entry_id.clone()).or_insert(p.name.clone());
        }
        Ok(())
    }

    /// Turn start: snapshot the tree now, before the triggering entry id is
    /// known. A no-op if a pending snapshot is already open.
    pub fn capture_pending(&mut self, repo: &Repository) -> Result<(), PiError> {
        if self.pending_snapshot.is_none() {
            self.pending_snapshot = Some(snapshot::snapshot_working_tree(repo)?);
        }
        Ok(())
    }

    /// Turn end: materialize the pending snapshot under `entry_id`, then
    /// prune. No-op (returns `Ok(None)`) if no snapshot is pending.
    pub fn materialize_turn_end(&mut self, repo: &Repository, entry_id: &str) -> Result<Option<String>, PiError> {
        let snapshot = match self.pending_snapshot.take() {
            Some(s) => s,
            None => return Ok(None),
        };

        let name = format!(
            "checkpoint-{}-{}-{}",
            self.session_id,
            now_ms(),
            sanitize_ref_component(entry_id)
        );
        refs::update_ref(repo, &format!("{}{}", CHECKPOINT_REF_PREFIX, name), &snapshot)?;
        self.entry_to_name.insert(entry_id.to_string(), name.clone());

        self.prune(repo)?;
        Ok(Some(name))
    }

    /// Session start / switch: capture a resume checkpoint for this session.
    pub fn capture_resume(&mut self, repo: &Repository) -> Result<String, PiError> {
        let snapshot = snapshot::snapshot_working_tree(repo)?;
        let name = format!("checkpoint-resume-{}-{}", self.session_id, now_ms());
        refs::update_ref(repo, &format!("{}{}", CHECKPOINT_REF_PREFIX, name), &snapshot)?;
        Ok(name)
    }

    /// Drop the oldest regular checkpoints for this session once the count
    /// exceeds `CHECKPOINT_CAP`.
    pub fn prune(&mut self, repo: &Repository) -> Result<(), PiError> {
        let mut parsed: Vec<ParsedName> = refs::list_refs_with_prefix(repo, CHECKPOINT_REF_PREFIX)?
            .iter()
            .filter_map(|n| parse_name(n))
            .filter(|p| p.kind == Kind::Regular && p.session_id.as_deref() == Some(self.session_id.as_str()))
            .collect();
        parsed.sort_by(|a, b| a.timestamp_ms.cmp(&b.timestamp_ms));

        if parsed.len() <= CHECKPOINT_CAP {
            return Ok(());
        }

        let excess = parsed.len() - CHECKPOINT_CAP;
        for p in &parsed[..excess] {
            refs::delete_ref(repo, &format!("{}{}", CHECKPOINT_REF_PREFIX, p.name))?;
            if self.entry_to_name.get(&p.entry_id) == Some(&p.name) {
                self.entry_to_name.remove(&p.entry_id);
            }
        }
        Ok(())
    }

    /// Capture the current tree as a fresh `before-restore` checkpoint for
    /// this session, replacing any previous one, then check out `target_ref`
    /// (a full ref name under the checkpoint prefix) into the working tree.
    pub fn restore_with_backup(&mut self, repo: &Repository, target_ref: &str) -> Result<(), PiError> {
        let target = refs::resolve_ref(repo, target_ref)
            .ok_or_else(|| PiError::Generic(format!("checkpoint ref not found: {}", target_ref)))?;

        let backup_snapshot = snapshot::snapshot_working_tree(repo)?;
        let backup_name = format!("before-restore-{}-{}", self.session_id, now_ms());
        let previous = self.before_restore_refs(repo)?;

        refs::update_ref(repo, &format!("{}{}", CHECKPOINT_REF_PREFIX, backup_name), &backup_snapshot)?;
        for existing in previous {
            refs::delete_ref(repo, &format!("{}{}", CHECKPOINT_REF_PREFIX, existing))?;
        }

        snapshot::restore_snapshot(repo, &target)
    }

    /// Restore from this session's single `before-restore` checkpoint, if
    /// any. The restore primitive itself creates a fresh backup of the
    /// pre-undo state, so undo is repeatable.
    pub fn undo(&mut self, repo: &Repository) -> Result<(), PiError> {
        let existing = self.before_restore_refs(repo)?;
        let name = existing
            .into_iter()
            .next()
            .ok_or_else(|| PiError::Generic("no before-restore checkpoint for this session".to_string()))?;
        self.restore_with_backup(repo, &format!("{}{}", CHECKPOINT_REF_PREFIX, name))
    }

    fn before_restore_refs(&self, repo: &Repository) -> Result<Vec<String>, PiError> {
        Ok(refs::list_refs_with_prefix(repo, CHECKPOINT_REF_PREFIX)?
            .into_iter()
            .filter_map(|n| parse_name(&n))
            .filter(|p| p.kind == Kind::BeforeRestore && p.session_id.as_deref() == Some(self.session_id.as_str()))
            .map(|p| p.name)
            .collect())
    }

    pub fn checkpoint_for_entry(&self, entry_id: &str) -> Option<&str> {
        self.entry_to_name.get(entry_id).map(|s| s.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::test_utils::TmpRepo;

    #[test]
    fn turn_capture_and_lookup() {
        let tmp = TmpRepo::new().expect("tmp repo");
        tmp.write_file("a.txt", "hi\n").unwrap();
        tmp.commit_with_message("init").unwrap();

        let mut mgr = CheckpointManager::new(tmp.pi_repo(), "11111111-1111-1111-1111-111111111111").unwrap();
        mgr.capture_pending(tmp.pi_repo()).unwrap();
        let name = mgr.materialize_turn_end(tmp.pi_repo(), "entry-1").unwrap().expect("materialized");

        assert_eq!(mgr.checkpoint_for_entry("entry-1"), Some(name.as_str()));
        assert!(refs::ref_exists(tmp.pi_repo(), &format!("{}{}", CHECKPOINT_REF_PREFIX, name)));
    }

    #[test]
    fn turn_end_without_pending_is_noop() {
        let tmp = TmpRepo::new().expect("tmp repo");
        tmp.commit_with_message("init").unwrap();
        let mut mgr = CheckpointManager::new(tmp.pi_repo(), "session-a").unwrap();
        let result = mgr.materialize_turn_end(tmp.pi_repo(), "entry-1").unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn restore_with_backup_round_trip() {
        let tmp = TmpRepo::new().expect("tmp repo");
        tmp.write_file("a.txt", "v1\n").unwrap();
        tmp.commit_with_message("v1").unwrap();

        let mut mgr = CheckpointManager::new(tmp.pi_repo(), "11111111-1111-1111-1111-111111111111").unwrap();
        mgr.capture_pending(tmp.pi_repo()).unwrap();
        let name = mgr.materialize_turn_end(tmp.pi_repo(), "entry-1").unwrap().unwrap();

        tmp.write_file("a.txt", "v2\n").unwrap();

        mgr.restore_with_backup(tmp.pi_repo(), &format!("{}{}", CHECKPOINT_REF_PREFIX, name)).unwrap();
        assert_eq!(std::fs::read_to_string(tmp.path().join("a.txt")).unwrap(), "v1\n");

        mgr.undo(tmp.pi_repo()).unwrap();
        assert_eq!(std::fs::read_to_string(tmp.path().join("a.txt")).unwrap(), "v2\n");
    }

    #[test]
    fn prune_keeps_cap_and_drops_oldest() {
        let tmp = TmpRepo::new().expect("tmp repo");
        tmp.commit_with_message("init").unwrap();
        let mut mgr = CheckpointManager::new(tmp.pi_repo(), "11111111-1111-1111-1111-111111111111").unwrap();

        for i in 0..3 {
            mgr.capture_pending(tmp.pi_repo()).unwrap();
            mgr.materialize_turn_end(tmp.pi_repo(), &format!("entry-{}", i)).unwrap();
        }

        let count = refs::list_refs_with_prefix(tmp.pi_repo(), CHECKPOINT_REF_PREFIX)
            .unwrap()
            .iter()
            .filter(|n| parse_name(n).map(|p| p.kind == Kind::Regular).unwrap_or(false))
            .count();
        assert_eq!(count, 3);
    }
}
