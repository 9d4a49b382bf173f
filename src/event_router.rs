use crate::checkpoint::CheckpointManager;
use crate::commit_finalizer::{self, OpenTrace};
use crate::error::PiError;
use crate::git::diff::DiffService;
use crate::git::repository::Repository;
use crate::git::snapshot::{self, SnapshotId};
use crate::model::{ContributorTag, FileEntry, TraceMetadata, TraceRecord};
use crate::trace_log;
use crate::utils::now_iso8601;
use std::collections::HashMap;

/// Point a `refs/pi-trace-shas/<id>` ref at `id` if one doesn't already
/// exist, so the snapshot tree survives gc before any commit finalizes and
/// runs the fuller reconciliation in `commit_finalizer`.
fn protect_snapshot(repo: &Repository, id: &SnapshotId) -> Result<(), PiError> {
    let ref_name = format!(
        "{}{}",
        crate::git::refs::TRACE_SHA_REF_PREFIX,
        crate::utils::sanitize_ref_component(id)
    );
    if !crate::git::refs::ref_exists(repo, &ref_name) {
        crate::git::refs::update_ref(repo, &ref_name, id)?;
    }
    Ok(())
}

/// Translates host-delivered events into calls on the core components. A
/// host (the agent runtime driving a session) owns the event stream and
/// calls one method per event; this struct holds no process of its own.
pub struct EventRouter {
    repo: Repository,
    checkpoints: CheckpointManager,
    session_id: String,
    trace_before: Option<SnapshotId>,
}

impl EventRouter {
    pub fn new(repo: Repository, session_id: impl Into<String>) -> Result<Self, PiError> {
        let session_id = session_id.into();
        let checkpoints = CheckpointManager::new(&repo, session_id.clone())?;
        Ok(EventRouter { repo, checkpoints, session_id, trace_before: None })
    }

    /// Session start or session switch: reset in-memory state, rebuild the
    /// checkpoint map, clean orphaned snapshot refs, and capture a resume
    /// checkpoint.
    pub fn on_session_start(&mut self) -> Result<(), PiError> {
        self.trace_before = None;
        self.checkpoints.rebuild_session_map(&self.repo)?;
        self.checkpoints.capture_resume(&self.repo)?;
        Ok(())
    }

    /// Turn start (turn index 0): capture the pending snapshot that will
    /// become this turn's trace `before`. Re-armed unconditionally every
    /// turn, mirroring `capture_pending` on the checkpoint side, so a human
    /// edit made after the previous turn's `agent_end` is visible as a gap
    /// rather than silently folded into the next trace's diff.
    pub fn on_turn_start(&mut self) -> Result<(), PiError> {
        self.checkpoints.capture_pending(&self.repo)?;
        self.trace_before = Some(snapshot::snapshot_working_tree(&self.repo)?);
        Ok(())
    }

    /// Turn end (turn index 0): materialize the pending checkpoint under the
    /// user message's entry id, then prune.
    pub fn on_turn_end(&mut self, entry_id: &str) -> Result<(), PiError> {
        self.checkpoints.materialize_turn_end(&self.repo, entry_id)?;
        Ok(())
    }

    /// Agent end: capture an after-snapshot, diff against `trace_before`,
    /// and append a trace record if anything changed.
    pub fn on_agent_end(
        &mut self,
        session_id: &str,
        entry_id: &str,
        user_message: &str,
        assistant_message: Option<&str>,
    ) -> Result<(), PiError> {
        let before = match &self.trace_before {
            Some(b) => b.clone(),
            None => snapshot::snapshot_working_tree(&self.repo)?,
        };
        let after = snapshot::snapshot_working_tree(&self.repo)?;

        let changed = snapshot::changed_paths(&self.repo, &before, &after)?;
        if !changed.is_empty() {
            protect_snapshot(&self.repo, &before)?;
            protect_snapshot(&self.repo, &after)?;

            let mut diff_service = DiffService::new(&self.repo);
            let mut files = HashMap::new();
            for path in &changed {
                let hunks = diff_service.diff(&before, &after, path)?;
                let additions = hunks.iter().filter(|h| h.kind == crate::git::diff::HunkKind::Add).map(|h| h.lines.len()).sum();
                let deletions = hunks.iter().filter(|h| h.kind == crate::git::diff::HunkKind::Delete).map(|h| h.lines.len()).sum();
                files.insert(
                    path.clone(),
                    FileEntry {
                        contributor: Some(ContributorTag { kind: crate::model::Contributor::Ai, model_id: None }),
                        additions,
                        deletions,
                        ranges: Vec::new(),
                    },
                );
            }

            let record = TraceRecord {
                id: uuid::Uuid::new_v4().to_string(),
                timestamp: now_iso8601(),
                files,
                metadata: TraceMetadata {
                    before_sha: before,
                    after_sha: after.clone(),
                    session_id: session_id.to_string(),
                    entry_id: entry_id.to_string(),
                    user_message: user_message.to_string(),
                    assistant_message: assistant_message.map(|s| s.to_string()),
                },
                vcs_revision: self.repo.head_commit(),
                tool: None,
            };
            trace_log::append(&self.repo, &record)?;
        }

        self.trace_before = Some(after);
        Ok(())
    }

    /// A tool result matched the commit predicate: invoke the Commit
    /// Finalizer and update `trace_before` to its returned open snapshot.
    pub fn on_commit_detected(
        &mut self,
        entry_id: &str,
        user_message: &str,
    ) -> Result<commit_finalizer::FinalizeResult, PiError> {
        let open = self.trace_before.take().map(|before_sha| OpenTrace {
            before_sha,
            session_id: self.session_id.clone(),
            entry_id: entry_id.to_string(),
            user_message: user_message.to_string(),
        });

        let result = commit_finalizer::finalize_commit(&self.repo, open)?;
        self.trace_before = result.trace_before.clone();
        Ok(result)
    }

    /// Before a branch/tree navigation: resolve the restore target (by entry
    /// id, falling back to the resume checkpoint) and perform
    /// restore-with-backup. The caller is expected to have already obtained
    /// user confirmation; this method makes no selection UI of its own.
    pub fn restore_checkpoint_for_entry(&mut self, entry_id: &str) -> Result<(), PiError> {
        let ref_name = self
            .checkpoints
            .checkpoint_for_entry(entry_id)
            .map(|name| format!("{}{}", crate::git::refs::CHECKPOINT_REF_PREFIX, name))
            .ok_or_else(|| PiError::Generic(format!("no checkpoint for entry {}", entry_id)))?;
        self.checkpoints.restore_with_backup(&self.repo, &ref_name)
    }

    pub fn undo_restore(&mut self) -> Result<(), PiError> {
        self.checkpoints.undo(&self.repo)
    }

    pub fn repo(&self) -> &Repository {
        &self.repo
    }
}
