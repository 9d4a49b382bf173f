use crate::error::PiError;
use crate::git::diff::DiffService;
use crate::git::refs::{self, TRACE_SHA_REF_PREFIX};
use crate::git::repository::Repository;
use crate::git::snapshot::{self, SnapshotId};
use crate::model::{ContributorTag, FileEntry, ResolvedRange, TraceMetadata, TraceNote, TraceRecord};
use crate::trace_log;
use crate::utils::{now_iso8601, sanitize_ref_component};
use std::collections::{HashMap, HashSet};

/// A trace that has been opened (before-snapshot captured at turn start) but
/// not yet paired with an after-snapshot, carried across until the commit
/// point so mid-loop edits are still attributed.
pub struct OpenTrace {
    pub before_sha: SnapshotId,
    pub session_id: String,
    pub entry_id: String,
    pub user_message: String,
}

pub struct FinalizeResult {
    pub commit_sha: String,
    /// The open `trace_before` to carry forward. `None` only when no open
    /// trace existed at commit time.
    pub trace_before: Option<SnapshotId>,
}

/// Run the full commit finalization protocol against the current HEAD
/// commit. Called whenever the host observes a successful commit-shaped
/// command.
pub fn finalize_commit(repo: &Repository, open: Option<OpenTrace>) -> Result<FinalizeResult, PiError> {
    let head_commit = repo
        .head_commit()
        .ok_or_else(|| PiError::Generic("finalize_commit called with no HEAD commit".to_string()))?;

    let mut diff_service = DiffService::new(repo);
    let mut new_trace_before = None;

    // Step 1: close any open trace against a freshly captured mid-loop
    // snapshot before reading the log, so the commit's note reflects it.
    if let Some(open) = open {
        let mid_snapshot = snapshot::snapshot_working_tree(repo)?;
        let changed = snapshot::changed_paths(repo, &open.before_sha, &mid_snapshot)?;

        if !changed.is_empty() {
            let mut files = HashMap::new();
            for path in &changed {
                let hunks = diff_service.diff(&open.before_sha, &mid_snapshot, path)?;
                let (additions, deletions) = count_changes(&hunks);
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
                    before_sha: open.before_sha.clone(),
                    after_sha: mid_snapshot.clone(),
                    session_id: open.session_id,
                    entry_id: open.entry_id,
                    user_message: open.user_message,
                    assistant_message: None,
                },
                vcs_revision: repo.head_commit(),
                tool: None,
            };
            trace_log::append(repo, &record)?;
        }

        new_trace_before = Some(mid_snapshot);
    }

    // Step 2: restrict to traces that touch at least one committed file.
    let committed_files = snapshot::list_head_files(repo)?;
    let committed_set: HashSet<&String> = committed_files.iter().collect();
    let all_traces = trace_log::read_all(repo)?;
    let relevant: Vec<&TraceRecord> = all_traces
        .iter()
        .filter(|t| t.files.keys().any(|p| committed_set.contains(p)))
        .collect();

    // Step 3-4: resolve attribution per committed file, build the note.
    let relevant_paths: Vec<String> = committed_files
        .iter()
        .filter(|p| relevant.iter().any(|t| t.files.contains_key(*p)))
        .cloned()
        .collect();

    let resolved = crate::attribution::resolve_all(&mut diff_service, &relevant, &relevant_paths, Some(&head_commit))?;

    let contributing_ids: HashSet<&str> = resolved
        .values()
        .flat_map(|ranges| ranges.iter().map(|r| r.trace_id.as_str()))
        .collect();

    let mut note = TraceNote::default();
    for trace in &relevant {
        if !contributing_ids.contains(trace.id.as_str()) {
            continue;
        }
        let mut projected = trace.clone();
        projected.files.retain(|p, _| committed_set.contains(p));
        for (path, entry) in projected.files.iter_mut() {
            if let Some(ranges) = resolved.get(path) {
                entry.ranges = ranges
                    .iter()
                    .filter(|r| r.trace_id == trace.id)
                    .cloned()
                    .collect::<Vec<ResolvedRange>>();
            }
        }
        note.traces.push(projected);
    }
    note.resolved = Some(resolved);

    // Step 5: write the note, canonically encoded so re-finalizing an
    // unchanged commit produces a byte-identical note.
    let encoded = serde_json_canonicalizer::to_string(&note)
        .map_err(|e| PiError::Generic(format!("failed to canonicalize trace note: {}", e)))?;
    refs::notes_add(repo, &head_commit, &encoded)?;

    // Step 6: garbage-collect traces whose files are all clean.
    let dirty = snapshot::dirty_paths(repo)?;
    let mut all_traces = trace_log::read_all(repo)?;
    let to_remove: HashSet<String> = all_traces
        .iter()
        .filter(|t| t.files.keys().all(|p| !dirty.contains(p)))
        .map(|t| t.id.clone())
        .collect();
    if !to_remove.is_empty() {
        trace_log::remove_ids(repo, &to_remove)?;
        all_traces.retain(|t| !to_remove.contains(&t.id));
    }

    // Step 7: keep one protecting ref per surviving referenced snapshot id.
    let mut live_ids = trace_log::referenced_snapshot_ids(&all_traces);
    if let Some(ref tb) = new_trace_before {
        live_ids.insert(tb.clone());
    }
    reconcile_snapshot_refs(repo, &live_ids)?;

    Ok(FinalizeResult { commit_sha: head_commit, trace_before: new_trace_before })
}

/// Invoked synchronously from the installed commit hook when
/// `Config::trace_hook()` is enabled. Writes a raw note with no resolved map
/// so a note exists immediately at commit time, ahead of the host's
/// asynchronous call into `finalize_commit`, which overwrites it in place
/// with full resolution once it runs.
pub fn write_raw_unresolved_note(repo: &Repository) -> Result<(), PiError> {
    let head_commit = repo
        .head_commit()
        .ok_or_else(|| PiError::Generic("write_raw_unresolved_note called with no HEAD commit".to_string()))?;

    let committed_files = snapshot::list_head_files(repo)?;
    let committed_set: HashSet<&String> = committed_files.iter().collect();
    let all_traces = trace_log::read_all(repo)?;
    let relevant: Vec<TraceRecord> = all_traces
        .into_iter()
        .filter(|t| t.files.keys().any(|p| committed_set.contains(p)))
        .collect();

    let note = TraceNote { traces: relevant, resolved: None };
    let encoded = serde_json_canonicalizer::to_string(&note)
        .map_err(|e| PiError::Generic(format!("failed to canonicalize trace note: {}", e)))?;
    refs::notes_add(repo, &head_commit, &encoded)
}

/// The command-shape predicate a host uses to decide whether to invoke
/// `finalize_commit`: matches a plain `git commit`, excluding `commit-tree`,
/// `commit-graph`, `--dry-run`, and `--amend`.
pub fn is_commit_command(args: &[&str]) -> bool {
    let Some(&first) = args.first() else { return false };
    if first != "commit" {
        return false;
    }
    !args[1..].iter().any(|a| matches!(*a, "--dry-run" | "--amend"))
}

fn count_changes(hunks: &crate::git::diff::FileDiff) -> (usize, usize) {
    let mut additions = 0;
    let mut deletions = 0;
    for hunk in hunks {
        match hunk.kind {
            crate::git::diff::HunkKind::Add => additions += hunk.lines.len(),
            crate::git::diff::HunkKind::Delete => deletions += hunk.lines.len(),
            crate::git::diff::HunkKind::Equal => {}
        }
    }
    (additions, deletions)
}

fn reconcile_snapshot_refs(repo: &Repository, live_ids: &HashSet<SnapshotId>) -> Result<(), PiError> {
    let existing = refs::list_refs_with_prefix(repo, TRACE_SHA_REF_PREFIX)?;

    for name in &existing {
        if !live_ids.iter().any(|id| sanitize_ref_component(id) == *name) {
            refs::delete_ref(repo, &format!("{}{}", TRACE_SHA_REF_PREFIX, name))?;
        }
    }

    for id in live_ids {
        let ref_name = format!("{}{}", TRACE_SHA_REF_PREFIX, sanitize_ref_component(id));
        if !refs::ref_exists(repo, &ref_name) {
            refs::update_ref(repo, &ref_name, id)?;
        }
    }

    Ok(())
}
