use crate::attribution::compute_attribution;
use crate::error::PiError;
use crate::git::blame::{self, BlameLine};
use crate::git::diff::DiffService;
use crate::git::refs;
use crate::git::repository::Repository;
use crate::git::snapshot;
use crate::model::TraceNote;
use std::collections::HashMap;

/// The outcome of classifying one blamed line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attribution {
    /// No commit note covers this line; a human wrote it.
    Human,
    /// A note exists for the owning commit but has not been resolved yet.
    Unresolved,
    /// A resolved note exists but does not cover this line.
    Untraced,
    /// No trace touches this file locally; predates the current session.
    PreSession,
    Attributed(AttributedLine),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributedLine {
    pub trace_id: String,
    pub user_message: String,
    pub assistant_message: Option<String>,
    pub model_id: Option<String>,
    pub timestamp: String,
    pub commit_sha: Option<String>,
    pub session_id: String,
    pub entry_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlamedLine {
    pub final_line: usize,
    pub content: String,
    pub attribution: Attribution,
}

/// Answer a blame query for a path as committed at `revision`.
pub fn committed_blame(
    repo: &Repository,
    revision: &str,
    path: &str,
    range: Option<(usize, usize)>,
) -> Result<Vec<BlamedLine>, PiError> {
    let lines = blame::blame_lines(repo, revision, path, range)?;
    let mut note_cache: HashMap<String, Option<TraceNote>> = HashMap::new();

    let mut result = Vec::with_capacity(lines.len());
    for line in lines {
        let note = note_cache
            .entry(line.commit_sha.clone())
            .or_insert_with(|| load_note(repo, &line.commit_sha))
            .clone();
        let attribution = classify_committed(note.as_ref(), &line, &line.commit_sha);
        result.push(BlamedLine { final_line: line.final_line, content: line.content.clone(), attribution });
    }
    Ok(result)
}

fn load_note(repo: &Repository, commit_sha: &str) -> Option<TraceNote> {
    let raw = refs::notes_show(repo, commit_sha)?;
    serde_json::from_str(&raw).ok()
}

fn classify_committed(note: Option<&TraceNote>, line: &BlameLine, commit_sha: &str) -> Attribution {
    let note = match note {
        None => return Attribution::Human,
        Some(n) => n,
    };

    let resolved = match &note.resolved {
        None => return Attribution::Unresolved,
        Some(r) => r,
    };

    let ranges = match resolved.get(&line.path) {
        None => return Attribution::Untraced,
        Some(r) => r,
    };

    let covering = ranges.iter().find(|r| line.orig_line >= r.start && line.orig_line <= r.end);
    let range = match covering {
        None => return Attribution::Untraced,
        Some(r) => r,
    };

    let trace = note.traces.iter().find(|t| t.id == range.trace_id);
    match trace {
        None => Attribution::Untraced,
        Some(t) => Attribution::Attributed(AttributedLine {
            trace_id: t.id.clone(),
            user_message: t.metadata.user_message.clone(),
            assistant_message: t.metadata.assistant_message.clone(),
            model_id: t.files.get(&line.path).and_then(|f| f.contributor.as_ref()).and_then(|c| c.model_id.clone()),
            timestamp: t.timestamp.clone(),
            commit_sha: Some(commit_sha.to_string()),
            session_id: t.metadata.session_id.clone(),
            entry_id: t.metadata.entry_id.clone(),
        }),
    }
}

/// Answer a blame query for the current, possibly-dirty working tree.
pub fn uncommitted_blame(repo: &Repository, path: &str, range: Option<(usize, usize)>) -> Result<Vec<BlamedLine>, PiError> {
    let all_traces = crate::trace_log::read_all(repo)?;
    let mut path_traces: Vec<&crate::model::TraceRecord> =
        all_traces.iter().filter(|t| t.files.contains_key(path)).collect();
    path_traces.sort_by(|a, b| a.timestamp.as_str().cmp(b.timestamp.as_str()));

    let content = std::fs::read_to_string(repo.workdir().join(path)).unwrap_or_default();
    let all_lines: Vec<String> = if content.is_empty() { Vec::new() } else { content.lines().map(|l| l.to_string()).collect() };

    if path_traces.is_empty() {
        let (start, end) = resolve_range(range, all_lines.len());
        return Ok((start..=end)
            .filter(|n| *n <= all_lines.len())
            .map(|n| BlamedLine {
                final_line: n,
                content: all_lines.get(n - 1).cloned().unwrap_or_default(),
                attribution: Attribution::PreSession,
            })
            .collect());
    }

    let mut diff_service = DiffService::new(repo);
    let working_snapshot = snapshot::snapshot_working_tree(repo)?;
    let last_after = path_traces.last().map(|t| t.metadata.after_sha.clone());
    let terminal = if last_after.as_deref() != Some(working_snapshot.as_str()) {
        Some(working_snapshot.as_str().to_string())
    } else {
        None
    };

    let vector = compute_attribution(&mut diff_service, &path_traces, path, terminal.as_deref())?;

    let (start, end) = resolve_range(range, vector.len());
    let mut result = Vec::new();
    for n in start..=end {
        if n > vector.len() {
            break;
        }
        let entry = &vector[n - 1];
        let attribution = match entry {
            None => Attribution::PreSession,
            Some(trace_id) => match path_traces.iter().find(|t| &t.id == trace_id) {
                None => Attribution::Untraced,
                Some(t) => Attribution::Attributed(AttributedLine {
                    trace_id: t.id.clone(),
                    user_message: t.metadata.user_message.clone(),
                    assistant_message: t.metadata.assistant_message.clone(),
                    model_id: t.files.get(path).and_then(|f| f.contributor.as_ref()).and_then(|c| c.model_id.clone()),
                    timestamp: t.timestamp.clone(),
                    commit_sha: None,
                    session_id: t.metadata.session_id.clone(),
                    entry_id: t.metadata.entry_id.clone(),
                }),
            },
        };
        result.push(BlamedLine { final_line: n, content: all_lines.get(n - 1).cloned().unwrap_or_default(), attribution });
    }

    Ok(result)
}

fn resolve_range(range: Option<(usize, usize)>, len: usize) -> (usize, usize) {
    range.unwrap_or((1, len.max(1)))
}
