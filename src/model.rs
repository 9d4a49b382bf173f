use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Content-addressed identifier of a working-tree state: a git tree object id.
pub type SnapshotId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Contributor {
    Ai,
    Human,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedRange {
    pub start: usize,
    pub end: usize,
    pub trace_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    pub contributor: Option<ContributorTag>,
    #[serde(default)]
    pub additions: usize,
    #[serde(default)]
    pub deletions: usize,
    #[serde(default)]
    pub ranges: Vec<ResolvedRange>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContributorTag {
    pub kind: Contributor,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolInfo {
    pub name: String,
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceMetadata {
    pub before_sha: SnapshotId,
    pub after_sha: SnapshotId,
    pub session_id: String,
    pub entry_id: String,
    pub user_message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assistant_message: Option<String>,
}

/// The atomic unit of attribution: one agent turn's effect on the working
/// tree, pending or already folded into a commit note.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceRecord {
    pub id: String,
    pub timestamp: String,
    pub files: HashMap<String, FileEntry>,
    pub metadata: TraceMetadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vcs_revision: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool: Option<ToolInfo>,
}

/// One slot of an AttributionVector: `None` means no trace authored this
/// line, `Some(trace_id)` attributes it.
pub type AttributionEntry = Option<String>;
pub type AttributionVector = Vec<AttributionEntry>;

/// Sidecar recorded on a commit under the trace notes reference. `resolved`
/// is `None` for a raw note written by the commit hook before the authoring
/// process has resolved attribution for this commit; such a note is later
/// overwritten in place with `Some(..)` once resolution runs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceNote {
    pub traces: Vec<TraceRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved: Option<HashMap<String, Vec<ResolvedRange>>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointInfo {
    pub name: String,
    pub session_id: String,
    pub timestamp_ms: u64,
    pub entry_id: String,
}
