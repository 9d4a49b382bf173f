use crate::error::PiError;
use crate::git::diff::{DiffService, FileDiff, HunkKind};
use crate::model::{AttributionEntry, AttributionVector, ResolvedRange, TraceRecord};
use std::collections::HashMap;

/// Project `a` through `hunks`, attributing newly-added lines to `tag` (or
/// leaving them unattributed when `tag` is `None`, the gap-nullification
/// case). Preserves the invariant that the result's length equals the number
/// of equal+add lines in `hunks`.
pub fn apply(a: &AttributionVector, hunks: &FileDiff, tag: Option<&str>) -> AttributionVector {
    let mut result = Vec::with_capacity(a.len());
    let mut src_idx = 0usize;

    for hunk in hunks {
        match hunk.kind {
            HunkKind::Equal => {
                for _ in 0..hunk.lines.len() {
                    let entry: AttributionEntry = a.get(src_idx).cloned().unwrap_or(None);
                    result.push(entry);
                    src_idx += 1;
                }
            }
            HunkKind::Delete => {
                src_idx += hunk.lines.len();
            }
            HunkKind::Add => {
                for _ in 0..hunk.lines.len() {
                    result.push(tag.map(|s| s.to_string()));
                }
            }
        }
    }

    result
}

/// Run the full forward-projection algorithm for one file across an ordered
/// sequence of traces, optionally followed by a terminal gap to `terminal`.
pub fn compute_attribution(
    diff_service: &mut DiffService,
    traces: &[&TraceRecord],
    path: &str,
    terminal: Option<&str>,
) -> Result<AttributionVector, PiError> {
    let mut a: AttributionVector = Vec::new();
    let mut prev_after: Option<String> = None;

    for trace in traces {
        if let Some(prev) = &prev_after {
            if prev != &trace.metadata.before_sha {
                let gap = diff_service.diff(prev, &trace.metadata.before_sha, path)?;
                a = apply(&a, &gap, None);
            }
        }

        let trace_diff = diff_service.diff(&trace.metadata.before_sha, &trace.metadata.after_sha, path)?;
        a = apply(&a, &trace_diff, Some(&trace.id));
        prev_after = Some(trace.metadata.after_sha.clone());
    }

    if let (Some(terminal), Some(prev)) = (terminal, &prev_after) {
        if prev != terminal {
            let gap = diff_service.diff(prev, terminal, path)?;
            a = apply(&a, &gap, None);
        }
    }

    Ok(a)
}

/// Collapse an AttributionVector into maximal runs of a single trace id,
/// 1-based inclusive. Null runs are dropped.
pub fn resolve_ranges(a: &AttributionVector) -> Vec<ResolvedRange> {
    let mut ranges = Vec::new();
    let mut i = 0;

    while i < a.len() {
        match &a[i] {
            Some(trace_id) => {
                let start = i;
                let mut j = i + 1;
                while j < a.len() && a[j].as_deref() == Some(trace_id.as_str()) {
                    j += 1;
                }
                ranges.push(ResolvedRange {
                    start: start + 1,
                    end: j,
                    trace_id: trace_id.clone(),
                });
                i = j;
            }
            None => i += 1,
        }
    }

    ranges
}

/// Run attribution and range resolution across every path touched by
/// `traces`, against a common terminal snapshot. Used by the Commit
/// Finalizer, which needs a resolved map over the whole committed file set.
pub fn resolve_all(
    diff_service: &mut DiffService,
    traces: &[&TraceRecord],
    paths: &[String],
    terminal: Option<&str>,
) -> Result<HashMap<String, Vec<ResolvedRange>>, PiError> {
    let mut resolved = HashMap::new();

    for path in paths {
        let path_traces: Vec<&TraceRecord> = traces
            .iter()
            .copied()
            .filter(|t| t.files.contains_key(path))
            .collect();
        if path_traces.is_empty() {
            continue;
        }

        let vector = compute_attribution(diff_service, &path_traces, path, terminal)?;
        let ranges = resolve_ranges(&vector);
        if !ranges.is_empty() {
            resolved.insert(path.clone(), ranges);
        }
    }

    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::diff::Hunk;

    fn equal(lines: &[&str]) -> Hunk {
        Hunk {
            kind: HunkKind::Equal,
            lines: lines.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn add(lines: &[&str]) -> Hunk {
        Hunk {
            kind: HunkKind::Add,
            lines: lines.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn delete(lines: &[&str]) -> Hunk {
        Hunk {
            kind: HunkKind::Delete,
            lines: lines.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn apply_first_trace_add_only() {
        let a: AttributionVector = Vec::new();
        let hunks = vec![add(&["one", "two"])];
        let result = apply(&a, &hunks, Some("trace-1"));
        assert_eq!(result, vec![Some("trace-1".to_string()), Some("trace-1".to_string())]);
    }

    #[test]
    fn apply_preserves_equal_lines_and_advances_past_deletes() {
        let a: AttributionVector = vec![Some("t0".to_string()), Some("t0".to_string()), None];
        let hunks = vec![equal(&["a"]), delete(&["b"]), add(&["B"]), equal(&["c"])];
        let result = apply(&a, &hunks, Some("t1"));
        assert_eq!(
            result,
            vec![Some("t0".to_string()), Some("t1".to_string()), None]
        );
    }

    #[test]
    fn apply_gap_nullifies_with_none_tag() {
        let a: AttributionVector = vec![Some("t0".to_string())];
        let hunks = vec![equal(&["a"]), add(&["b"])];
        let result = apply(&a, &hunks, None);
        assert_eq!(result, vec![Some("t0".to_string()), None]);
    }

    #[test]
    fn resolve_ranges_collects_maximal_runs() {
        let a: AttributionVector = vec![
            None,
            Some("t1".to_string()),
            Some("t1".to_string()),
            None,
            Some("t2".to_string()),
        ];
        let ranges = resolve_ranges(&a);
        assert_eq!(
            ranges,
            vec![
                ResolvedRange { start: 2, end: 3, trace_id: "t1".to_string() },
                ResolvedRange { start: 5, end: 5, trace_id: "t2".to_string() },
            ]
        );
    }

    #[test]
    fn resolve_ranges_empty_vector_yields_no_ranges() {
        assert!(resolve_ranges(&Vec::new()).is_empty());
    }
}
