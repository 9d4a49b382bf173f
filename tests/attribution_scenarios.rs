use pi_trace::attribution::{apply, compute_attribution, resolve_ranges};
use pi_trace::git::diff::{DiffService, Hunk, HunkKind};
use pi_trace::git::test_utils::TmpRepo;
use pi_trace::model::{FileEntry, ResolvedRange, TraceMetadata, TraceRecord};
use std::collections::HashMap;

fn hunk(kind: HunkKind, lines: &[&str]) -> Hunk {
    Hunk { kind, lines: lines.iter().map(|s| s.to_string()).collect() }
}

fn trace(id: &str, before: &str, after: &str) -> TraceRecord {
    TraceRecord {
        id: id.to_string(),
        timestamp: format!("2026-01-01T00:00:{:02}.000Z", id.len()),
        files: HashMap::from([("f.txt".to_string(), FileEntry::default())]),
        metadata: TraceMetadata {
            before_sha: before.to_string(),
            after_sha: after.to_string(),
            session_id: "s1".to_string(),
            entry_id: "e1".to_string(),
            user_message: "edit".to_string(),
            assistant_message: None,
        },
        vcs_revision: None,
        tool: None,
    }
}

#[test]
fn scenario_1_single_prompt_adds_three_lines() {
    let before: pi_trace::model::AttributionVector = Vec::new();
    let hunks = vec![hunk(HunkKind::Add, &["a", "b", "c"])];
    let vector = apply(&before, &hunks, Some("T1"));
    assert_eq!(vector, vec![Some("T1".into()), Some("T1".into()), Some("T1".into())]);

    let ranges = resolve_ranges(&vector);
    assert_eq!(ranges, vec![ResolvedRange { start: 1, end: 3, trace_id: "T1".into() }]);
}

#[test]
fn scenario_2_two_sequential_prompts_no_gap() {
    let empty: pi_trace::model::AttributionVector = Vec::new();
    let t1_hunks = vec![hunk(HunkKind::Add, &["a", "b", "c"])];
    let after_t1 = apply(&empty, &t1_hunks, Some("T1"));

    let t2_hunks = vec![hunk(HunkKind::Equal, &["a", "b"]), hunk(HunkKind::Add, &["x"]), hunk(HunkKind::Equal, &["c"])];
    let after_t2 = apply(&after_t1, &t2_hunks, Some("T2"));

    assert_eq!(
        after_t2,
        vec![Some("T1".into()), Some("T1".into()), Some("T2".into()), Some("T1".into())]
    );

    let ranges = resolve_ranges(&after_t2);
    assert_eq!(
        ranges,
        vec![
            ResolvedRange { start: 1, end: 2, trace_id: "T1".into() },
            ResolvedRange { start: 3, end: 3, trace_id: "T2".into() },
            ResolvedRange { start: 4, end: 4, trace_id: "T1".into() },
        ]
    );
}

#[test]
fn scenario_3_human_edit_in_the_gap_is_nullified() {
    let empty: pi_trace::model::AttributionVector = Vec::new();
    let t1_hunks = vec![hunk(HunkKind::Add, &["a", "b", "c"])];
    let after_t1 = apply(&empty, &t1_hunks, Some("T1"));

    // Gap: human replaces "b" with "B".
    let gap_hunks = vec![hunk(HunkKind::Equal, &["a"]), hunk(HunkKind::Delete, &["b"]), hunk(HunkKind::Add, &["B"]), hunk(HunkKind::Equal, &["c"])];
    let after_gap = apply(&after_t1, &gap_hunks, None);
    assert_eq!(after_gap, vec![Some("T1".into()), None, Some("T1".into())]);

    // T2 itself touches nothing (identity diff would be skipped by DiffService,
    // but Apply with an empty hunk list must be a pure pass-through).
    let after_t2 = apply(&after_gap, &Vec::new(), Some("T2"));
    assert_eq!(after_t2, after_gap);

    let ranges = resolve_ranges(&after_t2);
    assert_eq!(
        ranges,
        vec![
            ResolvedRange { start: 1, end: 1, trace_id: "T1".into() },
            ResolvedRange { start: 3, end: 3, trace_id: "T1".into() },
        ]
    );
}

#[test]
fn compute_attribution_with_real_diffs_handles_gap_and_terminal() {
    let tmp = TmpRepo::new().expect("tmp repo");
    tmp.write_file("f.txt", "").unwrap();
    let s0 = tmp.commit_with_message("empty").unwrap();

    tmp.write_file("f.txt", "a\nb\nc\n").unwrap();
    let s1 = tmp.commit_with_message("t1 writes abc").unwrap();

    // Gap: a human changes b -> B between traces.
    tmp.write_file("f.txt", "a\nB\nc\n").unwrap();
    let s2 = tmp.commit_with_message("human edits b to B").unwrap();

    tmp.write_file("f.txt", "a\nB\nc\nd\n").unwrap();
    let s3 = tmp.commit_with_message("t2 appends d").unwrap();

    let t1 = trace("T1", &s0, &s1);
    let mut t2 = trace("T2", &s2, &s3);
    t2.id = "T2".to_string();

    let mut diff_service = DiffService::new(tmp.pi_repo());
    let traces = vec![&t1, &t2];
    let vector = compute_attribution(&mut diff_service, &traces, "f.txt", Some(&s3)).expect("attribution ok");

    assert_eq!(
        vector,
        vec![Some("T1".into()), None, Some("T1".into()), Some("T2".into())]
    );
}

#[test]
fn empty_trace_sequence_with_terminal_returns_empty_vector() {
    let tmp = TmpRepo::new().expect("tmp repo");
    let sha = tmp.commit_with_message("init").unwrap();

    let mut diff_service = DiffService::new(tmp.pi_repo());
    let vector = compute_attribution(&mut diff_service, &[], "f.txt", Some(&sha)).expect("ok");
    assert!(vector.is_empty());
}
