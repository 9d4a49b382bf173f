use crate::error::PiError;
use crate::git::repository::Repository;
use crate::model::{SnapshotId, TraceRecord};
use crate::utils::debug_log;
use std::collections::HashSet;
use std::fs;
use std::io::Write;
use std::path::PathBuf;

/// Maximum number of trace records retained locally. Enforced on append, not
/// on read, so an externally-grown file is still fully read back once and
/// trimmed on the next write.
pub const TRACE_CAP: usize = 100;

const TRACE_LOG_RELATIVE_PATH: &str = ".pi-trace/traces.jsonl";

pub fn trace_log_path(repo: &Repository) -> PathBuf {
    repo.workdir().join(TRACE_LOG_RELATIVE_PATH)
}

/// Read every well-formed record in file order. Malformed lines are logged
/// and dropped rather than aborting the read.
pub fn read_all(repo: &Repository) -> Result<Vec<TraceRecord>, PiError> {
    let path = trace_log_path(repo);
    let contents = match fs::read_to_string(&path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(PiError::IoError(e)),
    };

    let mut records = Vec::new();
    for (idx, line) in contents.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<TraceRecord>(line) {
            Ok(record) => records.push(record),
            Err(e) => debug_log(&format!("skipping malformed trace record at line {}: {}", idx + 1, e)),
        }
    }
    Ok(records)
}

/// Append `record`, trimming the oldest records so the post-write count never
/// exceeds `TRACE_CAP`.
pub fn append(repo: &Repository, record: &TraceRecord) -> Result<(), PiError> {
    let mut existing = read_all(repo)?;
    existing.push(record.clone());
    if existing.len() > TRACE_CAP {
        let drop_count = existing.len() - TRACE_CAP;
        existing.drain(0..drop_count);
    }
    write_all(repo, &existing)
}

/// Remove every record whose id is in `ids`, rewriting the file.
pub fn remove_ids(repo: &Repository, ids: &HashSet<String>) -> Result<(), PiError> {
    let existing = read_all(repo)?;
    let remaining: Vec<TraceRecord> = existing.into_iter().filter(|r| !ids.contains(&r.id)).collect();
    write_all(repo, &remaining)
}

/// Every snapshot id referenced as a `before_sha`/`after_sha` of any record
/// currently in the log, for reference-protection bookkeeping.
pub fn referenced_snapshot_ids(records: &[TraceRecord]) -> HashSet<SnapshotId> {
    let mut ids = HashSet::new();
    for record in records {
        ids.insert(record.metadata.before_sha.clone());
        ids.insert(record.metadata.after_sha.clone());
    }
    ids
}

fn write_all(repo: &Repository, records: &[TraceRecord]) -> Result<(), PiError> {
    let path = trace_log_path(repo);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut buf = String::new();
    for record in records {
        let line = serde_json::to_string(record)?;
        buf.push_str(&line);
        buf.push('\n');
    }

    let tmp_path = path.with_extension("jsonl.tmp");
    {
        let mut f = fs::File::create(&tmp_path)?;
        f.write_all(buf.as_bytes())?;
    }
    fs::rename(&tmp_path, &path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::test_utils::TmpRepo;
    use crate::model::{FileEntry, TraceMetadata};
    use std::collections::HashMap;

    fn sample_record(id: &str, before: &str, after: &str) -> TraceRecord {
        TraceRecord {
            id: id.to_string(),
            timestamp: "2026-01-01T00:00:00.000Z".to_string(),
            files: HashMap::from([("a.txt".to_string(), FileEntry::default())]),
            metadata: TraceMetadata {
                before_sha: before.to_string(),
                after_sha: after.to_string(),
                session_id: "session-1".to_string(),
                entry_id: "entry-1".to_string(),
                user_message: "do a thing".to_string(),
                assistant_message: None,
            },
            vcs_revision: None,
            tool: None,
        }
    }

    #[test]
    fn append_and_read_round_trip() {
        let tmp = TmpRepo::new().expect("tmp repo");
        tmp.commit_with_message("init").unwrap();
        let repo = tmp.pi_repo();

        append(repo, &sample_record("t1", "s0", "s1")).unwrap();
        append(repo, &sample_record("t2", "s1", "s2")).unwrap();

        let records = read_all(repo).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].id, "t1");
        assert_eq!(records[1].id, "t2");
    }

    #[test]
    fn append_enforces_cap() {
        let tmp = TmpRepo::new().expect("tmp repo");
        tmp.commit_with_message("init").unwrap();
        let repo = tmp.pi_repo();

        for i in 0..(TRACE_CAP + 5) {
            append(repo, &sample_record(&format!("t{}", i), "s0", "s1")).unwrap();
        }

        let records = read_all(repo).unwrap();
        assert_eq!(records.len(), TRACE_CAP);
        assert_eq!(records[0].id, "t5");
        assert_eq!(records[TRACE_CAP - 1].id, format!("t{}", TRACE_CAP + 4));
    }

    #[test]
    fn malformed_lines_are_skipped() {
        let tmp = TmpRepo::new().expect("tmp repo");
        tmp.commit_with_message("init").unwrap();
        let repo = tmp.pi_repo();

        let path = trace_log_path(repo);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "not json\n{\"id\":\"t1\"}\n").unwrap();

        let records = read_all(repo).unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn remove_ids_filters_matching_records() {
        let tmp = TmpRepo::new().expect("tmp repo");
        tmp.commit_with_message("init").unwrap();
        let repo = tmp.pi_repo();

        append(repo, &sample_record("t1", "s0", "s1")).unwrap();
        append(repo, &sample_record("t2", "s1", "s2")).unwrap();

        remove_ids(repo, &HashSet::from(["t1".to_string()])).unwrap();
        let records = read_all(repo).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, "t2");
    }

    #[test]
    fn referenced_snapshot_ids_collects_both_ends() {
        let records = vec![sample_record("t1", "s0", "s1"), sample_record("t2", "s1", "s2")];
        let ids = referenced_snapshot_ids(&records);
        assert_eq!(ids, HashSet::from(["s0".to_string(), "s1".to_string(), "s2".to_string()]));
    }
}
