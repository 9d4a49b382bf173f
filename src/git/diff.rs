use crate::error::PiError;
use crate::git::repository::{Repository, exec_git};
use std::collections::HashMap;

/// Arbitrarily large context width passed to `git diff -U<n>` so every
/// unchanged line is emitted as context. Forward projection in the
/// Attribution Engine requires line-for-line alignment; a narrower context
/// would silently drop unchanged lines from the hunk sequence.
const UNBOUNDED_CONTEXT: u32 = 1_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HunkKind {
    Equal,
    Add,
    Delete,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hunk {
    pub kind: HunkKind,
    pub lines: Vec<String>,
}

/// An ordered sequence of hunks that, applied to the before-version, yields
/// the after-version of one file.
pub type FileDiff = Vec<Hunk>;

/// Parses and caches unified diffs between snapshot pairs. Construct one per
/// long-lived session; repeated lookups for the same `(before, after)` pair
/// reuse the parsed result.
pub struct DiffService<'a> {
    repo: &'a Repository,
    cache: HashMap<(String, String), HashMap<String, FileDiff>>,
}

impl<'a> DiffService<'a> {
    pub fn new(repo: &'a Repository) -> Self {
        DiffService {
            repo,
            cache: HashMap::new(),
        }
    }

    /// Return the ordered hunk sequence for `path` between `before` and
    /// `after`. Empty when the two snapshots are identical, or when `path`
    /// doesn't exist at either end.
    pub fn diff(&mut self, before: &str, after: &str, path: &str) -> Result<FileDiff, PiError> {
        if before == after {
            return Ok(Vec::new());
        }

        let key = (before.to_string(), after.to_string());
        if !self.cache.contains_key(&key) {
            let parsed = fetch_pair_diff(self.repo, before, after)?;
            self.cache.insert(key.clone(), parsed);
        }

        let by_path = self.cache.get(&key).expect("just inserted");
        if let Some(diff) = by_path.get(path) {
            return Ok(diff.clone());
        }

        // `path` did not appear in the diff output: either it doesn't exist
        // at either snapshot, or it is byte-identical between them. In the
        // latter case synthesize a single Equal hunk covering the whole
        // file so forward projection passes the existing attribution
        // through unchanged rather than truncating it.
        match read_blob(self.repo, after, path) {
            Some(content) => Ok(vec![Hunk {
                kind: HunkKind::Equal,
                lines: split_lines(&content),
            }]),
            None => Ok(Vec::new()),
        }
    }
}

fn read_blob(repo: &Repository, snapshot: &str, path: &str) -> Option<String> {
    repo.git(&["show", &format!("{}:{}", snapshot, path)]).ok()
}

fn split_lines(content: &str) -> Vec<String> {
    if content.is_empty() {
        return Vec::new();
    }
    content.lines().map(|l| l.to_string()).collect()
}

fn fetch_pair_diff(
    repo: &Repository,
    before: &str,
    after: &str,
) -> Result<HashMap<String, FileDiff>, PiError> {
    let mut args = repo.global_args_for_exec();
    args.push("diff".to_string());
    args.push("--no-color".to_string());
    args.push(format!("-U{}", UNBOUNDED_CONTEXT));
    args.push(before.to_string());
    args.push(after.to_string());

    let output = exec_git(&args)?;
    let text = String::from_utf8_lossy(&output.stdout).to_string();
    Ok(parse_unified_diff(&text))
}

/// Parse the full output of `git diff -U<n> <a> <b>` covering possibly many
/// files into a per-path hunk sequence.
pub fn parse_unified_diff(text: &str) -> HashMap<String, FileDiff> {
    let mut result = HashMap::new();
    let mut current_path: Option<String> = None;
    let mut current_diff: FileDiff = Vec::new();
    let mut in_hunk_body = false;

    let flush = |result: &mut HashMap<String, FileDiff>,
                 path: &Option<String>,
                 diff: &mut FileDiff| {
        if let Some(p) = path {
            if !diff.is_empty() {
                result.insert(p.clone(), std::mem::take(diff));
            }
        }
        diff.clear();
    };

    for line in text.lines() {
        if let Some(rest) = line.strip_prefix("diff --git ") {
            flush(&mut result, &current_path, &mut current_diff);
            current_path = parse_diff_git_header(rest);
            in_hunk_body = false;
            continue;
        }

        if let Some(path) = line.strip_prefix("--- ") {
            if path.trim() != "/dev/null" {
                current_path = Some(unquote_path(path.trim()));
            }
            in_hunk_body = false;
            continue;
        }

        if let Some(path) = line.strip_prefix("+++ ") {
            if path.trim() != "/dev/null" {
                current_path = Some(unquote_path(path.trim()));
            }
            in_hunk_body = false;
            continue;
        }

        if line.starts_with("@@") {
            in_hunk_body = true;
            continue;
        }

        if !in_hunk_body {
            continue;
        }

        if line == "\\ No newline at end of file" {
            continue;
        }

        if current_path.is_none() {
            continue;
        }

        match line.as_bytes().first() {
            Some(b'+') => push_line(&mut current_diff, HunkKind::Add, &line[1..]),
            Some(b'-') => push_line(&mut current_diff, HunkKind::Delete, &line[1..]),
            Some(b' ') => push_line(&mut current_diff, HunkKind::Equal, &line[1..]),
            _ => {
                // An empty context line is represented as a bare blank line
                // by some git versions; treat it as equal with empty content.
                if line.is_empty() {
                    push_line(&mut current_diff, HunkKind::Equal, "");
                }
            }
        }
    }

    flush(&mut result, &current_path, &mut current_diff);
    result
}

fn push_line(diff: &mut FileDiff, kind: HunkKind, content: &str) {
    if let Some(last) = diff.last_mut() {
        if last.kind == kind {
            last.lines.push(content.to_string());
            return;
        }
    }
    diff.push(Hunk {
        kind,
        lines: vec![content.to_string()],
    });
}

/// `diff --git a/<path> b/<path>` headers are the most reliable file
/// boundary marker (unlike `---`/`+++`, they're always present, even for
/// mode-only changes). Strip the `a/`/`b/` prefixes and unquote.
fn parse_diff_git_header(rest: &str) -> Option<String> {
    // rest looks like: "a/<path> b/<path>" (paths may be quoted and contain
    // spaces, so split on the unambiguous " b/" marker isn't fully general,
    // but is sufficient since the b/ path is authoritative and repeated in
    // the subsequent +++ line which we also parse).
    let b_marker = " b/";
    let idx = rest.rfind(b_marker)?;
    let b_path = &rest[idx + b_marker.len()..];
    Some(unquote_path(b_path.trim()))
}

/// Undo git's quoting of paths containing non-ASCII or special bytes:
/// surrounding double quotes plus backslash escapes for `\t`, `\n`, `\r`,
/// `"`, `\\`, and octal byte escapes `\NNN`.
pub fn unquote_path(raw: &str) -> String {
    let raw = raw.strip_prefix("a/").or_else(|| raw.strip_prefix("b/")).unwrap_or(raw);

    if !(raw.starts_with('"') && raw.ends_with('"') && raw.len() >= 2) {
        return raw.to_string();
    }

    let inner = &raw[1..raw.len() - 1];
    let bytes = inner.as_bytes();
    let mut out: Vec<u8> = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' && i + 1 < bytes.len() {
            match bytes[i + 1] {
                b't' => {
                    out.push(b'\t');
                    i += 2;
                }
                b'n' => {
                    out.push(b'\n');
                    i += 2;
                }
                b'r' => {
                    out.push(b'\r');
                    i += 2;
                }
                b'"' => {
                    out.push(b'"');
                    i += 2;
                }
                b'\\' => {
                    out.push(b'\\');
                    i += 2;
                }
                o1 @ b'0'..=b'7' => {
                    // octal escape: \NNN (1-3 octal digits)
                    let mut val = (o1 - b'0') as u32;
                    let mut consumed = 2;
                    for k in 0..2 {
                        if let Some(&b @ b'0'..=b'7') = bytes.get(i + 2 + k) {
                            val = val * 8 + (b - b'0') as u32;
                            consumed += 1;
                        } else {
                            break;
                        }
                    }
                    out.push(val as u8);
                    i += consumed;
                }
                other => {
                    out.push(b'\\');
                    out.push(other);
                    i += 2;
                }
            }
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8_lossy(&out).to_string()
}
