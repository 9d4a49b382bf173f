use crate::error::PiError;
use crate::git::diff::unquote_path;
use crate::git::repository::Repository;
use regex::Regex;
use std::sync::OnceLock;

/// One output line of `git blame --line-porcelain`, reduced to the fields the
/// Blame Service needs: which commit introduced it, its line numbers at the
/// original and final revision, the path it lived at (relevant across file
/// moves, though this crate never invokes blame with rename detection), and
/// its content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlameLine {
    pub commit_sha: String,
    pub orig_line: usize,
    pub final_line: usize,
    pub path: String,
    pub content: String,
}

fn header_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^([0-9a-f]{40}) (\d+) (\d+)(?: \d+)?$").expect("valid regex"))
}

/// Run native blame over `path` as of `revision`, optionally bounded to
/// `[start, end]` (1-based, inclusive). Returns one `BlameLine` per line in
/// the requested range, in final-line order.
pub fn blame_lines(
    repo: &Repository,
    revision: &str,
    path: &str,
    range: Option<(usize, usize)>,
) -> Result<Vec<BlameLine>, PiError> {
    let mut args: Vec<String> = vec!["blame".to_string(), "--line-porcelain".to_string()];
    if let Some((start, end)) = range {
        args.push("-L".to_string());
        args.push(format!("{},{}", start, end));
    }
    args.push(revision.to_string());
    args.push("--".to_string());
    args.push(path.to_string());

    let arg_refs: Vec<&str> = args.iter().map(|s| s.as_str()).collect();
    let output = repo.git(&arg_refs)?;
    Ok(parse_line_porcelain(&output, path))
}

/// Parse the full text of `git blame --line-porcelain`. `default_path` is
/// used for lines whose commit's path was already shown earlier in the
/// output and so carries no `filename` line in this occurrence.
pub fn parse_line_porcelain(text: &str, default_path: &str) -> Vec<BlameLine> {
    let mut result = Vec::new();
    let mut lines = text.lines().peekable();

    let mut pending_sha = String::new();
    let mut pending_orig = 0usize;
    let mut pending_final = 0usize;
    let mut last_path_for_sha: std::collections::HashMap<String, String> = std::collections::HashMap::new();

    while let Some(line) = lines.next() {
        if let Some(caps) = header_re().captures(line) {
            pending_sha = caps[1].to_string();
            pending_orig = caps[2].parse().unwrap_or(0);
            pending_final = caps[3].parse().unwrap_or(0);
            continue;
        }

        if let Some(raw_path) = line.strip_prefix("filename ") {
            let path = unquote_path(raw_path.trim());
            last_path_for_sha.insert(pending_sha.clone(), path);
            continue;
        }

        if let Some(content) = line.strip_prefix('\t') {
            let path = last_path_for_sha
                .get(&pending_sha)
                .cloned()
                .unwrap_or_else(|| default_path.to_string());
            result.push(BlameLine {
                commit_sha: pending_sha.clone(),
                orig_line: pending_orig,
                final_line: pending_final,
                path,
                content: content.to_string(),
            });
            continue;
        }

        // Any other porcelain metadata line (author, committer, summary,
        // previous, boundary) carries no information this crate needs.
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::test_utils::TmpRepo;

    #[test]
    fn parse_line_porcelain_single_commit() {
        let text = "\
aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa 1 1 2
author Test User
author-mail <test@example.com>
author-time 1700000000
author-tz +0000
committer Test User
committer-mail <test@example.com>
committer-time 1700000000
committer-tz +0000
summary initial
filename src/lib.rs
\tfn main() {
aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa 2 2
\t}
";
        let parsed = parse_line_porcelain(text, "src/lib.rs");
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].commit_sha, "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa");
        assert_eq!(parsed[0].final_line, 1);
        assert_eq!(parsed[0].content, "fn main() {");
        assert_eq!(parsed[0].path, "src/lib.rs");
        assert_eq!(parsed[1].final_line, 2);
        assert_eq!(parsed[1].path, "src/lib.rs");
    }

    #[test]
    fn blame_lines_on_real_repo() {
        let tmp = TmpRepo::new().expect("tmp repo");
        tmp.write_file("a.txt", "one\ntwo\nthree\n").unwrap();
        let sha = tmp.commit_with_message("add a.txt").expect("commit");

        let lines = blame_lines(tmp.pi_repo(), "HEAD", "a.txt", None).expect("blame ok");
        assert_eq!(lines.len(), 3);
        for line in &lines {
            assert_eq!(line.commit_sha, sha);
        }
        assert_eq!(lines[0].content, "one");
        assert_eq!(lines[2].content, "three");
    }

    #[test]
    fn blame_lines_respects_range() {
        let tmp = TmpRepo::new().expect("tmp repo");
        tmp.write_file("a.txt", "one\ntwo\nthree\n").unwrap();
        tmp.commit_with_message("add a.txt").expect("commit");

        let lines = blame_lines(tmp.pi_repo(), "HEAD", "a.txt", Some((2, 2))).expect("blame ok");
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].content, "two");
        assert_eq!(lines[0].final_line, 2);
    }
}
