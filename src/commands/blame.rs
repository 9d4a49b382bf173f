use pi_trace::blame_service::{self, Attribution};
use pi_trace::error::PiError;
use pi_trace::git::repository::Repository;

/// Parse `startLine` or `startLine-endLine` into an inclusive 1-based range.
fn parse_range(raw: &str) -> Result<(usize, usize), PiError> {
    match raw.split_once('-') {
        Some((start, end)) => {
            let start: usize = start.parse().map_err(|_| PiError::Generic(format!("malformed range: {}", raw)))?;
            let end: usize = end.parse().map_err(|_| PiError::Generic(format!("malformed range: {}", raw)))?;
            if start == 0 || end < start {
                return Err(PiError::Generic(format!("malformed range: {}", raw)));
            }
            Ok((start, end))
        }
        None => {
            let line: usize = raw.parse().map_err(|_| PiError::Generic(format!("malformed range: {}", raw)))?;
            if line == 0 {
                return Err(PiError::Generic(format!("malformed range: {}", raw)));
            }
            Ok((line, line))
        }
    }
}

/// Auto-detects whether `file` is clean or dirty relative to HEAD and routes
/// to the matching Blame Service path.
pub fn run(repo: &Repository, file: &str, range_arg: Option<&str>) -> Result<(), PiError> {
    let range = range_arg.map(parse_range).transpose()?;

    let dirty = pi_trace::git::snapshot::dirty_paths(repo)?;
    let lines = if dirty.contains(file) {
        blame_service::uncommitted_blame(repo, file, range)?
    } else {
        blame_service::committed_blame(repo, "HEAD", file, range)?
    };

    if lines.is_empty() {
        return Err(PiError::Generic(format!("no blame output for {}", file)));
    }

    for line in lines {
        let tag = match &line.attribution {
            Attribution::Human => "human".to_string(),
            Attribution::Unresolved => "unresolved".to_string(),
            Attribution::Untraced => "untraced".to_string(),
            Attribution::PreSession => "pre-session".to_string(),
            Attribution::Attributed(a) => format!("ai:{} \"{}\"", &a.trace_id[..8.min(a.trace_id.len())], truncate(&a.user_message, 60)),
        };
        println!("{:>6}  {:<28}  {}", line.final_line, tag, line.content);
    }

    Ok(())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        format!("{}…", s.chars().take(max).collect::<String>())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_range_single_line() {
        assert_eq!(parse_range("5").unwrap(), (5, 5));
    }

    #[test]
    fn parse_range_bounds() {
        assert_eq!(parse_range("3-7").unwrap(), (3, 7));
    }

    #[test]
    fn parse_range_rejects_inverted() {
        assert!(parse_range("7-3").is_err());
    }

    #[test]
    fn parse_range_rejects_garbage() {
        assert!(parse_range("abc").is_err());
    }
}
