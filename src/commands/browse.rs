use pi_trace::error::PiError;
use pi_trace::git::diff::{DiffService, HunkKind};
use pi_trace::git::repository::Repository;
use pi_trace::trace_log;
use std::io::{self, Write};

/// "browse traces": list local trace records newest-first, let the
/// collaborator pick one, then print its per-file diff.
pub fn run(repo: &Repository) -> Result<(), PiError> {
    let mut traces = trace_log::read_all(repo)?;
    if traces.is_empty() {
        return Err(PiError::Generic("no local trace records".to_string()));
    }
    traces.sort_by(|a, b| b.timestamp.as_str().cmp(a.timestamp.as_str()));

    for (i, trace) in traces.iter().enumerate() {
        println!(
            "{:>3}  {}  {}  {}",
            i + 1,
            trace.timestamp,
            &trace.id[..8.min(trace.id.len())],
            truncate(&trace.metadata.user_message, 70)
        );
    }

    print!("pick a trace (1-{}): ", traces.len());
    io::stdout().flush().ok();
    let mut input = String::new();
    io::stdin()
        .read_line(&mut input)
        .map_err(PiError::IoError)?;
    let choice: usize = input
        .trim()
        .parse()
        .map_err(|_| PiError::Generic(format!("malformed selection: {}", input.trim())))?;
    if choice == 0 || choice > traces.len() {
        return Err(PiError::Generic(format!("selection out of range: {}", choice)));
    }

    let trace = &traces[choice - 1];
    let mut diff_service = DiffService::new(repo);
    for path in trace.files.keys() {
        let hunks = diff_service.diff(&trace.metadata.before_sha, &trace.metadata.after_sha, path)?;
        println!("--- {}", path);
        for hunk in hunks {
            let prefix = match hunk.kind {
                HunkKind::Equal => ' ',
                HunkKind::Add => '+',
                HunkKind::Delete => '-',
            };
            for line in hunk.lines {
                println!("{}{}", prefix, line);
            }
        }
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
