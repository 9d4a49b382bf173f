mod commands;

use clap::{Parser, Subcommand};
use pi_trace::git::repository::Repository;

#[derive(Parser)]
#[command(name = "pi")]
#[command(about = "Browse and blame prompt attribution for a git working tree", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List recent traces, pick one, and view its diff.
    Browse,
    /// Show prompt attribution for a file's lines.
    Blame {
        file: String,
        /// `startLine` or `startLine-endLine`, 1-based inclusive.
        range: Option<String>,
    },
}

fn main() {
    let cli = Cli::parse();

    let cwd = match std::env::current_dir() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("pi: {}", e);
            std::process::exit(1);
        }
    };

    let repo = match Repository::discover(&cwd) {
        Ok(Some(repo)) => repo,
        Ok(None) => {
            eprintln!("pi: not inside a git repository");
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("pi: {}", e);
            std::process::exit(1);
        }
    };

    let result = smol::block_on(async {
        smol::unblock(move || match cli.command {
            Command::Browse => commands::browse::run(&repo),
            Command::Blame { file, range } => commands::blame::run(&repo, &file, range.as_deref()),
        })
        .await
    });

    if let Err(e) = result {
        eprintln!("pi: {}", e);
        std::process::exit(1);
    }
}
