use std::process;

use clap::{error::ErrorKind, Parser};
use colored::Colorize;
use kmershard::{cli::Args, Config, Coordinator, KmerShardError, RunSummary};
use tracing_subscriber::EnvFilter;

fn main() {
    let args = Args::try_parse().unwrap_or_else(|e| {
        if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) {
            e.exit();
        }
        // Usage errors share the exit code of every other failure.
        let _ = e.print();
        process::exit(1);
    });

    init_tracing(args.quiet, args.verbose);

    let summary = args.summary;
    if let Err(e) = run(args, summary) {
        eprintln!(
            "{}\n {}",
            "Application error:".blue().bold(),
            e.to_string().blue()
        );
        process::exit(1);
    }
}

fn run(args: Args, print_summary: bool) -> Result<(), KmerShardError> {
    let config = Config::try_from(args)?;
    let summary = Coordinator::new(config).run()?;
    if print_summary {
        print(&summary)?;
    }
    Ok(())
}

fn print(summary: &RunSummary) -> Result<(), KmerShardError> {
    println!("{}", serde_json::to_string_pretty(summary)?);
    Ok(())
}

fn init_tracing(quiet: bool, verbose: bool) {
    let default = if quiet {
        "error"
    } else if verbose {
        "info"
    } else {
        "warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
