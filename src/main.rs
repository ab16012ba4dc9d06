//! SeqCopy CLI - order-preserving multi-threaded line copy
//!
//! `seqcopy <n> <source> <destination>`

use clap::Parser;
use seqcopy::config::{CliArgs, CopyConfig};
use seqcopy::core::CopyEngine;
use seqcopy::error::{Result, SeqCopyError};
use tracing_subscriber::EnvFilter;

fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    // Parse CLI arguments; every usage problem exits with 1
    let args = match CliArgs::try_parse() {
        Ok(args) => args,
        Err(e) => {
            let code = if e.use_stderr() { 1 } else { 0 };
            let _ = e.print();
            std::process::exit(code);
        }
    };

    if let Err(e) = run(args) {
        eprintln!("Error: {}", e);
        if matches!(e, SeqCopyError::Usage(_)) {
            eprintln!("Usage: seqcopy <n> <source_file> <destination_file>");
        }
        std::process::exit(e.exit_code());
    }
}

fn run(args: CliArgs) -> Result<()> {
    let config = CopyConfig::from_cli(&args)?;

    let result = CopyEngine::new(config).execute()?;
    result.log_summary();

    Ok(())
}
