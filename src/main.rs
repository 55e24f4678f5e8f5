// SPDX-License-Identifier: MIT OR Apache-2.0

//! ragdex - Ask questions over your documents
//!
//! Retrieves the passages nearest to a question from a persistent vector
//! index and hands them to a local generation service as context.

mod cli;
mod commands;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Commands};
use commands::Session;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    // Initialize tracing with RAGDEX_LOG env var (e.g., RAGDEX_LOG=debug ragdex query "question")
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("RAGDEX_LOG").unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Commands::Completions { shell } = cli.command {
        let mut cmd = Cli::command();
        generate(shell, &mut cmd, "ragdex", &mut std::io::stdout());
        return Ok(());
    }

    let config = ragdex::config::Config::load();
    let session = Session::new(config, cli.snapshot, cli.format, cli.compact)?;

    match cli.command {
        Commands::Build { source } => {
            commands::build::run(&session, &source)?;
        }
        Commands::Ingest { files, urls } => {
            commands::ingest::run(&session, &files, &urls)?;
        }
        Commands::Query { question, k } => {
            commands::query::run(&session, &question, k)?;
        }
        Commands::Ask { question, k } => {
            commands::ask::run(&session, &question, k)?;
        }
        Commands::Chat { source } => {
            commands::chat::run(&session, source.as_deref())?;
        }
        Commands::Status => {
            commands::status::run(&session)?;
        }
        Commands::Completions { .. } => {}
    }

    Ok(())
}
