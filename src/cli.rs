// SPDX-License-Identifier: MIT OR Apache-2.0

//! CLI argument parsing using clap

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

/// ragdex - Ask questions over your documents
///
/// Builds a persistent passage index from a source document, grows it with
/// more files or web pages, and answers questions by retrieving the nearest
/// passages and handing them to a local generation service.
#[derive(Parser, Debug)]
#[command(name = "ragdex")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Output format (text or json)
    #[arg(long, global = true)]
    pub format: Option<OutputFormat>,

    /// Compact JSON output (no pretty formatting)
    #[arg(long, global = true)]
    pub compact: bool,

    /// Snapshot file (defaults to .ragdex/snapshot.sqlite)
    #[arg(long, global = true)]
    pub snapshot: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Output format for results
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build the index from a source file, or load the existing snapshot
    Build {
        /// Source document (plain text or PDF)
        #[arg(short, long)]
        source: PathBuf,
    },

    /// Add files or web pages to an existing index
    Ingest {
        /// Text or PDF file to add (repeatable)
        #[arg(short, long = "file")]
        files: Vec<PathBuf>,

        /// Web page to fetch and add (repeatable)
        #[arg(short, long = "url")]
        urls: Vec<String>,
    },

    /// Print the passages nearest to a question
    #[command(alias = "q")]
    Query {
        /// Question text
        question: String,

        /// Number of passages to return
        #[arg(short)]
        k: Option<usize>,
    },

    /// Answer a question using retrieved passages as context
    Ask {
        /// Question text
        question: String,

        /// Number of passages to retrieve
        #[arg(short)]
        k: Option<usize>,
    },

    /// Interactive question loop (`scrape <url>` adds a page, `exit` quits)
    Chat {
        /// Source document used when no snapshot exists yet
        #[arg(short, long)]
        source: Option<PathBuf>,
    },

    /// Show snapshot location, size and embedding model
    Status,

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}
