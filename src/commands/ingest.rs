// SPDX-License-Identifier: MIT OR Apache-2.0

//! Add files and web pages to an existing index

use anyhow::{bail, Result};
use colored::Colorize;
use serde::Serialize;
use std::path::PathBuf;

use super::{with_spinner, Session};
use ragdex::output::print_json;
use ragdex::sources::{fetch_page, read_file, SourceText};

/// Ingest result for JSON output
#[derive(Debug, Serialize)]
struct IngestResult {
    sources: Vec<String>,
    added: usize,
    total: usize,
    saved: bool,
}

/// Run the ingest command
pub fn run(session: &Session, files: &[PathBuf], urls: &[String]) -> Result<()> {
    if files.is_empty() && urls.is_empty() {
        bail!("Nothing to ingest: pass --file <path> or --url <url>");
    }

    let engine = session.open_engine()?;

    let mut sources: Vec<SourceText> = Vec::with_capacity(files.len() + urls.len());
    for file in files {
        sources.push(read_file(file)?);
    }
    for url in urls {
        sources.push(with_spinner(&format!("Fetching {}", url), || fetch_page(url))?);
    }

    let texts: Vec<&str> = sources.iter().map(|s| s.text.as_str()).collect();
    let added = with_spinner("Embedding passages", || engine.ingest_many(&texts))?;
    let saved = added > 0 && session.persist(&engine)?;

    let result = IngestResult {
        sources: sources.into_iter().map(|s| s.id).collect(),
        added,
        total: engine.len(),
        saved,
    };

    if session.is_json() {
        print_json(&result, session.compact)?;
        return Ok(());
    }

    for id in &result.sources {
        println!("{} Added content from {}", "✓".green(), id.cyan());
    }
    println!(
        "  {} new passages, {} total{}",
        result.added.to_string().yellow(),
        result.total.to_string().yellow(),
        if result.saved { "" } else { " (not saved)" }
    );

    Ok(())
}
