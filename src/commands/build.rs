// SPDX-License-Identifier: MIT OR Apache-2.0

//! Build the index from a source document, or load the existing snapshot

use anyhow::Result;
use colored::Colorize;
use serde::Serialize;
use std::path::Path;

use super::{with_spinner, Session};
use ragdex::output::print_json;
use ragdex::sources::read_file;
use ragdex::BuildOutcome;

/// Build result for JSON output
#[derive(Debug, Serialize)]
struct BuildResult {
    status: &'static str,
    passages: usize,
    dimension: Option<usize>,
    snapshot: String,
}

/// Run the build command
pub fn run(session: &Session, source: &Path) -> Result<()> {
    let source = read_file(source)?;
    let engine = session.new_engine()?;

    let outcome = with_spinner("Embedding passages", || {
        engine.build_or_load(&session.snapshot, &source.text)
    })?;

    let result = BuildResult {
        status: match outcome {
            BuildOutcome::Built { .. } => "built",
            BuildOutcome::Loaded { .. } => "loaded",
        },
        passages: outcome.passages(),
        dimension: engine.dimension(),
        snapshot: session.snapshot.display().to_string(),
    };

    if session.is_json() {
        print_json(&result, session.compact)?;
        return Ok(());
    }

    match outcome {
        BuildOutcome::Built { passages } => println!(
            "{} Built index from {} with {} passages → {}",
            "✓".green(),
            source.id.cyan(),
            passages.to_string().yellow(),
            result.snapshot.dimmed()
        ),
        BuildOutcome::Loaded { passages } => println!(
            "{} Loaded existing snapshot with {} passages ({})",
            "✓".green(),
            passages.to_string().yellow(),
            result.snapshot.dimmed()
        ),
    }

    Ok(())
}
