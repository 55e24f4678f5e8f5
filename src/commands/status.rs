// SPDX-License-Identifier: MIT OR Apache-2.0

//! Show snapshot location, size and embedding model

use anyhow::Result;
use colored::Colorize;
use serde_json::json;

use super::Session;
use ragdex::index::snapshot::read_info;
use ragdex::output::print_json;

/// Run the status command
pub fn run(session: &Session) -> Result<()> {
    if !session.snapshot.exists() {
        if session.is_json() {
            print_json(
                &json!({ "exists": false, "path": session.snapshot.display().to_string() }),
                session.compact,
            )?;
        } else {
            println!(
                "{} No snapshot at {}",
                "✗".red(),
                session.snapshot.display().to_string().yellow()
            );
        }
        return Ok(());
    }

    let info = read_info(&session.snapshot)?;

    if session.is_json() {
        print_json(&info, session.compact)?;
        return Ok(());
    }

    println!("{} {}", "Snapshot:".bold(), info.path.display().to_string().cyan());
    println!("  passages:  {}", info.passages.to_string().yellow());
    println!("  dimension: {}", info.dimension);
    println!("  model:     {}", info.model.as_deref().unwrap_or("unknown"));
    println!("  schema:    v{}", info.schema_version);

    Ok(())
}
