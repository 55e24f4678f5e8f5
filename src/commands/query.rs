// SPDX-License-Identifier: MIT OR Apache-2.0

//! Print the passages nearest to a question

use anyhow::Result;
use colored::Colorize;

use super::Session;
use ragdex::output::{colorize_distance, colorize_passage, colorize_rank, print_json, use_colors};

/// Run the query command
pub fn run(session: &Session, question: &str, k: Option<usize>) -> Result<()> {
    let k = session.config.merge_top_k(k);
    let engine = session.open_engine()?;
    let hits = engine.query_scored(question, k)?;

    if session.is_json() {
        print_json(&hits, session.compact)?;
        return Ok(());
    }

    let color = use_colors();
    println!("\n{} Nearest passages for: {}\n", "🔍".cyan(), question.yellow());
    for (rank, hit) in hits.iter().enumerate() {
        println!(
            "{} [passage {}] distance {}",
            colorize_rank(rank + 1, color),
            hit.position,
            colorize_distance(hit.distance, color)
        );
        for line in hit.text.lines() {
            println!("    {}", colorize_passage(line, color));
        }
        println!();
    }

    Ok(())
}
