// SPDX-License-Identifier: MIT OR Apache-2.0

//! Answer a question with retrieved passages as context

use anyhow::Result;
use serde::Serialize;

use super::{with_spinner, Session};
use ragdex::generation::{answer, OllamaClient};
use ragdex::output::{colorize_failure, colorize_speaker, print_json, use_colors};

/// Answer result for JSON output
#[derive(Debug, Serialize)]
struct AskResult<'a> {
    question: &'a str,
    model: &'a str,
    answer: &'a str,
    failed: bool,
}

/// Run the ask command
pub fn run(session: &Session, question: &str, k: Option<usize>) -> Result<()> {
    let k = session.config.merge_top_k(k);
    let engine = session.open_engine()?;
    let generation_config = session.config.generation();
    let client = OllamaClient::from_config(generation_config);
    let assistant = generation_config.assistant_name();

    let outcome = with_spinner("Thinking", || {
        answer(&engine, &client, assistant, question, k)
    })?;

    if session.is_json() {
        print_json(
            &AskResult {
                question,
                model: client.model(),
                answer: outcome.text(),
                failed: outcome.is_failed(),
            },
            session.compact,
        )?;
        return Ok(());
    }

    let color = use_colors();
    let text = if outcome.is_failed() {
        colorize_failure(outcome.text(), color)
    } else {
        outcome.text().to_string()
    };
    println!("{} {}", colorize_speaker(&format!("{}:", assistant), color), text);

    Ok(())
}
