// SPDX-License-Identifier: MIT OR Apache-2.0

//! Interactive question loop over stdin

use anyhow::{Context, Result};
use std::io::{self, BufRead, Write};
use std::path::Path;

use super::{with_spinner, Session};
use ragdex::generation::{answer, OllamaClient};
use ragdex::output::{colorize_failure, colorize_speaker, use_colors};
use ragdex::sources::{fetch_page, read_file};
use ragdex::RetrievalEngine;

/// Run the chat command
pub fn run(session: &Session, source: Option<&Path>) -> Result<()> {
    let engine = if session.snapshot.exists() {
        session.open_engine()?
    } else {
        let source = source.context("No snapshot yet; pass --source <file> to build one")?;
        let text = read_file(source)?.text;
        let engine = session.new_engine()?;
        with_spinner("Building index", || {
            engine.build_or_load(&session.snapshot, &text)
        })?;
        engine
    };

    let generation_config = session.config.generation();
    let client = OllamaClient::from_config(generation_config);
    let assistant = generation_config.assistant_name();
    let k = session.config.merge_top_k(None);
    let color = use_colors();
    let speaker = colorize_speaker(&format!("{}:", assistant), color);

    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    loop {
        print!("You: ");
        io::stdout().flush()?;

        let Some(line) = lines.next() else {
            println!();
            break;
        };
        let line = line?;
        let message = line.trim();
        if message.is_empty() {
            continue;
        }

        let lower = message.to_lowercase();
        if lower == "exit" || lower == "quit" {
            break;
        }

        let (reply, failed) = if lower.starts_with("scrape ") {
            let url = message.split_once(' ').map(|(_, u)| u.trim()).unwrap_or("");
            scrape(session, &engine, url)
        } else {
            match answer(&engine, &client, assistant, message, k) {
                Ok(outcome) => (outcome.text().to_string(), outcome.is_failed()),
                Err(err) => (format!("[Error: {}]", err), true),
            }
        };

        let reply = if failed {
            colorize_failure(&reply, color)
        } else {
            reply
        };
        println!("{} {}", speaker, reply);
    }

    Ok(())
}

/// Fetches `url`, ingests it and saves; failures come back as the reply text.
fn scrape(session: &Session, engine: &RetrievalEngine, url: &str) -> (String, bool) {
    let result = fetch_page(url).and_then(|page| {
        let added = engine.ingest(&page.text)?;
        if added > 0 {
            session.persist(engine)?;
        }
        Ok(added)
    });

    match result {
        Ok(added) => (
            format!("✅ Scraped and added {} passages from {}", added, url),
            false,
        ),
        Err(err) => (format!("❌ Failed to scrape {}: {:#}", url, err), true),
    }
}
