// SPDX-License-Identifier: MIT OR Apache-2.0

//! Generation service client and prompt assembly.
//!
//! Retrieval errors propagate to the caller; generation failures do not.
//! A failed or timed-out request comes back as `Generation::Failed` with a
//! message meant to be shown to the user verbatim.

use anyhow::{anyhow, Context, Result};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::GenerationConfig;
use crate::engine::RetrievalEngine;

/// Anything that turns a prompt into text.
pub trait GenerationService {
    fn generate(&self, prompt: &str) -> Result<String>;
}

/// Outcome of asking the generation service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Generation {
    Answer(String),
    Failed(String),
}

impl Generation {
    pub fn text(&self) -> &str {
        match self {
            Generation::Answer(text) | Generation::Failed(text) => text,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Generation::Failed(_))
    }
}

/// Client for an Ollama-compatible `/api/generate` endpoint.
pub struct OllamaClient {
    agent: ureq::Agent,
    url: String,
    model: String,
}

impl OllamaClient {
    pub fn new(url: impl Into<String>, model: impl Into<String>, timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(timeout).build();
        Self {
            agent,
            url: url.into(),
            model: model.into(),
        }
    }

    pub fn from_config(config: &GenerationConfig) -> Self {
        Self::new(config.url(), config.model(), config.timeout())
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

impl GenerationService for OllamaClient {
    fn generate(&self, prompt: &str) -> Result<String> {
        debug!(url = %self.url, model = %self.model, "sending generate request");
        let body: Value = self
            .agent
            .post(&self.url)
            .send_json(json!({
                "model": self.model,
                "prompt": prompt,
                "stream": false,
            }))
            .with_context(|| format!("Request to {} failed", self.url))?
            .into_json()
            .context("Failed to parse generate response as JSON")?;

        let text = body
            .get("response")
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow!("Generate response missing 'response' field"))?;
        Ok(text.trim().to_string())
    }
}

/// Builds the role prompt handed to the generation service.
pub fn build_prompt(assistant_name: &str, passages: &[String], question: &str) -> String {
    let context = passages.join("\n");
    format!(
        "You are {name}, a helpful chatbot. Use the following context to answer:\n\n{context}\n\nQuestion: {question}\nAnswer as {name}:",
        name = assistant_name,
        context = context,
        question = question,
    )
}

/// Retrieves the `k` nearest passages for `question` and asks `generator`.
pub fn answer(
    engine: &RetrievalEngine,
    generator: &dyn GenerationService,
    assistant_name: &str,
    question: &str,
    k: usize,
) -> crate::errors::Result<Generation> {
    let passages = engine.query(question, k)?;
    let prompt = build_prompt(assistant_name, &passages, question);

    Ok(match generator.generate(&prompt) {
        Ok(text) => Generation::Answer(text),
        Err(err) => {
            warn!("generation failed: {:#}", err);
            Generation::Failed(format!("[Error contacting generation service: {:#}]", err))
        }
    })
}
