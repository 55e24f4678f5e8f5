// SPDX-License-Identifier: MIT OR Apache-2.0

//! Embedding providers.
//!
//! The engine owns one boxed `EmbeddingProvider` and asks it for vectors in
//! slices of at most `batch_size()` passages. Three providers exist: a local
//! fastembed model, an external command speaking JSON over stdin/stdout, and
//! a deterministic character-bucket provider for offline runs.

use anyhow::{anyhow, bail, Context, Result};
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use serde::Deserialize;
use std::borrow::Cow;
use std::env;
use std::io::Write;
use std::process::{Command, Stdio};
use std::str::FromStr;
use std::thread;
use tracing::{debug, warn};

use crate::config::{EmbeddingConfig, EmbeddingProviderType};

const FASTEMBED_BATCH_SIZE: usize = 512;
const FASTEMBED_BATCH_LIMIT: usize = 1024;
const FASTEMBED_MAX_CHARS: usize = 2000;
const COMMAND_BATCH_SIZE: usize = 64;
const HASHING_BATCH_SIZE: usize = 1024;

/// Produces one vector per input passage.
pub trait EmbeddingProvider: Send {
    /// Identifier recorded in snapshots built with this provider.
    fn model_id(&self) -> &str;

    /// Largest slice of passages handed to a single `embed_texts` call.
    fn batch_size(&self) -> usize;

    /// Embeds `texts`, returning vectors in input order.
    fn embed_texts(&mut self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    fn embed_one(&mut self, text: &str) -> Result<Vec<f32>> {
        self.embed_texts(&[text.to_string()])?
            .pop()
            .ok_or_else(|| anyhow!("No embedding returned"))
    }
}

/// Settings for the local fastembed model.
///
/// Resolved from the `[embeddings]` section first; each `FASTEMBED_*`
/// variable that is set overrides its own field.
#[derive(Debug, Clone)]
pub struct FastEmbedSettings {
    pub model: EmbeddingModel,
    pub batch_size: usize,
    pub max_chars: usize,
    pub normalize: bool,
}

impl Default for FastEmbedSettings {
    fn default() -> Self {
        Self {
            model: EmbeddingModel::AllMiniLML6V2,
            batch_size: FASTEMBED_BATCH_SIZE,
            max_chars: FASTEMBED_MAX_CHARS,
            normalize: true,
        }
    }
}

impl FastEmbedSettings {
    pub fn resolve(config: &EmbeddingConfig) -> Result<Self> {
        let mut settings = Self::default();
        if let Some(model) = config.model.as_deref() {
            settings.model = parse_model_name(model)?;
        }
        if let Some(size) = config.batch_size {
            settings.batch_size = size;
        }

        if let Some(model) = env_value::<String>("FASTEMBED_MODEL")? {
            settings.model = parse_model_name(&model)?;
        }
        if let Some(size) = env_value::<usize>("FASTEMBED_BATCH_SIZE")? {
            settings.batch_size = size;
        }
        if let Some(chars) = env_value::<usize>("FASTEMBED_MAX_CHARS")? {
            settings.max_chars = chars;
        }
        if let Some(flag) = env_flag("FASTEMBED_NORMALIZE")? {
            settings.normalize = flag;
        }

        Ok(settings.clamped())
    }

    fn clamped(mut self) -> Self {
        if self.batch_size == 0 {
            self.batch_size = FASTEMBED_BATCH_SIZE;
        }
        if self.batch_size > FASTEMBED_BATCH_LIMIT {
            warn!(
                batch_size = self.batch_size,
                limit = FASTEMBED_BATCH_LIMIT,
                "fastembed batch size too large; clamping"
            );
            self.batch_size = FASTEMBED_BATCH_LIMIT;
        }
        if self.max_chars == 0 {
            self.max_chars = FASTEMBED_MAX_CHARS;
        }
        self
    }
}

/// Local ONNX sentence embedder (all-MiniLM-L6-v2, 384 dimensions).
pub struct FastEmbedder {
    model: TextEmbedding,
    settings: FastEmbedSettings,
    model_id: String,
}

impl FastEmbedder {
    pub fn new(settings: FastEmbedSettings) -> Result<Self> {
        let model_id = settings.model.to_string();
        let model = TextEmbedding::try_new(InitOptions::new(settings.model.clone()))
            .context("Failed to initialize fastembed model")?;
        Ok(Self {
            model,
            settings,
            model_id,
        })
    }
}

impl EmbeddingProvider for FastEmbedder {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn batch_size(&self) -> usize {
        self.settings.batch_size
    }

    fn embed_texts(&mut self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let inputs: Vec<Cow<'_, str>> = texts
            .iter()
            .map(|text| truncate_to_chars(text, self.settings.max_chars))
            .collect();
        let mut vectors = self
            .model
            .embed(&inputs, Some(self.settings.batch_size))?;
        if self.settings.normalize {
            vectors.iter_mut().for_each(|v| l2_normalize(v));
        }
        Ok(vectors)
    }
}

/// Output shapes accepted from an embedding command.
#[derive(Deserialize)]
#[serde(untagged)]
enum CommandOutput {
    Rows(Vec<Vec<f32>>),
    Wrapped {
        #[serde(alias = "vectors", alias = "data")]
        embeddings: Vec<Vec<f32>>,
    },
}

impl CommandOutput {
    fn into_rows(self) -> Vec<Vec<f32>> {
        match self {
            CommandOutput::Rows(rows) | CommandOutput::Wrapped { embeddings: rows } => rows,
        }
    }
}

/// Runs `sh -c <command>` once per batch.
///
/// The command reads `{"model": ..., "texts": [...]}` on stdin and prints
/// either a JSON array of vectors or an object carrying one under
/// `embeddings`, `vectors` or `data`.
pub struct CommandProvider {
    command: String,
    model: String,
    batch_size: usize,
}

impl CommandProvider {
    pub fn new(command: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            model: model.into(),
            batch_size: COMMAND_BATCH_SIZE,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    fn invoke(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let payload = serde_json::to_vec(&serde_json::json!({
            "model": self.model,
            "texts": texts,
        }))?;

        let mut child = Command::new("sh")
            .arg("-c")
            .arg(&self.command)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("Failed to spawn embedding command: {}", self.command))?;

        // stdin is fed from its own thread while stdout and stderr drain here.
        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| anyhow!("Embedding command has no stdin"))?;
        let writer = thread::spawn(move || stdin.write_all(&payload));

        let output = child
            .wait_with_output()
            .context("Failed to read embedding command output")?;
        let written = writer
            .join()
            .map_err(|_| anyhow!("Embedding command stdin writer panicked"))?;

        if !output.status.success() {
            bail!(
                "Embedding command failed (status {}): {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        // A command may exit successfully without reading all of its input.
        if let Err(err) = written {
            debug!(error = %err, "embedding command closed stdin early");
        }

        let parsed: CommandOutput = serde_json::from_slice(&output.stdout)
            .context("Embedding command output is not a JSON array of vectors")?;
        let rows = parsed.into_rows();
        if rows.len() != texts.len() {
            bail!(
                "Embedding command returned {} vectors for {} texts",
                rows.len(),
                texts.len()
            );
        }
        Ok(rows)
    }
}

impl EmbeddingProvider for CommandProvider {
    fn model_id(&self) -> &str {
        &self.model
    }

    fn batch_size(&self) -> usize {
        self.batch_size
    }

    fn embed_texts(&mut self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        debug!(count = texts.len(), command = %self.command, "running embedding command");
        self.invoke(texts)
    }
}

/// Deterministic provider that counts characters into hashed buckets.
///
/// Each character adds 1.0 to bucket `code_point % dimension`. Texts sharing
/// characters land close together under L2, which is enough for offline runs
/// and tests that need stable, distinguishable vectors without a model.
pub struct HashingProvider {
    model: String,
    dimension: usize,
}

impl HashingProvider {
    pub fn new(dimension: usize) -> Self {
        let dimension = dimension.max(1);
        Self {
            model: format!("hashing-{}", dimension),
            dimension,
        }
    }

    fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0; self.dimension];
        for ch in text.chars() {
            vector[ch as usize % self.dimension] += 1.0;
        }
        vector
    }
}

impl EmbeddingProvider for HashingProvider {
    fn model_id(&self) -> &str {
        &self.model
    }

    fn batch_size(&self) -> usize {
        HASHING_BATCH_SIZE
    }

    fn embed_texts(&mut self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|text| self.embed_text(text)).collect())
    }
}

/// Builds the provider selected in the `[embeddings]` config section.
pub fn provider_from_config(config: &EmbeddingConfig) -> Result<Box<dyn EmbeddingProvider>> {
    let provider: Box<dyn EmbeddingProvider> = match config.provider() {
        EmbeddingProviderType::Builtin => {
            let settings = FastEmbedSettings::resolve(config)?;
            debug!(model = %settings.model, batch_size = settings.batch_size, "loading fastembed model");
            Box::new(FastEmbedder::new(settings)?)
        }
        EmbeddingProviderType::Command => {
            let provider = CommandProvider::new(config.command(), config.model());
            let provider = match config.batch_size {
                Some(size) => provider.with_batch_size(size),
                None => provider,
            };
            Box::new(provider)
        }
        EmbeddingProviderType::Hashing => Box::new(HashingProvider::new(config.dimension())),
    };
    Ok(provider)
}

fn truncate_to_chars(input: &str, max_chars: usize) -> Cow<'_, str> {
    match input.char_indices().nth(max_chars) {
        Some((cut, _)) => Cow::Owned(input[..cut].to_string()),
        None => Cow::Borrowed(input),
    }
}

fn l2_normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        vector.iter_mut().for_each(|v| *v /= norm);
    }
}

fn parse_model_name(raw: &str) -> Result<EmbeddingModel> {
    match raw.trim().to_lowercase().as_str() {
        "" | "minilm" | "all-minilm-l6-v2" | "sentence-transformers/all-minilm-l6-v2" => {
            Ok(EmbeddingModel::AllMiniLML6V2)
        }
        other => bail!("Unsupported embedding model '{}'. Supported value: minilm", other),
    }
}

/// Parses `name` when it is set to a non-blank value.
fn env_value<T>(name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(raw) if raw.trim().is_empty() => Ok(None),
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .with_context(|| format!("Invalid {} value: {}", name, raw.trim())),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(err) => Err(err).with_context(|| format!("Failed to read {}", name)),
    }
}

fn env_flag(name: &str) -> Result<Option<bool>> {
    let Some(raw) = env_value::<String>(name)? else {
        return Ok(None);
    };
    match raw.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(Some(true)),
        "0" | "false" | "no" | "off" => Ok(Some(false)),
        other => bail!("Invalid {} value: {}", name, other),
    }
}
