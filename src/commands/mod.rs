// SPDX-License-Identifier: MIT OR Apache-2.0

//! Command implementations for the ragdex binary

pub mod ask;
pub mod build;
pub mod chat;
pub mod ingest;
pub mod query;
pub mod status;

use anyhow::{bail, Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::time::Duration;

use crate::cli::OutputFormat;
use ragdex::config::{Config, ConfigOutputFormat};
use ragdex::embedding::provider_from_config;
use ragdex::utils::resolve_snapshot_path;
use ragdex::RetrievalEngine;

/// Settings shared by every command, after merging CLI flags over config.
pub struct Session {
    pub config: Config,
    pub snapshot: PathBuf,
    pub format: OutputFormat,
    pub compact: bool,
}

impl Session {
    pub fn new(
        config: Config,
        cli_snapshot: Option<PathBuf>,
        cli_format: Option<OutputFormat>,
        compact: bool,
    ) -> Result<Self> {
        let configured = config.merge_snapshot(cli_snapshot.as_deref());
        let snapshot = resolve_snapshot_path(std::env::current_dir()?, configured);
        let format = cli_format.unwrap_or(match config.default_format {
            Some(ConfigOutputFormat::Json) => OutputFormat::Json,
            _ => OutputFormat::Text,
        });

        Ok(Self {
            config,
            snapshot,
            format,
            compact,
        })
    }

    /// Creates an Empty engine with the configured provider and chunking.
    pub fn new_engine(&self) -> Result<RetrievalEngine> {
        let chunk_config = self.config.chunking().chunk_config()?;
        let provider = provider_from_config(self.config.embeddings())
            .context("Failed to initialize embedding provider")?;
        Ok(RetrievalEngine::new(provider, chunk_config)?)
    }

    /// Creates an engine and loads the existing snapshot into it.
    pub fn open_engine(&self) -> Result<RetrievalEngine> {
        if !self.snapshot.exists() {
            bail!(
                "No snapshot at {}; run `ragdex build --source <file>` first",
                self.snapshot.display()
            );
        }
        let engine = self.new_engine()?;
        with_spinner("Loading snapshot", || engine.load_snapshot(&self.snapshot))
            .with_context(|| format!("Failed to load snapshot {}", self.snapshot.display()))?;
        Ok(engine)
    }

    /// Saves after an ingest unless persistence is switched off.
    pub fn persist(&self, engine: &RetrievalEngine) -> Result<bool> {
        if !self.config.index().persist_ingest() {
            return Ok(false);
        }
        engine
            .save(&self.snapshot)
            .with_context(|| format!("Failed to save snapshot {}", self.snapshot.display()))?;
        Ok(true)
    }

    pub fn is_json(&self) -> bool {
        self.format == OutputFormat::Json
    }
}

/// Runs `f` while showing a spinner on stderr.
pub fn with_spinner<T, F>(message: &str, f: F) -> T
where
    F: FnOnce() -> T,
{
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.cyan} {msg}")
            .expect("valid spinner template"),
    );
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    let out = f();
    pb.finish_and_clear();
    out
}
