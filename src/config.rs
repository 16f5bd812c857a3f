//! Configuration resolution
//!
//! Two-tier resolution: environment variables override the TOML file,
//! which overrides built-in defaults. The TOML path comes from
//! `LIBRIS_ENRICH_CONFIG`, falling back to `libris-enrich.toml` in the
//! working directory when present.

use crate::models::RunOptions;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

const DEFAULT_BIND_ADDR: &str = "127.0.0.1:5741";
const DEFAULT_DATABASE_PATH: &str = "libris.db";
const DEFAULT_CANDIDATE_LIMIT: usize = 50;

/// Resolved service configuration
#[derive(Debug, Clone)]
pub struct EnrichConfig {
    pub bind_addr: String,
    pub database_path: PathBuf,
    pub provider_base_url: String,
    /// Working-set cap per run, matching the operator screens' page size
    pub candidate_limit: usize,
    pub batch_size: usize,
    pub inter_call_delay_ms: u64,
    pub inter_batch_delay_ms: u64,
    pub settle_delay_ms: u64,
}

impl Default for EnrichConfig {
    fn default() -> Self {
        let pacing = RunOptions::default();
        Self {
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            database_path: PathBuf::from(DEFAULT_DATABASE_PATH),
            provider_base_url: crate::clients::google_books::DEFAULT_BASE_URL.to_string(),
            candidate_limit: DEFAULT_CANDIDATE_LIMIT,
            batch_size: pacing.batch_size,
            inter_call_delay_ms: pacing.inter_call_delay.as_millis() as u64,
            inter_batch_delay_ms: pacing.inter_batch_delay.as_millis() as u64,
            settle_delay_ms: pacing.settle_delay.as_millis() as u64,
        }
    }
}

/// On-disk configuration file (all fields optional)
#[derive(Debug, Default, Deserialize)]
pub struct TomlConfig {
    pub bind_addr: Option<String>,
    pub database_path: Option<PathBuf>,
    pub provider_base_url: Option<String>,
    pub candidate_limit: Option<usize>,
    pub batch_size: Option<usize>,
    pub inter_call_delay_ms: Option<u64>,
    pub inter_batch_delay_ms: Option<u64>,
    pub settle_delay_ms: Option<u64>,
}

impl EnrichConfig {
    /// Resolve configuration from defaults, TOML file and environment
    pub fn load() -> Result<Self> {
        let toml_path = std::env::var("LIBRIS_ENRICH_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("libris-enrich.toml"));

        let toml_config = if toml_path.exists() {
            info!("Loading configuration from {}", toml_path.display());
            Self::read_toml(&toml_path)?
        } else {
            TomlConfig::default()
        };

        let mut config = Self::default().merged_with(toml_config);

        // Environment overrides
        if let Ok(addr) = std::env::var("LIBRIS_ENRICH_BIND") {
            config.bind_addr = addr;
        }
        if let Ok(path) = std::env::var("LIBRIS_ENRICH_DATABASE") {
            config.database_path = PathBuf::from(path);
        }
        if let Ok(url) = std::env::var("LIBRIS_ENRICH_PROVIDER_URL") {
            config.provider_base_url = url;
        }

        Ok(config)
    }

    fn read_toml(path: &Path) -> Result<TomlConfig> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("read config file {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("parse config file {}", path.display()))
    }

    fn merged_with(mut self, toml: TomlConfig) -> Self {
        if let Some(addr) = toml.bind_addr {
            self.bind_addr = addr;
        }
        if let Some(path) = toml.database_path {
            self.database_path = path;
        }
        if let Some(url) = toml.provider_base_url {
            self.provider_base_url = url;
        }
        if let Some(limit) = toml.candidate_limit {
            self.candidate_limit = limit;
        }
        if let Some(size) = toml.batch_size {
            self.batch_size = size;
        }
        if let Some(ms) = toml.inter_call_delay_ms {
            self.inter_call_delay_ms = ms;
        }
        if let Some(ms) = toml.inter_batch_delay_ms {
            self.inter_batch_delay_ms = ms;
        }
        if let Some(ms) = toml.settle_delay_ms {
            self.settle_delay_ms = ms;
        }
        self
    }

    /// Default pacing for runs started without explicit options
    pub fn run_options(&self) -> RunOptions {
        RunOptions {
            batch_size: self.batch_size,
            inter_call_delay: Duration::from_millis(self.inter_call_delay_ms),
            inter_batch_delay: Duration::from_millis(self.inter_batch_delay_ms),
            settle_delay: Duration::from_millis(self.settle_delay_ms),
        }
    }
}
