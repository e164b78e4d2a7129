//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs. Every
//! section is optional and falls back to its defaults, so the binary also
//! runs without a config file. Secrets are referenced by env-var name and
//! resolved at runtime.

use anyhow::{Context, Result};
use rust_decimal::prelude::*;
use rust_decimal::Decimal;
use secrecy::SecretString;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::strategy::fees::FeeSchedule;
use crate::types::{OrderType, Source, StatCategory};

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub data: DataConfig,
    pub exchange: ExchangeConfig,
    pub sources: SourcesConfig,
    pub trading: TradingConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DataConfig {
    /// Directory holding snapshot tables and the trade ledger.
    pub dir: PathBuf,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self { dir: PathBuf::from("data") }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ExchangeConfig {
    pub use_demo: bool,
    pub api_key_env: String,
    pub private_key_path_env: String,
    /// Series tickers to scan. Empty means every known stat series.
    pub series: Vec<String>,
    pub timeout_secs: u64,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            use_demo: false,
            api_key_env: "KALSHI_API_KEY_ID".to_string(),
            private_key_path_env: "KALSHI_PRIVATE_KEY_PATH".to_string(),
            series: Vec::new(),
            timeout_secs: 30,
        }
    }
}

impl ExchangeConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Configured series, or every stat series when none are listed.
    pub fn series_tickers(&self) -> Vec<String> {
        if self.series.is_empty() {
            StatCategory::ALL
                .iter()
                .map(|s| s.series_ticker().to_string())
                .collect()
        } else {
            self.series.clone()
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct SourcesConfig {
    pub draftkings: SourceConfig,
    pub pinnacle: SourceConfig,
    pub underdog: SourceConfig,
}

impl SourcesConfig {
    pub fn get(&self, source: Source) -> Option<&SourceConfig> {
        match source {
            Source::DraftKings => Some(&self.draftkings),
            Source::Pinnacle => Some(&self.pinnacle),
            Source::Underdog => Some(&self.underdog),
            Source::Kalshi => None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SourceConfig {
    pub enabled: bool,
    pub timeout_secs: u64,
    /// Env var holding an API key, for sources that take one.
    pub api_key_env: Option<String>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout_secs: 30,
            api_key_env: None,
        }
    }
}

impl SourceConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// The API key, if one is configured and set. Never an error: keyed
    /// sources fall back to anonymous access.
    pub fn api_key(&self) -> Option<SecretString> {
        let env = self.api_key_env.as_deref()?;
        AppConfig::resolve_env(env).ok().map(SecretString::new)
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct TradingConfig {
    pub min_edge_cents: f64,
    pub count_per_trade: u32,
    pub max_contracts: u32,
    pub max_spend_cents: u64,
    pub order_type: OrderType,
    pub fee_schedule: FeeSchedule,
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            min_edge_cents: 5.0,
            count_per_trade: 5,
            max_contracts: 20,
            max_spend_cents: 5000,
            order_type: OrderType::Limit,
            fee_schedule: FeeSchedule::Taker,
        }
    }
}

impl TradingConfig {
    pub fn min_edge(&self) -> Decimal {
        Decimal::from_f64(self.min_edge_cents).unwrap_or(Decimal::ZERO)
    }
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Load from `path` if it exists, otherwise use defaults.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn parse(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Resolve an environment variable name to its value.
    pub fn resolve_env(env_name: &str) -> Result<String> {
        std::env::var(env_name)
            .with_context(|| format!("Environment variable not set: {env_name}"))
    }

    /// Enabled sportsbooks, optionally narrowed to `only`.
    pub fn enabled_books(&self, only: &[Source]) -> Vec<Source> {
        Source::BOOKS
            .iter()
            .copied()
            .filter(|s| only.is_empty() || only.contains(s))
            .filter(|s| self.sources.get(*s).is_some_and(|c| c.enabled))
            .collect()
    }
}
