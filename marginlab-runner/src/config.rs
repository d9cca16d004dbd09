//! Run configuration file (TOML).
//!
//! ```toml
//! [engine]
//! start_capital = 1000.0
//!
//! [walk_forward]
//! trials = 50
//!
//! [[strategy]]
//! key = "BTC_4h"
//! symbol = "BTC/USDT"
//! bars = "data/btc_4h.csv"
//!
//! [strategy.risk]
//! leverage = 10
//!
//! [strategy.signal]
//! min_score = 1.0
//! ```
//!
//! Relative `bars` paths resolve against the config file's directory.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use marginlab_core::config::ConfigError;
use marginlab_core::domain::StrategyKey;
use marginlab_core::{EngineConfig, RiskConfig, SignalConfig};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::walk_forward::{WalkForwardConfig, WalkForwardError};

/// Unique identifier for a run configuration (content-addressable hash).
pub type RunId = String;

#[derive(Debug, Error)]
pub enum RunConfigError {
    #[error("failed to read {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed run config: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("run config has no [[strategy]] entries")]
    NoStrategies,

    #[error("strategy key '{0}' appears more than once")]
    DuplicateKey(String),

    #[error("invalid settings for '{scope}'")]
    Invalid {
        scope: String,
        #[source]
        source: ConfigError,
    },

    #[error("invalid [walk_forward] section")]
    WalkForward(#[source] WalkForwardError),
}

/// One strategy entry: where its bars live and how it trades.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyEntry {
    pub key: String,
    pub symbol: String,
    /// CSV bar file.
    pub bars: PathBuf,
    #[serde(default)]
    pub risk: RiskConfig,
    #[serde(default)]
    pub signal: SignalConfig,
}

impl StrategyEntry {
    pub fn strategy_key(&self) -> StrategyKey {
        StrategyKey::new(self.key.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub walk_forward: WalkForwardConfig,
    #[serde(rename = "strategy", default)]
    pub strategies: Vec<StrategyEntry>,
}

impl RunConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, RunConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse, validate, and resolve relative bar paths.
    pub fn from_path(path: &Path) -> Result<Self, RunConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| RunConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_toml_str(&text)?;
        if let Some(base) = path.parent() {
            config.resolve_paths(base);
        }
        Ok(config)
    }

    pub fn resolve_paths(&mut self, base: &Path) {
        for entry in &mut self.strategies {
            if entry.bars.is_relative() {
                entry.bars = base.join(&entry.bars);
            }
        }
    }

    pub fn validate(&self) -> Result<(), RunConfigError> {
        self.engine
            .validate()
            .map_err(|source| RunConfigError::Invalid {
                scope: "engine".into(),
                source,
            })?;
        self.walk_forward
            .validate()
            .map_err(RunConfigError::WalkForward)?;
        if self.strategies.is_empty() {
            return Err(RunConfigError::NoStrategies);
        }

        let mut seen = HashSet::new();
        for entry in &self.strategies {
            if !seen.insert(entry.key.as_str()) {
                return Err(RunConfigError::DuplicateKey(entry.key.clone()));
            }
            let invalid = |source| RunConfigError::Invalid {
                scope: entry.key.clone(),
                source,
            };
            entry.risk.validate().map_err(invalid)?;
            entry.signal.validate().map_err(invalid)?;
        }
        Ok(())
    }

    /// Deterministic hash of the full configuration.
    pub fn run_id(&self) -> RunId {
        let json = serde_json::to_vec(self).unwrap_or_default();
        blake3::hash(&json).to_hex().to_string()
    }
}
