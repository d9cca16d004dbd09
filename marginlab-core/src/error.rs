//! Errors that abort a simulation call.
//!
//! Only caller contract violations end up here. Insufficient data, rejected
//! orders, and liquidation are reported in the result instead.

use thiserror::Error;

use crate::config::ConfigError;
use crate::domain::{BarError, StrategyKey};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SimError {
    #[error("schema violation in '{key}' at bar {index}: {source}")]
    SchemaViolation {
        key: StrategyKey,
        index: usize,
        #[source]
        source: BarError,
    },
    #[error("bars for '{key}' are not strictly ascending at index {index}")]
    UnorderedBars { key: StrategyKey, index: usize },
    #[error("strategy key '{0}' registered twice")]
    DuplicateKey(StrategyKey),
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
}
