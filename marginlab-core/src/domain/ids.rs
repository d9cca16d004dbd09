use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of one concurrently-traded strategy (e.g. `BTC_4h`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StrategyKey(pub String);

impl StrategyKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StrategyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for StrategyKey {
    fn from(key: &str) -> Self {
        Self(key.to_string())
    }
}
