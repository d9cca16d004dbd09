//! Per-key slots: strategy inputs plus mutable trading state, kept in
//! registration order with lookup by key.

use std::collections::HashMap;

use crate::config::RiskConfig;
use crate::domain::{Bar, StrategyKey, StrategyState};
use crate::error::SimError;
use crate::signal::{SignalFilter, SignalSource};

/// One concurrently-traded strategy: its bars and its decision components.
#[derive(Clone, Copy)]
pub struct Strategy<'a> {
    pub key: &'a StrategyKey,
    pub symbol: &'a str,
    /// Strictly ascending by timestamp.
    pub bars: &'a [Bar],
    pub risk: &'a RiskConfig,
    pub signal: &'a dyn SignalSource,
    pub filter: &'a dyn SignalFilter,
}

impl std::fmt::Debug for Strategy<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Strategy")
            .field("key", self.key)
            .field("symbol", &self.symbol)
            .field("bars", &self.bars.len())
            .field("signal", &self.signal.name())
            .field("filter", &self.filter.name())
            .finish()
    }
}

impl<'a> Strategy<'a> {
    /// Check every bar and the ordering before any state is touched.
    pub fn validate(&self) -> Result<(), SimError> {
        self.risk.validate()?;
        for (index, bar) in self.bars.iter().enumerate() {
            bar.validate().map_err(|source| SimError::SchemaViolation {
                key: self.key.clone(),
                index,
                source,
            })?;
            if index > 0 && bar.timestamp <= self.bars[index - 1].timestamp {
                return Err(SimError::UnorderedBars {
                    key: self.key.clone(),
                    index,
                });
            }
        }
        Ok(())
    }
}

/// Mutable run state for one key.
pub(crate) struct Slot<'a> {
    pub strategy: Strategy<'a>,
    /// Next unread bar.
    cursor: usize,
    /// Index of the bar at the current timestamp, if the key has one.
    pub current: Option<usize>,
    pub state: StrategyState,
}

impl<'a> Slot<'a> {
    fn new(strategy: Strategy<'a>) -> Self {
        Self {
            strategy,
            cursor: 0,
            current: None,
            state: StrategyState::Flat,
        }
    }

    /// Step the cursor onto `timestamp` if this key has a bar there.
    pub fn advance_to(&mut self, timestamp: chrono::DateTime<chrono::Utc>) {
        self.current = match self.strategy.bars.get(self.cursor) {
            Some(bar) if bar.timestamp == timestamp => {
                self.cursor += 1;
                Some(self.cursor - 1)
            }
            _ => None,
        };
    }

    pub fn bar(&self) -> Option<&'a Bar> {
        let bars = self.strategy.bars;
        self.current.map(|i| &bars[i])
    }

    /// The key's bar before the current one.
    pub fn previous_bar(&self) -> Option<&'a Bar> {
        let bars = self.strategy.bars;
        self.current.and_then(|i| i.checked_sub(1)).map(|i| &bars[i])
    }
}

/// Slots in registration order with key lookup.
pub(crate) struct SlotTable<'a> {
    slots: Vec<Slot<'a>>,
    index: HashMap<StrategyKey, usize>,
}

impl<'a> SlotTable<'a> {
    pub fn new(strategies: &[Strategy<'a>]) -> Result<Self, SimError> {
        let mut table = Self {
            slots: Vec::with_capacity(strategies.len()),
            index: HashMap::with_capacity(strategies.len()),
        };
        for strategy in strategies {
            if table.index.contains_key(strategy.key) {
                return Err(SimError::DuplicateKey(strategy.key.clone()));
            }
            table.index.insert(strategy.key.clone(), table.slots.len());
            table.slots.push(Slot::new(*strategy));
        }
        Ok(table)
    }

    #[cfg(test)]
    pub fn get(&self, key: &StrategyKey) -> Option<&Slot<'a>> {
        self.index.get(key).map(|&i| &self.slots[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = &Slot<'a>> {
        self.slots.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Slot<'a>> {
        self.slots.iter_mut()
    }

    pub fn keys(&self) -> Vec<StrategyKey> {
        self.iter().map(|s| s.strategy.key.clone()).collect()
    }

    pub fn open_positions(&self) -> usize {
        self.iter()
            .filter(|s| s.state.position().is_some())
            .count()
    }

    /// Sum of unrealized pnl at each open position's last seen close.
    pub fn unrealized_pnl(&self) -> f64 {
        self.iter()
            .filter_map(|s| s.state.position())
            .map(|p| p.unrealized_pnl())
            .sum()
    }
}
