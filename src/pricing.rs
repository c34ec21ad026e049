//! USD pricing of mined units

use crate::amount::Amount;
use crate::config::ConfigHandle;

/// Source of the unit → USD exchange rate
pub trait PriceSource: Send + Sync {
    fn usd_per_unit(&self) -> f64;

    fn usd_value(&self, amount: Amount) -> f64 {
        amount.as_f64() * self.usd_per_unit()
    }
}

/// Fixed rate, mostly for tests
#[derive(Debug, Clone, Copy)]
pub struct FixedRate(pub f64);

impl PriceSource for FixedRate {
    fn usd_per_unit(&self) -> f64 {
        self.0
    }
}

/// Rate read from the `[exchange]` section, following config reloads
#[derive(Debug, Clone)]
pub struct ConfiguredRate {
    config: ConfigHandle,
}

impl ConfiguredRate {
    pub fn new(config: ConfigHandle) -> Self {
        Self { config }
    }
}

impl PriceSource for ConfiguredRate {
    fn usd_per_unit(&self) -> f64 {
        self.config.snapshot().exchange.usd_per_unit
    }
}
