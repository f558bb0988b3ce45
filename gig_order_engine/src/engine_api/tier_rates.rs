use std::collections::HashMap;

use log::*;
use serde::{Deserialize, Serialize};

use crate::{
    db_types::{Money, UserId, WorkType},
    traits::{TierRateError, TierRateProvider},
};

/// A writer's per-unit payout rates for each kind of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierRate {
    pub ordinary: Money,
    pub technical: Money,
}

impl TierRate {
    pub fn new(ordinary: Money, technical: Money) -> Self {
        Self { ordinary, technical }
    }

    /// The same rate for both kinds of work.
    pub fn flat(rate: Money) -> Self {
        Self { ordinary: rate, technical: rate }
    }

    pub fn for_work(&self, work_type: WorkType) -> Money {
        match work_type {
            WorkType::Ordinary => self.ordinary,
            WorkType::Technical => self.technical,
        }
    }
}

impl Default for TierRate {
    fn default() -> Self {
        Self { ordinary: Money::from(150), technical: Money::from(200) }
    }
}

/// A static [`TierRateProvider`]: every writer gets the default rate unless they have an override.
///
/// Deployments that run a progression service implement [`TierRateProvider`] against it instead.
#[derive(Debug, Clone, Default)]
pub struct TierTable {
    default_rate: TierRate,
    overrides: HashMap<UserId, TierRate>,
}

impl TierTable {
    pub fn new(default_rate: TierRate) -> Self {
        Self { default_rate, overrides: HashMap::new() }
    }

    pub fn with_rate(mut self, writer: UserId, rate: TierRate) -> Self {
        self.overrides.insert(writer, rate);
        self
    }

    pub fn set_rate(&mut self, writer: UserId, rate: TierRate) {
        self.overrides.insert(writer, rate);
    }

    pub fn default_rate(&self) -> TierRate {
        self.default_rate
    }
}

impl TierRateProvider for TierTable {
    async fn rate_for_writer(&self, writer: UserId) -> Result<TierRate, TierRateError> {
        let rate = self.overrides.get(&writer).copied().unwrap_or(self.default_rate);
        trace!("🧮️ Tier rate for {writer}: {} ordinary, {} technical", rate.ordinary, rate.technical);
        Ok(rate)
    }
}
