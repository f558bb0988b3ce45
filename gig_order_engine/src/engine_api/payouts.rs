//! Payout calculator
//!
//! Pure functions that decide how much of an order's total goes to the writer, the manager and the platform. Nothing
//! in here reads the clock, the database or any other mutable state, so the same inputs always give the same split.
//!
//! | Share               | Formula                                           | Credited at                   |
//! |---------------------|---------------------------------------------------|-------------------------------|
//! | Writer              | `units * tier_rate(work_type)`                    | payment confirmation          |
//! | Manager assignment  | fixed per order                                   | `approved -> assigned`        |
//! | Manager submission  | `base + per_unit * max(units - 1, 0)`             | `editing -> delivered`        |
//! | Platform margin     | `total - writer - assignment - submission`, >= 0  | payment confirmation          |
//!
//! A platform margin that would be negative means the order was priced below what the engine has promised the writer
//! and manager. The margin is clamped to zero and the difference is reported as a `shortfall`, so that the order can
//! be flagged for review rather than silently short-paying anyone.
use serde::{Deserialize, Serialize};

use crate::{
    db_types::{Money, Order, UserId, WorkType},
    engine_api::tier_rates::TierRate,
};

pub const DEFAULT_MANAGER_ASSIGN_FEE: i64 = 10;
pub const DEFAULT_MANAGER_SUBMIT_BASE: i64 = 10;
pub const DEFAULT_MANAGER_SUBMIT_PER_UNIT: i64 = 5;
pub const DEFAULT_PLATFORM_ACCOUNT: i64 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayoutPolicy {
    pub manager_assign_fee: Money,
    pub manager_submit_base: Money,
    pub manager_submit_per_unit: Money,
    /// The account that platform margin ledger entries are written against.
    pub platform_account: UserId,
}

impl Default for PayoutPolicy {
    fn default() -> Self {
        Self {
            manager_assign_fee: Money::from(DEFAULT_MANAGER_ASSIGN_FEE),
            manager_submit_base: Money::from(DEFAULT_MANAGER_SUBMIT_BASE),
            manager_submit_per_unit: Money::from(DEFAULT_MANAGER_SUBMIT_PER_UNIT),
            platform_account: UserId(DEFAULT_PLATFORM_ACCOUNT),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payout {
    pub writer_amount: Money,
    pub manager_assign_fee: Money,
    pub manager_submit_fee: Money,
    pub platform_margin: Money,
    /// How far the total fell short of covering the writer and manager shares. Zero for correctly priced orders.
    pub shortfall: Money,
}

impl Payout {
    pub fn manager_amount(&self) -> Money {
        self.manager_assign_fee + self.manager_submit_fee
    }

    pub fn distributed(&self) -> Money {
        self.writer_amount + self.manager_amount() + self.platform_margin
    }

    pub fn needs_review(&self) -> bool {
        self.shortfall.is_positive()
    }
}

impl PayoutPolicy {
    pub fn writer_amount(&self, units: i64, work_type: WorkType, rate: &TierRate) -> Money {
        rate.for_work(work_type) * units.max(0)
    }

    pub fn submit_fee(&self, units: i64) -> Money {
        self.manager_submit_base + self.manager_submit_per_unit * (units - 1).max(0)
    }

    /// Returns the clamped platform margin and the shortfall.
    pub fn margin(&self, total: Money, writer: Money, assign_fee: Money, submit_fee: Money) -> (Money, Money) {
        let remainder = total - writer - assign_fee - submit_fee;
        (remainder.clamp_to_zero(), (-remainder).clamp_to_zero())
    }

    /// Quotes a complete payout from scratch.
    pub fn calculate(&self, units: i64, work_type: WorkType, rate: &TierRate, total: Money) -> Payout {
        let writer_amount = self.writer_amount(units, work_type, rate);
        let manager_assign_fee = self.manager_assign_fee;
        let manager_submit_fee = self.submit_fee(units);
        let (platform_margin, shortfall) = self.margin(total, writer_amount, manager_assign_fee, manager_submit_fee);
        Payout { writer_amount, manager_assign_fee, manager_submit_fee, platform_margin, shortfall }
    }

    /// Settles an order using the amounts that were fixed on it at assignment and delivery. Only the platform margin
    /// is computed here, so a writer's tier changing after assignment does not alter what they are paid.
    pub fn settle(&self, order: &Order) -> Payout {
        let (platform_margin, shortfall) = self.margin(
            order.total_amount,
            order.writer_amount,
            order.manager_assign_fee,
            order.manager_submit_fee,
        );
        Payout {
            writer_amount: order.writer_amount,
            manager_assign_fee: order.manager_assign_fee,
            manager_submit_fee: order.manager_submit_fee,
            platform_margin,
            shortfall,
        }
    }
}
