//! # Backend contracts
//!
//! This module provides the interfaces that define the interface contracts of the order engine database *backends*,
//! and of the outside services the engine reads from.
//!
//! * [`MarketplaceDatabase`] defines the highest level of behavior for backends: storing orders and bids, and applying
//!   planned transitions atomically.
//! * [`LedgerManagement`] defines the ledger primitives. All balance changes go through this trait.
//! * [`TierRateProvider`] is the read-only seam to the writer progression service.
mod data_objects;
mod ledger_management;
mod marketplace_database;
mod tier_rates;

pub use data_objects::{AppliedTransition, BalanceReconciliation, Distribution, TransitionOutcome};
pub use ledger_management::LedgerManagement;
pub use marketplace_database::{MarketplaceDatabase, MarketplaceError};
pub use tier_rates::{TierRateError, TierRateProvider};
