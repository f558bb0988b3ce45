//! Gig Order Engine
//!
//! The order engine runs the lifecycle of a freelance order, from the client posting it, through bidding, assignment,
//! review, editing and delivery, to payment, and distributes the client's payment between the writer, the supervising
//! manager and the platform.
//!
//! The library is divided into these sections:
//! 1. The backend contracts ([`mod@traits`]) and the SQLite backend that implements them ([`SqliteDatabase`]). You
//!    should never need to access the database directly. Instead, use the public API provided by the engine. The
//!    exception is the data types used in the database. These are defined in the [`mod@db_types`] module and are
//!    public.
//! 2. The engine's public API ([`mod@engine_api`]): order flow, bid resolution, payment confirmation and the ledger.
//!    The rules that decide what a transition does, and how much each party is paid, live here too.
//! 3. Configuration from the environment ([`mod@config`]).
//!
//! The engine also provides a set of events that can be subscribed to. These events are emitted once a change has
//! been committed. For example, when an order is assigned, an `OrderAssignedEvent` is emitted with the writer's quote
//! and the manager's fee. A simple Actor framework is used so that you can easily hook into these events and perform
//! custom actions, such as sending notifications. A slow or failing hook never holds up the engine.
pub mod config;
pub mod db_types;
pub mod engine_api;
pub mod events;
#[cfg(feature = "sqlite")]
pub mod sqlite;
pub mod traits;

#[cfg(any(feature = "test_utils", test))]
pub mod test_utils;

pub use config::EngineConfig;
pub use engine_api::{
    bid_api::BidApi,
    ledger_api::LedgerApi,
    order_flow_api::OrderFlowApi,
    order_objects::{DistributionResult, PaymentConfirmation, TransitionMetadata},
    payment_api::PaymentApi,
    payouts::{Payout, PayoutPolicy},
    state_machine::OrderStateMachine,
    tier_rates::{TierRate, TierTable},
};
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteDatabase;
pub use traits::{LedgerManagement, MarketplaceDatabase, MarketplaceError, TierRateProvider};
