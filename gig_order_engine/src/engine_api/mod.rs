//! # Order engine public API
//!
//! The `engine_api` module exposes the programmatic API for the order engine.
//! The API is modular, so that clients of the API can pick and choose the functionality they want.
//!
//! * [`order_flow_api`] creates orders and moves them through their lifecycle, including claw-backs.
//! * [`bid_api`] places bids, and resolves them by assigning the order to one writer.
//! * [`payment_api`] is the single entry point for external payment confirmations.
//! * [`ledger_api`] reads balances and ledger history, and reconciles balances against the ledger.
//!
//! The rules themselves live in [`state_machine`] (which transitions are legal and what they do) and [`payouts`]
//! (how an order's total is split). Both are pure, and are used by the APIs above.
//!
//! # API usage
//!
//! An API instance is created by supplying a database backend that implements the backend traits the API needs, plus
//! a [`crate::traits::TierRateProvider`] where writer earnings are quoted.
//!
//! ```rust,ignore
//! use gig_order_engine::{events::EventProducers, OrderFlowApi, PayoutPolicy, SqliteDatabase, TierTable};
//! let db = SqliteDatabase::new_with_url(...).await?;
//! let api = OrderFlowApi::new(db, TierTable::default(), PayoutPolicy::default(), EventProducers::default());
//! let order = api.transition(order_id, OrderStatus::Pending, OrderStatus::Approved, manager, metadata).await?;
//! ```
pub mod bid_api;
pub mod ledger_api;
pub mod order_flow_api;
pub mod order_objects;
pub mod payment_api;
pub mod payouts;
pub mod state_machine;
pub mod tier_rates;
