//! `SqliteDatabase` is a concrete implementation of an order engine backend.
//!
//! Unsurprisingly, it uses SQLite as the backend and implements all the traits defined in the [`crate::traits`]
//! module.
//!
//! Every unit of work that reads an order before deciding what to write starts by claiming the order row (see
//! [`orders::lock_order`]). SQLite allows a single writer at a time, so competing units of work on the same order are
//! queued behind the pool's busy timeout and each one sees what the previous one committed.
use std::fmt::Debug;

use log::*;
use sqlx::{migrate, SqlitePool};

use super::db::{bids, db_url, history, ledger, new_pool, orders, transitions};
use crate::{
    db_types::{
        Actor,
        Bid,
        BidId,
        BidStatus,
        ConfirmationOutcome,
        LedgerEntry,
        LedgerReason,
        Money,
        NewBid,
        NewOrder,
        Order,
        OrderId,
        OrderStatusChange,
        PaymentConfirmationRecord,
        UserBalance,
        UserId,
    },
    engine_api::state_machine::TransitionPlan,
    traits::{
        BalanceReconciliation,
        Distribution,
        LedgerManagement,
        MarketplaceDatabase,
        MarketplaceError,
        TransitionOutcome,
    },
};

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

impl MarketplaceDatabase for SqliteDatabase {
    fn url(&self) -> &str {
        self.url.as_str()
    }

    async fn insert_order(&self, order: NewOrder, actor: Actor) -> Result<Order, MarketplaceError> {
        let mut tx = self.pool.begin().await?;
        let order = orders::insert_order(order, &mut tx).await?;
        history::insert_status_change(order.id, None, order.status, actor, None, &mut tx).await?;
        tx.commit().await?;
        debug!("🗃️ Order {} [{}] for {} has been saved", order.id, order.code, order.client_id);
        Ok(order)
    }

    async fn fetch_order(&self, order_id: OrderId) -> Result<Option<Order>, MarketplaceError> {
        let mut conn = self.pool.acquire().await?;
        let order = orders::fetch_order(order_id, &mut conn).await?;
        Ok(order)
    }

    async fn fetch_order_by_code(&self, code: &str) -> Result<Option<Order>, MarketplaceError> {
        let mut conn = self.pool.acquire().await?;
        let order = orders::fetch_order_by_code(code, &mut conn).await?;
        Ok(order)
    }

    async fn fetch_bid(&self, bid_id: BidId) -> Result<Option<Bid>, MarketplaceError> {
        let mut conn = self.pool.acquire().await?;
        let bid = bids::fetch_bid(bid_id, &mut conn).await?;
        Ok(bid)
    }

    async fn bids_for_order(&self, order_id: OrderId) -> Result<Vec<Bid>, MarketplaceError> {
        let mut conn = self.pool.acquire().await?;
        let bids = bids::bids_for_order(order_id, &mut conn).await?;
        Ok(bids)
    }

    async fn status_history(&self, order_id: OrderId) -> Result<Vec<OrderStatusChange>, MarketplaceError> {
        let mut conn = self.pool.acquire().await?;
        let changes = history::status_history(order_id, &mut conn).await?;
        Ok(changes)
    }

    async fn payment_confirmations(
        &self,
        order_id: OrderId,
    ) -> Result<Vec<PaymentConfirmationRecord>, MarketplaceError> {
        let mut conn = self.pool.acquire().await?;
        let records = history::payment_confirmations(order_id, &mut conn).await?;
        Ok(records)
    }

    async fn insert_bid(&self, bid: NewBid) -> Result<Bid, MarketplaceError> {
        let mut conn = self.pool.acquire().await?;
        bids::insert_bid(bid, &mut conn).await
    }

    async fn apply_transition<F>(&self, order_id: OrderId, planner: F) -> Result<TransitionOutcome, MarketplaceError>
    where F: FnOnce(&Order) -> Result<Vec<TransitionPlan>, MarketplaceError> {
        let mut tx = self.pool.begin().await?;
        let order = orders::lock_order(order_id, &mut tx).await?;
        let plans = planner(&order)?;
        let outcome = transitions::execute_plans(order, plans, &mut tx).await?;
        tx.commit().await?;
        trace!("🗃️ {} transition(s) on order {order_id} committed", outcome.steps.len());
        Ok(outcome)
    }

    async fn accept_bid<F>(
        &self,
        order_id: OrderId,
        bid_id: BidId,
        planner: F,
    ) -> Result<TransitionOutcome, MarketplaceError>
    where
        F: FnOnce(&Order, &Bid) -> Result<Vec<TransitionPlan>, MarketplaceError>,
    {
        let mut tx = self.pool.begin().await?;
        let order = orders::lock_order(order_id, &mut tx).await?;
        let bid = bids::fetch_bid(bid_id, &mut tx)
            .await?
            .filter(|b| b.order_id == order_id)
            .ok_or(MarketplaceError::BidNotFound(bid_id))?;
        let plans = planner(&order, &bid)?;
        if bid.status != BidStatus::Pending {
            return Err(MarketplaceError::InvalidBidState { bid_id, status: bid.status });
        }
        let accepted = bids::mark_accepted(&bid, &mut tx).await?;
        let outcome = transitions::execute_plans(order, plans, &mut tx).await?;
        tx.commit().await?;
        info!("🗃️ {} by {} accepted for order {order_id}", accepted.id, accepted.writer_id);
        Ok(outcome)
    }

    async fn clawback(&self, order_id: OrderId) -> Result<Option<LedgerEntry>, MarketplaceError> {
        let mut tx = self.pool.begin().await?;
        let order = orders::lock_order(order_id, &mut tx).await?;
        let entry = ledger::clawback(order_id, order.payout_round, &mut tx).await?;
        tx.commit().await?;
        Ok(entry)
    }

    async fn record_payment_signal(
        &self,
        order_id: OrderId,
        actor: Actor,
        external_reference: &str,
        outcome: ConfirmationOutcome,
    ) -> Result<PaymentConfirmationRecord, MarketplaceError> {
        let mut conn = self.pool.acquire().await?;
        history::insert_payment_confirmation(order_id, actor, external_reference, outcome, &mut conn).await
    }

    async fn close(&mut self) -> Result<(), MarketplaceError> {
        self.pool.close().await;
        Ok(())
    }
}

impl LedgerManagement for SqliteDatabase {
    async fn credit(
        &self,
        user_id: UserId,
        order_id: OrderId,
        amount: Money,
        reason: LedgerReason,
    ) -> Result<LedgerEntry, MarketplaceError> {
        if !amount.is_positive() {
            return Err(MarketplaceError::InvalidAmount(format!("Credits must be positive, not {amount}")));
        }
        self.post_adjustment(user_id, order_id, amount, reason).await
    }

    async fn debit(
        &self,
        user_id: UserId,
        order_id: OrderId,
        amount: Money,
        reason: LedgerReason,
    ) -> Result<LedgerEntry, MarketplaceError> {
        if !amount.is_positive() {
            return Err(MarketplaceError::InvalidAmount(format!(
                "Debits are given as a positive amount to deduct, not {amount}"
            )));
        }
        self.post_adjustment(user_id, order_id, -amount, reason).await
    }

    async fn apply_distribution(&self, distribution: &Distribution) -> Result<Vec<LedgerEntry>, MarketplaceError> {
        let mut tx = self.pool.begin().await?;
        let entries = ledger::apply_distribution(distribution, &mut tx).await?;
        tx.commit().await?;
        Ok(entries)
    }

    async fn fetch_balance(&self, user_id: UserId) -> Result<UserBalance, MarketplaceError> {
        let mut conn = self.pool.acquire().await?;
        ledger::fetch_balance(user_id, &mut conn).await
    }

    async fn ledger_for_user(&self, user_id: UserId) -> Result<Vec<LedgerEntry>, MarketplaceError> {
        let mut conn = self.pool.acquire().await?;
        let entries = ledger::ledger_for_user(user_id, &mut conn).await?;
        Ok(entries)
    }

    async fn ledger_for_order(&self, order_id: OrderId) -> Result<Vec<LedgerEntry>, MarketplaceError> {
        let mut conn = self.pool.acquire().await?;
        let entries = ledger::ledger_for_order(order_id, &mut conn).await?;
        Ok(entries)
    }

    async fn reconcile_balance(&self, user_id: UserId) -> Result<BalanceReconciliation, MarketplaceError> {
        let mut tx = self.pool.begin().await?;
        let result = ledger::reconcile(user_id, &mut tx).await?;
        tx.commit().await?;
        Ok(result)
    }
}

impl SqliteDatabase {
    /// Creates a new database API object, using the URL in `GIG_DATABASE_URL`.
    pub async fn new(max_connections: u32) -> Result<Self, sqlx::Error> {
        let url = db_url();
        SqliteDatabase::new_with_url(url.as_str(), max_connections).await
    }

    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        trace!("Creating new database connection pool with url {url}");
        let pool = new_pool(url, max_connections).await?;
        let url = url.to_string();
        Ok(Self { url, pool })
    }

    /// Brings the schema up to date.
    pub async fn migrate(&self) -> Result<(), MarketplaceError> {
        migrate!("./src/sqlite/migrations")
            .run(&self.pool)
            .await
            .map_err(|e| MarketplaceError::DatabaseError(format!("Migration failed. {e}")))?;
        info!("🗃️ Database migrations complete");
        Ok(())
    }

    async fn post_adjustment(
        &self,
        user_id: UserId,
        order_id: OrderId,
        amount: Money,
        reason: LedgerReason,
    ) -> Result<LedgerEntry, MarketplaceError> {
        if reason.is_engine_owned() {
            return Err(MarketplaceError::ReservedLedgerReason(reason));
        }
        let mut tx = self.pool.begin().await?;
        orders::lock_order(order_id, &mut tx).await?;
        let entry = ledger::post_adjustment(user_id, order_id, amount, &mut tx).await?;
        tx.commit().await?;
        Ok(entry)
    }

    /// Returns a reference to the database connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}
