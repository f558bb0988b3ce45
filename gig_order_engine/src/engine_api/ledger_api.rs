use std::fmt::Debug;

use log::*;

use crate::{
    db_types::{LedgerEntry, LedgerReason, Money, OrderId, UserBalance, UserId},
    traits::{BalanceReconciliation, Distribution, LedgerManagement, MarketplaceError},
};

/// Read access to balances and ledger history, and the operator-level ledger primitives.
pub struct LedgerApi<B> {
    db: B,
}

impl<B> Debug for LedgerApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "LedgerApi")
    }
}

impl<B> LedgerApi<B> {
    pub fn new(db: B) -> Self {
        Self { db }
    }
}

impl<B> LedgerApi<B>
where B: LedgerManagement
{
    pub async fn balance(&self, user_id: UserId) -> Result<UserBalance, MarketplaceError> {
        self.db.fetch_balance(user_id).await
    }

    pub async fn entries_for_user(&self, user_id: UserId) -> Result<Vec<LedgerEntry>, MarketplaceError> {
        self.db.ledger_for_user(user_id).await
    }

    pub async fn entries_for_order(&self, order_id: OrderId) -> Result<Vec<LedgerEntry>, MarketplaceError> {
        self.db.ledger_for_order(order_id).await
    }

    pub async fn credit(
        &self,
        user_id: UserId,
        order_id: OrderId,
        amount: Money,
        reason: LedgerReason,
    ) -> Result<LedgerEntry, MarketplaceError> {
        self.db.credit(user_id, order_id, amount, reason).await
    }

    pub async fn debit(
        &self,
        user_id: UserId,
        order_id: OrderId,
        amount: Money,
        reason: LedgerReason,
    ) -> Result<LedgerEntry, MarketplaceError> {
        self.db.debit(user_id, order_id, amount, reason).await
    }

    pub async fn apply_distribution(&self, distribution: &Distribution) -> Result<Vec<LedgerEntry>, MarketplaceError> {
        self.db.apply_distribution(distribution).await
    }

    /// Rebuilds the user's balance from the ledger, repairing the stored projection if it had drifted.
    pub async fn reconcile(&self, user_id: UserId) -> Result<BalanceReconciliation, MarketplaceError> {
        let result = self.db.reconcile_balance(user_id).await?;
        if !result.was_repaired() {
            debug!("💸️ {user_id} reconciled. Balance {}", result.derived.balance);
        }
        Ok(result)
    }
}
