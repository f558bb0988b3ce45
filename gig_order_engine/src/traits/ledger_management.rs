use crate::{
    db_types::{LedgerEntry, LedgerReason, Money, OrderId, UserBalance, UserId},
    traits::{
        data_objects::{BalanceReconciliation, Distribution},
        MarketplaceError,
    },
};

/// Ledger primitives: the only way balances change.
///
/// Every entry is keyed on `(order, reason, round)`. Re-writing an identical entry is a no-op that hands back the
/// existing one, which is what makes [`apply_distribution`](LedgerManagement::apply_distribution) safe to retry. A key
/// that already holds a different user or amount is refused. Each write updates the [`UserBalance`] projection in the
/// same atomic unit as the ledger insert.
///
/// The keys of fees, payouts, the platform margin and claw-backs belong to order transitions. `credit` and `debit` are
/// for operator corrections. They only accept [`LedgerReason::Adjustment`] and post a new entry on every call.
#[allow(async_fn_in_trait)]
pub trait LedgerManagement {
    /// Credits `amount` to the user. Zero and negative amounts, and engine-owned reasons, are rejected.
    async fn credit(
        &self,
        user_id: UserId,
        order_id: OrderId,
        amount: Money,
        reason: LedgerReason,
    ) -> Result<LedgerEntry, MarketplaceError>;

    /// Debits `amount` (given as a positive number) from the user. The balance may go negative. Engine-owned reasons
    /// are rejected.
    async fn debit(
        &self,
        user_id: UserId,
        order_id: OrderId,
        amount: Money,
        reason: LedgerReason,
    ) -> Result<LedgerEntry, MarketplaceError>;

    /// Writes every entry of a payment distribution. Entries that already exist are returned rather than duplicated,
    /// so re-applying a distribution returns the original entries and leaves balances untouched. If a share's key holds
    /// a different entry the whole distribution fails with [`MarketplaceError::ConservationViolated`].
    async fn apply_distribution(&self, distribution: &Distribution) -> Result<Vec<LedgerEntry>, MarketplaceError>;

    /// Fetches the balance projection for the user. Users without any entries have a zero balance.
    async fn fetch_balance(&self, user_id: UserId) -> Result<UserBalance, MarketplaceError>;

    async fn ledger_for_user(&self, user_id: UserId) -> Result<Vec<LedgerEntry>, MarketplaceError>;

    async fn ledger_for_order(&self, order_id: OrderId) -> Result<Vec<LedgerEntry>, MarketplaceError>;

    /// Re-derives the user's balance from the ledger and overwrites the projection if it has drifted.
    async fn reconcile_balance(&self, user_id: UserId) -> Result<BalanceReconciliation, MarketplaceError>;
}
