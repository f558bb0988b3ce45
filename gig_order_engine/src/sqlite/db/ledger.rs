//! Ledger entries and the balance projection.
//!
//! Entries are append-only (the schema refuses updates and deletes) and unique on `(order_id, reason, round)`. The
//! `user_balances` table is a projection of the ledger that is adjusted in the same transaction as every insert.
use log::*;
use sqlx::SqliteConnection;

use crate::{
    db_types::{LedgerEntry, LedgerReason, Money, NewLedgerEntry, OrderId, UserBalance, UserId},
    traits::{BalanceReconciliation, Distribution, MarketplaceError},
};

fn ledger_error(e: sqlx::Error) -> MarketplaceError {
    MarketplaceError::LedgerWriteFailure(e.to_string())
}

/// Writes the entry if its `(order, reason, round)` key is new, and adjusts the user's balance to match.
///
/// If the key already exists and holds the same user and amount, the stored entry is returned unchanged and no
/// balance is touched. If it holds anything else the write fails with [`MarketplaceError::LedgerEntryConflict`]. The
/// boolean is true if a new entry was written.
pub async fn idempotent_insert(
    entry: NewLedgerEntry,
    conn: &mut SqliteConnection,
) -> Result<(LedgerEntry, bool), MarketplaceError> {
    let inserted: Option<LedgerEntry> = sqlx::query_as(
        r#"
            INSERT INTO ledger_entries (user_id, order_id, amount, reason, round)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (order_id, reason, round) DO NOTHING
            RETURNING *;
        "#,
    )
    .bind(entry.user_id)
    .bind(entry.order_id)
    .bind(entry.amount)
    .bind(entry.reason)
    .bind(entry.round)
    .fetch_optional(&mut *conn)
    .await
    .map_err(ledger_error)?;
    match inserted {
        Some(stored) => {
            let earned = stored.amount.clamp_to_zero();
            adjust_balance(stored.user_id, stored.amount, earned, conn).await?;
            debug!(
                "💸️ {} {} for order {} ({}, round {})",
                stored.user_id, stored.amount, stored.order_id, stored.reason, stored.round
            );
            Ok((stored, true))
        },
        None => {
            let existing = fetch_entry(entry.order_id, entry.reason, entry.round, conn)
                .await?
                .ok_or_else(|| {
                    MarketplaceError::LedgerWriteFailure(format!(
                        "The {} entry for order {} was neither written nor found",
                        entry.reason, entry.order_id
                    ))
                })?;
            if existing.user_id != entry.user_id || existing.amount != entry.amount {
                warn!(
                    "💸️ A {} entry for order {} (round {}) already exists for {} of {}. The request for {} of {} is \
                     refused.",
                    entry.reason, entry.order_id, entry.round, existing.user_id, existing.amount, entry.user_id,
                    entry.amount
                );
                return Err(MarketplaceError::LedgerEntryConflict {
                    order_id: entry.order_id,
                    reason: entry.reason,
                    round: entry.round,
                    existing: existing.amount,
                    requested: entry.amount,
                });
            }
            trace!("💸️ {} entry for order {} already exists. Nothing to do", entry.reason, entry.order_id);
            Ok((existing, false))
        },
    }
}

/// Posts an operator adjustment against the order. Every adjustment is a new entry, numbered in its own sequence so
/// that it can never occupy a key that settlement or claw-back will need.
///
/// Callers must hold the order's write lock.
pub async fn post_adjustment(
    user_id: UserId,
    order_id: OrderId,
    amount: Money,
    conn: &mut SqliteConnection,
) -> Result<LedgerEntry, MarketplaceError> {
    let last: i64 = sqlx::query_scalar(
        "SELECT COALESCE(MAX(round), 0) FROM ledger_entries WHERE order_id = $1 AND reason = $2",
    )
    .bind(order_id)
    .bind(LedgerReason::Adjustment)
    .fetch_one(&mut *conn)
    .await?;
    let entry = NewLedgerEntry { user_id, order_id, amount, reason: LedgerReason::Adjustment, round: last + 1 };
    let (stored, _) = idempotent_insert(entry, conn).await?;
    info!("💸️ Adjustment #{} of {amount} for {user_id} posted against order {order_id}", stored.round);
    Ok(stored)
}

pub async fn fetch_entry(
    order_id: OrderId,
    reason: LedgerReason,
    round: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<LedgerEntry>, MarketplaceError> {
    let entry = sqlx::query_as("SELECT * FROM ledger_entries WHERE order_id = $1 AND reason = $2 AND round = $3")
        .bind(order_id)
        .bind(reason)
        .bind(round)
        .fetch_optional(conn)
        .await?;
    Ok(entry)
}

/// Writes every non-zero share of the distribution. Manager fees and the platform margin are written against round
/// zero, so they are only ever paid once per order. The writer payout is written against the distribution's round.
///
/// A share whose key already holds a different entry means the order can no longer balance, and is reported as
/// [`MarketplaceError::ConservationViolated`].
pub async fn apply_distribution(
    distribution: &Distribution,
    conn: &mut SqliteConnection,
) -> Result<Vec<LedgerEntry>, MarketplaceError> {
    let order_id = distribution.order_id;
    let shares = [
        (distribution.manager, distribution.manager_assign_fee, LedgerReason::AssignmentFee, 0),
        (distribution.manager, distribution.manager_submit_fee, LedgerReason::SubmissionFee, 0),
        (distribution.writer, distribution.writer_amount, LedgerReason::WriterPayout, distribution.round),
        (distribution.platform_account, distribution.platform_margin, LedgerReason::PlatformMargin, 0),
    ];
    let mut entries = Vec::with_capacity(shares.len());
    for (user_id, amount, reason, round) in shares {
        if amount.is_zero() {
            trace!("💸️ No {reason} to pay for order {order_id}");
            continue;
        }
        if amount.is_negative() {
            return Err(MarketplaceError::InvalidAmount(format!("The {reason} share of order {order_id} is {amount}")));
        }
        let entry = NewLedgerEntry::credit(user_id, order_id, amount, reason).in_round(round);
        let (stored, _) = idempotent_insert(entry, conn).await.map_err(|e| unbalanced(distribution, e))?;
        entries.push(stored);
    }
    info!("💸️ Distribution of {} for order {} written to the ledger", distribution.total(), order_id);
    Ok(entries)
}

fn unbalanced(distribution: &Distribution, e: MarketplaceError) -> MarketplaceError {
    let MarketplaceError::LedgerEntryConflict { reason, existing, requested, .. } = e else {
        return e;
    };
    let total = distribution.total();
    let distributed = total - requested + existing;
    error!(
        "💸️ Order {} already holds a {reason} entry of {existing} where {requested} is due. The distribution would \
         come to {distributed} against a total of {total}. Refusing to settle.",
        distribution.order_id
    );
    MarketplaceError::ConservationViolated { order_id: distribution.order_id, total, distributed }
}

/// Reverses the writer payout of the given round by writing an equal and opposite entry against the same writer.
///
/// Returns `None` if no payout was made in that round. A claw-back already on record for the round is returned as
/// is, provided it reverses exactly that payout.
pub async fn clawback(
    order_id: OrderId,
    round: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<LedgerEntry>, MarketplaceError> {
    let Some(payout) = fetch_entry(order_id, LedgerReason::WriterPayout, round, conn).await? else {
        debug!("💸️ Order {order_id} has no writer payout in round {round}. Nothing to claw back");
        return Ok(None);
    };
    let entry = NewLedgerEntry::debit(payout.user_id, order_id, payout.amount, LedgerReason::RevisionClawback)
        .in_round(round);
    let (stored, is_new) = idempotent_insert(entry, conn).await.map_err(|e| match e {
        MarketplaceError::LedgerEntryConflict { existing, .. } => {
            error!(
                "💸️ The round {round} claw-back on order {order_id} is recorded as {existing}, which does not reverse \
                 the {} payout to {}",
                payout.amount, payout.user_id
            );
            MarketplaceError::LedgerWriteFailure(format!(
                "The round {round} claw-back on order {order_id} does not match its payout of {}",
                payout.amount
            ))
        },
        e => e,
    })?;
    if is_new {
        info!("💸️ Clawed back {} from {} for order {order_id} (round {round})", payout.amount, payout.user_id);
    }
    Ok(Some(stored))
}

async fn adjust_balance(
    user_id: UserId,
    delta: Money,
    earned: Money,
    conn: &mut SqliteConnection,
) -> Result<(), MarketplaceError> {
    sqlx::query(
        r#"
            INSERT INTO user_balances (user_id, balance, lifetime_earned) VALUES ($1, $2, $3)
            ON CONFLICT (user_id) DO UPDATE SET
                balance = balance + excluded.balance,
                lifetime_earned = lifetime_earned + excluded.lifetime_earned,
                updated_at = CURRENT_TIMESTAMP;
        "#,
    )
    .bind(user_id)
    .bind(delta)
    .bind(earned)
    .execute(conn)
    .await
    .map_err(ledger_error)?;
    Ok(())
}

pub async fn fetch_balance(user_id: UserId, conn: &mut SqliteConnection) -> Result<UserBalance, MarketplaceError> {
    let balance: Option<UserBalance> = sqlx::query_as("SELECT * FROM user_balances WHERE user_id = $1")
        .bind(user_id)
        .fetch_optional(conn)
        .await?;
    Ok(balance.unwrap_or_else(|| UserBalance::new(user_id)))
}

pub async fn ledger_for_user(user_id: UserId, conn: &mut SqliteConnection) -> Result<Vec<LedgerEntry>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM ledger_entries WHERE user_id = $1 ORDER BY id ASC").bind(user_id).fetch_all(conn).await
}

pub async fn ledger_for_order(
    order_id: OrderId,
    conn: &mut SqliteConnection,
) -> Result<Vec<LedgerEntry>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM ledger_entries WHERE order_id = $1 ORDER BY id ASC")
        .bind(order_id)
        .fetch_all(conn)
        .await
}

/// Re-derives the user's balance from their ledger entries and overwrites the projection if the two disagree.
pub async fn reconcile(user_id: UserId, conn: &mut SqliteConnection) -> Result<BalanceReconciliation, MarketplaceError> {
    // Claims the write lock before reading so that no ledger write can slip in between the sum and the repair
    sqlx::query("INSERT OR IGNORE INTO user_balances (user_id) VALUES ($1)").bind(user_id).execute(&mut *conn).await?;
    let recorded = fetch_balance(user_id, conn).await?;
    let (balance, lifetime_earned): (i64, i64) = sqlx::query_as(
        r#"
            SELECT
                COALESCE(SUM(amount), 0),
                COALESCE(SUM(CASE WHEN amount > 0 THEN amount ELSE 0 END), 0)
            FROM ledger_entries WHERE user_id = $1;
        "#,
    )
    .bind(user_id)
    .fetch_one(&mut *conn)
    .await?;
    let mut derived = recorded.clone();
    derived.balance = Money::from(balance);
    derived.lifetime_earned = Money::from(lifetime_earned);
    let result = BalanceReconciliation { user_id, recorded, derived };
    if result.was_repaired() {
        warn!(
            "💸️ The balance projection for {user_id} had drifted by {}. Recorded {} ({} earned), ledger says {} ({} \
             earned). The projection has been repaired.",
            result.drift(),
            result.recorded.balance,
            result.recorded.lifetime_earned,
            result.derived.balance,
            result.derived.lifetime_earned
        );
        sqlx::query(
            "UPDATE user_balances SET balance = $1, lifetime_earned = $2, updated_at = CURRENT_TIMESTAMP WHERE \
             user_id = $3",
        )
        .bind(result.derived.balance)
        .bind(result.derived.lifetime_earned)
        .bind(user_id)
        .execute(conn)
        .await?;
    } else {
        debug!("💸️ The balance projection for {user_id} matches the ledger");
    }
    Ok(result)
}
