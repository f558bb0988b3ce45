//! Applies planned transitions to a locked order.
//!
//! Callers must already hold the order's write lock (see [`super::orders::lock_order`]) and are responsible for
//! committing or rolling back the transaction. Each plan is applied in the same order:
//!
//! 1. The ledger side effects.
//! 2. Pending bids are rejected, if the order is leaving the biddable statuses.
//! 3. The status update, guarded on the status the plan was made from.
//! 4. The status history record.
//! 5. The payment signal, if the plan settles the order.
use log::*;
use sqlx::SqliteConnection;

use crate::{
    db_types::{ConfirmationOutcome, LedgerEntry, Order},
    engine_api::state_machine::{LedgerEffect, TransitionPlan},
    sqlite::db::{bids, history, ledger, orders},
    traits::{AppliedTransition, MarketplaceError, TransitionOutcome},
};

pub async fn execute_plans(
    old_order: Order,
    plans: Vec<TransitionPlan>,
    conn: &mut SqliteConnection,
) -> Result<TransitionOutcome, MarketplaceError> {
    let mut steps = Vec::with_capacity(plans.len());
    for plan in plans {
        let step = execute_plan(&old_order, plan, conn).await?;
        steps.push(step);
    }
    Ok(TransitionOutcome { old_order, steps })
}

async fn execute_plan(
    order: &Order,
    plan: TransitionPlan,
    conn: &mut SqliteConnection,
) -> Result<AppliedTransition, MarketplaceError> {
    let order_id = order.id;
    let mut entries: Vec<LedgerEntry> = Vec::new();
    let mut clawback = None;
    for effect in &plan.effects {
        match effect {
            LedgerEffect::Credit(entry) => {
                let (stored, _) = ledger::idempotent_insert(entry.clone(), conn).await?;
                entries.push(stored);
            },
            LedgerEffect::Distribution(distribution) => {
                let stored = ledger::apply_distribution(distribution, conn).await?;
                entries.extend(stored);
            },
            LedgerEffect::Clawback { writer, round } => {
                trace!("🔄️ Clawing back round {round} payout to {writer} on order {order_id}");
                if let Some(stored) = ledger::clawback(order_id, *round, conn).await? {
                    entries.push(stored.clone());
                    clawback = Some(stored);
                }
            },
        }
    }
    if plan.reject_pending_bids {
        bids::reject_pending(order_id, conn).await?;
    }
    let updated = orders::update_order(order_id, plan.from, &plan.update, conn).await?.ok_or_else(|| {
        MarketplaceError::InvalidTransition {
            order_id,
            current: plan.from,
            requested: plan.to,
            reason: format!("Order {order_id} was no longer {} when the update was applied", plan.from),
        }
    })?;
    history::insert_status_change(order_id, Some(plan.from), plan.to, plan.actor, plan.note.clone(), conn).await?;
    if let Some(payment) = &plan.payment {
        history::insert_payment_confirmation(
            order_id,
            payment.actor,
            &payment.external_reference,
            ConfirmationOutcome::Settled,
            conn,
        )
        .await?;
    }
    debug!("🔄️ Order {order_id} moved from {} to {} by {}", plan.from, plan.to, plan.actor);
    Ok(AppliedTransition { from: plan.from, to: plan.to, actor: plan.actor, order: updated, entries, clawback })
}
