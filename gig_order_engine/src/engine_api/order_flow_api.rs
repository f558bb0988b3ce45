use std::fmt::Debug;

use log::*;

use crate::{
    db_types::{Actor, LedgerEntry, NewOrder, Order, OrderId, OrderStatus, OrderStatusChange},
    engine_api::{
        order_objects::TransitionMetadata,
        payouts::PayoutPolicy,
        state_machine::{OrderStateMachine, TransitionRequest},
    },
    events::EventProducers,
    traits::{MarketplaceDatabase, MarketplaceError, TierRateProvider},
};

/// `OrderFlowApi` is the primary API for moving orders through their lifecycle.
///
/// Every status change goes through [`Self::transition`], which plans the change with the [`OrderStateMachine`] and
/// hands the plan to the backend to apply atomically. Events are published once the change has been committed.
pub struct OrderFlowApi<B, R> {
    db: B,
    rates: R,
    machine: OrderStateMachine,
    producers: EventProducers,
}

impl<B, R> Debug for OrderFlowApi<B, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "OrderFlowApi")
    }
}

impl<B, R> OrderFlowApi<B, R> {
    pub fn new(db: B, rates: R, policy: PayoutPolicy, producers: EventProducers) -> Self {
        Self { db, rates, machine: OrderStateMachine::new(policy), producers }
    }

    pub fn db(&self) -> &B {
        &self.db
    }

    pub fn rates(&self) -> &R {
        &self.rates
    }

    pub fn policy(&self) -> &PayoutPolicy {
        self.machine.policy()
    }
}

impl<B, R> OrderFlowApi<B, R>
where
    B: MarketplaceDatabase,
    R: TierRateProvider,
{
    /// Stores a new order. It starts out `pending`, and gets a display code derived from its id unless one was given.
    pub async fn create_order(&self, order: NewOrder, actor: Actor) -> Result<Order, MarketplaceError> {
        let order = self.db.insert_order(order, actor).await?;
        debug!("🔄️📦️ Order {} [{}] created for {}", order.id, order.code, order.client_id);
        Ok(order)
    }

    pub async fn fetch_order(&self, order_id: OrderId) -> Result<Order, MarketplaceError> {
        self.db.fetch_order(order_id).await?.ok_or(MarketplaceError::OrderNotFound(order_id))
    }

    pub async fn fetch_order_by_code(&self, code: &str) -> Result<Order, MarketplaceError> {
        self.db
            .fetch_order_by_code(code)
            .await?
            .ok_or_else(|| MarketplaceError::InvalidOrder(format!("No order has the code {code}")))
    }

    pub async fn history(&self, order_id: OrderId) -> Result<Vec<OrderStatusChange>, MarketplaceError> {
        self.db.status_history(order_id).await
    }

    /// Moves the order from `from_expected` to `to`.
    ///
    /// Fails with [`MarketplaceError::InvalidTransition`] if the order is no longer in `from_expected`, or if `to` is
    /// not a legal successor. In either case the order is left untouched, and the caller should re-read it before
    /// trying again.
    ///
    /// Assigning a writer directly (rather than by accepting their bid) requires `metadata.writer`. Their tier rate
    /// is looked up before the transition starts.
    pub async fn transition(
        &self,
        order_id: OrderId,
        from_expected: OrderStatus,
        to: OrderStatus,
        actor: Actor,
        metadata: TransitionMetadata,
    ) -> Result<Order, MarketplaceError> {
        let tier = match (to, metadata.writer) {
            (OrderStatus::Assigned, Some(writer)) => Some(self.rates.rate_for_writer(writer).await?),
            _ => None,
        };
        let request = TransitionRequest::new(from_expected, to, actor).with_metadata(metadata);
        let machine = &self.machine;
        let outcome = self
            .db
            .apply_transition(order_id, |order| machine.plan(order, &request, tier.as_ref()).map(|plan| vec![plan]))
            .await
            .map_err(|e| {
                debug!("🔄️ Order {order_id} could not move from {from_expected} to {to}. {e}");
                e
            })?;
        self.producers.publish_transitions(&outcome);
        Ok(outcome.into_order())
    }

    /// Reverses the writer payout for the order's current payout round without changing its status.
    ///
    /// The claw-back that accompanies `paid/completed -> revision_pending` happens automatically as part of that
    /// transition. This entry point is for operators who need to reverse a payout on its own; because ledger entries
    /// are keyed per round, the later transition will not debit the writer a second time.
    ///
    /// Returns `None` if there was no payout to reverse.
    pub async fn clawback(&self, order_id: OrderId) -> Result<Option<LedgerEntry>, MarketplaceError> {
        let entry = self.db.clawback(order_id).await?;
        match &entry {
            Some(e) => info!("🔄️💸️ Writer payout on order {order_id} reversed: {} from {}", e.amount, e.user_id),
            None => debug!("🔄️💸️ Order {order_id} has no writer payout to reverse"),
        }
        Ok(entry)
    }
}
