use std::fmt::Debug;

use log::*;

use crate::{
    db_types::{Actor, ConfirmationOutcome, OrderId, OrderStatus, PaymentConfirmationRecord},
    engine_api::{
        order_objects::{DistributionResult, PaymentConfirmation},
        payouts::PayoutPolicy,
        state_machine::{OrderStateMachine, PaymentSignal, TransitionRequest},
    },
    events::EventProducers,
    traits::{MarketplaceDatabase, MarketplaceError},
};

/// The single entry point for external payment signals, whether they come from a provider callback or a manually
/// entered confirmation code.
pub struct PaymentApi<B> {
    db: B,
    machine: OrderStateMachine,
    producers: EventProducers,
}

impl<B> Debug for PaymentApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PaymentApi")
    }
}

impl<B> PaymentApi<B> {
    pub fn new(db: B, policy: PayoutPolicy, producers: EventProducers) -> Self {
        Self { db, machine: OrderStateMachine::new(policy), producers }
    }
}

impl<B> PaymentApi<B>
where B: MarketplaceDatabase
{
    /// Confirms that the client has paid for the order.
    ///
    /// The first confirmation writes the full distribution to the ledger using the amounts quoted on the order, and
    /// moves the order through `paid` to `completed`. Any further confirmation for the same order is answered with
    /// [`PaymentConfirmation::AlreadyPaid`] and the original breakdown. Payment providers retry their callbacks, so
    /// this is a success and not an error.
    ///
    /// `external_reference` is stored for reconciliation. It is not used to detect duplicates.
    ///
    /// ## Failure modes:
    /// - [`MarketplaceError::OrderNotFound`] if the order does not exist.
    /// - [`MarketplaceError::NotApproved`] if the order is not `accepted_by_client`.
    /// - [`MarketplaceError::ConservationViolated`] if the ledger already holds a different entry under one of the
    ///   distribution's keys. Nothing is written and the order stays `accepted_by_client`.
    pub async fn confirm_payment(
        &self,
        order_id: OrderId,
        actor: Actor,
        external_reference: &str,
    ) -> Result<PaymentConfirmation, MarketplaceError> {
        let signal = PaymentSignal::new(actor, external_reference);
        let machine = &self.machine;
        let result = self
            .db
            .apply_transition(order_id, |order| {
                if order.payment_confirmed {
                    return Err(MarketplaceError::AlreadyPaid(order.id));
                }
                if order.status != OrderStatus::AcceptedByClient {
                    return Err(MarketplaceError::NotApproved { order_id: order.id, status: order.status });
                }
                let requests = [
                    TransitionRequest::new(OrderStatus::AcceptedByClient, OrderStatus::Paid, actor)
                        .with_payment(signal.clone()),
                    TransitionRequest::new(OrderStatus::Paid, OrderStatus::Completed, actor),
                ];
                machine.plan_chain(order, &requests, None)
            })
            .await;
        match result {
            Ok(outcome) => {
                self.producers.publish_transitions(&outcome);
                let distribution = DistributionResult::from_outcome(outcome);
                info!(
                    "🔄️💸️ Payment [{external_reference}] for order {order_id} confirmed by {actor}. Writer: {}, \
                     manager: {}, platform: {}",
                    distribution.writer_amount, distribution.manager_amount, distribution.platform_margin
                );
                Ok(PaymentConfirmation::Settled(distribution))
            },
            Err(MarketplaceError::AlreadyPaid(id)) => {
                info!("🔄️💸️ Order {id} has already been paid. Payment signal [{external_reference}] is a duplicate");
                if let Err(e) =
                    self.db.record_payment_signal(id, actor, external_reference, ConfirmationOutcome::Duplicate).await
                {
                    warn!("🔄️💸️ Could not record duplicate payment signal [{external_reference}] for order {id}. {e}");
                }
                let order = self.db.fetch_order(id).await?.ok_or(MarketplaceError::OrderNotFound(id))?;
                let entries = self.db.ledger_for_order(id).await?;
                Ok(PaymentConfirmation::AlreadyPaid(DistributionResult::from_entries(order, entries)))
            },
            Err(e) => {
                debug!("🔄️💸️ Payment [{external_reference}] for order {order_id} was not accepted. {e}");
                Err(e)
            },
        }
    }

    /// Every payment signal received for the order, duplicates included.
    pub async fn payment_confirmations(
        &self,
        order_id: OrderId,
    ) -> Result<Vec<PaymentConfirmationRecord>, MarketplaceError> {
        self.db.payment_confirmations(order_id).await
    }
}
