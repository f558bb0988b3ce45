use std::fmt::Debug;

use log::*;

use crate::{
    db_types::{Actor, Bid, BidId, Money, NewBid, Order, OrderId, OrderStatus, UserId},
    engine_api::{
        order_objects::TransitionMetadata,
        payouts::PayoutPolicy,
        state_machine::{OrderStateMachine, TransitionRequest},
    },
    events::EventProducers,
    traits::{MarketplaceDatabase, MarketplaceError, TierRateProvider},
};

/// Bid placement and resolution.
pub struct BidApi<B, R> {
    db: B,
    rates: R,
    machine: OrderStateMachine,
    producers: EventProducers,
}

impl<B, R> Debug for BidApi<B, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "BidApi")
    }
}

impl<B, R> BidApi<B, R> {
    pub fn new(db: B, rates: R, policy: PayoutPolicy, producers: EventProducers) -> Self {
        Self { db, rates, machine: OrderStateMachine::new(policy), producers }
    }
}

impl<B, R> BidApi<B, R>
where
    B: MarketplaceDatabase,
    R: TierRateProvider,
{
    /// Places a writer's bid on an order that is `pending` or `approved`.
    ///
    /// ## Failure modes:
    /// - [`MarketplaceError::DuplicateBid`] if the writer already has a bid on this order.
    /// - [`MarketplaceError::OrderNotBiddable`] if the order is past the biddable statuses.
    pub async fn place_bid(
        &self,
        order_id: OrderId,
        writer_id: UserId,
        amount: Money,
        message: Option<String>,
    ) -> Result<Bid, MarketplaceError> {
        let mut bid = NewBid::new(order_id, writer_id, amount);
        bid.message = message;
        let bid = self.db.insert_bid(bid).await?;
        debug!("🔄️🏷️ {} placed {} on order {order_id}", bid.writer_id, bid.id);
        Ok(bid)
    }

    pub async fn bids_for_order(&self, order_id: OrderId) -> Result<Vec<Bid>, MarketplaceError> {
        self.db.bids_for_order(order_id).await
    }

    /// Accepts the bid and assigns the order to its writer.
    ///
    /// In one unit of work, the chosen bid is marked `accepted`, every other pending bid on the order is marked
    /// `rejected`, and the order moves from `approved` to `assigned` with the writer's quote and the manager's
    /// assignment fee. If any part fails, nothing changes.
    ///
    /// When two callers race to accept bids on the same order, exactly one wins. The other receives
    /// [`MarketplaceError::InvalidTransition`], because the order has already left `approved`.
    pub async fn accept_bid(&self, order_id: OrderId, bid_id: BidId, actor: Actor) -> Result<Order, MarketplaceError> {
        let order = self.db.fetch_order(order_id).await?.ok_or(MarketplaceError::OrderNotFound(order_id))?;
        let bid = self
            .db
            .fetch_bid(bid_id)
            .await?
            .filter(|b| b.order_id == order_id)
            .ok_or(MarketplaceError::BidNotFound(bid_id))?;
        let tier = self.rates.rate_for_writer(bid.writer_id).await?;
        let expected = order.status;
        let machine = &self.machine;
        let outcome = self
            .db
            .accept_bid(order_id, bid_id, |current, bid| {
                let metadata = TransitionMetadata::default()
                    .with_writer(bid.writer_id)
                    .with_note(format!("Accepted {} for {}", bid.id, bid.amount));
                let request = TransitionRequest::new(expected, OrderStatus::Assigned, actor).with_metadata(metadata);
                machine.plan(current, &request, Some(&tier)).map(|plan| vec![plan])
            })
            .await?;
        info!("🔄️🏷️ Order {order_id} assigned to {} through {bid_id}", bid.writer_id);
        self.producers.publish_transitions(&outcome);
        Ok(outcome.into_order())
    }
}
