use futures_util::future::join_all;
use gig_order_engine::{
    db_types::{Actor, BidStatus, LedgerReason, Money, OrderStatus, UserId},
    MarketplaceError,
    PaymentConfirmation,
};
use log::*;

mod support;

use support::{Marketplace, MANAGER, WRITER};

const NUM_WRITERS: i64 = 8;

#[tokio::test]
async fn concurrent_acceptance_has_exactly_one_winner() {
    let market = Marketplace::new().await;
    let order = market.order_in(OrderStatus::Approved).await;
    let mut bids = Vec::new();
    for i in 0..NUM_WRITERS {
        let bid = market.bids.place_bid(order.id, UserId(500 + i), Money::from(300 + i), None).await.unwrap();
        bids.push(bid);
    }
    info!("🚀️ Accepting {NUM_WRITERS} bids at once");
    let attempts = bids.iter().map(|bid| market.bids.accept_bid(order.id, bid.id, Actor::manager(MANAGER)));
    let results = join_all(attempts).await;

    let winners = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(winners, 1);
    for err in results.iter().filter_map(|r| r.as_ref().err()) {
        assert!(
            matches!(err, MarketplaceError::InvalidTransition { .. } | MarketplaceError::OrderNotBiddable { .. }),
            "Unexpected error for a losing acceptance: {err}"
        );
    }

    let stored = market.bids.bids_for_order(order.id).await.unwrap();
    let accepted = stored.iter().filter(|b| b.status == BidStatus::Accepted).collect::<Vec<_>>();
    assert_eq!(accepted.len(), 1);
    assert_eq!(stored.iter().filter(|b| b.status == BidStatus::Rejected).count() as i64, NUM_WRITERS - 1);

    let order = market.orders.fetch_order(order.id).await.unwrap();
    assert_eq!(order.status, OrderStatus::Assigned);
    assert_eq!(order.writer.user_id(), Some(accepted[0].writer_id));
    // The assignment fee was credited once
    assert_eq!(market.balance(MANAGER).await, Money::from(10));
    market.tear_down().await;
}

#[tokio::test]
async fn concurrent_confirmations_settle_once() {
    let market = Marketplace::new().await;
    let order_id = market.order_awaiting_payment().await.id;
    let attempts = (0..6).map(|i| {
        let reference = format!("CALLBACK-{}", i % 2);
        let payments = &market.payments;
        async move { payments.confirm_payment(order_id, Actor::system(), &reference).await }
    });
    let results = join_all(attempts).await;
    let settled = results.iter().filter(|r| matches!(r, Ok(PaymentConfirmation::Settled(_)))).count();
    let duplicates = results.iter().filter(|r| matches!(r, Ok(PaymentConfirmation::AlreadyPaid(_)))).count();
    assert_eq!(settled, 1);
    assert_eq!(duplicates, 5);

    let entries = market.ledger.entries_for_order(order_id).await.unwrap();
    assert_eq!(entries.iter().filter(|e| e.reason == LedgerReason::WriterPayout).count(), 1);
    assert_eq!(entries.iter().map(|e| e.amount).sum::<Money>(), Money::from(900));
    assert_eq!(market.balance(WRITER).await, Money::from(450));
    assert_eq!(market.payments.payment_confirmations(order_id).await.unwrap().len(), 6);
    market.tear_down().await;
}

#[tokio::test]
async fn racing_transitions_on_one_order_fail_cleanly() {
    let market = Marketplace::new().await;
    let order = market.order_in(OrderStatus::ManagerReview).await;
    let targets = [OrderStatus::Editing, OrderStatus::InProgress, OrderStatus::Editing, OrderStatus::InProgress];
    let attempts = targets.iter().map(|&to| {
        market.orders.transition(order.id, OrderStatus::ManagerReview, to, Actor::manager(MANAGER), Default::default())
    });
    let results = join_all(attempts).await;
    let winners = results.iter().filter_map(|r| r.as_ref().ok()).collect::<Vec<_>>();
    assert_eq!(winners.len(), 1);
    assert!(results.iter().filter_map(|r| r.as_ref().err()).all(|e| e.is_stale_state()));
    let stored = market.orders.fetch_order(order.id).await.unwrap();
    assert_eq!(stored.status, winners[0].status);
    market.tear_down().await;
}

#[tokio::test]
async fn orders_do_not_block_each_other() {
    let market = Marketplace::new().await;
    let mut orders = Vec::new();
    for _ in 0..5 {
        orders.push(market.order_awaiting_payment().await);
    }
    let attempts = orders
        .iter()
        .map(|order| market.payments.confirm_payment(order.id, Actor::system(), "BATCH-42"));
    let results = join_all(attempts).await;
    assert!(results.iter().all(|r| matches!(r, Ok(PaymentConfirmation::Settled(_)))));
    assert_eq!(market.balance(WRITER).await, Money::from(450 * 5));
    assert_eq!(market.balance(MANAGER).await, Money::from(30 * 5));
    market.tear_down().await;
}
