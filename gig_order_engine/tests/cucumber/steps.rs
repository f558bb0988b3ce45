use std::time::Duration;

use cucumber::{then, when};
use futures_util::future::join_all;
use gig_order_engine::{
    db_types::{Actor, LedgerReason, Money, OrderStatus, Role, UserId},
    TransitionMetadata,
};

use crate::{
    cucumber::MarketplaceWorld,
    support::{HAPPY_PATH, MANAGER, WRITER},
};

fn parse_status(s: &str) -> OrderStatus {
    s.parse().unwrap_or_else(|e| panic!("{e:?}"))
}

#[when(expr = "the client places order {word} for {int} ordinary units at {int} KES")]
async fn place_order(world: &mut MarketplaceWorld, name: String, units: i64, total: i64) {
    let order = world.market().new_order(units, total).await;
    world.orders.insert(name, order.id);
}

#[when(expr = "order {word} is taken through to client acceptance")]
async fn walk_to_acceptance(world: &mut MarketplaceWorld, name: String) {
    let id = world.order_id(&name);
    world.market().walk(id, &HAPPY_PATH).await;
}

#[when(expr = "the manager moves order {word} to {word}")]
async fn manager_moves(world: &mut MarketplaceWorld, name: String, to: String) {
    let id = world.order_id(&name);
    let to = parse_status(&to);
    let market = world.market();
    let result = match market.orders.fetch_order(id).await {
        Ok(order) => {
            let metadata = match to {
                OrderStatus::Assigned => TransitionMetadata::default().with_writer(WRITER),
                _ => TransitionMetadata::default(),
            };
            market.orders.transition(id, order.status, to, Actor::manager(MANAGER), metadata).await
        },
        Err(e) => Err(e),
    };
    world.record(result);
}

#[when(expr = "the payment provider confirms payment for order {word} with reference {string}")]
async fn confirm_payment(world: &mut MarketplaceWorld, name: String, reference: String) {
    let id = world.order_id(&name);
    let result = world.market().payments.confirm_payment(id, Actor::system(), &reference).await;
    world.confirmations.push(result.clone());
    world.record(result);
}

#[when(expr = "the payment provider confirms payment for order {word} {int} times at once")]
async fn confirm_payment_burst(world: &mut MarketplaceWorld, name: String, count: usize) {
    let id = world.order_id(&name);
    let market = world.market();
    let calls = (0..count).map(|i| {
        let reference = format!("MPESA-BURST-{i}");
        async move { market.payments.confirm_payment(id, Actor::system(), &reference).await }
    });
    let results = join_all(calls).await;
    world.confirmations.extend(results);
}

#[when(expr = "{int} writers bid on order {word} and the manager accepts every bid at once")]
async fn bid_race(world: &mut MarketplaceWorld, writers: i64, name: String) {
    let id = world.order_id(&name);
    let market = world.market();
    let mut bids = Vec::new();
    for i in 0..writers {
        let bid = market.bids.place_bid(id, UserId(1_000 + i), Money::from(400), None).await.expect("Bid refused");
        bids.push(bid);
    }
    let accepts = bids.iter().map(|bid| market.bids.accept_bid(id, bid.id, Actor::manager(MANAGER)));
    let results = join_all(accepts).await;
    world.accepted = results;
}

#[when(expr = "I pause for {int}ms")]
async fn pause(_world: &mut MarketplaceWorld, ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}

#[then(expr = "order {word} is {word}")]
async fn order_status(world: &mut MarketplaceWorld, name: String, status: String) {
    let id = world.order_id(&name);
    let order = world.market().orders.fetch_order(id).await.expect("Order not found");
    assert_eq!(order.status, parse_status(&status));
}

#[then(expr = "user {int} has a balance of {int} KES")]
async fn user_balance(world: &mut MarketplaceWorld, user: i64, balance: i64) {
    let actual = world.market().balance(UserId(user)).await;
    assert_eq!(actual, Money::from(balance), "Balance for user {user}");
}

#[then(expr = "the writer has a balance of {int} KES")]
async fn writer_balance(world: &mut MarketplaceWorld, balance: i64) {
    let actual = world.market().balance(WRITER).await;
    assert_eq!(actual, Money::from(balance));
}

#[then(expr = "the manager has a balance of {int} KES")]
async fn manager_balance(world: &mut MarketplaceWorld, balance: i64) {
    let actual = world.market().balance(MANAGER).await;
    assert_eq!(actual, Money::from(balance));
}

#[then(expr = "the platform has a balance of {int} KES")]
async fn platform_balance(world: &mut MarketplaceWorld, balance: i64) {
    let platform = world.market().orders.policy().platform_account;
    let actual = world.market().balance(platform).await;
    assert_eq!(actual, Money::from(balance));
}

#[then(expr = "order {word} distributes {int} to the writer, {int} to the manager and {int} to the platform")]
async fn order_distribution(world: &mut MarketplaceWorld, name: String, writer: i64, manager: i64, platform: i64) {
    let id = world.order_id(&name);
    let order = world.market().orders.fetch_order(id).await.expect("Order not found");
    assert_eq!(order.writer_amount, Money::from(writer));
    assert_eq!(order.manager_amount(), Money::from(manager));
    assert_eq!(order.platform_margin, Money::from(platform));
    assert_eq!(order.distributed_amount(), order.total_amount);
}

#[then(expr = "order {word} has {int} {word} ledger entries")]
async fn ledger_entry_count(world: &mut MarketplaceWorld, name: String, count: usize, reason: String) {
    let id = world.order_id(&name);
    let reason = reason.parse::<LedgerReason>().unwrap_or_else(|e| panic!("{e:?}"));
    let entries = world.market().ledger.entries_for_order(id).await.expect("Error fetching ledger");
    let n = entries.iter().filter(|e| e.reason == reason).count();
    assert_eq!(n, count, "{reason} entries for order {name}");
}

#[then(expr = "{int} confirmation settled the order and {int} reported it as already paid")]
async fn confirmation_tally(world: &mut MarketplaceWorld, settled: usize, duplicates: usize) {
    let ok = world.confirmations.iter().filter_map(|r| r.as_ref().ok()).collect::<Vec<_>>();
    assert_eq!(ok.len(), world.confirmations.len(), "A confirmation failed: {:?}", world.confirmations);
    assert_eq!(ok.iter().filter(|c| !c.is_duplicate()).count(), settled);
    assert_eq!(ok.iter().filter(|c| c.is_duplicate()).count(), duplicates);
    let first = ok[0].distribution();
    assert!(ok.iter().all(|c| c.distribution().total() == first.total()));
}

#[then(expr = "exactly one bid acceptance succeeded")]
async fn single_winner(world: &mut MarketplaceWorld) {
    let winners = world.accepted.iter().filter(|r| r.is_ok()).count();
    assert_eq!(winners, 1, "{:?}", world.accepted);
}

#[then(expr = "the request failed with {word}")]
async fn request_failed(world: &mut MarketplaceWorld, kind: String) {
    let err = world.last_error.as_ref().expect("The last request succeeded");
    let debug = format!("{err:?}");
    assert!(debug.starts_with(&kind), "Expected {kind}, got {debug}");
}

#[then(expr = "order {word} has a status history of {int} entries")]
async fn history_length(world: &mut MarketplaceWorld, name: String, count: usize) {
    let id = world.order_id(&name);
    let history = world.market().orders.history(id).await.expect("Error fetching history");
    assert_eq!(history.len(), count);
    assert!(history.windows(2).all(|w| w[0].to_status == w[1].from_status.unwrap_or(w[1].to_status)));
}

#[then(expr = "a {word} cannot cancel order {word}")]
async fn cancellation_refused(world: &mut MarketplaceWorld, role: String, name: String) {
    let id = world.order_id(&name);
    let role = role.parse::<Role>().unwrap_or_else(|e| panic!("{e:?}"));
    let market = world.market();
    let order = market.orders.fetch_order(id).await.expect("Order not found");
    let err = market
        .orders
        .transition(id, order.status, OrderStatus::Cancelled, Actor::new(UserId(7), role), Default::default())
        .await
        .expect_err("Cancellation should be refused");
    world.last_error = Some(err);
}
