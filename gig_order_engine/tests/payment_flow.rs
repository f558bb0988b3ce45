use gig_order_engine::{
    db_types::{Actor, ConfirmationOutcome, LedgerReason, Money, OrderId, OrderStatus, UserId},
    LedgerManagement,
    MarketplaceError,
    PaymentConfirmation,
    TransitionMetadata,
};

mod support;

use support::{Marketplace, ADMIN, CLIENT, MANAGER, PLATFORM, WRITER};

#[tokio::test]
async fn three_units_at_150_for_900() {
    let market = Marketplace::new().await;
    let order = market.order_awaiting_payment().await;
    assert_eq!(order.writer_amount, Money::from(450));
    assert_eq!(order.manager_assign_fee, Money::from(10));
    assert_eq!(order.manager_submit_fee, Money::from(20));
    // Both manager fees were credited before payment
    assert_eq!(market.balance(MANAGER).await, Money::from(30));
    assert_eq!(market.balance(WRITER).await, Money::zero());

    let confirmation = market.payments.confirm_payment(order.id, Actor::system(), "MPESA-QX12").await.unwrap();
    let PaymentConfirmation::Settled(result) = confirmation else { panic!("Expected the first confirmation to settle") };
    assert_eq!(result.writer_amount, Money::from(450));
    assert_eq!(result.manager_amount, Money::from(30));
    assert_eq!(result.platform_margin, Money::from(420));
    assert_eq!(result.total(), Money::from(900));
    assert_eq!(result.order.status, OrderStatus::Completed);
    assert!(result.order.payment_confirmed);
    assert!(!result.order.pricing_review);
    assert_eq!(result.order.external_reference.as_deref(), Some("MPESA-QX12"));

    let entries = market.ledger.entries_for_order(order.id).await.unwrap();
    assert_eq!(entries.len(), 4);
    assert_eq!(entries.iter().map(|e| e.amount).sum::<Money>(), Money::from(900));
    assert_eq!(market.balance(WRITER).await, Money::from(450));
    assert_eq!(market.balance(MANAGER).await, Money::from(30));
    assert_eq!(market.balance(PLATFORM).await, Money::from(420));
    assert_eq!(market.balance(CLIENT).await, Money::zero());

    let history = market.orders.history(order.id).await.unwrap();
    let statuses = history.iter().map(|h| h.to_status).collect::<Vec<_>>();
    assert_eq!(statuses.first(), Some(&OrderStatus::Pending));
    assert_eq!(&statuses[statuses.len() - 2..], &[OrderStatus::Paid, OrderStatus::Completed]);
    market.tear_down().await;
}

#[tokio::test]
async fn duplicate_confirmation_is_a_benign_no_op() {
    let market = Marketplace::new().await;
    let order = market.order_awaiting_payment().await;
    let first = market.payments.confirm_payment(order.id, Actor::system(), "MPESA-777").await.unwrap();
    let second = market.payments.confirm_payment(order.id, Actor::system(), "MPESA-777").await.unwrap();
    assert!(!first.is_duplicate());
    assert!(second.is_duplicate());
    assert_eq!(first.distribution().writer_amount, second.distribution().writer_amount);
    assert_eq!(first.distribution().platform_margin, second.distribution().platform_margin);
    assert_eq!(second.distribution().entries.len(), 4);

    assert_eq!(market.ledger.entries_for_order(order.id).await.unwrap().len(), 4);
    assert_eq!(market.balance(WRITER).await, Money::from(450));

    let signals = market.payments.payment_confirmations(order.id).await.unwrap();
    let outcomes = signals.iter().map(|s| s.outcome).collect::<Vec<_>>();
    assert_eq!(outcomes, vec![ConfirmationOutcome::Settled, ConfirmationOutcome::Duplicate]);
    assert!(signals.iter().all(|s| s.external_reference == "MPESA-777"));
    market.tear_down().await;
}

#[tokio::test]
async fn payment_needs_client_acceptance() {
    let market = Marketplace::new().await;
    let order = market.order_in(OrderStatus::Delivered).await;
    let err = market.payments.confirm_payment(order.id, Actor::system(), "EARLY").await.unwrap_err();
    assert!(matches!(err, MarketplaceError::NotApproved { status: OrderStatus::Delivered, .. }), "{err}");
    let entries = market.ledger.entries_for_order(order.id).await.unwrap();
    assert!(entries.iter().all(|e| e.reason != LedgerReason::WriterPayout));

    let err = market.payments.confirm_payment(OrderId(9999), Actor::system(), "X").await.unwrap_err();
    assert!(matches!(err, MarketplaceError::OrderNotFound(_)));
    market.tear_down().await;
}

#[tokio::test]
async fn paid_cannot_be_reached_without_a_payment_signal() {
    let market = Marketplace::new().await;
    let order = market.order_awaiting_payment().await;
    let err = market
        .orders
        .transition(order.id, OrderStatus::AcceptedByClient, OrderStatus::Paid, Actor::admin(ADMIN), Default::default())
        .await
        .unwrap_err();
    assert!(matches!(err, MarketplaceError::InvalidTransition { .. }), "{err}");
    assert_eq!(market.orders.fetch_order(order.id).await.unwrap().status, OrderStatus::AcceptedByClient);
    assert_eq!(market.balance(WRITER).await, Money::zero());
    market.tear_down().await;
}

#[tokio::test]
async fn underpriced_orders_settle_with_zero_margin_and_are_flagged() {
    let market = Marketplace::new().await;
    let order = market.new_order(3, 400).await;
    let order = market.walk(order.id, &support::HAPPY_PATH).await;
    let confirmation = market.payments.confirm_payment(order.id, Actor::system(), "LOW").await.unwrap();
    let result = confirmation.distribution();
    assert_eq!(result.platform_margin, Money::zero());
    assert!(result.order.pricing_review);
    assert_eq!(market.balance(WRITER).await, Money::from(450));
    assert_eq!(market.balance(MANAGER).await, Money::from(30));
    assert_eq!(market.balance(PLATFORM).await, Money::zero());
    let entries = market.ledger.entries_for_order(order.id).await.unwrap();
    assert!(entries.iter().all(|e| e.reason != LedgerReason::PlatformMargin));
    market.tear_down().await;
}

#[tokio::test]
async fn revision_claws_back_the_writer_only() {
    let market = Marketplace::new().await;
    let order = market.settled_order().await;
    let order = market
        .orders
        .transition(order.id, OrderStatus::Completed, OrderStatus::RevisionPending, Actor::manager(MANAGER), Default::default())
        .await
        .unwrap();
    assert_eq!(order.payout_round, 1);
    assert_eq!(market.balance(WRITER).await, Money::zero());
    assert_eq!(market.balance(MANAGER).await, Money::from(30));
    assert_eq!(market.balance(PLATFORM).await, Money::from(420));
    let writer = market.ledger.balance(WRITER).await.unwrap();
    assert_eq!(writer.lifetime_earned, Money::from(450));

    let entries = market.ledger.entries_for_order(order.id).await.unwrap();
    let clawback = entries.iter().find(|e| e.reason == LedgerReason::RevisionClawback).expect("No claw-back entry");
    assert_eq!(clawback.amount, Money::from(-450));
    assert_eq!(clawback.user_id, WRITER);
    market.tear_down().await;
}

#[tokio::test]
async fn clawback_of_an_unpaid_order_is_a_no_op() {
    let market = Marketplace::new().await;
    let order = market.order_in(OrderStatus::Delivered).await;
    assert!(market.orders.clawback(order.id).await.unwrap().is_none());
    let order = market
        .orders
        .transition(order.id, OrderStatus::Delivered, OrderStatus::RevisionPending, Actor::manager(MANAGER), Default::default())
        .await
        .unwrap();
    // Only settled orders start a new payout round
    assert_eq!(order.payout_round, 0);
    assert_eq!(market.balance(MANAGER).await, Money::from(30));
    assert_eq!(market.balance(WRITER).await, Money::zero());
    market.tear_down().await;
}

#[tokio::test]
async fn standalone_clawback_is_not_repeated_by_the_revision() {
    let market = Marketplace::new().await;
    let order = market.settled_order().await;
    let entry = market.orders.clawback(order.id).await.unwrap().expect("Expected a claw-back");
    assert_eq!(entry.amount, Money::from(-450));
    assert_eq!(market.balance(WRITER).await, Money::zero());
    // Retrying is safe
    let again = market.orders.clawback(order.id).await.unwrap().expect("Expected the same claw-back");
    assert_eq!(again.id, entry.id);

    market
        .orders
        .transition(order.id, OrderStatus::Completed, OrderStatus::RevisionPending, Actor::manager(MANAGER), Default::default())
        .await
        .unwrap();
    assert_eq!(market.balance(WRITER).await, Money::zero());
    assert_eq!(market.balance(MANAGER).await, Money::from(30));
    market.tear_down().await;
}

#[tokio::test]
async fn revised_orders_are_resettled_for_the_writer_only() {
    let market = Marketplace::new().await;
    let settled = market.settled_order().await;
    let order = market
        .walk(settled.id, &[
            OrderStatus::RevisionPending,
            OrderStatus::Editing,
            OrderStatus::Delivered,
            OrderStatus::AcceptedByClient,
            OrderStatus::Paid,
            OrderStatus::Completed,
        ])
        .await;
    assert_eq!(order.payout_round, 1);
    assert_eq!(market.balance(WRITER).await, Money::from(450));
    // No second submission fee for the re-delivery, and no second margin
    assert_eq!(market.balance(MANAGER).await, Money::from(30));
    assert_eq!(market.balance(PLATFORM).await, Money::from(420));
    let writer = market.ledger.balance(WRITER).await.unwrap();
    assert_eq!(writer.lifetime_earned, Money::from(900));

    let entries = market.ledger.entries_for_order(order.id).await.unwrap();
    let payouts = entries.iter().filter(|e| e.reason == LedgerReason::WriterPayout).map(|e| e.round).collect::<Vec<_>>();
    assert_eq!(payouts, vec![0, 1]);

    // Payment signals for the order keep being answered as duplicates
    let confirmation = market.payments.confirm_payment(order.id, Actor::system(), "LATE").await.unwrap();
    assert!(confirmation.is_duplicate());
    assert_eq!(confirmation.distribution().writer_amount, Money::from(450));
    let rounds = confirmation
        .distribution()
        .entries
        .iter()
        .filter(|e| e.reason == LedgerReason::WriterPayout)
        .map(|e| e.round)
        .collect::<Vec<_>>();
    assert_eq!(rounds, vec![1]);
    market.tear_down().await;
}

#[tokio::test]
async fn reconciliation_repairs_a_drifted_balance() {
    let market = Marketplace::new().await;
    market.settled_order().await;
    sqlx::query("UPDATE user_balances SET balance = 999 WHERE user_id = $1")
        .bind(WRITER)
        .execute(market.db.pool())
        .await
        .unwrap();
    let result = market.ledger.reconcile(WRITER).await.unwrap();
    assert!(result.was_repaired());
    assert_eq!(result.drift(), Money::from(549));
    assert_eq!(result.derived.balance, Money::from(450));
    assert_eq!(market.balance(WRITER).await, Money::from(450));

    let result = market.ledger.reconcile(WRITER).await.unwrap();
    assert!(!result.was_repaired());
    let nobody = market.ledger.reconcile(UserId(4242)).await.unwrap();
    assert!(!nobody.was_repaired());
    assert_eq!(nobody.derived.balance, Money::zero());
    market.tear_down().await;
}

#[tokio::test]
async fn ledger_primitives_only_post_adjustments() {
    let market = Marketplace::new().await;
    let order = market.new_order(1, 300).await;
    let err = market.db.credit(WRITER, order.id, Money::zero(), LedgerReason::Adjustment).await.unwrap_err();
    assert!(matches!(err, MarketplaceError::InvalidAmount(_)));
    let err = market.db.credit(WRITER, order.id, Money::from(-5), LedgerReason::Adjustment).await.unwrap_err();
    assert!(matches!(err, MarketplaceError::InvalidAmount(_)));
    let err = market.db.debit(WRITER, order.id, Money::from(-1), LedgerReason::Adjustment).await.unwrap_err();
    assert!(matches!(err, MarketplaceError::InvalidAmount(_)));
    for reason in [
        LedgerReason::AssignmentFee,
        LedgerReason::SubmissionFee,
        LedgerReason::WriterPayout,
        LedgerReason::PlatformMargin,
    ] {
        let err = market.db.credit(WRITER, order.id, Money::from(50), reason).await.unwrap_err();
        assert!(matches!(err, MarketplaceError::ReservedLedgerReason(r) if r == reason), "{err}");
    }
    let err = market.db.debit(WRITER, order.id, Money::from(7), LedgerReason::RevisionClawback).await.unwrap_err();
    assert!(matches!(err, MarketplaceError::ReservedLedgerReason(LedgerReason::RevisionClawback)), "{err}");
    let err = market.db.credit(WRITER, OrderId(9999), Money::from(5), LedgerReason::Adjustment).await.unwrap_err();
    assert!(matches!(err, MarketplaceError::OrderNotFound(_)), "{err}");
    assert!(market.ledger.entries_for_order(order.id).await.unwrap().is_empty());

    // Each adjustment is its own entry, even for the same order and user
    let first = market.ledger.credit(MANAGER, order.id, Money::from(10), LedgerReason::Adjustment).await.unwrap();
    let second = market.ledger.credit(MANAGER, order.id, Money::from(25), LedgerReason::Adjustment).await.unwrap();
    assert_ne!(first.id, second.id);
    assert_eq!((first.round, second.round), (1, 2));
    assert_eq!(market.balance(MANAGER).await, Money::from(35));

    let debit = market.ledger.debit(WRITER, order.id, Money::from(400), LedgerReason::Adjustment).await.unwrap();
    assert_eq!(debit.amount, Money::from(-400));
    assert_eq!(debit.round, 3);
    // Balances may go negative
    assert_eq!(market.balance(WRITER).await, Money::from(-400));
    market.tear_down().await;
}

#[tokio::test]
async fn adjustments_do_not_disturb_settlement() {
    let market = Marketplace::new().await;
    let order = market.order_awaiting_payment().await;
    market.ledger.credit(WRITER, order.id, Money::from(50), LedgerReason::Adjustment).await.unwrap();
    market.ledger.debit(WRITER, order.id, Money::from(7), LedgerReason::Adjustment).await.unwrap();
    market.ledger.credit(MANAGER, order.id, Money::from(5), LedgerReason::Adjustment).await.unwrap();

    let confirmation = market.payments.confirm_payment(order.id, Actor::system(), "MPESA-ADJ").await.unwrap();
    let result = confirmation.distribution();
    assert_eq!(result.total(), Money::from(900));
    assert!(result.entries.iter().all(|e| e.reason != LedgerReason::Adjustment));

    let entries = market.ledger.entries_for_order(order.id).await.unwrap();
    let settled = entries.iter().filter(|e| e.reason != LedgerReason::Adjustment).map(|e| e.amount).sum::<Money>();
    assert_eq!(settled, Money::from(900));
    assert_eq!(market.balance(WRITER).await, Money::from(493));
    assert_eq!(market.balance(MANAGER).await, Money::from(35));
    assert_eq!(market.balance(PLATFORM).await, Money::from(420));
    market.tear_down().await;
}

#[tokio::test]
async fn settlement_refuses_a_foreign_entry_under_its_key() {
    let market = Marketplace::new().await;
    let order = market.order_awaiting_payment().await;
    sqlx::query("INSERT INTO ledger_entries (user_id, order_id, amount, reason, round) VALUES ($1, $2, 50, $3, 0)")
        .bind(WRITER)
        .bind(order.id)
        .bind(LedgerReason::WriterPayout)
        .execute(market.db.pool())
        .await
        .unwrap();

    let err = market.payments.confirm_payment(order.id, Actor::system(), "MPESA-BAD").await.unwrap_err();
    let MarketplaceError::ConservationViolated { total, distributed, .. } = err else {
        panic!("Expected a conservation error, got {err}");
    };
    assert_eq!(total, Money::from(900));
    assert_eq!(distributed, Money::from(500));

    let order = market.orders.fetch_order(order.id).await.unwrap();
    assert_eq!(order.status, OrderStatus::AcceptedByClient);
    assert!(!order.payment_confirmed);
    let entries = market.ledger.entries_for_order(order.id).await.unwrap();
    assert!(entries.iter().all(|e| e.reason != LedgerReason::PlatformMargin));
    assert_eq!(market.balance(WRITER).await, Money::zero());
    assert_eq!(market.balance(PLATFORM).await, Money::zero());
    assert!(market.payments.payment_confirmations(order.id).await.unwrap().is_empty());
    market.tear_down().await;
}

#[tokio::test]
async fn revision_claws_back_exactly_the_payout_after_an_operator_debit() {
    let market = Marketplace::new().await;
    let order = market.order_awaiting_payment().await;
    market.ledger.debit(WRITER, order.id, Money::from(7), LedgerReason::Adjustment).await.unwrap();
    market.payments.confirm_payment(order.id, Actor::system(), "MPESA-7").await.unwrap();
    let before = market.balance(WRITER).await;
    assert_eq!(before, Money::from(443));

    market
        .orders
        .transition(order.id, OrderStatus::Completed, OrderStatus::RevisionPending, Actor::manager(MANAGER), Default::default())
        .await
        .unwrap();
    assert_eq!(before - market.balance(WRITER).await, Money::from(450));
    let entries = market.ledger.entries_for_order(order.id).await.unwrap();
    let clawbacks = entries.iter().filter(|e| e.reason == LedgerReason::RevisionClawback).collect::<Vec<_>>();
    assert_eq!(clawbacks.len(), 1);
    assert_eq!(clawbacks[0].amount, Money::from(-450));
    market.tear_down().await;
}

#[tokio::test]
async fn mismatched_clawback_blocks_the_revision() {
    let market = Marketplace::new().await;
    let order = market.settled_order().await;
    sqlx::query("INSERT INTO ledger_entries (user_id, order_id, amount, reason, round) VALUES ($1, $2, -7, $3, 0)")
        .bind(WRITER)
        .bind(order.id)
        .bind(LedgerReason::RevisionClawback)
        .execute(market.db.pool())
        .await
        .unwrap();
    let err = market
        .orders
        .transition(order.id, OrderStatus::Completed, OrderStatus::RevisionPending, Actor::manager(MANAGER), Default::default())
        .await
        .unwrap_err();
    assert!(matches!(err, MarketplaceError::LedgerWriteFailure(_)), "{err}");
    let order = market.orders.fetch_order(order.id).await.unwrap();
    assert_eq!(order.status, OrderStatus::Completed);
    assert_eq!(order.payout_round, 0);
    assert_eq!(market.balance(WRITER).await, Money::from(450));
    market.tear_down().await;
}

#[tokio::test]
async fn only_admins_cancel_and_settled_orders_are_clawed_back() {
    let market = Marketplace::new().await;
    let order = market.order_in(OrderStatus::InProgress).await;
    let err = market
        .orders
        .transition(order.id, OrderStatus::InProgress, OrderStatus::Cancelled, Actor::manager(MANAGER), Default::default())
        .await
        .unwrap_err();
    assert!(matches!(err, MarketplaceError::ActorNotPermitted { .. }), "{err}");
    let cancelled = market
        .orders
        .transition(
            order.id,
            OrderStatus::InProgress,
            OrderStatus::Cancelled,
            Actor::admin(ADMIN),
            TransitionMetadata::default().with_note("Client withdrew"),
        )
        .await
        .unwrap();
    assert_eq!(cancelled.status, OrderStatus::Cancelled);
    let history = market.orders.history(order.id).await.unwrap();
    let last = history.last().unwrap();
    assert_eq!(last.note.as_deref(), Some("Client withdrew"));
    assert_eq!(last.actor_id, ADMIN);

    let settled = market.settled_order().await;
    let err = market
        .orders
        .transition(settled.id, OrderStatus::Completed, OrderStatus::Cancelled, Actor::manager(MANAGER), Default::default())
        .await
        .unwrap_err();
    assert!(matches!(err, MarketplaceError::ActorNotPermitted { .. }), "{err}");
    let cancelled = market
        .orders
        .transition(settled.id, OrderStatus::Completed, OrderStatus::Cancelled, Actor::admin(ADMIN), Default::default())
        .await
        .unwrap();
    assert_eq!(cancelled.status, OrderStatus::Cancelled);
    assert_eq!(cancelled.payout_round, 1);
    assert_eq!(market.balance(WRITER).await, Money::zero());
    // Fees and margin stay where they are. The manager also kept the assignment fee of the first order.
    assert_eq!(market.balance(MANAGER).await, Money::from(40));
    assert_eq!(market.balance(PLATFORM).await, Money::from(420));
    market.tear_down().await;
}

#[tokio::test]
async fn an_order_can_be_cancelled_while_paid() {
    let market = Marketplace::new().await;
    let order = market.order_in(OrderStatus::Paid).await;
    assert_eq!(order.status, OrderStatus::Paid);
    assert_eq!(order.payout_round, 1);
    assert_eq!(market.balance(WRITER).await, Money::from(450));

    let cancelled = market
        .orders
        .transition(order.id, OrderStatus::Paid, OrderStatus::Cancelled, Actor::admin(ADMIN), Default::default())
        .await
        .unwrap();
    assert_eq!(cancelled.status, OrderStatus::Cancelled);
    assert_eq!(market.balance(WRITER).await, Money::zero());
    assert_eq!(market.balance(MANAGER).await, Money::from(30));
    assert_eq!(market.balance(PLATFORM).await, Money::from(420));
    let entries = market.ledger.entries_for_order(order.id).await.unwrap();
    let clawbacks = entries.iter().filter(|e| e.reason == LedgerReason::RevisionClawback).map(|e| e.round).collect::<Vec<_>>();
    assert_eq!(clawbacks, vec![0, 1]);
    market.tear_down().await;
}
