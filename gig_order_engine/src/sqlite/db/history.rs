//! The audit trail: order status changes and external payment signals.
use log::trace;
use sqlx::SqliteConnection;

use crate::{
    db_types::{Actor, ConfirmationOutcome, OrderId, OrderStatus, OrderStatusChange, PaymentConfirmationRecord},
    traits::MarketplaceError,
};

pub async fn insert_status_change(
    order_id: OrderId,
    from: Option<OrderStatus>,
    to: OrderStatus,
    actor: Actor,
    note: Option<String>,
    conn: &mut SqliteConnection,
) -> Result<OrderStatusChange, MarketplaceError> {
    let change: OrderStatusChange = sqlx::query_as(
        r#"
            INSERT INTO order_status_history (order_id, from_status, to_status, actor_id, actor_role, note)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *;
        "#,
    )
    .bind(order_id)
    .bind(from)
    .bind(to)
    .bind(actor.user_id)
    .bind(actor.role)
    .bind(note)
    .fetch_one(conn)
    .await?;
    trace!("🗃️ Recorded status change #{} for order {order_id}", change.id);
    Ok(change)
}

pub async fn status_history(
    order_id: OrderId,
    conn: &mut SqliteConnection,
) -> Result<Vec<OrderStatusChange>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM order_status_history WHERE order_id = $1 ORDER BY id ASC")
        .bind(order_id)
        .fetch_all(conn)
        .await
}

pub async fn insert_payment_confirmation(
    order_id: OrderId,
    actor: Actor,
    external_reference: &str,
    outcome: ConfirmationOutcome,
    conn: &mut SqliteConnection,
) -> Result<PaymentConfirmationRecord, MarketplaceError> {
    let record: PaymentConfirmationRecord = sqlx::query_as(
        r#"
            INSERT INTO payment_confirmations (order_id, actor_id, actor_role, external_reference, outcome)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *;
        "#,
    )
    .bind(order_id)
    .bind(actor.user_id)
    .bind(actor.role)
    .bind(external_reference)
    .bind(outcome)
    .fetch_one(conn)
    .await?;
    trace!("🗃️ Recorded {outcome} payment signal [{external_reference}] for order {order_id}");
    Ok(record)
}

pub async fn payment_confirmations(
    order_id: OrderId,
    conn: &mut SqliteConnection,
) -> Result<Vec<PaymentConfirmationRecord>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM payment_confirmations WHERE order_id = $1 ORDER BY id ASC")
        .bind(order_id)
        .fetch_all(conn)
        .await
}
