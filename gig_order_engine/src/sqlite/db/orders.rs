use log::{debug, trace};
use sqlx::{QueryBuilder, SqliteConnection};

use crate::{
    db_types::{NewOrder, Order, OrderId, OrderStatus},
    engine_api::state_machine::OrderUpdate,
    traits::MarketplaceError,
};

/// Prefix of the display codes derived from order ids.
pub const GENERATED_CODE_PREFIX: &str = "GIG-";

/// Inserts a new order into the database using the given connection. This is not atomic. You can embed this call
/// inside a transaction if you need to ensure atomicity, and pass `&mut *tx` as the connection argument.
///
/// If the order does not carry a display code, one is derived from the new order id. Caller-supplied codes may not use
/// the generated prefix, and must not already be taken.
pub async fn insert_order(order: NewOrder, conn: &mut SqliteConnection) -> Result<Order, MarketplaceError> {
    if order.total_amount.is_negative() {
        return Err(MarketplaceError::InvalidOrder(format!("The order total cannot be negative ({})", order.total_amount)));
    }
    if order.pages < 0 || order.slides < 0 || order.problems < 0 {
        return Err(MarketplaceError::InvalidOrder("Unit counts cannot be negative".to_string()));
    }
    if let Some(code) = &order.code {
        if code.to_ascii_uppercase().starts_with(GENERATED_CODE_PREFIX) {
            return Err(MarketplaceError::InvalidOrder(format!(
                "{code} uses the {GENERATED_CODE_PREFIX} prefix, which is reserved for generated codes"
            )));
        }
    }
    let id: i64 = sqlx::query_scalar(
        r#"
            INSERT INTO orders (
                code,
                client_id,
                total_amount,
                work_type,
                pages,
                slides,
                problems
            ) VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id;
        "#,
    )
    .bind(order.code.clone())
    .bind(order.client_id)
    .bind(order.total_amount)
    .bind(order.work_type.to_string())
    .bind(order.pages)
    .bind(order.slides)
    .bind(order.problems)
    .fetch_one(&mut *conn)
    .await
    .map_err(|e| {
        let taken = e.as_database_error().map(|db| db.is_unique_violation()).unwrap_or(false);
        if taken {
            MarketplaceError::InvalidOrder(format!("The code {} is already in use", order.code.as_deref().unwrap_or("")))
        } else {
            MarketplaceError::from(e)
        }
    })?;
    if order.code.is_none() {
        let code = format!("{GENERATED_CODE_PREFIX}{id:06}");
        sqlx::query("UPDATE orders SET code = $1 WHERE id = $2").bind(code).bind(id).execute(&mut *conn).await?;
    }
    let order = fetch_order(OrderId(id), conn).await?.ok_or(MarketplaceError::OrderNotFound(OrderId(id)))?;
    debug!("📝️ Order [{}] inserted with id {}", order.code, order.id);
    Ok(order)
}

pub async fn fetch_order(order_id: OrderId, conn: &mut SqliteConnection) -> Result<Option<Order>, sqlx::Error> {
    let order = sqlx::query_as("SELECT * FROM orders WHERE id = $1").bind(order_id).fetch_optional(conn).await?;
    Ok(order)
}

pub async fn fetch_order_by_code(code: &str, conn: &mut SqliteConnection) -> Result<Option<Order>, sqlx::Error> {
    let order = sqlx::query_as("SELECT * FROM orders WHERE code = $1").bind(code).fetch_optional(conn).await?;
    Ok(order)
}

/// Claims the order row for the current transaction and returns a fresh copy of it.
///
/// The claim is a no-op write, which takes SQLite's write lock before anything is read. Concurrent units of work on
/// the same order therefore run one after the other, and each one plans against the state the previous one committed.
pub(crate) async fn lock_order(order_id: OrderId, conn: &mut SqliteConnection) -> Result<Order, MarketplaceError> {
    let claimed = sqlx::query("UPDATE orders SET updated_at = updated_at WHERE id = $1")
        .bind(order_id)
        .execute(&mut *conn)
        .await?
        .rows_affected();
    if claimed == 0 {
        return Err(MarketplaceError::OrderNotFound(order_id));
    }
    fetch_order(order_id, conn).await?.ok_or(MarketplaceError::OrderNotFound(order_id))
}

/// Applies `update` to the order, but only if it is still in the `expected` status.
///
/// Returns `None` if the order was not in the expected status, or does not exist.
pub(crate) async fn update_order(
    order_id: OrderId,
    expected: OrderStatus,
    update: &OrderUpdate,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, MarketplaceError> {
    let mut builder = QueryBuilder::new("UPDATE orders SET updated_at = CURRENT_TIMESTAMP, ");
    let mut set_clause = builder.separated(", ");
    set_clause.push("status = ");
    set_clause.push_bind_unseparated(update.status.to_string());
    if let Some(writer) = update.writer {
        set_clause.push("writer_id = ");
        set_clause.push_bind_unseparated(writer.value());
    }
    if let Some(manager) = update.manager {
        set_clause.push("manager_id = ");
        set_clause.push_bind_unseparated(manager.value());
    }
    if let Some(rate) = update.writer_rate {
        set_clause.push("writer_rate = ");
        set_clause.push_bind_unseparated(rate.value());
    }
    if let Some(amount) = update.writer_amount {
        set_clause.push("writer_amount = ");
        set_clause.push_bind_unseparated(amount.value());
    }
    if let Some(fee) = update.manager_assign_fee {
        set_clause.push("manager_assign_fee = ");
        set_clause.push_bind_unseparated(fee.value());
    }
    if let Some(fee) = update.manager_submit_fee {
        set_clause.push("manager_submit_fee = ");
        set_clause.push_bind_unseparated(fee.value());
    }
    if let Some(margin) = update.platform_margin {
        set_clause.push("platform_margin = ");
        set_clause.push_bind_unseparated(margin.value());
    }
    if let Some(confirmed) = update.payment_confirmed {
        set_clause.push("payment_confirmed = ");
        set_clause.push_bind_unseparated(confirmed);
    }
    if let Some(review) = update.pricing_review {
        set_clause.push("pricing_review = ");
        set_clause.push_bind_unseparated(review);
    }
    if let Some(reference) = &update.external_reference {
        set_clause.push("external_reference = ");
        set_clause.push_bind_unseparated(reference.clone());
    }
    if update.advance_round {
        set_clause.push("payout_round = payout_round + 1");
    }
    if let Some(milestone) = update.milestone {
        set_clause.push(format!("{} = CURRENT_TIMESTAMP", milestone.column()));
    }
    builder.push(" WHERE id = ");
    builder.push_bind(order_id.value());
    builder.push(" AND status = ");
    builder.push_bind(expected.to_string());
    builder.push(" RETURNING *");
    trace!("📝️ Executing query: {}", builder.sql());
    let res = builder.build_query_as::<Order>().fetch_optional(conn).await?;
    trace!("📝️ Result of update_order: {res:?}");
    Ok(res)
}
