use log::debug;
use sqlx::SqliteConnection;

use crate::{
    db_types::{Bid, BidId, BidStatus, NewBid, OrderId},
    sqlite::db::orders,
    traits::MarketplaceError,
};

/// Inserts a new pending bid.
///
/// The insert only happens if the order is still accepting bids, and the `(order, writer)` uniqueness constraint
/// turns a second bid from the same writer into a no-op. If nothing was written, the reason is worked out afterwards
/// so that the caller receives a precise error.
pub async fn insert_bid(bid: NewBid, conn: &mut SqliteConnection) -> Result<Bid, MarketplaceError> {
    if !bid.amount.is_positive() {
        return Err(MarketplaceError::InvalidAmount(format!("A bid must be for a positive amount, not {}", bid.amount)));
    }
    let inserted: Option<Bid> = sqlx::query_as(
        r#"
            INSERT INTO bids (order_id, writer_id, amount, message)
            SELECT $1, $2, $3, $4
            WHERE EXISTS (SELECT 1 FROM orders WHERE id = $1 AND status IN ('pending', 'approved'))
            ON CONFLICT (order_id, writer_id) DO NOTHING
            RETURNING *;
        "#,
    )
    .bind(bid.order_id)
    .bind(bid.writer_id)
    .bind(bid.amount)
    .bind(bid.message.clone())
    .fetch_optional(&mut *conn)
    .await?;
    if let Some(bid) = inserted {
        debug!("🗃️ {} of {} placed by {} on order {}", bid.id, bid.amount, bid.writer_id, bid.order_id);
        return Ok(bid);
    }
    let order = orders::fetch_order(bid.order_id, conn).await?.ok_or(MarketplaceError::OrderNotFound(bid.order_id))?;
    if !order.status.is_biddable() {
        return Err(MarketplaceError::OrderNotBiddable { order_id: order.id, status: order.status });
    }
    Err(MarketplaceError::DuplicateBid { order_id: bid.order_id, writer_id: bid.writer_id })
}

pub async fn fetch_bid(bid_id: BidId, conn: &mut SqliteConnection) -> Result<Option<Bid>, sqlx::Error> {
    let bid = sqlx::query_as("SELECT * FROM bids WHERE id = $1").bind(bid_id).fetch_optional(conn).await?;
    Ok(bid)
}

pub async fn bids_for_order(order_id: OrderId, conn: &mut SqliteConnection) -> Result<Vec<Bid>, sqlx::Error> {
    let bids = sqlx::query_as("SELECT * FROM bids WHERE order_id = $1 ORDER BY created_at ASC, id ASC")
        .bind(order_id)
        .fetch_all(conn)
        .await?;
    Ok(bids)
}

/// Marks a pending bid as accepted. Fails if the bid is no longer pending.
pub(crate) async fn mark_accepted(bid: &Bid, conn: &mut SqliteConnection) -> Result<Bid, MarketplaceError> {
    let accepted: Option<Bid> = sqlx::query_as(
        "UPDATE bids SET status = 'accepted', updated_at = CURRENT_TIMESTAMP WHERE id = $1 AND status = 'pending' \
         RETURNING *",
    )
    .bind(bid.id)
    .fetch_optional(conn)
    .await?;
    accepted.ok_or(MarketplaceError::InvalidBidState { bid_id: bid.id, status: bid.status })
}

/// Rejects every bid on the order that is still pending. Returns the number of bids rejected.
pub(crate) async fn reject_pending(order_id: OrderId, conn: &mut SqliteConnection) -> Result<u64, sqlx::Error> {
    let rejected = sqlx::query(
        "UPDATE bids SET status = 'rejected', updated_at = CURRENT_TIMESTAMP WHERE order_id = $1 AND status = $2",
    )
    .bind(order_id)
    .bind(BidStatus::Pending)
    .execute(conn)
    .await?
    .rows_affected();
    if rejected > 0 {
        debug!("🗃️ {rejected} pending bids on order {order_id} were rejected");
    }
    Ok(rejected)
}
