use thiserror::Error;

use crate::{
    db_types::{
        Actor,
        Bid,
        BidId,
        BidStatus,
        ConfirmationOutcome,
        LedgerEntry,
        LedgerReason,
        Money,
        NewBid,
        NewOrder,
        Order,
        OrderId,
        OrderStatus,
        OrderStatusChange,
        PaymentConfirmationRecord,
        Role,
        UserId,
    },
    engine_api::state_machine::TransitionPlan,
    traits::{data_objects::TransitionOutcome, LedgerManagement},
};

/// This trait defines the highest level of behaviour for backends supporting the order engine.
///
/// This behaviour includes:
/// * Storing and fetching orders and their bids
/// * Executing planned status transitions, together with their ledger side effects, as single atomic units of work
/// * Recording the audit trail of status changes and payment confirmations
///
/// Backends do not decide *whether* a transition is legal. That is the job of the
/// [`crate::engine_api::state_machine::OrderStateMachine`], which hands the backend a planner closure. The backend's
/// job is to run the planner against a fresh, locked copy of the order, and then apply the plan all-or-nothing.
#[allow(async_fn_in_trait)]
pub trait MarketplaceDatabase: Clone + LedgerManagement {
    /// The URL of the database
    fn url(&self) -> &str;

    /// Stores a new order with `pending` status, and records its creation in the status history.
    async fn insert_order(&self, order: NewOrder, actor: Actor) -> Result<Order, MarketplaceError>;

    async fn fetch_order(&self, order_id: OrderId) -> Result<Option<Order>, MarketplaceError>;

    /// Looks an order up by its display code.
    async fn fetch_order_by_code(&self, code: &str) -> Result<Option<Order>, MarketplaceError>;

    async fn fetch_bid(&self, bid_id: BidId) -> Result<Option<Bid>, MarketplaceError>;

    async fn bids_for_order(&self, order_id: OrderId) -> Result<Vec<Bid>, MarketplaceError>;

    /// The full status history of an order, oldest first.
    async fn status_history(&self, order_id: OrderId) -> Result<Vec<OrderStatusChange>, MarketplaceError>;

    async fn payment_confirmations(&self, order_id: OrderId)
        -> Result<Vec<PaymentConfirmationRecord>, MarketplaceError>;

    /// Inserts a new pending bid.
    ///
    /// ## Failure modes:
    /// - [`MarketplaceError::OrderNotFound`] if the order does not exist.
    /// - [`MarketplaceError::OrderNotBiddable`] if the order is not `pending` or `approved`.
    /// - [`MarketplaceError::DuplicateBid`] if the writer already has a bid on the order.
    async fn insert_bid(&self, bid: NewBid) -> Result<Bid, MarketplaceError>;

    /// Locks the order, hands the current state to `planner`, and applies the resulting plans in order.
    ///
    /// Everything happens in one database transaction: the status writes, the ledger side effects, the rejection of
    /// stale bids, and the history records. If the planner or any step fails, nothing is written.
    async fn apply_transition<F>(&self, order_id: OrderId, planner: F) -> Result<TransitionOutcome, MarketplaceError>
    where F: FnOnce(&Order) -> Result<Vec<TransitionPlan>, MarketplaceError>;

    /// Accepts `bid_id` and rejects every other pending bid on the order, then applies the plans produced by
    /// `planner`, all in the same transaction.
    ///
    /// The planner runs before the bid's own state is checked, so a caller who lost a race for the order sees the
    /// order's stale status rather than the state of a bid that was rejected by the winner.
    async fn accept_bid<F>(
        &self,
        order_id: OrderId,
        bid_id: BidId,
        planner: F,
    ) -> Result<TransitionOutcome, MarketplaceError>
    where
        F: FnOnce(&Order, &Bid) -> Result<Vec<TransitionPlan>, MarketplaceError>;

    /// Reverses the writer payout of the order's current payout round, if there was one. The order status is not
    /// touched.
    ///
    /// Returns `None` if the order has not been paid.
    async fn clawback(&self, order_id: OrderId) -> Result<Option<LedgerEntry>, MarketplaceError>;

    /// Stores an external payment signal for audit purposes.
    async fn record_payment_signal(
        &self,
        order_id: OrderId,
        actor: Actor,
        external_reference: &str,
        outcome: ConfirmationOutcome,
    ) -> Result<PaymentConfirmationRecord, MarketplaceError>;

    /// Closes the database connection.
    async fn close(&mut self) -> Result<(), MarketplaceError> {
        Ok(())
    }
}

#[derive(Debug, Clone, Error)]
pub enum MarketplaceError {
    #[error("We have an internal database engine (configuration/uptime etc.) error: {0}")]
    DatabaseError(String),
    #[error("The requested order {0} does not exist")]
    OrderNotFound(OrderId),
    #[error("The requested bid {0} does not exist")]
    BidNotFound(BidId),
    #[error("Order {order_id} cannot move from {current} to {requested}. {reason}")]
    InvalidTransition { order_id: OrderId, current: OrderStatus, requested: OrderStatus, reason: String },
    #[error("{writer_id} has already placed a bid on order {order_id}")]
    DuplicateBid { order_id: OrderId, writer_id: UserId },
    #[error("Order {order_id} is {status} and is not accepting bids")]
    OrderNotBiddable { order_id: OrderId, status: OrderStatus },
    #[error("{bid_id} is {status} and cannot be accepted")]
    InvalidBidState { bid_id: BidId, status: BidStatus },
    #[error("Payment for order {0} has already been confirmed")]
    AlreadyPaid(OrderId),
    #[error("Order {order_id} is {status}. Payment can only be confirmed once the client has accepted the work")]
    NotApproved { order_id: OrderId, status: OrderStatus },
    #[error("Could not write to the ledger. {0}")]
    LedgerWriteFailure(String),
    #[error(
        "The {reason} entry for order {order_id} (round {round}) already exists as {existing}. It cannot be rewritten \
         as {requested}"
    )]
    LedgerEntryConflict { order_id: OrderId, reason: LedgerReason, round: i64, existing: Money, requested: Money },
    #[error("{0} entries are written by order transitions and cannot be posted directly")]
    ReservedLedgerReason(LedgerReason),
    #[error("Invalid amount. {0}")]
    InvalidAmount(String),
    #[error("Invalid order. {0}")]
    InvalidOrder(String),
    #[error("A {role} is not permitted to {action}")]
    ActorNotPermitted { role: Role, action: String },
    #[error("Order {order_id} needs a {party} before it can be {status}")]
    MissingAssignee { order_id: OrderId, party: &'static str, status: OrderStatus },
    #[error("The writer's tier rate is unavailable. {0}")]
    TierRateUnavailable(String),
    #[error("Order {order_id} does not balance: {distributed} distributed against a total of {total}")]
    ConservationViolated { order_id: OrderId, total: Money, distributed: Money },
}

impl MarketplaceError {
    /// True for errors that mean "re-read the order and try again".
    pub fn is_stale_state(&self) -> bool {
        matches!(self, MarketplaceError::InvalidTransition { .. })
    }
}

impl From<sqlx::Error> for MarketplaceError {
    fn from(e: sqlx::Error) -> Self {
        MarketplaceError::DatabaseError(e.to_string())
    }
}
