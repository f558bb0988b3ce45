use serde::{Deserialize, Serialize};

use crate::db_types::{Actor, LedgerEntry, Money, Order, OrderStatus, UserId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderStatusChangedEvent {
    pub order: Order,
    pub from: OrderStatus,
    pub to: OrderStatus,
    pub actor: Actor,
}

impl OrderStatusChangedEvent {
    pub fn new(order: Order, from: OrderStatus, to: OrderStatus, actor: Actor) -> Self {
        Self { order, from, to, actor }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderAssignedEvent {
    pub order: Order,
    pub writer: UserId,
    pub manager: UserId,
    pub writer_amount: Money,
    pub assignment_fee: Money,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderDeliveredEvent {
    pub order: Order,
    pub client: UserId,
    pub manager: Option<UserId>,
    pub submission_fee: Money,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentConfirmedEvent {
    pub order: Order,
    pub writer: Option<UserId>,
    pub manager: Option<UserId>,
    pub writer_amount: Money,
    pub manager_amount: Money,
    pub platform_margin: Money,
    pub external_reference: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevisionRequestedEvent {
    pub order: Order,
    pub writer: Option<UserId>,
    /// The reversing ledger entry, when the order had already been paid.
    pub clawback: Option<LedgerEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventType {
    OrderStatusChanged(OrderStatusChangedEvent),
    OrderAssigned(OrderAssignedEvent),
    OrderDelivered(OrderDeliveredEvent),
    PaymentConfirmed(PaymentConfirmedEvent),
    RevisionRequested(RevisionRequestedEvent),
}
