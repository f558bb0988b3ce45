use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Utc};
pub use gig_common::Money;
use log::error;
use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqliteRow, FromRow, Row, Type};
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[error("Conversion error: {0}")]
pub struct ConversionError(String);

//--------------------------------------        OrderId        ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
#[serde(transparent)]
pub struct OrderId(pub i64);

impl From<i64> for OrderId {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl FromStr for OrderId {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim_start_matches('#')
            .parse::<i64>()
            .map(Self)
            .map_err(|e| ConversionError(format!("Invalid order id {s}: {e}")))
    }
}

impl Display for OrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl OrderId {
    pub fn value(&self) -> i64 {
        self.0
    }
}

//--------------------------------------        UserId         ---------------------------------------------------------
/// The id of a marketplace participant: client, writer, manager, administrator, or the platform's own account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
#[serde(transparent)]
pub struct UserId(pub i64);

impl From<i64> for UserId {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl FromStr for UserId {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<i64>().map(Self).map_err(|e| ConversionError(format!("Invalid user id {s}: {e}")))
    }
}

impl Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "user#{}", self.0)
    }
}

impl UserId {
    pub fn value(&self) -> i64 {
        self.0
    }
}

//--------------------------------------         BidId         ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
#[serde(transparent)]
pub struct BidId(pub i64);

impl From<i64> for BidId {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl Display for BidId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "bid#{}", self.0)
    }
}

impl BidId {
    pub fn value(&self) -> i64 {
        self.0
    }
}

//--------------------------------------       Assignee        ---------------------------------------------------------
/// A party slot on an order (writer or manager) that is empty until somebody is assigned to it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Assignee {
    #[default]
    Unassigned,
    AssignedTo(UserId),
}

impl Assignee {
    pub fn user_id(&self) -> Option<UserId> {
        match self {
            Assignee::Unassigned => None,
            Assignee::AssignedTo(id) => Some(*id),
        }
    }

    pub fn is_assigned(&self) -> bool {
        matches!(self, Assignee::AssignedTo(_))
    }
}

impl From<Option<i64>> for Assignee {
    fn from(value: Option<i64>) -> Self {
        match value {
            Some(id) => Assignee::AssignedTo(UserId(id)),
            None => Assignee::Unassigned,
        }
    }
}

impl From<UserId> for Assignee {
    fn from(value: UserId) -> Self {
        Assignee::AssignedTo(value)
    }
}

impl Display for Assignee {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Assignee::Unassigned => write!(f, "unassigned"),
            Assignee::AssignedTo(id) => write!(f, "{id}"),
        }
    }
}

//--------------------------------------      OrderStatus      ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// The client has posted the order and it is waiting for approval.
    Pending,
    /// A manager has approved the order. Writers may bid on it.
    Approved,
    /// A writer has been assigned, either by accepting their bid or directly by a manager.
    Assigned,
    /// The writer is working on the order.
    InProgress,
    /// The writer has submitted work and the manager is reviewing it.
    ManagerReview,
    /// The manager has passed the work on for editing.
    Editing,
    /// The finished work has been delivered to the client.
    Delivered,
    /// The client has accepted the delivered work and payment may be confirmed.
    AcceptedByClient,
    /// Payment has been confirmed and the earnings have been distributed.
    Paid,
    /// The order is closed.
    Completed,
    /// The client asked for changes. Paid orders that enter this state have the writer's payout clawed back.
    RevisionPending,
    /// The order was cancelled by an administrator.
    Cancelled,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 12] = [
        OrderStatus::Pending,
        OrderStatus::Approved,
        OrderStatus::Assigned,
        OrderStatus::InProgress,
        OrderStatus::ManagerReview,
        OrderStatus::Editing,
        OrderStatus::Delivered,
        OrderStatus::AcceptedByClient,
        OrderStatus::Paid,
        OrderStatus::Completed,
        OrderStatus::RevisionPending,
        OrderStatus::Cancelled,
    ];

    /// The statuses an order in this status may legally move to.
    pub fn successors(&self) -> &'static [OrderStatus] {
        use OrderStatus::*;
        match self {
            Pending => &[Approved, Cancelled],
            Approved => &[Assigned, Cancelled],
            Assigned => &[InProgress, Cancelled],
            InProgress => &[ManagerReview, Cancelled],
            ManagerReview => &[Editing, InProgress, Cancelled],
            Editing => &[Delivered, Cancelled],
            Delivered => &[AcceptedByClient, RevisionPending, Cancelled],
            AcceptedByClient => &[Paid, Cancelled],
            Paid => &[Completed, RevisionPending, Cancelled],
            Completed => &[RevisionPending, Cancelled],
            RevisionPending => &[InProgress, Editing, Cancelled],
            Cancelled => &[],
        }
    }

    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        self.successors().contains(&next)
    }

    pub fn is_terminal(&self) -> bool {
        self.successors().is_empty()
    }

    /// Writers may only bid on orders in these statuses.
    pub fn is_biddable(&self) -> bool {
        matches!(self, OrderStatus::Pending | OrderStatus::Approved)
    }

    /// Every status but `cancelled` itself. Cancelling a settled order claws back the writer payout.
    pub fn is_cancellable(&self) -> bool {
        self.can_transition_to(OrderStatus::Cancelled)
    }

    pub fn is_settled(&self) -> bool {
        matches!(self, OrderStatus::Paid | OrderStatus::Completed)
    }

    pub fn as_str(&self) -> &'static str {
        use OrderStatus::*;
        match self {
            Pending => "pending",
            Approved => "approved",
            Assigned => "assigned",
            InProgress => "in_progress",
            ManagerReview => "manager_review",
            Editing => "editing",
            Delivered => "delivered",
            AcceptedByClient => "accepted_by_client",
            Paid => "paid",
            Completed => "completed",
            RevisionPending => "revision_pending",
            Cancelled => "cancelled",
        }
    }
}

impl Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OrderStatus::ALL
            .iter()
            .find(|status| status.as_str() == s)
            .copied()
            .ok_or_else(|| ConversionError(format!("Invalid order status: {s}")))
    }
}

impl From<String> for OrderStatus {
    fn from(value: String) -> Self {
        value.parse().unwrap_or_else(|_| {
            error!("Invalid order status: {value}. But this conversion cannot fail. Defaulting to Pending");
            OrderStatus::Pending
        })
    }
}

//--------------------------------------        WorkType       ---------------------------------------------------------
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum WorkType {
    #[default]
    Ordinary,
    Technical,
}

impl Display for WorkType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkType::Ordinary => write!(f, "ordinary"),
            WorkType::Technical => write!(f, "technical"),
        }
    }
}

impl FromStr for WorkType {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ordinary" => Ok(Self::Ordinary),
            "technical" => Ok(Self::Technical),
            s => Err(ConversionError(format!("Invalid work type: {s}"))),
        }
    }
}

//--------------------------------------          Role         ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Client,
    Writer,
    Manager,
    Admin,
    /// Automated callers, such as payment provider callbacks.
    System,
}

impl Role {
    pub fn may_override(&self) -> bool {
        matches!(self, Role::Admin | Role::System)
    }
}

impl Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Role::Client => "client",
            Role::Writer => "writer",
            Role::Manager => "manager",
            Role::Admin => "admin",
            Role::System => "system",
        };
        f.write_str(s)
    }
}

impl FromStr for Role {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "client" => Ok(Self::Client),
            "writer" => Ok(Self::Writer),
            "manager" => Ok(Self::Manager),
            "admin" => Ok(Self::Admin),
            "system" => Ok(Self::System),
            s => Err(ConversionError(format!("Invalid role: {s}"))),
        }
    }
}

/// Whoever is asking the engine to do something.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: UserId,
    pub role: Role,
}

impl Actor {
    pub fn new(user_id: UserId, role: Role) -> Self {
        Self { user_id, role }
    }

    pub fn admin(user_id: UserId) -> Self {
        Self::new(user_id, Role::Admin)
    }

    pub fn manager(user_id: UserId) -> Self {
        Self::new(user_id, Role::Manager)
    }

    pub fn system() -> Self {
        Self::new(UserId(0), Role::System)
    }
}

impl Display for Actor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.user_id, self.role)
    }
}

//--------------------------------------         Order         ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    /// Human-readable display code. Never changes once it has been assigned.
    pub code: String,
    pub client_id: UserId,
    pub writer: Assignee,
    pub manager: Assignee,
    pub total_amount: Money,
    pub work_type: WorkType,
    pub pages: i64,
    pub slides: i64,
    pub problems: i64,
    /// The writer's per-unit rate, fixed when the order was assigned.
    pub writer_rate: Money,
    pub writer_amount: Money,
    pub manager_assign_fee: Money,
    pub manager_submit_fee: Money,
    pub platform_margin: Money,
    pub payment_confirmed: bool,
    /// Set when the order's pricing could not cover every party's share.
    pub pricing_review: bool,
    /// Incremented every time a paid order is clawed back for revision.
    pub payout_round: i64,
    pub external_reference: Option<String>,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub approved_at: Option<DateTime<Utc>>,
    pub assigned_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub paid_at: Option<DateTime<Utc>>,
}

impl Order {
    pub fn units(&self) -> i64 {
        self.pages + self.slides + self.problems
    }

    pub fn manager_amount(&self) -> Money {
        self.manager_assign_fee + self.manager_submit_fee
    }

    pub fn distributed_amount(&self) -> Money {
        self.writer_amount + self.manager_amount() + self.platform_margin
    }
}

impl<'r> FromRow<'r, SqliteRow> for Order {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            code: row.try_get("code")?,
            client_id: row.try_get("client_id")?,
            writer: Assignee::from(row.try_get::<Option<i64>, _>("writer_id")?),
            manager: Assignee::from(row.try_get::<Option<i64>, _>("manager_id")?),
            total_amount: row.try_get("total_amount")?,
            work_type: row.try_get("work_type")?,
            pages: row.try_get("pages")?,
            slides: row.try_get("slides")?,
            problems: row.try_get("problems")?,
            writer_rate: row.try_get("writer_rate")?,
            writer_amount: row.try_get("writer_amount")?,
            manager_assign_fee: row.try_get("manager_assign_fee")?,
            manager_submit_fee: row.try_get("manager_submit_fee")?,
            platform_margin: row.try_get("platform_margin")?,
            payment_confirmed: row.try_get("payment_confirmed")?,
            pricing_review: row.try_get("pricing_review")?,
            payout_round: row.try_get("payout_round")?,
            external_reference: row.try_get("external_reference")?,
            status: row.try_get("status")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            approved_at: row.try_get("approved_at")?,
            assigned_at: row.try_get("assigned_at")?,
            delivered_at: row.try_get("delivered_at")?,
            paid_at: row.try_get("paid_at")?,
        })
    }
}

//--------------------------------------        NewOrder       ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewOrder {
    pub client_id: UserId,
    /// If omitted, a code is derived from the order id when the order is stored.
    pub code: Option<String>,
    pub total_amount: Money,
    pub work_type: WorkType,
    pub pages: i64,
    pub slides: i64,
    pub problems: i64,
}

impl NewOrder {
    pub fn new(client_id: UserId, total_amount: Money) -> Self {
        Self {
            client_id,
            code: None,
            total_amount,
            work_type: WorkType::Ordinary,
            pages: 0,
            slides: 0,
            problems: 0,
        }
    }

    pub fn with_code<S: Into<String>>(mut self, code: S) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_work_type(mut self, work_type: WorkType) -> Self {
        self.work_type = work_type;
        self
    }

    pub fn with_units(mut self, pages: i64, slides: i64, problems: i64) -> Self {
        self.pages = pages;
        self.slides = slides;
        self.problems = problems;
        self
    }

    pub fn units(&self) -> i64 {
        self.pages + self.slides + self.problems
    }
}

//--------------------------------------          Bid          ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum BidStatus {
    Pending,
    Accepted,
    Rejected,
}

impl Display for BidStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BidStatus::Pending => write!(f, "pending"),
            BidStatus::Accepted => write!(f, "accepted"),
            BidStatus::Rejected => write!(f, "rejected"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Bid {
    pub id: BidId,
    pub order_id: OrderId,
    pub writer_id: UserId,
    pub amount: Money,
    pub message: Option<String>,
    pub status: BidStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewBid {
    pub order_id: OrderId,
    pub writer_id: UserId,
    pub amount: Money,
    pub message: Option<String>,
}

impl NewBid {
    pub fn new(order_id: OrderId, writer_id: UserId, amount: Money) -> Self {
        Self { order_id, writer_id, amount, message: None }
    }

    pub fn with_message<S: Into<String>>(mut self, message: S) -> Self {
        self.message = Some(message.into());
        self
    }
}

//--------------------------------------      LedgerEntry      ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum LedgerReason {
    AssignmentFee,
    SubmissionFee,
    WriterPayout,
    PlatformMargin,
    RevisionClawback,
    /// An operator correction, posted through the ledger primitives. May be a credit or a debit.
    Adjustment,
}

impl LedgerReason {
    /// Reasons that always reduce a balance.
    pub fn is_debit(&self) -> bool {
        matches!(self, LedgerReason::RevisionClawback)
    }

    /// Entries with these reasons are only ever written by order transitions. Their `(order, reason, round)` keys
    /// belong to settlement and claw-back, so the ledger primitives refuse them.
    pub fn is_engine_owned(&self) -> bool {
        !matches!(self, LedgerReason::Adjustment)
    }
}

impl Display for LedgerReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LedgerReason::AssignmentFee => "assignment-fee",
            LedgerReason::SubmissionFee => "submission-fee",
            LedgerReason::WriterPayout => "writer-payout",
            LedgerReason::PlatformMargin => "platform-margin",
            LedgerReason::RevisionClawback => "revision-clawback",
            LedgerReason::Adjustment => "adjustment",
        };
        f.write_str(s)
    }
}

impl FromStr for LedgerReason {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "assignment-fee" => Ok(Self::AssignmentFee),
            "submission-fee" => Ok(Self::SubmissionFee),
            "writer-payout" => Ok(Self::WriterPayout),
            "platform-margin" => Ok(Self::PlatformMargin),
            "revision-clawback" => Ok(Self::RevisionClawback),
            "adjustment" => Ok(Self::Adjustment),
            s => Err(ConversionError(format!("Invalid ledger reason: {s}"))),
        }
    }
}

/// An immutable balance change. Claw-backs are new entries with a negative amount.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: i64,
    pub user_id: UserId,
    pub order_id: OrderId,
    /// Signed. Credits are positive, debits negative.
    pub amount: Money,
    pub reason: LedgerReason,
    /// The payout round of the order that this entry belongs to.
    pub round: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewLedgerEntry {
    pub user_id: UserId,
    pub order_id: OrderId,
    pub amount: Money,
    pub reason: LedgerReason,
    pub round: i64,
}

impl NewLedgerEntry {
    pub fn credit(user_id: UserId, order_id: OrderId, amount: Money, reason: LedgerReason) -> Self {
        Self { user_id, order_id, amount, reason, round: 0 }
    }

    pub fn debit(user_id: UserId, order_id: OrderId, amount: Money, reason: LedgerReason) -> Self {
        Self { user_id, order_id, amount: -amount, reason, round: 0 }
    }

    pub fn in_round(mut self, round: i64) -> Self {
        self.round = round;
        self
    }
}

//--------------------------------------      UserBalance      ---------------------------------------------------------
/// The running totals for a user, derived from their ledger entries.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct UserBalance {
    pub user_id: UserId,
    /// The sum of all ledger entries. May be negative after a claw-back.
    pub balance: Money,
    /// The sum of all positive ledger entries.
    pub lifetime_earned: Money,
    pub updated_at: DateTime<Utc>,
}

impl UserBalance {
    pub fn new(user_id: UserId) -> Self {
        Self { user_id, balance: Money::zero(), lifetime_earned: Money::zero(), updated_at: Utc::now() }
    }
}

//--------------------------------------   OrderStatusChange   ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct OrderStatusChange {
    pub id: i64,
    pub order_id: OrderId,
    /// Empty for the entry that records the order's creation.
    pub from_status: Option<OrderStatus>,
    pub to_status: OrderStatus,
    pub actor_id: UserId,
    pub actor_role: Role,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

//--------------------------------------  PaymentConfirmation  ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ConfirmationOutcome {
    /// This confirmation settled the order.
    Settled,
    /// The order had already been paid. Nothing was done.
    Duplicate,
}

impl Display for ConfirmationOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfirmationOutcome::Settled => write!(f, "settled"),
            ConfirmationOutcome::Duplicate => write!(f, "duplicate"),
        }
    }
}

/// Audit record of an external payment signal. The reference is kept for reconciliation only and is never used as an
/// idempotency key.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct PaymentConfirmationRecord {
    pub id: i64,
    pub order_id: OrderId,
    pub actor_id: UserId,
    pub actor_role: Role,
    pub external_reference: String,
    pub outcome: ConfirmationOutcome,
    pub created_at: DateTime<Utc>,
}
