//! The order state machine.
//!
//! [`OrderStateMachine`] decides whether a requested status change is legal and, if it is, produces a
//! [`TransitionPlan`]: the column updates and the ledger side effects that must be applied together with the new
//! status. Planning is pure. Backends run the planner against a locked, freshly read order and apply the plan inside a
//! single transaction (see [`crate::traits::MarketplaceDatabase::apply_transition`]).
//!
//! Side effects are attached to specific transitions:
//!
//! | Transition                         | Side effect                                                        |
//! |------------------------------------|--------------------------------------------------------------------|
//! | `pending -> approved`              | A manager approving the order becomes its supervising manager      |
//! | `approved -> assigned`             | Writer earnings are quoted. The manager is credited the assign fee |
//! | `editing -> delivered`             | The manager is credited the submission fee (first delivery only)   |
//! | `accepted_by_client -> paid`       | The full distribution is written to the ledger                     |
//! | `paid/completed -> revision_pending` | The writer payout is clawed back and the payout round advances    |
//! | `* -> cancelled`                   | Admin or system actors only. Settled orders are clawed back first  |
//!
//! Leaving the biddable statuses (`pending`, `approved`) rejects every bid that is still pending.
use log::*;
use serde::{Deserialize, Serialize};

use crate::{
    db_types::{Actor, LedgerReason, Money, NewLedgerEntry, Order, OrderStatus, Role, UserId},
    engine_api::{
        order_objects::TransitionMetadata,
        payouts::PayoutPolicy,
        tier_rates::TierRate,
    },
    traits::{Distribution, MarketplaceError},
};

/// An external confirmation that the client has paid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentSignal {
    pub actor: Actor,
    pub external_reference: String,
}

impl PaymentSignal {
    pub fn new<S: Into<String>>(actor: Actor, external_reference: S) -> Self {
        Self { actor, external_reference: external_reference.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionRequest {
    /// The status the caller believes the order is in. The transition fails if the order has moved on.
    pub from_expected: OrderStatus,
    pub to: OrderStatus,
    pub actor: Actor,
    pub metadata: TransitionMetadata,
    pub payment: Option<PaymentSignal>,
}

impl TransitionRequest {
    pub fn new(from_expected: OrderStatus, to: OrderStatus, actor: Actor) -> Self {
        Self { from_expected, to, actor, metadata: TransitionMetadata::default(), payment: None }
    }

    pub fn with_metadata(mut self, metadata: TransitionMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_payment(mut self, payment: PaymentSignal) -> Self {
        self.payment = Some(payment);
        self
    }
}

/// Timestamp columns that are set when an order reaches a milestone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Milestone {
    Approved,
    Assigned,
    Delivered,
    Paid,
}

impl Milestone {
    pub fn column(&self) -> &'static str {
        match self {
            Milestone::Approved => "approved_at",
            Milestone::Assigned => "assigned_at",
            Milestone::Delivered => "delivered_at",
            Milestone::Paid => "paid_at",
        }
    }
}

/// The column changes that accompany a status change. `None` fields are left alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderUpdate {
    pub status: OrderStatus,
    pub writer: Option<UserId>,
    pub manager: Option<UserId>,
    pub writer_rate: Option<Money>,
    pub writer_amount: Option<Money>,
    pub manager_assign_fee: Option<Money>,
    pub manager_submit_fee: Option<Money>,
    pub platform_margin: Option<Money>,
    pub payment_confirmed: Option<bool>,
    pub pricing_review: Option<bool>,
    pub external_reference: Option<String>,
    pub advance_round: bool,
    pub milestone: Option<Milestone>,
}

impl OrderUpdate {
    pub fn new(status: OrderStatus) -> Self {
        Self {
            status,
            writer: None,
            manager: None,
            writer_rate: None,
            writer_amount: None,
            manager_assign_fee: None,
            manager_submit_fee: None,
            platform_margin: None,
            payment_confirmed: None,
            pricing_review: None,
            external_reference: None,
            advance_round: false,
            milestone: None,
        }
    }

    /// Applies the update to an in-memory copy of the order. Timestamps are left for the database to set.
    pub fn apply_to(&self, order: &mut Order) {
        order.status = self.status;
        if let Some(writer) = self.writer {
            order.writer = writer.into();
        }
        if let Some(manager) = self.manager {
            order.manager = manager.into();
        }
        if let Some(rate) = self.writer_rate {
            order.writer_rate = rate;
        }
        if let Some(amount) = self.writer_amount {
            order.writer_amount = amount;
        }
        if let Some(fee) = self.manager_assign_fee {
            order.manager_assign_fee = fee;
        }
        if let Some(fee) = self.manager_submit_fee {
            order.manager_submit_fee = fee;
        }
        if let Some(margin) = self.platform_margin {
            order.platform_margin = margin;
        }
        if let Some(confirmed) = self.payment_confirmed {
            order.payment_confirmed = confirmed;
        }
        if let Some(review) = self.pricing_review {
            order.pricing_review = review;
        }
        if let Some(reference) = &self.external_reference {
            order.external_reference = Some(reference.clone());
        }
        if self.advance_round {
            order.payout_round += 1;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerEffect {
    Credit(NewLedgerEntry),
    Distribution(Distribution),
    /// Reverse the writer payout of the given payout round, if one was made.
    Clawback { writer: UserId, round: i64 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionPlan {
    pub from: OrderStatus,
    pub to: OrderStatus,
    pub actor: Actor,
    pub note: Option<String>,
    pub update: OrderUpdate,
    pub effects: Vec<LedgerEffect>,
    pub reject_pending_bids: bool,
    pub payment: Option<PaymentSignal>,
}

#[derive(Debug, Clone, Default)]
pub struct OrderStateMachine {
    policy: PayoutPolicy,
}

impl OrderStateMachine {
    pub fn new(policy: PayoutPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &PayoutPolicy {
        &self.policy
    }

    /// Plans a single transition of `order`.
    ///
    /// `tier` is the assigned writer's current rate. It is only consulted for transitions into `assigned`.
    pub fn plan(
        &self,
        order: &Order,
        request: &TransitionRequest,
        tier: Option<&TierRate>,
    ) -> Result<TransitionPlan, MarketplaceError> {
        let current = order.status;
        let to = request.to;
        if current != request.from_expected {
            return Err(invalid_transition(
                order,
                to,
                format!(
                    "The order was expected to be {} but it is {current}. Re-read the order and try again.",
                    request.from_expected
                ),
            ));
        }
        if !current.can_transition_to(to) {
            return Err(invalid_transition(order, to, format!("{to} is not a legal successor of {current}.")));
        }
        let mut plan = TransitionPlan {
            from: current,
            to,
            actor: request.actor,
            note: request.metadata.note.clone(),
            update: OrderUpdate::new(to),
            effects: Vec::new(),
            reject_pending_bids: current.is_biddable() && !to.is_biddable(),
            payment: None,
        };
        match to {
            OrderStatus::Cancelled => self.plan_cancellation(order, request, &mut plan)?,
            OrderStatus::Approved => self.plan_approval(request, &mut plan),
            OrderStatus::Assigned => self.plan_assignment(order, request, tier, &mut plan)?,
            OrderStatus::Delivered => self.plan_delivery(order, &mut plan)?,
            OrderStatus::Paid => self.plan_settlement(order, request, &mut plan)?,
            OrderStatus::RevisionPending if current.is_settled() => self.plan_clawback(order, to, &mut plan)?,
            _ => {},
        }
        trace!("🔄️ Planned {current} -> {to} for order {} with {} ledger effects", order.id, plan.effects.len());
        Ok(plan)
    }

    /// Plans several transitions that must be applied back-to-back in the same unit of work, e.g. `paid` followed by
    /// `completed`. Each request is planned against the order as it will be after the previous step.
    pub fn plan_chain(
        &self,
        order: &Order,
        requests: &[TransitionRequest],
        tier: Option<&TierRate>,
    ) -> Result<Vec<TransitionPlan>, MarketplaceError> {
        let mut projected = order.clone();
        let mut plans = Vec::with_capacity(requests.len());
        for request in requests {
            let plan = self.plan(&projected, request, tier)?;
            plan.update.apply_to(&mut projected);
            plans.push(plan);
        }
        Ok(plans)
    }

    fn plan_cancellation(
        &self,
        order: &Order,
        request: &TransitionRequest,
        plan: &mut TransitionPlan,
    ) -> Result<(), MarketplaceError> {
        if !request.actor.role.may_override() {
            return Err(MarketplaceError::ActorNotPermitted {
                role: request.actor.role,
                action: "cancel orders".to_string(),
            });
        }
        if order.status.is_settled() {
            info!("🧮️ Order {} is cancelled after settlement. The writer payout will be clawed back", order.id);
            self.plan_clawback(order, OrderStatus::Cancelled, plan)?;
        }
        Ok(())
    }

    fn plan_approval(&self, request: &TransitionRequest, plan: &mut TransitionPlan) {
        let manager = request.metadata.manager.or_else(|| acting_manager(&request.actor));
        plan.update.manager = manager;
        plan.update.milestone = Some(Milestone::Approved);
    }

    fn plan_assignment(
        &self,
        order: &Order,
        request: &TransitionRequest,
        tier: Option<&TierRate>,
        plan: &mut TransitionPlan,
    ) -> Result<(), MarketplaceError> {
        let writer = request.metadata.writer.ok_or_else(|| missing(order, "writer", OrderStatus::Assigned))?;
        let manager = request
            .metadata
            .manager
            .or_else(|| order.manager.user_id())
            .or_else(|| acting_manager(&request.actor))
            .ok_or_else(|| missing(order, "manager", OrderStatus::Assigned))?;
        let rate = tier.ok_or_else(|| {
            MarketplaceError::TierRateUnavailable(format!("No tier rate was supplied for {writer}"))
        })?;
        let writer_amount = self.policy.writer_amount(order.units(), order.work_type, rate);
        let fee = self.policy.manager_assign_fee;
        debug!("🧮️ Order {} quoted at {writer_amount} for {writer}. Assignment fee of {fee} to {manager}", order.id);
        let update = &mut plan.update;
        update.writer = Some(writer);
        update.manager = Some(manager);
        update.writer_rate = Some(rate.for_work(order.work_type));
        update.writer_amount = Some(writer_amount);
        update.manager_assign_fee = Some(fee);
        update.milestone = Some(Milestone::Assigned);
        if fee.is_positive() {
            plan.effects.push(LedgerEffect::Credit(NewLedgerEntry::credit(
                manager,
                order.id,
                fee,
                LedgerReason::AssignmentFee,
            )));
        }
        Ok(())
    }

    fn plan_delivery(&self, order: &Order, plan: &mut TransitionPlan) -> Result<(), MarketplaceError> {
        plan.update.milestone = Some(Milestone::Delivered);
        if order.delivered_at.is_some() {
            debug!("🧮️ Order {} was delivered before. The submission fee is not credited again", order.id);
            return Ok(());
        }
        let manager = order.manager.user_id().ok_or_else(|| missing(order, "manager", OrderStatus::Delivered))?;
        let fee = self.policy.submit_fee(order.units());
        plan.update.manager_submit_fee = Some(fee);
        if fee.is_positive() {
            plan.effects.push(LedgerEffect::Credit(NewLedgerEntry::credit(
                manager,
                order.id,
                fee,
                LedgerReason::SubmissionFee,
            )));
        }
        Ok(())
    }

    fn plan_settlement(
        &self,
        order: &Order,
        request: &TransitionRequest,
        plan: &mut TransitionPlan,
    ) -> Result<(), MarketplaceError> {
        if request.payment.is_none() && !order.payment_confirmed {
            return Err(invalid_transition(
                order,
                OrderStatus::Paid,
                "Payment has not been confirmed. Payment signals must go through confirm_payment.".to_string(),
            ));
        }
        let writer = order.writer.user_id().ok_or_else(|| missing(order, "writer", OrderStatus::Paid))?;
        let manager = order.manager.user_id().ok_or_else(|| missing(order, "manager", OrderStatus::Paid))?;
        let payout = self.policy.settle(order);
        if payout.needs_review() {
            warn!(
                "🧮️ Order {} is priced {} below the writer and manager shares. The platform margin is clamped to zero \
                 and the order is flagged for pricing review.",
                order.id, payout.shortfall
            );
        } else if payout.distributed() != order.total_amount {
            error!(
                "🧮️ Order {} would distribute {} against a total of {}. Refusing to settle.",
                order.id,
                payout.distributed(),
                order.total_amount
            );
            return Err(MarketplaceError::ConservationViolated {
                order_id: order.id,
                total: order.total_amount,
                distributed: payout.distributed(),
            });
        }
        let update = &mut plan.update;
        update.platform_margin = Some(payout.platform_margin);
        update.pricing_review = Some(payout.needs_review());
        update.payment_confirmed = Some(true);
        update.external_reference = request.payment.as_ref().map(|p| p.external_reference.clone());
        update.milestone = Some(Milestone::Paid);
        plan.effects.push(LedgerEffect::Distribution(Distribution {
            order_id: order.id,
            writer,
            manager,
            platform_account: self.policy.platform_account,
            writer_amount: payout.writer_amount,
            manager_assign_fee: payout.manager_assign_fee,
            manager_submit_fee: payout.manager_submit_fee,
            platform_margin: payout.platform_margin,
            round: order.payout_round,
        }));
        plan.payment = request.payment.clone();
        Ok(())
    }

    fn plan_clawback(&self, order: &Order, to: OrderStatus, plan: &mut TransitionPlan) -> Result<(), MarketplaceError> {
        let writer = order.writer.user_id().ok_or_else(|| missing(order, "writer", to))?;
        plan.effects.push(LedgerEffect::Clawback { writer, round: order.payout_round });
        plan.update.advance_round = true;
        Ok(())
    }
}

fn acting_manager(actor: &Actor) -> Option<UserId> {
    (actor.role == Role::Manager).then_some(actor.user_id)
}

fn invalid_transition(order: &Order, requested: OrderStatus, reason: String) -> MarketplaceError {
    MarketplaceError::InvalidTransition { order_id: order.id, current: order.status, requested, reason }
}

fn missing(order: &Order, party: &'static str, status: OrderStatus) -> MarketplaceError {
    MarketplaceError::MissingAssignee { order_id: order.id, party, status }
}
