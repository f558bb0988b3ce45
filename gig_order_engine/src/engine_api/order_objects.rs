use serde::{Deserialize, Serialize};

use crate::{
    db_types::{LedgerEntry, LedgerReason, Money, Order, UserId},
    traits::TransitionOutcome,
};

/// Optional details that accompany a transition request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionMetadata {
    /// The writer to assign. Required for direct (non-bid) assignment.
    pub writer: Option<UserId>,
    /// The supervising manager, when it is not the acting manager.
    pub manager: Option<UserId>,
    /// Free text stored in the status history.
    pub note: Option<String>,
}

impl TransitionMetadata {
    pub fn with_writer(mut self, writer: UserId) -> Self {
        self.writer = Some(writer);
        self
    }

    pub fn with_manager(mut self, manager: UserId) -> Self {
        self.manager = Some(manager);
        self
    }

    pub fn with_note<S: Into<String>>(mut self, note: S) -> Self {
        self.note = Some(note.into());
        self
    }
}

/// The per-party breakdown of a settled order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistributionResult {
    pub order: Order,
    pub writer_amount: Money,
    pub manager_amount: Money,
    pub platform_margin: Money,
    /// The ledger entries that make up the distribution, including the manager fees credited before payment.
    pub entries: Vec<LedgerEntry>,
}

impl DistributionResult {
    pub fn from_entries(order: Order, entries: Vec<LedgerEntry>) -> Self {
        let round = order.payout_round;
        let entries = entries
            .into_iter()
            .filter(|e| match e.reason {
                LedgerReason::WriterPayout => e.round == round,
                LedgerReason::RevisionClawback | LedgerReason::Adjustment => false,
                _ => true,
            })
            .collect::<Vec<_>>();
        let writer_amount = order.writer_amount;
        let manager_amount = order.manager_amount();
        let platform_margin = order.platform_margin;
        Self { order, writer_amount, manager_amount, platform_margin, entries }
    }

    pub fn from_outcome(outcome: TransitionOutcome) -> Self {
        let entries = outcome.entries();
        Self::from_entries(outcome.into_order(), entries)
    }

    pub fn total(&self) -> Money {
        self.writer_amount + self.manager_amount + self.platform_margin
    }

    pub fn amount_for(&self, reason: LedgerReason) -> Money {
        self.entries.iter().filter(|e| e.reason == reason).map(|e| e.amount).sum()
    }
}

/// The result of a payment confirmation. Both variants are successes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentConfirmation {
    /// This confirmation settled the order.
    Settled(DistributionResult),
    /// The order had already been paid. The original distribution is returned and nothing was written.
    AlreadyPaid(DistributionResult),
}

impl PaymentConfirmation {
    pub fn distribution(&self) -> &DistributionResult {
        match self {
            PaymentConfirmation::Settled(d) | PaymentConfirmation::AlreadyPaid(d) => d,
        }
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self, PaymentConfirmation::AlreadyPaid(_))
    }
}
