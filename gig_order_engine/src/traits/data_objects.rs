use serde::{Deserialize, Serialize};

use crate::db_types::{Actor, LedgerEntry, Money, Order, OrderId, OrderStatus, UserBalance, UserId};

/// The amounts that a confirmed payment is split into, and who receives each share.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Distribution {
    pub order_id: OrderId,
    pub writer: UserId,
    pub manager: UserId,
    pub platform_account: UserId,
    pub writer_amount: Money,
    pub manager_assign_fee: Money,
    pub manager_submit_fee: Money,
    pub platform_margin: Money,
    /// The order's payout round. Only the writer payout is written per round; fees and margin belong to round zero.
    pub round: i64,
}

impl Distribution {
    pub fn manager_amount(&self) -> Money {
        self.manager_assign_fee + self.manager_submit_fee
    }

    pub fn total(&self) -> Money {
        self.writer_amount + self.manager_amount() + self.platform_margin
    }
}

/// One status change that was applied to an order, along with the ledger entries it produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedTransition {
    pub from: OrderStatus,
    pub to: OrderStatus,
    pub actor: Actor,
    /// The order as it was stored after this step.
    pub order: Order,
    pub entries: Vec<LedgerEntry>,
    /// The reversing entry, if this step clawed back a writer payout.
    pub clawback: Option<LedgerEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionOutcome {
    pub old_order: Order,
    pub steps: Vec<AppliedTransition>,
}

impl TransitionOutcome {
    /// The order after the last applied step.
    pub fn order(&self) -> &Order {
        self.steps.last().map(|s| &s.order).unwrap_or(&self.old_order)
    }

    pub fn into_order(self) -> Order {
        match self.steps.into_iter().last() {
            Some(step) => step.order,
            None => self.old_order,
        }
    }

    pub fn entries(&self) -> Vec<LedgerEntry> {
        self.steps.iter().flat_map(|s| s.entries.iter().cloned()).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceReconciliation {
    pub user_id: UserId,
    /// The projection before reconciliation.
    pub recorded: UserBalance,
    /// The projection as derived from the ledger. This is what is stored afterwards.
    pub derived: UserBalance,
}

impl BalanceReconciliation {
    pub fn drift(&self) -> Money {
        self.recorded.balance - self.derived.balance
    }

    pub fn was_repaired(&self) -> bool {
        self.recorded.balance != self.derived.balance || self.recorded.lifetime_earned != self.derived.lifetime_earned
    }
}
