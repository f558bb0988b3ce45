use std::fmt::Write;

use anyhow::Result;
use gig_order_engine::{
    db_types::{Assignee, LedgerEntry, Order, OrderStatusChange},
    traits::BalanceReconciliation,
    DistributionResult,
};
use prettytable::{
    format::{LinePosition, LineSeparator, TableFormat},
    row,
    Table,
};

fn markdown_format() -> TableFormat {
    prettytable::format::FormatBuilder::new()
        .column_separator('|')
        .borders('|')
        .separator(LinePosition::Title, LineSeparator::new('-', '|', '|', '|'))
        .padding(1, 1)
        .build()
}

fn markdown_style(table: &mut Table) {
    table.set_format(markdown_format());
}

fn assignee(a: &Assignee) -> String {
    a.user_id().map(|id| id.to_string()).unwrap_or_else(|| "Unassigned".to_string())
}

pub fn format_order(order: &Order) -> Result<String> {
    let mut f = String::new();
    writeln!(
        f,
        "Order {id} [{code}]           Created {created}",
        id = order.id,
        code = order.code,
        created = order.created_at
    )?;
    writeln!(
        f,
        "Client: {}   Writer: {}   Manager: {}",
        order.client_id,
        assignee(&order.writer),
        assignee(&order.manager)
    )?;
    writeln!(f, "[{:^20}]                 Updated {}", order.status.to_string(), order.updated_at)?;
    writeln!(f, "-----------------------------------------------------------------------------")?;
    writeln!(f, "Work:            {} units of {} work", order.units(), order.work_type)?;
    writeln!(f, "Total:           {}", order.total_amount)?;
    writeln!(f, "Writer:          {} ({} per unit)", order.writer_amount, order.writer_rate)?;
    writeln!(f, "Manager:         {} + {}", order.manager_assign_fee, order.manager_submit_fee)?;
    writeln!(f, "Platform margin: {}", order.platform_margin)?;
    writeln!(f, "Payout round:    {}", order.payout_round)?;
    let paid = match (&order.external_reference, order.payment_confirmed) {
        (Some(reference), true) => format!("Yes ({reference})"),
        (None, true) => "Yes".to_string(),
        (_, false) => "No".to_string(),
    };
    writeln!(f, "Paid:            {paid}")?;
    if order.pricing_review {
        writeln!(f, "** This order was priced below its payouts and is flagged for review **")?;
    }
    Ok(f)
}

pub fn format_history(history: &[OrderStatusChange]) -> String {
    let mut table = Table::new();
    table.set_titles(row!["From", "To", "Actor", "Role", "Note", "At"]);
    history.iter().for_each(|change| {
        table.add_row(row![
            change.from_status.map(|s| s.to_string()).unwrap_or_default(),
            change.to_status.to_string(),
            change.actor_id,
            change.actor_role.to_string(),
            change.note.as_deref().unwrap_or_default(),
            change.created_at.to_string()
        ]);
    });
    markdown_style(&mut table);
    format!("{table}\n")
}

pub fn format_ledger(entries: &[LedgerEntry]) -> String {
    if entries.is_empty() {
        return "No ledger entries".to_string();
    }
    let mut table = Table::new();
    table.set_titles(row!["ID", "Order", "Reason", "Round", "Amount", "Created At"]);
    entries.iter().for_each(|entry| {
        table.add_row(row![
            entry.id,
            entry.order_id,
            entry.reason.to_string(),
            entry.round,
            entry.amount.to_string(),
            entry.created_at.to_string()
        ]);
    });
    markdown_style(&mut table);
    format!("{table}\n")
}

pub fn format_distribution(result: &DistributionResult) -> Result<String> {
    let mut f = String::new();
    let order = &result.order;
    writeln!(f, "Order {} [{}] is {}", order.id, order.code, order.status)?;
    writeln!(f, "Writer:          {}", result.writer_amount)?;
    writeln!(f, "Manager:         {}", result.manager_amount)?;
    writeln!(f, "Platform margin: {}", result.platform_margin)?;
    writeln!(f, "Total:           {}", result.total())?;
    writeln!(f, "{}", format_ledger(&result.entries))?;
    Ok(f)
}

pub fn format_reconciliation(result: &BalanceReconciliation) -> Result<String> {
    let mut f = String::new();
    writeln!(f, "Reconciled balance for {}", result.user_id)?;
    writeln!(f, "Recorded: {} ({} lifetime)", result.recorded.balance, result.recorded.lifetime_earned)?;
    writeln!(f, "Ledger:   {} ({} lifetime)", result.derived.balance, result.derived.lifetime_earned)?;
    if result.was_repaired() {
        writeln!(f, "The recorded balance had drifted by {} and has been repaired", result.drift())?;
    } else {
        writeln!(f, "No drift")?;
    }
    Ok(f)
}
