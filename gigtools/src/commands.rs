use std::{convert::Infallible, str::FromStr};

use anyhow::{anyhow, Result};
use gig_order_engine::{
    db_types::{Actor, Order, OrderId, OrderStatus, UserId},
    events::EventProducers,
    EngineConfig,
    LedgerApi,
    OrderFlowApi,
    PaymentApi,
    SqliteDatabase,
    TierTable,
    TransitionMetadata,
};
use log::*;
use serde_json::json;

use crate::formatting::{format_distribution, format_history, format_ledger, format_order, format_reconciliation};

/// An order given on the command line, either by id or by its display code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderRef {
    Id(OrderId),
    Code(String),
}

impl FromStr for OrderRef {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.parse::<i64>() {
            Ok(id) => Ok(Self::Id(OrderId(id))),
            Err(_) => Ok(Self::Code(s.to_string())),
        }
    }
}

#[derive(Debug)]
pub enum OrderCommand {
    Show(OrderRef),
    Confirm { order: OrderRef, reference: String, actor: UserId },
    Cancel { order: OrderRef, actor: UserId },
    Balance(UserId),
    Ledger(UserId),
    Reconcile(UserId),
}

struct Engine {
    orders: OrderFlowApi<SqliteDatabase, TierTable>,
    payments: PaymentApi<SqliteDatabase>,
    ledger: LedgerApi<SqliteDatabase>,
}

impl Engine {
    async fn connect() -> Result<Self> {
        let config = EngineConfig::from_env_or_default();
        let db = SqliteDatabase::new_with_url(&config.database_url, config.max_connections).await?;
        debug!("Connected to {}", config.database_url);
        // Operator actions have no hooks attached, so nothing is published.
        let producers = EventProducers::default();
        let orders = OrderFlowApi::new(db.clone(), config.tier_table(), config.payouts, producers.clone());
        let payments = PaymentApi::new(db.clone(), config.payouts, producers);
        let ledger = LedgerApi::new(db);
        Ok(Self { orders, payments, ledger })
    }

    async fn find_order(&self, order: &OrderRef) -> Result<Order> {
        let order = match order {
            OrderRef::Id(id) => self.orders.fetch_order(*id).await?,
            OrderRef::Code(code) => self.orders.fetch_order_by_code(code).await?,
        };
        Ok(order)
    }
}

pub async fn handle_order_command(command: OrderCommand, json: bool) -> Result<()> {
    let engine = Engine::connect().await?;
    match command {
        OrderCommand::Show(order) => {
            let order = engine.find_order(&order).await?;
            let history = engine.orders.history(order.id).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&json!({ "order": order, "history": history }))?);
            } else {
                println!("{}", format_order(&order)?);
                println!("{}", format_history(&history));
            }
        },
        OrderCommand::Confirm { order, reference, actor } => {
            let order = engine.find_order(&order).await?.id;
            let result = engine.payments.confirm_payment(order, Actor::admin(actor), &reference).await?;
            if result.is_duplicate() {
                println!("Payment for order {order} had already been confirmed. Nothing was changed.");
            }
            if json {
                println!("{}", serde_json::to_string_pretty(result.distribution())?);
            } else {
                println!("{}", format_distribution(result.distribution())?);
            }
        },
        OrderCommand::Cancel { order, actor } => {
            let current = engine.find_order(&order).await?;
            let order = current.id;
            if !current.status.is_cancellable() {
                return Err(anyhow!("Order {order} is {} and cannot be cancelled", current.status));
            }
            let metadata = TransitionMetadata::default().with_note("Cancelled from gigtools");
            let cancelled = engine
                .orders
                .transition(order, current.status, OrderStatus::Cancelled, Actor::admin(actor), metadata)
                .await?;
            println!("Order {} [{}] has been cancelled", cancelled.id, cancelled.code);
            if current.status.is_settled() {
                println!("The writer's payout of {} has been clawed back", current.writer_amount);
            }
        },
        OrderCommand::Balance(user) => {
            let balance = engine.ledger.balance(user).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&balance)?);
            } else {
                println!("{user}\nBalance:         {}\nLifetime earned: {}", balance.balance, balance.lifetime_earned);
            }
        },
        OrderCommand::Ledger(user) => {
            let entries = engine.ledger.entries_for_user(user).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&entries)?);
            } else {
                println!("{}", format_ledger(&entries));
            }
        },
        OrderCommand::Reconcile(user) => {
            let result = engine.ledger.reconcile(user).await?;
            println!("{}", format_reconciliation(&result)?);
        },
    }
    Ok(())
}
