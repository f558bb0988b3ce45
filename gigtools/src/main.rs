use clap::{Parser, Subcommand};
use gig_order_engine::db_types::UserId;
use log::*;

mod commands;
mod formatting;
mod setup;

use crate::{
    commands::{handle_order_command, OrderCommand, OrderRef},
    setup::{migrate_db, MigrateParams},
};

#[derive(Parser, Debug)]
#[command(version, about = "Operator tools for the gig marketplace order engine")]
pub struct Arguments {
    /// Print results as JSON instead of tables
    #[arg(short, long, global = true)]
    json: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Create the database if needed and run the migrations. Uses `GIG_DATABASE_URL`.
    Migrate(MigrateParams),
    /// Show an order along with its status history. The order may be given by id or by display code.
    Order {
        #[arg(required = true, index = 1)]
        order: OrderRef,
    },
    /// Confirm payment for an order on behalf of the payment provider. Confirming an order that has already been paid
    /// is harmless and reports the original distribution.
    Confirm {
        #[arg(required = true, index = 1)]
        order: OrderRef,
        /// The payment provider's reference for the transaction
        #[arg(short, long)]
        reference: String,
        /// The id of the operator confirming the payment
        #[arg(short, long)]
        actor: UserId,
    },
    /// Cancel an order. Cancelling a paid or completed order claws back the writer's payout.
    Cancel {
        #[arg(required = true, index = 1)]
        order: OrderRef,
        /// The id of the administrator cancelling the order
        #[arg(short, long)]
        actor: UserId,
    },
    /// Show a user's balance
    Balance {
        #[arg(required = true, index = 1)]
        user: UserId,
    },
    /// List a user's ledger entries
    Ledger {
        #[arg(required = true, index = 1)]
        user: UserId,
    },
    /// Recompute a user's balance from the ledger and repair it if it has drifted
    Reconcile {
        #[arg(required = true, index = 1)]
        user: UserId,
    },
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    env_logger::init();
    let cli = Arguments::parse();
    let command = match cli.command {
        Command::Migrate(params) => return migrate_db(params).await,
        Command::Order { order } => OrderCommand::Show(order),
        Command::Confirm { order, reference, actor } => OrderCommand::Confirm { order, reference, actor },
        Command::Cancel { order, actor } => OrderCommand::Cancel { order, actor },
        Command::Balance { user } => OrderCommand::Balance(user),
        Command::Ledger { user } => OrderCommand::Ledger(user),
        Command::Reconcile { user } => OrderCommand::Reconcile(user),
    };
    if let Err(e) = handle_order_command(command, cli.json).await {
        error!("Command failed: {e}");
        eprintln!("{e}");
        std::process::exit(1);
    }
}
