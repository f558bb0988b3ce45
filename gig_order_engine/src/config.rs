//! Engine configuration, read from the environment.
//!
//! Binaries should load `.env` with `dotenvy` before calling [`EngineConfig::from_env_or_default`]. Values that are
//! missing or cannot be parsed fall back to their defaults, and the fallback is logged.
use std::{env, fmt::Display, str::FromStr};

use log::*;

use crate::{
    db_types::{Money, UserId},
    engine_api::{
        payouts::{
            PayoutPolicy,
            DEFAULT_MANAGER_ASSIGN_FEE,
            DEFAULT_MANAGER_SUBMIT_BASE,
            DEFAULT_MANAGER_SUBMIT_PER_UNIT,
            DEFAULT_PLATFORM_ACCOUNT,
        },
        tier_rates::{TierRate, TierTable},
    },
};

pub const DEFAULT_DATABASE_URL: &str = "sqlite://data/gig_market.db";
pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;
pub const DEFAULT_ORDINARY_RATE: i64 = 150;
pub const DEFAULT_TECHNICAL_RATE: i64 = 200;
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 64;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub database_url: String,
    pub max_connections: u32,
    pub payouts: PayoutPolicy,
    /// The rate given to writers who have no tier override.
    pub default_tier: TierRate,
    /// The capacity of each event hook's channel.
    pub event_buffer_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            payouts: PayoutPolicy::default(),
            default_tier: TierRate::new(Money::from(DEFAULT_ORDINARY_RATE), Money::from(DEFAULT_TECHNICAL_RATE)),
            event_buffer_size: DEFAULT_EVENT_BUFFER_SIZE,
        }
    }
}

impl EngineConfig {
    pub fn from_env_or_default() -> Self {
        let database_url = env::var("GIG_DATABASE_URL").ok().unwrap_or_else(|| {
            info!("🪛️ GIG_DATABASE_URL is not set. Using the default, {DEFAULT_DATABASE_URL}.");
            DEFAULT_DATABASE_URL.to_string()
        });
        let max_connections = from_env("GIG_DB_MAX_CONNECTIONS", DEFAULT_MAX_CONNECTIONS);
        let payouts = PayoutPolicy {
            manager_assign_fee: Money::from(non_negative("GIG_MANAGER_ASSIGN_FEE", DEFAULT_MANAGER_ASSIGN_FEE)),
            manager_submit_base: Money::from(non_negative("GIG_MANAGER_SUBMIT_BASE", DEFAULT_MANAGER_SUBMIT_BASE)),
            manager_submit_per_unit: Money::from(non_negative(
                "GIG_MANAGER_SUBMIT_PER_UNIT",
                DEFAULT_MANAGER_SUBMIT_PER_UNIT,
            )),
            platform_account: UserId(from_env("GIG_PLATFORM_ACCOUNT_ID", DEFAULT_PLATFORM_ACCOUNT)),
        };
        let default_tier = TierRate::new(
            Money::from(non_negative("GIG_DEFAULT_ORDINARY_RATE", DEFAULT_ORDINARY_RATE)),
            Money::from(non_negative("GIG_DEFAULT_TECHNICAL_RATE", DEFAULT_TECHNICAL_RATE)),
        );
        let event_buffer_size = from_env("GIG_EVENT_BUFFER_SIZE", DEFAULT_EVENT_BUFFER_SIZE).max(1);
        Self { database_url, max_connections, payouts, default_tier, event_buffer_size }
    }

    /// A tier table that gives every writer the configured default rate.
    pub fn tier_table(&self) -> TierTable {
        TierTable::new(self.default_tier)
    }
}

fn from_env<T>(name: &str, default: T) -> T
where
    T: FromStr + Display,
    T::Err: Display,
{
    parse_value(name, env::var(name).ok(), default)
}

fn non_negative(name: &str, default: i64) -> i64 {
    let value = from_env(name, default);
    if value < 0 {
        warn!("🪛️ {name} cannot be negative ({value}). Using the default, {default}, instead.");
        return default;
    }
    value
}

fn parse_value<T>(name: &str, value: Option<String>, default: T) -> T
where
    T: FromStr + Display,
    T::Err: Display,
{
    match value {
        None => {
            debug!("🪛️ {name} is not set. Using the default, {default}.");
            default
        },
        Some(s) => s.trim().parse::<T>().unwrap_or_else(|e| {
            error!("🪛️ {s} is not a valid value for {name}. {e} Using the default, {default}, instead.");
            default
        }),
    }
}
