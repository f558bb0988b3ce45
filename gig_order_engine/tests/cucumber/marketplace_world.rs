use std::collections::HashMap;

use cucumber::World;
use gig_order_engine::{
    db_types::{Order, OrderId},
    MarketplaceError,
    PaymentConfirmation,
};

use crate::support::Marketplace;

#[derive(Default, Debug, World)]
pub struct MarketplaceWorld {
    pub market: Option<Marketplace>,
    /// Orders created in the scenario, by the name the scenario gave them.
    pub orders: HashMap<String, OrderId>,
    pub last_error: Option<MarketplaceError>,
    pub confirmations: Vec<Result<PaymentConfirmation, MarketplaceError>>,
    pub accepted: Vec<Result<Order, MarketplaceError>>,
}

impl MarketplaceWorld {
    pub fn market(&self) -> &Marketplace {
        self.market.as_ref().expect("Marketplace not initialised")
    }

    pub fn order_id(&self, name: &str) -> OrderId {
        *self.orders.get(name).unwrap_or_else(|| panic!("No order called {name} in this scenario"))
    }

    pub fn record<T>(&mut self, result: Result<T, MarketplaceError>) -> Option<T> {
        match result {
            Ok(v) => {
                self.last_error = None;
                Some(v)
            },
            Err(e) => {
                self.last_error = Some(e);
                None
            },
        }
    }
}
