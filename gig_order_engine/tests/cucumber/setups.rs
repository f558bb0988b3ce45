use cucumber::given;
use gig_order_engine::{db_types::Money, events::EventProducers, TierRate, TierTable};

use crate::{cucumber::MarketplaceWorld, support::Marketplace};

#[given("a fresh marketplace")]
async fn fresh_marketplace(world: &mut MarketplaceWorld) {
    world.market = Some(Marketplace::new().await);
}

#[given(expr = "a fresh marketplace where writers earn {int} KES per ordinary unit")]
async fn marketplace_with_rate(world: &mut MarketplaceWorld, rate: i64) {
    let tiers = TierTable::new(TierRate::new(Money::from(rate), Money::from(rate + 50)));
    world.market = Some(Marketplace::with_setup(tiers, EventProducers::default()).await);
}
