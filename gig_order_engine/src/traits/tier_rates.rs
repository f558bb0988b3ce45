use thiserror::Error;

use crate::{db_types::UserId, engine_api::tier_rates::TierRate, traits::MarketplaceError};

#[derive(Debug, Clone, Error)]
pub enum TierRateError {
    #[error("No tier rate is available for {0}")]
    RateUnavailable(UserId),
    #[error("The tier service failed: {0}")]
    ServiceError(String),
}

impl From<TierRateError> for MarketplaceError {
    fn from(e: TierRateError) -> Self {
        MarketplaceError::TierRateUnavailable(e.to_string())
    }
}

/// The seam to the writer progression service. The engine reads a writer's current rates through this trait and
/// never changes them.
#[allow(async_fn_in_trait)]
pub trait TierRateProvider {
    async fn rate_for_writer(&self, writer: UserId) -> Result<TierRate, TierRateError>;
}
