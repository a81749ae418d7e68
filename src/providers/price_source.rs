use std::collections::HashMap;

use async_trait::async_trait;
use sea_orm::prelude::Decimal;

use crate::error::Result;
use crate::tokens::TrackedToken;

#[async_trait]
pub trait PriceSource: Send + Sync {
    /// Current USD price per token symbol.
    ///
    /// Tokens the provider has no quote for are simply absent from the map;
    /// only a failure of the whole request is an error.
    async fn fetch_prices(&self, tokens: &[TrackedToken]) -> Result<HashMap<String, Decimal>>;
}
