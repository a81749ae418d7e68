use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use sea_orm::prelude::Decimal;
use serde::{ Deserialize, Serialize };
use tokio::sync::OnceCell;

use crate::error::{ AppError, Result };
use crate::providers::PriceSource;
use crate::tokens::TrackedToken;

const REQUEST_TIMEOUT_SECS: u64 = 10;

/// Moralis EVM token price API.
pub struct MoralisClient {
    api_key: String,
    base_url: String,
    chain: String,
    client: OnceCell<reqwest::Client>,
}

#[derive(Serialize)]
struct PriceRequest<'a> {
    tokens: Vec<TokenRef<'a>>,
}

#[derive(Serialize)]
struct TokenRef<'a> {
    token_address: &'a str,
}

#[derive(Debug, Deserialize)]
struct MoralisTokenPrice {
    #[serde(rename = "tokenAddress")]
    token_address: Option<String>,
    #[serde(rename = "usdPrice")]
    usd_price: Option<serde_json::Value>,
}

impl MoralisClient {
    pub fn new(api_key: &str, base_url: &str, chain: &str) -> Self {
        Self {
            api_key: api_key.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            chain: chain.to_string(),
            client: OnceCell::new(),
        }
    }

    /// HTTP client, built on first use and shared afterwards.
    async fn http(&self) -> Result<&reqwest::Client> {
        self.client.get_or_try_init(|| async {
            reqwest::Client
                ::builder()
                .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
                .build()
                .map_err(|e| AppError::Internal(format!("Failed to build HTTP client: {}", e)))
        }).await
    }
}

#[async_trait]
impl PriceSource for MoralisClient {
    async fn fetch_prices(&self, tokens: &[TrackedToken]) -> Result<HashMap<String, Decimal>> {
        if tokens.is_empty() {
            return Ok(HashMap::new());
        }

        let url = format!(
            "{}/erc20/prices?chain={}",
            self.base_url,
            urlencoding::encode(&self.chain)
        );
        let body = PriceRequest {
            tokens: tokens
                .iter()
                .map(|t| TokenRef { token_address: &t.contract_address })
                .collect(),
        };

        let response = self
            .http().await?
            .post(&url)
            .header("X-API-Key", &self.api_key)
            .json(&body)
            .send().await
            .map_err(|e| AppError::Fetch(format!("Moralis request failed: {}", e)))?;

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(AppError::Fetch("Moralis rate limited".to_string()));
        }

        if !response.status().is_success() {
            return Err(AppError::Fetch(format!("Moralis API returned status: {}", response.status())));
        }

        let entries: Vec<MoralisTokenPrice> = response
            .json().await
            .map_err(|e| AppError::Fetch(format!("Failed to parse Moralis response: {}", e)))?;

        Ok(prices_by_symbol(tokens, entries))
    }
}

/// Match provider entries back to tracked symbols, dropping unusable quotes.
fn prices_by_symbol(
    tokens: &[TrackedToken],
    entries: Vec<MoralisTokenPrice>
) -> HashMap<String, Decimal> {
    let mut prices = HashMap::new();

    for entry in entries {
        let Some(address) = entry.token_address.map(|a| a.to_lowercase()) else {
            continue;
        };
        let Some(token) = tokens.iter().find(|t| t.contract_address == address) else {
            continue;
        };

        match entry.usd_price.as_ref().and_then(parse_usd) {
            Some(price) if !price.is_sign_negative() => {
                prices.insert(token.symbol.clone(), price);
            }
            _ => {
                tracing::warn!("No usable USD price for {} in provider response", token.symbol);
            }
        }
    }

    prices
}

fn parse_usd(value: &serde_json::Value) -> Option<Decimal> {
    let text = match value {
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::String(s) => s.clone(),
        _ => {
            return None;
        }
    };

    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .ok()
}
