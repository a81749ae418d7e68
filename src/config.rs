use std::collections::HashMap;
use std::env;
use std::str::FromStr;
use std::time::Duration;

use sea_orm::prelude::Decimal;

use crate::error::{ AppError, Result };
use crate::tokens::{ parse_tracked_tokens, TrackedToken, DEFAULT_TRACKED_TOKENS };

const DEFAULT_PRICE_API_URL: &str = "https://deep-index.moralis.io/api/v2.2";
const DEFAULT_PRICE_CHAIN: &str = "0x1";
const DEFAULT_POLL_INTERVAL_SECS: u64 = 300;

/// Credentials for the transactional email HTTP API.
#[derive(Debug, Clone)]
pub struct EmailConfig {
    pub api_url: String,
    pub api_key: String,
    pub from: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub database_max_connections: u32,
    /// Missing key disables the scheduler; the query API still serves stored data.
    pub price_api_key: Option<String>,
    pub price_api_url: String,
    pub price_chain: String,
    pub tracked_tokens: Vec<TrackedToken>,
    pub poll_interval: Duration,
    /// Relative change (fraction, not percent) that makes a token alert-worthy.
    pub alert_change_threshold: Decimal,
    pub fetch_timeout: Duration,
    pub store_timeout: Duration,
    pub notify_timeout: Duration,
    pub email: Option<EmailConfig>,
    pub server_host: String,
    pub server_port: u16,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();

        let vars: HashMap<String, String> = env::vars().collect();
        Self::from_vars(&vars)
    }

    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self> {
        let get = |key: &str| {
            vars.get(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let database_url = get("DATABASE_URL").ok_or_else(||
            AppError::Config("DATABASE_URL must be set".to_string())
        )?;
        let database_max_connections = parse_or("DATABASE_MAX_CONNECTIONS", get("DATABASE_MAX_CONNECTIONS"), 10u32)?;
        if database_max_connections == 0 {
            return Err(AppError::Config("DATABASE_MAX_CONNECTIONS must be at least 1".to_string()));
        }

        let price_api_key = get("MORALIS_API_KEY");
        let price_api_url = get("MORALIS_API_URL")
            .unwrap_or_else(|| DEFAULT_PRICE_API_URL.to_string())
            .trim_end_matches('/')
            .to_string();
        let price_chain = get("PRICE_CHAIN").unwrap_or_else(|| DEFAULT_PRICE_CHAIN.to_string());

        let tracked_tokens = match get("TRACKED_TOKENS") {
            Some(value) => parse_tracked_tokens(&value)?,
            None => DEFAULT_TRACKED_TOKENS.clone(),
        };

        let poll_interval = seconds("POLL_INTERVAL_SECS", get("POLL_INTERVAL_SECS"), DEFAULT_POLL_INTERVAL_SECS)?;
        let fetch_timeout = seconds("FETCH_TIMEOUT_SECS", get("FETCH_TIMEOUT_SECS"), 10)?;
        let store_timeout = seconds("STORE_TIMEOUT_SECS", get("STORE_TIMEOUT_SECS"), 5)?;
        let notify_timeout = seconds("NOTIFY_TIMEOUT_SECS", get("NOTIFY_TIMEOUT_SECS"), 10)?;

        let alert_change_threshold = parse_or(
            "ALERT_CHANGE_THRESHOLD",
            get("ALERT_CHANGE_THRESHOLD"),
            Decimal::ZERO
        )?;
        if alert_change_threshold.is_sign_negative() {
            return Err(AppError::Config("ALERT_CHANGE_THRESHOLD cannot be negative".to_string()));
        }

        let email = match (get("EMAIL_API_URL"), get("EMAIL_API_KEY"), get("EMAIL_FROM")) {
            (Some(api_url), Some(api_key), Some(from)) => Some(EmailConfig { api_url, api_key, from }),
            _ => None,
        };

        let server_host = get("SERVER_HOST").unwrap_or_else(|| "0.0.0.0".to_string());
        let server_port = parse_or("SERVER_PORT", get("SERVER_PORT"), 8080u16)?;

        Ok(Config {
            database_url,
            database_max_connections,
            price_api_key,
            price_api_url,
            price_chain,
            tracked_tokens,
            poll_interval,
            alert_change_threshold,
            fetch_timeout,
            store_timeout,
            notify_timeout,
            email,
            server_host,
            server_port,
        })
    }

    /// The scheduler cannot run without a price-provider key.
    pub fn require_price_api_key(&self) -> Result<&str> {
        self.price_api_key
            .as_deref()
            .ok_or_else(|| AppError::Config("MORALIS_API_KEY must be set to run the price scheduler".to_string()))
    }
}

fn parse_or<T: FromStr>(key: &str, value: Option<String>, default: T) -> Result<T> {
    match value {
        Some(v) =>
            v.parse().map_err(|_| AppError::Config(format!("{} has an invalid value: {}", key, v))),
        None => Ok(default),
    }
}

fn seconds(key: &str, value: Option<String>, default: u64) -> Result<Duration> {
    let secs = parse_or(key, value, default)?;
    if secs == 0 {
        return Err(AppError::Config(format!("{} must be greater than zero", key)));
    }
    Ok(Duration::from_secs(secs))
}
