use lazy_static::lazy_static;
use serde::Serialize;

use crate::error::{ AppError, Result };

/// A token the scheduler polls: the contract quoted by the provider and the
/// symbol readings and subscriptions are stored under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrackedToken {
    pub contract_address: String,
    pub symbol: String,
}

impl TrackedToken {
    pub fn new(contract_address: &str, symbol: &str) -> Self {
        Self {
            contract_address: contract_address.trim().to_lowercase(),
            symbol: normalize_token(symbol),
        }
    }
}

lazy_static! {
    pub static ref DEFAULT_TRACKED_TOKENS: Vec<TrackedToken> = vec![
        // Wrapped Ether
        TrackedToken::new("0xc02aaa39b223fe8d0a0e5c4f27ead9083c756cc2", "ETH"),
        // Polygon (Matic) token on Ethereum mainnet
        TrackedToken::new("0x7d1afa7b718fb893db30a3abc0cfc608aacfebb0", "MATIC")
    ];
}

/// Canonical form shared by price readings and alert subscriptions.
pub fn normalize_token(token: &str) -> String {
    token.trim().to_uppercase()
}

/// Parse `contract:SYMBOL` pairs separated by commas.
pub fn parse_tracked_tokens(value: &str) -> Result<Vec<TrackedToken>> {
    let mut tokens: Vec<TrackedToken> = Vec::new();

    for pair in value.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let (address, symbol) = pair
            .split_once(':')
            .ok_or_else(||
                AppError::Config(format!("TRACKED_TOKENS entry '{}' must be contract:SYMBOL", pair))
            )?;

        let token = TrackedToken::new(address, symbol);
        if token.contract_address.is_empty() || token.symbol.is_empty() {
            return Err(AppError::Config(format!("TRACKED_TOKENS entry '{}' is incomplete", pair)));
        }
        if tokens.iter().any(|t| t.symbol == token.symbol) {
            return Err(AppError::Config(format!("TRACKED_TOKENS lists {} twice", token.symbol)));
        }

        tokens.push(token);
    }

    if tokens.is_empty() {
        return Err(AppError::Config("TRACKED_TOKENS cannot be empty".to_string()));
    }

    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_token() {
        assert_eq!(normalize_token("  eth "), "ETH");
        assert_eq!(normalize_token("Matic"), "MATIC");
    }

    #[test]
    fn test_parse_tracked_tokens() {
        let tokens = parse_tracked_tokens(
            "0xC02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2:eth, 0x514910771AF9Ca656af840dff83E8264EcF986CA:link"
        ).unwrap();

        assert_eq!(tokens.len(), 2);
        assert_eq!(tokens[0].symbol, "ETH");
        assert_eq!(tokens[0].contract_address, "0xc02aaa39b223fe8d0a0e5c4f27ead9083c756cc2");
        assert_eq!(tokens[1].symbol, "LINK");
    }

    #[test]
    fn test_parse_tracked_tokens_rejects_bad_entries() {
        assert!(parse_tracked_tokens("0xabc").is_err());
        assert!(parse_tracked_tokens("0xabc:").is_err());
        assert!(parse_tracked_tokens(" , ").is_err());
        assert!(parse_tracked_tokens("0xabc:ETH,0xdef:eth").is_err());
    }

    #[test]
    fn test_default_tokens_are_eth_and_matic() {
        let symbols: Vec<&str> = DEFAULT_TRACKED_TOKENS.iter()
            .map(|t| t.symbol.as_str())
            .collect();
        assert_eq!(symbols, vec!["ETH", "MATIC"]);
    }
}
