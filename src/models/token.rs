use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::amount_serde::u128_string;

/// An ERC-20 style token. Addresses are stored lowercased so they can be used as keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Token {
    pub symbol: String,
    pub address: String,
    pub decimals: u8,
}

impl Token {
    pub fn new(symbol: impl Into<String>, address: impl Into<String>, decimals: u8) -> Self {
        Self {
            symbol: symbol.into(),
            address: address.into().to_lowercase(),
            decimals,
        }
    }

    pub fn amount(&self, raw: u128) -> TokenAmount {
        TokenAmount::new(&self.address, raw, self.decimals)
    }

    /// Parse a `SYMBOL:address:decimals` entry.
    pub fn parse_entry(entry: &str) -> Result<Self, String> {
        let parts: Vec<&str> = entry.trim().split(':').map(str::trim).collect();
        match parts.as_slice() {
            [symbol, address, decimals] if !symbol.is_empty() && !address.is_empty() => {
                let decimals: u8 = decimals
                    .parse()
                    .map_err(|_| format!("invalid decimals in token entry '{entry}'"))?;
                if decimals > 28 {
                    return Err(format!("token {symbol} has more than 28 decimals"));
                }
                Ok(Token::new(*symbol, *address, decimals))
            }
            _ => Err(format!(
                "token entry '{entry}' must look like SYMBOL:address:decimals"
            )),
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.symbol)
    }
}

/// A quantity of one token in integer base units.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TokenAmount {
    pub token: String,
    #[serde(with = "u128_string")]
    pub raw: u128,
    pub decimals: u8,
}

impl TokenAmount {
    pub fn new(token: &str, raw: u128, decimals: u8) -> Self {
        Self {
            token: token.to_lowercase(),
            raw,
            decimals,
        }
    }

    pub fn is_zero(&self) -> bool {
        self.raw == 0
    }

    pub fn with_raw(&self, raw: u128) -> Self {
        Self {
            token: self.token.clone(),
            raw,
            decimals: self.decimals,
        }
    }

    /// Human-readable projection. Never feed the result back into accounting.
    pub fn to_display(&self) -> Decimal {
        display_value(self.raw, self.decimals)
    }

    /// Convert a human-readable value into base units, truncating extra precision.
    /// Only the configuration layer should call this.
    pub fn from_display(token: &str, value: Decimal, decimals: u8) -> Option<Self> {
        let raw = raw_from_display(value, decimals)?;
        Some(Self::new(token, raw, decimals))
    }
}

impl fmt::Display for TokenAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.to_display().normalize(), short_address(&self.token))
    }
}

pub fn display_value(raw: u128, decimals: u8) -> Decimal {
    i128::try_from(raw)
        .ok()
        .and_then(|r| Decimal::try_from_i128_with_scale(r, decimals as u32).ok())
        .unwrap_or(Decimal::MAX)
}

pub fn raw_from_display(value: Decimal, decimals: u8) -> Option<u128> {
    if value.is_sign_negative() {
        return None;
    }
    let factor = 10u64.checked_pow(decimals as u32)?;
    value
        .checked_mul(Decimal::from(factor))
        .and_then(|scaled| scaled.trunc().to_u128())
}

pub fn short_address(address: &str) -> String {
    if address.len() > 10 {
        format!("{}...{}", &address[..6], &address[address.len() - 4..])
    } else {
        address.to_string()
    }
}

/// Unordered pair of token addresses. `TokenPair::new(a, b) == TokenPair::new(b, a)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TokenPair {
    pub token_a: String,
    pub token_b: String,
}

impl TokenPair {
    pub fn new(a: &str, b: &str) -> Self {
        let (a, b) = (a.to_lowercase(), b.to_lowercase());
        if a <= b {
            Self { token_a: a, token_b: b }
        } else {
            Self { token_a: b, token_b: a }
        }
    }

    pub fn contains(&self, token: &str) -> bool {
        let token = token.to_lowercase();
        self.token_a == token || self.token_b == token
    }

    pub fn key(&self) -> String {
        format!("{}/{}", self.token_a, self.token_b)
    }
}

impl fmt::Display for TokenPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}",
            short_address(&self.token_a),
            short_address(&self.token_b)
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
