//! HTTP adapters to a venue/signing sidecar. The sidecar owns the RPC
//! connection and the wallet; this process only sees JSON.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use super::{BlockchainGateway, GatewayError, QuoteError, QuoteSource, SwapLeg, SwapReceipt, TxHash};
use crate::models::amount_serde::u128_string;
use crate::models::{Quote, Token, TokenAmount, VenueId};

#[derive(Debug, Deserialize)]
struct QuoteResponse {
    #[serde(with = "u128_string")]
    amount_out: u128,
    fee_bps: u32,
    liquidity_in: Option<String>,
    gas_estimate_out: Option<String>,
    #[serde(default)]
    stale: bool,
}

/// Quote source for one venue served by the sidecar's `/quote` endpoint.
#[derive(Debug, Clone)]
pub struct HttpQuoteSource {
    http: reqwest::Client,
    base_url: String,
    venue: VenueId,
}

impl HttpQuoteSource {
    pub fn new(http: reqwest::Client, base_url: &str, venue: VenueId) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            venue,
        }
    }

    fn quote_request(&self, token_in: &str, token_out: &str, amount_in: u128) -> reqwest::RequestBuilder {
        self.http.get(format!("{}/quote", self.base_url)).query(&[
            ("venue", self.venue.to_string()),
            ("token_in", token_in.to_string()),
            ("token_out", token_out.to_string()),
            ("amount_in", amount_in.to_string()),
        ])
    }
}

#[async_trait]
impl QuoteSource for HttpQuoteSource {
    fn venue(&self) -> &VenueId {
        &self.venue
    }

    async fn quote(&self, token_in: &str, token_out: &str, amount_in: u128) -> Result<Quote, QuoteError> {
        let unreachable = |reason: String| QuoteError::Unreachable {
            venue: self.venue.clone(),
            reason,
        };

        let resp = self
            .quote_request(token_in, token_out, amount_in)
            .send()
            .await
            .map_err(|e| unreachable(e.to_string()))?;

        if resp.status() == StatusCode::NOT_FOUND {
            return Err(QuoteError::NoLiquidity {
                venue: self.venue.clone(),
                token_in: token_in.to_string(),
                token_out: token_out.to_string(),
            });
        }
        if !resp.status().is_success() {
            return Err(unreachable(format!("HTTP {}", resp.status())));
        }

        let body: QuoteResponse = resp.json().await.map_err(|e| unreachable(e.to_string()))?;
        let parse_opt = |v: Option<String>| -> Result<Option<u128>, QuoteError> {
            v.map(|s| s.parse::<u128>().map_err(|e| unreachable(e.to_string())))
                .transpose()
        };

        Ok(Quote {
            venue: self.venue.clone(),
            token_in: token_in.to_lowercase(),
            token_out: token_out.to_lowercase(),
            amount_in,
            amount_out: body.amount_out,
            fee_bps: body.fee_bps,
            liquidity_in: parse_opt(body.liquidity_in)?,
            gas_estimate_out: parse_opt(body.gas_estimate_out)?.unwrap_or(0),
            stale: body.stale,
            quoted_at: Utc::now(),
        })
    }
}

#[derive(Debug, Serialize)]
struct SubmitRequest<'a> {
    venue: &'a str,
    token_in: &'a str,
    token_out: &'a str,
    #[serde(with = "u128_string")]
    amount_in: u128,
    #[serde(with = "u128_string")]
    min_acceptable_amount_out: u128,
    deadline: i64,
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    tx_hash: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum ReceiptStatus {
    Pending,
    Confirmed,
    Reverted,
}

#[derive(Debug, Deserialize)]
struct ReceiptResponse {
    status: ReceiptStatus,
    #[serde(default, with = "u128_string")]
    amount_out: u128,
    #[serde(default)]
    gas_used: u64,
    #[serde(default, with = "u128_string")]
    fee_paid: u128,
}

#[derive(Debug, Deserialize)]
struct BalanceResponse {
    #[serde(with = "u128_string")]
    raw: u128,
}

/// Gateway backed by the sidecar's `/swaps` and `/balances` endpoints.
#[derive(Debug, Clone)]
pub struct HttpGateway {
    http: reqwest::Client,
    base_url: String,
    poll_interval: Duration,
}

impl HttpGateway {
    pub fn new(http: reqwest::Client, base_url: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            poll_interval: Duration::from_millis(500),
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    async fn read_error(resp: reqwest::Response) -> GatewayError {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        classify_status(status, &body)
    }
}

/// Map a non-2xx sidecar response onto the gateway error taxonomy.
fn classify_status(status: StatusCode, body: &str) -> GatewayError {
    let detail = format!("HTTP {status}: {}", body.trim());
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        GatewayError::Transient(detail)
    } else if body.to_lowercase().contains("revert") {
        GatewayError::Reverted(detail)
    } else {
        GatewayError::Rejected(detail)
    }
}

fn transport_error(e: reqwest::Error) -> GatewayError {
    if e.is_decode() {
        GatewayError::Rejected(format!("malformed gateway response: {e}"))
    } else {
        GatewayError::Transient(e.to_string())
    }
}

#[async_trait]
impl BlockchainGateway for HttpGateway {
    async fn submit_swap(&self, leg: &SwapLeg) -> Result<TxHash, GatewayError> {
        let body = SubmitRequest {
            venue: leg.venue.as_str(),
            token_in: &leg.token_in,
            token_out: &leg.token_out,
            amount_in: leg.amount_in,
            min_acceptable_amount_out: leg.min_acceptable_amount_out,
            deadline: leg.deadline.timestamp(),
        };

        let resp = self
            .http
            .post(format!("{}/swaps", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        if !resp.status().is_success() {
            return Err(Self::read_error(resp).await);
        }
        let submitted: SubmitResponse = resp.json().await.map_err(transport_error)?;
        tracing::debug!(tx_hash = %submitted.tx_hash, venue = %leg.venue, "Swap submitted to gateway");
        Ok(TxHash(submitted.tx_hash))
    }

    /// Polls until the transaction leaves the pending state. Callers bound this with a timeout.
    async fn confirm_swap(&self, tx_hash: &TxHash) -> Result<SwapReceipt, GatewayError> {
        let url = format!("{}/swaps/{}", self.base_url, tx_hash);
        loop {
            let resp = self.http.get(&url).send().await.map_err(transport_error)?;
            if !resp.status().is_success() {
                return Err(Self::read_error(resp).await);
            }
            let receipt: ReceiptResponse = resp.json().await.map_err(transport_error)?;
            match receipt.status {
                ReceiptStatus::Pending => tokio::time::sleep(self.poll_interval).await,
                ReceiptStatus::Confirmed | ReceiptStatus::Reverted => {
                    return Ok(SwapReceipt {
                        tx_hash: tx_hash.clone(),
                        confirmed: matches!(receipt.status, ReceiptStatus::Confirmed),
                        amount_out: receipt.amount_out,
                        gas_used: receipt.gas_used,
                        fee_paid: receipt.fee_paid,
                    });
                }
            }
        }
    }

    async fn get_balance(&self, token: &Token) -> Result<TokenAmount, GatewayError> {
        let resp = self
            .http
            .get(format!("{}/balances/{}", self.base_url, token.address))
            .send()
            .await
            .map_err(transport_error)?;
        if !resp.status().is_success() {
            return Err(Self::read_error(resp).await);
        }
        let balance: BalanceResponse = resp.json().await.map_err(transport_error)?;
        Ok(token.amount(balance.raw))
    }
}
