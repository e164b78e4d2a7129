//! Platform integrations.
//!
//! Defines the `ExchangeClient` and `SportsbookSource` traits and provides
//! implementations for:
//! - Kalshi: the exchange, for market listing and order placement
//! - DraftKings: decimal odds
//! - Pinnacle: American odds, converted to decimal
//! - Underdog: payout multipliers

pub mod draftkings;
pub mod kalshi;
pub mod pinnacle;
pub mod underdog;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

use crate::types::{CanonicalProp, OrderReceipt, OrderRequest, RawMarket, Source};

/// Browser-like agent; the sportsbook endpoints reject obvious bots.
pub(crate) const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

/// The prediction-market exchange the engine trades against.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ExchangeClient: Send + Sync {
    /// All open markets in one series.
    async fn list_open_markets(&self, series_ticker: &str) -> Result<Vec<RawMarket>>;

    /// Submit an order. An error means nothing was placed.
    async fn place_order(&self, order: &OrderRequest) -> Result<OrderReceipt>;
}

/// A sportsbook that quotes Over/Under player props.
#[async_trait]
pub trait SportsbookSource: Send + Sync {
    fn source(&self) -> Source;

    /// Every currently offered prop, normalised to canonical form.
    async fn fetch_props(&self) -> Result<Vec<CanonicalProp>>;
}

/// HTTP client with a bounded request timeout.
pub(crate) fn http_client(timeout: Duration, user_agent: &str) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .user_agent(user_agent)
        .build()
        .context("Failed to build HTTP client")
}

/// Fail on non-2xx with the status and a trimmed body.
pub(crate) async fn check_status(resp: reqwest::Response, what: &str) -> Result<reqwest::Response> {
    if resp.status().is_success() {
        return Ok(resp);
    }
    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();
    anyhow::bail!("{what} returned {status}: {}", summarize_body(&body))
}

fn summarize_body(raw: &str) -> String {
    const MAX_CHARS: usize = 400;
    let compact = raw.replace(['\n', '\r'], " ");
    match compact.char_indices().nth(MAX_CHARS) {
        Some((idx, _)) => format!("{}…", &compact[..idx]),
        None => compact,
    }
}
