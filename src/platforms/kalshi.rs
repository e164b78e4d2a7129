//! Kalshi exchange integration.
//!
//! REST API v2. Every request is signed with RSA-PSS over SHA-256:
//! `base64(sign(timestamp_ms + METHOD + path))`, where `path` excludes the
//! query string. Headers: `KALSHI-ACCESS-KEY`, `KALSHI-ACCESS-TIMESTAMP`,
//! `KALSHI-ACCESS-SIGNATURE`.
//!
//! Prices are in cents. Newer responses also carry `*_dollars` strings,
//! which are used when the integer fields are absent.

use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::Engine;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::Client;
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs8::DecodePrivateKey;
use rsa::pss::{BlindedSigningKey, Signature};
use rsa::sha2::Sha256;
use rsa::signature::{RandomizedSigner, SignatureEncoding};
use rsa::RsaPrivateKey;
use rust_decimal::prelude::*;
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::{debug, info};

use super::{check_status, http_client, ExchangeClient};
use crate::types::{Action, OrderReceipt, OrderRequest, OrderType, PropEdgeError, RawMarket, Side};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

const PROD_BASE_URL: &str = "https://api.elections.kalshi.com";
const DEMO_BASE_URL: &str = "https://demo-api.kalshi.co";
const MARKETS_PATH: &str = "/trade-api/v2/markets";
const ORDERS_PATH: &str = "/trade-api/v2/portfolio/orders";

/// Page size for market listing (API maximum).
const PAGE_LIMIT: u32 = 1000;

const USER_AGENT: &str = "propedge/0.1.0";

// ---------------------------------------------------------------------------
// Authentication
// ---------------------------------------------------------------------------

/// API key id plus the parsed RSA signing key.
pub struct KalshiAuth {
    api_key: SecretString,
    signing_key: BlindedSigningKey<Sha256>,
}

impl fmt::Debug for KalshiAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KalshiAuth")
            .field("api_key", &"<redacted>")
            .field("signing_key", &"<redacted>")
            .finish()
    }
}

impl KalshiAuth {
    /// Build from an API key id and a PKCS#1 or PKCS#8 PEM string.
    /// Literal `\n` sequences in the PEM are accepted.
    pub fn from_pem(api_key: String, pem: &str) -> Result<Self, PropEdgeError> {
        let pem = pem.replace("\\n", "\n");
        let pem = pem.trim();

        let private_key = RsaPrivateKey::from_pkcs1_pem(pem)
            .or_else(|_| RsaPrivateKey::from_pkcs8_pem(pem))
            .map_err(|e| PropEdgeError::Credentials(format!("cannot parse RSA private key: {e}")))?;

        Ok(Self {
            api_key: SecretString::new(api_key),
            signing_key: BlindedSigningKey::<Sha256>::new(private_key),
        })
    }

    /// Load the key id and the private-key file path from the named
    /// environment variables.
    pub fn from_env(api_key_env: &str, private_key_path_env: &str) -> Result<Self> {
        let api_key = std::env::var(api_key_env)
            .map_err(|_| PropEdgeError::Credentials(format!("{api_key_env} not set")))?;
        let key_path = std::env::var(private_key_path_env)
            .map_err(|_| PropEdgeError::Credentials(format!("{private_key_path_env} not set")))?;

        let pem = std::fs::read_to_string(&key_path)
            .with_context(|| format!("Failed to read private key file: {key_path}"))?;

        Ok(Self::from_pem(api_key, &pem)?)
    }

    /// Sign a request; returns `(timestamp_ms, base64_signature)`.
    pub fn sign(&self, method: &str, path: &str) -> (String, String) {
        let timestamp = chrono::Utc::now().timestamp_millis().to_string();
        let path = path.split('?').next().unwrap_or(path);
        let message = format!("{timestamp}{method}{path}");

        let mut rng = rand::thread_rng();
        let signature: Signature = self.signing_key.sign_with_rng(&mut rng, message.as_bytes());
        let encoded = base64::engine::general_purpose::STANDARD.encode(signature.to_bytes());

        (timestamp, encoded)
    }

    fn headers(&self, method: &str, path: &str) -> Result<HeaderMap> {
        let (timestamp, signature) = self.sign(method, path);

        let mut headers = HeaderMap::new();
        headers.insert(
            "kalshi-access-key",
            HeaderValue::from_str(self.api_key.expose_secret())
                .context("API key id is not a valid header value")?,
        );
        headers.insert("kalshi-access-timestamp", HeaderValue::from_str(&timestamp)?);
        headers.insert("kalshi-access-signature", HeaderValue::from_str(&signature)?);
        Ok(headers)
    }
}

// ---------------------------------------------------------------------------
// Kalshi API types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct MarketsPage {
    #[serde(default)]
    markets: Vec<ApiMarket>,
    #[serde(default)]
    cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiMarket {
    ticker: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    yes_bid: Option<i64>,
    #[serde(default)]
    yes_ask: Option<i64>,
    #[serde(default)]
    no_bid: Option<i64>,
    #[serde(default)]
    no_ask: Option<i64>,
    #[serde(default)]
    yes_bid_dollars: Option<String>,
    #[serde(default)]
    yes_ask_dollars: Option<String>,
    #[serde(default)]
    no_bid_dollars: Option<String>,
    #[serde(default)]
    no_ask_dollars: Option<String>,
}

impl ApiMarket {
    fn into_raw(self, series_ticker: &str) -> RawMarket {
        RawMarket {
            yes_bid: to_cents(self.yes_bid, self.yes_bid_dollars.as_deref()),
            yes_ask: to_cents(self.yes_ask, self.yes_ask_dollars.as_deref()),
            no_bid: to_cents(self.no_bid, self.no_bid_dollars.as_deref()),
            no_ask: to_cents(self.no_ask, self.no_ask_dollars.as_deref()),
            ticker: self.ticker,
            title: self.title,
            series_ticker: Some(series_ticker.to_string()),
        }
    }
}

/// Integer cents if present, otherwise the dollar string scaled to cents.
fn to_cents(cents: Option<i64>, dollars: Option<&str>) -> Option<u32> {
    if let Some(c) = cents {
        return u32::try_from(c).ok().filter(|c| *c <= 100);
    }
    let dollars = Decimal::from_str(dollars?.trim()).ok()?;
    (dollars * Decimal::ONE_HUNDRED).round().to_u32().filter(|c| *c <= 100)
}

#[derive(Debug, Serialize)]
struct CreateOrderBody<'a> {
    ticker: &'a str,
    action: Action,
    side: Side,
    count: u32,
    #[serde(rename = "type")]
    order_type: OrderType,
    #[serde(skip_serializing_if = "Option::is_none")]
    yes_price: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    no_price: Option<u32>,
    client_order_id: String,
}

impl<'a> CreateOrderBody<'a> {
    fn from_order(order: &'a OrderRequest) -> Self {
        let (yes_price, no_price) = match order.side {
            Side::Yes => (Some(order.price_cents), None),
            Side::No => (None, Some(order.price_cents)),
        };
        Self {
            ticker: &order.ticker,
            action: order.action,
            side: order.side,
            count: order.count,
            order_type: order.order_type,
            yes_price,
            no_price,
            client_order_id: uuid::Uuid::new_v4().to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct CreateOrderResponse {
    order: ApiOrder,
}

#[derive(Debug, Deserialize)]
struct ApiOrder {
    order_id: String,
    #[serde(default)]
    status: Option<String>,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Authenticated Kalshi REST client.
pub struct KalshiClient {
    http: Client,
    auth: KalshiAuth,
    base_url: String,
}

impl KalshiClient {
    pub fn new(auth: KalshiAuth, use_demo: bool, timeout: Duration) -> Result<Self> {
        let base_url = if use_demo { DEMO_BASE_URL } else { PROD_BASE_URL };
        Self::with_base_url(auth, base_url, timeout)
    }

    pub fn with_base_url(auth: KalshiAuth, base_url: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            http: http_client(timeout, USER_AGENT)?,
            auth,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn fetch_page(&self, series_ticker: &str, cursor: Option<&str>) -> Result<MarketsPage> {
        let limit = PAGE_LIMIT.to_string();
        let mut query = vec![
            ("series_ticker", series_ticker),
            ("status", "open"),
            ("limit", limit.as_str()),
        ];
        if let Some(c) = cursor {
            query.push(("cursor", c));
        }

        let resp = self
            .http
            .get(self.url(MARKETS_PATH))
            .headers(self.auth.headers("GET", MARKETS_PATH)?)
            .query(&query)
            .send()
            .await
            .context("Kalshi markets request failed")?;

        check_status(resp, "Kalshi markets")
            .await?
            .json()
            .await
            .context("Failed to parse Kalshi markets response")
    }
}

#[async_trait]
impl ExchangeClient for KalshiClient {
    async fn list_open_markets(&self, series_ticker: &str) -> Result<Vec<RawMarket>> {
        let mut markets = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let page = self.fetch_page(series_ticker, cursor.as_deref()).await?;
            markets.extend(page.markets.into_iter().map(|m| m.into_raw(series_ticker)));

            match page.cursor {
                Some(next) if !next.is_empty() => cursor = Some(next),
                _ => break,
            }
        }

        debug!(series = series_ticker, count = markets.len(), "Listed Kalshi markets");
        Ok(markets)
    }

    async fn place_order(&self, order: &OrderRequest) -> Result<OrderReceipt> {
        let body = CreateOrderBody::from_order(order);

        let resp = self
            .http
            .post(self.url(ORDERS_PATH))
            .headers(self.auth.headers("POST", ORDERS_PATH)?)
            .json(&body)
            .send()
            .await
            .context("Kalshi order request failed")?;

        let resp = check_status(resp, "Kalshi order")
            .await
            .map_err(|e| PropEdgeError::Exchange(e.to_string()))?;
        let created: CreateOrderResponse = resp
            .json()
            .await
            .context("Failed to parse Kalshi order response")?;

        info!(
            ticker = %order.ticker,
            order_id = %created.order.order_id,
            status = ?created.order.status,
            "Kalshi order accepted"
        );

        Ok(OrderReceipt {
            order_id: created.order.order_id,
            status: created.order.status.unwrap_or_else(|| "unknown".to_string()),
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
