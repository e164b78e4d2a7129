//! Mock exchange for integration testing.
//!
//! A deterministic `ExchangeClient` that serves a fixed market listing,
//! records every order it receives, and can be told to reject orders for
//! particular tickers.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use propedge::platforms::ExchangeClient;
use propedge::types::{OrderReceipt, OrderRequest, RawMarket};

#[derive(Clone, Default)]
pub struct MockExchange {
    markets: Vec<RawMarket>,
    orders: Arc<Mutex<Vec<OrderRequest>>>,
    rejected: Arc<Mutex<HashSet<String>>>,
    /// If set, listing fails with this error.
    listing_error: Option<String>,
}

impl MockExchange {
    pub fn with_markets(markets: Vec<RawMarket>) -> Self {
        Self {
            markets,
            ..Self::default()
        }
    }

    pub fn unreachable(msg: &str) -> Self {
        Self {
            listing_error: Some(msg.to_string()),
            ..Self::default()
        }
    }

    /// Reject every subsequent order for `ticker`.
    pub fn reject(&self, ticker: &str) {
        self.rejected.lock().unwrap().insert(ticker.to_string());
    }

    pub fn accept(&self, ticker: &str) {
        self.rejected.lock().unwrap().remove(ticker);
    }

    /// Orders accepted so far.
    pub fn orders(&self) -> Vec<OrderRequest> {
        self.orders.lock().unwrap().clone()
    }
}

#[async_trait]
impl ExchangeClient for MockExchange {
    async fn list_open_markets(&self, series_ticker: &str) -> Result<Vec<RawMarket>> {
        if let Some(msg) = &self.listing_error {
            return Err(anyhow!("{msg}"));
        }
        Ok(self
            .markets
            .iter()
            .filter(|m| m.series() == series_ticker)
            .cloned()
            .collect())
    }

    async fn place_order(&self, order: &OrderRequest) -> Result<OrderReceipt> {
        if self.rejected.lock().unwrap().contains(&order.ticker) {
            return Err(anyhow!("order rejected: {}", order.ticker));
        }
        let mut orders = self.orders.lock().unwrap();
        orders.push(order.clone());
        Ok(OrderReceipt {
            order_id: format!("mock-{}", orders.len()),
            status: "executed".to_string(),
        })
    }
}

/// An exchange listing in the shape the real client returns.
pub fn listing(ticker: &str, title: &str, yes_ask: u32, no_ask: u32) -> RawMarket {
    let series = ticker.split('-').next().unwrap_or(ticker).to_string();
    RawMarket {
        ticker: ticker.to_string(),
        title: title.to_string(),
        series_ticker: Some(series),
        yes_bid: Some(yes_ask.saturating_sub(2)),
        yes_ask: Some(yes_ask),
        no_bid: Some(no_ask.saturating_sub(2)),
        no_ask: Some(no_ask),
    }
}
