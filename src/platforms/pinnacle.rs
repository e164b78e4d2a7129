//! Pinnacle sportsbook integration.
//!
//! Player props are "special" matchups whose description reads
//! `"Player Name (Category)"`, with Over and Under participants. Prices
//! live on a separate per-matchup endpoint, fetched concurrently, and are
//! quoted in American odds.

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use reqwest::Client;
use rust_decimal::prelude::*;
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::collections::{BTreeSet, HashMap};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{check_status, http_client, SportsbookSource, BROWSER_USER_AGENT};
use crate::strategy::normalize::decimal_from_american;
use crate::types::{CanonicalProp, PropSide, Quote, Source, StatCategory};

const BASE_URL: &str = "https://guest.api.arcadia.pinnacle.com/0.1";
const NBA_LEAGUE_ID: u32 = 487;

/// Concurrent price requests in flight.
const PRICE_CONCURRENCY: usize = 8;

// ---------------------------------------------------------------------------
// Pinnacle API types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct Matchup {
    id: u64,
    #[serde(default)]
    parent: Option<serde_json::Value>,
    #[serde(default)]
    special: Option<Special>,
    #[serde(default)]
    participants: Vec<Participant>,
}

#[derive(Debug, Deserialize)]
struct Special {
    #[serde(default)]
    description: String,
}

#[derive(Debug, Deserialize)]
struct Participant {
    id: u64,
    #[serde(default)]
    name: String,
}

#[derive(Debug, Deserialize)]
struct StraightMarket {
    #[serde(default)]
    prices: Vec<Price>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Price {
    participant_id: u64,
    #[serde(default)]
    price: Option<f64>,
    #[serde(default)]
    points: Option<f64>,
}

/// One side of a player special, before pricing.
#[derive(Debug, Clone, PartialEq)]
struct SpecialLine {
    matchup_id: u64,
    participant_id: u64,
    player: String,
    stat: StatCategory,
    side: PropSide,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct PinnacleSource {
    http: Client,
    api_key: Option<SecretString>,
}

impl PinnacleSource {
    pub fn new(timeout: Duration, api_key: Option<SecretString>) -> Result<Self> {
        Ok(Self {
            http: http_client(timeout, BROWSER_USER_AGENT)?,
            api_key,
        })
    }

    async fn get<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T> {
        let mut req = self.http.get(format!("{BASE_URL}{path}"));
        if let Some(key) = &self.api_key {
            req = req.header("x-api-key", key.expose_secret());
        }

        let resp = req.send().await.context("Pinnacle request failed")?;
        check_status(resp, "Pinnacle")
            .await?
            .json()
            .await
            .with_context(|| format!("Failed to parse Pinnacle response for {path}"))
    }

    async fn fetch_prices(&self, matchup_ids: &BTreeSet<u64>) -> HashMap<u64, (f64, f64)> {
        let results: Vec<_> = stream::iter(matchup_ids.iter().copied())
            .map(|id| async move {
                let markets: Result<Vec<StraightMarket>> =
                    self.get(&format!("/matchups/{id}/markets/straight")).await;
                (id, markets)
            })
            .buffer_unordered(PRICE_CONCURRENCY)
            .collect()
            .await;

        let mut prices = HashMap::new();
        for (id, markets) in results {
            match markets {
                Ok(markets) => prices.extend(index_prices(&markets)),
                Err(e) => warn!(matchup_id = id, error = %e, "Pinnacle price fetch failed"),
            }
        }
        prices
    }
}

#[async_trait]
impl SportsbookSource for PinnacleSource {
    fn source(&self) -> Source {
        Source::Pinnacle
    }

    async fn fetch_props(&self) -> Result<Vec<CanonicalProp>> {
        let matchups: Vec<Matchup> = self
            .get(&format!("/leagues/{NBA_LEAGUE_ID}/matchups"))
            .await?;

        let lines = parse_specials(&matchups);
        if lines.is_empty() {
            info!("No Pinnacle player specials listed");
            return Ok(Vec::new());
        }

        let matchup_ids: BTreeSet<u64> = lines.iter().map(|l| l.matchup_id).collect();
        debug!(matchups = matchup_ids.len(), "Fetching Pinnacle prices");
        let prices = self.fetch_prices(&matchup_ids).await;

        let props = price_lines(&lines, &prices);
        info!(lines = props.len(), "Fetched Pinnacle props");
        Ok(props)
    }
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Split `"Player Name (Category)"`.
fn split_description(description: &str) -> Option<(&str, &str)> {
    let (player, rest) = description.split_once('(')?;
    let (category, _) = rest.split_once(')')?;
    let player = player.trim();
    (!player.is_empty()).then_some((player, category.trim()))
}

fn parse_specials(matchups: &[Matchup]) -> Vec<SpecialLine> {
    let mut lines = Vec::new();

    for m in matchups {
        if m.parent.is_none() {
            continue;
        }
        let Some(special) = &m.special else {
            continue;
        };
        let Some((player, category)) = split_description(&special.description) else {
            continue;
        };
        let Some(stat) = StatCategory::from_label(category) else {
            debug!(category, "Skipping unmapped Pinnacle category");
            continue;
        };

        for participant in &m.participants {
            let side = match participant.name.as_str() {
                "Over" => PropSide::Over,
                "Under" => PropSide::Under,
                _ => continue,
            };
            lines.push(SpecialLine {
                matchup_id: m.id,
                participant_id: participant.id,
                player: player.to_string(),
                stat,
                side,
            });
        }
    }

    lines
}

/// participant id -> (american odds, points)
fn index_prices(markets: &[StraightMarket]) -> HashMap<u64, (f64, f64)> {
    markets
        .iter()
        .flat_map(|m| &m.prices)
        .filter_map(|p| Some((p.participant_id, (p.price?, p.points?))))
        .collect()
}

fn price_lines(lines: &[SpecialLine], prices: &HashMap<u64, (f64, f64)>) -> Vec<CanonicalProp> {
    lines
        .iter()
        .filter_map(|line| {
            let &(american, points) = prices.get(&line.participant_id)?;
            let decimal = match decimal_from_american(american) {
                Ok(d) => round4(d),
                Err(e) => {
                    debug!(player = %line.player, error = %e, "Dropping Pinnacle price");
                    return None;
                }
            };
            Some(CanonicalProp::new(
                line.player.clone(),
                line.stat,
                Decimal::from_f64(points)?,
                line.side,
                Source::Pinnacle,
                Quote::DecimalOdds(decimal),
            ))
        })
        .collect()
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
