//! DraftKings sportsbook integration.
//!
//! One request per stat subcategory against the public sportscontent API.
//! Selections are joined to their market, and only Over/Under selections
//! with `trueOdds` (decimal) and `points` (the half-line) are kept.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::prelude::*;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{check_status, http_client, SportsbookSource, BROWSER_USER_AGENT};
use crate::types::{CanonicalProp, PropSide, Quote, Source, StatCategory};

const BASE_URL: &str = "https://sportsbook-nash.draftkings.com/sites/US-SB/api/sportscontent/controldata/league/leagueSubcategory/v1/markets";
const NBA_LEAGUE_ID: &str = "42648";

/// Player-prop subcategory ids per stat.
const SUBCATEGORIES: &[(u32, StatCategory)] = &[
    (12488, StatCategory::Points),
    (12492, StatCategory::Rebounds),
    (12495, StatCategory::Assists),
    (12497, StatCategory::ThreePointersMade),
    (12499, StatCategory::Steals),
    (12500, StatCategory::Blocks),
];

// ---------------------------------------------------------------------------
// DraftKings API types
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
struct SubcategoryResponse {
    #[serde(default)]
    markets: Vec<DkMarket>,
    #[serde(default)]
    selections: Vec<DkSelection>,
}

#[derive(Debug, Deserialize)]
struct DkMarket {
    id: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DkSelection {
    #[serde(default)]
    market_id: Value,
    #[serde(default)]
    label: String,
    #[serde(default)]
    points: Option<f64>,
    #[serde(default)]
    true_odds: Option<f64>,
    #[serde(default)]
    participants: Vec<DkParticipant>,
}

#[derive(Debug, Deserialize)]
struct DkParticipant {
    #[serde(default)]
    name: String,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct DraftKingsSource {
    http: Client,
}

impl DraftKingsSource {
    pub fn new(timeout: Duration) -> Result<Self> {
        Ok(Self {
            http: http_client(timeout, BROWSER_USER_AGENT)?,
        })
    }

    async fn fetch_subcategory(&self, subcategory_id: u32) -> Result<SubcategoryResponse> {
        let resp = self
            .http
            .get(subcategory_url(subcategory_id))
            .header("accept", "*/*")
            .header("origin", "https://sportsbook.draftkings.com")
            .header("referer", "https://sportsbook.draftkings.com/")
            .send()
            .await
            .context("DraftKings request failed")?;

        check_status(resp, "DraftKings")
            .await?
            .json()
            .await
            .context("Failed to parse DraftKings response")
    }
}

#[async_trait]
impl SportsbookSource for DraftKingsSource {
    fn source(&self) -> Source {
        Source::DraftKings
    }

    async fn fetch_props(&self) -> Result<Vec<CanonicalProp>> {
        let mut props = Vec::new();
        let mut failures = 0;

        for &(subcategory_id, stat) in SUBCATEGORIES {
            match self.fetch_subcategory(subcategory_id).await {
                Ok(data) => {
                    let parsed = parse_props(&data, stat);
                    debug!(stat = %stat, lines = parsed.len(), "DraftKings subcategory parsed");
                    props.extend(parsed);
                }
                Err(e) => {
                    failures += 1;
                    warn!(stat = %stat, subcategory_id, error = %e, "DraftKings subcategory failed");
                }
            }
        }

        if failures == SUBCATEGORIES.len() {
            anyhow::bail!("every DraftKings subcategory request failed");
        }

        info!(lines = props.len(), "Fetched DraftKings props");
        Ok(props)
    }
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

fn subcategory_url(subcategory_id: u32) -> String {
    let events_query = format!(
        "$filter=leagueId eq '{NBA_LEAGUE_ID}' AND clientMetadata/Subcategories/any(s: s/Id eq '{subcategory_id}')"
    );
    let markets_query = format!(
        "$filter=clientMetadata/subCategoryId eq '{subcategory_id}' AND tags/all(t: t ne 'SportcastBetBuilder')"
    );
    format!(
        "{BASE_URL}?isBatchable=false&templateVars={NBA_LEAGUE_ID}%2C{subcategory_id}\
         &eventsQuery={}&marketsQuery={}&include=Events&entity=event",
        urlencoding::encode(&events_query),
        urlencoding::encode(&markets_query),
    )
}

fn parse_props(data: &SubcategoryResponse, stat: StatCategory) -> Vec<CanonicalProp> {
    let market_ids: HashSet<String> = data.markets.iter().map(|m| m.id.to_string()).collect();

    data.selections
        .iter()
        .filter(|sel| market_ids.contains(&sel.market_id.to_string()))
        .filter_map(|sel| {
            let side = match sel.label.as_str() {
                "Over" => PropSide::Over,
                "Under" => PropSide::Under,
                _ => return None,
            };
            let player = sel.participants.first().map(|p| p.name.trim())?;
            if player.is_empty() {
                return None;
            }
            let threshold = Decimal::from_f64(sel.points?)?;
            let odds = sel.true_odds?;

            Some(CanonicalProp::new(
                player,
                stat,
                threshold,
                side,
                Source::DraftKings,
                Quote::DecimalOdds(odds),
            ))
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
