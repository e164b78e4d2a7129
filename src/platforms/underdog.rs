//! Underdog Fantasy integration.
//!
//! A single endpoint returns three flat collections: players, their game
//! appearances, and over/under lines keyed by appearance. Props are the
//! join of the three, restricted to NBA players and active lines. Each
//! line option carries a payout multiplier for `higher` or `lower`.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::prelude::*;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info};

use super::{check_status, http_client, SportsbookSource, BROWSER_USER_AGENT};
use crate::types::{CanonicalProp, PropSide, Quote, Source, StatCategory};

const API_URL: &str = "https://api.underdogfantasy.com/beta/v6/over_under_lines";
const NBA_SPORT_ID: &str = "NBA";

// ---------------------------------------------------------------------------
// Underdog API types
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
struct LinesResponse {
    #[serde(default)]
    players: Vec<Player>,
    #[serde(default)]
    appearances: Vec<Appearance>,
    #[serde(default)]
    over_under_lines: Vec<OverUnderLine>,
}

#[derive(Debug, Deserialize)]
struct Player {
    id: String,
    #[serde(default)]
    first_name: String,
    #[serde(default)]
    last_name: String,
    #[serde(default)]
    sport_id: String,
}

#[derive(Debug, Deserialize)]
struct Appearance {
    id: String,
    player_id: String,
}

#[derive(Debug, Deserialize)]
struct OverUnderLine {
    #[serde(default)]
    status: String,
    #[serde(default)]
    stat_value: Value,
    over_under: OverUnder,
    #[serde(default)]
    options: Vec<LineOption>,
}

#[derive(Debug, Deserialize)]
struct OverUnder {
    appearance_stat: AppearanceStat,
}

#[derive(Debug, Deserialize)]
struct AppearanceStat {
    appearance_id: String,
    #[serde(default)]
    display_stat: String,
}

#[derive(Debug, Deserialize)]
struct LineOption {
    #[serde(default)]
    choice: String,
    #[serde(default)]
    payout_multiplier: Value,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct UnderdogSource {
    http: Client,
}

impl UnderdogSource {
    pub fn new(timeout: Duration) -> Result<Self> {
        Ok(Self {
            http: http_client(timeout, BROWSER_USER_AGENT)?,
        })
    }
}

#[async_trait]
impl SportsbookSource for UnderdogSource {
    fn source(&self) -> Source {
        Source::Underdog
    }

    async fn fetch_props(&self) -> Result<Vec<CanonicalProp>> {
        let resp = self
            .http
            .get(API_URL)
            .header("accept", "application/json")
            .send()
            .await
            .context("Underdog request failed")?;

        let data: LinesResponse = check_status(resp, "Underdog")
            .await?
            .json()
            .await
            .context("Failed to parse Underdog response")?;

        let props = parse_props(&data);
        info!(lines = props.len(), "Fetched Underdog props");
        Ok(props)
    }
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Underdog sends numeric fields as either JSON numbers or strings.
fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn parse_props(data: &LinesResponse) -> Vec<CanonicalProp> {
    let players: HashMap<&str, String> = data
        .players
        .iter()
        .filter(|p| p.sport_id == NBA_SPORT_ID)
        .map(|p| (p.id.as_str(), format!("{} {}", p.first_name.trim(), p.last_name.trim())))
        .collect();

    let appearances: HashMap<&str, &str> = data
        .appearances
        .iter()
        .filter_map(|a| {
            let name = players.get(a.player_id.as_str())?;
            Some((a.id.as_str(), name.as_str()))
        })
        .collect();

    let mut props = Vec::new();
    for line in &data.over_under_lines {
        if line.status == "suspended" {
            continue;
        }
        let stat_ref = &line.over_under.appearance_stat;
        let Some(&player) = appearances.get(stat_ref.appearance_id.as_str()) else {
            continue;
        };
        let Some(stat) = StatCategory::from_label(&stat_ref.display_stat) else {
            debug!(stat = %stat_ref.display_stat, "Skipping unmapped Underdog stat");
            continue;
        };
        let Some(threshold) = number(&line.stat_value).and_then(Decimal::from_f64) else {
            continue;
        };

        for option in &line.options {
            let side = match option.choice.as_str() {
                "higher" => PropSide::Over,
                "lower" => PropSide::Under,
                _ => continue,
            };
            let Some(multiplier) = number(&option.payout_multiplier) else {
                continue;
            };
            props.push(CanonicalProp::new(
                player,
                stat,
                threshold,
                side,
                Source::Underdog,
                Quote::PayoutMultiplier(multiplier),
            ));
        }
    }

    props
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
