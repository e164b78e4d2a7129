//! Persistence layer.
//!
//! Tabular CSV snapshots under one data directory: the exchange market
//! listing, one canonical-props table per sportsbook, the edge audit table
//! and the trade ledger (see [`ledger`]). Snapshot writes go to a sibling
//! temp file and are renamed into place, so a reader never sees a partial
//! table.

pub mod ledger;

use anyhow::{Context, Result};
use csv::{ReaderBuilder, WriterBuilder};
use rust_decimal::prelude::*;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::strategy::edge::round_edge;
use crate::types::{CanonicalProp, Edge, PropEdgeError, PropSide, Quote, RawMarket, Source, StatCategory};

const MARKETS_FILE: &str = "nba_player_props.csv";
const EDGES_FILE: &str = "edges.csv";
const LEDGER_FILE: &str = "trades_log.csv";

/// Column order of the edge audit table.
pub const EDGE_COLUMNS: [&str; 14] = [
    "ticker",
    "player",
    "stat",
    "threshold",
    "choice",
    "side",
    "kalshi_yes_ask",
    "kalshi_no_ask",
    "dk_implied",
    "pinn_implied",
    "ud_implied",
    "avg_implied",
    "kalshi_price",
    "edge",
];

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

/// One row of a sportsbook snapshot table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropRecord {
    pub full_name: String,
    pub stat_name: String,
    /// Half-line, kept as text so it round-trips exactly.
    pub stat_value: String,
    pub choice: PropSide,
    #[serde(default)]
    pub odds_decimal: Option<f64>,
    #[serde(default)]
    pub payout_multiplier: Option<f64>,
}

impl PropRecord {
    /// `None` for exchange asks, which live in the markets table.
    pub fn from_prop(prop: &CanonicalProp) -> Option<Self> {
        let (odds_decimal, payout_multiplier) = match prop.quote() {
            Quote::DecimalOdds(d) => (Some(d), None),
            Quote::PayoutMultiplier(m) => (None, Some(m)),
            Quote::AskCents(_) => return None,
        };
        Some(Self {
            full_name: prop.player().to_string(),
            stat_name: prop.stat().label().to_string(),
            stat_value: prop.threshold().normalize().to_string(),
            choice: prop.side(),
            odds_decimal,
            payout_multiplier,
        })
    }

    pub fn to_prop(&self, source: Source) -> Option<CanonicalProp> {
        let stat = StatCategory::from_label(&self.stat_name)?;
        let threshold = Decimal::from_str(self.stat_value.trim()).ok()?;
        let quote = match (self.odds_decimal, self.payout_multiplier) {
            (Some(d), _) => Quote::DecimalOdds(d),
            (None, Some(m)) => Quote::PayoutMultiplier(m),
            (None, None) => return None,
        };
        Some(CanonicalProp::new(
            self.full_name.clone(),
            stat,
            threshold,
            self.choice,
            source,
            quote,
        ))
    }
}

/// One row of the edge audit table, in [`EDGE_COLUMNS`] order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeRecord {
    pub ticker: String,
    pub player: String,
    pub stat: String,
    pub threshold: u32,
    pub choice: PropSide,
    pub side: crate::types::Side,
    pub kalshi_yes_ask: u32,
    pub kalshi_no_ask: u32,
    pub dk_implied: Option<f64>,
    pub pinn_implied: Option<f64>,
    pub ud_implied: Option<f64>,
    pub avg_implied: f64,
    pub kalshi_price: u32,
    pub edge: String,
}

impl From<&Edge> for EdgeRecord {
    fn from(edge: &Edge) -> Self {
        let implied = |source: Source| edge.implied.get(&source).copied().map(round1);
        Self {
            ticker: edge.ticker.clone(),
            player: edge.player.clone(),
            stat: edge.stat.label().to_string(),
            threshold: edge.threshold,
            choice: edge.choice,
            side: edge.side,
            kalshi_yes_ask: edge.yes_ask,
            kalshi_no_ask: edge.no_ask,
            dk_implied: implied(Source::DraftKings),
            pinn_implied: implied(Source::Pinnacle),
            ud_implied: implied(Source::Underdog),
            avg_implied: round1(edge.avg_implied),
            kalshi_price: edge.exchange_price,
            edge: edge.edge.to_string(),
        }
    }
}

fn round1(value: f64) -> f64 {
    round_edge(value).and_then(|d| d.to_f64()).unwrap_or(value)
}

// ---------------------------------------------------------------------------
// Snapshot store
// ---------------------------------------------------------------------------

/// File layout of the data directory.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    dir: PathBuf,
}

impl SnapshotStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn markets_path(&self) -> PathBuf {
        self.dir.join(MARKETS_FILE)
    }

    pub fn props_path(&self, source: Source) -> PathBuf {
        self.dir.join(format!("{}_nba_props.csv", source.slug()))
    }

    pub fn edges_path(&self) -> PathBuf {
        self.dir.join(EDGES_FILE)
    }

    pub fn ledger_path(&self) -> PathBuf {
        self.dir.join(LEDGER_FILE)
    }

    pub fn save_markets(&self, markets: &[RawMarket]) -> Result<()> {
        let path = self.markets_path();
        write_table(&path, None, markets)?;
        info!(path = %path.display(), rows = markets.len(), "Saved exchange markets");
        Ok(())
    }

    /// Fails with [`PropEdgeError::MissingExchangeSnapshot`] when the
    /// table has never been written.
    pub fn load_markets(&self) -> Result<Vec<RawMarket>> {
        let path = self.markets_path();
        if !path.exists() {
            return Err(PropEdgeError::MissingExchangeSnapshot {
                path: path.display().to_string(),
            }
            .into());
        }
        read_table(&path)
    }

    pub fn save_props(&self, source: Source, props: &[CanonicalProp]) -> Result<()> {
        let path = self.props_path(source);
        let rows: Vec<PropRecord> = props.iter().filter_map(PropRecord::from_prop).collect();
        write_table(&path, None, &rows)?;
        info!(source = %source, path = %path.display(), rows = rows.len(), "Saved book snapshot");
        Ok(())
    }

    /// `None` when the source has no snapshot yet.
    pub fn load_props(&self, source: Source) -> Result<Option<Vec<CanonicalProp>>> {
        let path = self.props_path(source);
        if !path.exists() {
            debug!(source = %source, path = %path.display(), "No book snapshot");
            return Ok(None);
        }
        let rows: Vec<PropRecord> = read_table(&path)?;
        Ok(Some(rows.iter().filter_map(|r| r.to_prop(source)).collect()))
    }

    pub fn save_edges(&self, edges: &[Edge]) -> Result<()> {
        let path = self.edges_path();
        let rows: Vec<EdgeRecord> = edges.iter().map(EdgeRecord::from).collect();
        write_table(&path, Some(&EDGE_COLUMNS), &rows)?;
        debug!(path = %path.display(), rows = rows.len(), "Saved edge table");
        Ok(())
    }

    pub fn load_edges(&self) -> Result<Vec<EdgeRecord>> {
        read_table(&self.edges_path())
    }
}

// ---------------------------------------------------------------------------
// CSV helpers
// ---------------------------------------------------------------------------

/// Write `rows` to `path` atomically. With `header`, the header row is
/// written even when there are no rows.
fn write_table<T: Serialize>(path: &Path, header: Option<&[&str]>, rows: &[T]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }

    let tmp = path.with_extension("csv.tmp");
    {
        let mut writer = WriterBuilder::new()
            .has_headers(header.is_none())
            .from_path(&tmp)
            .with_context(|| format!("Failed to create {}", tmp.display()))?;
        if let Some(header) = header {
            writer.write_record(header)?;
        }
        for row in rows {
            writer.serialize(row)?;
        }
        writer.flush()?;
    }

    fs::rename(&tmp, path)
        .with_context(|| format!("Failed to move {} into place", path.display()))
}

fn read_table<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;

    reader
        .deserialize()
        .collect::<Result<Vec<T>, _>>()
        .with_context(|| format!("Failed to parse {}", path.display()))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
