//! Market scanner.
//!
//! Fetches the exchange listing and every enabled sportsbook concurrently,
//! persists the result as snapshot tables, and turns a snapshot into a
//! ranked edge list. The exchange is required; a sportsbook that fails is
//! recorded as failed and left out of matching.

use anyhow::{Context, Result};
use futures::future::{join_all, try_join_all};
use tracing::{debug, info, warn};

use crate::platforms::{ExchangeClient, SportsbookSource};
use crate::storage::SnapshotStore;
use crate::strategy::edge::EdgeDetector;
use crate::strategy::matcher::{MatchStats, Matcher};
use crate::types::{CanonicalProp, Edge, RawMarket, Source};

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// Outcome of fetching one sportsbook.
#[derive(Debug, Clone)]
pub enum SourceFetch {
    Fetched(Vec<CanonicalProp>),
    Failed { reason: String },
}

#[derive(Debug, Clone)]
pub struct SourceSnapshot {
    pub source: Source,
    pub fetch: SourceFetch,
}

/// Exchange markets plus per-book props, fresh or loaded from disk.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub markets: Vec<RawMarket>,
    pub books: Vec<SourceSnapshot>,
}

impl Snapshot {
    /// Books that returned props, in fetch order.
    pub fn fetched_books(&self) -> impl Iterator<Item = (Source, &[CanonicalProp])> {
        self.books.iter().filter_map(|b| match &b.fetch {
            SourceFetch::Fetched(props) => Some((b.source, props.as_slice())),
            SourceFetch::Failed { .. } => None,
        })
    }

    pub fn failed_books(&self) -> impl Iterator<Item = (Source, &str)> {
        self.books.iter().filter_map(|b| match &b.fetch {
            SourceFetch::Failed { reason } => Some((b.source, reason.as_str())),
            SourceFetch::Fetched(_) => None,
        })
    }
}

// ---------------------------------------------------------------------------
// Scanner
// ---------------------------------------------------------------------------

pub struct Scanner<'a> {
    exchange: &'a dyn ExchangeClient,
    books: Vec<Box<dyn SportsbookSource>>,
    series: Vec<String>,
}

impl<'a> Scanner<'a> {
    pub fn new(
        exchange: &'a dyn ExchangeClient,
        books: Vec<Box<dyn SportsbookSource>>,
        series: Vec<String>,
    ) -> Self {
        Self { exchange, books, series }
    }

    /// Fetch everything concurrently. Only an exchange failure is an error.
    pub async fn fetch(&self) -> Result<Snapshot> {
        info!(series = self.series.len(), books = self.books.len(), "Starting scan");

        let (markets, books) = tokio::join!(self.fetch_markets(), self.fetch_books());
        let markets = markets.context("Exchange market fetch failed")?;

        info!(markets = markets.len(), "Fetched exchange markets");
        Ok(Snapshot { markets, books })
    }

    async fn fetch_markets(&self) -> Result<Vec<RawMarket>> {
        let pages = try_join_all(
            self.series
                .iter()
                .map(|series| self.exchange.list_open_markets(series)),
        )
        .await?;
        Ok(pages.into_iter().flatten().collect())
    }

    async fn fetch_books(&self) -> Vec<SourceSnapshot> {
        join_all(self.books.iter().map(|book| async move {
            let source = book.source();
            let fetch = match book.fetch_props().await {
                Ok(props) => SourceFetch::Fetched(props),
                Err(e) => {
                    warn!(source = %source, error = %e, "Sportsbook fetch failed, continuing without");
                    SourceFetch::Failed {
                        reason: format!("{e:#}"),
                    }
                }
            };
            SourceSnapshot { source, fetch }
        }))
        .await
    }
}

// ---------------------------------------------------------------------------
// Snapshot persistence
// ---------------------------------------------------------------------------

/// Write the exchange table and every fetched book. A failed book keeps
/// whatever snapshot it had before.
pub fn persist_snapshot(store: &SnapshotStore, snapshot: &Snapshot) -> Result<()> {
    store.save_markets(&snapshot.markets)?;
    for (source, props) in snapshot.fetched_books() {
        store.save_props(source, props)?;
    }
    for (source, reason) in snapshot.failed_books() {
        warn!(source = %source, reason, "Keeping previous snapshot for failed source");
    }
    Ok(())
}

/// Read the snapshot tables for `books`. A missing exchange table is an
/// error; a missing book table just leaves that book out.
pub fn load_snapshot(store: &SnapshotStore, books: &[Source]) -> Result<Snapshot> {
    let markets = store.load_markets()?;

    let mut loaded = Vec::new();
    for &source in books {
        match store.load_props(source)? {
            Some(props) => loaded.push(SourceSnapshot {
                source,
                fetch: SourceFetch::Fetched(props),
            }),
            None => debug!(source = %source, "No snapshot for source, skipping"),
        }
    }

    Ok(Snapshot {
        markets,
        books: loaded,
    })
}

// ---------------------------------------------------------------------------
// Scan
// ---------------------------------------------------------------------------

/// Result of matching and scoring one snapshot.
#[derive(Debug, Clone)]
pub struct ScanReport {
    /// Qualifying edges, best first.
    pub edges: Vec<Edge>,
    pub stats: MatchStats,
    /// Books that contributed quotes.
    pub sources: Vec<Source>,
    pub failed: Vec<(Source, String)>,
}

pub fn scan(snapshot: &Snapshot, detector: &EdgeDetector) -> ScanReport {
    let mut matcher = Matcher::new();
    for (source, props) in snapshot.fetched_books() {
        matcher.add_book(source, props);
    }

    let (matched, stats) = matcher.match_all(&snapshot.markets);
    let edges = detector.find_edges(&matched);

    info!(
        listed = stats.listed,
        priceable = stats.priceable,
        matched = stats.matched,
        edges = edges.len(),
        min_edge = %detector.config().min_edge,
        "Scan complete"
    );

    ScanReport {
        edges,
        stats,
        sources: matcher.sources(),
        failed: snapshot
            .failed_books()
            .map(|(s, r)| (s, r.to_string()))
            .collect(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
