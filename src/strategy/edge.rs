//! Edge scoring.
//!
//! Compares the sportsbook consensus (mean vig-free probability across every
//! source that quotes a side) with the exchange ask for that side and keeps
//! the sides whose gap clears the configured minimum.

use rust_decimal::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::BTreeMap;
use tracing::debug;

use super::matcher::MatchedMarket;
use crate::types::{Edge, PropSide};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

pub struct EdgeConfig {
    /// Minimum edge in cents for a side to be kept.
    pub min_edge: Decimal,
}

impl Default for EdgeConfig {
    fn default() -> Self {
        Self { min_edge: dec!(5) }
    }
}

// ---------------------------------------------------------------------------
// Edge detection
// ---------------------------------------------------------------------------

/// Scores matched markets and ranks the resulting edges.
pub struct EdgeDetector {
    config: EdgeConfig,
}

impl EdgeDetector {
    pub fn new(config: EdgeConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EdgeConfig {
        &self.config
    }

    /// All edges at or above the minimum, best first.
    pub fn find_edges(&self, matched: &[MatchedMarket]) -> Vec<Edge> {
        let mut edges: Vec<Edge> = matched
            .iter()
            .flat_map(|m| self.detect_edges(m))
            .filter(|e| e.edge >= self.config.min_edge)
            .collect();

        rank_edges(&mut edges);
        edges
    }

    /// Score both sides of one market, unfiltered. Sides are independent:
    /// a market can produce an Over and an Under edge at once.
    pub fn detect_edges(&self, matched: &MatchedMarket) -> Vec<Edge> {
        let market = &matched.market;
        let mut edges = Vec::with_capacity(2);

        for choice in PropSide::BOTH {
            let implied: BTreeMap<_, f64> = matched
                .implied
                .iter()
                .map(|(source, p)| (*source, p.for_side(choice)))
                .collect();
            if implied.is_empty() {
                continue;
            }

            let avg_implied = implied.values().sum::<f64>() / implied.len() as f64;
            let exchange_price = market.ask_for(choice);
            let Some(edge) = round_edge(avg_implied - f64::from(exchange_price)) else {
                continue;
            };

            debug!(
                ticker = %market.ticker,
                choice = %choice,
                avg_implied = format!("{avg_implied:.1}"),
                exchange_price,
                edge = %edge,
                "Scored side"
            );

            edges.push(Edge {
                ticker: market.ticker.clone(),
                player: market.player.clone(),
                stat: market.stat,
                threshold: market.threshold,
                choice,
                side: choice.exchange_side(),
                yes_ask: market.yes_ask,
                no_ask: market.no_ask,
                implied,
                avg_implied,
                exchange_price,
                edge,
            });
        }

        edges
    }
}

/// Round a raw edge to one decimal place.
///
/// Rounds the float's exact binary value, not its shortest printed form, so
/// `4.65` (stored just above 4.65) becomes `4.7` while `0.35` (stored just
/// below) becomes `0.3`. Exact binary ties such as `0.25` go to even.
pub fn round_edge(raw: f64) -> Option<Decimal> {
    Decimal::from_f64_retain(raw).map(|d| d.round_dp_with_strategy(1, RoundingStrategy::MidpointNearestEven))
}

/// Sort descending by edge. The sort is stable, so ties keep their
/// encounter order.
pub fn rank_edges(edges: &mut [Edge]) {
    edges.sort_by(|a, b| b.edge.cmp(&a.edge));
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
