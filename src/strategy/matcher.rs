//! Cross-source matching.
//!
//! Indexes each sportsbook's canonical props by (player, stat, half-line) and
//! joins exchange markets against them. The exchange's "N+" threshold is
//! converted to the half-line "N-0.5" before lookup; player names compare
//! case-insensitively and otherwise exactly. Spelling variants across
//! sources do not match.

use std::collections::{BTreeMap, HashMap};
use tracing::debug;

use super::normalize::{vig_free, VigFree};
use crate::types::{CanonicalProp, ExchangeMarket, PropKey, PropSide, Quote, RawMarket, Source};

#[derive(Debug, Default, Clone, Copy)]
struct SidePair {
    over: Option<Quote>,
    under: Option<Quote>,
}

/// One sportsbook's quotes, keyed for exact lookup.
#[derive(Debug, Clone)]
pub struct QuoteIndex {
    source: Source,
    lines: HashMap<PropKey, SidePair>,
}

impl QuoteIndex {
    /// Build an index from `source`'s props. Props from any other source are
    /// ignored; the first quote seen for a key and side wins.
    pub fn build(source: Source, props: &[CanonicalProp]) -> Self {
        let mut lines: HashMap<PropKey, SidePair> = HashMap::new();

        for prop in props.iter().filter(|p| p.source() == source) {
            let slot = lines.entry(prop.key()).or_default();
            let leg = match prop.side() {
                PropSide::Over => &mut slot.over,
                PropSide::Under => &mut slot.under,
            };
            if leg.is_none() {
                *leg = Some(prop.quote());
            }
        }

        Self { source, lines }
    }

    pub fn source(&self) -> Source {
        self.source
    }

    /// Number of distinct (player, stat, line) keys.
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Vig-free pair for a key, if both legs are quoted and usable.
    pub fn vig_free(&self, key: &PropKey) -> Option<VigFree> {
        let pair = self.lines.get(key)?;
        vig_free(pair.over.as_ref(), pair.under.as_ref())
    }
}

/// An exchange market together with every source that prices it.
#[derive(Debug, Clone)]
pub struct MatchedMarket {
    pub market: ExchangeMarket,
    pub implied: BTreeMap<Source, VigFree>,
}

/// Counters from one matching pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchStats {
    pub listed: usize,
    pub priceable: usize,
    pub matched: usize,
    /// Priceable markets each indexed source quoted. Every indexed source
    /// has an entry, zero included.
    pub per_source: BTreeMap<Source, usize>,
}

/// Joins exchange markets to sportsbook quotes.
#[derive(Debug, Clone, Default)]
pub struct Matcher {
    books: Vec<QuoteIndex>,
}

impl Matcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one source's props. A source that failed to fetch is simply never
    /// added.
    pub fn add_book(&mut self, source: Source, props: &[CanonicalProp]) {
        let index = QuoteIndex::build(source, props);
        debug!(source = %source, lines = index.len(), "Indexed sportsbook lines");
        self.books.push(index);
    }

    pub fn sources(&self) -> Vec<Source> {
        self.books.iter().map(QuoteIndex::source).collect()
    }

    /// Per-source vig-free probabilities for one market; empty when no
    /// source quotes it.
    pub fn match_market(&self, market: &ExchangeMarket) -> BTreeMap<Source, VigFree> {
        let [over, _] = market.canonical_props();
        let key = over.key();

        self.books
            .iter()
            .filter_map(|book| book.vig_free(&key).map(|p| (book.source(), p)))
            .collect()
    }

    /// Parse and match every raw exchange listing. Markets that cannot be
    /// parsed or priced are dropped quietly; markets with no quotes are
    /// dropped too.
    pub fn match_all(&self, raw: &[RawMarket]) -> (Vec<MatchedMarket>, MatchStats) {
        let mut stats = MatchStats {
            listed: raw.len(),
            per_source: self.books.iter().map(|b| (b.source(), 0)).collect(),
            ..MatchStats::default()
        };
        let mut matched = Vec::new();

        for listing in raw {
            let Some(market) = ExchangeMarket::from_raw(listing) else {
                debug!(ticker = %listing.ticker, title = %listing.title, "Skipping unparseable or unpriced market");
                continue;
            };
            stats.priceable += 1;

            let implied = self.match_market(&market);
            if implied.is_empty() {
                continue;
            }
            stats.matched += 1;
            for source in implied.keys() {
                *stats.per_source.entry(*source).or_default() += 1;
            }
            matched.push(MatchedMarket { market, implied });
        }

        (matched, stats)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
