//! Shared types for PROPEDGE.
//!
//! The canonical prop model every source is normalised into, the exchange
//! market shape, ranked edges, trade-ledger entries and the order vocabulary.
//! Strategy, platform and engine modules all depend on these without
//! depending on each other.

use chrono::{DateTime, Utc};
use regex::Regex;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::LazyLock;

// ---------------------------------------------------------------------------
// Stat categories (the single series/label table)
// ---------------------------------------------------------------------------

/// Player statistic a prop is written on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum StatCategory {
    Points,
    Rebounds,
    Assists,
    ThreePointersMade,
    Steals,
    Blocks,
}

impl StatCategory {
    /// All categories the exchange lists player props for.
    pub const ALL: &'static [StatCategory] = &[
        StatCategory::Points,
        StatCategory::Rebounds,
        StatCategory::Assists,
        StatCategory::ThreePointersMade,
        StatCategory::Steals,
        StatCategory::Blocks,
    ];

    /// Exchange series ticker for this stat.
    pub fn series_ticker(&self) -> &'static str {
        match self {
            StatCategory::Points => "KXNBAPTS",
            StatCategory::Rebounds => "KXNBAREB",
            StatCategory::Assists => "KXNBAAST",
            StatCategory::ThreePointersMade => "KXNBA3PT",
            StatCategory::Steals => "KXNBASTL",
            StatCategory::Blocks => "KXNBABLK",
        }
    }

    /// Display label, also the label persisted in snapshot tables.
    pub fn label(&self) -> &'static str {
        match self {
            StatCategory::Points => "Points",
            StatCategory::Rebounds => "Rebounds",
            StatCategory::Assists => "Assists",
            StatCategory::ThreePointersMade => "3-Pointers Made",
            StatCategory::Steals => "Steals",
            StatCategory::Blocks => "Blocks",
        }
    }

    /// Lower-cased labels the sportsbooks use for this stat.
    fn aliases(&self) -> &'static [&'static str] {
        match self {
            StatCategory::Points => &["points", "pts"],
            StatCategory::Rebounds => &["rebounds", "rebs"],
            StatCategory::Assists => &["assists", "asts"],
            StatCategory::ThreePointersMade => &[
                "3-pointers made",
                "3-point field goals",
                "3 point fg",
                "3-pt made",
                "three pointers made",
            ],
            StatCategory::Steals => &["steals"],
            StatCategory::Blocks => &["blocks", "blocked shots"],
        }
    }

    /// Resolve an exchange series ticker.
    pub fn from_series(series: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|stat| stat.series_ticker() == series)
    }

    /// Resolve a sportsbook (or persisted) label, case-insensitively.
    pub fn from_label(label: &str) -> Option<Self> {
        let wanted = label.trim().to_lowercase();
        Self::ALL
            .iter()
            .copied()
            .find(|stat| stat.aliases().contains(&wanted.as_str()))
    }
}

impl fmt::Display for StatCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

// ---------------------------------------------------------------------------
// Sides and sources
// ---------------------------------------------------------------------------

/// Which side of a two-outcome prop a quote is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PropSide {
    Over,
    Under,
}

impl PropSide {
    pub const BOTH: [PropSide; 2] = [PropSide::Over, PropSide::Under];

    /// The exchange contract side that pays out when this prop side hits.
    pub fn exchange_side(&self) -> Side {
        match self {
            PropSide::Over => Side::Yes,
            PropSide::Under => Side::No,
        }
    }
}

impl fmt::Display for PropSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropSide::Over => write!(f, "over"),
            PropSide::Under => write!(f, "under"),
        }
    }
}

/// Origin of a quote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Kalshi,
    DraftKings,
    Pinnacle,
    Underdog,
}

impl Source {
    /// Every sportsbook source, in column order.
    pub const BOOKS: &'static [Source] = &[Source::DraftKings, Source::Pinnacle, Source::Underdog];

    /// Short label used in column names (`dk_implied`, ...).
    pub fn label(&self) -> &'static str {
        match self {
            Source::Kalshi => "kalshi",
            Source::DraftKings => "dk",
            Source::Pinnacle => "pinn",
            Source::Underdog => "ud",
        }
    }

    /// File-name slug for snapshot tables.
    pub fn slug(&self) -> &'static str {
        match self {
            Source::Kalshi => "kalshi",
            Source::DraftKings => "draftkings",
            Source::Pinnacle => "pinnacle",
            Source::Underdog => "underdog",
        }
    }

    pub fn is_exchange(&self) -> bool {
        matches!(self, Source::Kalshi)
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Kalshi => write!(f, "Kalshi"),
            Source::DraftKings => write!(f, "DraftKings"),
            Source::Pinnacle => write!(f, "Pinnacle"),
            Source::Underdog => write!(f, "Underdog"),
        }
    }
}

// ---------------------------------------------------------------------------
// Canonical prop model
// ---------------------------------------------------------------------------

/// A source's native price encoding for one side of a prop.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Quote {
    /// Exchange ask to buy this side, in cents (1–99).
    AskCents(u32),
    /// Decimal odds (total return per unit staked).
    DecimalOdds(f64),
    /// Flat-stake profit multiplier.
    PayoutMultiplier(f64),
}

/// Convert an exchange inclusive threshold ("N+") to the sportsbook
/// half-line ("over N-0.5"). Both describe the same outcome.
pub fn half_line(inclusive: u32) -> Decimal {
    Decimal::from(inclusive) - dec!(0.5)
}

/// Player names match case-insensitively after trimming; nothing fuzzier.
pub fn normalize_player(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Join key for matching equivalent lines across sources.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PropKey {
    pub player: String,
    pub stat: StatCategory,
    /// Half-line convention.
    pub threshold: Decimal,
}

impl PropKey {
    pub fn new(player: &str, stat: StatCategory, threshold: Decimal) -> Self {
        Self {
            player: normalize_player(player),
            stat,
            threshold: threshold.normalize(),
        }
    }
}

/// One quoted line for one player/stat/threshold/side from one source.
///
/// Fields are private: a prop is a pure derivation of one raw source record
/// and is never modified after construction.
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalProp {
    player: String,
    stat: StatCategory,
    threshold: Decimal,
    side: PropSide,
    source: Source,
    quote: Quote,
}

impl CanonicalProp {
    /// `threshold` is in the half-line convention.
    pub fn new(
        player: impl Into<String>,
        stat: StatCategory,
        threshold: Decimal,
        side: PropSide,
        source: Source,
        quote: Quote,
    ) -> Self {
        Self {
            player: player.into().trim().to_string(),
            stat,
            threshold,
            side,
            source,
            quote,
        }
    }

    pub fn player(&self) -> &str {
        &self.player
    }

    pub fn stat(&self) -> StatCategory {
        self.stat
    }

    pub fn threshold(&self) -> Decimal {
        self.threshold
    }

    pub fn side(&self) -> PropSide {
        self.side
    }

    pub fn source(&self) -> Source {
        self.source
    }

    pub fn quote(&self) -> Quote {
        self.quote
    }

    pub fn key(&self) -> PropKey {
        PropKey::new(&self.player, self.stat, self.threshold)
    }
}

impl fmt::Display for CanonicalProp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} {} {} {} ({:?})",
            self.source, self.player, self.stat, self.side, self.threshold, self.quote,
        )
    }
}

// ---------------------------------------------------------------------------
// Exchange markets
// ---------------------------------------------------------------------------

/// An open exchange market as listed by the exchange, before parsing.
/// Also the row shape of the exchange snapshot table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawMarket {
    pub ticker: String,
    pub title: String,
    #[serde(default)]
    pub series_ticker: Option<String>,
    #[serde(default)]
    pub yes_bid: Option<u32>,
    #[serde(default)]
    pub yes_ask: Option<u32>,
    #[serde(default)]
    pub no_bid: Option<u32>,
    #[serde(default)]
    pub no_ask: Option<u32>,
}

impl RawMarket {
    /// Series ticker, falling back to the ticker prefix.
    pub fn series(&self) -> &str {
        match self.series_ticker.as_deref().map(str::trim) {
            Some(series) if !series.is_empty() => series,
            _ => self.ticker.split('-').next().unwrap_or(&self.ticker),
        }
    }
}

static TITLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(.+?):\s*(\d+)\+\s+\w+").expect("title pattern is valid")
});

/// Split an exchange title like `"Victor Wembanyama: 35+ points"` into
/// player and inclusive threshold.
pub fn parse_market_title(title: &str) -> Option<(String, u32)> {
    let caps = TITLE_RE.captures(title)?;
    let player = caps.get(1)?.as_str().trim().to_string();
    let threshold = caps.get(2)?.as_str().parse().ok()?;
    Some((player, threshold))
}

/// A parsed, priceable exchange player-prop market.
#[derive(Debug, Clone, PartialEq)]
pub struct ExchangeMarket {
    pub ticker: String,
    pub player: String,
    pub stat: StatCategory,
    /// Inclusive lower bound ("N+").
    pub threshold: u32,
    pub yes_ask: u32,
    pub no_ask: u32,
}

impl ExchangeMarket {
    /// Parse a raw listing. `None` when the title doesn't have the
    /// "Player: N+ stat" shape, the series is unknown, or either ask is
    /// missing or zero.
    pub fn from_raw(raw: &RawMarket) -> Option<Self> {
        let (player, threshold) = parse_market_title(&raw.title)?;
        let stat = StatCategory::from_series(raw.series())?;
        let yes_ask = raw.yes_ask.filter(|ask| *ask > 0)?;
        let no_ask = raw.no_ask.filter(|ask| *ask > 0)?;

        Some(Self {
            ticker: raw.ticker.clone(),
            player,
            stat,
            threshold,
            yes_ask,
            no_ask,
        })
    }

    /// Threshold in the sportsbook half-line convention.
    pub fn half_line(&self) -> Decimal {
        half_line(self.threshold)
    }

    /// Ask to buy the exchange contract that pays on `side`.
    pub fn ask_for(&self, side: PropSide) -> u32 {
        match side {
            PropSide::Over => self.yes_ask,
            PropSide::Under => self.no_ask,
        }
    }

    /// Both sides of this market as canonical props.
    pub fn canonical_props(&self) -> [CanonicalProp; 2] {
        PropSide::BOTH.map(|side| {
            CanonicalProp::new(
                self.player.clone(),
                self.stat,
                self.half_line(),
                side,
                Source::Kalshi,
                Quote::AskCents(self.ask_for(side)),
            )
        })
    }
}

// ---------------------------------------------------------------------------
// Order vocabulary
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Buy,
    Sell,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Buy => write!(f, "buy"),
            Action::Sell => write!(f, "sell"),
        }
    }
}

/// Exchange contract side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Yes,
    No,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Yes => write!(f, "yes"),
            Side::No => write!(f, "no"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OrderType {
    Limit,
    Market,
}

impl fmt::Display for OrderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderType::Limit => write!(f, "limit"),
            OrderType::Market => write!(f, "market"),
        }
    }
}

/// An order to submit to the exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderRequest {
    pub ticker: String,
    pub action: Action,
    pub side: Side,
    pub count: u32,
    pub order_type: OrderType,
    pub price_cents: u32,
}

impl OrderRequest {
    /// Cents at risk: the price for a buy, the complement for a sell.
    pub fn cost_cents(&self) -> u64 {
        let per_contract = match self.action {
            Action::Buy => self.price_cents,
            Action::Sell => 100u32.saturating_sub(self.price_cents),
        };
        u64::from(per_contract) * u64::from(self.count)
    }
}

impl fmt::Display for OrderRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} x{} {} @ {}¢ ({})",
            self.action, self.side, self.count, self.ticker, self.price_cents, self.order_type,
        )
    }
}

/// Exchange acknowledgement of a submitted order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderReceipt {
    pub order_id: String,
    pub status: String,
}

// ---------------------------------------------------------------------------
// Edges
// ---------------------------------------------------------------------------

/// One actionable opportunity on one side of one exchange market.
#[derive(Debug, Clone, PartialEq)]
pub struct Edge {
    pub ticker: String,
    pub player: String,
    pub stat: StatCategory,
    /// Inclusive exchange threshold.
    pub threshold: u32,
    pub choice: PropSide,
    pub side: Side,
    pub yes_ask: u32,
    pub no_ask: u32,
    /// Vig-free implied probability (cents scale) per quoting source.
    pub implied: BTreeMap<Source, f64>,
    pub avg_implied: f64,
    /// Ask on the exchange for `side`, in cents.
    pub exchange_price: u32,
    /// `avg_implied - exchange_price`, rounded to 0.1¢.
    pub edge: Decimal,
}

impl Edge {
    pub fn ledger_key(&self) -> LedgerKey {
        LedgerKey::new(&self.ticker, self.side)
    }
}

impl fmt::Display for Edge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}¢ | {} {} {}+ {} | buy {} @ {}¢ vs books {:.1}¢ [{}]",
            self.edge,
            self.player,
            self.stat,
            self.threshold,
            self.choice,
            self.side,
            self.exchange_price,
            self.avg_implied,
            self.ticker,
        )
    }
}

// ---------------------------------------------------------------------------
// Trade ledger
// ---------------------------------------------------------------------------

/// Deduplication key: one engine entry per market and side, ever.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LedgerKey {
    pub ticker: String,
    pub side: Side,
}

impl LedgerKey {
    pub fn new(ticker: &str, side: Side) -> Self {
        Self {
            ticker: ticker.to_string(),
            side,
        }
    }
}

impl fmt::Display for LedgerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.ticker, self.side)
    }
}

/// One row of the append-only trade ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeLedgerEntry {
    pub timestamp: DateTime<Utc>,
    pub ticker: String,
    pub action: Action,
    pub side: Side,
    pub count: u32,
    pub order_type: OrderType,
    pub price: u32,
}

impl TradeLedgerEntry {
    pub fn from_order(order: &OrderRequest) -> Self {
        Self {
            timestamp: Utc::now(),
            ticker: order.ticker.clone(),
            action: order.action,
            side: order.side,
            count: order.count,
            order_type: order.order_type,
            price: order.price_cents,
        }
    }

    pub fn key(&self) -> LedgerKey {
        LedgerKey::new(&self.ticker, self.side)
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Domain-specific error types for PROPEDGE.
#[derive(Debug, thiserror::Error)]
pub enum PropEdgeError {
    #[error("American odds must be >= 100 or <= -100, got {0}")]
    InvalidAmericanOdds(f64),

    #[error("Price must be between 1 and 99 cents, got {0}")]
    InvalidPrice(u32),

    #[error("count ({count}) exceeds max-contracts ({max})")]
    ContractLimit { count: u32, max: u32 },

    #[error("estimated cost ({cost}¢) exceeds max-spend ({max}¢)")]
    SpendLimit { cost: u64, max: u64 },

    #[error("No exchange market snapshot at {path}. Run `propedge refresh` first.")]
    MissingExchangeSnapshot { path: String },

    #[error("Trade ledger {path} is locked by another run")]
    LedgerLocked { path: String },

    #[error("Trade ledger {path} has an unreadable row at line {line} ({reason}). Repair or remove it before trading.")]
    LedgerCorrupt { path: String, line: u64, reason: String },

    #[error("Exchange API error: {0}")]
    Exchange(String),

    #[error("Missing credentials: {0}")]
    Credentials(String),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
