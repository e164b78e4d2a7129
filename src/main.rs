//! PROPEDGE: player-prop edge detection and guardrailed execution.
//!
//! Entry point. Loads `.env` and configuration, initialises structured
//! logging, and dispatches the `refresh`, `scan`, `auto` and `manual`
//! subcommands.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing::{info, warn};

use propedge::config::AppConfig;
use propedge::engine::executor::{
    check_manual_guardrails, order_ticket, EdgeOutcome, ExecutionConfig, ExecutionReport, Executor, ManualOutcome,
    StdinConfirm,
};
use propedge::engine::scanner::{load_snapshot, persist_snapshot, scan, ScanReport, Scanner, Snapshot};
use propedge::platforms::draftkings::DraftKingsSource;
use propedge::platforms::kalshi::{KalshiAuth, KalshiClient};
use propedge::platforms::pinnacle::PinnacleSource;
use propedge::platforms::underdog::UnderdogSource;
use propedge::platforms::{ExchangeClient, SportsbookSource};
use propedge::storage::ledger::CsvTradeLedger;
use propedge::storage::SnapshotStore;
use propedge::strategy::edge::{EdgeConfig, EdgeDetector};
use propedge::types::{Action, OrderRequest, OrderType, Side, Source};

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

#[derive(Debug, Parser)]
#[command(name = "propedge", version, about = "Player-prop edge scanner and guardrailed trader")]
struct Cli {
    /// Path to the TOML config file.
    #[arg(long, global = true, default_value = "config.toml")]
    config: PathBuf,

    /// Hard cap on contracts per order.
    #[arg(long, global = true)]
    max_contracts: Option<u32>,

    /// Spend budget for the run, in cents.
    #[arg(long, global = true)]
    max_spend: Option<u64>,

    /// Show what would be traded without placing orders.
    #[arg(long, global = true)]
    dry_run: bool,

    /// Skip confirmation prompts.
    #[arg(short = 'y', long = "yes", global = true)]
    yes: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Fetch the exchange and sportsbooks and save snapshots.
    Refresh {
        #[arg(long = "source", value_enum)]
        sources: Vec<BookArg>,
    },
    /// Find edges in the saved snapshots.
    Scan {
        #[arg(long = "source", value_enum)]
        sources: Vec<BookArg>,
        /// Minimum edge in cents.
        #[arg(long)]
        min_edge: Option<f64>,
    },
    /// Scan, then trade every qualifying edge under the guardrails.
    Auto {
        #[arg(long = "source", value_enum)]
        sources: Vec<BookArg>,
        /// Fetch fresh data first.
        #[arg(long)]
        refresh: bool,
        #[arg(long)]
        min_edge: Option<f64>,
        /// Contracts per trade.
        #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
        count: Option<u32>,
        #[arg(long = "type", value_enum)]
        order_type: Option<OrderType>,
    },
    /// Place a single order.
    Manual {
        #[arg(long)]
        ticker: String,
        #[arg(long, value_enum)]
        action: Action,
        #[arg(long, value_enum)]
        side: Side,
        #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
        count: u32,
        /// Limit price in cents (1-99).
        #[arg(long)]
        price: u32,
        #[arg(long = "type", value_enum, default_value_t = OrderType::Limit)]
        order_type: OrderType,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum BookArg {
    Draftkings,
    Pinnacle,
    Underdog,
}

impl From<BookArg> for Source {
    fn from(arg: BookArg) -> Self {
        match arg {
            BookArg::Draftkings => Source::DraftKings,
            BookArg::Pinnacle => Source::Pinnacle,
            BookArg::Underdog => Source::Underdog,
        }
    }
}

fn to_sources(args: &[BookArg]) -> Vec<Source> {
    args.iter().copied().map(Source::from).collect()
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let cli = Cli::parse();
    init_logging();

    let cfg = AppConfig::load_or_default(&cli.config)?;
    let store = SnapshotStore::new(&cfg.data.dir);
    info!(config = %cli.config.display(), data_dir = %cfg.data.dir.display(), "PROPEDGE starting");

    match &cli.command {
        Command::Refresh { sources } => {
            let books = cfg.enabled_books(&to_sources(sources));
            let snapshot = refresh(&cfg, &store, &books).await?;
            print_refresh_summary(&snapshot);
        }
        Command::Scan { sources, min_edge } => {
            let books = cfg.enabled_books(&to_sources(sources));
            let snapshot = load_snapshot(&store, &books)?;
            let report = run_scan(&cfg, &store, &snapshot, *min_edge)?;
            print_edges(&report);
        }
        Command::Auto {
            sources,
            refresh: fetch_first,
            min_edge,
            count,
            order_type,
        } => {
            let books = cfg.enabled_books(&to_sources(sources));
            let snapshot = if *fetch_first {
                refresh(&cfg, &store, &books).await?
            } else {
                load_snapshot(&store, &books)?
            };
            let report = run_scan(&cfg, &store, &snapshot, *min_edge)?;
            print_edges(&report);

            let mut exec_cfg = execution_config(&cfg, &cli);
            if let Some(count) = count {
                exec_cfg.count_per_trade = *count;
            }
            if let Some(order_type) = order_type {
                exec_cfg.order_type = *order_type;
            }
            run_auto(&cfg, &store, &report, exec_cfg).await?;
        }
        Command::Manual {
            ticker,
            action,
            side,
            count,
            price,
            order_type,
        } => {
            let order = OrderRequest {
                ticker: ticker.clone(),
                action: *action,
                side: *side,
                count: *count,
                order_type: *order_type,
                price_cents: *price,
            };
            run_manual(&cfg, &order, execution_config(&cfg, &cli)).await?;
        }
    }

    Ok(())
}

fn execution_config(cfg: &AppConfig, cli: &Cli) -> ExecutionConfig {
    ExecutionConfig {
        count_per_trade: cfg.trading.count_per_trade,
        max_contracts: cli.max_contracts.unwrap_or(cfg.trading.max_contracts),
        max_spend_cents: cli.max_spend.unwrap_or(cfg.trading.max_spend_cents),
        order_type: cfg.trading.order_type,
        fee_schedule: cfg.trading.fee_schedule,
        dry_run: cli.dry_run,
        auto_confirm: cli.yes,
    }
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

fn build_exchange(cfg: &AppConfig) -> Result<KalshiClient> {
    let auth = KalshiAuth::from_env(&cfg.exchange.api_key_env, &cfg.exchange.private_key_path_env)?;
    KalshiClient::new(auth, cfg.exchange.use_demo, cfg.exchange.timeout())
}

fn build_books(cfg: &AppConfig, books: &[Source]) -> Result<Vec<Box<dyn SportsbookSource>>> {
    let mut built: Vec<Box<dyn SportsbookSource>> = Vec::new();
    for &source in books {
        let Some(source_cfg) = cfg.sources.get(source) else {
            continue;
        };
        let book: Box<dyn SportsbookSource> = match source {
            Source::DraftKings => Box::new(DraftKingsSource::new(source_cfg.timeout())?),
            Source::Pinnacle => Box::new(PinnacleSource::new(source_cfg.timeout(), source_cfg.api_key())?),
            Source::Underdog => Box::new(UnderdogSource::new(source_cfg.timeout())?),
            Source::Kalshi => continue,
        };
        built.push(book);
    }
    Ok(built)
}

async fn refresh(cfg: &AppConfig, store: &SnapshotStore, books: &[Source]) -> Result<Snapshot> {
    let exchange = build_exchange(cfg)?;
    let scanner = Scanner::new(&exchange, build_books(cfg, books)?, cfg.exchange.series_tickers());

    let snapshot = scanner.fetch().await?;
    persist_snapshot(store, &snapshot)?;
    Ok(snapshot)
}

fn run_scan(cfg: &AppConfig, store: &SnapshotStore, snapshot: &Snapshot, min_edge: Option<f64>) -> Result<ScanReport> {
    let mut edge_cfg = EdgeConfig {
        min_edge: cfg.trading.min_edge(),
    };
    if let Some(cents) = min_edge {
        edge_cfg.min_edge = rust_decimal::Decimal::try_from(cents).context("invalid --min-edge")?;
    }

    let report = scan(snapshot, &EdgeDetector::new(edge_cfg));
    store.save_edges(&report.edges)?;
    Ok(report)
}

async fn run_auto(cfg: &AppConfig, store: &SnapshotStore, scan: &ScanReport, exec_cfg: ExecutionConfig) -> Result<()> {
    if scan.edges.is_empty() {
        println!("No edges to trade.");
        return Ok(());
    }

    let exchange = if exec_cfg.dry_run { None } else { Some(build_exchange(cfg)?) };
    let mut ledger = CsvTradeLedger::open(store.ledger_path())?;
    let mut confirm = StdinConfirm {
        fee_schedule: exec_cfg.fee_schedule,
    };

    let executor = Executor::new(exchange.as_ref().map(|e| e as &dyn ExchangeClient), exec_cfg);
    let report = executor.execute(&scan.edges, &mut ledger, &mut confirm).await?;
    print_execution_report(&report, executor.config(), store);
    Ok(())
}

async fn run_manual(cfg: &AppConfig, order: &OrderRequest, exec_cfg: ExecutionConfig) -> Result<()> {
    // Guardrails first, so a bad order never needs credentials.
    check_manual_guardrails(order, exec_cfg.max_contracts, exec_cfg.max_spend_cents)?;

    println!("Order details:");
    print!("{}", order_ticket(order, exec_cfg.fee_schedule));

    let exchange = if exec_cfg.dry_run { None } else { Some(build_exchange(cfg)?) };
    let mut confirm = StdinConfirm {
        fee_schedule: exec_cfg.fee_schedule,
    };
    let executor = Executor::new(exchange.as_ref().map(|e| e as &dyn ExchangeClient), exec_cfg);

    match executor.manual_trade(order, &mut confirm).await? {
        ManualOutcome::Declined => println!("Cancelled."),
        ManualOutcome::DryRun => println!("[DRY RUN] Order not placed."),
        ManualOutcome::Placed(receipt) => {
            println!("Order placed: {} ({})", receipt.order_id, receipt.status)
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

fn print_refresh_summary(snapshot: &Snapshot) {
    println!("Exchange: {} open markets", snapshot.markets.len());
    for (source, props) in snapshot.fetched_books() {
        println!("{source}: {} lines", props.len());
    }
    for (source, reason) in snapshot.failed_books() {
        println!("{source}: FAILED ({reason}), previous snapshot kept");
    }
}

fn print_edges(report: &ScanReport) {
    let sources: Vec<String> = report.sources.iter().map(|s| s.to_string()).collect();
    println!(
        "Matched {} of {} priceable markets ({} listed) against {}",
        report.stats.matched,
        report.stats.priceable,
        report.stats.listed,
        if sources.is_empty() { "no sources".to_string() } else { sources.join(", ") },
    );
    for (source, count) in &report.stats.per_source {
        println!("  {source} matched: {count}/{}", report.stats.priceable);
    }
    for (source, reason) in &report.failed {
        warn!(source = %source, reason, "Source excluded from this scan");
    }

    if report.edges.is_empty() {
        println!("No edges found.");
        return;
    }

    println!("\n{} edge(s):", report.edges.len());
    for (rank, edge) in report.edges.iter().enumerate() {
        println!("{:>3}. {edge}", rank + 1);
    }
}

fn print_execution_report(report: &ExecutionReport, cfg: &ExecutionConfig, store: &SnapshotStore) {
    for (key, outcome) in &report.outcomes {
        match outcome {
            EdgeOutcome::Placed { order, receipt } => match receipt {
                Some(r) => println!("PLACED   {order} -> {}", r.order_id),
                None => println!("DRY RUN  {order}"),
            },
            EdgeOutcome::Failed { order, reason } => println!("FAILED   {order}: {reason}"),
            EdgeOutcome::Declined { order } => println!("DECLINED {order}"),
            EdgeOutcome::AlreadyTraded => {}
            EdgeOutcome::BudgetExhausted => {
                println!("\nMax spend reached ({}¢) at {key}. Stopping.", cfg.max_spend_cents)
            }
        }
    }

    if report.skipped() > 0 {
        println!(
            "\nSkipped {} edge(s) already traded (see {})",
            report.skipped(),
            store.ledger_path().display()
        );
    }
    println!(
        "Placed: {}  Declined: {}  Failed: {}",
        report.placed(),
        report.declined(),
        report.failed()
    );
    println!(
        "Total spend this run: {}¢ (${:.2})",
        report.total_spend,
        report.total_spend as f64 / 100.0
    );
    println!(
        "Total est fees:       {}¢ (${:.2}) [{:.1}% of spend, {}]",
        report.total_fees,
        report.total_fees as f64 / 100.0,
        report.fee_pct(),
        cfg.fee_schedule
    );
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("propedge=info"));

    let json_logging = std::env::var("PROPEDGE_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .init();
    }
}
