//! End-to-end pipeline tests.

use anyhow::Result;
use async_trait::async_trait;
use rust_decimal_macros::dec;

use propedge::engine::executor::{ExecutionConfig, Executor};
use propedge::engine::scanner::{load_snapshot, persist_snapshot, scan, Scanner};
use propedge::platforms::SportsbookSource;
use propedge::storage::ledger::{CsvTradeLedger, TradeLedger};
use propedge::storage::SnapshotStore;
use propedge::strategy::edge::{EdgeConfig, EdgeDetector};
use propedge::types::{CanonicalProp, LedgerKey, PropEdgeError, PropSide, Quote, Side, Source, StatCategory};

use crate::mock_exchange::{listing, MockExchange};

struct StaticBook {
    source: Source,
    props: Vec<CanonicalProp>,
}

#[async_trait]
impl SportsbookSource for StaticBook {
    fn source(&self) -> Source {
        self.source
    }

    async fn fetch_props(&self) -> Result<Vec<CanonicalProp>> {
        Ok(self.props.clone())
    }
}

fn pair(source: Source, player: &str, stat: StatCategory, line: rust_decimal::Decimal, over: f64, under: f64) -> Vec<CanonicalProp> {
    vec![
        CanonicalProp::new(player, stat, line, PropSide::Over, source, Quote::DecimalOdds(over)),
        CanonicalProp::new(player, stat, line, PropSide::Under, source, Quote::DecimalOdds(under)),
    ]
}

fn auto(count: u32, max_spend: u64) -> ExecutionConfig {
    ExecutionConfig {
        count_per_trade: count,
        max_contracts: 20,
        max_spend_cents: max_spend,
        auto_confirm: true,
        ..ExecutionConfig::default()
    }
}

fn never_prompted(_: &propedge::types::OrderRequest) -> bool {
    panic!("auto-confirm run must not prompt")
}

#[tokio::test]
async fn test_refresh_scan_and_trade_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let store = SnapshotStore::new(dir.path());

    let exchange = MockExchange::with_markets(vec![
        listing("KXNBAPTS-26OCT19LALGSW-JDOE20", "J. Doe: 20+ points", 40, 65),
        listing("KXNBAPTS-26OCT19LALGSW-XNOB30", "X. Nobody: 30+ points", 20, 85),
    ]);
    let books: Vec<Box<dyn SportsbookSource>> = vec![Box::new(StaticBook {
        source: Source::DraftKings,
        props: pair(Source::DraftKings, "J. Doe", StatCategory::Points, dec!(19.5), 2.0, 2.2),
    })];

    let scanner = Scanner::new(&exchange, books, vec!["KXNBAPTS".to_string()]);
    let snapshot = scanner.fetch().await.unwrap();
    persist_snapshot(&store, &snapshot).unwrap();

    // Scan from disk, as the `scan` subcommand does.
    let loaded = load_snapshot(&store, &[Source::DraftKings, Source::Pinnacle]).unwrap();
    let report = scan(&loaded, &EdgeDetector::new(EdgeConfig::default()));
    store.save_edges(&report.edges).unwrap();

    assert_eq!(report.stats.listed, 2);
    assert_eq!(report.stats.matched, 1);
    assert_eq!(report.edges.len(), 1);
    let edge = &report.edges[0];
    assert_eq!(edge.side, Side::Yes);
    assert_eq!(edge.exchange_price, 40);
    assert_eq!(edge.edge, dec!(12.4));

    let rows = store.load_edges().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].kalshi_price, 40);
    assert_eq!(rows[0].edge, "12.4");

    let mut ledger = CsvTradeLedger::open(store.ledger_path()).unwrap();
    let executor = Executor::new(Some(&exchange), auto(5, 5000));
    let run = executor
        .execute(&report.edges, &mut ledger, &mut never_prompted)
        .await
        .unwrap();

    assert_eq!(run.placed(), 1);
    assert_eq!(run.total_spend, 200);
    let orders = exchange.orders();
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].ticker, "KXNBAPTS-26OCT19LALGSW-JDOE20");
    assert_eq!(orders[0].price_cents, 40);
}

#[tokio::test]
async fn test_rerun_against_same_ledger_places_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let store = SnapshotStore::new(dir.path());
    let exchange = MockExchange::with_markets(vec![listing("KXNBAPTS-G1-JDOE20", "J. Doe: 20+ points", 40, 65)]);
    let snapshot = Scanner::new(
        &exchange,
        vec![Box::new(StaticBook {
            source: Source::Pinnacle,
            props: pair(Source::Pinnacle, "j. doe", StatCategory::Points, dec!(19.5), 2.0, 2.2),
        })],
        vec!["KXNBAPTS".to_string()],
    )
    .fetch()
    .await
    .unwrap();
    let edges = scan(&snapshot, &EdgeDetector::new(EdgeConfig::default())).edges;
    let executor = Executor::new(Some(&exchange), auto(5, 5000));

    {
        let mut ledger = CsvTradeLedger::open(store.ledger_path()).unwrap();
        let first = executor.execute(&edges, &mut ledger, &mut never_prompted).await.unwrap();
        assert_eq!(first.placed(), 1);
    }

    let mut ledger = CsvTradeLedger::open(store.ledger_path()).unwrap();
    let second = executor.execute(&edges, &mut ledger, &mut never_prompted).await.unwrap();
    assert_eq!(second.placed(), 0);
    assert_eq!(second.skipped(), 1);
    assert_eq!(second.total_spend, 0);
    assert_eq!(exchange.orders().len(), 1);
}

#[tokio::test]
async fn test_budget_clamp_across_markets() {
    let exchange = MockExchange::with_markets(vec![
        listing("KXNBAPTS-G1-JDOE20", "J. Doe: 20+ points", 60, 45),
        listing("KXNBAREB-G1-RROE10", "R. Roe: 10+ rebounds", 60, 45),
    ]);
    let mut props = pair(Source::DraftKings, "J. Doe", StatCategory::Points, dec!(19.5), 1.35, 3.6);
    props.extend(pair(Source::DraftKings, "R. Roe", StatCategory::Rebounds, dec!(9.5), 1.4, 3.5));
    let snapshot = Scanner::new(
        &exchange,
        vec![Box::new(StaticBook { source: Source::DraftKings, props })],
        vec!["KXNBAPTS".to_string(), "KXNBAREB".to_string()],
    )
    .fetch()
    .await
    .unwrap();

    let edges = scan(&snapshot, &EdgeDetector::new(EdgeConfig::default())).edges;
    assert_eq!(edges.len(), 2);
    assert!(edges[0].edge > edges[1].edge);

    let dir = tempfile::tempdir().unwrap();
    let mut ledger = CsvTradeLedger::open(dir.path().join("trades_log.csv")).unwrap();
    let executor = Executor::new(Some(&exchange), auto(10, 1000));
    let run = executor.execute(&edges, &mut ledger, &mut never_prompted).await.unwrap();

    let counts: Vec<u32> = exchange.orders().iter().map(|o| o.count).collect();
    assert_eq!(counts, vec![10, 6]);
    assert_eq!(run.total_spend, 960);
    assert_eq!(ledger.load_keys().unwrap().len(), 2);
}

#[tokio::test]
async fn test_rejected_order_is_retried_next_run() {
    let exchange = MockExchange::with_markets(vec![listing("KXNBAPTS-G1-JDOE20", "J. Doe: 20+ points", 40, 65)]);
    let snapshot = Scanner::new(
        &exchange,
        vec![Box::new(StaticBook {
            source: Source::DraftKings,
            props: pair(Source::DraftKings, "J. Doe", StatCategory::Points, dec!(19.5), 2.0, 2.2),
        })],
        vec!["KXNBAPTS".to_string()],
    )
    .fetch()
    .await
    .unwrap();
    let edges = scan(&snapshot, &EdgeDetector::new(EdgeConfig::default())).edges;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("trades_log.csv");
    let executor = Executor::new(Some(&exchange), auto(5, 5000));

    exchange.reject("KXNBAPTS-G1-JDOE20");
    {
        let mut ledger = CsvTradeLedger::open(&path).unwrap();
        let run = executor.execute(&edges, &mut ledger, &mut never_prompted).await.unwrap();
        assert_eq!(run.failed(), 1);
        assert_eq!(run.total_spend, 0);
        assert!(ledger.load_keys().unwrap().is_empty());
    }

    exchange.accept("KXNBAPTS-G1-JDOE20");
    let mut ledger = CsvTradeLedger::open(&path).unwrap();
    let run = executor.execute(&edges, &mut ledger, &mut never_prompted).await.unwrap();
    assert_eq!(run.placed(), 1);
    assert!(ledger
        .load_keys()
        .unwrap()
        .contains(&LedgerKey::new("KXNBAPTS-G1-JDOE20", Side::Yes)));
}

#[tokio::test]
async fn test_unreachable_exchange_aborts_refresh() {
    let exchange = MockExchange::unreachable("connection refused");
    let scanner = Scanner::new(&exchange, Vec::new(), vec!["KXNBAPTS".to_string()]);
    let err = scanner.fetch().await.unwrap_err();
    assert!(format!("{err:#}").contains("connection refused"));
}

#[test]
fn test_scan_before_refresh_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = load_snapshot(&SnapshotStore::new(dir.path()), &[Source::DraftKings]).unwrap_err();
    let typed = err.downcast_ref::<PropEdgeError>();
    assert!(matches!(typed, Some(PropEdgeError::MissingExchangeSnapshot { .. })));
    assert!(err.to_string().contains("propedge refresh"));
}

#[test]
fn test_overlapping_runs_are_locked_out() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("trades_log.csv");
    let _first = CsvTradeLedger::open(&path).unwrap();
    let second = CsvTradeLedger::open(&path);
    assert!(second.is_err());
}

#[tokio::test]
async fn test_damaged_ledger_blocks_trading() {
    let exchange = MockExchange::with_markets(vec![listing("KXNBAPTS-G1-JDOE20", "J. Doe: 20+ points", 40, 65)]);
    let snapshot = Scanner::new(
        &exchange,
        vec![Box::new(StaticBook {
            source: Source::DraftKings,
            props: pair(Source::DraftKings, "J. Doe", StatCategory::Points, dec!(19.5), 2.0, 2.2),
        })],
        vec!["KXNBAPTS".to_string()],
    )
    .fetch()
    .await
    .unwrap();
    let edges = scan(&snapshot, &EdgeDetector::new(EdgeConfig::default())).edges;
    assert_eq!(edges.len(), 1);

    // A crash mid-append leaves the last row cut short.
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("trades_log.csv");
    std::fs::write(
        &path,
        "timestamp,ticker,action,side,count,order_type,price\n\
         2026-10-19T18:00:00Z,KXNBAPTS-G1-JDOE20,buy,yes,5,lim",
    )
    .unwrap();

    let mut ledger = CsvTradeLedger::open(&path).unwrap();
    let executor = Executor::new(Some(&exchange), auto(5, 5000));
    let err = executor
        .execute(&edges, &mut ledger, &mut never_prompted)
        .await
        .unwrap_err();

    assert!(matches!(
        err.downcast_ref::<PropEdgeError>(),
        Some(PropEdgeError::LedgerCorrupt { .. })
    ));
    assert!(exchange.orders().is_empty());
}
