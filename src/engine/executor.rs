//! Trade executor.
//!
//! Walks a ranked edge list in order and turns it into exchange orders
//! under three guardrails: a per-order contract cap, a per-run spend
//! budget, and the trade ledger, which blocks re-entry into any
//! `(ticker, side)` already taken. The walk is strictly sequential because
//! the budget is consumed in rank order.

use anyhow::{Context, Result};
use std::collections::HashSet;
use std::io::{BufRead, Write};
use tracing::{debug, info, warn};

use crate::platforms::ExchangeClient;
use crate::storage::ledger::TradeLedger;
use crate::strategy::fees::{estimate_fee, fee_pct, FeeSchedule};
use crate::types::{Action, Edge, LedgerKey, OrderReceipt, OrderRequest, OrderType, PropEdgeError, TradeLedgerEntry};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ExecutionConfig {
    /// Contracts requested per edge.
    pub count_per_trade: u32,
    /// Hard cap per order.
    pub max_contracts: u32,
    /// Spend budget for the whole run, in cents.
    pub max_spend_cents: u64,
    pub order_type: OrderType,
    pub fee_schedule: FeeSchedule,
    pub dry_run: bool,
    /// Skip interactive confirmation.
    pub auto_confirm: bool,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            count_per_trade: 5,
            max_contracts: 20,
            max_spend_cents: 5000,
            order_type: OrderType::Limit,
            fee_schedule: FeeSchedule::Taker,
            dry_run: false,
            auto_confirm: false,
        }
    }
}

impl ExecutionConfig {
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(self.count_per_trade > 0, "count per trade must be at least 1");
        anyhow::ensure!(self.max_contracts > 0, "max-contracts must be at least 1");
        Ok(())
    }

    fn needs_confirmation(&self) -> bool {
        !self.dry_run && !self.auto_confirm
    }
}

// ---------------------------------------------------------------------------
// Confirmation
// ---------------------------------------------------------------------------

/// Asks the operator whether to place an order.
pub trait Confirm {
    fn confirm(&mut self, order: &OrderRequest) -> Result<bool>;
}

impl<F> Confirm for F
where
    F: FnMut(&OrderRequest) -> bool,
{
    fn confirm(&mut self, order: &OrderRequest) -> Result<bool> {
        Ok(self(order))
    }
}

/// Prints the order ticket and reads `y` from stdin. Anything else
/// declines.
pub struct StdinConfirm {
    pub fee_schedule: FeeSchedule,
}

impl Confirm for StdinConfirm {
    fn confirm(&mut self, order: &OrderRequest) -> Result<bool> {
        let mut stdout = std::io::stdout();
        write!(stdout, "{}Place this order? [y/N] ", order_ticket(order, self.fee_schedule))?;
        stdout.flush()?;

        let mut answer = String::new();
        std::io::stdin()
            .lock()
            .read_line(&mut answer)
            .context("Failed to read confirmation")?;
        Ok(answer.trim().eq_ignore_ascii_case("y"))
    }
}

/// Human-readable order summary with estimated cost and fee.
pub fn order_ticket(order: &OrderRequest, schedule: FeeSchedule) -> String {
    let cost = order.cost_cents();
    let fee = estimate_fee(order.price_cents, order.count, schedule);
    format!(
        "  Ticker:   {}\n  Action:   {}\n  Side:     {}\n  Count:    {}\n  Type:     {}\n  Price:    {}¢\n  \
         Est cost: {}¢ (${:.2})\n  Est fee:  {}¢ (${:.2}) [{:.1}% of cost, {}]\n",
        order.ticker,
        order.action,
        order.side,
        order.count,
        order.order_type,
        order.price_cents,
        cost,
        cost as f64 / 100.0,
        fee,
        fee as f64 / 100.0,
        fee_pct(fee, cost),
        schedule,
    )
}

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// What happened to one edge.
#[derive(Debug, Clone, PartialEq)]
pub enum EdgeOutcome {
    AlreadyTraded,
    Declined { order: OrderRequest },
    /// `receipt` is `None` in dry-run mode.
    Placed { order: OrderRequest, receipt: Option<OrderReceipt> },
    /// Not logged, so the edge stays eligible on a later run.
    Failed { order: OrderRequest, reason: String },
    /// Terminal: no edge after this one was attempted.
    BudgetExhausted,
}

/// Result of one execution run.
#[derive(Debug, Clone, Default)]
pub struct ExecutionReport {
    pub outcomes: Vec<(LedgerKey, EdgeOutcome)>,
    /// Cents committed this run (simulated in dry-run mode).
    pub total_spend: u64,
    /// Estimated fees in cents. Informational.
    pub total_fees: u64,
}

impl ExecutionReport {
    fn count(&self, pred: impl Fn(&EdgeOutcome) -> bool) -> usize {
        self.outcomes.iter().filter(|(_, o)| pred(o)).count()
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, EdgeOutcome::AlreadyTraded))
    }

    pub fn declined(&self) -> usize {
        self.count(|o| matches!(o, EdgeOutcome::Declined { .. }))
    }

    pub fn placed(&self) -> usize {
        self.count(|o| matches!(o, EdgeOutcome::Placed { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, EdgeOutcome::Failed { .. }))
    }

    pub fn budget_exhausted(&self) -> bool {
        matches!(self.outcomes.last(), Some((_, EdgeOutcome::BudgetExhausted)))
    }

    /// Placed orders in execution order.
    pub fn placed_orders(&self) -> impl Iterator<Item = &OrderRequest> {
        self.outcomes.iter().filter_map(|(_, o)| match o {
            EdgeOutcome::Placed { order, .. } => Some(order),
            _ => None,
        })
    }

    pub fn fee_pct(&self) -> f64 {
        fee_pct(self.total_fees, self.total_spend)
    }
}

/// Result of a manual order.
#[derive(Debug, Clone, PartialEq)]
pub enum ManualOutcome {
    Declined,
    DryRun,
    Placed(OrderReceipt),
}

// ---------------------------------------------------------------------------
// Executor
// ---------------------------------------------------------------------------

pub struct Executor<'a> {
    exchange: Option<&'a dyn ExchangeClient>,
    config: ExecutionConfig,
}

impl<'a> Executor<'a> {
    /// `exchange` may be `None` only for dry runs.
    pub fn new(exchange: Option<&'a dyn ExchangeClient>, config: ExecutionConfig) -> Self {
        Self { exchange, config }
    }

    pub fn config(&self) -> &ExecutionConfig {
        &self.config
    }

    fn exchange(&self) -> Result<&'a dyn ExchangeClient> {
        self.exchange
            .ok_or_else(|| anyhow::anyhow!("no exchange client configured for live trading"))
    }

    /// Execute `edges` in the order given (callers pass them ranked).
    ///
    /// Submission failures are recorded and the run continues. A ledger
    /// write failure after a placed order aborts the run: continuing would
    /// risk a duplicate entry next time.
    pub async fn execute(
        &self,
        edges: &[Edge],
        ledger: &mut dyn TradeLedger,
        confirm: &mut dyn Confirm,
    ) -> Result<ExecutionReport> {
        self.config.validate()?;
        let exchange = if self.config.dry_run { None } else { Some(self.exchange()?) };

        let mut traded: HashSet<LedgerKey> = ledger.load_keys().context("Failed to read trade ledger")?;
        let mut report = ExecutionReport::default();

        info!(
            edges = edges.len(),
            already_traded = traded.len(),
            max_spend = self.config.max_spend_cents,
            dry_run = self.config.dry_run,
            "Executing edges"
        );

        for edge in edges {
            let key = edge.ledger_key();

            if traded.contains(&key) {
                debug!(key = %key, "Already traded, skipping");
                report.outcomes.push((key, EdgeOutcome::AlreadyTraded));
                continue;
            }

            let price = edge.exchange_price;
            let requested = self.config.count_per_trade.min(self.config.max_contracts);
            let count = clamp_to_budget(requested, price, report.total_spend, self.config.max_spend_cents);
            if count == 0 {
                info!(
                    key = %key,
                    spent = report.total_spend,
                    max_spend = self.config.max_spend_cents,
                    "Max spend reached, stopping"
                );
                report.outcomes.push((key, EdgeOutcome::BudgetExhausted));
                break;
            }

            let order = OrderRequest {
                ticker: edge.ticker.clone(),
                action: Action::Buy,
                side: edge.side,
                count,
                order_type: self.config.order_type,
                price_cents: price,
            };

            if self.config.needs_confirmation() && !confirm.confirm(&order)? {
                debug!(key = %key, "Declined by operator");
                report.outcomes.push((key, EdgeOutcome::Declined { order }));
                continue;
            }

            let cost = order.cost_cents();
            let fee = estimate_fee(price, count, self.config.fee_schedule);

            let Some(exchange) = exchange else {
                info!(order = %order, cost, fee, edge = %edge.edge, "[DRY RUN] Would place order");
                report.total_spend += cost;
                report.total_fees += fee;
                report.outcomes.push((key, EdgeOutcome::Placed { order, receipt: None }));
                continue;
            };

            match exchange.place_order(&order).await {
                Ok(receipt) => {
                    report.total_spend += cost;
                    report.total_fees += fee;

                    ledger
                        .append(&TradeLedgerEntry::from_order(&order))
                        .with_context(|| format!("Order {} placed but not recorded in the trade ledger", receipt.order_id))?;
                    traded.insert(key.clone());

                    info!(order = %order, order_id = %receipt.order_id, cost, fee, "Order placed");
                    report.outcomes.push((key, EdgeOutcome::Placed { order, receipt: Some(receipt) }));
                }
                Err(e) => {
                    warn!(order = %order, error = %e, "Order submission failed");
                    report.outcomes.push((key, EdgeOutcome::Failed { order, reason: format!("{e:#}") }));
                }
            }
        }

        info!(
            placed = report.placed(),
            skipped = report.skipped(),
            declined = report.declined(),
            failed = report.failed(),
            total_spend = report.total_spend,
            total_fees = report.total_fees,
            "Execution complete"
        );

        Ok(report)
    }

    /// Place one operator-specified order. Guardrails are checked before
    /// anything else; manual orders are not written to the ledger.
    pub async fn manual_trade(&self, order: &OrderRequest, confirm: &mut dyn Confirm) -> Result<ManualOutcome> {
        check_manual_guardrails(order, self.config.max_contracts, self.config.max_spend_cents)?;

        if self.config.needs_confirmation() && !confirm.confirm(order)? {
            return Ok(ManualOutcome::Declined);
        }

        if self.config.dry_run {
            info!(order = %order, "[DRY RUN] Manual order not placed");
            return Ok(ManualOutcome::DryRun);
        }

        let receipt = self.exchange()?.place_order(order).await?;
        info!(order = %order, order_id = %receipt.order_id, "Manual order placed");
        Ok(ManualOutcome::Placed(receipt))
    }
}

/// Largest count not above `requested` whose cost fits the remaining
/// budget. Zero means the budget is exhausted for this price.
fn clamp_to_budget(requested: u32, price_cents: u32, spent: u64, max_spend: u64) -> u32 {
    let cost = u64::from(price_cents) * u64::from(requested);
    if spent + cost <= max_spend {
        return requested;
    }
    if price_cents == 0 {
        return 0;
    }
    let remaining = max_spend.saturating_sub(spent);
    let affordable = remaining / u64::from(price_cents);
    u32::try_from(affordable).unwrap_or(u32::MAX).min(requested)
}

/// Reject a manual order that breaks a cap, before any network call.
pub fn check_manual_guardrails(order: &OrderRequest, max_contracts: u32, max_spend: u64) -> Result<(), PropEdgeError> {
    if !(1..=99).contains(&order.price_cents) {
        return Err(PropEdgeError::InvalidPrice(order.price_cents));
    }
    if order.count > max_contracts {
        return Err(PropEdgeError::ContractLimit {
            count: order.count,
            max: max_contracts,
        });
    }
    let cost = order.cost_cents();
    if cost > max_spend {
        return Err(PropEdgeError::SpendLimit { cost, max: max_spend });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platforms::MockExchangeClient;
    use crate::storage::ledger::MemoryLedger;
    use crate::types::{PropSide, Side, StatCategory};
    use mockall::predicate::*;
    use rust_decimal_macros::dec;
    use std::collections::BTreeMap;

    fn edge(ticker: &str, side: Side, price: u32) -> Edge {
        Edge {
            ticker: ticker.to_string(),
            player: "J. Doe".into(),
            stat: StatCategory::Points,
            threshold: 20,
            choice: if side == Side::Yes { PropSide::Over } else { PropSide::Under },
            side,
            yes_ask: price,
            no_ask: 100 - price,
            implied: BTreeMap::new(),
            avg_implied: f64::from(price) + 10.0,
            exchange_price: price,
            edge: dec!(10.0),
        }
    }

    fn receipt(id: &str) -> OrderReceipt {
        OrderReceipt {
            order_id: id.to_string(),
            status: "resting".into(),
        }
    }

    fn live(count: u32, max_spend: u64) -> ExecutionConfig {
        ExecutionConfig {
            count_per_trade: count,
            max_contracts: 20,
            max_spend_cents: max_spend,
            auto_confirm: true,
            ..ExecutionConfig::default()
        }
    }

    fn always(answer: bool) -> impl FnMut(&OrderRequest) -> bool {
        move |_| answer
    }

    #[tokio::test]
    async fn test_second_run_skips_traded_key() {
        let mut exchange = MockExchangeClient::new();
        exchange.expect_place_order().times(1).returning(|_| Ok(receipt("o-1")));

        let executor = Executor::new(Some(&exchange), live(5, 5000));
        let edges = vec![edge("A", Side::Yes, 40)];
        let mut ledger = MemoryLedger::new();

        let first = executor.execute(&edges, &mut ledger, &mut always(true)).await.unwrap();
        assert_eq!(first.placed(), 1);
        assert_eq!(first.total_spend, 200);
        assert_eq!(ledger.entries().len(), 1);

        let second = executor.execute(&edges, &mut ledger, &mut always(true)).await.unwrap();
        assert_eq!(second.placed(), 0);
        assert_eq!(second.skipped(), 1);
        assert_eq!(ledger.entries().len(), 1);
    }

    #[tokio::test]
    async fn test_same_key_twice_in_one_run_placed_once() {
        let mut exchange = MockExchangeClient::new();
        exchange.expect_place_order().times(1).returning(|_| Ok(receipt("o-1")));

        let config = ExecutionConfig { auto_confirm: false, ..live(5, 5000) };
        let executor = Executor::new(Some(&exchange), config);
        let edges = vec![edge("A", Side::Yes, 40), edge("A", Side::Yes, 40), edge("A", Side::No, 60)];
        let mut ledger = MemoryLedger::new();
        let mut confirm = |o: &OrderRequest| o.side == Side::Yes;

        let report = executor.execute(&edges, &mut ledger, &mut confirm).await.unwrap();
        assert_eq!(report.placed(), 1);
        assert_eq!(report.skipped(), 1);
        assert_eq!(report.declined(), 1);
    }

    #[tokio::test]
    async fn test_budget_clamps_then_stops() {
        let mut exchange = MockExchangeClient::new();
        exchange
            .expect_place_order()
            .with(function(|o: &OrderRequest| o.ticker == "A" && o.count == 10))
            .times(1)
            .returning(|_| Ok(receipt("o-1")));
        exchange
            .expect_place_order()
            .with(function(|o: &OrderRequest| o.ticker == "B" && o.count == 6))
            .times(1)
            .returning(|_| Ok(receipt("o-2")));

        let executor = Executor::new(Some(&exchange), live(10, 1000));
        let edges = vec![
            edge("A", Side::Yes, 60),
            edge("B", Side::Yes, 60),
            edge("C", Side::Yes, 60),
            edge("D", Side::Yes, 5),
        ];
        let mut ledger = MemoryLedger::new();

        let report = executor.execute(&edges, &mut ledger, &mut always(true)).await.unwrap();
        assert_eq!(report.placed(), 2);
        assert_eq!(report.total_spend, 960);
        assert!(report.budget_exhausted());
        // D would fit at 5¢ but the run stops at C.
        assert_eq!(report.outcomes.len(), 3);
        assert_eq!(ledger.entries()[1].count, 6);
    }

    #[tokio::test]
    async fn test_failed_submission_stays_retryable() {
        let mut exchange = MockExchangeClient::new();
        exchange
            .expect_place_order()
            .with(function(|o: &OrderRequest| o.ticker == "A"))
            .returning(|_| Err(PropEdgeError::Exchange("400 insufficient balance".into()).into()));
        exchange
            .expect_place_order()
            .with(function(|o: &OrderRequest| o.ticker == "B"))
            .returning(|_| Ok(receipt("o-2")));

        let executor = Executor::new(Some(&exchange), live(5, 5000));
        let edges = vec![edge("A", Side::Yes, 40), edge("B", Side::No, 30)];
        let mut ledger = MemoryLedger::new();

        let report = executor.execute(&edges, &mut ledger, &mut always(true)).await.unwrap();
        assert_eq!(report.failed(), 1);
        assert_eq!(report.placed(), 1);
        assert_eq!(report.total_spend, 150);

        let keys = ledger.load_keys().unwrap();
        assert!(!keys.contains(&LedgerKey::new("A", Side::Yes)));
        assert!(keys.contains(&LedgerKey::new("B", Side::No)));
    }

    #[tokio::test]
    async fn test_decline_continues_to_next_edge() {
        let mut exchange = MockExchangeClient::new();
        exchange
            .expect_place_order()
            .with(function(|o: &OrderRequest| o.ticker == "B"))
            .times(1)
            .returning(|_| Ok(receipt("o-2")));

        let config = ExecutionConfig { auto_confirm: false, ..live(5, 5000) };
        let executor = Executor::new(Some(&exchange), config);
        let edges = vec![edge("A", Side::Yes, 40), edge("B", Side::Yes, 40)];
        let mut ledger = MemoryLedger::new();
        let mut confirm = |o: &OrderRequest| o.ticker != "A";

        let report = executor.execute(&edges, &mut ledger, &mut confirm).await.unwrap();
        assert_eq!(report.declined(), 1);
        assert_eq!(report.placed(), 1);
        assert_eq!(report.total_spend, 200);
    }

    #[tokio::test]
    async fn test_dry_run_needs_no_exchange_and_writes_nothing() {
        let config = ExecutionConfig { dry_run: true, auto_confirm: false, ..live(10, 1000) };
        let executor = Executor::new(None, config);
        let edges = vec![edge("A", Side::Yes, 60), edge("B", Side::Yes, 60)];
        let mut ledger = MemoryLedger::new();
        let mut never_asked = |_: &OrderRequest| -> bool { panic!("dry run must not prompt") };

        let report = executor.execute(&edges, &mut ledger, &mut never_asked).await.unwrap();
        assert_eq!(report.placed(), 2);
        assert_eq!(report.total_spend, 960);
        assert!(report.total_fees > 0);
        assert!(ledger.entries().is_empty());
    }

    #[tokio::test]
    async fn test_live_run_without_exchange_is_error() {
        let executor = Executor::new(None, live(5, 5000));
        let mut ledger = MemoryLedger::new();
        assert!(executor.execute(&[], &mut ledger, &mut always(true)).await.is_err());
    }

    #[tokio::test]
    async fn test_contract_cap_applies() {
        let mut exchange = MockExchangeClient::new();
        exchange
            .expect_place_order()
            .with(function(|o: &OrderRequest| o.count == 3))
            .times(1)
            .returning(|_| Ok(receipt("o-1")));

        let config = ExecutionConfig { max_contracts: 3, ..live(10, 5000) };
        let executor = Executor::new(Some(&exchange), config);
        let mut ledger = MemoryLedger::new();
        let report = executor
            .execute(&[edge("A", Side::Yes, 40)], &mut ledger, &mut always(true))
            .await
            .unwrap();
        assert_eq!(report.total_spend, 120);
    }

    #[test]
    fn test_order_ticket() {
        let order = OrderRequest {
            ticker: "KXNBAPTS-X".into(),
            action: Action::Buy,
            side: Side::Yes,
            count: 10,
            order_type: OrderType::Limit,
            price_cents: 60,
        };
        let ticket = order_ticket(&order, FeeSchedule::Taker);
        assert!(ticket.contains("Est cost: 600¢ ($6.00)"));
        assert!(ticket.contains("Est fee:  1¢ ($0.01) [0.2% of cost, taker]"));
    }

    #[test]
    fn test_clamp_to_budget() {
        assert_eq!(clamp_to_budget(10, 60, 0, 1000), 10);
        assert_eq!(clamp_to_budget(10, 60, 600, 1000), 6);
        assert_eq!(clamp_to_budget(10, 60, 960, 1000), 0);
        assert_eq!(clamp_to_budget(10, 60, 1000, 1000), 0);
        assert_eq!(clamp_to_budget(5, 40, 800, 1000), 5);
    }

    #[test]
    fn test_manual_guardrails() {
        let mut order = OrderRequest {
            ticker: "T".into(),
            action: Action::Buy,
            side: Side::Yes,
            count: 10,
            order_type: OrderType::Limit,
            price_cents: 60,
        };
        assert!(check_manual_guardrails(&order, 20, 600).is_ok());
        assert!(matches!(
            check_manual_guardrails(&order, 5, 5000),
            Err(PropEdgeError::ContractLimit { count: 10, max: 5 })
        ));
        assert!(matches!(
            check_manual_guardrails(&order, 20, 599),
            Err(PropEdgeError::SpendLimit { cost: 600, max: 599 })
        ));

        order.action = Action::Sell;
        assert!(check_manual_guardrails(&order, 20, 400).is_ok());

        order.price_cents = 100;
        assert!(matches!(
            check_manual_guardrails(&order, 20, 5000),
            Err(PropEdgeError::InvalidPrice(100))
        ));
    }

    #[tokio::test]
    async fn test_manual_violation_rejected_before_network() {
        let mut exchange = MockExchangeClient::new();
        exchange.expect_place_order().never();

        let executor = Executor::new(Some(&exchange), live(5, 100));
        let order = OrderRequest {
            ticker: "T".into(),
            action: Action::Buy,
            side: Side::No,
            count: 5,
            order_type: OrderType::Market,
            price_cents: 50,
        };
        let err = executor.manual_trade(&order, &mut always(true)).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PropEdgeError>(),
            Some(PropEdgeError::SpendLimit { cost: 250, max: 100 })
        ));
    }

    #[tokio::test]
    async fn test_manual_trade_placed() {
        let mut exchange = MockExchangeClient::new();
        exchange
            .expect_place_order()
            .with(eq(OrderRequest {
                ticker: "T".into(),
                action: Action::Sell,
                side: Side::Yes,
                count: 2,
                order_type: OrderType::Limit,
                price_cents: 70,
            }))
            .times(1)
            .returning(|_| Ok(receipt("m-1")));

        let executor = Executor::new(Some(&exchange), live(5, 100));
        let order = OrderRequest {
            ticker: "T".into(),
            action: Action::Sell,
            side: Side::Yes,
            count: 2,
            order_type: OrderType::Limit,
            price_cents: 70,
        };
        let outcome = executor.manual_trade(&order, &mut always(true)).await.unwrap();
        assert_eq!(outcome, ManualOutcome::Placed(receipt("m-1")));
    }
}
