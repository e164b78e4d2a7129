//! Exchange fee estimate.
//!
//! `fee = ceil(coeff × count × P × (1 − P))` with `P = price / 100`.
//! Display only: nothing in the guardrails reads it.

use rust_decimal::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;

/// Which side of the book the fill is expected on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeeSchedule {
    #[default]
    Taker,
    Maker,
}

impl FeeSchedule {
    pub fn coefficient(&self) -> Decimal {
        match self {
            FeeSchedule::Taker => dec!(0.07),
            FeeSchedule::Maker => dec!(0.0175),
        }
    }
}

impl std::fmt::Display for FeeSchedule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FeeSchedule::Taker => write!(f, "taker"),
            FeeSchedule::Maker => write!(f, "maker"),
        }
    }
}

/// Estimated fee in cents for `count` contracts at `price_cents`.
pub fn estimate_fee(price_cents: u32, count: u32, schedule: FeeSchedule) -> u64 {
    let p = Decimal::from(price_cents) / dec!(100);
    let raw = schedule.coefficient() * Decimal::from(count) * p * (Decimal::ONE - p);
    raw.ceil().to_u64().unwrap_or(0)
}

/// Fee as a percentage of cost, for display.
pub fn fee_pct(fee: u64, cost: u64) -> f64 {
    if cost == 0 {
        0.0
    } else {
        fee as f64 / cost as f64 * 100.0
    }
}
