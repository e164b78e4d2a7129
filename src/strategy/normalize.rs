//! Probability normalisation.
//!
//! Converts each source's native odds encoding into an implied probability
//! and removes the bookmaker margin from an Over/Under pair so the two sides
//! sum to 100 (cents scale).

use crate::types::{PropEdgeError, PropSide, Quote};

/// Convert American odds to decimal odds.
///
/// `+150` → 2.5, `-150` → 1.667. Values strictly between -100 and 100 are
/// not valid American odds.
pub fn decimal_from_american(american: f64) -> Result<f64, PropEdgeError> {
    if american >= 100.0 {
        Ok(1.0 + american / 100.0)
    } else if american <= -100.0 {
        Ok(1.0 + 100.0 / american.abs())
    } else {
        Err(PropEdgeError::InvalidAmericanOdds(american))
    }
}

/// Raw (vig-inclusive) implied probability of a quote, 0.0–1.0.
///
/// `None` for non-positive, non-finite, or out-of-range quotes.
pub fn raw_probability(quote: &Quote) -> Option<f64> {
    match *quote {
        Quote::AskCents(cents) if (1..=99).contains(&cents) => Some(f64::from(cents) / 100.0),
        Quote::AskCents(_) => None,
        Quote::DecimalOdds(odds) if odds.is_finite() && odds > 0.0 => Some(1.0 / odds),
        Quote::DecimalOdds(_) => None,
        Quote::PayoutMultiplier(m) if m.is_finite() && m > 0.0 => Some(1.0 / (1.0 + m)),
        Quote::PayoutMultiplier(_) => None,
    }
}

/// Vig-free probabilities for both sides of one market, in cents (0–100).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VigFree {
    pub over: f64,
    pub under: f64,
}

impl VigFree {
    pub fn for_side(&self, side: PropSide) -> f64 {
        match side {
            PropSide::Over => self.over,
            PropSide::Under => self.under,
        }
    }
}

/// Remove the overround from an Over/Under pair.
///
/// Returns `None` when either leg is missing or unusable; that market simply
/// can't be priced and is not an error.
pub fn vig_free(over: Option<&Quote>, under: Option<&Quote>) -> Option<VigFree> {
    let raw_over = raw_probability(over?)?;
    let raw_under = raw_probability(under?)?;
    let overround = raw_over + raw_under;
    if overround <= 0.0 {
        return None;
    }

    Some(VigFree {
        over: raw_over / overround * 100.0,
        under: raw_under / overround * 100.0,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    #[test]
    fn test_decimal_from_american_matches_odds_table() {
        // (american, decimal, raw implied probability)
        let table = [
            (150.0, 2.5, 0.4),
            (-150.0, 1.0 + 100.0 / 150.0, 0.6),
            (200.0, 3.0, 1.0 / 3.0),
            (-120.0, 1.0 + 100.0 / 120.0, 120.0 / 220.0),
        ];
        for (american, decimal, implied) in table {
            let got = decimal_from_american(american).unwrap();
            assert!((got - decimal).abs() < EPS, "{american}: {got} != {decimal}");
            assert!((1.0 / got - implied).abs() < EPS, "{american}: 1/{got} != {implied}");
        }
    }

    #[test]
    fn test_decimal_from_american_boundaries() {
        assert_eq!(decimal_from_american(100.0).unwrap(), 2.0);
        assert_eq!(decimal_from_american(-100.0).unwrap(), 2.0);
        assert!(matches!(
            decimal_from_american(99.0),
            Err(PropEdgeError::InvalidAmericanOdds(_))
        ));
        assert!(decimal_from_american(-50.0).is_err());
        assert!(decimal_from_american(0.0).is_err());
    }

    #[test]
    fn test_raw_probability_encodings() {
        assert_eq!(raw_probability(&Quote::AskCents(40)), Some(0.4));
        assert_eq!(raw_probability(&Quote::DecimalOdds(2.0)), Some(0.5));
        assert_eq!(raw_probability(&Quote::PayoutMultiplier(1.0)), Some(0.5));
        assert_eq!(raw_probability(&Quote::AskCents(0)), None);
        assert_eq!(raw_probability(&Quote::AskCents(100)), None);
        assert_eq!(raw_probability(&Quote::DecimalOdds(0.0)), None);
        assert_eq!(raw_probability(&Quote::DecimalOdds(-1.5)), None);
        assert_eq!(raw_probability(&Quote::DecimalOdds(f64::NAN)), None);
        assert_eq!(raw_probability(&Quote::PayoutMultiplier(0.0)), None);
    }

    #[test]
    fn test_vig_free_sums_to_100() {
        let pairs = [
            (Quote::DecimalOdds(1.91), Quote::DecimalOdds(1.91)),
            (Quote::DecimalOdds(2.0), Quote::DecimalOdds(2.2)),
            (Quote::DecimalOdds(1.3), Quote::DecimalOdds(3.4)),
            (Quote::PayoutMultiplier(0.87), Quote::PayoutMultiplier(0.95)),
            (Quote::DecimalOdds(1.05), Quote::DecimalOdds(11.0)),
        ];
        for (over, under) in pairs {
            let p = vig_free(Some(&over), Some(&under)).unwrap();
            assert!((p.over + p.under - 100.0).abs() < 0.01, "{over:?}/{under:?}");
        }
    }

    #[test]
    fn test_vig_free_known_values() {
        let p = vig_free(Some(&Quote::DecimalOdds(2.0)), Some(&Quote::DecimalOdds(2.2))).unwrap();
        assert!((p.over - 52.38).abs() < 0.01);
        assert!((p.under - 47.62).abs() < 0.01);
        assert_eq!(p.for_side(PropSide::Over), p.over);
        assert_eq!(p.for_side(PropSide::Under), p.under);
    }

    #[test]
    fn test_vig_free_missing_leg() {
        assert!(vig_free(Some(&Quote::DecimalOdds(2.0)), None).is_none());
        assert!(vig_free(None, Some(&Quote::DecimalOdds(2.0))).is_none());
        assert!(vig_free(Some(&Quote::DecimalOdds(2.0)), Some(&Quote::DecimalOdds(0.0))).is_none());
    }
}
