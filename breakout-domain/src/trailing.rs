//! Trailing Stop Logic (Pure Functions)
//!
//! Percent-based trailing stop for long positions. All functions are
//! deterministic and have no side effects.
//!
//! # Trailing Stop Algorithm
//!
//! ```text
//! stop     = peak × (1 - S / 100)
//! drawdown = (peak - price) / peak × 100
//! exit when drawdown >= S
//! ```
//!
//! Key invariants:
//! - The peak is monotonic (it only rises)
//! - The stop is derived from the peak, so it is monotonic too
//! - The stop is always at or below the peak

use rust_decimal::Decimal;

use crate::value_objects::Price;

/// Result of a trailing stop update
///
/// Returned only when price made a new high.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrailingStopUpdate {
    /// New highest price
    pub new_peak: Price,
    /// Stop derived from the new peak
    pub new_stop: Price,
}

/// Stop price for a given peak.
///
/// `trailing_stop_pct` must lie in `(0, 100)`; validated strategy
/// parameters guarantee this.
///
/// # Examples
///
/// ```
/// # use breakout_domain::trailing::trailing_stop_price;
/// # use breakout_domain::Price;
/// # use rust_decimal_macros::dec;
/// let stop = trailing_stop_price(Price::new(dec!(110)).unwrap(), dec!(3));
/// assert_eq!(stop.as_decimal(), dec!(106.7));
/// ```
pub fn trailing_stop_price(peak: Price, trailing_stop_pct: Decimal) -> Price {
    let factor = Decimal::ONE - trailing_stop_pct / Decimal::ONE_HUNDRED;
    Price::from_positive(peak.as_decimal() * factor)
}

/// Advance the peak if `current_price` is a new high.
///
/// # Returns
///
/// * `Some(TrailingStopUpdate)` - price made a new high, peak and stop move up
/// * `None` - price did not exceed the peak, nothing changes
pub fn update_trailing_stop(
    current_price: Price,
    peak: Price,
    trailing_stop_pct: Decimal,
) -> Option<TrailingStopUpdate> {
    if current_price <= peak {
        return None;
    }
    Some(TrailingStopUpdate {
        new_peak: current_price,
        new_stop: trailing_stop_price(current_price, trailing_stop_pct),
    })
}

/// Percent drop of `current_price` below `peak`.
///
/// Negative when the price is above the peak. `None` if the result is not
/// representable.
pub fn drawdown_pct(peak: Price, current_price: Price) -> Option<Decimal> {
    pct_change(peak, current_price).map(|change| -change)
}

/// Percent rise of `current_price` above `reference`.
///
/// `None` if the result is not representable.
pub fn rise_pct(reference: Price, current_price: Price) -> Option<Decimal> {
    pct_change(reference, current_price)
}

/// `(to - from) / from × 100`
fn pct_change(from: Price, to: Price) -> Option<Decimal> {
    to.as_decimal()
        .checked_sub(from.as_decimal())?
        .checked_div(from.as_decimal())?
        .checked_mul(Decimal::ONE_HUNDRED)
}

/// Check whether the trailing stop has been hit.
///
/// A drawdown exactly equal to the threshold counts as hit.
pub fn is_trailing_stop_hit(peak: Price, current_price: Price, trailing_stop_pct: Decimal) -> bool {
    drawdown_pct(peak, current_price).is_some_and(|drawdown| drawdown >= trailing_stop_pct)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn p(value: Decimal) -> Price {
        Price::new(value).unwrap()
    }

    #[test]
    fn test_stop_price_from_peak() {
        assert_eq!(trailing_stop_price(p(dec!(100)), dec!(3)).as_decimal(), dec!(97));
        assert_eq!(trailing_stop_price(p(dec!(50000)), dec!(2.5)).as_decimal(), dec!(48750));
    }

    #[test]
    fn test_update_on_new_high() {
        let update = update_trailing_stop(p(dec!(110)), p(dec!(100)), dec!(3)).unwrap();
        assert_eq!(update.new_peak.as_decimal(), dec!(110));
        assert_eq!(update.new_stop.as_decimal(), dec!(106.7));
    }

    #[test]
    fn test_no_update_below_or_at_peak() {
        assert!(update_trailing_stop(p(dec!(105)), p(dec!(110)), dec!(3)).is_none());
        assert!(update_trailing_stop(p(dec!(110)), p(dec!(110)), dec!(3)).is_none());
    }

    #[test]
    fn test_stop_never_moves_down_over_sequence() {
        let prices = [dec!(100), dec!(104), dec!(101), dec!(108), dec!(103), dec!(108)];
        let mut peak = p(dec!(100));
        let mut stop = trailing_stop_price(peak, dec!(3));

        for price in prices {
            if let Some(update) = update_trailing_stop(p(price), peak, dec!(3)) {
                assert!(update.new_stop >= stop);
                peak = update.new_peak;
                stop = update.new_stop;
            }
            assert!(stop <= peak);
        }

        assert_eq!(peak.as_decimal(), dec!(108));
        assert_eq!(stop.as_decimal(), dec!(104.76));
    }

    #[test]
    fn test_drawdown_and_hit() {
        // 110 -> 106.5 is a 3.18% drawdown
        assert!(drawdown_pct(p(dec!(110)), p(dec!(106.5))).unwrap() > dec!(3.18));
        assert!(is_trailing_stop_hit(p(dec!(110)), p(dec!(106.5)), dec!(3)));
        assert!(!is_trailing_stop_hit(p(dec!(110)), p(dec!(107)), dec!(3)));
    }

    #[test]
    fn test_hit_at_exact_threshold() {
        assert!(is_trailing_stop_hit(p(dec!(100)), p(dec!(97)), dec!(3)));
    }

    #[test]
    fn test_rise_pct() {
        assert_eq!(rise_pct(p(dec!(100)), p(dec!(103))), Some(dec!(3)));
        assert!(rise_pct(p(dec!(103)), p(dec!(103.5))).unwrap() < dec!(2));
    }

    #[test]
    fn test_rise_pct_out_of_range_is_none() {
        assert_eq!(rise_pct(p(dec!(0.0001)), p(Decimal::MAX / dec!(2))), None);
    }
}
