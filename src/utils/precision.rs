// src/utils/precision.rs
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::{Decimal, RoundingStrategy};

/// Rounds a bid to the NEAREST multiple of tick (half away from zero).
/// Example: bid=1.675, tick=0.01 -> 1.68
pub fn normalize_bid(bid: Decimal, tick: Decimal) -> Decimal {
    to_tick(bid, tick, RoundingStrategy::MidpointAwayFromZero)
}

/// Rounds DOWN to a multiple of tick. Used for upper bounds so rounding never
/// pushes a bid past its cap.
pub fn normalize_bid_down(bid: Decimal, tick: Decimal) -> Decimal {
    to_tick(bid, tick, RoundingStrategy::ToNegativeInfinity)
}

/// Rounds UP to a multiple of tick. Used for lower bounds.
pub fn normalize_bid_up(bid: Decimal, tick: Decimal) -> Decimal {
    to_tick(bid, tick, RoundingStrategy::ToPositiveInfinity)
}

fn to_tick(value: Decimal, tick: Decimal, strategy: RoundingStrategy) -> Decimal {
    if tick.is_zero() {
        return value;
    }
    // (value / tick).round() * tick
    (value / tick).round_dp_with_strategy(0, strategy) * tick
}

/// Converts a model output to a bid; non-finite values collapse to zero.
pub fn bid_from_f64(value: f64) -> Decimal {
    if !value.is_finite() {
        return Decimal::ZERO;
    }
    Decimal::from_f64(value).unwrap_or(Decimal::ZERO)
}

pub fn bid_to_f64(bid: Decimal) -> f64 {
    bid.to_f64().unwrap_or(0.0)
}

/// Inclusive window `[current*(1-pct), current*(1+pct)]`, rounded inward to
/// whole ticks.
pub fn change_window(current: Decimal, max_change_pct: f64, tick: Decimal) -> (Decimal, Decimal) {
    // f64 noise like 0.19999999 must not move a floor/ceil by a whole tick
    let pct = bid_from_f64(max_change_pct).round_dp(6);
    let lower = normalize_bid_up(current * (Decimal::ONE - pct), tick);
    let upper = normalize_bid_down(current * (Decimal::ONE + pct), tick);
    (lower, upper.max(lower))
}

/// Division that yields 0 instead of NaN/inf.
pub fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator > 0.0 {
        numerator / denominator
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn rounds_half_away_from_zero() {
        assert_eq!(normalize_bid(dec("1.675"), dec("0.01")), dec("1.68"));
        assert_eq!(normalize_bid(dec("1.674"), dec("0.01")), dec("1.67"));
    }

    #[test]
    fn change_window_rounds_inward() {
        // 0.35 * 1.25 = 0.4375 would round to 0.44 and break the 25% cap
        let (lower, upper) = change_window(dec("0.35"), 0.25, dec("0.01"));
        assert_eq!(upper, dec("0.43"));
        assert_eq!(lower, dec("0.27"));
    }

    #[test]
    fn zero_tick_is_identity() {
        assert_eq!(normalize_bid(dec("1.2345"), Decimal::ZERO), dec("1.2345"));
    }

    #[test]
    fn ratio_handles_zero_denominator() {
        assert_eq!(ratio(5.0, 0.0), 0.0);
        assert_eq!(ratio(5.0, 2.0), 2.5);
    }
}
