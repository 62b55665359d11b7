//! Decimal money arithmetic for order totals.
//!
//! Prices travel as [`Decimal`] end to end; nothing in the order path goes
//! through floating point. Totals are rounded once, after summation, to the
//! currency's minor unit.

use rust_decimal::{Decimal, RoundingStrategy};

/// Number of fractional digits kept on stored amounts.
pub const CURRENCY_SCALE: u32 = 2;

/// Round an amount to [`CURRENCY_SCALE`] places, halves away from zero.
#[must_use]
pub fn round_currency(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(CURRENCY_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

/// `price × quantity` without intermediate rounding.
#[must_use]
pub fn line_total(price: Decimal, quantity: u32) -> Decimal {
    price * Decimal::from(quantity)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_total_is_exact() {
        let price = Decimal::new(1999, 2); // 19.99
        assert_eq!(line_total(price, 3), Decimal::new(5997, 2));
    }

    #[test]
    fn test_round_currency_midpoint() {
        assert_eq!(round_currency(Decimal::new(10005, 3)), Decimal::new(1001, 2));
        assert_eq!(round_currency(Decimal::new(-10005, 3)), Decimal::new(-1001, 2));
        assert_eq!(round_currency(Decimal::new(10004, 3)), Decimal::new(1000, 2));
    }

    #[test]
    fn test_sum_then_round() {
        let total: Decimal = [
            line_total(Decimal::new(3333, 3), 1),
            line_total(Decimal::new(3333, 3), 2),
        ]
        .into_iter()
        .sum();
        assert_eq!(round_currency(total), Decimal::new(1000, 2));
    }
}
