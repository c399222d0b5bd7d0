use rust_decimal::{Decimal, RoundingStrategy};

/// Monetary amounts are exact decimals with two observable fraction digits.
pub type Money = Decimal;

pub const MONEY_SCALE: u32 = 2;

/// Rounds to cents, half-up for the non-negative values the games produce.
pub fn round_money(value: Decimal) -> Money {
    value.round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

/// `round(a * b, 2)`
pub fn mul_money(a: Decimal, b: Decimal) -> Money {
    round_money(a * b)
}

/// `round(a * b, 2)`, or `None` when the product does not fit a `Decimal`.
pub fn checked_mul_money(a: Decimal, b: Decimal) -> Option<Money> {
    a.checked_mul(b).map(round_money)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_rounds_half_up() {
        assert_eq!(round_money(dec!(1.005)), dec!(1.01));
        assert_eq!(round_money(dec!(1.004)), dec!(1.00));
        assert_eq!(round_money(dec!(0.125)), dec!(0.13));
    }

    #[test]
    fn test_mul_money_rounds_product() {
        assert_eq!(mul_money(dec!(0.335), dec!(3)), dec!(1.01));
        assert_eq!(mul_money(dec!(2.00), dec!(0.1)), dec!(0.20));
        assert_eq!(mul_money(dec!(10), dec!(5.5)), dec!(55));
    }

    #[test]
    fn test_checked_mul_money_reports_overflow() {
        assert_eq!(checked_mul_money(dec!(0.335), dec!(3)), Some(dec!(1.01)));
        assert_eq!(checked_mul_money(Decimal::MAX, dec!(2)), None);
    }
}
