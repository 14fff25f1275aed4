//! Fixed-precision decimal helpers.
//!
//! Monetary values are carried at 2 fractional digits, quantities at 3, and
//! base-currency costs at 6, all rounded half-up. Quantity comparisons against
//! remaining balances allow a small slack so that repeated conversions between
//! order and base units never reject a legitimate final invoice or return.

use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;

/// Maximum slack when checking a quantity against a remaining balance.
pub const QTY_EPSILON: Decimal = dec!(0.0005);

pub const MONEY_DP: u32 = 2;
pub const QTY_DP: u32 = 3;
pub const COST_DP: u32 = 6;

/// Rounds a monetary amount to 2 fractional digits, half-up.
pub fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(MONEY_DP, RoundingStrategy::MidpointAwayFromZero)
}

/// Rounds a quantity to 3 fractional digits, half-up.
pub fn round_quantity(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(QTY_DP, RoundingStrategy::MidpointAwayFromZero)
}

/// Rounds a base-currency cost to 6 fractional digits, half-up.
pub fn round_cost(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(COST_DP, RoundingStrategy::MidpointAwayFromZero)
}

/// True when `requested` exceeds `available` by more than [`QTY_EPSILON`].
pub fn exceeds_available(requested: Decimal, available: Decimal) -> bool {
    requested - available > QTY_EPSILON
}

/// Remaining balance floored at zero. Cumulative counters can overshoot by a
/// rounding hair; a negative remainder must never propagate into checks.
pub fn remaining(total: Decimal, consumed: Decimal) -> Decimal {
    (total - consumed).max(Decimal::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn money_rounds_half_up() {
        assert_eq!(round_money(dec!(1.005)), dec!(1.01));
        assert_eq!(round_money(dec!(1.004)), dec!(1.00));
        assert_eq!(round_money(dec!(-1.005)), dec!(-1.01));
    }

    #[test]
    fn quantity_and_cost_precision() {
        assert_eq!(round_quantity(dec!(0.12345)), dec!(0.123));
        assert_eq!(round_quantity(dec!(0.1235)), dec!(0.124));
        assert_eq!(round_cost(dec!(10.0000005)), dec!(10.000001));
    }

    #[test]
    fn epsilon_tolerates_rounding_slack() {
        assert!(!exceeds_available(dec!(10.0004), dec!(10)));
        assert!(exceeds_available(dec!(10.001), dec!(10)));
        assert!(!exceeds_available(dec!(9.5), dec!(10)));
    }

    #[test]
    fn remaining_never_negative() {
        assert_eq!(remaining(dec!(10), dec!(12)), Decimal::ZERO);
        assert_eq!(remaining(dec!(10), dec!(4)), dec!(6));
    }

    proptest! {
        #[test]
        fn rounded_money_has_at_most_two_dp(units in -1_000_000_000i64..1_000_000_000) {
            let value = Decimal::new(units, 4);
            let rounded = round_money(value);
            prop_assert!(rounded.scale() <= MONEY_DP);
            // Never moves by more than half a cent.
            prop_assert!((rounded - value).abs() <= dec!(0.005));
        }

        #[test]
        fn rounded_quantity_has_at_most_three_dp(units in -1_000_000_000i64..1_000_000_000) {
            let value = Decimal::new(units, 5);
            prop_assert!(round_quantity(value).scale() <= QTY_DP);
        }
    }
}
