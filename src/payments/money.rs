//! Conversion between donor-entered amounts and gateway minor units.
//!
//! Amounts are parsed as exact decimals from their textual form, so a JSON
//! number like `10.005` is read as written rather than as the nearest binary
//! float. Conversion to centavos rounds half away from zero: `10.005 -> 1001`,
//! `10.004 -> 1000`.

use std::str::FromStr;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

use crate::error::{AppError, Result};

/// Upper bound on a single donation (R$ 1.000.000,00).
pub const MAX_AMOUNT_CENTS: i64 = 100_000_000;

fn parse_decimal(text: &str) -> Option<Decimal> {
    let text = text.trim();
    Decimal::from_str(text)
        .or_else(|_| Decimal::from_scientific(text))
        .ok()
}

/// Parse a JSON amount (number or numeric string) into centavos.
pub fn parse_amount_cents(value: &serde_json::Value) -> Result<i64> {
    let decimal = match value {
        serde_json::Value::Number(n) => parse_decimal(&n.to_string()),
        serde_json::Value::String(s) => parse_decimal(s),
        serde_json::Value::Null => {
            return Err(AppError::InvalidAmount("amount is required".into()));
        }
        _ => None,
    }
    .ok_or_else(|| AppError::InvalidAmount("amount must be a number".into()))?;

    decimal_to_cents(decimal)
}

/// Convert a decimal amount into centavos, rejecting non-positive and
/// out-of-range values.
pub fn decimal_to_cents(amount: Decimal) -> Result<i64> {
    if amount <= Decimal::ZERO {
        return Err(AppError::InvalidAmount("amount must be greater than zero".into()));
    }

    let cents = (amount * Decimal::ONE_HUNDRED)
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
        .ok_or_else(|| AppError::InvalidAmount("amount is too large".into()))?;

    if cents <= 0 {
        return Err(AppError::InvalidAmount("amount rounds to zero".into()));
    }
    if cents > MAX_AMOUNT_CENTS {
        return Err(AppError::InvalidAmount("amount exceeds the maximum donation".into()));
    }

    Ok(cents)
}

/// Render centavos as a two-decimal string, e.g. `1000 -> "10.00"`.
pub fn format_cents(cents: i64) -> String {
    Decimal::new(cents, 2).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_whole_and_fractional_amounts() {
        assert_eq!(parse_amount_cents(&json!(50)).unwrap(), 5000);
        assert_eq!(parse_amount_cents(&json!(10.00)).unwrap(), 1000);
        assert_eq!(parse_amount_cents(&json!(19.99)).unwrap(), 1999);
        assert_eq!(parse_amount_cents(&json!("25.5")).unwrap(), 2550);
    }

    #[test]
    fn test_float_artifacts_do_not_drift() {
        // 0.1 + 0.2 style values must not lose a centavo
        assert_eq!(parse_amount_cents(&json!(0.29)).unwrap(), 29);
        assert_eq!(parse_amount_cents(&json!(1.15)).unwrap(), 115);
        assert_eq!(parse_amount_cents(&json!(4.35)).unwrap(), 435);
    }

    #[test]
    fn test_half_cent_rounds_away_from_zero() {
        assert_eq!(parse_amount_cents(&json!(10.005)).unwrap(), 1001);
        assert_eq!(parse_amount_cents(&json!("10.005")).unwrap(), 1001);
        assert_eq!(parse_amount_cents(&json!(10.004)).unwrap(), 1000);
        assert_eq!(parse_amount_cents(&json!("10.0049")).unwrap(), 1000);
    }

    #[test]
    fn test_invalid_amounts() {
        for bad in [json!(0), json!(-5), json!("abc"), json!(""), json!(null), json!(true), json!("0.004")] {
            assert!(
                matches!(parse_amount_cents(&bad), Err(AppError::InvalidAmount(_))),
                "{} should be rejected",
                bad
            );
        }
    }

    #[test]
    fn test_maximum() {
        assert_eq!(parse_amount_cents(&json!(1_000_000)).unwrap(), MAX_AMOUNT_CENTS);
        assert!(parse_amount_cents(&json!(1_000_000.01)).is_err());
        assert!(parse_amount_cents(&json!("1e30")).is_err());
    }

    #[test]
    fn test_format_cents() {
        assert_eq!(format_cents(1000), "10.00");
        assert_eq!(format_cents(5), "0.05");
        assert_eq!(format_cents(123456), "1234.56");
    }
}
