//! Card data checks performed before anything is forwarded to the gateway.

use chrono::Datelike;
use serde::Deserialize;

use crate::error::{AppError, Result};

/// Card fields as submitted by the checkout form.
#[derive(Clone, Deserialize)]
pub struct CardData {
    pub number: String,
    pub holder_name: String,
    pub exp_month: String,
    pub exp_year: String,
    pub cvv: String,
}

/// Card data that passed validation, normalized for the gateway payload.
#[derive(Clone, PartialEq, Eq)]
pub struct ValidatedCard {
    pub number: String,
    pub holder_name: String,
    pub exp_month: u32,
    pub exp_year: i32,
    pub cvv: String,
}

fn last_four(number: &str) -> &str {
    let start = number.len().saturating_sub(4);
    number.get(start..).unwrap_or("")
}

// Card numbers and CVVs must never reach the logs.
impl std::fmt::Debug for CardData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CardData")
            .field("last4", &last_four(self.number.trim()))
            .field("exp_month", &self.exp_month)
            .field("exp_year", &self.exp_year)
            .finish_non_exhaustive()
    }
}

impl std::fmt::Debug for ValidatedCard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValidatedCard")
            .field("last4", &last_four(&self.number))
            .field("exp_month", &self.exp_month)
            .field("exp_year", &self.exp_year)
            .finish_non_exhaustive()
    }
}

/// Luhn checksum over an all-digit string.
pub fn luhn_valid(digits: &str) -> bool {
    let mut sum = 0u32;
    for (i, c) in digits.chars().rev().enumerate() {
        let Some(mut d) = c.to_digit(10) else {
            return false;
        };
        if i % 2 == 1 {
            d *= 2;
            if d > 9 {
                d -= 9;
            }
        }
        sum += d;
    }
    sum % 10 == 0
}

fn invalid(field: &str) -> AppError {
    AppError::Validation(format!("card_data.{} is invalid", field))
}

impl CardData {
    /// Validate against `today` (passed in so expiry checks are testable).
    pub fn validate(&self, today: chrono::NaiveDate) -> Result<ValidatedCard> {
        let number: String = self
            .number
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '-')
            .collect();
        if !(13..=19).contains(&number.len())
            || !number.chars().all(|c| c.is_ascii_digit())
            || !luhn_valid(&number)
        {
            return Err(invalid("number"));
        }

        let holder_name = self.holder_name.trim();
        if holder_name.is_empty() {
            return Err(invalid("holder_name"));
        }

        let exp_month: u32 = self
            .exp_month
            .trim()
            .parse()
            .ok()
            .filter(|m| (1..=12).contains(m))
            .ok_or_else(|| invalid("exp_month"))?;

        let year_text = self.exp_year.trim();
        let exp_year: i32 = match (year_text.len(), year_text.parse::<i32>()) {
            (2, Ok(y)) => 2000 + y,
            (4, Ok(y)) => y,
            _ => return Err(invalid("exp_year")),
        };

        // Cards stay valid through the last day of their expiry month.
        if (exp_year, exp_month) < (today.year(), today.month()) {
            return Err(AppError::Validation("card is expired".into()));
        }

        let cvv = self.cvv.trim();
        if !(3..=4).contains(&cvv.len()) || !cvv.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid("cvv"));
        }

        Ok(ValidatedCard {
            number,
            holder_name: holder_name.to_string(),
            exp_month,
            exp_year,
            cvv: cvv.to_string(),
        })
    }
}
