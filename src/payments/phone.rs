//! Brazilian phone number decomposition for the gateway's customer payload.

use phonenumber::country;
use serde::Serialize;

use crate::error::{AppError, Result};

const BRAZIL_COUNTRY_CODE: u16 = 55;

/// A phone number split the way Pagar.me expects it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PhoneNumber {
    pub country_code: String,
    pub area_code: String,
    pub number: String,
}

/// Parse a donor-entered Brazilian phone number.
///
/// Any punctuation and an optional `+55` are accepted. The number must be
/// valid under the Brazilian numbering plan; its national part is split
/// into the two-digit area code and the subscriber number.
pub fn parse_phone(input: &str) -> Result<PhoneNumber> {
    let invalid = || AppError::Validation("donor_phone is not a valid Brazilian phone number".into());

    let parsed = phonenumber::parse(Some(country::Id::BR), input).map_err(|_| invalid())?;
    if !phonenumber::is_valid(&parsed) || parsed.code().value() != BRAZIL_COUNTRY_CODE {
        return Err(invalid());
    }

    let national = parsed.national().value().to_string();
    if !(10..=11).contains(&national.len()) {
        return Err(invalid());
    }
    let (area_code, number) = national.split_at(2);

    Ok(PhoneNumber {
        country_code: BRAZIL_COUNTRY_CODE.to_string(),
        area_code: area_code.to_string(),
        number: number.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_formats() {
        for input in ["11987654321", "(11) 98765-4321", "+55 11 98765-4321", "+5511987654321"] {
            let p = parse_phone(input).unwrap();
            assert_eq!(p.country_code, "55");
            assert_eq!(p.area_code, "11");
            assert_eq!(p.number, "987654321", "input {}", input);
        }
    }

    #[test]
    fn test_landline() {
        let p = parse_phone("(21) 3456-7890").unwrap();
        assert_eq!(p.area_code, "21");
        assert_eq!(p.number, "34567890");
    }

    #[test]
    fn test_leading_trunk_zero() {
        let p = parse_phone("021 3456 7890").unwrap();
        assert_eq!(p.area_code, "21");
        assert_eq!(p.number, "34567890");
    }

    #[test]
    fn test_unassigned_area_code() {
        assert!(parse_phone("(20) 3456-7890").is_err());
        assert!(parse_phone("(23) 98765-4321").is_err());
    }

    #[test]
    fn test_foreign_number_is_rejected() {
        assert!(parse_phone("+1 415 555 0100").is_err());
    }

    #[test]
    fn test_rejects_garbage() {
        for input in ["", "123", "abc", "11887654321", "+55 11 1234"] {
            assert!(parse_phone(input).is_err(), "{} should be rejected", input);
        }
    }
}
