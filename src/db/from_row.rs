//! Row mapping trait and helpers for reducing boilerplate in queries.

use rusqlite::{Connection, OptionalExtension, Row, ToSql};

use crate::models::*;

/// Parse a string column into an enum type, converting parse errors to rusqlite errors.
///
/// Invalid values (corruption, bad migrations) surface as errors instead of panics.
fn parse_enum<T: std::str::FromStr>(row: &Row, col: usize, col_name: &str) -> rusqlite::Result<T> {
    row.get::<_, String>(col)?.parse::<T>().map_err(|_| {
        rusqlite::Error::InvalidColumnType(col, col_name.to_string(), rusqlite::types::Type::Text)
    })
}

/// Parse an optional JSON text column.
fn parse_json(row: &Row, col: usize) -> rusqlite::Result<Option<serde_json::Value>> {
    let raw: Option<String> = row.get(col)?;
    raw.map(|s| {
        serde_json::from_str(&s).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(col, rusqlite::types::Type::Text, Box::new(e))
        })
    })
    .transpose()
}

/// Trait for constructing a type from a database row.
pub trait FromRow: Sized {
    fn from_row(row: &Row) -> rusqlite::Result<Self>;
}

/// Query for a single optional result.
pub fn query_one<T: FromRow>(
    conn: &Connection,
    sql: &str,
    params: &[&dyn ToSql],
) -> crate::error::Result<Option<T>> {
    conn.query_row(sql, params, T::from_row)
        .optional()
        .map_err(Into::into)
}

/// Query for multiple results.
pub fn query_all<T: FromRow>(
    conn: &Connection,
    sql: &str,
    params: &[&dyn ToSql],
) -> crate::error::Result<Vec<T>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, T::from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ============ SQL SELECT Constants ============

pub const PARISH_COLS: &str =
    "id, name, pagarme_configured, pagarme_secret_key, created_at, updated_at";

pub const CAMPAIGN_COLS: &str =
    "id, parish_id, title, goal_cents, current_cents, created_at, updated_at";

pub const DONATION_COLS: &str = "id, campaign_id, parish_id, donor_name, donor_email, donor_phone, amount_cents, payment_method, status, anonymous, message, transaction_id, idempotency_key, failure_reason, gateway_response, created_at, updated_at";

// ============ FromRow Implementations ============

impl FromRow for Parish {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Parish {
            id: row.get(0)?,
            name: row.get(1)?,
            pagarme_configured: row.get::<_, i32>(2)? != 0,
            pagarme_secret_key: row.get(3)?,
            created_at: row.get(4)?,
            updated_at: row.get(5)?,
        })
    }
}

impl FromRow for Campaign {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Campaign {
            id: row.get(0)?,
            parish_id: row.get(1)?,
            title: row.get(2)?,
            goal_cents: row.get(3)?,
            current_cents: row.get(4)?,
            created_at: row.get(5)?,
            updated_at: row.get(6)?,
        })
    }
}

impl FromRow for Donation {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Donation {
            id: row.get(0)?,
            campaign_id: row.get(1)?,
            parish_id: row.get(2)?,
            donor_name: row.get(3)?,
            donor_email: row.get(4)?,
            donor_phone: row.get(5)?,
            amount_cents: row.get(6)?,
            payment_method: parse_enum(row, 7, "payment_method")?,
            status: parse_enum(row, 8, "status")?,
            anonymous: row.get::<_, i32>(9)? != 0,
            message: row.get(10)?,
            transaction_id: row.get(11)?,
            idempotency_key: row.get(12)?,
            failure_reason: row.get(13)?,
            gateway_response: parse_json(row, 14)?,
            created_at: row.get(15)?,
            updated_at: row.get(16)?,
        })
    }
}
