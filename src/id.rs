//! Prefixed ID generation for ledger entities.
//!
//! Prefixes keep local ids visually distinct from gateway ids (Pagar.me's
//! `or_`, `ch_`, `tran_`), which matters when both appear in webhook logs.
//!
//! Format: `{entity}_{uuid_simple}` (32 hex chars, no hyphens)

use uuid::Uuid;

/// Entity types that have prefixed IDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityType {
    Parish,
    Campaign,
    Donation,
}

impl EntityType {
    /// Returns the prefix for this entity type.
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::Parish => "par",
            Self::Campaign => "cmp",
            Self::Donation => "don",
        }
    }

    /// Generates a new prefixed ID for this entity type.
    pub fn gen_id(&self) -> String {
        format!("{}_{}", self.prefix(), Uuid::new_v4().as_simple())
    }

    /// Cheap format check used to reject garbage before hitting the database.
    pub fn is_valid_id(&self, s: &str) -> bool {
        let Some(hex_part) = s
            .strip_prefix(self.prefix())
            .and_then(|rest| rest.strip_prefix('_'))
        else {
            return false;
        };

        hex_part.len() == 32 && hex_part.chars().all(|c| c.is_ascii_hexdigit())
    }
}
