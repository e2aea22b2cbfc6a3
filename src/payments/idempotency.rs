//! Idempotency keys for charge creation.
//!
//! A client may send its own key in the `Idempotency-Key` header. Without
//! one, the key is derived from the request's identifying fields and a time
//! bucket, so a double-submitted form inside the window maps to one charge.

use sha2::{Digest, Sha256};

use crate::error::{AppError, Result};
use crate::models::{Donation, PaymentMethod};

/// Longest client-supplied key accepted.
pub const MAX_KEY_LEN: usize = 255;

/// Fields that identify "the same donation attempt".
#[derive(Debug, Clone, Copy)]
pub struct KeyMaterial<'a> {
    pub campaign_id: &'a str,
    pub parish_id: &'a str,
    pub donor_email: &'a str,
    pub amount_cents: i64,
    pub payment_method: PaymentMethod,
}

impl KeyMaterial<'_> {
    /// Whether `donation` was reserved for this same attempt. A reused key
    /// only replays when campaign, parish, donor, amount and method agree.
    pub fn matches(&self, donation: &Donation) -> bool {
        donation.campaign_id == self.campaign_id
            && donation.parish_id == self.parish_id
            && donation.amount_cents == self.amount_cents
            && donation.payment_method == self.payment_method
            && donation.donor_email.trim().to_lowercase() == self.donor_email.trim().to_lowercase()
    }
}

/// Derive a key as hex SHA-256 over the attempt fields and `floor(now / window)`.
pub fn derive_key(material: &KeyMaterial<'_>, now_unix: i64, window_secs: i64) -> String {
    let bucket = now_unix.div_euclid(window_secs.max(1)).to_string();
    let email = material.donor_email.trim().to_lowercase();
    let amount = material.amount_cents.to_string();

    let mut hasher = Sha256::new();
    let parts: [&str; 6] = [
        material.campaign_id,
        material.parish_id,
        &email,
        &amount,
        material.payment_method.as_ref(),
        &bucket,
    ];
    for part in parts {
        hasher.update(part.as_bytes());
        hasher.update(b"|");
    }
    hex::encode(hasher.finalize())
}

/// Accept a client key if it is 1-255 visible ASCII characters.
pub fn validate_client_key(key: &str) -> Result<String> {
    let key = key.trim();
    if key.is_empty() || key.len() > MAX_KEY_LEN || !key.bytes().all(|b| b.is_ascii_graphic()) {
        return Err(AppError::Validation("Idempotency-Key header is invalid".into()));
    }
    Ok(key.to_string())
}
