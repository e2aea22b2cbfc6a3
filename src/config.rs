use std::env;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use secrecy::SecretString;

use crate::crypto::MasterKey;
use crate::error::{AppError, Result};
use crate::payments::DEFAULT_API_URL;

/// Fixed parameters of the charges this service creates.
#[derive(Debug, Clone)]
pub struct PaymentSettings {
    pub pix_expires_in_secs: u64,
    pub boleto_due_days: i64,
    pub boleto_instructions: String,
    /// Width of the time bucket used for derived idempotency keys.
    pub idempotency_window_secs: i64,
}

impl Default for PaymentSettings {
    fn default() -> Self {
        Self {
            pix_expires_in_secs: 3600,
            boleto_due_days: 3,
            boleto_instructions: "Pagamento referente a doação".to_string(),
            idempotency_window_secs: 600,
        }
    }
}

/// Requests per minute per client IP.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    /// `POST /payments` (each request may reach the gateway)
    pub strict_rpm: u32,
    /// `GET /donations/{id}`
    pub standard_rpm: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            strict_rpm: 10,
            standard_rpm: 30,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_path: String,
    pub dev_mode: bool,
    pub master_key: MasterKey,
    pub pagarme_api_url: String,
    pub pagarme_timeout: Duration,
    pub webhook_secret: Option<Arc<SecretString>>,
    pub payments: PaymentSettings,
    pub rate_limit: RateLimitConfig,
}

/// Parse an env var, keeping `default` when it is unset or unparsable.
fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!("Ignoring invalid {}={:?}, using default", key, raw);
            default
        }),
        Err(_) => default,
    }
}

/// Read a base64 master key from a file.
pub fn load_master_key_from_file(path: &str) -> Result<MasterKey> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| AppError::Internal(format!("Failed to read key file {}: {}", path, e)))?;
    MasterKey::from_base64(&contents)
}

fn load_master_key(dev_mode: bool) -> Result<MasterKey> {
    if let Ok(encoded) = env::var("MASTER_KEY") {
        return MasterKey::from_base64(&encoded);
    }
    if let Ok(path) = env::var("MASTER_KEY_FILE") {
        return load_master_key_from_file(&path);
    }
    if dev_mode {
        tracing::warn!("MASTER_KEY not set; using an all-zero development key");
        return Ok(MasterKey::from_bytes([0u8; 32]));
    }
    Err(AppError::Internal(
        "MASTER_KEY or MASTER_KEY_FILE must be set outside dev mode".into(),
    ))
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let dev_mode = env::var("APP_ENV")
            .map(|v| v == "dev" || v == "development")
            .unwrap_or(false);

        let defaults = PaymentSettings::default();
        let payments = PaymentSettings {
            pix_expires_in_secs: env_parse("PIX_EXPIRES_IN_SECS", defaults.pix_expires_in_secs),
            boleto_due_days: env_parse("BOLETO_DUE_DAYS", defaults.boleto_due_days).clamp(1, 365),
            boleto_instructions: env::var("BOLETO_INSTRUCTIONS")
                .unwrap_or(defaults.boleto_instructions),
            idempotency_window_secs: env_parse(
                "IDEMPOTENCY_WINDOW_SECS",
                defaults.idempotency_window_secs,
            )
            .max(1),
        };

        let limits = RateLimitConfig::default();
        let rate_limit = RateLimitConfig {
            strict_rpm: env_parse("RATE_LIMIT_STRICT_RPM", limits.strict_rpm).max(1),
            standard_rpm: env_parse("RATE_LIMIT_STANDARD_RPM", limits.standard_rpm).max(1),
        };

        Ok(Self {
            host: env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: env_parse("PORT", 3000),
            database_path: env::var("DATABASE_PATH")
                .unwrap_or_else(|_| "parish_donations.db".to_string()),
            dev_mode,
            master_key: load_master_key(dev_mode)?,
            pagarme_api_url: env::var("PAGARME_API_URL")
                .unwrap_or_else(|_| DEFAULT_API_URL.to_string()),
            pagarme_timeout: Duration::from_secs(env_parse("PAGARME_TIMEOUT_SECS", 20u64).max(1)),
            webhook_secret: env::var("PAGARME_WEBHOOK_SECRET")
                .ok()
                .filter(|s| !s.is_empty())
                .map(|s| Arc::new(SecretString::from(s))),
            payments,
            rate_limit,
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
