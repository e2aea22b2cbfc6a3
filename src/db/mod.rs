mod from_row;
mod schema;
pub mod queries;

pub use schema::init_db;

use std::sync::Arc;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use secrecy::SecretString;

use crate::config::PaymentSettings;
use crate::crypto::MasterKey;
use crate::payments::ChargeGateway;

pub type DbPool = Pool<SqliteConnectionManager>;

/// Application state shared by all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Donation ledger (parishes, campaigns, donations)
    pub db: DbPool,
    /// Opens the per-parish gateway secret keys
    pub master_key: MasterKey,
    pub gateway: Arc<dyn ChargeGateway>,
    pub payments: PaymentSettings,
    /// When set, webhooks must carry a valid `X-Hub-Signature`
    pub webhook_secret: Option<Arc<SecretString>>,
}

pub fn create_pool(database_path: &str) -> Result<DbPool, r2d2::Error> {
    let manager = SqliteConnectionManager::file(database_path)
        .with_init(|conn| conn.execute_batch("PRAGMA foreign_keys = ON; PRAGMA busy_timeout = 5000;"));
    Pool::builder().max_size(10).build(manager)
}

/// Single-connection in-memory pool. Each `:memory:` connection is its own
/// database, so the pool must never open a second one.
pub fn create_memory_pool() -> Result<DbPool, r2d2::Error> {
    let manager = SqliteConnectionManager::memory()
        .with_init(|conn| conn.execute_batch("PRAGMA foreign_keys = ON;"));
    Pool::builder().max_size(1).build(manager)
}
