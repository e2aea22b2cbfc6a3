use rusqlite::Connection;

/// Initialize the ledger schema.
pub fn init_db(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        PRAGMA foreign_keys = ON;

        -- Parishes (only the gateway credential columns are used by the payment core)
        CREATE TABLE IF NOT EXISTS parishes (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            pagarme_configured INTEGER NOT NULL DEFAULT 0,
            pagarme_secret_key BLOB,  -- ENC1 envelope, see crypto::MasterKey
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );

        -- Campaigns (current_cents is the running total of paid donations)
        CREATE TABLE IF NOT EXISTS campaigns (
            id TEXT PRIMARY KEY,
            parish_id TEXT NOT NULL REFERENCES parishes(id) ON DELETE CASCADE,
            title TEXT NOT NULL,
            goal_cents INTEGER NOT NULL CHECK (goal_cents >= 0),
            current_cents INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_campaigns_parish ON campaigns(parish_id);

        -- Donations (the ledger)
        CREATE TABLE IF NOT EXISTS donations (
            id TEXT PRIMARY KEY,
            campaign_id TEXT NOT NULL REFERENCES campaigns(id),
            parish_id TEXT NOT NULL REFERENCES parishes(id),
            donor_name TEXT NOT NULL,
            donor_email TEXT NOT NULL,
            donor_phone TEXT,
            amount_cents INTEGER NOT NULL CHECK (amount_cents > 0),
            payment_method TEXT NOT NULL CHECK (payment_method IN ('credit_card', 'pix', 'boleto')),
            status TEXT NOT NULL DEFAULT 'pending'
                CHECK (status IN ('pending', 'processing', 'paid', 'failed', 'refunded')),
            anonymous INTEGER NOT NULL DEFAULT 0,
            message TEXT,
            transaction_id TEXT,
            idempotency_key TEXT,
            failure_reason TEXT,
            gateway_response TEXT,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );
        CREATE UNIQUE INDEX IF NOT EXISTS idx_donations_transaction
            ON donations(transaction_id) WHERE transaction_id IS NOT NULL;
        CREATE UNIQUE INDEX IF NOT EXISTS idx_donations_idempotency
            ON donations(idempotency_key) WHERE idempotency_key IS NOT NULL;
        CREATE INDEX IF NOT EXISTS idx_donations_campaign_status ON donations(campaign_id, status);
        "#,
    )
}
