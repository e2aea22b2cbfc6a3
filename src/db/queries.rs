use chrono::Utc;
use rusqlite::{Connection, Transaction, TransactionBehavior, params};

use crate::crypto::MasterKey;
use crate::error::{AppError, Result};
use crate::id::EntityType;
use crate::models::*;

use super::from_row::{CAMPAIGN_COLS, DONATION_COLS, PARISH_COLS, query_all, query_one};

fn now() -> i64 {
    Utc::now().timestamp()
}

// ============ Parishes ============

pub fn create_parish(conn: &Connection, input: &CreateParish) -> Result<Parish> {
    let id = EntityType::Parish.gen_id();
    let now = now();
    conn.execute(
        "INSERT INTO parishes (id, name, pagarme_configured, created_at, updated_at)
         VALUES (?1, ?2, 0, ?3, ?3)",
        params![&id, &input.name, now],
    )?;
    Ok(Parish {
        id,
        name: input.name.clone(),
        pagarme_configured: false,
        pagarme_secret_key: None,
        created_at: now,
        updated_at: now,
    })
}

pub fn get_parish_by_id(conn: &Connection, id: &str) -> Result<Option<Parish>> {
    query_one(
        conn,
        &format!("SELECT {} FROM parishes WHERE id = ?1", PARISH_COLS),
        &[&id],
    )
}

/// Encrypt and store a parish's gateway secret key, marking the parish configured.
pub fn set_parish_gateway_key(
    conn: &Connection,
    parish_id: &str,
    secret_key: &str,
    master_key: &MasterKey,
) -> Result<bool> {
    let encrypted = master_key.encrypt_secret(parish_id, secret_key)?;
    let affected = conn.execute(
        "UPDATE parishes SET pagarme_secret_key = ?1, pagarme_configured = 1, updated_at = ?2
         WHERE id = ?3",
        params![encrypted, now(), parish_id],
    )?;
    Ok(affected > 0)
}

pub fn set_parish_configured(conn: &Connection, parish_id: &str, configured: bool) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE parishes SET pagarme_configured = ?1, updated_at = ?2 WHERE id = ?3",
        params![configured as i32, now(), parish_id],
    )?;
    Ok(affected > 0)
}

/// Load and decrypt the gateway credentials for a parish.
///
/// Errors with `ParishNotFound` when the row is absent and `GatewayNotConfigured`
/// when the flag is off, the key is missing, or the stored key cannot be opened.
pub fn get_parish_credentials(
    conn: &Connection,
    parish_id: &str,
    master_key: &MasterKey,
) -> Result<ParishCredentials> {
    let parish = get_parish_by_id(conn, parish_id)?.ok_or(AppError::ParishNotFound)?;

    if !parish.pagarme_configured {
        return Err(AppError::GatewayNotConfigured);
    }
    let Some(encrypted) = parish.pagarme_secret_key.as_deref() else {
        return Err(AppError::GatewayNotConfigured);
    };

    let secret_key = master_key.decrypt_secret(&parish.id, encrypted).map_err(|e| {
        // Treat an unreadable key as unusable rather than a server fault.
        tracing::error!("Failed to decrypt gateway key for parish {}: {}", parish.id, e);
        AppError::GatewayNotConfigured
    })?;

    Ok(ParishCredentials {
        parish_id: parish.id,
        secret_key,
    })
}

// ============ Campaigns ============

pub fn create_campaign(conn: &Connection, input: &CreateCampaign) -> Result<Campaign> {
    let id = EntityType::Campaign.gen_id();
    let now = now();
    conn.execute(
        "INSERT INTO campaigns (id, parish_id, title, goal_cents, current_cents, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, 0, ?5, ?5)",
        params![&id, &input.parish_id, &input.title, input.goal_cents, now],
    )?;
    Ok(Campaign {
        id,
        parish_id: input.parish_id.clone(),
        title: input.title.clone(),
        goal_cents: input.goal_cents,
        current_cents: 0,
        created_at: now,
        updated_at: now,
    })
}

pub fn get_campaign_by_id(conn: &Connection, id: &str) -> Result<Option<Campaign>> {
    query_one(
        conn,
        &format!("SELECT {} FROM campaigns WHERE id = ?1", CAMPAIGN_COLS),
        &[&id],
    )
}

pub fn list_campaigns(conn: &Connection) -> Result<Vec<Campaign>> {
    query_all(
        conn,
        &format!("SELECT {} FROM campaigns ORDER BY created_at", CAMPAIGN_COLS),
        &[],
    )
}

/// Rebuild every campaign's running total from the ledger.
/// Returns the number of campaigns whose total changed.
pub fn recompute_campaign_totals(conn: &Connection) -> Result<usize> {
    let affected = conn.execute(
        "UPDATE campaigns
         SET current_cents = (
                 SELECT COALESCE(SUM(amount_cents), 0) FROM donations
                 WHERE donations.campaign_id = campaigns.id AND donations.status = 'paid'
             ),
             updated_at = ?1
         WHERE current_cents != (
                 SELECT COALESCE(SUM(amount_cents), 0) FROM donations
                 WHERE donations.campaign_id = campaigns.id AND donations.status = 'paid'
             )",
        params![now()],
    )?;
    Ok(affected)
}

fn adjust_campaign_total(tx: &Transaction, campaign_id: &str, delta_cents: i64) -> Result<()> {
    let affected = tx.execute(
        "UPDATE campaigns SET current_cents = current_cents + ?1, updated_at = ?2 WHERE id = ?3",
        params![delta_cents, now(), campaign_id],
    )?;
    if affected == 0 {
        tracing::warn!(
            "Campaign {} not found while adjusting total by {}",
            campaign_id,
            delta_cents
        );
    }
    Ok(())
}

// ============ Donations ============

pub fn get_donation_by_id(conn: &Connection, id: &str) -> Result<Option<Donation>> {
    query_one(
        conn,
        &format!("SELECT {} FROM donations WHERE id = ?1", DONATION_COLS),
        &[&id],
    )
}

pub fn get_donation_by_transaction_id(
    conn: &Connection,
    transaction_id: &str,
) -> Result<Option<Donation>> {
    query_one(
        conn,
        &format!("SELECT {} FROM donations WHERE transaction_id = ?1", DONATION_COLS),
        &[&transaction_id],
    )
}

pub fn get_donation_by_idempotency_key(conn: &Connection, key: &str) -> Result<Option<Donation>> {
    query_one(
        conn,
        &format!("SELECT {} FROM donations WHERE idempotency_key = ?1", DONATION_COLS),
        &[&key],
    )
}

pub fn list_donations_by_campaign(conn: &Connection, campaign_id: &str) -> Result<Vec<Donation>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM donations WHERE campaign_id = ?1 ORDER BY created_at",
            DONATION_COLS
        ),
        &[&campaign_id],
    )
}

/// Outcome of trying to reserve a donation row.
#[derive(Debug)]
pub enum Reservation {
    /// A fresh `pending` row was written.
    Created(Donation),
    /// A row with the same idempotency key already exists.
    Existing(Donation),
}

/// Write the `pending` reservation row that records intent before the gateway
/// is called. The IMMEDIATE transaction serializes concurrent submissions with
/// the same idempotency key.
pub fn reserve_donation(conn: &mut Connection, input: &CreateDonation) -> Result<Reservation> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    if let Some(key) = input.idempotency_key.as_deref() {
        if let Some(existing) = get_donation_by_idempotency_key(&tx, key)? {
            return Ok(Reservation::Existing(existing));
        }
    }

    let id = EntityType::Donation.gen_id();
    let now = now();
    tx.execute(
        "INSERT INTO donations (id, campaign_id, parish_id, donor_name, donor_email, donor_phone,
             amount_cents, payment_method, status, anonymous, message, idempotency_key,
             created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 'pending', ?9, ?10, ?11, ?12, ?12)",
        params![
            &id,
            &input.campaign_id,
            &input.parish_id,
            &input.donor_name,
            &input.donor_email,
            &input.donor_phone,
            input.amount_cents,
            input.payment_method.as_ref(),
            input.anonymous as i32,
            &input.message,
            &input.idempotency_key,
            now,
        ],
    )?;
    tx.commit()?;

    Ok(Reservation::Created(Donation {
        id,
        campaign_id: input.campaign_id.clone(),
        parish_id: input.parish_id.clone(),
        donor_name: input.donor_name.clone(),
        donor_email: input.donor_email.clone(),
        donor_phone: input.donor_phone.clone(),
        amount_cents: input.amount_cents,
        payment_method: input.payment_method,
        status: DonationStatus::Pending,
        anonymous: input.anonymous,
        message: input.message.clone(),
        transaction_id: None,
        idempotency_key: input.idempotency_key.clone(),
        failure_reason: None,
        gateway_response: None,
        created_at: now,
        updated_at: now,
    }))
}

/// Mark a reservation as failed and release its idempotency key so the donor
/// can retry with the same inputs.
pub fn mark_donation_failed(
    conn: &Connection,
    donation_id: &str,
    reason: &str,
    gateway_response: Option<&serde_json::Value>,
) -> Result<bool> {
    let response = gateway_response.map(serde_json::to_string).transpose()?;
    let affected = conn.execute(
        "UPDATE donations
         SET status = 'failed', failure_reason = ?1, idempotency_key = NULL,
             gateway_response = COALESCE(?2, gateway_response), updated_at = ?3
         WHERE id = ?4 AND transaction_id IS NULL",
        params![reason, response, now(), donation_id],
    )?;
    Ok(affected > 0)
}

/// Record a gateway error whose outcome is unknown (timeout, unreadable answer).
///
/// The row stays `pending` and keeps its idempotency key: the charge may have
/// landed, so a webhook can still link it and a retry resumes under the same key.
pub fn mark_donation_unresolved(conn: &Connection, donation_id: &str, reason: &str) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE donations SET failure_reason = ?1, updated_at = ?2
         WHERE id = ?3 AND transaction_id IS NULL AND status = 'pending'",
        params![reason, now(), donation_id],
    )?;
    Ok(affected > 0)
}

/// Take over an unresolved reservation for a retry. At most one caller wins.
pub fn claim_unresolved_donation(conn: &Connection, donation_id: &str) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE donations SET failure_reason = NULL, updated_at = ?1
         WHERE id = ?2 AND transaction_id IS NULL AND status = 'pending'
           AND failure_reason IS NOT NULL",
        params![now(), donation_id],
    )?;
    Ok(affected > 0)
}

/// Result of applying a status change to one donation.
#[derive(Debug)]
pub struct StatusChange {
    pub previous: DonationStatus,
    pub transition: Transition,
    /// Row state after the change (unchanged unless `transition` is `Apply`).
    pub donation: Donation,
}

/// Apply `target` inside an open transaction, keeping the campaign total in step.
fn apply_status_in_tx(
    tx: &Transaction,
    donation: Donation,
    target: DonationStatus,
    payload: &serde_json::Value,
) -> Result<StatusChange> {
    let previous = donation.status;
    let transition = previous.transition_to(target);

    if transition != Transition::Apply {
        return Ok(StatusChange {
            previous,
            transition,
            donation,
        });
    }

    let now = now();
    tx.execute(
        "UPDATE donations SET status = ?1, gateway_response = ?2, updated_at = ?3 WHERE id = ?4",
        params![target.as_ref(), serde_json::to_string(payload)?, now, &donation.id],
    )?;

    if target == DonationStatus::Paid {
        adjust_campaign_total(tx, &donation.campaign_id, donation.amount_cents)?;
    } else if previous == DonationStatus::Paid && target == DonationStatus::Refunded {
        adjust_campaign_total(tx, &donation.campaign_id, -donation.amount_cents)?;
    }

    Ok(StatusChange {
        previous,
        transition,
        donation: Donation {
            status: target,
            gateway_response: Some(payload.clone()),
            updated_at: now,
            ..donation
        },
    })
}

/// Record the gateway's synchronous answer on a reservation.
///
/// The transaction id is always linked. The initial status goes through the
/// transition guard, so a webhook that raced ahead of this write is not undone.
pub fn attach_gateway_result(
    conn: &mut Connection,
    donation_id: &str,
    transaction_id: &str,
    initial_status: DonationStatus,
    gateway_response: &serde_json::Value,
) -> Result<StatusChange> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let donation = get_donation_by_id(&tx, donation_id)?
        .ok_or_else(|| AppError::Internal(format!("Reservation {} vanished", donation_id)))?;

    tx.execute(
        "UPDATE donations SET transaction_id = ?1, gateway_response = ?2, updated_at = ?3
         WHERE id = ?4",
        params![
            transaction_id,
            serde_json::to_string(gateway_response)?,
            now(),
            donation_id
        ],
    )?;

    let donation = Donation {
        transaction_id: Some(transaction_id.to_string()),
        gateway_response: Some(gateway_response.clone()),
        ..donation
    };
    let change = apply_status_in_tx(&tx, donation, initial_status, gateway_response)?;
    tx.commit()?;
    Ok(change)
}

/// Apply a webhook-driven status change to a donation.
///
/// When `link_transaction_id` is set and the row has no transaction id yet,
/// the id is attached first (webhook delivered before initiation persisted).
pub fn apply_donation_status(
    conn: &mut Connection,
    donation_id: &str,
    target: DonationStatus,
    payload: &serde_json::Value,
    link_transaction_id: Option<&str>,
) -> Result<Option<StatusChange>> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let Some(mut donation) = get_donation_by_id(&tx, donation_id)? else {
        return Ok(None);
    };

    if let Some(transaction_id) = link_transaction_id {
        if donation.transaction_id.is_none() {
            tx.execute(
                "UPDATE donations SET transaction_id = ?1, failure_reason = NULL WHERE id = ?2",
                params![transaction_id, donation_id],
            )?;
            donation.transaction_id = Some(transaction_id.to_string());
            donation.failure_reason = None;
        }
    }

    let change = apply_status_in_tx(&tx, donation, target, payload)?;
    tx.commit()?;
    Ok(Some(change))
}

/// Total number of donation rows.
pub fn count_donations(conn: &Connection) -> Result<i64> {
    conn.query_row("SELECT COUNT(*) FROM donations", [], |row| row.get(0))
        .map_err(Into::into)
}
