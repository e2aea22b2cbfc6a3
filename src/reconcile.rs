//! Webhook reconciliation: maps gateway events onto donation status changes.
//!
//! Pagar.me is inconsistent about event prefixes (`charge.*`, `order.*`,
//! `transaction.*`, `payment.*`) and about where the id lives, so events are
//! classified by suffix and the transaction id is searched in several shapes.

use rusqlite::Connection;
use serde::Serialize;
use serde_json::Value;

use crate::db::queries;
use crate::error::{AppError, Result};
use crate::models::{Donation, DonationStatus, Transition};

/// Normalized meaning of a gateway event type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventFamily {
    Paid,
    Refunded,
    Failed,
    Processing,
    Unknown,
}

impl EventFamily {
    pub fn target_status(&self) -> Option<DonationStatus> {
        match self {
            Self::Paid => Some(DonationStatus::Paid),
            Self::Refunded => Some(DonationStatus::Refunded),
            Self::Failed => Some(DonationStatus::Failed),
            Self::Processing => Some(DonationStatus::Processing),
            Self::Unknown => None,
        }
    }
}

/// Classify an event type by its last dot-separated segment, whatever the prefix.
pub fn classify(event_type: &str) -> EventFamily {
    let normalized = event_type.trim().to_ascii_lowercase();
    let suffix = normalized.rsplit('.').next().unwrap_or_default();
    match suffix {
        "paid" => EventFamily::Paid,
        "refunded" => EventFamily::Refunded,
        "failed" | "payment_failed" => EventFamily::Failed,
        "processing" | "pending" => EventFamily::Processing,
        _ => EventFamily::Unknown,
    }
}

/// Event type from `type`, falling back to `event`.
pub fn extract_event_type(payload: &Value) -> Option<&str> {
    ["type", "event"]
        .iter()
        .filter_map(|key| payload.get(*key).and_then(Value::as_str))
        .find(|s| !s.trim().is_empty())
}

fn id_at(payload: &Value, pointer: &str) -> Option<String> {
    match payload.pointer(pointer)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

// The root `id` is checked last: on order/charge hooks it is the hook's own id.
const TRANSACTION_ID_POINTERS: [&str; 4] = ["/data/order/id", "/transaction/id", "/data/id", "/id"];

const DONATION_HINT_POINTERS: [&str; 4] = [
    "/metadata/donation_id",
    "/data/metadata/donation_id",
    "/data/order/metadata/donation_id",
    "/transaction/metadata/donation_id",
];

/// Every transaction id the payload carries, most specific first, deduplicated.
///
/// Order: `data.order.id`, `transaction.id`, `data.id`, then the root `id`.
/// The root `id` goes last because on order and charge hooks it names the
/// hook itself, not the order.
pub fn transaction_id_candidates(payload: &Value) -> Vec<String> {
    let mut ids: Vec<String> = Vec::new();
    for pointer in TRANSACTION_ID_POINTERS {
        if let Some(id) = id_at(payload, pointer) {
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
    }
    ids
}

/// Our own donation id, echoed back by the gateway from the order metadata.
pub fn donation_id_hint(payload: &Value) -> Option<String> {
    DONATION_HINT_POINTERS
        .iter()
        .find_map(|pointer| id_at(payload, pointer))
}

/// What reconciliation did with one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcileOutcome {
    /// Status changed.
    Applied,
    /// Duplicate delivery; nothing to do.
    AlreadyInState,
    /// Out-of-order or post-terminal event; left untouched.
    IgnoredStale,
    /// No donation matches the event.
    Orphan,
    /// Event type carries no status meaning.
    UnknownEvent,
}

#[derive(Debug, Clone)]
pub struct ReconcileReport {
    pub outcome: ReconcileOutcome,
    pub event_type: Option<String>,
    pub transaction_id: String,
    pub donation_id: Option<String>,
    /// Donation status after processing; `None` for orphan and unknown events.
    pub status: Option<DonationStatus>,
}

/// Find the donation an event refers to. The second value is the transaction
/// id to link when the match came through the metadata hint.
fn locate_donation(
    conn: &Connection,
    candidates: &[String],
    payload: &Value,
) -> Result<Option<(Donation, Option<String>)>> {
    for id in candidates {
        if let Some(donation) = queries::get_donation_by_transaction_id(conn, id)? {
            return Ok(Some((donation, None)));
        }
    }

    let Some(hint) = donation_id_hint(payload) else {
        return Ok(None);
    };
    match queries::get_donation_by_id(conn, &hint)? {
        // Webhook beat the initiation write: link the primary id now.
        // A failed reservation stays unlinked so a retry can claim the id.
        Some(donation) if donation.transaction_id.is_none() && !donation.status.is_terminal() => {
            Ok(Some((donation, candidates.first().cloned())))
        }
        Some(donation) => {
            tracing::warn!(
                "Webhook hint {} cannot be linked (status {}, transaction {:?})",
                hint,
                donation.status,
                donation.transaction_id
            );
            Ok(None)
        }
        None => Ok(None),
    }
}

/// Apply one gateway event to the ledger.
///
/// Returns `MissingTransactionId` when no id can be found; every other
/// non-persistence path resolves to a report so the webhook can be acknowledged.
pub fn reconcile_event(conn: &mut Connection, payload: &Value) -> Result<ReconcileReport> {
    let candidates = transaction_id_candidates(payload);
    let Some(primary) = candidates.first().cloned() else {
        return Err(AppError::MissingTransactionId);
    };

    let event_type = extract_event_type(payload).map(str::to_string);
    let family = event_type
        .as_deref()
        .map(classify)
        .unwrap_or(EventFamily::Unknown);

    let mut report = ReconcileReport {
        outcome: ReconcileOutcome::UnknownEvent,
        event_type,
        transaction_id: primary,
        donation_id: None,
        status: None,
    };

    let Some(target) = family.target_status() else {
        tracing::info!(
            "Ignoring unknown webhook event {:?} for transaction {}",
            report.event_type,
            report.transaction_id
        );
        return Ok(report);
    };

    let Some((donation, link)) = locate_donation(conn, &candidates, payload)? else {
        tracing::info!(
            "Orphan webhook event {:?}: no donation for transaction {}",
            report.event_type,
            report.transaction_id
        );
        report.outcome = ReconcileOutcome::Orphan;
        return Ok(report);
    };

    let Some(change) =
        queries::apply_donation_status(conn, &donation.id, target, payload, link.as_deref())?
    else {
        report.outcome = ReconcileOutcome::Orphan;
        return Ok(report);
    };

    report.donation_id = Some(change.donation.id.clone());
    report.status = Some(change.donation.status);
    if let Some(tx_id) = change.donation.transaction_id.as_ref() {
        report.transaction_id = tx_id.clone();
    }
    report.outcome = match change.transition {
        Transition::Apply => {
            tracing::info!(
                "Donation {} {} -> {} ({:?})",
                change.donation.id,
                change.previous,
                target,
                report.event_type
            );
            ReconcileOutcome::Applied
        }
        Transition::AlreadyInState => {
            tracing::debug!("Donation {} already {}", change.donation.id, target);
            ReconcileOutcome::AlreadyInState
        }
        Transition::Reject => {
            tracing::info!(
                "Ignoring stale event {:?}: donation {} is {}, refusing {}",
                report.event_type,
                change.donation.id,
                change.previous,
                target
            );
            ReconcileOutcome::IgnoredStale
        }
    };

    Ok(report)
}
