//! Donation ledger: reservations, status changes and campaign totals

#[path = "../common/mod.rs"]
mod common;

use common::*;
use serde_json::json;

fn campaign_fixture(conn: &rusqlite::Connection) -> Campaign {
    let parish = create_test_parish(conn, true);
    create_test_campaign(conn, &parish.id)
}

fn current_cents(conn: &rusqlite::Connection, campaign_id: &str) -> i64 {
    queries::get_campaign_by_id(conn, campaign_id)
        .unwrap()
        .unwrap()
        .current_cents
}

// ============ Reservations ============

#[test]
fn test_reservation_starts_pending_without_transaction() {
    let mut conn = setup_test_db();
    let campaign = campaign_fixture(&conn);

    let d = create_test_reservation(&mut conn, &campaign, "k1", 1500);
    assert_eq!(d.status, DonationStatus::Pending);
    assert!(d.transaction_id.is_none());

    let stored = queries::get_donation_by_id(&conn, &d.id).unwrap().unwrap();
    assert_eq!(stored.amount_cents, 1500);
    assert_eq!(stored.idempotency_key.as_deref(), Some("k1"));
    assert_eq!(current_cents(&conn, &campaign.id), 0);
}

#[test]
fn test_same_key_returns_existing_row() {
    let mut conn = setup_test_db();
    let campaign = campaign_fixture(&conn);
    let first = create_test_reservation(&mut conn, &campaign, "same-key", 1500);

    let again = CreateDonation {
        campaign_id: campaign.id.clone(),
        parish_id: campaign.parish_id.clone(),
        donor_name: "Outro".into(),
        donor_email: "outro@example.com".into(),
        donor_phone: None,
        amount_cents: 9999,
        payment_method: PaymentMethod::Boleto,
        anonymous: false,
        message: None,
        idempotency_key: Some("same-key".into()),
    };
    match queries::reserve_donation(&mut conn, &again).unwrap() {
        queries::Reservation::Existing(d) => assert_eq!(d.id, first.id),
        queries::Reservation::Created(d) => panic!("second row {} created for the same key", d.id),
    }
    assert_eq!(queries::count_donations(&conn).unwrap(), 1);
}

#[test]
fn test_mark_failed_releases_key() {
    let mut conn = setup_test_db();
    let campaign = campaign_fixture(&conn);
    let d = create_test_reservation(&mut conn, &campaign, "retry-me", 1500);

    let details = json!({"message": "declined"});
    assert!(queries::mark_donation_failed(&conn, &d.id, "card declined", Some(&details)).unwrap());

    let failed = queries::get_donation_by_id(&conn, &d.id).unwrap().unwrap();
    assert_eq!(failed.status, DonationStatus::Failed);
    assert_eq!(failed.failure_reason.as_deref(), Some("card declined"));
    assert_eq!(failed.gateway_response, Some(details));
    assert!(failed.idempotency_key.is_none());
    assert!(queries::get_donation_by_idempotency_key(&conn, "retry-me").unwrap().is_none());

    // The key is free again
    let retry = create_test_reservation(&mut conn, &campaign, "retry-me", 1500);
    assert_ne!(retry.id, d.id);
}

#[test]
fn test_mark_failed_never_touches_charged_rows() {
    let mut conn = setup_test_db();
    let campaign = campaign_fixture(&conn);
    let d = create_test_donation(&mut conn, &campaign, "or_charged", 1500, DonationStatus::Pending);

    assert!(!queries::mark_donation_failed(&conn, &d.id, "late error", None).unwrap());
    let stored = queries::get_donation_by_id(&conn, &d.id).unwrap().unwrap();
    assert_eq!(stored.status, DonationStatus::Pending);
    assert!(stored.failure_reason.is_none());
}

#[test]
fn test_unresolved_attempt_stays_pending_and_keeps_key() {
    let mut conn = setup_test_db();
    let campaign = campaign_fixture(&conn);
    let d = create_test_reservation(&mut conn, &campaign, "maybe-charged", 1500);

    assert!(queries::mark_donation_unresolved(&conn, &d.id, "timed out").unwrap());
    let stored = queries::get_donation_by_id(&conn, &d.id).unwrap().unwrap();
    assert_eq!(stored.status, DonationStatus::Pending);
    assert_eq!(stored.failure_reason.as_deref(), Some("timed out"));
    assert_eq!(stored.idempotency_key.as_deref(), Some("maybe-charged"));

    // Only one retry may take the reservation over
    assert!(queries::claim_unresolved_donation(&conn, &d.id).unwrap());
    assert!(!queries::claim_unresolved_donation(&conn, &d.id).unwrap());
    let claimed = queries::get_donation_by_id(&conn, &d.id).unwrap().unwrap();
    assert!(claimed.failure_reason.is_none());
}

#[test]
fn test_in_flight_reservation_cannot_be_claimed() {
    let mut conn = setup_test_db();
    let campaign = campaign_fixture(&conn);
    let d = create_test_reservation(&mut conn, &campaign, "busy", 1500);
    assert!(!queries::claim_unresolved_donation(&conn, &d.id).unwrap());
}

#[test]
fn test_unresolved_never_touches_linked_rows() {
    let mut conn = setup_test_db();
    let campaign = campaign_fixture(&conn);
    let d = create_test_donation(&mut conn, &campaign, "or_linked", 1500, DonationStatus::Paid);

    assert!(!queries::mark_donation_unresolved(&conn, &d.id, "timed out").unwrap());
    let stored = queries::get_donation_by_id(&conn, &d.id).unwrap().unwrap();
    assert!(stored.failure_reason.is_none());
}

#[test]
fn test_transaction_id_is_unique() {
    let mut conn = setup_test_db();
    let campaign = campaign_fixture(&conn);
    create_test_donation(&mut conn, &campaign, "or_dup", 1000, DonationStatus::Pending);
    let other = create_test_reservation(&mut conn, &campaign, "k2", 1000);

    let result = queries::attach_gateway_result(
        &mut conn,
        &other.id,
        "or_dup",
        DonationStatus::Pending,
        &json!({"id": "or_dup"}),
    );
    assert!(matches!(result, Err(AppError::Database(_))));
}

#[test]
fn test_lookup_by_transaction_id() {
    let mut conn = setup_test_db();
    let campaign = campaign_fixture(&conn);
    let d = create_test_donation(&mut conn, &campaign, "or_find", 1000, DonationStatus::Pending);

    let found = queries::get_donation_by_transaction_id(&conn, "or_find").unwrap().unwrap();
    assert_eq!(found.id, d.id);
    assert!(queries::get_donation_by_transaction_id(&conn, "or_missing").unwrap().is_none());
}

// ============ Status changes and totals ============

#[test]
fn test_paid_then_refunded_moves_total_both_ways() {
    let mut conn = setup_test_db();
    let campaign = campaign_fixture(&conn);
    let d = create_test_donation(&mut conn, &campaign, "or_pr", 5000, DonationStatus::Pending);

    let paid = queries::apply_donation_status(&mut conn, &d.id, DonationStatus::Paid, &json!({}), None)
        .unwrap()
        .unwrap();
    assert_eq!(paid.transition, Transition::Apply);
    assert_eq!(current_cents(&conn, &campaign.id), 5000);

    let again = queries::apply_donation_status(&mut conn, &d.id, DonationStatus::Paid, &json!({}), None)
        .unwrap()
        .unwrap();
    assert_eq!(again.transition, Transition::AlreadyInState);
    assert_eq!(current_cents(&conn, &campaign.id), 5000);

    queries::apply_donation_status(&mut conn, &d.id, DonationStatus::Refunded, &json!({}), None).unwrap();
    assert_eq!(current_cents(&conn, &campaign.id), 0);
}

#[test]
fn test_refund_of_unpaid_donation_leaves_total() {
    let mut conn = setup_test_db();
    let campaign = campaign_fixture(&conn);
    let d = create_test_donation(&mut conn, &campaign, "or_up", 5000, DonationStatus::Processing);

    queries::apply_donation_status(&mut conn, &d.id, DonationStatus::Refunded, &json!({}), None).unwrap();
    assert_eq!(current_cents(&conn, &campaign.id), 0);
}

#[test]
fn test_rejected_transition_writes_nothing() {
    let mut conn = setup_test_db();
    let campaign = campaign_fixture(&conn);
    let d = create_test_donation(&mut conn, &campaign, "or_rej", 5000, DonationStatus::Failed);
    let before = queries::get_donation_by_id(&conn, &d.id).unwrap().unwrap();

    let change = queries::apply_donation_status(
        &mut conn,
        &d.id,
        DonationStatus::Paid,
        &json!({"late": true}),
        None,
    )
    .unwrap()
    .unwrap();
    assert_eq!(change.transition, Transition::Reject);

    let after = queries::get_donation_by_id(&conn, &d.id).unwrap().unwrap();
    assert_eq!(after.status, DonationStatus::Failed);
    assert_eq!(after.gateway_response, before.gateway_response);
    assert_eq!(current_cents(&conn, &campaign.id), 0);
}

#[test]
fn test_unknown_donation_is_none() {
    let mut conn = setup_test_db();
    let change = queries::apply_donation_status(
        &mut conn,
        "don_00000000000000000000000000000000",
        DonationStatus::Paid,
        &json!({}),
        None,
    )
    .unwrap();
    assert!(change.is_none());
}

#[test]
fn test_recompute_repairs_drifted_totals() {
    let mut conn = setup_test_db();
    let campaign = campaign_fixture(&conn);
    create_test_donation(&mut conn, &campaign, "or_a", 1000, DonationStatus::Paid);
    create_test_donation(&mut conn, &campaign, "or_b", 2500, DonationStatus::Paid);
    create_test_donation(&mut conn, &campaign, "or_c", 9999, DonationStatus::Refunded);
    create_test_donation(&mut conn, &campaign, "or_d", 4444, DonationStatus::Pending);
    assert_eq!(current_cents(&conn, &campaign.id), 3500);

    conn.execute(
        "UPDATE campaigns SET current_cents = 42 WHERE id = ?1",
        [&campaign.id],
    )
    .unwrap();

    assert_eq!(queries::recompute_campaign_totals(&conn).unwrap(), 1);
    assert_eq!(current_cents(&conn, &campaign.id), 3500);
    assert_eq!(queries::recompute_campaign_totals(&conn).unwrap(), 0, "nothing left to fix");
}
