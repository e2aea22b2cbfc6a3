//! Parish gateway credentials at rest

#[path = "../common/mod.rs"]
mod common;

use common::*;
use secrecy::ExposeSecret;

#[test]
fn test_configured_parish_decrypts_key() {
    let conn = setup_test_db();
    let parish = create_test_parish(&conn, true);

    let creds = queries::get_parish_credentials(&conn, &parish.id, &test_master_key()).unwrap();
    assert_eq!(creds.parish_id, parish.id);
    assert_eq!(creds.secret_key.expose_secret(), TEST_SECRET_KEY);
}

#[test]
fn test_key_is_encrypted_at_rest() {
    let conn = setup_test_db();
    let parish = create_test_parish(&conn, true);

    let stored = queries::get_parish_by_id(&conn, &parish.id)
        .unwrap()
        .unwrap()
        .pagarme_secret_key
        .unwrap();
    assert!(MasterKey::is_encrypted(&stored));
    assert!(
        !stored.windows(TEST_SECRET_KEY.len()).any(|w| w == TEST_SECRET_KEY.as_bytes()),
        "plaintext key must not be stored"
    );
}

#[test]
fn test_unconfigured_parish() {
    let conn = setup_test_db();
    let parish = create_test_parish(&conn, false);

    let result = queries::get_parish_credentials(&conn, &parish.id, &test_master_key());
    assert!(matches!(result, Err(AppError::GatewayNotConfigured)));
}

#[test]
fn test_flag_off_hides_stored_key() {
    let conn = setup_test_db();
    let parish = create_test_parish(&conn, true);
    assert!(queries::set_parish_configured(&conn, &parish.id, false).unwrap());

    let result = queries::get_parish_credentials(&conn, &parish.id, &test_master_key());
    assert!(matches!(result, Err(AppError::GatewayNotConfigured)));
}

#[test]
fn test_wrong_master_key_is_not_configured() {
    let conn = setup_test_db();
    let parish = create_test_parish(&conn, true);

    let other_key = MasterKey::from_bytes([7u8; 32]);
    let result = queries::get_parish_credentials(&conn, &parish.id, &other_key);
    assert!(matches!(result, Err(AppError::GatewayNotConfigured)));
}

#[test]
fn test_unknown_parish() {
    let conn = setup_test_db();
    let result = queries::get_parish_credentials(
        &conn,
        "par_00000000000000000000000000000000",
        &test_master_key(),
    );
    assert!(matches!(result, Err(AppError::ParishNotFound)));
}

#[test]
fn test_secret_is_never_serialized() {
    let conn = setup_test_db();
    let parish = create_test_parish(&conn, true);
    let loaded = queries::get_parish_by_id(&conn, &parish.id).unwrap().unwrap();

    let json = serde_json::to_value(&loaded).unwrap();
    assert!(json.get("pagarme_secret_key").is_none());
    assert_eq!(json["pagarme_configured"], true);

    let creds = queries::get_parish_credentials(&conn, &parish.id, &test_master_key()).unwrap();
    assert!(!format!("{:?}", creds).contains(TEST_SECRET_KEY));
}
