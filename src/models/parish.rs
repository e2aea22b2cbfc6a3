use secrecy::SecretString;
use serde::Serialize;

/// Parish row as seen by the payment core. Only the gateway fields matter here.
#[derive(Debug, Clone, Serialize)]
pub struct Parish {
    pub id: String,
    pub name: String,
    pub pagarme_configured: bool,
    /// Encrypted gateway secret key (see `crypto::MasterKey`). Never serialized.
    #[serde(skip_serializing)]
    pub pagarme_secret_key: Option<Vec<u8>>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Decrypted gateway credentials, valid for the duration of one request.
#[derive(Debug)]
pub struct ParishCredentials {
    pub parish_id: String,
    pub secret_key: SecretString,
}

#[derive(Debug, Clone)]
pub struct CreateParish {
    pub name: String,
}
