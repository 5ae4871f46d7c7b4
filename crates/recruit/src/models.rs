use serde::{Deserialize, Serialize};

/// Error response
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

/// Request payload for POST /api/v1/passkey/test/start
#[derive(Debug, Serialize, Deserialize)]
pub struct TestStartPayload {
    #[serde(rename = "credentialId")]
    pub credential_id: Vec<u8>,
}

/// Summary of a stored passkey returned after registration or a test
#[derive(Debug, Serialize, Deserialize)]
pub struct PasskeyInfo {
    #[serde(rename = "credentialId")]
    pub credential_id: Vec<u8>,

    pub algorithm: i64,

    #[serde(rename = "signCount")]
    pub sign_count: u32,

    #[serde(rename = "backupEligible")]
    pub backup_eligible: bool,

    #[serde(rename = "backupState")]
    pub backup_state: bool,

    pub nickname: Option<String>,

    #[serde(rename = "createdAt")]
    pub created_at: chrono::DateTime<chrono::Utc>,

    #[serde(rename = "lastUsedAt")]
    pub last_used_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl From<&recruit_passkey::CredentialRecord> for PasskeyInfo {
    fn from(record: &recruit_passkey::CredentialRecord) -> Self {
        Self {
            credential_id: record.credential_id.clone(),
            algorithm: record.algorithm.id(),
            sign_count: record.sign_count,
            backup_eligible: record.backup_eligible,
            backup_state: record.backup_state,
            nickname: record.nickname.clone(),
            created_at: record.created_at,
            last_used_at: record.last_used_at,
        }
    }
}

/// Response for a successful passkey login
#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    #[serde(rename = "userId")]
    pub user_id: i32,
}

/// Session JWT claims
#[derive(Debug, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Issuer
    pub iss: String,

    /// Subject (user ID)
    pub sub: String,

    /// Audience
    pub aud: String,

    /// Expiration time (Unix timestamp)
    pub exp: i64,

    /// Issued at (Unix timestamp)
    pub iat: i64,

    pub token_type: String,
}
