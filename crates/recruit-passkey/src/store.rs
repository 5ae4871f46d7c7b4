//! Storage seams. The engine never talks to a database directly; the service
//! crate implements these traits over sea-orm and [`crate::memory`] provides
//! in-process versions.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::challenge::Challenge;
use crate::cose::CoseAlgorithm;

pub type UserId = i32;

/// Longest credential id accepted at registration.
pub const MAX_CREDENTIAL_ID_LEN: usize = 1023;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("record already exists")]
    Duplicate,

    #[error("record not found")]
    NotFound,

    #[error("storage backend error: {0}")]
    Backend(String),
}

/// A caller as known to the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: UserId,
    /// Opaque WebAuthn user handle, never the database id.
    pub user_handle: Vec<u8>,
    pub name: String,
    pub display_name: String,
}

/// One registered credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialRecord {
    pub credential_id: Vec<u8>,
    pub user_id: UserId,
    /// COSE_Key bytes as attested at registration.
    pub public_key: Vec<u8>,
    pub algorithm: CoseAlgorithm,
    pub sign_count: u32,
    pub transports: Vec<String>,
    pub backup_eligible: bool,
    pub backup_state: bool,
    pub uv_initialized: bool,
    pub nickname: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
}

/// State written back after a successful assertion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CredentialUse {
    pub sign_count: u32,
    pub uv_initialized: bool,
    pub backup_state: bool,
    pub used_at: DateTime<Utc>,
}

impl CredentialRecord {
    pub fn apply(&mut self, usage: &CredentialUse) {
        self.sign_count = usage.sign_count;
        self.uv_initialized = usage.uv_initialized;
        self.backup_state = usage.backup_state;
        self.last_used_at = Some(usage.used_at);
    }
}

#[async_trait]
pub trait ChallengeStore: Send + Sync {
    async fn insert(&self, challenge: &Challenge) -> Result<(), StoreError>;

    /// Removes the challenge and returns it. When called concurrently for the
    /// same id, at most one caller receives `Some`.
    async fn take(&self, id: &str) -> Result<Option<Challenge>, StoreError>;

    /// Deletes every challenge with `expires <= now`, returning how many went.
    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError>;
}

#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn find(&self, credential_id: &[u8]) -> Result<Option<CredentialRecord>, StoreError>;

    async fn list_for_user(&self, user_id: UserId) -> Result<Vec<CredentialRecord>, StoreError>;

    /// Fails with [`StoreError::Duplicate`] when the credential id is taken.
    async fn create(&self, record: &CredentialRecord) -> Result<(), StoreError>;

    async fn record_use(&self, credential_id: &[u8], usage: &CredentialUse)
        -> Result<(), StoreError>;
}

#[async_trait]
pub trait IdentityDirectory: Send + Sync {
    async fn find_by_handle(&self, user_handle: &[u8]) -> Result<Option<Identity>, StoreError>;
}
