//! In-process stores backed by `tokio::sync::RwLock<HashMap<..>>`.
//!
//! Cloning a store shares its contents.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::challenge::Challenge;
use crate::store::{
    ChallengeStore, CredentialRecord, CredentialStore, CredentialUse, Identity, IdentityDirectory,
    StoreError, UserId,
};

#[derive(Clone, Default)]
pub struct MemoryChallengeStore {
    challenges: Arc<RwLock<HashMap<String, Challenge>>>,
}

impl MemoryChallengeStore {
    pub async fn len(&self) -> usize {
        self.challenges.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.challenges.read().await.is_empty()
    }

    pub async fn contains(&self, id: &str) -> bool {
        self.challenges.read().await.contains_key(id)
    }
}

#[async_trait]
impl ChallengeStore for MemoryChallengeStore {
    async fn insert(&self, challenge: &Challenge) -> Result<(), StoreError> {
        let mut challenges = self.challenges.write().await;
        if challenges.contains_key(&challenge.id) {
            return Err(StoreError::Duplicate);
        }
        challenges.insert(challenge.id.clone(), challenge.clone());
        Ok(())
    }

    async fn take(&self, id: &str) -> Result<Option<Challenge>, StoreError> {
        Ok(self.challenges.write().await.remove(id))
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut challenges = self.challenges.write().await;
        let before = challenges.len();
        challenges.retain(|_, c| c.expires > now);
        Ok((before - challenges.len()) as u64)
    }
}

#[derive(Clone, Default)]
pub struct MemoryCredentialStore {
    records: Arc<RwLock<HashMap<Vec<u8>, CredentialRecord>>>,
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn find(&self, credential_id: &[u8]) -> Result<Option<CredentialRecord>, StoreError> {
        Ok(self.records.read().await.get(credential_id).cloned())
    }

    async fn list_for_user(&self, user_id: UserId) -> Result<Vec<CredentialRecord>, StoreError> {
        let records = self.records.read().await;
        let mut owned: Vec<_> = records
            .values()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect();
        owned.sort_by_key(|r| r.created_at);
        Ok(owned)
    }

    async fn create(&self, record: &CredentialRecord) -> Result<(), StoreError> {
        let mut records = self.records.write().await;
        if records.contains_key(&record.credential_id) {
            return Err(StoreError::Duplicate);
        }
        records.insert(record.credential_id.clone(), record.clone());
        Ok(())
    }

    async fn record_use(
        &self,
        credential_id: &[u8],
        usage: &CredentialUse,
    ) -> Result<(), StoreError> {
        let mut records = self.records.write().await;
        let record = records.get_mut(credential_id).ok_or(StoreError::NotFound)?;
        record.apply(usage);
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct MemoryDirectory {
    identities: Arc<RwLock<HashMap<Vec<u8>, Identity>>>,
}

impl MemoryDirectory {
    pub async fn insert(&self, identity: Identity) {
        self.identities
            .write()
            .await
            .insert(identity.user_handle.clone(), identity);
    }
}

#[async_trait]
impl IdentityDirectory for MemoryDirectory {
    async fn find_by_handle(&self, user_handle: &[u8]) -> Result<Option<Identity>, StoreError> {
        Ok(self.identities.read().await.get(user_handle).cloned())
    }
}
