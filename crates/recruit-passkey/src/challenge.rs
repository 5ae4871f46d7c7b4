use chrono::{DateTime, Duration, Utc};
use rand::{rngs::OsRng, RngCore};
use subtle::ConstantTimeEq;
use uuid::Uuid;

use crate::store::{ChallengeStore, StoreError};

/// Random bytes per challenge.
pub const CHALLENGE_LEN: usize = 64;

/// A single-use ceremony challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Challenge {
    pub id: String,
    pub challenge: Vec<u8>,
    pub expires: DateTime<Utc>,
    /// The only credential that may answer this challenge, for ceremonies
    /// that send a one-entry allow list.
    pub allowed_credential: Option<Vec<u8>>,
}

impl Challenge {
    pub fn generate(ttl: Duration) -> Self {
        let mut challenge = vec![0u8; CHALLENGE_LEN];
        OsRng.fill_bytes(&mut challenge);
        Self {
            id: Uuid::new_v4().to_string(),
            challenge,
            expires: Utc::now() + ttl,
            allowed_credential: None,
        }
    }

    pub fn bound_to(mut self, credential_id: impl Into<Vec<u8>>) -> Self {
        self.allowed_credential = Some(credential_id.into());
        self
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires
    }
}

/// Issues and redeems challenges on top of a [`ChallengeStore`].
pub struct Challenges<S> {
    store: S,
}

impl<S: ChallengeStore> Challenges<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub async fn issue(&self, ttl: Duration) -> Result<Challenge, StoreError> {
        self.insert(Challenge::generate(ttl)).await
    }

    /// Issues a challenge that only `credential_id` may answer.
    pub async fn issue_bound(
        &self,
        ttl: Duration,
        credential_id: &[u8],
    ) -> Result<Challenge, StoreError> {
        self.insert(Challenge::generate(ttl).bound_to(credential_id))
            .await
    }

    async fn insert(&self, challenge: Challenge) -> Result<Challenge, StoreError> {
        self.store.insert(&challenge).await?;
        Ok(challenge)
    }

    /// Consumes the challenge `id` and returns it if `presented` matched.
    ///
    /// The row is gone after this call whatever the outcome, so a failed
    /// comparison can never be retried.
    pub async fn redeem(
        &self,
        id: &str,
        presented: &[u8],
    ) -> Result<Option<Challenge>, StoreError> {
        let Some(challenge) = self.store.take(id).await? else {
            log::debug!("Challenge {id} is unknown or already redeemed");
            return Ok(None);
        };

        if challenge.is_expired_at(Utc::now()) {
            log::debug!("Challenge {id} expired at {}", challenge.expires);
            return Ok(None);
        }

        if bool::from(challenge.challenge.ct_eq(presented)) {
            Ok(Some(challenge))
        } else {
            Ok(None)
        }
    }

    /// Removes expired challenges.
    pub async fn sweep(&self) -> Result<u64, StoreError> {
        self.store.delete_expired(Utc::now()).await
    }
}
