//! Ceremony orchestration.
//!
//! Each ceremony is split into a `start_*` call that issues a challenge and a
//! `finish_*` call that redeems it. Nothing is held between the two except the
//! challenge row, so the client round-trip can take as long as it likes; expiry
//! is enforced when the challenge is redeemed.

mod authentication;
mod registration;

pub use authentication::Authenticated;

use chrono::Duration;

use crate::attestation::AttestationPolicy;
use crate::authenticator_data::AuthenticatorData;
use crate::challenge::{Challenge, Challenges};
use crate::client_data::{ClientData, ClientDataType};
use crate::error::CeremonyError;
use crate::options::DEFAULT_TIMEOUT_MS;
use crate::rp::{rp_id_hash, RelyingParty};
use crate::store::{ChallengeStore, CredentialStore, IdentityDirectory};

pub const DEFAULT_CHALLENGE_TTL_SECS: i64 = 300;

/// What to do when a signature counter fails to advance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CounterPolicy {
    /// Log and let the login through.
    #[default]
    Warn,
    /// Log and fail with `VerificationFailed`.
    Reject,
}

#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub timeout_ms: u32,
    pub challenge_ttl: Duration,
    pub counter_policy: CounterPolicy,
    pub attestation_policy: AttestationPolicy,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_TIMEOUT_MS,
            challenge_ttl: Duration::seconds(DEFAULT_CHALLENGE_TTL_SECS),
            counter_policy: CounterPolicy::default(),
            attestation_policy: AttestationPolicy::default(),
        }
    }
}

/// Relying-party ceremony engine.
pub struct PasskeyEngine<C, S, D> {
    rp: RelyingParty,
    settings: EngineSettings,
    challenges: Challenges<C>,
    credentials: S,
    directory: D,
}

impl<C, S, D> PasskeyEngine<C, S, D>
where
    C: ChallengeStore,
    S: CredentialStore,
    D: IdentityDirectory,
{
    pub fn new(
        rp: RelyingParty,
        settings: EngineSettings,
        challenge_store: C,
        credentials: S,
        directory: D,
    ) -> Self {
        Self {
            rp,
            settings,
            challenges: Challenges::new(challenge_store),
            credentials,
            directory,
        }
    }

    pub fn relying_party(&self) -> &RelyingParty {
        &self.rp
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn challenges(&self) -> &Challenges<C> {
        &self.challenges
    }

    pub fn credentials(&self) -> &S {
        &self.credentials
    }

    /// Client-data checks common to every finish step. Returns the parsed
    /// client data and the redeemed challenge.
    ///
    /// The challenge named by `challenge_id` is consumed before anything else
    /// can fail, so a rejected response never leaves a redeemable challenge
    /// behind.
    async fn check_client_data(
        &self,
        expected: ClientDataType,
        challenge_id: &str,
        client_data_json: &[u8],
    ) -> Result<(ClientData, Challenge), CeremonyError> {
        let parsed = ClientData::parse(client_data_json);
        let presented = parsed
            .as_ref()
            .ok()
            .and_then(ClientData::challenge_bytes)
            .unwrap_or_default();
        let redeemed = self.challenges.redeem(challenge_id, &presented).await?;

        let client_data = parsed
            .map_err(|e| CeremonyError::invalid(format!("malformed clientDataJSON: {e}")))?;

        if !client_data.is_type(expected) {
            return Err(CeremonyError::invalid(format!(
                "clientDataJSON type is {:?}, expected {:?}",
                client_data.ty,
                expected.as_str()
            )));
        }

        let Some(challenge) = redeemed else {
            return Err(CeremonyError::ChallengeMismatch);
        };

        if !self.rp.is_accepted_origin(&client_data.origin) {
            return Err(CeremonyError::invalid(format!(
                "origin {:?} is not accepted",
                client_data.origin
            )));
        }

        if client_data.is_cross_origin() {
            return Err(CeremonyError::invalid("cross-origin ceremonies are not accepted"));
        }

        Ok((client_data, challenge))
    }

    /// RP id hash and flag checks common to registration and assertion.
    fn check_authenticator_data(
        &self,
        declared_origin: &str,
        auth_data: &AuthenticatorData,
    ) -> Result<(), CeremonyError> {
        let rp_id = self.rp.rp_id_for(declared_origin);
        if auth_data.rp_id_hash != rp_id_hash(rp_id) {
            return Err(CeremonyError::invalid(format!(
                "rpIdHash does not match {rp_id}"
            )));
        }

        let flags = auth_data.flags;
        if !flags.user_present() {
            return Err(CeremonyError::invalid("user presence flag not set"));
        }
        if !flags.user_verified() {
            return Err(CeremonyError::invalid("user verification flag not set"));
        }
        if flags.backup_state() && !flags.backup_eligible() {
            return Err(CeremonyError::invalid(
                "backup state set on a credential that is not backup eligible",
            ));
        }

        Ok(())
    }
}
