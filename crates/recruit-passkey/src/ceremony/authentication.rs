use chrono::Utc;

use crate::authenticator_data::AuthenticatorData;
use crate::challenge::Challenge;
use crate::client_data::ClientDataType;
use crate::cose;
use crate::error::{AuthenticationError, CeremonyError};
use crate::options::{
    AuthenticationResponse, PublicKeyCredentialDescriptor, PublicKeyCredentialRequestOptions,
    RequestOptions,
};
use crate::store::{
    ChallengeStore, CredentialRecord, CredentialStore, CredentialUse, Identity, IdentityDirectory,
};
use crate::verify::{self, VerificationKey};

use super::{CounterPolicy, PasskeyEngine};

/// Outcome of a successful assertion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Authenticated {
    pub user_id: crate::store::UserId,
    /// The credential as stored after this use.
    pub credential: CredentialRecord,
    /// Set when the counter did not advance and the policy let it through.
    pub counter_regressed: bool,
}

/// Who may use the asserted credential.
#[derive(Clone, Copy)]
enum Scope<'a> {
    /// Discoverable login; any owner.
    AnyOwner,
    /// Test ceremony; only the signed-in caller's credential.
    Caller(&'a Identity),
}

impl<C, S, D> PasskeyEngine<C, S, D>
where
    C: ChallengeStore,
    S: CredentialStore,
    D: IdentityDirectory,
{
    /// Issues request options for a discoverable-credential login.
    pub async fn start_login(
        &self,
        declared_origin: &str,
    ) -> Result<RequestOptions, AuthenticationError> {
        let challenge = self.challenges.issue(self.settings.challenge_ttl).await?;
        Ok(self.request_options(declared_origin, challenge, None))
    }

    pub async fn finish_login(
        &self,
        declared_origin: &str,
        response: &AuthenticationResponse,
    ) -> Result<Authenticated, AuthenticationError> {
        self.finish_assertion(Scope::AnyOwner, declared_origin, response)
            .await
    }

    /// Issues request options that allow only `credential_id`, which must
    /// belong to `caller`.
    pub async fn start_test(
        &self,
        caller: Option<&Identity>,
        declared_origin: &str,
        credential_id: &[u8],
    ) -> Result<RequestOptions, AuthenticationError> {
        let caller = caller.ok_or(CeremonyError::Unauthorized)?;

        let record = self
            .credentials
            .find(credential_id)
            .await?
            .filter(|r| r.user_id == caller.user_id)
            .ok_or(AuthenticationError::PasskeyNotFound)?;

        let challenge = self
            .challenges
            .issue_bound(self.settings.challenge_ttl, &record.credential_id)
            .await?;
        let allow = PublicKeyCredentialDescriptor::new(record.credential_id, &record.transports);
        Ok(self.request_options(declared_origin, challenge, Some(vec![allow])))
    }

    /// Confirms a credential the caller just registered actually signs. Only
    /// the credential named in `start_test` may answer.
    pub async fn finish_test(
        &self,
        caller: Option<&Identity>,
        declared_origin: &str,
        response: &AuthenticationResponse,
    ) -> Result<Authenticated, AuthenticationError> {
        let caller = caller.ok_or(CeremonyError::Unauthorized)?;
        self.finish_assertion(Scope::Caller(caller), declared_origin, response)
            .await
    }

    fn request_options(
        &self,
        declared_origin: &str,
        challenge: Challenge,
        allow_credentials: Option<Vec<PublicKeyCredentialDescriptor>>,
    ) -> RequestOptions {
        RequestOptions {
            challenge_id: challenge.id,
            public_key: PublicKeyCredentialRequestOptions {
                challenge: challenge.challenge,
                timeout: self.settings.timeout_ms,
                rp_id: self.rp.rp_id_for(declared_origin).to_string(),
                allow_credentials,
                user_verification: "required".to_string(),
            },
        }
    }

    async fn finish_assertion(
        &self,
        scope: Scope<'_>,
        declared_origin: &str,
        response: &AuthenticationResponse,
    ) -> Result<Authenticated, AuthenticationError> {
        let (_, challenge) = self
            .check_client_data(
                ClientDataType::Get,
                &response.challenge_id,
                &response.client_data_json,
            )
            .await?;

        match (&challenge.allowed_credential, scope) {
            (Some(allowed), _) if *allowed != response.credential_id => {
                return Err(CeremonyError::invalid(
                    "credential was not offered for this challenge",
                )
                .into());
            }
            (None, Scope::Caller(_)) => {
                return Err(CeremonyError::invalid(
                    "challenge was not issued for a passkey test",
                )
                .into());
            }
            _ => {}
        }

        let auth_data =
            AuthenticatorData::parse(&response.authenticator_data).map_err(CeremonyError::from)?;
        self.check_authenticator_data(declared_origin, &auth_data)?;

        let mut record = self
            .credentials
            .find(&response.credential_id)
            .await?
            .ok_or(AuthenticationError::PasskeyNotFound)?;

        if let Scope::Caller(caller) = scope {
            if record.user_id != caller.user_id {
                return Err(AuthenticationError::PasskeyNotFound);
            }
        }

        if let Some(handle) = response.user_handle.as_deref() {
            let owner = self
                .directory
                .find_by_handle(handle)
                .await?
                .ok_or(AuthenticationError::PasskeyNotFound)?;
            if owner.user_id != record.user_id {
                return Err(
                    CeremonyError::invalid("user handle does not own this credential").into(),
                );
            }
        }

        let key = cose::decode(&record.public_key)
            .ok()
            .filter(|key| key.algorithm() == record.algorithm)
            .and_then(|key| VerificationKey::from_cose(&key).ok())
            .ok_or_else(|| {
                log::error!(
                    "Stored public key for user {} cannot be used for {:?}",
                    record.user_id,
                    record.algorithm
                );
                CeremonyError::ServerError("stored public key is unusable".to_string())
            })?;

        if !verify::verify(
            &key,
            &response.authenticator_data,
            &response.client_data_json,
            &response.signature,
        ) {
            return Err(AuthenticationError::VerificationFailed);
        }

        let counter_regressed = counter_regressed(record.sign_count, auth_data.sign_count);
        if counter_regressed {
            log::warn!(
                "Signature counter for user {} did not advance (stored {}, presented {})",
                record.user_id,
                record.sign_count,
                auth_data.sign_count
            );
            if self.settings.counter_policy == CounterPolicy::Reject {
                return Err(AuthenticationError::VerificationFailed);
            }
        }

        let usage = CredentialUse {
            sign_count: auth_data.sign_count,
            uv_initialized: record.uv_initialized || auth_data.flags.user_verified(),
            backup_state: auth_data.flags.backup_state(),
            used_at: Utc::now(),
        };
        self.credentials
            .record_use(&record.credential_id, &usage)
            .await?;
        record.apply(&usage);

        log::info!("Passkey assertion verified for user {}", record.user_id);

        Ok(Authenticated {
            user_id: record.user_id,
            credential: record,
            counter_regressed,
        })
    }
}

/// Authenticators without a counter always report zero; that is not a clone.
fn counter_regressed(stored: u32, presented: u32) -> bool {
    presented <= stored && !(stored == 0 && presented == 0)
}

#[cfg(test)]
mod tests {
    use super::counter_regressed;

    #[test]
    fn test_counter_regression() {
        assert!(!counter_regressed(0, 0));
        assert!(!counter_regressed(0, 1));
        assert!(!counter_regressed(5, 6));
        assert!(counter_regressed(5, 5));
        assert!(counter_regressed(5, 4));
        assert!(counter_regressed(5, 0));
    }
}
