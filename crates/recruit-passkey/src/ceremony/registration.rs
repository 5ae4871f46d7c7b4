use chrono::Utc;

use crate::attestation::AttestationObject;
use crate::authenticator_data::AuthenticatorData;
use crate::client_data::ClientDataType;
use crate::cose::{self, CoseAlgorithm};
use crate::error::{CeremonyError, RegistrationError};
use crate::options::{
    AuthenticatorSelectionCriteria, CreationOptions, PubKeyCredParam,
    PublicKeyCredentialCreationOptions, PublicKeyCredentialDescriptor,
    PublicKeyCredentialUserEntity, RegistrationResponse, RelyingPartyEntity, OFFERED_ALGORITHMS,
};
use crate::store::{
    ChallengeStore, CredentialRecord, CredentialStore, Identity, IdentityDirectory,
    MAX_CREDENTIAL_ID_LEN,
};
use crate::verify::VerificationKey;

use super::PasskeyEngine;

impl<C, S, D> PasskeyEngine<C, S, D>
where
    C: ChallengeStore,
    S: CredentialStore,
    D: IdentityDirectory,
{
    /// Issues creation options for `caller`, excluding credentials they
    /// already own.
    pub async fn start_registration(
        &self,
        caller: Option<&Identity>,
        declared_origin: &str,
    ) -> Result<CreationOptions, RegistrationError> {
        let caller = caller.ok_or(CeremonyError::Unauthorized)?;

        let exclude_credentials = self
            .credentials
            .list_for_user(caller.user_id)
            .await?
            .into_iter()
            .map(|r| PublicKeyCredentialDescriptor::new(r.credential_id, &r.transports))
            .collect();

        let challenge = self.challenges.issue(self.settings.challenge_ttl).await?;

        Ok(CreationOptions {
            challenge_id: challenge.id,
            public_key: PublicKeyCredentialCreationOptions {
                rp: RelyingPartyEntity {
                    id: self.rp.rp_id_for(declared_origin).to_string(),
                    name: self.rp.name.clone(),
                },
                user: PublicKeyCredentialUserEntity {
                    id: caller.user_handle.clone(),
                    name: caller.name.clone(),
                    display_name: caller.display_name.clone(),
                },
                challenge: challenge.challenge,
                pub_key_cred_params: OFFERED_ALGORITHMS
                    .into_iter()
                    .map(PubKeyCredParam::from)
                    .collect(),
                timeout: self.settings.timeout_ms,
                attestation: "none".to_string(),
                authenticator_selection: AuthenticatorSelectionCriteria::passkey(),
                exclude_credentials,
            },
        })
    }

    /// Verifies a creation response and stores the new credential.
    ///
    /// The attestation statement is decoded but not trust-verified.
    pub async fn finish_registration(
        &self,
        caller: Option<&Identity>,
        declared_origin: &str,
        response: &RegistrationResponse,
    ) -> Result<CredentialRecord, RegistrationError> {
        // 1. Caller
        let caller = caller.ok_or(CeremonyError::Unauthorized)?;

        // 2. Client data and challenge
        self.check_client_data(
            ClientDataType::Create,
            &response.challenge_id,
            &response.client_data_json,
        )
        .await?;

        // 3. Attestation object
        let attestation = AttestationObject::decode(&response.attestation_object)
            .map_err(CeremonyError::from)?;
        if !self.settings.attestation_policy.allows(&attestation) {
            return Err(CeremonyError::UnsupportedDevice(format!(
                "attestation format {:?} is not accepted",
                attestation.fmt
            ))
            .into());
        }
        log::debug!(
            "Attestation format {:?} accepted without trust verification",
            attestation.fmt
        );

        // 4. Authenticator data
        let auth_data =
            AuthenticatorData::parse(&attestation.auth_data).map_err(CeremonyError::from)?;
        let attested = match (
            auth_data.flags.attested_credential_data(),
            auth_data.attested_credential_data.as_ref(),
        ) {
            (true, Some(attested)) => attested,
            _ => {
                return Err(CeremonyError::invalid("attested credential data missing").into());
            }
        };

        self.check_authenticator_data(declared_origin, &auth_data)?;

        // 5. Algorithm and key
        let algorithm = CoseAlgorithm::try_from(attested.algorithm)
            .ok()
            .filter(|alg| OFFERED_ALGORITHMS.contains(alg))
            .ok_or_else(|| {
                CeremonyError::UnsupportedDevice(format!(
                    "algorithm {} was not offered",
                    attested.algorithm
                ))
            })?;

        let key = cose::decode(&attested.credential_public_key).map_err(CeremonyError::from)?;
        if key.algorithm() != algorithm {
            return Err(CeremonyError::invalid("COSE key algorithm changed while decoding").into());
        }
        VerificationKey::from_cose(&key).map_err(CeremonyError::from)?;

        // 6. Credential id
        if attested.credential_id.len() > MAX_CREDENTIAL_ID_LEN {
            return Err(CeremonyError::invalid(format!(
                "credential id is {} bytes, limit is {MAX_CREDENTIAL_ID_LEN}",
                attested.credential_id.len()
            ))
            .into());
        }
        if attested.credential_id != response.credential_id {
            return Err(
                CeremonyError::invalid("credential id does not match attested credential").into(),
            );
        }

        // 7. Persist
        if self.credentials.find(&attested.credential_id).await?.is_some() {
            return Err(RegistrationError::PasskeyExists);
        }

        let record = CredentialRecord {
            credential_id: attested.credential_id.clone(),
            user_id: caller.user_id,
            public_key: attested.credential_public_key.clone(),
            algorithm,
            sign_count: auth_data.sign_count,
            transports: response.transports.clone(),
            backup_eligible: auth_data.flags.backup_eligible(),
            backup_state: auth_data.flags.backup_state(),
            uv_initialized: auth_data.flags.user_verified(),
            nickname: response.nickname.clone(),
            created_at: Utc::now(),
            last_used_at: None,
        };
        self.credentials.create(&record).await?;

        log::info!(
            "Registered {:?} passkey for user {}",
            record.algorithm,
            record.user_id
        );

        Ok(record)
    }
}
