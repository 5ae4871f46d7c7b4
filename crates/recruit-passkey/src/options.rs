//! JSON shapes exchanged with the browser.
//!
//! Binary fields are plain `Vec<u8>`, which serde renders as arrays of byte
//! values; the front end rebuilds `ArrayBuffer`s from those arrays.

use serde::{Deserialize, Serialize};

use crate::cose::CoseAlgorithm;

pub const DEFAULT_TIMEOUT_MS: u32 = 60_000;

pub const PUBLIC_KEY_TYPE: &str = "public-key";

/// Algorithms offered at registration, in preference order.
pub const OFFERED_ALGORITHMS: [CoseAlgorithm; 3] = [
    CoseAlgorithm::Es256,
    CoseAlgorithm::EdDsa,
    CoseAlgorithm::Rs256,
];

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CreationOptions {
    #[serde(rename = "challengeId")]
    pub challenge_id: String,

    #[serde(rename = "publicKey")]
    pub public_key: PublicKeyCredentialCreationOptions,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RequestOptions {
    #[serde(rename = "challengeId")]
    pub challenge_id: String,

    #[serde(rename = "publicKey")]
    pub public_key: PublicKeyCredentialRequestOptions,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PublicKeyCredentialCreationOptions {
    pub rp: RelyingPartyEntity,
    pub user: PublicKeyCredentialUserEntity,
    pub challenge: Vec<u8>,

    #[serde(rename = "pubKeyCredParams")]
    pub pub_key_cred_params: Vec<PubKeyCredParam>,

    pub timeout: u32,

    pub attestation: String,

    #[serde(rename = "authenticatorSelection")]
    pub authenticator_selection: AuthenticatorSelectionCriteria,

    #[serde(rename = "excludeCredentials")]
    pub exclude_credentials: Vec<PublicKeyCredentialDescriptor>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PublicKeyCredentialRequestOptions {
    pub challenge: Vec<u8>,

    pub timeout: u32,

    #[serde(rename = "rpId")]
    pub rp_id: String,

    #[serde(rename = "allowCredentials")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allow_credentials: Option<Vec<PublicKeyCredentialDescriptor>>,

    #[serde(rename = "userVerification")]
    pub user_verification: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RelyingPartyEntity {
    pub id: String,
    pub name: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PublicKeyCredentialUserEntity {
    pub id: Vec<u8>,
    pub name: String,

    #[serde(rename = "displayName")]
    pub display_name: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PubKeyCredParam {
    #[serde(rename = "type")]
    pub type_: String,
    pub alg: CoseAlgorithm,
}

impl From<CoseAlgorithm> for PubKeyCredParam {
    fn from(alg: CoseAlgorithm) -> Self {
        Self {
            type_: PUBLIC_KEY_TYPE.to_string(),
            alg,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PublicKeyCredentialDescriptor {
    #[serde(rename = "type")]
    pub type_: String,
    pub id: Vec<u8>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub transports: Option<Vec<String>>,
}

impl PublicKeyCredentialDescriptor {
    pub fn new(id: Vec<u8>, transports: &[String]) -> Self {
        Self {
            type_: PUBLIC_KEY_TYPE.to_string(),
            id,
            transports: (!transports.is_empty()).then(|| transports.to_vec()),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuthenticatorSelectionCriteria {
    #[serde(rename = "residentKey")]
    pub resident_key: String,

    #[serde(rename = "requireResidentKey")]
    pub require_resident_key: bool,

    #[serde(rename = "userVerification")]
    pub user_verification: String,
}

impl AuthenticatorSelectionCriteria {
    /// Discoverable credential with user verification.
    pub fn passkey() -> Self {
        Self {
            resident_key: "required".to_string(),
            require_resident_key: true,
            user_verification: "required".to_string(),
        }
    }
}

/// Browser output of `navigator.credentials.create()`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RegistrationResponse {
    #[serde(rename = "challengeId")]
    pub challenge_id: String,

    #[serde(rename = "credentialId")]
    pub credential_id: Vec<u8>,

    #[serde(rename = "clientDataJSON")]
    pub client_data_json: Vec<u8>,

    #[serde(rename = "attestationObject")]
    pub attestation_object: Vec<u8>,

    #[serde(default)]
    pub transports: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nickname: Option<String>,
}

/// Browser output of `navigator.credentials.get()`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuthenticationResponse {
    #[serde(rename = "challengeId")]
    pub challenge_id: String,

    #[serde(rename = "credentialId")]
    pub credential_id: Vec<u8>,

    #[serde(rename = "clientDataJSON")]
    pub client_data_json: Vec<u8>,

    #[serde(rename = "authenticatorData")]
    pub authenticator_data: Vec<u8>,

    pub signature: Vec<u8>,

    #[serde(rename = "userHandle", default, skip_serializing_if = "Option::is_none")]
    pub user_handle: Option<Vec<u8>>,
}
