//! Software authenticator and engine fixtures shared by the integration tests.

#![allow(dead_code)]

use std::collections::BTreeMap;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD as B64URL, Engine as _};
use p256::elliptic_curve::sec1::ToEncodedPoint;
use rand::{rngs::OsRng, RngCore};
use serde_cbor_2::Value;
use sha2::{Digest, Sha256};

use recruit_passkey::authenticator_data::Flags;
use recruit_passkey::cose::{CoseAlgorithm, CoseKey, Curve, Ec2Key, OkpKey};
use recruit_passkey::memory::{MemoryChallengeStore, MemoryCredentialStore, MemoryDirectory};
use recruit_passkey::{
    AuthenticationResponse, CreationOptions, EngineSettings, Identity, PasskeyEngine,
    RegistrationResponse, RelyingParty, RequestOptions,
};

pub const LOCAL_ORIGIN: &str = "http://localhost:3000";
pub const PRODUCTION_ORIGIN: &str = "https://jobs.example.com";
pub const PRODUCTION_RP_ID: &str = "jobs.example.com";

pub const UP_UV: u8 = Flags::USER_PRESENT | Flags::USER_VERIFIED;

pub type Engine = PasskeyEngine<MemoryChallengeStore, MemoryCredentialStore, MemoryDirectory>;

pub struct Harness {
    pub engine: Engine,
    pub challenges: MemoryChallengeStore,
    pub credentials: MemoryCredentialStore,
    pub directory: MemoryDirectory,
}

pub fn relying_party() -> RelyingParty {
    RelyingParty::new(
        "Recruit",
        "localhost",
        LOCAL_ORIGIN,
        PRODUCTION_RP_ID,
        PRODUCTION_ORIGIN,
    )
}

pub fn alice() -> Identity {
    Identity {
        user_id: 1,
        user_handle: b"alice-handle".to_vec(),
        name: "alice@example.com".to_string(),
        display_name: "Alice".to_string(),
    }
}

pub fn bob() -> Identity {
    Identity {
        user_id: 2,
        user_handle: b"bob-handle".to_vec(),
        name: "bob@example.com".to_string(),
        display_name: "Bob".to_string(),
    }
}

pub async fn harness(settings: EngineSettings) -> Harness {
    let challenges = MemoryChallengeStore::default();
    let credentials = MemoryCredentialStore::default();
    let directory = MemoryDirectory::default();
    directory.insert(alice()).await;
    directory.insert(bob()).await;

    Harness {
        engine: PasskeyEngine::new(
            relying_party(),
            settings,
            challenges.clone(),
            credentials.clone(),
            directory.clone(),
        ),
        challenges,
        credentials,
        directory,
    }
}

pub fn client_data(ty: &str, challenge: &[u8], origin: &str) -> Vec<u8> {
    serde_json::json!({
        "type": ty,
        "challenge": B64URL.encode(challenge),
        "origin": origin,
        "crossOrigin": false,
    })
    .to_string()
    .into_bytes()
}

pub fn attestation_object(fmt: &str, auth_data: &[u8]) -> Vec<u8> {
    let mut map = BTreeMap::new();
    map.insert(Value::Text("fmt".into()), Value::Text(fmt.into()));
    map.insert(Value::Text("attStmt".into()), Value::Map(BTreeMap::new()));
    map.insert(Value::Text("authData".into()), Value::Bytes(auth_data.to_vec()));
    serde_cbor_2::to_vec(&Value::Map(map)).unwrap()
}

pub enum SoftKey {
    P256(p256::ecdsa::SigningKey),
    Ed25519(ed25519_dalek::SigningKey),
}

/// A software passkey that produces the same bytes a platform authenticator
/// would.
pub struct SoftAuthenticator {
    pub credential_id: Vec<u8>,
    pub key: SoftKey,
    pub sign_count: u32,
    pub flags: u8,
    pub rp_id: String,
    pub user_handle: Option<Vec<u8>>,
    /// Written into the COSE key's `alg` label in place of the key's own.
    pub algorithm_override: Option<i64>,
}

impl SoftAuthenticator {
    pub fn p256(rp_id: &str) -> Self {
        Self::new(rp_id, SoftKey::P256(p256::ecdsa::SigningKey::random(&mut OsRng)))
    }

    pub fn ed25519(rp_id: &str) -> Self {
        let mut seed = [0u8; 32];
        OsRng.fill_bytes(&mut seed);
        Self::new(
            rp_id,
            SoftKey::Ed25519(ed25519_dalek::SigningKey::from_bytes(&seed)),
        )
    }

    fn new(rp_id: &str, key: SoftKey) -> Self {
        let mut credential_id = vec![0u8; 32];
        OsRng.fill_bytes(&mut credential_id);
        Self {
            credential_id,
            key,
            sign_count: 0,
            flags: UP_UV,
            rp_id: rp_id.to_string(),
            user_handle: None,
            algorithm_override: None,
        }
    }

    pub fn cose_key(&self) -> Vec<u8> {
        let key = match &self.key {
            SoftKey::P256(sk) => {
                let point = p256::PublicKey::from(sk.verifying_key()).to_encoded_point(false);
                CoseKey::Ec2(Ec2Key {
                    alg: CoseAlgorithm::Es256,
                    crv: Curve::P256,
                    x: point.x().unwrap().to_vec(),
                    y: point.y().unwrap().to_vec(),
                    d: None,
                })
            }
            SoftKey::Ed25519(sk) => CoseKey::Okp(OkpKey {
                alg: CoseAlgorithm::EdDsa,
                crv: Curve::Ed25519,
                x: sk.verifying_key().to_bytes().to_vec(),
                d: None,
            }),
        };
        let raw = key.to_cbor().unwrap();
        let Some(alg) = self.algorithm_override else {
            return raw;
        };
        let Value::Map(mut map) = serde_cbor_2::from_slice(&raw).unwrap() else {
            panic!("COSE key is not a map");
        };
        map.insert(Value::Integer(3), Value::Integer(alg.into()));
        serde_cbor_2::to_vec(&Value::Map(map)).unwrap()
    }

    pub fn auth_data_header(&self, flags: u8) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&Sha256::digest(self.rp_id.as_bytes()));
        out.push(flags);
        out.extend_from_slice(&self.sign_count.to_be_bytes());
        out
    }

    pub fn attested_auth_data(&self) -> Vec<u8> {
        let mut out = self.auth_data_header(self.flags | Flags::ATTESTED_CREDENTIAL_DATA);
        out.extend_from_slice(&[0u8; 16]);
        out.extend_from_slice(&(self.credential_id.len() as u16).to_be_bytes());
        out.extend_from_slice(&self.credential_id);
        out.extend_from_slice(&self.cose_key());
        out
    }

    pub fn register(&self, options: &CreationOptions, origin: &str) -> RegistrationResponse {
        RegistrationResponse {
            challenge_id: options.challenge_id.clone(),
            credential_id: self.credential_id.clone(),
            client_data_json: client_data("webauthn.create", &options.public_key.challenge, origin),
            attestation_object: attestation_object("none", &self.attested_auth_data()),
            transports: vec!["internal".to_string()],
            nickname: Some("Laptop".to_string()),
        }
    }

    pub fn sign(&self, message: &[u8]) -> Vec<u8> {
        match &self.key {
            SoftKey::P256(sk) => {
                use p256::ecdsa::signature::Signer;
                let sig: p256::ecdsa::Signature = sk.sign(message);
                sig.to_der().as_bytes().to_vec()
            }
            SoftKey::Ed25519(sk) => {
                use ed25519_dalek::Signer;
                sk.sign(message).to_bytes().to_vec()
            }
        }
    }

    /// Produces an assertion for `options`, bumping the counter first.
    pub fn assert(&mut self, options: &RequestOptions, origin: &str) -> AuthenticationResponse {
        self.sign_count += 1;
        self.assert_with_counter(options, origin)
    }

    pub fn assert_with_counter(
        &self,
        options: &RequestOptions,
        origin: &str,
    ) -> AuthenticationResponse {
        let authenticator_data = self.auth_data_header(self.flags);
        let client_data_json =
            client_data("webauthn.get", &options.public_key.challenge, origin);

        let mut signed = authenticator_data.clone();
        signed.extend_from_slice(&Sha256::digest(&client_data_json));

        AuthenticationResponse {
            challenge_id: options.challenge_id.clone(),
            credential_id: self.credential_id.clone(),
            client_data_json,
            signature: self.sign(&signed),
            authenticator_data,
            user_handle: self.user_handle.clone(),
        }
    }
}
