//! Assertion signature verification.
//!
//! Every algorithm signs `authenticatorData || SHA-256(clientDataJSON)`. A
//! signature that does not match is an ordinary outcome and is reported as
//! `false`; only an unusable key is an error, and that is raised while building
//! the [`VerificationKey`], before any signature is looked at.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD as B64URL, Engine};
use p256::ecdsa::signature::Verifier as _;
use rsa::{BigUint, RsaPublicKey};
use sha2::{Digest, Sha256};

use crate::cose::{CoseAlgorithm, CoseError, CoseKey, Curve, Jwk};

/// Length of a raw P-256 `r || s` signature.
pub const P256_RAW_SIGNATURE_LEN: usize = 64;
const P256_SCALAR_LEN: usize = 32;

pub enum VerificationKey {
    Es256(p256::ecdsa::VerifyingKey),
    EdDsa(ed25519_dalek::VerifyingKey),
    Rs256(rsa::pkcs1v15::VerifyingKey<Sha256>),
    Ps256(rsa::pss::VerifyingKey<Sha256>),
}

impl std::fmt::Debug for VerificationKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("VerificationKey")
            .field(&self.algorithm())
            .finish()
    }
}

impl VerificationKey {
    pub fn algorithm(&self) -> CoseAlgorithm {
        match self {
            VerificationKey::Es256(_) => CoseAlgorithm::Es256,
            VerificationKey::EdDsa(_) => CoseAlgorithm::EdDsa,
            VerificationKey::Rs256(_) => CoseAlgorithm::Rs256,
            VerificationKey::Ps256(_) => CoseAlgorithm::Ps256,
        }
    }

    pub fn from_cose(key: &CoseKey) -> Result<Self, CoseError> {
        Self::from_jwk(key.algorithm(), &key.to_jwk())
    }

    /// Builds verifiable key material for `alg` out of a JWK.
    pub fn from_jwk(alg: CoseAlgorithm, jwk: &Jwk) -> Result<Self, CoseError> {
        match (alg, jwk) {
            (CoseAlgorithm::Es256, Jwk::Ec { x, y, .. }) => {
                if jwk.curve() != Some(Curve::P256) {
                    return Err(CoseError::InvalidKey("ES256 requires a P-256 key"));
                }
                let x = b64_field(x)?;
                let y = b64_field(y)?;

                let mut sec1 = Vec::with_capacity(1 + x.len() + y.len());
                sec1.push(0x04);
                sec1.extend_from_slice(&x);
                sec1.extend_from_slice(&y);

                p256::ecdsa::VerifyingKey::from_sec1_bytes(&sec1)
                    .map(VerificationKey::Es256)
                    .map_err(|_| CoseError::InvalidKey("P-256 point is not on the curve"))
            }
            (CoseAlgorithm::EdDsa, Jwk::Okp { x, .. }) => {
                if jwk.curve() != Some(Curve::Ed25519) {
                    return Err(CoseError::InvalidKey("EdDSA requires an Ed25519 key"));
                }
                let x: [u8; 32] = b64_field(x)?
                    .try_into()
                    .map_err(|_| CoseError::InvalidKey("Ed25519 public key must be 32 bytes"))?;
                ed25519_dalek::VerifyingKey::from_bytes(&x)
                    .map(VerificationKey::EdDsa)
                    .map_err(|_| CoseError::InvalidKey("invalid Ed25519 public key"))
            }
            (CoseAlgorithm::Rs256, Jwk::Rsa { n, e }) => {
                let key = rsa_public_key(n, e)?;
                Ok(VerificationKey::Rs256(
                    rsa::pkcs1v15::VerifyingKey::<Sha256>::new(key),
                ))
            }
            (CoseAlgorithm::Ps256, Jwk::Rsa { n, e }) => {
                let key = rsa_public_key(n, e)?;
                Ok(VerificationKey::Ps256(rsa::pss::VerifyingKey::<Sha256>::new(
                    key,
                )))
            }
            _ => Err(CoseError::InvalidKey("key family does not match algorithm")),
        }
    }
}

fn b64_field(value: &str) -> Result<Vec<u8>, CoseError> {
    B64URL
        .decode(value)
        .map_err(|_| CoseError::InvalidKey("JWK field is not base64url"))
}

fn rsa_public_key(n: &str, e: &str) -> Result<RsaPublicKey, CoseError> {
    let n = BigUint::from_bytes_be(&b64_field(n)?);
    let e = BigUint::from_bytes_be(&b64_field(e)?);
    RsaPublicKey::new(n, e).map_err(|_| CoseError::InvalidKey("invalid RSA public key"))
}

/// `authenticatorData || SHA-256(clientDataJSON)`.
pub fn verification_input(authenticator_data: &[u8], client_data_json: &[u8]) -> Vec<u8> {
    let client_data_hash = Sha256::digest(client_data_json);
    let mut signed = Vec::with_capacity(authenticator_data.len() + client_data_hash.len());
    signed.extend_from_slice(authenticator_data);
    signed.extend_from_slice(&client_data_hash);
    signed
}

/// Checks an assertion signature.
pub fn verify(
    key: &VerificationKey,
    authenticator_data: &[u8],
    client_data_json: &[u8],
    signature: &[u8],
) -> bool {
    let message = verification_input(authenticator_data, client_data_json);

    match key {
        VerificationKey::Es256(vk) => {
            let Some(raw) = der_to_raw_signature(signature) else {
                log::debug!("ES256 signature is not a valid DER sequence");
                return false;
            };
            match p256::ecdsa::Signature::from_slice(&raw) {
                Ok(sig) => vk.verify(&message, &sig).is_ok(),
                Err(_) => false,
            }
        }
        VerificationKey::EdDsa(vk) => match ed25519_dalek::Signature::from_slice(signature) {
            Ok(sig) => vk.verify(&message, &sig).is_ok(),
            Err(_) => false,
        },
        VerificationKey::Rs256(vk) => match rsa::pkcs1v15::Signature::try_from(signature) {
            Ok(sig) => vk.verify(&message, &sig).is_ok(),
            Err(_) => false,
        },
        VerificationKey::Ps256(vk) => match rsa::pss::Signature::try_from(signature) {
            Ok(sig) => vk.verify(&message, &sig).is_ok(),
            Err(_) => false,
        },
    }
}

/// Converts a DER `ECDSA-Sig-Value` (`SEQUENCE { r INTEGER, s INTEGER }`) into
/// the fixed 64-byte `r || s` form.
///
/// DER integers are minimal and signed: a scalar whose top bit is set carries a
/// leading `0x00`, and a small scalar is shorter than 32 bytes. Both cases are
/// normalized here; returns `None` for anything that is not a well-formed
/// P-256 signature.
pub fn der_to_raw_signature(der: &[u8]) -> Option<[u8; P256_RAW_SIGNATURE_LEN]> {
    let (&tag, rest) = der.split_first()?;
    if tag != 0x30 {
        return None;
    }
    let (len, body) = read_der_length(rest)?;
    if body.len() != len {
        return None;
    }

    let (r, body) = read_der_integer(body)?;
    let (s, body) = read_der_integer(body)?;
    if !body.is_empty() {
        return None;
    }

    let mut raw = [0u8; P256_RAW_SIGNATURE_LEN];
    copy_scalar(r, &mut raw[..P256_SCALAR_LEN])?;
    copy_scalar(s, &mut raw[P256_SCALAR_LEN..])?;
    Some(raw)
}

fn read_der_length(input: &[u8]) -> Option<(usize, &[u8])> {
    let (&first, rest) = input.split_first()?;
    match first {
        0x00..=0x7f => Some((first as usize, rest)),
        0x81 => {
            let (&len, rest) = rest.split_first()?;
            Some((len as usize, rest))
        }
        _ => None,
    }
}

fn read_der_integer(input: &[u8]) -> Option<(&[u8], &[u8])> {
    let (&tag, rest) = input.split_first()?;
    if tag != 0x02 {
        return None;
    }
    let (len, rest) = read_der_length(rest)?;
    if len == 0 || rest.len() < len {
        return None;
    }
    Some(rest.split_at(len))
}

fn copy_scalar(value: &[u8], out: &mut [u8]) -> Option<()> {
    let start = value.iter().position(|&b| b != 0).unwrap_or(value.len());
    let value = &value[start..];
    if value.len() > out.len() {
        return None;
    }
    let offset = out.len() - value.len();
    out[offset..].copy_from_slice(value);
    Some(())
}
