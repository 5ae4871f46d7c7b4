//! COSE_Key decoding (RFC 9052 / RFC 9053 / RFC 8230).
//!
//! A credential public key arrives as a CBOR map keyed by small integers. Only
//! three key families are understood: EC2 (P-256), OKP (Ed25519) and RSA. Each
//! decoded key can be exported as a JWK, which is the form the signature
//! verifier consumes.

use std::collections::BTreeMap;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD as B64URL, Engine};
use serde::{Deserialize, Serialize};
use serde_cbor_2::Value;

use crate::cbor::{self, CborMap};

pub const COSE_KEY_KTY: i128 = 1;
pub const COSE_KEY_ALG: i128 = 3;

// EC2 / OKP parameters.
const CRV: i128 = -1;
const X: i128 = -2;
const Y: i128 = -3;
const D: i128 = -4;

// RSA parameters.
const RSA_N: i128 = -1;
const RSA_E: i128 = -2;
const RSA_D: i128 = -3;
const RSA_P: i128 = -4;
const RSA_Q: i128 = -5;
const RSA_DP: i128 = -6;
const RSA_DQ: i128 = -7;
const RSA_QINV: i128 = -8;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoseError {
    #[error("unsupported COSE key type {0}")]
    UnsupportedKeyType(i128),

    #[error("unsupported COSE algorithm {0}")]
    UnsupportedAlgorithm(i128),

    #[error("unsupported COSE curve {0}")]
    UnsupportedCurve(i128),

    #[error("invalid COSE key: {0}")]
    InvalidKey(&'static str),

    #[error("invalid COSE key CBOR: {0}")]
    Cbor(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyType {
    Okp = 1,
    Ec2 = 2,
    Rsa = 3,
}

impl TryFrom<i128> for KeyType {
    type Error = CoseError;

    fn try_from(value: i128) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(KeyType::Okp),
            2 => Ok(KeyType::Ec2),
            3 => Ok(KeyType::Rsa),
            other => Err(CoseError::UnsupportedKeyType(other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Curve {
    P256 = 1,
    Ed25519 = 6,
}

impl Curve {
    pub fn jwk_name(self) -> &'static str {
        match self {
            Curve::P256 => "P-256",
            Curve::Ed25519 => "Ed25519",
        }
    }

    fn from_jwk_name(name: &str) -> Option<Self> {
        match name {
            "P-256" => Some(Curve::P256),
            "Ed25519" => Some(Curve::Ed25519),
            _ => None,
        }
    }
}

impl TryFrom<i128> for Curve {
    type Error = CoseError;

    fn try_from(value: i128) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Curve::P256),
            6 => Ok(Curve::Ed25519),
            other => Err(CoseError::UnsupportedCurve(other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HashAlgorithm {
    Sha256,
}

/// The closed set of signature algorithms a credential may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum CoseAlgorithm {
    /// ECDSA over P-256 with SHA-256.
    Es256,
    /// EdDSA over Ed25519.
    EdDsa,
    /// RSASSA-PSS with SHA-256.
    Ps256,
    /// RSASSA-PKCS1-v1_5 with SHA-256.
    Rs256,
}

impl CoseAlgorithm {
    pub const fn id(self) -> i64 {
        match self {
            CoseAlgorithm::Es256 => -7,
            CoseAlgorithm::EdDsa => -8,
            CoseAlgorithm::Ps256 => -37,
            CoseAlgorithm::Rs256 => -257,
        }
    }

    pub const fn key_type(self) -> KeyType {
        match self {
            CoseAlgorithm::Es256 => KeyType::Ec2,
            CoseAlgorithm::EdDsa => KeyType::Okp,
            CoseAlgorithm::Ps256 | CoseAlgorithm::Rs256 => KeyType::Rsa,
        }
    }

    /// Required curve, for the curve-based families.
    pub const fn curve(self) -> Option<Curve> {
        match self {
            CoseAlgorithm::Es256 => Some(Curve::P256),
            CoseAlgorithm::EdDsa => Some(Curve::Ed25519),
            CoseAlgorithm::Ps256 | CoseAlgorithm::Rs256 => None,
        }
    }

    /// Separate message digest, if the algorithm uses one. EdDSA hashes internally.
    pub const fn hash(self) -> Option<HashAlgorithm> {
        match self {
            CoseAlgorithm::EdDsa => None,
            CoseAlgorithm::Es256 | CoseAlgorithm::Ps256 | CoseAlgorithm::Rs256 => {
                Some(HashAlgorithm::Sha256)
            }
        }
    }
}

impl TryFrom<i64> for CoseAlgorithm {
    type Error = CoseError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            -7 => Ok(CoseAlgorithm::Es256),
            -8 => Ok(CoseAlgorithm::EdDsa),
            -37 => Ok(CoseAlgorithm::Ps256),
            -257 => Ok(CoseAlgorithm::Rs256),
            other => Err(CoseError::UnsupportedAlgorithm(other.into())),
        }
    }
}

impl From<CoseAlgorithm> for i64 {
    fn from(alg: CoseAlgorithm) -> Self {
        alg.id()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ec2Key {
    pub alg: CoseAlgorithm,
    pub crv: Curve,
    pub x: Vec<u8>,
    pub y: Vec<u8>,
    pub d: Option<Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OkpKey {
    pub alg: CoseAlgorithm,
    pub crv: Curve,
    pub x: Vec<u8>,
    pub d: Option<Vec<u8>>,
}

/// RSA private components. RFC 8230 requires all of them once `d` is present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RsaPrivateParts {
    pub d: Vec<u8>,
    pub p: Vec<u8>,
    pub q: Vec<u8>,
    pub dp: Vec<u8>,
    pub dq: Vec<u8>,
    pub qinv: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RsaKey {
    pub alg: CoseAlgorithm,
    pub n: Vec<u8>,
    pub e: Vec<u8>,
    pub private: Option<RsaPrivateParts>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoseKey {
    Ec2(Ec2Key),
    Okp(OkpKey),
    Rsa(RsaKey),
}

/// Generic public key representation (RFC 7517), base64url fields without padding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kty")]
pub enum Jwk {
    #[serde(rename = "EC")]
    Ec { crv: String, x: String, y: String },

    #[serde(rename = "OKP")]
    Okp { crv: String, x: String },

    #[serde(rename = "RSA")]
    Rsa { n: String, e: String },
}

impl Jwk {
    /// Curve named by an EC or OKP key.
    pub fn curve(&self) -> Option<Curve> {
        match self {
            Jwk::Ec { crv, .. } | Jwk::Okp { crv, .. } => Curve::from_jwk_name(crv),
            Jwk::Rsa { .. } => None,
        }
    }
}

/// Decodes a CBOR-encoded COSE_Key.
pub fn decode(raw: &[u8]) -> Result<CoseKey, CoseError> {
    let value: Value = serde_cbor_2::from_slice(raw).map_err(|e| CoseError::Cbor(e.to_string()))?;
    let map = cbor::as_map(&value).ok_or(CoseError::InvalidKey("not a CBOR map"))?;

    let kty = int_param(map, COSE_KEY_KTY).ok_or(CoseError::InvalidKey("missing kty"))?;
    let key_type = KeyType::try_from(kty)?;

    let alg = int_param(map, COSE_KEY_ALG).ok_or(CoseError::InvalidKey("missing alg"))?;
    let alg = i64::try_from(alg)
        .map_err(|_| CoseError::UnsupportedAlgorithm(alg))
        .and_then(CoseAlgorithm::try_from)?;

    if alg.key_type() != key_type {
        return Err(CoseError::InvalidKey("algorithm does not match key type"));
    }

    match key_type {
        KeyType::Ec2 => decode_ec2(map, alg).map(CoseKey::Ec2),
        KeyType::Okp => decode_okp(map, alg).map(CoseKey::Okp),
        KeyType::Rsa => decode_rsa(map, alg).map(CoseKey::Rsa),
    }
}

fn decode_curve(map: &CborMap, alg: CoseAlgorithm) -> Result<Curve, CoseError> {
    let crv = int_param(map, CRV).ok_or(CoseError::InvalidKey("missing crv"))?;
    let crv = Curve::try_from(crv)?;
    if alg.curve() != Some(crv) {
        return Err(CoseError::InvalidKey("curve does not match algorithm"));
    }
    Ok(crv)
}

fn decode_ec2(map: &CborMap, alg: CoseAlgorithm) -> Result<Ec2Key, CoseError> {
    let crv = decode_curve(map, alg)?;
    let x = bytes_param(map, X).ok_or(CoseError::InvalidKey("missing x"))?;
    let y = bytes_param(map, Y).ok_or(CoseError::InvalidKey("missing y"))?;
    if x.len() != 32 || y.len() != 32 {
        return Err(CoseError::InvalidKey("P-256 coordinates must be 32 bytes"));
    }
    Ok(Ec2Key {
        alg,
        crv,
        x,
        y,
        d: bytes_param(map, D),
    })
}

fn decode_okp(map: &CborMap, alg: CoseAlgorithm) -> Result<OkpKey, CoseError> {
    let crv = decode_curve(map, alg)?;
    let x = bytes_param(map, X).ok_or(CoseError::InvalidKey("missing x"))?;
    if x.len() != 32 {
        return Err(CoseError::InvalidKey("Ed25519 public key must be 32 bytes"));
    }
    Ok(OkpKey {
        alg,
        crv,
        x,
        d: bytes_param(map, D),
    })
}

fn decode_rsa(map: &CborMap, alg: CoseAlgorithm) -> Result<RsaKey, CoseError> {
    let n = bytes_param(map, RSA_N).ok_or(CoseError::InvalidKey("missing n"))?;
    let e = bytes_param(map, RSA_E).ok_or(CoseError::InvalidKey("missing e"))?;
    if n.is_empty() || e.is_empty() {
        return Err(CoseError::InvalidKey("empty RSA modulus or exponent"));
    }

    let private = match bytes_param(map, RSA_D) {
        None => None,
        Some(d) => {
            let part = |label| {
                bytes_param(map, label).ok_or(CoseError::InvalidKey("incomplete RSA private key"))
            };
            Some(RsaPrivateParts {
                d,
                p: part(RSA_P)?,
                q: part(RSA_Q)?,
                dp: part(RSA_DP)?,
                dq: part(RSA_DQ)?,
                qinv: part(RSA_QINV)?,
            })
        }
    };

    Ok(RsaKey { alg, n, e, private })
}

fn int_param(map: &CborMap, label: i128) -> Option<i128> {
    cbor::int_entry(map, label).and_then(cbor::as_int)
}

fn bytes_param(map: &CborMap, label: i128) -> Option<Vec<u8>> {
    cbor::int_entry(map, label)
        .and_then(cbor::as_bytes)
        .map(<[u8]>::to_vec)
}

impl CoseKey {
    pub fn algorithm(&self) -> CoseAlgorithm {
        match self {
            CoseKey::Ec2(k) => k.alg,
            CoseKey::Okp(k) => k.alg,
            CoseKey::Rsa(k) => k.alg,
        }
    }

    pub fn key_type(&self) -> KeyType {
        match self {
            CoseKey::Ec2(_) => KeyType::Ec2,
            CoseKey::Okp(_) => KeyType::Okp,
            CoseKey::Rsa(_) => KeyType::Rsa,
        }
    }

    pub fn has_private_material(&self) -> bool {
        match self {
            CoseKey::Ec2(k) => k.d.is_some(),
            CoseKey::Okp(k) => k.d.is_some(),
            CoseKey::Rsa(k) => k.private.is_some(),
        }
    }

    /// Public half of the key as a JWK. Private components are never exported.
    pub fn to_jwk(&self) -> Jwk {
        match self {
            CoseKey::Ec2(k) => Jwk::Ec {
                crv: k.crv.jwk_name().to_string(),
                x: B64URL.encode(&k.x),
                y: B64URL.encode(&k.y),
            },
            CoseKey::Okp(k) => Jwk::Okp {
                crv: k.crv.jwk_name().to_string(),
                x: B64URL.encode(&k.x),
            },
            CoseKey::Rsa(k) => Jwk::Rsa {
                n: B64URL.encode(&k.n),
                e: B64URL.encode(&k.e),
            },
        }
    }

    /// Encodes the key back into a COSE_Key map, private components included.
    pub fn to_cbor(&self) -> Result<Vec<u8>, CoseError> {
        let mut map = BTreeMap::new();
        let mut put = |label: i128, value: Value| {
            map.insert(Value::Integer(label), value);
        };

        put(COSE_KEY_KTY, Value::Integer(self.key_type() as i128));
        put(COSE_KEY_ALG, Value::Integer(self.algorithm().id().into()));

        match self {
            CoseKey::Ec2(k) => {
                put(CRV, Value::Integer(k.crv as i128));
                put(X, Value::Bytes(k.x.clone()));
                put(Y, Value::Bytes(k.y.clone()));
                if let Some(d) = &k.d {
                    put(D, Value::Bytes(d.clone()));
                }
            }
            CoseKey::Okp(k) => {
                put(CRV, Value::Integer(k.crv as i128));
                put(X, Value::Bytes(k.x.clone()));
                if let Some(d) = &k.d {
                    put(D, Value::Bytes(d.clone()));
                }
            }
            CoseKey::Rsa(k) => {
                put(RSA_N, Value::Bytes(k.n.clone()));
                put(RSA_E, Value::Bytes(k.e.clone()));
                if let Some(p) = &k.private {
                    put(RSA_D, Value::Bytes(p.d.clone()));
                    put(RSA_P, Value::Bytes(p.p.clone()));
                    put(RSA_Q, Value::Bytes(p.q.clone()));
                    put(RSA_DP, Value::Bytes(p.dp.clone()));
                    put(RSA_DQ, Value::Bytes(p.dq.clone()));
                    put(RSA_QINV, Value::Bytes(p.qinv.clone()));
                }
            }
        }

        serde_cbor_2::to_vec(&Value::Map(map)).map_err(|e| CoseError::Cbor(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn b64(s: &str) -> Vec<u8> {
        B64URL.decode(s).unwrap()
    }

    fn raw_map(entries: &[(i128, Value)]) -> Vec<u8> {
        let map: BTreeMap<Value, Value> = entries
            .iter()
            .map(|(k, v)| (Value::Integer(*k), v.clone()))
            .collect();
        serde_cbor_2::to_vec(&Value::Map(map)).unwrap()
    }

    #[test]
    fn test_ec2_roundtrip_to_jwk() {
        let x: Vec<u8> = (0..32).collect();
        let y: Vec<u8> = (32..64).collect();
        let raw = raw_map(&[
            (1, Value::Integer(2)),
            (3, Value::Integer(-7)),
            (-1, Value::Integer(1)),
            (-2, Value::Bytes(x.clone())),
            (-3, Value::Bytes(y.clone())),
        ]);

        let key = decode(&raw).unwrap();
        assert_eq!(key.algorithm(), CoseAlgorithm::Es256);
        assert!(!key.has_private_material());

        let Jwk::Ec { crv, x: jx, y: jy } = key.to_jwk() else {
            panic!("expected EC JWK");
        };
        assert_eq!(crv, "P-256");
        assert_eq!(b64(&jx), x);
        assert_eq!(b64(&jy), y);

        assert_eq!(decode(&key.to_cbor().unwrap()).unwrap(), key);
    }

    #[test]
    fn test_okp_roundtrip_to_jwk() {
        let x = vec![0x42; 32];
        let raw = raw_map(&[
            (1, Value::Integer(1)),
            (3, Value::Integer(-8)),
            (-1, Value::Integer(6)),
            (-2, Value::Bytes(x.clone())),
        ]);

        let key = decode(&raw).unwrap();
        assert_eq!(key.key_type(), KeyType::Okp);

        let jwk = key.to_jwk();
        assert_eq!(jwk.curve(), Some(Curve::Ed25519));
        let Jwk::Okp { x: jx, .. } = jwk else {
            panic!("expected OKP JWK");
        };
        assert_eq!(b64(&jx), x);
    }

    #[test]
    fn test_rsa_roundtrip_to_jwk() {
        let n = vec![0xC3; 256];
        let e = vec![0x01, 0x00, 0x01];
        let raw = raw_map(&[
            (1, Value::Integer(3)),
            (3, Value::Integer(-257)),
            (-1, Value::Bytes(n.clone())),
            (-2, Value::Bytes(e.clone())),
        ]);

        let key = decode(&raw).unwrap();
        assert_eq!(key.algorithm(), CoseAlgorithm::Rs256);

        let json = serde_json::to_value(key.to_jwk()).unwrap();
        assert_eq!(json["kty"], "RSA");
        assert_eq!(b64(json["n"].as_str().unwrap()), n);
        assert_eq!(b64(json["e"].as_str().unwrap()), e);
    }

    #[test]
    fn test_private_components_decode_but_do_not_export() {
        let raw = raw_map(&[
            (1, Value::Integer(2)),
            (3, Value::Integer(-7)),
            (-1, Value::Integer(1)),
            (-2, Value::Bytes(vec![1; 32])),
            (-3, Value::Bytes(vec![2; 32])),
            (-4, Value::Bytes(vec![3; 32])),
        ]);
        let key = decode(&raw).unwrap();
        assert!(key.has_private_material());
        let json = serde_json::to_value(key.to_jwk()).unwrap();
        assert!(json.get("d").is_none());
    }

    #[test]
    fn test_rejects_unknown_key_type_and_algorithm() {
        let raw = raw_map(&[(1, Value::Integer(4)), (3, Value::Integer(-7))]);
        assert_eq!(decode(&raw), Err(CoseError::UnsupportedKeyType(4)));

        let raw = raw_map(&[
            (1, Value::Integer(2)),
            (3, Value::Integer(-35)),
            (-1, Value::Integer(2)),
        ]);
        assert_eq!(decode(&raw), Err(CoseError::UnsupportedAlgorithm(-35)));
    }

    #[test]
    fn test_rejects_mismatched_curve_and_family() {
        let raw = raw_map(&[
            (1, Value::Integer(2)),
            (3, Value::Integer(-7)),
            (-1, Value::Integer(3)),
            (-2, Value::Bytes(vec![1; 32])),
            (-3, Value::Bytes(vec![2; 32])),
        ]);
        assert_eq!(decode(&raw), Err(CoseError::UnsupportedCurve(3)));

        let raw = raw_map(&[
            (1, Value::Integer(1)),
            (3, Value::Integer(-7)),
            (-1, Value::Integer(6)),
            (-2, Value::Bytes(vec![1; 32])),
        ]);
        assert!(matches!(decode(&raw), Err(CoseError::InvalidKey(_))));
    }

    #[test]
    fn test_algorithm_table() {
        for (id, alg) in [
            (-7, CoseAlgorithm::Es256),
            (-8, CoseAlgorithm::EdDsa),
            (-37, CoseAlgorithm::Ps256),
            (-257, CoseAlgorithm::Rs256),
        ] {
            assert_eq!(CoseAlgorithm::try_from(id), Ok(alg));
            assert_eq!(alg.id(), id);
        }
        assert_eq!(CoseAlgorithm::EdDsa.hash(), None);
        assert_eq!(CoseAlgorithm::Es256.curve(), Some(Curve::P256));
        assert_eq!(CoseAlgorithm::Ps256.hash(), Some(HashAlgorithm::Sha256));
        assert!(CoseAlgorithm::try_from(-65535).is_err());
    }

    #[test]
    fn test_garbage_is_a_cbor_error() {
        assert!(matches!(decode(&[0xff, 0x00]), Err(CoseError::Cbor(_))));
    }
}
