//! Parser for the binary authenticator data returned by a credential device.
//!
//! Layout: `rpIdHash (32) | flags (1) | signCount (4, big-endian)`, then, when
//! the attested-credential flag is set, `aaguid (16) | credentialIdLength (2,
//! big-endian) | credentialId | credentialPublicKey (CBOR)`, then, when the
//! extensions flag is set, a CBOR extensions map.

use serde_cbor_2::Value;

use crate::cbor;
use crate::cose::{KeyType, COSE_KEY_ALG, COSE_KEY_KTY};

pub const RP_ID_HASH_LEN: usize = 32;
pub const AAGUID_LEN: usize = 16;
/// Header size: rpIdHash, flags and signCount.
pub const MIN_LEN: usize = 37;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthDataError {
    #[error("malformed authenticator data: {0}")]
    Malformed(&'static str),

    #[error("malformed authenticator data: unrecognized COSE key type {0}")]
    UnrecognizedKeyType(i128),

    #[error("malformed authenticator data: invalid CBOR ({0})")]
    Cbor(String),
}

/// Authenticator data flag byte.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Flags(u8);

impl Flags {
    pub const USER_PRESENT: u8 = 1 << 0;
    pub const USER_VERIFIED: u8 = 1 << 2;
    pub const BACKUP_ELIGIBLE: u8 = 1 << 3;
    pub const BACKUP_STATE: u8 = 1 << 4;
    pub const ATTESTED_CREDENTIAL_DATA: u8 = 1 << 6;
    pub const EXTENSION_DATA: u8 = 1 << 7;

    pub const fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    fn has(self, bit: u8) -> bool {
        self.0 & bit != 0
    }

    pub fn user_present(self) -> bool {
        self.has(Self::USER_PRESENT)
    }

    pub fn user_verified(self) -> bool {
        self.has(Self::USER_VERIFIED)
    }

    pub fn backup_eligible(self) -> bool {
        self.has(Self::BACKUP_ELIGIBLE)
    }

    pub fn backup_state(self) -> bool {
        self.has(Self::BACKUP_STATE)
    }

    pub fn attested_credential_data(self) -> bool {
        self.has(Self::ATTESTED_CREDENTIAL_DATA)
    }

    pub fn extension_data(self) -> bool {
        self.has(Self::EXTENSION_DATA)
    }
}

/// Credential block present on registration responses.
#[derive(Clone, Debug, PartialEq)]
pub struct AttestedCredentialData {
    pub aaguid: [u8; AAGUID_LEN],
    pub credential_id: Vec<u8>,
    /// COSE key type (map key `1`).
    pub key_type: KeyType,
    /// COSE algorithm identifier (map key `3`), not yet checked against any
    /// supported set.
    pub algorithm: i64,
    /// The credential public key exactly as encoded by the device.
    pub credential_public_key: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct AuthenticatorData {
    pub rp_id_hash: [u8; RP_ID_HASH_LEN],
    pub flags: Flags,
    pub sign_count: u32,
    pub attested_credential_data: Option<AttestedCredentialData>,
    /// Decoded but never interpreted.
    pub extensions: Option<Value>,
}

impl AuthenticatorData {
    pub fn parse(bytes: &[u8]) -> Result<Self, AuthDataError> {
        if bytes.len() < MIN_LEN {
            return Err(AuthDataError::Malformed("shorter than 37 bytes"));
        }

        let mut rp_id_hash = [0u8; RP_ID_HASH_LEN];
        rp_id_hash.copy_from_slice(&bytes[0..32]);
        let flags = Flags::from_bits(bytes[32]);
        let sign_count = u32::from_be_bytes([bytes[33], bytes[34], bytes[35], bytes[36]]);

        let mut rest = &bytes[MIN_LEN..];

        let attested_credential_data = if flags.attested_credential_data() {
            let (attested, used) = parse_attested_credential_data(rest)?;
            rest = &rest[used..];
            Some(attested)
        } else {
            None
        };

        let extensions = if flags.extension_data() {
            let (value, used) =
                cbor::decode_prefix(rest).map_err(|e| AuthDataError::Cbor(e.to_string()))?;
            if cbor::as_map(&value).is_none() {
                return Err(AuthDataError::Malformed("extensions are not a CBOR map"));
            }
            rest = &rest[used..];
            Some(value)
        } else {
            None
        };

        if !rest.is_empty() {
            return Err(AuthDataError::Malformed("trailing bytes"));
        }

        Ok(Self {
            rp_id_hash,
            flags,
            sign_count,
            attested_credential_data,
            extensions,
        })
    }
}

fn parse_attested_credential_data(
    input: &[u8],
) -> Result<(AttestedCredentialData, usize), AuthDataError> {
    if input.len() < AAGUID_LEN + 2 {
        return Err(AuthDataError::Malformed("attested credential data too short"));
    }

    let mut aaguid = [0u8; AAGUID_LEN];
    aaguid.copy_from_slice(&input[..AAGUID_LEN]);
    let mut idx = AAGUID_LEN;

    let cred_len = u16::from_be_bytes([input[idx], input[idx + 1]]) as usize;
    idx += 2;

    if input.len() < idx + cred_len {
        return Err(AuthDataError::Malformed("credential id truncated"));
    }
    let credential_id = input[idx..idx + cred_len].to_vec();
    idx += cred_len;

    let (key, used) =
        cbor::decode_prefix(&input[idx..]).map_err(|e| AuthDataError::Cbor(e.to_string()))?;
    let map = cbor::as_map(&key)
        .ok_or(AuthDataError::Malformed("credential public key is not a CBOR map"))?;

    let kty = cbor::int_entry(map, COSE_KEY_KTY)
        .and_then(cbor::as_int)
        .ok_or(AuthDataError::Malformed("credential public key has no key type"))?;
    let key_type = KeyType::try_from(kty).map_err(|_| AuthDataError::UnrecognizedKeyType(kty))?;

    let algorithm = cbor::int_entry(map, COSE_KEY_ALG)
        .and_then(cbor::as_int)
        .and_then(|alg| i64::try_from(alg).ok())
        .ok_or(AuthDataError::Malformed("credential public key has no algorithm"))?;

    let credential_public_key = input[idx..idx + used].to_vec();
    idx += used;

    Ok((
        AttestedCredentialData {
            aaguid,
            credential_id,
            key_type,
            algorithm,
            credential_public_key,
        },
        idx,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn header(flags: u8, sign_count: u32) -> Vec<u8> {
        let mut data = vec![0xAB; 32];
        data.push(flags);
        data.extend_from_slice(&sign_count.to_be_bytes());
        data
    }

    fn ec2_key_cbor(kty: i128) -> Vec<u8> {
        let mut map = BTreeMap::new();
        map.insert(Value::Integer(1), Value::Integer(kty));
        map.insert(Value::Integer(3), Value::Integer(-7));
        map.insert(Value::Integer(-1), Value::Integer(1));
        map.insert(Value::Integer(-2), Value::Bytes(vec![0x11; 32]));
        map.insert(Value::Integer(-3), Value::Bytes(vec![0x22; 32]));
        serde_cbor_2::to_vec(&Value::Map(map)).unwrap()
    }

    fn with_attested(flags: u8, cred_id: &[u8], key: &[u8]) -> Vec<u8> {
        let mut data = header(flags | Flags::ATTESTED_CREDENTIAL_DATA, 0);
        data.extend_from_slice(&[0x5A; AAGUID_LEN]);
        data.extend_from_slice(&(cred_id.len() as u16).to_be_bytes());
        data.extend_from_slice(cred_id);
        data.extend_from_slice(key);
        data
    }

    #[test]
    fn test_rejects_short_buffer() {
        let data = header(Flags::USER_PRESENT, 1);
        assert!(matches!(
            AuthenticatorData::parse(&data[..36]),
            Err(AuthDataError::Malformed(_))
        ));
        assert!(AuthenticatorData::parse(&[]).is_err());
    }

    #[test]
    fn test_parses_header_only() {
        let data = header(Flags::USER_PRESENT | Flags::USER_VERIFIED, 0x0102_0304);
        let parsed = AuthenticatorData::parse(&data).unwrap();
        assert_eq!(parsed.rp_id_hash, [0xAB; 32]);
        assert_eq!(parsed.sign_count, 0x0102_0304);
        assert!(parsed.flags.user_present());
        assert!(parsed.flags.user_verified());
        assert!(parsed.attested_credential_data.is_none());
        assert!(parsed.extensions.is_none());
    }

    #[test]
    fn test_each_flag_bit_is_observable() {
        let accessors: [(u8, fn(Flags) -> bool); 6] = [
            (Flags::USER_PRESENT, Flags::user_present),
            (Flags::USER_VERIFIED, Flags::user_verified),
            (Flags::BACKUP_ELIGIBLE, Flags::backup_eligible),
            (Flags::BACKUP_STATE, Flags::backup_state),
            (Flags::ATTESTED_CREDENTIAL_DATA, Flags::attested_credential_data),
            (Flags::EXTENSION_DATA, Flags::extension_data),
        ];

        for (bit, accessor) in accessors {
            let flags = Flags::from_bits(bit);
            assert!(accessor(flags));
            assert!(!accessor(Flags::from_bits(!bit)));
            for (other_bit, other) in accessors {
                if other_bit != bit {
                    assert!(!other(flags), "bit {bit:#04x} leaked into {other_bit:#04x}");
                }
            }
        }
    }

    #[test]
    fn test_header_flags_roundtrip_through_parse() {
        for bit in [
            Flags::USER_PRESENT,
            Flags::USER_VERIFIED,
            Flags::BACKUP_ELIGIBLE,
            Flags::BACKUP_STATE,
        ] {
            let parsed = AuthenticatorData::parse(&header(bit, 0)).unwrap();
            assert_eq!(parsed.flags.bits(), bit);
        }
    }

    #[test]
    fn test_parses_attested_credential() {
        let key = ec2_key_cbor(2);
        let data = with_attested(Flags::USER_PRESENT, &[1, 2, 3, 4], &key);
        let parsed = AuthenticatorData::parse(&data).unwrap();

        let attested = parsed.attested_credential_data.unwrap();
        assert_eq!(attested.aaguid, [0x5A; AAGUID_LEN]);
        assert_eq!(attested.credential_id, vec![1, 2, 3, 4]);
        assert_eq!(attested.key_type, KeyType::Ec2);
        assert_eq!(attested.algorithm, -7);
        assert_eq!(attested.credential_public_key, key);
    }

    #[test]
    fn test_parses_extensions_after_key() {
        let key = ec2_key_cbor(2);
        let mut data = with_attested(Flags::EXTENSION_DATA, &[9; 16], &key);
        let mut ext = BTreeMap::new();
        ext.insert(Value::Text("credProtect".into()), Value::Integer(2));
        data.extend(serde_cbor_2::to_vec(&Value::Map(ext)).unwrap());

        let parsed = AuthenticatorData::parse(&data).unwrap();
        assert_eq!(
            parsed.attested_credential_data.unwrap().credential_public_key,
            key
        );
        assert!(parsed.extensions.is_some());
    }

    #[test]
    fn test_rejects_unrecognized_key_type() {
        let data = with_attested(Flags::USER_PRESENT, &[1], &ec2_key_cbor(4));
        assert_eq!(
            AuthenticatorData::parse(&data),
            Err(AuthDataError::UnrecognizedKeyType(4))
        );
    }

    #[test]
    fn test_rejects_truncated_credential_id() {
        let mut data = header(Flags::ATTESTED_CREDENTIAL_DATA, 0);
        data.extend_from_slice(&[0; AAGUID_LEN]);
        data.extend_from_slice(&64u16.to_be_bytes());
        data.extend_from_slice(&[7; 10]);
        assert!(matches!(
            AuthenticatorData::parse(&data),
            Err(AuthDataError::Malformed(_))
        ));
    }

    #[test]
    fn test_rejects_bad_cbor_and_trailing_bytes() {
        let data = with_attested(0, &[1], &[0xa5, 0x01]);
        assert!(matches!(
            AuthenticatorData::parse(&data),
            Err(AuthDataError::Cbor(_))
        ));

        let mut data = with_attested(0, &[1], &ec2_key_cbor(2));
        data.push(0x00);
        assert_eq!(
            AuthenticatorData::parse(&data),
            Err(AuthDataError::Malformed("trailing bytes"))
        );
    }
}
