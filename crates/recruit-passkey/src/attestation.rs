//! Attestation object decoding.
//!
//! The statement is decoded so its format can be logged and policed, but it is
//! never checked against a trust anchor: certificate chains and statement
//! signatures are not verified for any format.

use serde_cbor_2::Value;

use crate::cbor;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AttestationError {
    #[error("invalid attestation object: {0}")]
    Invalid(&'static str),

    #[error("invalid attestation object CBOR: {0}")]
    Cbor(String),
}

/// How registration treats attestation statements.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AttestationPolicy {
    /// Accept every format; statements are decoded and left unverified.
    #[default]
    AcceptUnverified,
    /// Accept only the `none` format.
    NoneOnly,
}

impl AttestationPolicy {
    pub fn allows(self, attestation: &AttestationObject) -> bool {
        match self {
            AttestationPolicy::AcceptUnverified => true,
            AttestationPolicy::NoneOnly => attestation.fmt == "none",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AttestationObject {
    pub fmt: String,
    pub att_stmt: Value,
    pub auth_data: Vec<u8>,
}

impl AttestationObject {
    pub fn decode(bytes: &[u8]) -> Result<Self, AttestationError> {
        let value: Value =
            serde_cbor_2::from_slice(bytes).map_err(|e| AttestationError::Cbor(e.to_string()))?;
        let map = cbor::as_map(&value).ok_or(AttestationError::Invalid("not a CBOR map"))?;

        let fmt = match cbor::text_entry(map, "fmt") {
            Some(Value::Text(s)) => s.clone(),
            _ => return Err(AttestationError::Invalid("missing fmt")),
        };

        let att_stmt = match cbor::text_entry(map, "attStmt") {
            Some(v @ Value::Map(_)) => v.clone(),
            _ => return Err(AttestationError::Invalid("missing attStmt")),
        };

        let auth_data = cbor::text_entry(map, "authData")
            .and_then(cbor::as_bytes)
            .ok_or(AttestationError::Invalid("missing authData"))?
            .to_vec();

        Ok(Self {
            fmt,
            att_stmt,
            auth_data,
        })
    }
}
