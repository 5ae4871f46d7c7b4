use crate::attestation::AttestationError;
use crate::authenticator_data::AuthDataError;
use crate::cose::CoseError;
use crate::store::StoreError;

/// Failures shared by every ceremony.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CeremonyError {
    #[error("caller is not authenticated")]
    Unauthorized,

    #[error("challenge is unknown, expired, already used or does not match")]
    ChallengeMismatch,

    #[error("invalid data: {0}")]
    InvalidData(String),

    #[error("unsupported device: {0}")]
    UnsupportedDevice(String),

    #[error("server error: {0}")]
    ServerError(String),
}

impl CeremonyError {
    pub fn code(&self) -> &'static str {
        match self {
            CeremonyError::Unauthorized => "unauthorized",
            CeremonyError::ChallengeMismatch => "challenge_mismatch",
            CeremonyError::InvalidData(_) => "invalid_data",
            CeremonyError::UnsupportedDevice(_) => "unsupported_device",
            CeremonyError::ServerError(_) => "server_error",
        }
    }

    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        CeremonyError::InvalidData(message.into())
    }
}

impl From<StoreError> for CeremonyError {
    fn from(err: StoreError) -> Self {
        CeremonyError::ServerError(err.to_string())
    }
}

impl From<AuthDataError> for CeremonyError {
    fn from(err: AuthDataError) -> Self {
        CeremonyError::InvalidData(err.to_string())
    }
}

impl From<AttestationError> for CeremonyError {
    fn from(err: AttestationError) -> Self {
        CeremonyError::InvalidData(err.to_string())
    }
}

impl From<CoseError> for CeremonyError {
    fn from(err: CoseError) -> Self {
        match err {
            CoseError::UnsupportedKeyType(_)
            | CoseError::UnsupportedAlgorithm(_)
            | CoseError::UnsupportedCurve(_) => CeremonyError::UnsupportedDevice(err.to_string()),
            CoseError::InvalidKey(_) | CoseError::Cbor(_) => {
                CeremonyError::InvalidData(err.to_string())
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistrationError {
    #[error(transparent)]
    Ceremony(#[from] CeremonyError),

    #[error("a passkey with this credential id is already registered")]
    PasskeyExists,
}

impl RegistrationError {
    pub fn code(&self) -> &'static str {
        match self {
            RegistrationError::Ceremony(err) => err.code(),
            RegistrationError::PasskeyExists => "passkey_exists",
        }
    }
}

impl From<StoreError> for RegistrationError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Duplicate => RegistrationError::PasskeyExists,
            other => RegistrationError::Ceremony(other.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthenticationError {
    #[error(transparent)]
    Ceremony(#[from] CeremonyError),

    #[error("passkey not found")]
    PasskeyNotFound,

    #[error("signature verification failed")]
    VerificationFailed,
}

impl AuthenticationError {
    pub fn code(&self) -> &'static str {
        match self {
            AuthenticationError::Ceremony(err) => err.code(),
            AuthenticationError::PasskeyNotFound => "passkey_not_found",
            AuthenticationError::VerificationFailed => "verification_failed",
        }
    }
}

impl From<StoreError> for AuthenticationError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => AuthenticationError::PasskeyNotFound,
            other => AuthenticationError::Ceremony(other.into()),
        }
    }
}
