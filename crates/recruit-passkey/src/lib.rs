//! WebAuthn relying-party ceremonies for passkey sign-in.
//!
//! This crate owns the binary formats (authenticator data, COSE keys, DER
//! signatures), the signature check, and the registration / login / test
//! ceremonies. Storage is reached only through the traits in [`store`]; the
//! service crate wires them to a database.

pub mod attestation;
pub mod authenticator_data;
mod cbor;
pub mod ceremony;
pub mod challenge;
pub mod client_data;
pub mod cose;
pub mod error;
pub mod in_flight;
pub mod memory;
pub mod options;
pub mod rp;
pub mod store;
pub mod verify;

pub use attestation::AttestationPolicy;
pub use ceremony::{Authenticated, CounterPolicy, EngineSettings, PasskeyEngine};
pub use challenge::{Challenge, Challenges};
pub use cose::{CoseAlgorithm, CoseKey};
pub use error::{AuthenticationError, CeremonyError, RegistrationError};
pub use in_flight::{InFlight, InFlightGuard};
pub use options::{AuthenticationResponse, CreationOptions, RegistrationResponse, RequestOptions};
pub use rp::RelyingParty;
pub use store::{
    ChallengeStore, CredentialRecord, CredentialStore, CredentialUse, Identity, IdentityDirectory,
    StoreError, UserId,
};
