pub mod challenge;
pub mod passkey;
pub mod user;
