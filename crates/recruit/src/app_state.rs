use recruit_passkey::{InFlight, PasskeyEngine};

use crate::crypto::JwtKeys;
use crate::stores::{DbChallengeStore, DbCredentialStore, DbDirectory};

pub type Engine = PasskeyEngine<DbChallengeStore, DbCredentialStore, DbDirectory>;

/// Shared application state
pub struct AppState {
    /// Passkey ceremony engine over the database stores
    pub engine: Engine,

    /// Session lookups for signed-in callers
    pub directory: DbDirectory,

    /// ES256 keys for the `access_token` cookie
    pub jwt: JwtKeys,

    /// Access token lifetime in seconds
    pub access_token_expiration: i64,

    /// Finish requests currently being processed, keyed per ceremony and caller
    pub in_flight: InFlight,
}
