use sha2::{Digest, Sha256};
use url::Url;

const LOCAL_HOSTS: [&str; 3] = ["localhost", "127.0.0.1", "[::1]"];

/// Relying-party identity for the two deployments the service answers for.
#[derive(Clone, Debug)]
pub struct RelyingParty {
    pub name: String,
    pub local_id: String,
    pub local_origin: String,
    pub production_id: String,
    pub production_origin: String,
}

impl RelyingParty {
    pub fn new(
        name: impl Into<String>,
        local_id: impl Into<String>,
        local_origin: impl Into<String>,
        production_id: impl Into<String>,
        production_origin: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            local_id: local_id.into(),
            local_origin: local_origin.into(),
            production_id: production_id.into(),
            production_origin: production_origin.into(),
        }
    }

    /// RP id for a request declaring `origin`.
    pub fn rp_id_for(&self, origin: &str) -> &str {
        if is_local_origin(origin) {
            &self.local_id
        } else {
            &self.production_id
        }
    }

    pub fn is_accepted_origin(&self, origin: &str) -> bool {
        origin == self.local_origin || origin == self.production_origin
    }
}

pub fn rp_id_hash(rp_id: &str) -> [u8; 32] {
    Sha256::digest(rp_id.as_bytes()).into()
}

fn is_local_origin(origin: &str) -> bool {
    match Url::parse(origin) {
        Ok(url) => url.host_str().is_some_and(|h| LOCAL_HOSTS.contains(&h)),
        Err(_) => LOCAL_HOSTS.iter().any(|h| origin.contains(h)),
    }
}
