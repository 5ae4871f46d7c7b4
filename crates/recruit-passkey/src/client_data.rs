use base64::{engine::general_purpose::URL_SAFE_NO_PAD as B64URL, Engine};
use serde::Deserialize;

/// The `type` sentinel a ceremony expects in `clientDataJSON`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientDataType {
    Create,
    Get,
}

impl ClientDataType {
    pub fn as_str(self) -> &'static str {
        match self {
            ClientDataType::Create => "webauthn.create",
            ClientDataType::Get => "webauthn.get",
        }
    }
}

/// Parsed `clientDataJSON`.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientData {
    #[serde(rename = "type")]
    pub ty: String,

    /// Base64url, as produced by the browser.
    pub challenge: String,

    pub origin: String,

    #[serde(rename = "topOrigin", default)]
    pub top_origin: Option<String>,

    #[serde(rename = "crossOrigin", default)]
    pub cross_origin: Option<bool>,
}

impl ClientData {
    pub fn parse(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    pub fn is_type(&self, expected: ClientDataType) -> bool {
        self.ty == expected.as_str()
    }

    /// Decoded challenge bytes. Tolerates trailing `=` padding.
    pub fn challenge_bytes(&self) -> Option<Vec<u8>> {
        B64URL.decode(self.challenge.trim_end_matches('=')).ok()
    }

    /// Whether the ceremony ran in a cross-origin context.
    pub fn is_cross_origin(&self) -> bool {
        self.top_origin.is_some() || self.cross_origin == Some(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal() {
        let cd = ClientData::parse(
            br#"{"type":"webauthn.get","challenge":"AQID","origin":"https://jobs.example"}"#,
        )
        .unwrap();
        assert!(cd.is_type(ClientDataType::Get));
        assert!(!cd.is_type(ClientDataType::Create));
        assert_eq!(cd.challenge_bytes(), Some(vec![1, 2, 3]));
        assert!(!cd.is_cross_origin());
    }

    #[test]
    fn test_padded_challenge_and_cross_origin_markers() {
        let cd = ClientData::parse(
            br#"{"type":"webauthn.create","challenge":"AQI=","origin":"o","crossOrigin":false}"#,
        )
        .unwrap();
        assert_eq!(cd.challenge_bytes(), Some(vec![1, 2]));
        assert!(!cd.is_cross_origin());

        let cd = ClientData::parse(
            br#"{"type":"webauthn.create","challenge":"","origin":"o","topOrigin":"https://evil"}"#,
        )
        .unwrap();
        assert!(cd.is_cross_origin());
    }

    #[test]
    fn test_rejects_missing_fields() {
        assert!(ClientData::parse(br#"{"type":"webauthn.get"}"#).is_err());
        assert!(ClientData::parse(b"not json").is_err());
    }
}
