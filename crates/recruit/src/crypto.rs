use base64::{engine::general_purpose::URL_SAFE_NO_PAD as B64URL, Engine};
use jsonwebtoken::{DecodingKey, EncodingKey, Header};
use p256::ecdsa::SigningKey;
use p256::elliptic_curve::sec1::ToEncodedPoint;
use p256::pkcs8::EncodePrivateKey;
use rand::rngs::OsRng;

use crate::models::SessionClaims;

pub const SESSION_AUDIENCE: &str = "recruit-web";
pub const ACCESS_TOKEN_TYPE: &str = "access";

/// ES256 keys used to sign session tokens. Generated at startup, so every
/// restart invalidates outstanding sessions.
pub struct JwtKeys {
    pub kid: String,
    pub issuer: String,
    pub encoding_key: EncodingKey,
    pub decoding_key: DecodingKey,
}

pub fn generate_ecdsa_keypair(issuer: impl Into<String>) -> anyhow::Result<JwtKeys> {
    let signing_key = SigningKey::random(&mut OsRng);

    let der = signing_key
        .to_pkcs8_der()
        .map_err(|e| anyhow::anyhow!("failed to encode signing key: {e}"))?;
    let encoding_key = EncodingKey::from_ec_der(der.as_bytes());

    let point = p256::PublicKey::from(signing_key.verifying_key()).to_encoded_point(false);
    let (Some(x), Some(y)) = (point.x(), point.y()) else {
        anyhow::bail!("generated public key is the identity point");
    };
    let decoding_key = DecodingKey::from_ec_components(&B64URL.encode(x), &B64URL.encode(y))?;

    Ok(JwtKeys {
        kid: uuid::Uuid::new_v4().to_string(),
        issuer: issuer.into(),
        encoding_key,
        decoding_key,
    })
}

pub fn sign_jwt<T: serde::Serialize>(
    keys: &JwtKeys,
    claims: &T,
) -> Result<String, jsonwebtoken::errors::Error> {
    let mut header = Header::new(jsonwebtoken::Algorithm::ES256);
    header.kid = Some(keys.kid.clone());
    jsonwebtoken::encode(&header, claims, &keys.encoding_key)
}

pub fn create_access_token(
    keys: &JwtKeys,
    user_id: i32,
    expiration_secs: i64,
) -> Result<String, jsonwebtoken::errors::Error> {
    let now = chrono::Utc::now();
    let claims = SessionClaims {
        iss: keys.issuer.clone(),
        sub: user_id.to_string(),
        aud: SESSION_AUDIENCE.to_string(),
        exp: (now + chrono::Duration::seconds(expiration_secs)).timestamp(),
        iat: now.timestamp(),
        token_type: ACCESS_TOKEN_TYPE.to_string(),
    };
    sign_jwt(keys, &claims)
}

/// Returns the user id carried by a valid access token.
pub fn verify_access_token(keys: &JwtKeys, token: &str) -> Result<i32, String> {
    let mut validation = jsonwebtoken::Validation::new(jsonwebtoken::Algorithm::ES256);
    validation.set_issuer(&[&keys.issuer]);
    validation.set_audience(&[SESSION_AUDIENCE]);
    validation.validate_exp = true;

    let token_data = jsonwebtoken::decode::<SessionClaims>(token, &keys.decoding_key, &validation)
        .map_err(|e| format!("Invalid access token: {e:?}"))?;

    if token_data.claims.token_type != ACCESS_TOKEN_TYPE {
        return Err("Invalid token type".to_string());
    }

    token_data
        .claims
        .sub
        .parse::<i32>()
        .map_err(|_| "Invalid user ID in token".to_string())
}
