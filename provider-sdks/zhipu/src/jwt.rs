//! Signed, time-bounded tokens derived from a ZhipuAI API key.
//!
//! An API key has the form `{id}.{secret}`. The token is an HS256 JWT whose
//! claims carry only the key id and two millisecond timestamps:
//!
//! ```text
//! header:  {"alg":"HS256","sign_type":"SIGN"}
//! claims:  {"api_key":"<id>","exp":<ms>,"timestamp":<ms>}
//! ```
//!
//! The header carries the non-standard `sign_type` field, so the segments are
//! encoded here and only the signature is delegated to `jsonwebtoken`.

use std::time::Duration;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use jsonwebtoken::Algorithm;
use jsonwebtoken::DecodingKey;
use jsonwebtoken::EncodingKey;
use jsonwebtoken::Validation;
use serde::Deserialize;
use serde::Serialize;

use crate::error::Result;
use crate::error::ZhipuError;

const API_KEY_SEPARATOR: char = '.';

/// The two halves of an API key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApiKeyParts<'a> {
    /// Public key id, embedded in the token.
    pub id: &'a str,
    /// Signing secret, never sent over the wire.
    pub secret: &'a str,
}

/// Claims embedded in every token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Public key id.
    pub api_key: String,
    /// Expiry, Unix milliseconds.
    pub exp: i64,
    /// Issued-at, Unix milliseconds.
    pub timestamp: i64,
}

#[derive(Serialize)]
struct TokenHeader {
    alg: &'static str,
    sign_type: &'static str,
}

const TOKEN_HEADER: TokenHeader = TokenHeader {
    alg: "HS256",
    sign_type: "SIGN",
};

/// Split an API key into id and secret.
///
/// Exactly one separator is allowed and neither half may be empty.
pub fn split_api_key(api_key: &str) -> Result<ApiKeyParts<'_>> {
    let mut parts = api_key.split(API_KEY_SEPARATOR);
    match (parts.next(), parts.next(), parts.next()) {
        (Some(id), Some(secret), None) if !id.is_empty() && !secret.is_empty() => {
            Ok(ApiKeyParts { id, secret })
        }
        _ => Err(ZhipuError::InvalidCredentialFormat(
            "expected an API key of the form {id}.{secret}".to_string(),
        )),
    }
}

/// Mint a token valid for `validity` from now.
pub fn generate_token(api_key: &str, validity: Duration) -> Result<String> {
    generate_token_at(api_key, validity, SystemTime::now())
}

pub(crate) fn generate_token_at(
    api_key: &str,
    validity: Duration,
    now: SystemTime,
) -> Result<String> {
    let parts = split_api_key(api_key)?;

    let timestamp = unix_millis(now.duration_since(UNIX_EPOCH).unwrap_or_default());
    let claims = TokenClaims {
        api_key: parts.id.to_string(),
        exp: timestamp.saturating_add(unix_millis(validity)),
        timestamp,
    };

    let header = serde_json::to_vec(&TOKEN_HEADER).map_err(ZhipuError::Serialization)?;
    let payload = serde_json::to_vec(&claims).map_err(ZhipuError::Serialization)?;
    let message = format!(
        "{}.{}",
        URL_SAFE_NO_PAD.encode(header),
        URL_SAFE_NO_PAD.encode(payload)
    );

    let key = EncodingKey::from_secret(parts.secret.as_bytes());
    let signature = jsonwebtoken::crypto::sign(message.as_bytes(), &key, Algorithm::HS256)?;

    Ok(format!("{message}.{signature}"))
}

/// Verify a token's signature with `secret` and return its claims.
///
/// Expiry is not enforced here: `exp` is in milliseconds, which standard
/// JWT validation would misread as seconds.
pub fn verify_token(token: &str, secret: &str) -> Result<TokenClaims> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();

    let data = jsonwebtoken::decode::<TokenClaims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map_err(ZhipuError::TokenVerification)?;
    Ok(data.claims)
}

fn unix_millis(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}

#[cfg(test)]
#[path = "jwt.test.rs"]
mod tests;
