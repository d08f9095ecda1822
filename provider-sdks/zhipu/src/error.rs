//! Error types for the ZhipuAI SDK.

use std::time::Duration;

use serde::Deserialize;
use serde::Deserializer;
use thiserror::Error;

/// Result type alias using ZhipuError.
pub type Result<T> = std::result::Result<T, ZhipuError>;

/// Errors that can occur when using the ZhipuAI SDK.
#[derive(Debug, Error)]
pub enum ZhipuError {
    /// API key is not of the form `{id}.{secret}`.
    #[error("invalid credential format: {0}")]
    InvalidCredentialFormat(String),

    /// The signer rejected the secret or the claims.
    #[error("failed to sign token: {0}")]
    Signing(#[from] jsonwebtoken::errors::Error),

    /// A token failed signature verification or could not be decoded.
    #[error("failed to verify token: {0}")]
    TokenVerification(#[source] jsonwebtoken::errors::Error),

    /// Request body could not be encoded.
    #[error("failed to serialize request body: {0}")]
    Serialization(#[source] serde_json::Error),

    /// Client configuration error.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Request rejected before it was sent.
    #[error("validation error: {0}")]
    Validation(String),

    /// Network or transport error.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The server answered with a structured error envelope.
    #[error(transparent)]
    Api(#[from] ApiError),

    /// The server answered with a failure status and an unusable body.
    #[error(transparent)]
    Request(#[from] RequestError),

    /// A successful response body could not be decoded.
    #[error("parse error: {0}")]
    Parse(String),

    /// A stream frame carried malformed JSON.
    #[error("stream decode error: {0}")]
    StreamDecode(String),

    /// The connection closed without the `[DONE]` sentinel.
    #[error("stream terminated before the [DONE] sentinel")]
    StreamTerminated,

    /// Too many non-data lines were read while waiting for a frame.
    #[error("stream has sent too many empty messages")]
    TooManyEmptyStreamMessages,

    /// No bytes arrived within the configured idle window.
    #[error("stream idle timeout after {0:?}")]
    StreamIdleTimeout(Duration),

    /// `recv` was called on a failed or released stream.
    #[error("stream is closed")]
    StreamClosed,

    /// The caller cancelled the operation.
    #[error("request cancelled")]
    Cancelled,
}

impl ZhipuError {
    /// HTTP status code carried by the error, if it came from a response.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            ZhipuError::Api(e) => Some(e.http_status),
            ZhipuError::Request(e) => Some(e.http_status),
            ZhipuError::Network(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

/// Provider error as reported inside `{"error": {...}}`.
///
/// `code` is the provider's own error code. `http_status` is never read from
/// the body; it is always overwritten with the status of the response the
/// envelope arrived on.
#[derive(Debug, Clone, PartialEq, Eq, Error, Deserialize)]
#[error("error, status code: {http_status}, message: {message}")]
pub struct ApiError {
    /// Provider-defined error code.
    #[serde(default, deserialize_with = "deserialize_code")]
    pub code: Option<String>,
    /// Human readable error message.
    #[serde(default)]
    pub message: String,
    /// HTTP status of the response.
    #[serde(skip)]
    pub http_status: u16,
}

/// Fallback error for failure responses whose body is not an error envelope.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("error, status code: {http_status}{}", detail_suffix(.detail))]
pub struct RequestError {
    /// HTTP status of the response.
    pub http_status: u16,
    /// Why the body could not be decoded, when known.
    pub detail: Option<String>,
}

fn detail_suffix(detail: &Option<String>) -> String {
    detail
        .as_deref()
        .map(|d| format!(", {d}"))
        .unwrap_or_default()
}

/// Error envelope returned by the API.
#[derive(Debug, Default, Deserialize)]
pub struct ErrorResponse {
    #[serde(default)]
    pub error: Option<ApiError>,
}

// Codes arrive both as strings ("1214") and as bare numbers.
fn deserialize_code<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

/// Decode a failure body into a structured error.
///
/// Falls back to [`RequestError`] carrying only the status when the body is
/// not JSON or lacks the `error` field.
pub fn decode_error_body(http_status: u16, body: &[u8]) -> ZhipuError {
    match serde_json::from_slice::<ErrorResponse>(body) {
        Ok(ErrorResponse { error: Some(mut error) }) => {
            error.http_status = http_status;
            ZhipuError::Api(error)
        }
        Ok(ErrorResponse { error: None }) => ZhipuError::Request(RequestError {
            http_status,
            detail: None,
        }),
        Err(e) => ZhipuError::Request(RequestError {
            http_status,
            detail: Some(e.to_string()),
        }),
    }
}

/// Consume a failed response and decode its body.
///
/// The body is read exactly once.
pub(crate) async fn decode_error_response(response: reqwest::Response) -> ZhipuError {
    let status = response.status().as_u16();
    match response.bytes().await {
        Ok(body) => decode_error_body(status, &body),
        Err(e) => ZhipuError::Request(RequestError {
            http_status: status,
            detail: Some(e.to_string()),
        }),
    }
}

/// Raw bytes collected from a stream that may turn out to be an error.
#[derive(Debug, Default)]
pub struct ErrorAccumulator {
    buffer: Vec<u8>,
}

impl ErrorAccumulator {
    /// Create an empty accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append bytes.
    pub fn write(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Discard everything accumulated so far.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    /// Bytes seen so far.
    pub fn bytes(&self) -> &[u8] {
        &self.buffer
    }

    /// Whether nothing has been accumulated.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Decode the accumulated bytes as an error envelope.
    ///
    /// Returns `None` unless the bytes form a complete envelope with an
    /// `error` field.
    pub fn structured_error(&self, http_status: u16) -> Option<ApiError> {
        if self.buffer.is_empty() {
            return None;
        }
        match decode_error_body(http_status, &self.buffer) {
            ZhipuError::Api(error) => Some(error),
            _ => None,
        }
    }
}

#[cfg(test)]
#[path = "error.test.rs"]
mod tests;
