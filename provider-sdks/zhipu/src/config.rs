//! Client configuration for the ZhipuAI SDK.

use std::fmt::Debug;
use std::time::Duration;

/// How requests are authenticated.
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    /// An `{id}.{secret}` API key. A fresh token is minted for every request.
    ApiKey(String),
    /// A pre-minted token, sent verbatim.
    Token(String),
}

impl Credentials {
    fn is_empty(&self) -> bool {
        match self {
            Credentials::ApiKey(key) => key.is_empty(),
            Credentials::Token(token) => token.is_empty(),
        }
    }
}

impl Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Credentials::ApiKey(_) => f.write_str("ApiKey([REDACTED])"),
            Credentials::Token(_) => f.write_str("Token([REDACTED])"),
        }
    }
}

/// Configuration for the ZhipuAI client.
///
/// Immutable once handed to [`crate::Client::new`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Credentials for the `Authorization` header.
    pub credentials: Credentials,
    /// Base URL; the model name and endpoint suffix are appended verbatim.
    pub base_url: String,
    /// Request timeout.
    pub timeout: Duration,
    /// Validity of tokens minted from an API key.
    pub token_ttl: Duration,
    /// Non-data lines tolerated while waiting for one stream frame.
    pub empty_messages_limit: usize,
    /// Fail a stream when no bytes arrive for this long.
    pub stream_idle_timeout: Option<Duration>,
    /// Caller-supplied HTTP client. When set, `timeout` is not applied;
    /// configure it on this client instead.
    pub http_client: Option<reqwest::Client>,
}

impl ClientConfig {
    /// Default base URL for the ZhipuAI model API.
    pub const DEFAULT_BASE_URL: &'static str = "https://open.bigmodel.cn/api/paas/v3/model-api/";

    /// Default timeout (10 minutes).
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(600);

    /// Default token validity (30 minutes).
    pub const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(30 * 60);

    /// Default empty message limit.
    pub const DEFAULT_EMPTY_MESSAGES_LIMIT: usize = 300;

    /// Create a configuration that signs requests with `api_key`.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_credentials(Credentials::ApiKey(api_key.into()))
    }

    /// Create a configuration that sends a pre-minted token.
    pub fn with_token(token: impl Into<String>) -> Self {
        Self::with_credentials(Credentials::Token(token.into()))
    }

    fn with_credentials(credentials: Credentials) -> Self {
        Self {
            credentials,
            base_url: Self::DEFAULT_BASE_URL.to_string(),
            timeout: Self::DEFAULT_TIMEOUT,
            token_ttl: Self::DEFAULT_TOKEN_TTL,
            empty_messages_limit: Self::DEFAULT_EMPTY_MESSAGES_LIMIT,
            stream_idle_timeout: None,
            http_client: None,
        }
    }

    /// Set the base URL.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Set the request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the validity of minted tokens.
    pub fn token_ttl(mut self, ttl: Duration) -> Self {
        self.token_ttl = ttl;
        self
    }

    /// Set the empty message limit for streams.
    pub fn empty_messages_limit(mut self, limit: usize) -> Self {
        self.empty_messages_limit = limit;
        self
    }

    /// Set the stream idle timeout.
    pub fn stream_idle_timeout(mut self, timeout: Duration) -> Self {
        self.stream_idle_timeout = Some(timeout);
        self
    }

    /// Use `client` for all requests instead of building one.
    pub fn http_client(mut self, client: reqwest::Client) -> Self {
        self.http_client = Some(client);
        self
    }

    pub(crate) fn has_credentials(&self) -> bool {
        !self.credentials.is_empty()
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new(String::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_new() {
        let config = ClientConfig::new("id.secret");
        assert_eq!(config.credentials, Credentials::ApiKey("id.secret".to_string()));
        assert_eq!(config.base_url, ClientConfig::DEFAULT_BASE_URL);
        assert_eq!(config.timeout, ClientConfig::DEFAULT_TIMEOUT);
        assert_eq!(config.token_ttl, ClientConfig::DEFAULT_TOKEN_TTL);
        assert_eq!(config.empty_messages_limit, 300);
        assert_eq!(config.stream_idle_timeout, None);
        assert!(config.http_client.is_none());
    }

    #[test]
    fn test_config_builder() {
        let config = ClientConfig::with_token("jwt")
            .base_url("http://localhost:8080/")
            .timeout(Duration::from_secs(30))
            .token_ttl(Duration::from_secs(60))
            .empty_messages_limit(5)
            .stream_idle_timeout(Duration::from_secs(10));

        assert_eq!(config.credentials, Credentials::Token("jwt".to_string()));
        assert_eq!(config.base_url, "http://localhost:8080/");
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(config.token_ttl, Duration::from_secs(60));
        assert_eq!(config.empty_messages_limit, 5);
        assert_eq!(config.stream_idle_timeout, Some(Duration::from_secs(10)));
    }

    #[test]
    fn test_config_custom_http_client() {
        let config = ClientConfig::new("id.secret").http_client(reqwest::Client::new());
        assert!(config.http_client.is_some());
    }

    #[test]
    fn test_debug_redacts_credentials() {
        let config = ClientConfig::new("id.very-secret");
        let debug = format!("{config:?}");
        assert!(!debug.contains("very-secret"));
        assert!(debug.contains("REDACTED"));
    }

    #[test]
    fn test_default_has_no_credentials() {
        assert!(!ClientConfig::default().has_credentials());
    }
}
