//! HTTP client for the ZhipuAI API.

use std::future::Future;

use reqwest::Method;
use reqwest::StatusCode;
use reqwest::header::ACCEPT;
use reqwest::header::AUTHORIZATION;
use reqwest::header::CACHE_CONTROL;
use reqwest::header::CONNECTION;
use reqwest::header::CONTENT_TYPE;
use reqwest::header::HeaderMap;
use reqwest::header::HeaderValue;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::warn;

use crate::config::ClientConfig;
use crate::config::Credentials;
use crate::error::Result;
use crate::error::ZhipuError;
use crate::error::decode_error_response;
use crate::jwt;
use crate::request::RequestBuilder;
use crate::stream::ChatCompletionStream;
use crate::types::ChatCompletionRequest;
use crate::types::ChatCompletionResponse;

/// Environment variable for API key.
const API_KEY_ENV: &str = "ZHIPUAI_API_KEY";

const INVOKE_SUFFIX: &str = "/invoke";
const SSE_INVOKE_SUFFIX: &str = "/sse-invoke";

/// How a successful response body is decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeStrategy {
    /// Copy the body verbatim.
    RawText,
    /// Decode the body as JSON into the target type.
    StructuredJson,
}

/// A decoded success body.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody<T> {
    RawText(String),
    Json(T),
}

/// The ZhipuAI API client.
///
/// Holds only immutable configuration, so one client can serve concurrent
/// calls.
#[derive(Debug, Clone)]
pub struct Client {
    http_client: reqwest::Client,
    request_builder: RequestBuilder,
    config: ClientConfig,
}

impl Client {
    /// Create a new client with the given configuration.
    ///
    /// A malformed API key is rejected here, before any request is made.
    pub fn new(config: ClientConfig) -> Result<Self> {
        if !config.has_credentials() {
            return Err(ZhipuError::Configuration(
                "API key is required".to_string(),
            ));
        }
        if let Credentials::ApiKey(key) = &config.credentials {
            jwt::split_api_key(key)?;
        }

        let http_client = match &config.http_client {
            Some(client) => client.clone(),
            None => reqwest::Client::builder().timeout(config.timeout).build()?,
        };

        Ok(Self {
            http_client,
            request_builder: RequestBuilder::new(),
            config,
        })
    }

    /// Create a new client using the ZHIPUAI_API_KEY environment variable.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var(API_KEY_ENV).map_err(|_| {
            ZhipuError::Configuration(format!("Missing {API_KEY_ENV} environment variable"))
        })?;

        Self::new(ClientConfig::new(api_key))
    }

    /// Create a new client with the given API key.
    pub fn with_api_key(api_key: impl Into<String>) -> Result<Self> {
        Self::new(ClientConfig::new(api_key))
    }

    /// The configuration this client was built with.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Create a chat completion and wait for the full response.
    pub async fn create_chat_completion(
        &self,
        request: ChatCompletionRequest,
        cancel: &CancellationToken,
    ) -> Result<ChatCompletionResponse> {
        request.validate()?;
        let request = request.incremental(false);

        let url = self.full_url(INVOKE_SUFFIX, Some(&request.model));
        debug!(model = %request.model, url = %url, "creating chat completion");

        let http_request = self.new_request(Method::POST, &url, Some(&request), HeaderMap::new())?;
        self.send_json(http_request, cancel).await
    }

    /// Create a chat completion and stream the deltas.
    ///
    /// The returned stream owns the open connection; close it (or drop it)
    /// once done reading.
    pub async fn create_chat_completion_stream(
        &self,
        request: ChatCompletionRequest,
        cancel: &CancellationToken,
    ) -> Result<ChatCompletionStream> {
        request.validate()?;
        let request = request.incremental(true);

        let url = self.full_url(SSE_INVOKE_SUFFIX, Some(&request.model));
        debug!(model = %request.model, url = %url, "creating chat completion stream");

        let http_request = self.new_request(Method::POST, &url, Some(&request), HeaderMap::new())?;
        let response = self.open_stream(http_request, cancel).await?;
        let status = response.status().as_u16();

        Ok(ChatCompletionStream::new(
            response.bytes_stream(),
            status,
            &self.config,
            cancel.clone(),
        ))
    }

    /// Build a request and attach the credential.
    pub fn new_request<B>(
        &self,
        method: Method,
        url: &str,
        body: Option<&B>,
        headers: HeaderMap,
    ) -> Result<reqwest::Request>
    where
        B: Serialize + ?Sized,
    {
        let mut request = self
            .request_builder
            .build(&self.http_client, method, url, body, headers)?;
        self.set_common_headers(&mut request)?;
        Ok(request)
    }

    /// Send a request and decode the success body with `strategy`.
    ///
    /// Any status outside `[200, 400)` is decoded as an error.
    pub async fn send<T: DeserializeOwned>(
        &self,
        mut request: reqwest::Request,
        strategy: DecodeStrategy,
        cancel: &CancellationToken,
    ) -> Result<ResponseBody<T>> {
        let headers = request.headers_mut();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/json; charset=utf-8"),
        );
        if !headers.contains_key(CONTENT_TYPE) {
            headers.insert(
                CONTENT_TYPE,
                HeaderValue::from_static("application/json; charset=utf-8"),
            );
        }

        let url = request.url().to_string();
        let response = self.execute(request, cancel).await?;
        let status = response.status();

        if is_failure_status(status) {
            warn!(status = status.as_u16(), url = %url, "request failed");
            return Err(cancellable(cancel, decode_error_response(response)).await);
        }

        let body = with_cancel(cancel, async {
            response.bytes().await.map_err(ZhipuError::from)
        })
        .await?;
        decode_body(strategy, &body)
    }

    /// Send a request and decode the body as JSON.
    pub async fn send_json<T: DeserializeOwned>(
        &self,
        request: reqwest::Request,
        cancel: &CancellationToken,
    ) -> Result<T> {
        match self
            .send(request, DecodeStrategy::StructuredJson, cancel)
            .await?
        {
            ResponseBody::Json(value) => Ok(value),
            ResponseBody::RawText(_) => Err(ZhipuError::Parse(
                "expected a JSON body".to_string(),
            )),
        }
    }

    /// Send a request and return the body verbatim.
    pub async fn send_text(
        &self,
        request: reqwest::Request,
        cancel: &CancellationToken,
    ) -> Result<String> {
        match self
            .send::<serde_json::Value>(request, DecodeStrategy::RawText, cancel)
            .await?
        {
            ResponseBody::RawText(text) => Ok(text),
            ResponseBody::Json(value) => Ok(value.to_string()),
        }
    }

    /// Send a request expecting an event stream and return the open response.
    ///
    /// On a failure status the body is consumed and decoded here. On success
    /// the response is handed back unread.
    pub async fn open_stream(
        &self,
        mut request: reqwest::Request,
        cancel: &CancellationToken,
    ) -> Result<reqwest::Response> {
        let headers = request.headers_mut();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT, HeaderValue::from_static("text/event-stream"));
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
        headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));

        let url = request.url().to_string();
        let response = self.execute(request, cancel).await?;
        let status = response.status();

        if is_failure_status(status) {
            warn!(status = status.as_u16(), url = %url, "stream request failed");
            return Err(cancellable(cancel, decode_error_response(response)).await);
        }

        Ok(response)
    }

    /// Join base URL, optional model name and suffix.
    pub fn full_url(&self, suffix: &str, model: Option<&str>) -> String {
        format!(
            "{}{}{}",
            self.config.base_url,
            model.unwrap_or_default(),
            suffix
        )
    }

    fn set_common_headers(&self, request: &mut reqwest::Request) -> Result<()> {
        let token = match &self.config.credentials {
            Credentials::ApiKey(key) => jwt::generate_token(key, self.config.token_ttl)?,
            Credentials::Token(token) => token.clone(),
        };
        let value = HeaderValue::from_str(&token).map_err(|e| {
            ZhipuError::Configuration(format!("invalid authorization header: {e}"))
        })?;
        request.headers_mut().insert(AUTHORIZATION, value);
        Ok(())
    }

    async fn execute(
        &self,
        request: reqwest::Request,
        cancel: &CancellationToken,
    ) -> Result<reqwest::Response> {
        with_cancel(cancel, async {
            self.http_client
                .execute(request)
                .await
                .map_err(ZhipuError::from)
        })
        .await
    }
}

fn is_failure_status(status: StatusCode) -> bool {
    !(200..400).contains(&status.as_u16())
}

fn decode_body<T: DeserializeOwned>(
    strategy: DecodeStrategy,
    body: &[u8],
) -> Result<ResponseBody<T>> {
    match strategy {
        DecodeStrategy::RawText => String::from_utf8(body.to_vec())
            .map(ResponseBody::RawText)
            .map_err(|e| ZhipuError::Parse(format!("response body is not UTF-8: {e}"))),
        DecodeStrategy::StructuredJson => serde_json::from_slice(body)
            .map(ResponseBody::Json)
            .map_err(|e| {
                ZhipuError::Parse(format!(
                    "Failed to parse response: {e}\nBody: {}",
                    String::from_utf8_lossy(body)
                ))
            }),
    }
}

async fn with_cancel<T, F>(cancel: &CancellationToken, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ZhipuError::Cancelled),
        result = fut => result,
    }
}

async fn cancellable<F>(cancel: &CancellationToken, fut: F) -> ZhipuError
where
    F: Future<Output = ZhipuError>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => ZhipuError::Cancelled,
        error = fut => error,
    }
}

#[cfg(test)]
#[path = "client.test.rs"]
mod tests;
