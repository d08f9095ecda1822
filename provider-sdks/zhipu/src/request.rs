//! Request assembly.

use reqwest::Method;
use reqwest::header::HeaderMap;
use serde::Serialize;

use crate::error::Result;
use crate::error::ZhipuError;

/// Builds `reqwest` requests from a method, URL, optional JSON body and headers.
///
/// Headers given here are defaults: anything the caller sets on the returned
/// request afterwards takes precedence.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestBuilder;

impl RequestBuilder {
    pub fn new() -> Self {
        Self
    }

    /// Build a request. The body, when present, is encoded as JSON.
    pub fn build<B>(
        &self,
        http_client: &reqwest::Client,
        method: Method,
        url: &str,
        body: Option<&B>,
        headers: HeaderMap,
    ) -> Result<reqwest::Request>
    where
        B: Serialize + ?Sized,
    {
        let mut builder = http_client.request(method, url).headers(headers);
        if let Some(body) = body {
            let bytes = serde_json::to_vec(body).map_err(ZhipuError::Serialization)?;
            builder = builder.body(bytes);
        }
        builder.build().map_err(ZhipuError::from)
    }
}

#[cfg(test)]
#[path = "request.test.rs"]
mod tests;
