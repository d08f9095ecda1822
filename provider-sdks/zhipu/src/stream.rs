//! Pull-based decoding of streamed chat completions.
//!
//! The server answers a streaming call with Server-Sent Events:
//!
//! ```text
//! data: {"id":"1","choices":[{"index":0,"delta":{"role":"assistant","content":"He"}}]}
//!
//! data: {"id":"1","choices":[{"index":0,"delta":{"content":"llo"}}]}
//!
//! data: [DONE]
//! ```
//!
//! Each `data:` line is one JSON chunk. Normal completion is signalled only by
//! the `[DONE]` sentinel; a connection that ends without it is an error.
//!
//! Lines that are not data lines are collected in an [`ErrorAccumulator`],
//! which is reset whenever a frame is delivered.
//! When the provider injects an error envelope into the stream
//! (`data: {"error": ...}`) or the connection breaks, the collected bytes are
//! decoded as a structured error before falling back to the transport error.

use std::pin::Pin;
use std::time::Duration;

use bytes::Bytes;
use futures::stream::Stream;
use futures::stream::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::warn;

use crate::config::ClientConfig;
use crate::error::ErrorAccumulator;
use crate::error::Result;
use crate::error::ZhipuError;
use crate::types::ChatCompletionStreamResponse;

/// Payload that marks the normal end of a stream.
pub const DONE_SENTINEL: &str = "[DONE]";

const DATA_PREFIX: &[u8] = b"data:";
const ERROR_PAYLOAD_PREFIX: &[u8] = b"{\"error\"";

type ByteStream = Pin<Box<dyn Stream<Item = std::result::Result<Bytes, reqwest::Error>> + Send>>;

/// Lifecycle of a [`ChatCompletionStream`].
///
/// `Closed` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// Opened, nothing received yet.
    Open,
    /// At least one chunk delivered.
    Receiving,
    /// `[DONE]` observed.
    Closed,
    /// A terminal error was returned.
    Failed,
}

/// A streamed chat completion.
///
/// Call [`recv`](Self::recv) until it returns `Ok(None)` (normal end) or an
/// error, then [`close`](Self::close). Dropping the stream also releases the
/// connection. Nothing is read ahead of the caller: each `recv` reads only
/// as many network chunks as it takes to complete one frame.
pub struct ChatCompletionStream {
    body: Option<ByteStream>,
    buffer: Vec<u8>,
    eof: bool,
    state: StreamState,
    http_status: u16,
    accumulator: ErrorAccumulator,
    empty_messages_limit: usize,
    idle_timeout: Option<Duration>,
    cancel: CancellationToken,
}

impl std::fmt::Debug for ChatCompletionStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatCompletionStream")
            .field("state", &self.state)
            .field("http_status", &self.http_status)
            .field("released", &self.body.is_none())
            .field("buffered", &self.buffer.len())
            .finish()
    }
}

impl ChatCompletionStream {
    /// Wrap an open response body.
    pub(crate) fn new<S>(
        body: S,
        http_status: u16,
        config: &ClientConfig,
        cancel: CancellationToken,
    ) -> Self
    where
        S: Stream<Item = std::result::Result<Bytes, reqwest::Error>> + Send + 'static,
    {
        Self {
            body: Some(Box::pin(body)),
            buffer: Vec::new(),
            eof: false,
            state: StreamState::Open,
            http_status,
            accumulator: ErrorAccumulator::new(),
            empty_messages_limit: config.empty_messages_limit,
            idle_timeout: config.stream_idle_timeout,
            cancel,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> StreamState {
        self.state
    }

    /// HTTP status the stream was opened with.
    pub fn http_status(&self) -> u16 {
        self.http_status
    }

    /// Receive the next chunk.
    ///
    /// Returns `Ok(None)` once `[DONE]` has been seen, and keeps doing so on
    /// later calls. Any error moves the stream to [`StreamState::Failed`];
    /// later calls then return [`ZhipuError::StreamClosed`].
    pub async fn recv(&mut self) -> Result<Option<ChatCompletionStreamResponse>> {
        match self.state {
            StreamState::Closed => return Ok(None),
            StreamState::Failed => return Err(ZhipuError::StreamClosed),
            StreamState::Open | StreamState::Receiving => {}
        }
        if self.body.is_none() {
            return Err(ZhipuError::StreamClosed);
        }

        let payload = match self.next_payload().await {
            Ok(Some(payload)) => payload,
            Ok(None) => {
                debug!(status = self.http_status, "stream finished");
                self.state = StreamState::Closed;
                self.close();
                return Ok(None);
            }
            Err(e) => return Err(self.fail(e)),
        };

        match serde_json::from_slice::<ChatCompletionStreamResponse>(&payload) {
            Ok(chunk) => {
                self.state = StreamState::Receiving;
                Ok(Some(chunk))
            }
            Err(e) => {
                let error = ZhipuError::StreamDecode(format!(
                    "{e}; data: {}",
                    String::from_utf8_lossy(&payload)
                ));
                Err(self.fail(error))
            }
        }
    }

    /// Release the underlying connection. Safe to call more than once.
    pub fn close(&mut self) {
        self.body = None;
        self.buffer.clear();
    }

    /// Adapt into a `futures::Stream` that ends at `[DONE]` and stops after
    /// the first error.
    pub fn into_stream(self) -> impl Stream<Item = Result<ChatCompletionStreamResponse>> + Send {
        futures::stream::unfold(Some(self), |state| async move {
            let mut stream = state?;
            match stream.recv().await {
                Ok(Some(chunk)) => Some((Ok(chunk), Some(stream))),
                Ok(None) => None,
                Err(e) => Some((Err(e), None)),
            }
        })
    }

    fn fail(&mut self, error: ZhipuError) -> ZhipuError {
        warn!(status = self.http_status, error = %error, "stream failed");
        self.state = StreamState::Failed;
        self.close();
        error
    }

    /// Read lines until one data payload is complete.
    ///
    /// `Ok(None)` means the sentinel was read.
    async fn next_payload(&mut self) -> Result<Option<Vec<u8>>> {
        let mut empty_messages = 0usize;
        let mut has_error_prefix = false;
        // Only lines read while waiting for this payload are decoded on failure.
        self.accumulator.clear();

        loop {
            let raw = match self.read_line().await {
                Ok(Some(line)) => line,
                Ok(None) => return Err(self.accumulated_or(ZhipuError::StreamTerminated)),
                Err(e @ ZhipuError::Network(_)) => return Err(self.accumulated_or(e)),
                Err(e) => return Err(e),
            };
            let line = raw.trim_ascii();

            if !has_error_prefix
                && strip_data_prefix(line).is_some_and(|p| p.starts_with(ERROR_PAYLOAD_PREFIX))
            {
                // Stray event/id lines seen so far are not part of the envelope.
                self.accumulator.clear();
                has_error_prefix = true;
            }

            if has_error_prefix {
                self.accumulator.write(strip_data_prefix(line).unwrap_or(line));
                if let Some(error) = self.accumulator.structured_error(self.http_status) {
                    return Err(ZhipuError::Api(error));
                }
            } else if let Some(payload) = strip_data_prefix(line) {
                if payload == DONE_SENTINEL.as_bytes() {
                    self.accumulator.clear();
                    return Ok(None);
                }
                if !payload.is_empty() {
                    let payload = payload.to_vec();
                    self.accumulator.clear();
                    return Ok(Some(payload));
                }
            } else {
                self.accumulator.write(line);
            }

            empty_messages += 1;
            if empty_messages > self.empty_messages_limit {
                return Err(ZhipuError::TooManyEmptyStreamMessages);
            }
        }
    }

    /// Prefer a structured error decoded from the accumulated bytes.
    fn accumulated_or(&self, fallback: ZhipuError) -> ZhipuError {
        match self.accumulator.structured_error(self.http_status) {
            Some(error) => ZhipuError::Api(error),
            None => fallback,
        }
    }

    /// Read one line without its terminator.
    ///
    /// An unterminated trailing line is returned once the body ends.
    async fn read_line(&mut self) -> Result<Option<Vec<u8>>> {
        loop {
            if let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
                let mut line: Vec<u8> = self.buffer.drain(..=pos).collect();
                line.pop();
                return Ok(Some(line));
            }
            if self.eof {
                if self.buffer.is_empty() {
                    return Ok(None);
                }
                return Ok(Some(std::mem::take(&mut self.buffer)));
            }
            match self.next_chunk().await? {
                Some(bytes) => self.buffer.extend_from_slice(&bytes),
                None => self.eof = true,
            }
        }
    }

    async fn next_chunk(&mut self) -> Result<Option<Bytes>> {
        let idle_timeout = self.idle_timeout;
        let cancel = &self.cancel;
        let Some(body) = self.body.as_mut() else {
            return Err(ZhipuError::StreamClosed);
        };

        let read = async {
            match idle_timeout {
                Some(idle) => tokio::time::timeout(idle, body.next())
                    .await
                    .map_err(|_| ZhipuError::StreamIdleTimeout(idle)),
                None => Ok(body.next().await),
            }
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ZhipuError::Cancelled),
            next = read => match next? {
                Some(Ok(bytes)) => Ok(Some(bytes)),
                Some(Err(e)) => Err(ZhipuError::Network(e)),
                None => Ok(None),
            },
        }
    }
}

/// Strip `data:` and one optional following space.
fn strip_data_prefix(line: &[u8]) -> Option<&[u8]> {
    let rest = line.strip_prefix(DATA_PREFIX)?;
    Some(rest.strip_prefix(b" ").unwrap_or(rest))
}

#[cfg(test)]
#[path = "stream.test.rs"]
mod tests;
