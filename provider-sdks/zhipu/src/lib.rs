//! Rust SDK for the ZhipuAI ChatGLM chat completion API.
//!
//! Requests are authenticated with a short-lived JWT minted from an
//! `{id}.{secret}` API key. Streaming calls return a [`ChatCompletionStream`]
//! that is pulled one chunk at a time.
//!
//! ```no_run
//! use tokio_util::sync::CancellationToken;
//! use zhipu_sdk::ChatCompletionMessage;
//! use zhipu_sdk::ChatCompletionRequest;
//! use zhipu_sdk::Client;
//!
//! # async fn run() -> zhipu_sdk::Result<()> {
//! let client = Client::with_api_key("my-id.my-secret")?;
//! let request = ChatCompletionRequest::new(
//!     zhipu_sdk::TURBO,
//!     vec![ChatCompletionMessage::user("hello")],
//! );
//!
//! let cancel = CancellationToken::new();
//! let mut stream = client.create_chat_completion_stream(request, &cancel).await?;
//! while let Some(chunk) = stream.recv().await? {
//!     print!("{}", chunk.delta_text());
//! }
//! stream.close();
//! # Ok(())
//! # }
//! ```

mod client;
mod config;
mod error;
pub mod jwt;
mod request;
mod stream;
mod types;

pub use client::Client;
pub use client::DecodeStrategy;
pub use client::ResponseBody;
pub use config::ClientConfig;
pub use config::Credentials;
pub use error::ApiError;
pub use error::ErrorAccumulator;
pub use error::ErrorResponse;
pub use error::RequestError;
pub use error::Result;
pub use error::ZhipuError;
pub use error::decode_error_body;
pub use jwt::generate_token;
pub use request::RequestBuilder;
pub use stream::ChatCompletionStream;
pub use stream::DONE_SENTINEL;
pub use stream::StreamState;
pub use types::ChatCompletionChoice;
pub use types::ChatCompletionDelta;
pub use types::ChatCompletionMessage;
pub use types::ChatCompletionRequest;
pub use types::ChatCompletionResponse;
pub use types::ChatCompletionStreamChoice;
pub use types::ChatCompletionStreamResponse;
pub use types::FinishReason;
pub use types::LITE;
pub use types::PRO;
pub use types::Role;
pub use types::STD;
pub use types::TURBO;
pub use types::Usage;
