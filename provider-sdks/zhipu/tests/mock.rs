//! Mock-based tests for the ZhipuAI client.
//!
//! These tests use wiremock to simulate the API without making real HTTP
//! requests, so they run offline and without credentials.
//!
//! ```bash
//! cargo test -p zhipu-sdk --test mock
//! ```

use std::time::Duration;

use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{body_partial_json, header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};
use zhipu_sdk::{
    ChatCompletionMessage, ChatCompletionRequest, Client, ClientConfig, FinishReason, StreamState,
    TURBO, ZhipuError,
};

fn client_for(server: &MockServer) -> Client {
    let config = ClientConfig::new("test_id.test_secret").base_url(format!("{}/", server.uri()));
    Client::new(config).expect("client creation should succeed")
}

fn hello_request() -> ChatCompletionRequest {
    ChatCompletionRequest::new(TURBO, vec![ChatCompletionMessage::user("hello")])
}

fn sse_frame(value: serde_json::Value) -> String {
    format!("data: {value}\n\n")
}

fn hello_sse_body() -> String {
    let mut body = String::new();
    body.push_str(&sse_frame(serde_json::json!({
        "id": "8311",
        "model": "chatglm_turbo",
        "choices": [{"index": 0, "delta": {"role": "assistant", "content": "He"}}]
    })));
    body.push_str(&sse_frame(serde_json::json!({
        "id": "8311",
        "model": "chatglm_turbo",
        "choices": [{"index": 0, "delta": {"content": "llo"}, "finish_reason": "stop"}],
        "usage": {"prompt_tokens": 1, "completion_tokens": 2, "total_tokens": 3}
    })));
    body.push_str("data: [DONE]\n\n");
    body
}

// ============================================================================
// Streaming
// ============================================================================

mod streaming {
    use super::*;

    #[tokio::test]
    async fn test_stream_hello() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chatglm_turbo/sse-invoke"))
            .and(header_exists("authorization"))
            .and(body_partial_json(serde_json::json!({
                "model": "chatglm_turbo",
                "incremental": true
            })))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw(hello_sse_body(), "text/event-stream"),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let mut stream = client
            .create_chat_completion_stream(hello_request(), &CancellationToken::new())
            .await
            .unwrap();

        let first = stream.recv().await.unwrap().unwrap();
        assert_eq!(first.delta_text(), "He");

        let second = stream.recv().await.unwrap().unwrap();
        assert_eq!(second.delta_text(), "llo");
        assert_eq!(second.finish_reason(), Some(&FinishReason::Stop));
        assert_eq!(second.usage.map(|u| u.total_tokens), Some(3));

        assert!(stream.recv().await.unwrap().is_none());
        assert_eq!(stream.state(), StreamState::Closed);
        stream.close();
    }

    #[tokio::test]
    async fn test_stream_as_futures_stream() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chatglm_turbo/sse-invoke"))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw(hello_sse_body(), "text/event-stream"),
            )
            .mount(&server)
            .await;

        let client = client_for(&server);
        let stream = client
            .create_chat_completion_stream(hello_request(), &CancellationToken::new())
            .await
            .unwrap();

        let text: Vec<String> = stream
            .into_stream()
            .map(|chunk| chunk.unwrap().delta_text())
            .collect()
            .await;
        assert_eq!(text.concat(), "Hello");
    }

    #[tokio::test]
    async fn test_stream_closed_without_done() {
        let server = MockServer::start().await;

        let body = sse_frame(serde_json::json!({
            "choices": [{"index": 0, "delta": {"content": "He"}}]
        }));
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let mut stream = client
            .create_chat_completion_stream(hello_request(), &CancellationToken::new())
            .await
            .unwrap();

        assert!(stream.recv().await.unwrap().is_some());
        let err = stream.recv().await.unwrap_err();
        assert!(matches!(err, ZhipuError::StreamTerminated), "got {err:?}");
    }

    #[tokio::test]
    async fn test_stream_error_injected_mid_stream() {
        let server = MockServer::start().await;

        let mut body = sse_frame(serde_json::json!({
            "choices": [{"index": 0, "delta": {"content": "He"}}]
        }));
        body.push_str("data: {\"error\":{\"code\":1301,\"message\":\"sensitive content\"}}\n\n");
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let mut stream = client
            .create_chat_completion_stream(hello_request(), &CancellationToken::new())
            .await
            .unwrap();

        assert!(stream.recv().await.unwrap().is_some());
        match stream.recv().await.unwrap_err() {
            ZhipuError::Api(api) => {
                assert_eq!(api.code.as_deref(), Some("1301"));
                assert_eq!(api.http_status, 200);
            }
            other => panic!("Expected Api error, got {other:?}"),
        }
        assert!(matches!(stream.recv().await, Err(ZhipuError::StreamClosed)));
    }

    #[tokio::test]
    async fn test_request_timeout_before_stream_opens() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw(hello_sse_body(), "text/event-stream")
                    .set_delay(Duration::from_secs(5)),
            )
            .mount(&server)
            .await;

        // The delay holds back the response headers, so the request timeout
        // fires before the stream is ever opened.
        let config = ClientConfig::new("test_id.test_secret")
            .base_url(format!("{}/", server.uri()))
            .timeout(Duration::from_millis(100));
        let client = Client::new(config).unwrap();

        let err = client
            .create_chat_completion_stream(hello_request(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ZhipuError::Network(ref e) if e.is_timeout()), "got {err:?}");
    }
}

// ============================================================================
// Error responses
// ============================================================================

mod errors {
    use super::*;

    #[tokio::test]
    async fn test_not_found_with_envelope() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(404).set_body_json(serde_json::json!({
                "error": {"code": "1211", "message": "model not found"}
            })))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let err = client
            .create_chat_completion(hello_request(), &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(err.status_code(), Some(404));
        assert_eq!(
            err.to_string(),
            "error, status code: 404, message: model not found"
        );
    }

    #[tokio::test]
    async fn test_server_error_with_html_body() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(500).set_body_raw("<html>bad gateway</html>", "text/html"),
            )
            .mount(&server)
            .await;

        let client = client_for(&server);
        let err = client
            .create_chat_completion(hello_request(), &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(err.status_code(), Some(500));
        assert!(matches!(err, ZhipuError::Request(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn test_stream_unauthorized() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chatglm_turbo/sse-invoke"))
            .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
                "error": {"code": "1002", "message": "invalid token"}
            })))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let err = client
            .create_chat_completion_stream(hello_request(), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(
            matches!(&err, ZhipuError::Api(api) if api.http_status == 401 && api.message == "invalid token"),
            "got {err:?}"
        );
    }
}
