use std::time::Duration;

use super::*;
use pretty_assertions::assert_eq;
use wiremock::Mock;
use wiremock::MockServer;
use wiremock::ResponseTemplate;
use wiremock::matchers::body_partial_json;
use wiremock::matchers::header;
use wiremock::matchers::header_exists;
use wiremock::matchers::method;
use wiremock::matchers::path;

use crate::error::RequestError;
use crate::types::ChatCompletionMessage;
use crate::types::TURBO;

const API_KEY: &str = "test_id.test_secret";

fn make_client(base_url: &str) -> Client {
    let config = ClientConfig::new(API_KEY).base_url(format!("{base_url}/"));
    Client::new(config).expect("client creation should succeed")
}

fn hello_request() -> ChatCompletionRequest {
    ChatCompletionRequest::new(TURBO, vec![ChatCompletionMessage::user("hello")]).temperature(0.5)
}

fn completion_json() -> serde_json::Value {
    serde_json::json!({
        "id": "8311",
        "created": 1700000000,
        "model": "chatglm_turbo",
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": "Hello!"},
            "finish_reason": "stop"
        }],
        "usage": {"prompt_tokens": 1, "completion_tokens": 2, "total_tokens": 3}
    })
}

#[test]
fn test_client_requires_api_key() {
    let result = Client::new(ClientConfig::default());
    assert!(matches!(result, Err(ZhipuError::Configuration(_))));
}

#[test]
fn test_client_rejects_malformed_api_key() {
    let result = Client::with_api_key("not-a-key");
    assert!(matches!(result, Err(ZhipuError::InvalidCredentialFormat(_))));
}

#[test]
fn test_client_with_api_key() {
    assert!(Client::with_api_key(API_KEY).is_ok());
    assert!(Client::new(ClientConfig::with_token("pre-minted")).is_ok());
}

#[test]
fn test_full_url() {
    let client = Client::new(ClientConfig::new(API_KEY).base_url("https://host/api/")).unwrap();
    assert_eq!(
        client.full_url("/sse-invoke", Some("chatglm_pro")),
        "https://host/api/chatglm_pro/sse-invoke"
    );
    assert_eq!(client.full_url("models", None), "https://host/api/models");
}

#[test]
fn test_failure_status_classification() {
    assert!(!is_failure_status(StatusCode::OK));
    assert!(!is_failure_status(StatusCode::NO_CONTENT));
    assert!(!is_failure_status(StatusCode::NOT_MODIFIED));
    assert!(is_failure_status(StatusCode::CONTINUE));
    assert!(is_failure_status(StatusCode::BAD_REQUEST));
    assert!(is_failure_status(StatusCode::INTERNAL_SERVER_ERROR));
}

#[test]
fn test_authorization_overrides_caller_header() {
    let client = Client::new(ClientConfig::with_token("server-token")).unwrap();
    let mut headers = HeaderMap::new();
    headers.insert(AUTHORIZATION, HeaderValue::from_static("caller-token"));

    let request = client
        .new_request::<()>(Method::GET, "http://localhost/", None, headers)
        .unwrap();
    assert_eq!(request.headers()[AUTHORIZATION], "server-token");
}

#[test]
fn test_minted_token_verifies_with_secret() {
    let client = Client::with_api_key(API_KEY).unwrap();
    let request = client
        .new_request::<()>(Method::GET, "http://localhost/", None, HeaderMap::new())
        .unwrap();

    let token = request.headers()[AUTHORIZATION].to_str().unwrap();
    let claims = jwt::verify_token(token, "test_secret").unwrap();
    assert_eq!(claims.api_key, "test_id");
    assert_eq!(
        claims.exp - claims.timestamp,
        ClientConfig::DEFAULT_TOKEN_TTL.as_millis() as i64
    );
}

#[tokio::test]
async fn test_create_chat_completion_success() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chatglm_turbo/invoke"))
        .and(header_exists("authorization"))
        .and(header("accept", "application/json; charset=utf-8"))
        .and(body_partial_json(serde_json::json!({
            "model": "chatglm_turbo",
            "messages": [{"role": "user", "content": "hello"}],
            "incremental": false
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion_json()))
        .mount(&mock_server)
        .await;

    let client = make_client(&mock_server.uri());
    let response = client
        .create_chat_completion(hello_request(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(response.id, "8311");
    assert_eq!(response.text(), "Hello!");
    assert_eq!(response.usage.total_tokens, 3);
}

#[tokio::test]
async fn test_send_structured_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chatglm_turbo/invoke"))
        .respond_with(ResponseTemplate::new(404).set_body_json(serde_json::json!({
            "error": {"code": "1211", "message": "model does not exist"}
        })))
        .mount(&mock_server)
        .await;

    let client = make_client(&mock_server.uri());
    let err = client
        .create_chat_completion(hello_request(), &CancellationToken::new())
        .await
        .unwrap_err();

    match err {
        ZhipuError::Api(api) => {
            assert_eq!(api.http_status, 404);
            assert_eq!(api.code.as_deref(), Some("1211"));
            assert_eq!(api.message, "model does not exist");
        }
        other => panic!("Expected Api error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_send_unparseable_error_body() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream exploded"))
        .mount(&mock_server)
        .await;

    let client = make_client(&mock_server.uri());
    let err = client
        .create_chat_completion(hello_request(), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(
        matches!(err, ZhipuError::Request(RequestError { http_status: 500, .. })),
        "got {err:?}"
    );
}

#[tokio::test]
async fn test_send_text_returns_body_verbatim() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json at all"))
        .mount(&mock_server)
        .await;

    let client = make_client(&mock_server.uri());
    let url = client.full_url("health", None);
    let request = client
        .new_request::<()>(Method::GET, &url, None, HeaderMap::new())
        .unwrap();

    let text = client
        .send_text(request, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(text, "not json at all");
}

#[tokio::test]
async fn test_send_json_parse_failure() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json at all"))
        .mount(&mock_server)
        .await;

    let client = make_client(&mock_server.uri());
    let result = client
        .create_chat_completion(hello_request(), &CancellationToken::new())
        .await;
    assert!(matches!(result, Err(ZhipuError::Parse(_))));
}

#[tokio::test]
async fn test_pre_minted_token_sent_verbatim() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(header("authorization", "pre-minted-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion_json()))
        .mount(&mock_server)
        .await;

    let config =
        ClientConfig::with_token("pre-minted-token").base_url(format!("{}/", mock_server.uri()));
    let client = Client::new(config).unwrap();
    let response = client
        .create_chat_completion(hello_request(), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(response.text(), "Hello!");
}

#[tokio::test]
async fn test_validation_happens_before_network() {
    // Nothing listens here; validation must fail first.
    let client = make_client("http://127.0.0.1:9");
    let request = ChatCompletionRequest::new(TURBO, vec![]);

    let result = client
        .create_chat_completion_stream(request, &CancellationToken::new())
        .await;
    assert!(matches!(result, Err(ZhipuError::Validation(_))));
}

#[tokio::test]
async fn test_stream_open_failure_decoded_eagerly() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chatglm_turbo/sse-invoke"))
        .respond_with(ResponseTemplate::new(429).set_body_json(serde_json::json!({
            "error": {"code": "1302", "message": "too many requests"}
        })))
        .mount(&mock_server)
        .await;

    let client = make_client(&mock_server.uri());
    let err = client
        .create_chat_completion_stream(hello_request(), &CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(err.status_code(), Some(429));
    assert!(matches!(err, ZhipuError::Api(ref api) if api.message == "too many requests"));
}

#[tokio::test]
async fn test_stream_request_headers_and_body() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chatglm_turbo/sse-invoke"))
        .and(header("accept", "text/event-stream"))
        .and(header("cache-control", "no-cache"))
        .and(header("content-type", "application/json"))
        .and(body_partial_json(serde_json::json!({"incremental": true})))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw("data: [DONE]\n\n", "text/event-stream"),
        )
        .mount(&mock_server)
        .await;

    let client = make_client(&mock_server.uri());
    let mut stream = client
        .create_chat_completion_stream(hello_request(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(stream.http_status(), 200);
    assert!(stream.recv().await.unwrap().is_none());
    stream.close();
}

#[tokio::test]
async fn test_cancel_in_flight_request() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(completion_json())
                .set_delay(Duration::from_secs(30)),
        )
        .mount(&mock_server)
        .await;

    let client = make_client(&mock_server.uri());
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let result = client.create_chat_completion(hello_request(), &cancel).await;
    assert!(matches!(result, Err(ZhipuError::Cancelled)));
}

#[tokio::test]
async fn test_custom_http_client_is_used() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(header("x-client", "custom"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion_json()))
        .expect(1)
        .mount(&mock_server)
        .await;

    let mut defaults = HeaderMap::new();
    defaults.insert("x-client", HeaderValue::from_static("custom"));
    let http_client = reqwest::Client::builder()
        .default_headers(defaults)
        .build()
        .unwrap();

    let config = ClientConfig::new(API_KEY)
        .base_url(format!("{}/", mock_server.uri()))
        .http_client(http_client);
    let client = Client::new(config).unwrap();

    let response = client
        .create_chat_completion(hello_request(), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(response.text(), "Hello!");
}
