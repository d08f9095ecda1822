use super::*;
use reqwest::header::HeaderValue;

struct Unserializable;

impl Serialize for Unserializable {
    fn serialize<S>(&self, _serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        Err(serde::ser::Error::custom("cannot encode"))
    }
}

#[test]
fn test_build_with_json_body() {
    let http = reqwest::Client::new();
    let body = serde_json::json!({"model": "chatglm_turbo"});

    let request = RequestBuilder::new()
        .build(
            &http,
            Method::POST,
            "http://localhost/chatglm_turbo/invoke",
            Some(&body),
            HeaderMap::new(),
        )
        .unwrap();

    assert_eq!(request.method(), Method::POST);
    assert_eq!(request.url().path(), "/chatglm_turbo/invoke");
    let bytes = request.body().and_then(|b| b.as_bytes()).unwrap();
    assert_eq!(bytes, br#"{"model":"chatglm_turbo"}"#);
}

#[test]
fn test_build_without_body() {
    let http = reqwest::Client::new();
    let request = RequestBuilder::new()
        .build::<()>(&http, Method::GET, "http://localhost/", None, HeaderMap::new())
        .unwrap();

    assert!(request.body().is_none());
}

#[test]
fn test_build_keeps_caller_headers() {
    let http = reqwest::Client::new();
    let mut headers = HeaderMap::new();
    headers.insert("x-trace", HeaderValue::from_static("abc"));

    let mut request = RequestBuilder::new()
        .build::<()>(&http, Method::GET, "http://localhost/", None, headers)
        .unwrap();
    assert_eq!(request.headers()["x-trace"], "abc");

    // Later writes win over the defaults given to the builder.
    request
        .headers_mut()
        .insert("x-trace", HeaderValue::from_static("override"));
    assert_eq!(request.headers()["x-trace"], "override");
}

#[test]
fn test_build_serialization_failure() {
    let http = reqwest::Client::new();
    let result = RequestBuilder::new().build(
        &http,
        Method::POST,
        "http://localhost/",
        Some(&Unserializable),
        HeaderMap::new(),
    );

    assert!(matches!(result, Err(ZhipuError::Serialization(_))));
}
