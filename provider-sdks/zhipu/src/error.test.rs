use super::*;
use pretty_assertions::assert_eq;

#[test]
fn test_decode_structured_error_overwrites_status() {
    let body = br#"{"error":{"code":"1214","message":"model not found"}}"#;
    let error = decode_error_body(404, body);

    match error {
        ZhipuError::Api(api) => {
            assert_eq!(api.http_status, 404);
            assert_eq!(api.code.as_deref(), Some("1214"));
            assert_eq!(api.message, "model not found");
        }
        other => panic!("Expected Api error, got {other:?}"),
    }
}

#[test]
fn test_decode_numeric_code() {
    let body = br#"{"error":{"code":1301,"message":"sensitive content"}}"#;
    let error = decode_error_body(400, body);
    assert!(matches!(
        error,
        ZhipuError::Api(ApiError { code: Some(ref code), .. }) if code == "1301"
    ));
}

#[test]
fn test_decode_unparseable_body_falls_back_to_status() {
    let error = decode_error_body(500, b"<html>Internal Server Error</html>");

    match error {
        ZhipuError::Request(req) => {
            assert_eq!(req.http_status, 500);
            assert!(req.detail.is_some());
        }
        other => panic!("Expected Request error, got {other:?}"),
    }
}

#[test]
fn test_decode_missing_error_field_falls_back() {
    let error = decode_error_body(502, br#"{"msg":"bad gateway"}"#);
    assert_eq!(
        error.status_code(),
        Some(502),
        "fallback keeps the original status"
    );
    assert!(matches!(
        error,
        ZhipuError::Request(RequestError {
            http_status: 502,
            detail: None
        })
    ));
}

#[test]
fn test_request_error_display() {
    let bare = RequestError {
        http_status: 503,
        detail: None,
    };
    assert_eq!(bare.to_string(), "error, status code: 503");

    let detailed = RequestError {
        http_status: 500,
        detail: Some("expected value".to_string()),
    };
    assert_eq!(detailed.to_string(), "error, status code: 500, expected value");
}

#[test]
fn test_accumulator_structured_error() {
    let mut acc = ErrorAccumulator::new();
    assert!(acc.is_empty());
    assert!(acc.structured_error(200).is_none());

    acc.write(br#"{"error":{"code":"1113","#);
    assert!(acc.structured_error(200).is_none());

    acc.write(br#""message":"account in arrears"}}"#);
    let error = acc.structured_error(200).expect("complete envelope");
    assert_eq!(error.http_status, 200);
    assert_eq!(error.message, "account in arrears");
}

#[test]
fn test_accumulator_ignores_plain_text() {
    let mut acc = ErrorAccumulator::new();
    acc.write(b"event: add");
    acc.write(b"id: 42");
    assert_eq!(acc.bytes(), b"event: addid: 42");
    assert!(acc.structured_error(200).is_none());
}

#[test]
fn test_status_code() {
    assert_eq!(ZhipuError::Cancelled.status_code(), None);
    assert_eq!(ZhipuError::StreamTerminated.status_code(), None);
    assert_eq!(
        ZhipuError::Api(ApiError {
            code: None,
            message: "x".to_string(),
            http_status: 429,
        })
        .status_code(),
        Some(429)
    );
}
