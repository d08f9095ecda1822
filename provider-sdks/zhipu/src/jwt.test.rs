use super::*;
use pretty_assertions::assert_eq;

#[test]
fn test_split_valid_key() {
    let parts = split_api_key("111222333.55566633").unwrap();
    assert_eq!(parts.id, "111222333");
    assert_eq!(parts.secret, "55566633");
}

#[test]
fn test_split_rejects_malformed_keys() {
    for key in ["invalid_key", ".secret", "id.", "a.b.c", "", "."] {
        let result = split_api_key(key);
        assert!(
            matches!(result, Err(ZhipuError::InvalidCredentialFormat(_))),
            "{key:?} should be rejected"
        );
    }
}

#[test]
fn test_generate_token_rejects_malformed_key() {
    let result = generate_token("no-separator", Duration::from_secs(60));
    assert!(matches!(result, Err(ZhipuError::InvalidCredentialFormat(_))));
}

#[test]
fn test_token_has_three_segments() {
    let token = generate_token("test_id.test_secret", Duration::from_secs(60)).unwrap();
    assert_eq!(token.split('.').count(), 3);
}

#[test]
fn test_token_header_carries_sign_type() {
    let token = generate_token("test_id.test_secret", Duration::from_secs(60)).unwrap();
    let header_segment = token.split('.').next().unwrap();
    let header: serde_json::Value =
        serde_json::from_slice(&URL_SAFE_NO_PAD.decode(header_segment).unwrap()).unwrap();

    assert_eq!(
        header,
        serde_json::json!({"alg": "HS256", "sign_type": "SIGN"})
    );
}

#[test]
fn test_expiry_is_issued_at_plus_validity() {
    let now = UNIX_EPOCH + Duration::from_millis(1_700_000_000_123);
    let validity = Duration::from_secs(24 * 60 * 60);
    let token = generate_token_at("test_id.test_secret", validity, now).unwrap();

    let claims = verify_token(&token, "test_secret").unwrap();
    assert_eq!(
        claims,
        TokenClaims {
            api_key: "test_id".to_string(),
            exp: 1_700_000_000_123 + 86_400_000,
            timestamp: 1_700_000_000_123,
        }
    );
}

#[test]
fn test_verify_with_wrong_secret_fails() {
    let token = generate_token("test_id.test_secret", Duration::from_secs(60)).unwrap();

    assert!(verify_token(&token, "test_secret").is_ok());
    assert!(matches!(
        verify_token(&token, "other_secret"),
        Err(ZhipuError::TokenVerification(_))
    ));
}

#[test]
fn test_verification_error_message() {
    let token = generate_token("test_id.test_secret", Duration::from_secs(60)).unwrap();
    let err = verify_token(&token, "other_secret").unwrap_err();
    assert!(err.to_string().starts_with("failed to verify token"), "{err}");
}

#[test]
fn test_claims_contain_only_id_and_times() {
    let token = generate_token("abc.def", Duration::from_secs(5)).unwrap();
    let payload_segment = token.split('.').nth(1).unwrap();
    let payload: serde_json::Value =
        serde_json::from_slice(&URL_SAFE_NO_PAD.decode(payload_segment).unwrap()).unwrap();

    let mut keys: Vec<_> = payload.as_object().unwrap().keys().cloned().collect();
    keys.sort();
    assert_eq!(keys, vec!["api_key", "exp", "timestamp"]);
}
