use super::*;
use pretty_assertions::assert_eq;

#[test]
fn test_request_serialization() {
    let request = ChatCompletionRequest::new(TURBO, vec![ChatCompletionMessage::user("hello")])
        .temperature(0.5)
        .incremental(true);

    let json = serde_json::to_value(&request).unwrap();
    assert_eq!(
        json,
        serde_json::json!({
            "model": "chatglm_turbo",
            "messages": [{"role": "user", "content": "hello"}],
            "temperature": 0.5,
            "incremental": true
        })
    );
}

#[test]
fn test_request_validation() {
    let empty = ChatCompletionRequest::new(TURBO, vec![]);
    assert!(matches!(empty.validate(), Err(ZhipuError::Validation(_))));

    let no_model = ChatCompletionRequest::new("", vec![ChatCompletionMessage::user("hi")]);
    assert!(matches!(no_model.validate(), Err(ZhipuError::Validation(_))));

    let ok = ChatCompletionRequest::new(
        PRO,
        vec![
            ChatCompletionMessage::system("be brief"),
            ChatCompletionMessage::user("hi"),
        ],
    );
    assert!(ok.validate().is_ok());
}

#[test]
fn test_role_rejects_unknown_value() {
    let result = serde_json::from_str::<Role>(r#""tool""#);
    assert!(result.is_err());
}

#[test]
fn test_parse_stream_chunk() {
    let chunk: ChatCompletionStreamResponse = serde_json::from_str(
        r#"{"id":"8311","created":1700000000,"model":"chatglm_turbo","choices":[{"index":0,"delta":{"role":"assistant","content":"He"}}]}"#,
    )
    .unwrap();

    assert_eq!(chunk.id, "8311");
    assert_eq!(chunk.delta_text(), "He");
    assert_eq!(chunk.choices[0].delta.role, Some(Role::Assistant));
    assert_eq!(chunk.finish_reason(), None);
    assert!(chunk.usage.is_none());
}

#[test]
fn test_parse_final_stream_chunk() {
    let chunk: ChatCompletionStreamResponse = serde_json::from_str(
        r#"{"id":"8311","choices":[{"index":0,"delta":{},"finish_reason":"stop"}],"usage":{"prompt_tokens":3,"completion_tokens":2,"total_tokens":5}}"#,
    )
    .unwrap();

    assert_eq!(chunk.delta_text(), "");
    assert_eq!(chunk.finish_reason(), Some(&FinishReason::Stop));
    assert_eq!(chunk.usage.map(|u| u.total_tokens), Some(5));
}

#[test]
fn test_unknown_finish_reason() {
    let choice: ChatCompletionStreamChoice =
        serde_json::from_str(r#"{"delta":{"content":""},"finish_reason":"network_error"}"#)
            .unwrap();
    assert_eq!(choice.finish_reason, Some(FinishReason::Other));
}

#[test]
fn test_parse_response() {
    let response: ChatCompletionResponse = serde_json::from_str(
        r#"{"id":"1","model":"chatglm_pro","choices":[{"index":0,"message":{"role":"assistant","content":"Hello"},"finish_reason":"stop"}],"usage":{"prompt_tokens":1,"completion_tokens":1,"total_tokens":2}}"#,
    )
    .unwrap();

    assert_eq!(response.text(), "Hello");
    assert_eq!(response.usage.total_tokens, 2);
}
