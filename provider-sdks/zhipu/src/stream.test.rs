use super::*;
use futures::stream;
use pretty_assertions::assert_eq;

fn frame(content: &str) -> String {
    let chunk = serde_json::json!({
        "id": "8311",
        "model": "chatglm_turbo",
        "choices": [{"index": 0, "delta": {"content": content}}]
    });
    format!("data: {chunk}\n\n")
}

fn stream_with_config(chunks: Vec<String>, config: &ClientConfig) -> ChatCompletionStream {
    let body = stream::iter(
        chunks
            .into_iter()
            .map(|c| Ok::<_, reqwest::Error>(Bytes::from(c))),
    );
    ChatCompletionStream::new(body, 200, config, CancellationToken::new())
}

fn stream_from(chunks: Vec<String>) -> ChatCompletionStream {
    stream_with_config(chunks, &ClientConfig::default())
}

fn pending_stream(config: &ClientConfig, cancel: CancellationToken) -> ChatCompletionStream {
    let body = stream::pending::<std::result::Result<Bytes, reqwest::Error>>();
    ChatCompletionStream::new(body, 200, config, cancel)
}

#[tokio::test]
async fn test_frames_then_done() {
    let mut stream = stream_from(vec![
        frame("one"),
        frame("two"),
        frame("three"),
        "data: [DONE]\n\n".to_string(),
    ]);
    assert_eq!(stream.state(), StreamState::Open);

    let mut received = Vec::new();
    while let Some(chunk) = stream.recv().await.unwrap() {
        assert_eq!(stream.state(), StreamState::Receiving);
        received.push(chunk.delta_text());
    }

    assert_eq!(received, vec!["one", "two", "three"]);
    assert_eq!(stream.state(), StreamState::Closed);

    // End of stream is sticky.
    assert!(stream.recv().await.unwrap().is_none());
}

#[tokio::test]
async fn test_eof_without_done_is_an_error() {
    let mut stream = stream_from(vec![frame("one"), frame("two")]);

    assert_eq!(stream.recv().await.unwrap().unwrap().delta_text(), "one");
    assert_eq!(stream.recv().await.unwrap().unwrap().delta_text(), "two");

    let err = stream.recv().await.unwrap_err();
    assert!(matches!(err, ZhipuError::StreamTerminated), "got {err:?}");
    assert_eq!(stream.state(), StreamState::Failed);

    assert!(matches!(
        stream.recv().await,
        Err(ZhipuError::StreamClosed)
    ));
}

#[tokio::test]
async fn test_empty_body_is_terminated() {
    let mut stream = stream_from(vec![]);
    assert!(matches!(
        stream.recv().await,
        Err(ZhipuError::StreamTerminated)
    ));
}

#[tokio::test]
async fn test_invalid_json_frame() {
    let mut stream = stream_from(vec![
        frame("ok"),
        "data: {not json}\n\n".to_string(),
        frame("never"),
        "data: [DONE]\n\n".to_string(),
    ]);

    assert_eq!(stream.recv().await.unwrap().unwrap().delta_text(), "ok");

    let err = stream.recv().await.unwrap_err();
    match err {
        ZhipuError::StreamDecode(message) => assert!(message.contains("{not json}")),
        other => panic!("Expected StreamDecode, got {other:?}"),
    }
    assert_eq!(stream.state(), StreamState::Failed);
}

#[tokio::test]
async fn test_frames_split_across_chunks() {
    let whole = format!("{}{}data: [DONE]\n\n", frame("He"), frame("llo"));
    let (a, rest) = whole.split_at(7);
    let (b, c) = rest.split_at(40);
    let mut stream = stream_from(vec![a.to_string(), b.to_string(), c.to_string()]);

    let mut text = String::new();
    while let Some(chunk) = stream.recv().await.unwrap() {
        text.push_str(&chunk.delta_text());
    }
    assert_eq!(text, "Hello");
}

#[tokio::test]
async fn test_crlf_and_event_lines() {
    let body = concat!(
        "event: add\r\n",
        "id: 1\r\n",
        "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\",\"content\":\"hi\"}}]}\r\n",
        "\r\n",
        ": keep-alive\r\n",
        "data:[DONE]\r\n",
    );
    let mut stream = stream_from(vec![body.to_string()]);

    let chunk = stream.recv().await.unwrap().unwrap();
    assert_eq!(chunk.delta_text(), "hi");
    assert_eq!(
        chunk.choices[0].delta.role,
        Some(crate::types::Role::Assistant)
    );
    assert!(stream.recv().await.unwrap().is_none());
}

#[tokio::test]
async fn test_done_without_trailing_newline() {
    let mut stream = stream_from(vec![frame("x"), "data: [DONE]".to_string()]);

    assert!(stream.recv().await.unwrap().is_some());
    assert!(stream.recv().await.unwrap().is_none());
    assert_eq!(stream.state(), StreamState::Closed);
}

#[tokio::test]
async fn test_empty_data_lines_are_skipped() {
    let mut stream = stream_from(vec![
        "data:\n\n".to_string(),
        frame("x"),
        "data: [DONE]\n\n".to_string(),
    ]);

    assert_eq!(stream.recv().await.unwrap().unwrap().delta_text(), "x");
    assert!(stream.recv().await.unwrap().is_none());
}

#[tokio::test]
async fn test_injected_error_frame() {
    let mut stream = stream_from(vec![
        frame("partial"),
        "event: error\n".to_string(),
        "data: {\"error\":{\"code\":\"1301\",\"message\":\"unsafe content\"}}\n\n".to_string(),
    ]);

    assert!(stream.recv().await.unwrap().is_some());

    let err = stream.recv().await.unwrap_err();
    match err {
        ZhipuError::Api(api) => {
            assert_eq!(api.http_status, 200);
            assert_eq!(api.code.as_deref(), Some("1301"));
            assert_eq!(api.message, "unsafe content");
        }
        other => panic!("Expected Api error, got {other:?}"),
    }
    assert_eq!(stream.state(), StreamState::Failed);
}

#[tokio::test]
async fn test_raw_error_body_decoded_at_eof() {
    let mut stream = stream_from(vec![
        "{\"error\":\n".to_string(),
        "{\"code\":\"500\",\"message\":\"boom\"}}\n".to_string(),
    ]);

    let err = stream.recv().await.unwrap_err();
    assert!(
        matches!(&err, ZhipuError::Api(api) if api.message == "boom"),
        "got {err:?}"
    );
}

#[tokio::test]
async fn test_too_many_empty_messages() {
    let config = ClientConfig::default().empty_messages_limit(3);
    let mut stream = stream_with_config(
        vec![": ping\n".repeat(5), frame("late"), "data: [DONE]\n\n".to_string()],
        &config,
    );

    assert!(matches!(
        stream.recv().await,
        Err(ZhipuError::TooManyEmptyStreamMessages)
    ));
}

#[tokio::test]
async fn test_empty_message_count_resets_per_frame() {
    let config = ClientConfig::default().empty_messages_limit(2);
    let mut stream = stream_with_config(
        vec![
            frame("a"),
            "event: add\n".to_string(),
            frame("b"),
            "data: [DONE]\n\n".to_string(),
        ],
        &config,
    );

    assert_eq!(stream.recv().await.unwrap().unwrap().delta_text(), "a");
    assert_eq!(stream.recv().await.unwrap().unwrap().delta_text(), "b");
    assert!(stream.recv().await.unwrap().is_none());
}

#[tokio::test]
async fn test_cancel_aborts_pending_read() {
    let cancel = CancellationToken::new();
    let mut stream = pending_stream(&ClientConfig::default(), cancel.clone());

    cancel.cancel();
    assert!(matches!(stream.recv().await, Err(ZhipuError::Cancelled)));
    assert_eq!(stream.state(), StreamState::Failed);
}

#[tokio::test]
async fn test_idle_timeout() {
    let config = ClientConfig::default().stream_idle_timeout(Duration::from_millis(20));
    let mut stream = pending_stream(&config, CancellationToken::new());

    assert!(matches!(
        stream.recv().await,
        Err(ZhipuError::StreamIdleTimeout(d)) if d == Duration::from_millis(20)
    ));
}

#[tokio::test]
async fn test_close_is_idempotent() {
    let mut stream = stream_from(vec![frame("a"), "data: [DONE]\n\n".to_string()]);

    stream.close();
    stream.close();
    assert!(matches!(stream.recv().await, Err(ZhipuError::StreamClosed)));
}

#[tokio::test]
async fn test_into_stream() {
    let stream = stream_from(vec![
        frame("He"),
        frame("llo"),
        "data: [DONE]\n\n".to_string(),
    ]);

    let chunks: Vec<_> = stream.into_stream().collect().await;
    let text: String = chunks
        .into_iter()
        .map(|c| c.unwrap().delta_text())
        .collect();
    assert_eq!(text, "Hello");
}

#[tokio::test]
async fn test_into_stream_stops_after_error() {
    let stream = stream_from(vec![frame("a"), "data: nope\n\n".to_string(), frame("b")]);

    let items: Vec<_> = stream.into_stream().collect().await;
    assert_eq!(items.len(), 2);
    assert!(items[0].is_ok());
    assert!(matches!(items[1], Err(ZhipuError::StreamDecode(_))));
}

#[tokio::test]
async fn test_raw_error_after_earlier_event_lines() {
    let mut stream = stream_from(vec![
        "event: add\n".to_string(),
        frame("x"),
        "{\"error\":{\"code\":\"1\",\"message\":\"late\"}}\n".to_string(),
    ]);

    assert_eq!(stream.recv().await.unwrap().unwrap().delta_text(), "x");

    let err = stream.recv().await.unwrap_err();
    match err {
        ZhipuError::Api(api) => {
            assert_eq!(api.code.as_deref(), Some("1"));
            assert_eq!(api.message, "late");
        }
        other => panic!("Expected Api error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_accumulator_reset_after_each_frame() {
    let chunks: Vec<String> = (0..100)
        .map(|i| format!("event: add\nid: {i}\n{}", frame("t")))
        .chain(std::iter::once("data: [DONE]\n\n".to_string()))
        .collect();
    let mut stream = stream_from(chunks);

    let mut frames = 0;
    while let Some(chunk) = stream.recv().await.unwrap() {
        assert_eq!(chunk.delta_text(), "t");
        assert!(stream.accumulator.bytes().is_empty());
        frames += 1;
    }
    assert_eq!(frames, 100);
    assert!(stream.accumulator.is_empty());
}
