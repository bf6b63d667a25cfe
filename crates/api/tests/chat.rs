mod common;

use axum::http::StatusCode;
use common::{request, TestApp};
use database::{conversation, message};
use serde_json::json;

fn chat_body(text: &str) -> serde_json::Value {
    json!({ "messages": [{ "role": "user", "content": text }] })
}

#[tokio::test]
async fn test_anonymous_chat_streams_without_conversation() {
    let mut app = TestApp::new().await;
    let mock = app.mock_reply("Hello there").await;

    let (status, headers, bytes) = app
        .send(request("POST", "/api/chat", None, Some(chat_body("Hi"))))
        .await;
    mock.assert_async().await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers["x-authenticated"], "false");
    assert!(headers.get("x-conversation-id").is_none());
    assert!(headers["content-type"]
        .to_str()
        .unwrap()
        .starts_with("text/event-stream"));

    let body = String::from_utf8(bytes).unwrap();
    assert!(body.contains("event: text"));
    assert!(body.contains(r#"{"delta":"Hello there"}"#));
    assert!(body.contains("event: finish"));
    assert!(body.contains(r#""message_id":null"#));
}

#[tokio::test]
async fn test_authenticated_chat_persists_turn() {
    let mut app = TestApp::new().await;
    app.mock_reply("Sunny and warm").await;

    let (status, headers, bytes) = app
        .send(request(
            "POST",
            "/api/chat",
            Some("alice"),
            Some(chat_body("What's the weather in Lisbon?")),
        ))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers["x-authenticated"], "true");
    let conversation_id = headers["x-conversation-id"].to_str().unwrap().to_string();

    let body = String::from_utf8(bytes).unwrap();
    assert!(body.contains(r#""total_tokens":15"#));

    let pool = app.state.db.pool();
    let conv = conversation::get_conversation(pool, "alice", &conversation_id)
        .await
        .unwrap();
    assert_eq!(conv.title, "What's the weather in Lisbon?");

    let messages = message::list_messages(pool, "alice", &conversation_id)
        .await
        .unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].role, "user");
    assert_eq!(messages[1].role, "assistant");
    assert_eq!(messages[1].content, "Sunny and warm");
    assert_eq!(messages[1].status, "completed");
    assert_eq!(messages[1].model.as_deref(), Some("test-model"));
    assert_eq!(messages[1].total_tokens, Some(15));
    assert_eq!(messages[1].metadata.0["persona"], "default");
    assert_eq!(messages[1].metadata.0["finish_reason"], "stop");
}

#[tokio::test]
async fn test_chat_continues_owned_conversation() {
    let mut app = TestApp::new().await;
    app.mock_reply("Sure").await;

    let existing = conversation::create_conversation(app.state.db.pool(), "alice", "Ongoing")
        .await
        .unwrap();

    let mut body = chat_body("And tomorrow?");
    body["conversation_id"] = json!(existing.id);
    let (_, headers, _) = app
        .send(request("POST", "/api/chat", Some("alice"), Some(body)))
        .await;
    assert_eq!(headers["x-conversation-id"], existing.id.as_str());

    // Someone else's id starts a fresh conversation instead.
    let mut body = chat_body("Hijack");
    body["conversation_id"] = json!(existing.id);
    let (_, headers, _) = app
        .send(request("POST", "/api/chat", Some("bob"), Some(body)))
        .await;
    assert_ne!(headers["x-conversation-id"], existing.id.as_str());
}

#[tokio::test]
async fn test_chat_rejects_invalid_requests() {
    let app = TestApp::new().await;

    let (status, body) = app
        .json(request("POST", "/api/chat", None, Some(json!({ "messages": [] }))))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid request");

    let mut disallowed = chat_body("Hi");
    disallowed["model"] = json!("not-on-the-list");
    let (status, body) = app
        .json(request("POST", "/api/chat", None, Some(disallowed)))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["details"][0]["field"], "model");
}

#[tokio::test]
async fn test_upstream_failure_is_bad_gateway() {
    let mut app = TestApp::new().await;
    app.llm
        .mock("POST", "/chat/completions")
        .with_status(500)
        .with_body(r#"{"error":{"message":"boom"}}"#)
        .create_async()
        .await;

    let (status, _) = app
        .json(request("POST", "/api/chat", None, Some(chat_body("Hi"))))
        .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);

    // A signed-in retry leaves no conversation or unanswered message behind.
    for _ in 0..2 {
        let (status, headers, _) = app
            .send(request("POST", "/api/chat", Some("alice"), Some(chat_body("Hi"))))
            .await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert!(headers.get("x-conversation-id").is_none());
    }
    let pool = app.state.db.pool();
    assert_eq!(conversation::count_for_user(pool, "alice").await.unwrap(), 0);
}

#[tokio::test]
async fn test_tool_call_round_trip() {
    let mut app = TestApp::new().await;

    // First round asks for an unknown tool; the second answers in text.
    let tool_round = concat!(
        "data: {\"choices\":[{\"delta\":{\"tool_calls\":[{\"index\":0,\"id\":\"call_1\",\"function\":{\"name\":\"lookup\",\"arguments\":\"{}\"}}]}}]}\n\n",
        "data: {\"choices\":[{\"delta\":{},\"finish_reason\":\"tool_calls\"}]}\n\n",
        "data: [DONE]\n\n",
    );
    let first = app
        .llm
        .mock("POST", "/chat/completions")
        .match_body(mockito::Matcher::Regex("\"tools\"".to_string()))
        .with_header("content-type", "text/event-stream")
        .with_body(tool_round)
        .expect(1)
        .create_async()
        .await;
    let second = app
        .llm
        .mock("POST", "/chat/completions")
        .match_body(mockito::Matcher::Regex("call_1".to_string()))
        .with_header("content-type", "text/event-stream")
        .with_body(concat!(
            "data: {\"choices\":[{\"delta\":{\"content\":\"No such tool\"},\"finish_reason\":\"stop\"}]}\n\n",
            "data: [DONE]\n\n",
        ))
        .create_async()
        .await;

    let (status, _, bytes) = app
        .send(request("POST", "/api/chat", Some("alice"), Some(chat_body("Look it up"))))
        .await;
    assert_eq!(status, StatusCode::OK);
    first.assert_async().await;
    second.assert_async().await;

    let body = String::from_utf8(bytes).unwrap();
    assert!(body.contains("event: tool_call"));
    assert!(body.contains("event: tool_result"));
    assert!(body.contains("Tool not found"));
    assert!(body.contains(r#"{"delta":"No such tool"}"#));
}
