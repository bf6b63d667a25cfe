mod common;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use common::{request, TestApp};
use database::message;
use serde_json::json;

#[tokio::test]
async fn test_requires_authentication() {
    let app = TestApp::new().await;

    let (status, body) = app.json(request("GET", "/api/conversations", None, None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body, json!({ "error": "Unauthorized" }));

    let forged = Request::builder()
        .uri("/api/conversations")
        .header(header::AUTHORIZATION, "Bearer forged")
        .body(Body::empty())
        .unwrap();
    let (status, body) = app.json(forged).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body, json!({ "error": "Unauthorized" }));
}

#[tokio::test]
async fn test_duplicate_create_is_coalesced() {
    let app = TestApp::new().await;
    let create = |title: &str| {
        request(
            "POST",
            "/api/conversations",
            Some("alice"),
            Some(json!({ "title": title })),
        )
    };

    let (status, first) = app.json(create("Trip to Lisbon")).await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, second) = app.json(create("  Trip to   Lisbon ")).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(first["id"], second["id"]);

    let (_, other) = app.json(create("Groceries")).await;
    assert_ne!(first["id"], other["id"]);

    let (status, list) = app
        .json(request("GET", "/api/conversations", Some("alice"), None))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list["total"], 2);
}

#[tokio::test]
async fn test_conversations_are_scoped_to_user() {
    let app = TestApp::new().await;

    let (_, created) = app
        .json(request(
            "POST",
            "/api/conversations",
            Some("alice"),
            Some(json!({ "title": "Private" })),
        ))
        .await;
    let uri = format!("/api/conversations/{}", created["id"].as_str().unwrap());

    let (status, _) = app.json(request("GET", &uri, Some("bob"), None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = app.json(request("GET", &uri, Some("alice"), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["title"], "Private");
    assert_eq!(body["messages"], json!([]));
}

#[tokio::test]
async fn test_rename_and_validation() {
    let app = TestApp::new().await;

    let (_, created) = app
        .json(request(
            "POST",
            "/api/conversations",
            Some("alice"),
            Some(json!({ "title": "Draft" })),
        ))
        .await;
    let uri = format!("/api/conversations/{}", created["id"].as_str().unwrap());

    let (status, renamed) = app
        .json(request("PATCH", &uri, Some("alice"), Some(json!({ "title": "Final" }))))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(renamed["title"], "Final");

    let (status, body) = app
        .json(request(
            "PATCH",
            &uri,
            Some("alice"),
            Some(json!({ "title": "x".repeat(201) })),
        ))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid request");
    assert_eq!(body["details"][0]["field"], "title");

    let (status, _) = app
        .json(request("GET", "/api/conversations/not-a-uuid", Some("alice"), None))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_delete_cascades_to_messages() {
    let app = TestApp::new().await;

    let (_, created) = app
        .json(request(
            "POST",
            "/api/conversations",
            Some("alice"),
            Some(json!({ "title": "Doomed" })),
        ))
        .await;
    let id = created["id"].as_str().unwrap().to_string();

    for (role, content) in [("user", "Hi"), ("assistant", "Hello!")] {
        let (status, _) = app
            .json(request(
                "POST",
                "/api/messages",
                Some("alice"),
                Some(json!({ "conversation_id": id, "role": role, "content": content })),
            ))
            .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (status, messages) = app
        .json(request(
            "GET",
            &format!("/api/conversations/{}/messages", id),
            Some("alice"),
            None,
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(messages.as_array().unwrap().len(), 2);
    assert_eq!(messages[1]["role"], "assistant");

    let (status, body) = app
        .json(request(
            "DELETE",
            &format!("/api/conversations/{}", id),
            Some("alice"),
            None,
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "success": true }));

    let remaining = message::count_for_conversation(app.state.db.pool(), &id)
        .await
        .unwrap();
    assert_eq!(remaining, 0);
}

#[tokio::test]
async fn test_message_update_and_delete() {
    let app = TestApp::new().await;

    let (_, created) = app
        .json(request(
            "POST",
            "/api/conversations",
            Some("alice"),
            Some(json!({ "title": "Edits" })),
        ))
        .await;

    let (_, msg) = app
        .json(request(
            "POST",
            "/api/messages",
            Some("alice"),
            Some(json!({
                "conversation_id": created["id"],
                "role": "assistant",
                "content": "Draft",
                "status": "streaming",
            })),
        ))
        .await;
    assert_eq!(msg["status"], "streaming");
    assert_eq!(msg["attachments"], json!([]));
    let uri = format!("/api/messages/{}", msg["id"].as_str().unwrap());

    let (status, updated) = app
        .json(request(
            "PATCH",
            &uri,
            Some("alice"),
            Some(json!({ "content": "Done", "status": "completed" })),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["content"], "Done");
    assert_eq!(updated["status"], "completed");

    let (status, _) = app
        .json(request("PATCH", &uri, Some("bob"), Some(json!({ "content": "Mine" }))))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = app
        .json(request("PATCH", &uri, Some("alice"), Some(json!({ "status": "lost" }))))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["details"][0]["field"], "status");

    let (status, _) = app.json(request("DELETE", &uri, Some("alice"), None)).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = app.json(request("DELETE", &uri, Some("alice"), None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
