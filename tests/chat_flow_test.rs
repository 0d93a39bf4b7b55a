//! Integration tests for the chat orchestration pipeline over a mocked
//! document store. Redis points at a closed port so every cache-backed path
//! exercises its graceful degradation (rate limiter fails open, strikes
//! degrade to zero).

use serde_json::json;
use session_chat_service::cache::CacheClient;
use session_chat_service::config::ChatLimits;
use session_chat_service::error::AppError;
use session_chat_service::models::{SessionRole, SessionUser};
use session_chat_service::services::{
    ChatStore, ExportFormat, ModerationService, RateLimiter, SessionChatService,
};
use session_chat_service::store::ZeroDbClient;
use std::sync::Arc;
use uuid::Uuid;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn service(store_uri: &str) -> SessionChatService {
    let db = ZeroDbClient::new(store_uri, "test-key");
    // Closed port: the cache is unreachable on purpose
    let cache = CacheClient::new("redis://127.0.0.1:1/").unwrap();
    let limits = Arc::new(ChatLimits::default());
    SessionChatService::new(
        ChatStore::new(db.clone()),
        ModerationService::new(db, cache.clone(), limits.clone()),
        RateLimiter::new(cache.clone(), limits.clone()),
        cache,
        limits,
    )
}

fn member(name: &str) -> SessionUser {
    SessionUser {
        user_id: Uuid::new_v4(),
        display_name: name.into(),
        role: SessionRole::Member,
    }
}

fn instructor(name: &str) -> SessionUser {
    SessionUser {
        user_id: Uuid::new_v4(),
        display_name: name.into(),
        role: SessionRole::Instructor,
    }
}

async fn mock_no_mutes(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/v1/collections/chat_mutes/find"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"records": []})))
        .mount(server)
        .await;
}

async fn mock_message_insert(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/v1/collections/chat_messages/records"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({})))
        .mount(server)
        .await;
}

fn message_json(id: Uuid, session_id: Uuid, sender_id: Uuid, text: &str) -> serde_json::Value {
    json!({
        "id": id,
        "session_id": session_id,
        "sender_id": sender_id,
        "sender_name": "Someone",
        "text": text,
        "is_private": false,
        "reactions": {},
        "deleted": false,
        "created_at": "2026-03-10T10:00:00Z"
    })
}

#[tokio::test]
async fn test_send_message_happy_path() {
    let server = MockServer::start().await;
    mock_no_mutes(&server).await;
    mock_message_insert(&server).await;

    let chat = service(&server.uri());
    let session_id = Uuid::new_v4();
    let sender = member("Alice");

    let sent = chat
        .send_message(session_id, &sender, "hello everyone", false, None)
        .await
        .unwrap();

    assert_eq!(sent.message.text, "hello everyone");
    assert_eq!(sent.message.sender_id, sender.user_id);
    assert!(!sent.message.is_private);
    assert!(sent.auto_mute.is_none());
}

#[tokio::test]
async fn test_send_rejects_empty_text() {
    let server = MockServer::start().await;
    let chat = service(&server.uri());

    let result = chat
        .send_message(Uuid::new_v4(), &member("Alice"), "   ", false, None)
        .await;
    assert!(matches!(result, Err(AppError::BadRequest(_))));
    // Nothing reached the store
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_send_private_requires_recipient() {
    let server = MockServer::start().await;
    let chat = service(&server.uri());

    let result = chat
        .send_message(Uuid::new_v4(), &member("Alice"), "psst", true, None)
        .await;
    assert!(matches!(result, Err(AppError::BadRequest(_))));
}

#[tokio::test]
async fn test_muted_sender_is_rejected_with_reason() {
    let server = MockServer::start().await;
    let session_id = Uuid::new_v4();
    let sender = member("Loud");

    Mock::given(method("POST"))
        .and(path("/v1/collections/chat_mutes/find"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "records": [{
                "id": Uuid::new_v4(),
                "session_id": session_id,
                "user_id": sender.user_id,
                "muted_by": Uuid::new_v4(),
                "reason": "too noisy",
                "active": true,
                "created_at": "2026-03-10T10:00:00Z"
            }]
        })))
        .mount(&server)
        .await;

    let chat = service(&server.uri());
    let result = chat
        .send_message(session_id, &sender, "let me in", false, None)
        .await;

    match result {
        Err(AppError::Muted { reason, expires_at }) => {
            assert_eq!(reason.as_deref(), Some("too noisy"));
            assert!(expires_at.is_none());
        }
        other => panic!("expected muted error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_expired_mute_is_lazily_deactivated_and_send_proceeds() {
    let server = MockServer::start().await;
    let session_id = Uuid::new_v4();
    let sender = member("Reformed");
    let mute_id = Uuid::new_v4();

    Mock::given(method("POST"))
        .and(path("/v1/collections/chat_mutes/find"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "records": [{
                "id": mute_id,
                "session_id": session_id,
                "user_id": sender.user_id,
                "expires_at": "2026-03-10T10:00:00Z",
                "active": true,
                "created_at": "2026-03-10T09:00:00Z"
            }]
        })))
        .mount(&server)
        .await;
    // Lazy expiry writes the row back deactivated
    Mock::given(method("PATCH"))
        .and(path(format!("/v1/collections/chat_mutes/records/{mute_id}")))
        .and(body_partial_json(json!({"active": false})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"matched": true})))
        .expect(1)
        .mount(&server)
        .await;
    mock_message_insert(&server).await;

    let chat = service(&server.uri());
    let sent = chat
        .send_message(session_id, &sender, "I'm back", false, None)
        .await
        .unwrap();
    assert_eq!(sent.message.text, "I'm back");
}

#[tokio::test]
async fn test_profanity_is_redacted_before_storage() {
    let server = MockServer::start().await;
    mock_no_mutes(&server).await;
    mock_message_insert(&server).await;

    let chat = service(&server.uri());
    let sent = chat
        .send_message(Uuid::new_v4(), &member("Salty"), "well damn", false, None)
        .await
        .unwrap();

    // Returned and stored text are both redacted; the message is stored, not
    // rejected.
    assert_eq!(sent.message.text, "well ****");

    let stored = server
        .received_requests()
        .await
        .unwrap()
        .into_iter()
        .find(|r| r.url.path().ends_with("/chat_messages/records"))
        .expect("message insert request");
    let body: serde_json::Value = serde_json::from_slice(&stored.body).unwrap();
    assert_eq!(body["text"], "well ****");
}

#[tokio::test]
async fn test_delete_requires_privilege() {
    let server = MockServer::start().await;
    let chat = service(&server.uri());

    let result = chat
        .delete_message(Uuid::new_v4(), &member("Pleb"), Uuid::new_v4())
        .await;
    assert!(matches!(result, Err(AppError::Forbidden)));
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_instructor_soft_deletes() {
    let server = MockServer::start().await;
    let session_id = Uuid::new_v4();
    let message_id = Uuid::new_v4();
    let actor = instructor("Teach");

    Mock::given(method("GET"))
        .and(path(format!(
            "/v1/collections/chat_messages/records/{message_id}"
        )))
        .respond_with(ResponseTemplate::new(200).set_body_json(message_json(
            message_id,
            session_id,
            Uuid::new_v4(),
            "inappropriate",
        )))
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path(format!(
            "/v1/collections/chat_messages/records/{message_id}"
        )))
        .and(body_partial_json(json!({"deleted": true})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"matched": true})))
        .expect(1)
        .mount(&server)
        .await;

    let chat = service(&server.uri());
    let deleted = chat
        .delete_message(session_id, &actor, message_id)
        .await
        .unwrap();

    assert!(deleted.deleted);
    assert_eq!(deleted.deleted_by, Some(actor.user_id));
    // Body retained for audit
    assert_eq!(deleted.text, "inappropriate");
}

#[tokio::test]
async fn test_unknown_reaction_kind_rejected() {
    let server = MockServer::start().await;
    let chat = service(&server.uri());

    let result = chat
        .add_reaction(Uuid::new_v4(), &member("R"), Uuid::new_v4(), "eggplant")
        .await;
    assert!(matches!(result, Err(AppError::InvalidArgument(_))));
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_reaction_increments_tally_and_records_reactor() {
    let server = MockServer::start().await;
    let session_id = Uuid::new_v4();
    let message_id = Uuid::new_v4();
    let reactor = member("Fan");

    Mock::given(method("GET"))
        .and(path(format!(
            "/v1/collections/chat_messages/records/{message_id}"
        )))
        .respond_with(ResponseTemplate::new(200).set_body_json(message_json(
            message_id,
            session_id,
            Uuid::new_v4(),
            "great point",
        )))
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path(format!(
            "/v1/collections/chat_messages/records/{message_id}"
        )))
        .and(body_partial_json(json!({"reactions": {"heart": 1}})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"matched": true})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/collections/chat_reactions/records"))
        .and(body_partial_json(json!({"kind": "heart"})))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    let chat = service(&server.uri());
    let (message, kind) = chat
        .add_reaction(session_id, &reactor, message_id, "heart")
        .await
        .unwrap();

    assert_eq!(kind.as_str(), "heart");
    assert_eq!(message.reaction_total(), 1);
}

#[tokio::test]
async fn test_raise_hand_is_idempotent() {
    let server = MockServer::start().await;
    let session_id = Uuid::new_v4();
    let user = member("Asker");
    let existing_id = Uuid::new_v4();

    Mock::given(method("POST"))
        .and(path("/v1/collections/raised_hands/find"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "records": [{
                "id": existing_id,
                "session_id": session_id,
                "user_id": user.user_id,
                "user_name": "Asker",
                "active": true,
                "raised_at": "2026-03-10T10:00:00Z"
            }]
        })))
        .mount(&server)
        .await;
    // No duplicate row may be created
    Mock::given(method("POST"))
        .and(path("/v1/collections/raised_hands/records"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({})))
        .expect(0)
        .mount(&server)
        .await;

    let chat = service(&server.uri());
    let hand = chat.raise_hand(session_id, &user).await.unwrap();
    assert_eq!(hand.id, existing_id);
}

#[tokio::test]
async fn test_second_unmute_is_noop() {
    let server = MockServer::start().await;
    mock_no_mutes(&server).await;

    let chat = service(&server.uri());
    let deactivated = chat
        .unmute_user(Uuid::new_v4(), &instructor("Teach"), Uuid::new_v4())
        .await
        .unwrap();
    assert_eq!(deactivated, 0);
}

#[tokio::test]
async fn test_mute_requires_privilege() {
    let server = MockServer::start().await;
    let chat = service(&server.uri());

    let result = chat
        .mute_user(Uuid::new_v4(), &member("Pleb"), Uuid::new_v4(), None, None)
        .await;
    assert!(matches!(result, Err(AppError::Forbidden)));
}

#[tokio::test]
async fn test_member_list_filter_includes_visibility_clause() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/collections/chat_messages/find"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"records": []})))
        .mount(&server)
        .await;

    let chat = service(&server.uri());
    let viewer = member("Viewer");
    chat.list_messages(Uuid::new_v4(), &viewer).await.unwrap();

    let request = server
        .received_requests()
        .await
        .unwrap()
        .into_iter()
        .find(|r| r.url.path().ends_with("/chat_messages/find"))
        .unwrap();
    let body: serde_json::Value = serde_json::from_slice(&request.body).unwrap();

    let or = body["filter"]["$or"].as_array().expect("$or clause");
    assert_eq!(or.len(), 3);
    assert_eq!(body["filter"]["deleted"], false);
    assert_eq!(body["sort"]["created_at"], 1);
}

#[tokio::test]
async fn test_privileged_list_filter_is_unrestricted() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/collections/chat_messages/find"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"records": []})))
        .mount(&server)
        .await;

    let chat = service(&server.uri());
    chat.list_messages(Uuid::new_v4(), &instructor("Teach"))
        .await
        .unwrap();

    let request = server.received_requests().await.unwrap().pop().unwrap();
    let body: serde_json::Value = serde_json::from_slice(&request.body).unwrap();
    assert!(body["filter"].get("$or").is_none());
}

#[tokio::test]
async fn test_export_excludes_private_when_asked() {
    let server = MockServer::start().await;
    let session_id = Uuid::new_v4();
    let public_id = Uuid::new_v4();
    let private_id = Uuid::new_v4();

    let mut private = message_json(private_id, session_id, Uuid::new_v4(), "between us");
    private["is_private"] = json!(true);
    private["recipient_id"] = json!(Uuid::new_v4());
    private["recipient_name"] = json!("Bob");

    Mock::given(method("POST"))
        .and(path("/v1/collections/chat_messages/find"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "records": [
                message_json(public_id, session_id, Uuid::new_v4(), "for everyone"),
                private,
            ]
        })))
        .mount(&server)
        .await;

    let chat = service(&server.uri());
    let exported = chat
        .export_messages(session_id, ExportFormat::Records, false)
        .await
        .unwrap();

    assert!(exported.contains(&public_id.to_string()));
    assert!(!exported.contains(&private_id.to_string()));
}

/// End-to-end flow: send → list → delete → list omits → export is empty.
#[tokio::test]
async fn test_send_list_delete_export_flow() {
    let server = MockServer::start().await;
    let session_id = Uuid::new_v4();
    let sender = member("X");
    let viewer = member("Y");
    let moderator = instructor("Teach");

    // Phase 1: send "hello"
    mock_no_mutes(&server).await;
    mock_message_insert(&server).await;
    let chat = service(&server.uri());
    let sent = chat
        .send_message(session_id, &sender, "hello", false, None)
        .await
        .unwrap();
    let message_id = sent.message.id;

    // Phase 2: everyone sees it in timestamp order
    server.reset().await;
    Mock::given(method("POST"))
        .and(path("/v1/collections/chat_messages/find"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "records": [serde_json::to_value(&sent.message).unwrap()]
        })))
        .mount(&server)
        .await;
    let listed = chat.list_messages(session_id, &viewer).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, message_id);

    // Phase 3: instructor deletes it
    server.reset().await;
    Mock::given(method("GET"))
        .and(path(format!(
            "/v1/collections/chat_messages/records/{message_id}"
        )))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::to_value(&sent.message).unwrap()),
        )
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path(format!(
            "/v1/collections/chat_messages/records/{message_id}"
        )))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"matched": true})))
        .mount(&server)
        .await;
    chat.delete_message(session_id, &moderator, message_id)
        .await
        .unwrap();

    // Phase 4 + 5: the store no longer matches deleted=false, so list and
    // export both come back empty
    server.reset().await;
    Mock::given(method("POST"))
        .and(path("/v1/collections/chat_messages/find"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"records": []})))
        .mount(&server)
        .await;
    assert!(chat.list_messages(session_id, &viewer).await.unwrap().is_empty());

    let exported = chat
        .export_messages(session_id, ExportFormat::Records, false)
        .await
        .unwrap();
    assert!(!exported.contains(&message_id.to_string()));
}
