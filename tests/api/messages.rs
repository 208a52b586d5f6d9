use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use outbox::repos::AttachmentRepo;
use outbox::repos::MessageRepo;
use serde_json::json;

use crate::helpers::spawn_app;
use crate::helpers::spawn_app_http_only_with;
use crate::helpers::spawn_app_with;
use crate::helpers::spawn_app_with_transport;

fn happy_body() -> serde_json::Value {
    json!({
        "from_address": "a@x.example",
        "to": ["b@y.example"],
        "subject": "hi",
        "body": "hello",
        "body_type": "plain",
    })
}

async fn wait_until_status(app: &crate::helpers::TestApp, uuid: &str, status: &str) -> serde_json::Value {
    for _ in 0..100 {
        let response = app.get_message(uuid).await;
        let projection: serde_json::Value = response.json().await.unwrap();
        if projection["status"] == status {
            return projection;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("message {uuid} never reached status {status}");
}

#[tokio::test]
async fn missing_api_key_is_rejected() {
    let app = spawn_app().await;

    let response = app
        .api_client
        .post(format!("{}/api/v1/messages", &app.address))
        .json(&happy_body())
        .send()
        .await
        .unwrap();

    assert_eq!(response.status().as_u16(), 401);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["error"], "Missing X-API-Key header");
}

#[tokio::test]
async fn invalid_api_key_is_rejected() {
    let app = spawn_app().await;

    let response = app
        .api_client
        .post(format!("{}/api/v1/messages", &app.address))
        .header("X-API-Key", "ob_not-a-real-key")
        .json(&happy_body())
        .send()
        .await
        .unwrap();

    assert_eq!(response.status().as_u16(), 401);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["error"], "Invalid or disabled API key");
}

#[tokio::test]
async fn missing_to_field_is_rejected_with_400() {
    let app = spawn_app().await;
    let mut body = happy_body();
    body["to"] = json!([]);

    let response = app.post_message(&body).await;
    assert_eq!(response.status().as_u16(), 400);
}

/// S1 — happy path (spec §8): submit succeeds, the message is eventually
/// observed `sent`, and the stub transport recorded exactly one send.
#[tokio::test]
async fn happy_path_message_is_eventually_sent() {
    let app = spawn_app_with(|cfg| cfg.queue_max_retries = 5).await;

    let response = app.post_message(&happy_body()).await;
    assert_eq!(response.status().as_u16(), 201);
    let submitted: serde_json::Value = response.json().await.unwrap();
    assert_eq!(submitted["status"], "queued");

    let uuid = submitted["uuid"].as_str().unwrap();
    let sent = wait_until_status(&app, uuid, "sent").await;
    assert!(sent["sent_at"].is_string());
    assert_eq!(app.transport.sent_count(), 1);
}

/// S3 — dead-letter (spec §8): with `queue_max_retries = 1` and a transport
/// that always fails, a single failed attempt exhausts retries immediately.
#[tokio::test]
async fn exhausted_retries_dead_letter_the_message() {
    let transport = outbox::delivery::smtp::StubTransport::always_failing();
    let app = spawn_app_with_transport(|cfg| cfg.queue_max_retries = 1, transport).await;

    let response = app.post_message(&happy_body()).await;
    let submitted: serde_json::Value = response.json().await.unwrap();
    let uuid = submitted["uuid"].as_str().unwrap();

    let dead = wait_until_status(&app, uuid, "dead").await;
    assert_eq!(dead["retries_remaining"], 0);
    assert!(dead["last_error"].is_string());
}

/// Retry-then-succeed: a transport that fails exactly once recovers on the
/// scheduled retry without exhausting retries.
#[tokio::test]
async fn failed_send_recovers_on_retry() {
    let transport = outbox::delivery::smtp::StubTransport::failing_next(1);
    let app = spawn_app_with_transport(
        |cfg| {
            cfg.queue_max_retries = 5;
            cfg.queue_retry_base_seconds = 0;
        },
        transport,
    )
    .await;

    let response = app.post_message(&happy_body()).await;
    let submitted: serde_json::Value = response.json().await.unwrap();
    let uuid = submitted["uuid"].as_str().unwrap();

    let sent = wait_until_status(&app, uuid, "sent").await;
    assert_eq!(sent["retries_remaining"], 4);
}

/// S4 — cancel (spec §8): cancel a message before the (unstarted) delivery
/// engine can pick it up.
#[tokio::test]
async fn cancel_before_pickup_moves_to_cancelled() {
    let app = spawn_app_http_only_with(|_| {}).await;

    let response = app.post_message(&happy_body()).await;
    let submitted: serde_json::Value = response.json().await.unwrap();
    let uuid = submitted["uuid"].as_str().unwrap();

    let response = app.cancel_message(uuid).await;
    assert_eq!(response.status().as_u16(), 200);
    let cancelled: serde_json::Value = response.json().await.unwrap();
    assert_eq!(cancelled["status"], "cancelled");

    let response = app.cancel_message(uuid).await;
    assert_eq!(response.status().as_u16(), 400);
}

/// S5 — admin retry of a dead message resets it to `queued` with full
/// retries (spec §4.6, §8).
#[tokio::test]
async fn retry_rejected_for_a_queued_message() {
    let app = spawn_app_http_only_with(|_| {}).await;

    let response = app.post_message(&happy_body()).await;
    let submitted: serde_json::Value = response.json().await.unwrap();
    let uuid = submitted["uuid"].as_str().unwrap();

    let response = app.retry_message(uuid).await;
    assert_eq!(response.status().as_u16(), 400);
}

#[tokio::test]
async fn get_unknown_message_is_404() {
    let app = spawn_app().await;
    let response = app.get_message("00000000-0000-0000-0000-000000000000").await;
    assert_eq!(response.status().as_u16(), 404);
}

/// S6 / P7 — blob dedup (spec §8): two separate messages each carrying an
/// attachment with byte-identical content resolve to the same `sha256` and
/// `disk_path`, with exactly one blob file written to disk.
#[tokio::test]
async fn duplicate_attachment_content_dedups_across_messages() {
    let app = spawn_app_http_only_with(|_| {}).await;

    let mut body = happy_body();
    body["attachments"] = json!([{
        "filename": "greeting.txt",
        "content_type": "text/plain",
        "content_base64": BASE64.encode("HELLO"),
    }]);

    let first = app.post_message(&body).await;
    assert_eq!(first.status().as_u16(), 201);
    let first: serde_json::Value = first.json().await.unwrap();
    let first_uuid = first["uuid"].as_str().unwrap().to_string();

    let second = app.post_message(&body).await;
    assert_eq!(second.status().as_u16(), 201);
    let second: serde_json::Value = second.json().await.unwrap();
    let second_uuid = second["uuid"].as_str().unwrap().to_string();

    let messages = MessageRepo::new(app.pool.clone());
    let attachments = AttachmentRepo::new(app.pool.clone());

    let first_msg = messages.get_by_uuid(&first_uuid).await.unwrap().unwrap();
    let second_msg = messages.get_by_uuid(&second_uuid).await.unwrap().unwrap();

    let first_attachments = attachments.get_for_message(first_msg.id).await.unwrap();
    let second_attachments = attachments.get_for_message(second_msg.id).await.unwrap();
    assert_eq!(first_attachments.len(), 1);
    assert_eq!(second_attachments.len(), 1);

    assert_eq!(first_attachments[0].sha256, second_attachments[0].sha256);
    assert_eq!(first_attachments[0].disk_path, second_attachments[0].disk_path);

    let blob_path = std::path::Path::new(&first_attachments[0].disk_path);
    assert!(blob_path.is_file());

    let blob_root = blob_path.parent().unwrap().parent().unwrap();
    let digest_files: Vec<_> = walk_blob_files(blob_root);
    assert_eq!(digest_files.len(), 1, "expected exactly one blob file, found {digest_files:?}");
}

fn walk_blob_files(root: &std::path::Path) -> Vec<std::path::PathBuf> {
    let mut files = Vec::new();
    let Ok(entries) = std::fs::read_dir(root) else { return files };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            files.extend(walk_blob_files(&path));
        } else {
            files.push(path);
        }
    }
    files
}
