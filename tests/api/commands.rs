use wiremock::{
    Mock, ResponseTemplate,
    matchers::{any, body_json, body_partial_json, method, path},
};

use crate::helpers::{WEBHOOK_SECRET, message_sent, spawn_app};

fn command_update(chat_id: i64, text: &str) -> serde_json::Value {
    serde_json::json!({
        "update_id": 1,
        "message": {
            "message_id": 10,
            "date": 0,
            "chat": { "id": chat_id, "type": "private" },
            "text": text
        }
    })
}

async fn expect_reply(app: &crate::helpers::TestApp, chat_id: i64, text: &str) {
    Mock::given(body_partial_json(serde_json::json!({ "chat_id": chat_id, "text": text })))
        .respond_with(message_sent(1))
        .expect(1)
        .mount(&app.telegram_server)
        .await;
}

#[tokio::test]
async fn requests_without_the_secret_are_rejected() {
    let app = spawn_app().await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&app.registry_server)
        .await;

    let missing = app
        .post_update_with_secret(&command_update(1, "/set_reminder"), None)
        .await;
    let wrong = app
        .post_update_with_secret(&command_update(1, "/set_reminder"), Some("guess"))
        .await;

    assert_eq!(missing.status().as_u16(), 401);
    assert_eq!(wrong.status().as_u16(), 401);
}

#[tokio::test]
async fn start_replies_with_the_welcome_text() {
    let app = spawn_app().await;
    expect_reply(&app, 5, &app.config.broadcast.templates.welcome).await;

    let response = app.post_update(&command_update(5, "/start")).await;

    assert_eq!(response.status().as_u16(), 200);
}

#[tokio::test]
async fn set_reminder_registers_a_new_subscriber() {
    let app = spawn_app().await;
    Mock::given(path("/subscribers/5"))
        .and(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&app.registry_server)
        .await;
    Mock::given(path("/subscribers/register"))
        .and(method("POST"))
        .and(body_json(serde_json::json!({ "recipient_id": 5 })))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&app.registry_server)
        .await;
    expect_reply(&app, 5, &app.config.broadcast.templates.registered).await;

    let response = app.post_update(&command_update(5, "/set_reminder")).await;

    assert_eq!(response.status().as_u16(), 200);
}

#[tokio::test]
async fn set_reminder_is_idempotent() {
    let app = spawn_app().await;
    Mock::given(path("/subscribers/5"))
        .and(method("GET"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({ "recipient_id": 5 })),
        )
        .mount(&app.registry_server)
        .await;
    Mock::given(path("/subscribers/register"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&app.registry_server)
        .await;
    expect_reply(&app, 5, &app.config.broadcast.templates.already_registered).await;

    let response = app.post_update(&command_update(5, "/set_reminder@HouseBot")).await;

    assert_eq!(response.status().as_u16(), 200);
}

#[tokio::test]
async fn unset_reminder_removes_the_subscriber() {
    let app = spawn_app().await;
    Mock::given(path("/subscribers/5"))
        .and(method("DELETE"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&app.registry_server)
        .await;
    expect_reply(&app, 5, &app.config.broadcast.templates.unregistered).await;

    let response = app.post_update(&command_update(5, "/unset_reminder")).await;

    assert_eq!(response.status().as_u16(), 200);
}

#[tokio::test]
async fn unset_reminder_for_an_unknown_subscriber_is_not_an_error() {
    let app = spawn_app().await;
    Mock::given(path("/subscribers/5"))
        .and(method("DELETE"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&app.registry_server)
        .await;
    expect_reply(&app, 5, &app.config.broadcast.templates.not_registered).await;

    let response = app.post_update(&command_update(5, "/unset_reminder")).await;

    assert_eq!(response.status().as_u16(), 200);
}

#[tokio::test]
async fn registry_failure_is_reported_to_the_user() {
    let app = spawn_app().await;
    // Command calls give up after two attempts.
    Mock::given(any())
        .respond_with(ResponseTemplate::new(500))
        .expect(2)
        .mount(&app.registry_server)
        .await;
    expect_reply(&app, 5, &app.config.broadcast.templates.request_failed).await;

    let response = app.post_update(&command_update(5, "/set_reminder")).await;

    assert_eq!(response.status().as_u16(), 200);
}

#[tokio::test]
async fn plain_messages_are_acknowledged_and_ignored() {
    let app = spawn_app().await;
    Mock::given(any())
        .respond_with(message_sent(1))
        .expect(0)
        .mount(&app.telegram_server)
        .await;

    let response = app.post_update(&command_update(5, "hello there")).await;

    assert_eq!(response.status().as_u16(), 200);
}

#[tokio::test]
async fn malformed_body_without_the_secret_is_unauthorized() {
    let app = spawn_app().await;

    let response = app
        .api_client
        .post(format!("{}/telegram/webhook", &app.address))
        .header("Content-Type", "application/json")
        .body("not json")
        .send()
        .await
        .expect("Failed to execute request.");

    assert_eq!(response.status().as_u16(), 401);
}

#[tokio::test]
async fn malformed_body_with_the_secret_is_a_bad_request() {
    let app = spawn_app().await;

    let response = app
        .api_client
        .post(format!("{}/telegram/webhook", &app.address))
        .header("X-Telegram-Bot-Api-Secret-Token", WEBHOOK_SECRET)
        .header("Content-Type", "application/json")
        .body("not json")
        .send()
        .await
        .expect("Failed to execute request.");

    assert_eq!(response.status().as_u16(), 400);
}
