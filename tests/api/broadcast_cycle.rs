use std::time::Duration;

use chrono::{TimeZone, Utc};
use claims::{assert_matches, assert_ok};
use listing_broadcast::{cycle::CycleError, domain::DeliveryOutcome};
use tokio_util::sync::CancellationToken;
use wiremock::{
    Mock, ResponseTemplate,
    matchers::{any, body_partial_json, method, path, path_regex},
};

use crate::helpers::{TelegramCall, message_sent, spawn_app, telegram_error};

fn trigger_time() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 2, 1, 12, 0, 0).unwrap()
}

fn two_city_catalog() -> serde_json::Value {
    serde_json::json!({
        "list": [
            {
                "city_name": "X",
                "results": [
                    { "name": "H1", "price": 1000, "available_date": "2024-02-01", "url": "http://x" }
                ]
            },
            { "city_name": "Y", "results": "none" }
        ]
    })
}

#[tokio::test]
async fn each_subscriber_gets_status_blocks_closing_and_edit() {
    let app = spawn_app().await;
    app.mount_subscribers(&[101, 202]).await;
    app.mount_catalog(two_city_catalog()).await;
    app.mount_telegram_ok().await;

    let report = assert_ok!(
        app.broadcast_cycle()
            .run(trigger_time(), &CancellationToken::new())
            .await
    );

    assert_eq!(report.outcomes.len(), 2);
    assert_eq!(report.count(DeliveryOutcome::Delivered), 2);

    let calls = app.telegram_calls().await;
    assert_eq!(calls.len(), 10);
    let closing = &app.config.broadcast.templates.closing;
    for chat_id in [101, 202] {
        let received: Vec<TelegramCall> =
            calls.iter().filter(|c| c.chat_id == chat_id).cloned().collect();
        let expected = vec![
            ("sendMessage", "Today is Thursday, 01 February 2024. Loading latest update..."),
            ("sendMessage", "*X*\nH1\nPrice: 1000\nAvailable Date: 2024-02-01"),
            ("sendMessage", "*Y*\nNo house found"),
            ("sendMessage", closing.as_str()),
            ("editMessageText", "Today is Thursday, 01 February 2024. Here is the latest update:"),
        ];
        let received: Vec<(&str, &str)> = received
            .iter()
            .map(|c| (c.api_method.as_str(), c.text.as_str()))
            .collect();
        assert_eq!(received, expected);
    }
}

#[tokio::test]
async fn listing_blocks_carry_a_more_info_button() {
    let app = spawn_app().await;
    app.mount_subscribers(&[7]).await;
    app.mount_catalog(two_city_catalog()).await;
    Mock::given(body_partial_json(serde_json::json!({
        "chat_id": 7,
        "reply_markup": { "inline_keyboard": [[{ "text": "More Info", "url": "http://x/" }]] }
    })))
    .respond_with(message_sent(2))
    .expect(1)
    .mount(&app.telegram_server)
    .await;
    app.mount_telegram_ok().await;

    assert_ok!(
        app.broadcast_cycle()
            .run(trigger_time(), &CancellationToken::new())
            .await
    );
}

#[tokio::test]
async fn catalog_failure_aborts_before_any_send() {
    let app = spawn_app().await;
    app.mount_subscribers(&[1, 2]).await;
    Mock::given(path("/catalog/list/all"))
        .respond_with(ResponseTemplate::new(500))
        .expect(3)
        .mount(&app.registry_server)
        .await;
    Mock::given(any())
        .respond_with(message_sent(1))
        .expect(0)
        .mount(&app.telegram_server)
        .await;

    let outcome = app
        .broadcast_cycle()
        .run(trigger_time(), &CancellationToken::new())
        .await;

    assert_matches!(outcome, Err(CycleError::Catalog(_)));
}

#[tokio::test]
async fn subscriber_list_failure_skips_the_catalog() {
    let app = spawn_app().await;
    Mock::given(path("/subscribers/list"))
        .respond_with(ResponseTemplate::new(502))
        .expect(3)
        .mount(&app.registry_server)
        .await;
    Mock::given(path("/catalog/list/all"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&app.registry_server)
        .await;
    Mock::given(any())
        .respond_with(message_sent(1))
        .expect(0)
        .mount(&app.telegram_server)
        .await;

    let outcome = app
        .broadcast_cycle()
        .run(trigger_time(), &CancellationToken::new())
        .await;

    assert_matches!(outcome, Err(CycleError::Subscribers(_)));
}

#[tokio::test]
async fn no_subscribers_means_no_catalog_fetch() {
    let app = spawn_app().await;
    app.mount_subscribers(&[]).await;
    Mock::given(path("/catalog/list/all"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&app.registry_server)
        .await;

    let report = assert_ok!(
        app.broadcast_cycle()
            .run(trigger_time(), &CancellationToken::new())
            .await
    );

    assert!(report.outcomes.is_empty());
}

#[tokio::test]
async fn blocked_subscriber_is_unsubscribed_and_the_cycle_completes() {
    let app = spawn_app().await;
    app.mount_subscribers(&[1, 2, 3, 4]).await;
    app.mount_catalog(two_city_catalog()).await;
    Mock::given(body_partial_json(serde_json::json!({ "chat_id": 3 })))
        .respond_with(telegram_error(403, "Forbidden: bot was blocked by the user"))
        .expect(1)
        .mount(&app.telegram_server)
        .await;
    app.mount_telegram_ok().await;
    Mock::given(path("/subscribers/3"))
        .and(method("DELETE"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&app.registry_server)
        .await;

    let report = assert_ok!(
        app.broadcast_cycle()
            .run(trigger_time(), &CancellationToken::new())
            .await
    );

    assert_eq!(report.count(DeliveryOutcome::Delivered), 3);
    assert_eq!(report.count(DeliveryOutcome::Unsubscribed), 1);
}

#[tokio::test]
async fn overlapping_runs_are_refused() {
    let app = spawn_app().await;
    app.mount_subscribers(&[1]).await;
    app.mount_catalog(two_city_catalog()).await;
    Mock::given(path_regex("/sendMessage$"))
        .respond_with(message_sent(1).set_delay(Duration::from_millis(200)))
        .mount(&app.telegram_server)
        .await;
    app.mount_telegram_ok().await;

    let cycle = app.broadcast_cycle();
    let token = CancellationToken::new();
    let (first, second) = tokio::join!(
        cycle.run(trigger_time(), &token),
        async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            cycle.run(trigger_time(), &token).await
        }
    );

    assert_ok!(first);
    assert_matches!(second, Err(CycleError::AlreadyRunning));

    // The guard is released once a cycle ends.
    assert_ok!(cycle.run(trigger_time(), &token).await);
}
