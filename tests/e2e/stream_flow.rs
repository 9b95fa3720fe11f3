//! `GET /stream/{token}` and playback reports over HTTP.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use super::{wallet, TestGateway, TestGatewayConfig, CATALOGUED, EPISODES, START, WITHDRAWN};
use serde_json::Value;
use stream_gate::abuse::AbuseReason;
use stream_gate::config::WindowLimit;
use stream_gate::GateEvent;

#[tokio::test]
async fn test_stream_returns_protected_descriptor() {
    let gw = TestGateway::start().await;
    let token = gw.open_token(&wallet(1), CATALOGUED).await;

    let resp = gw.stream(&token).await;
    assert_eq!(resp.status(), 200);
    let headers = resp.headers().clone();
    assert_eq!(headers["cache-control"], "no-store");
    assert_eq!(headers["pragma"], "no-cache");
    assert_eq!(headers["x-frame-options"], "DENY");
    assert_eq!(headers["content-security-policy"], "frame-ancestors 'none'");
    assert_eq!(headers["accept-ranges"], "none");

    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["url"], "https://media.example/track-1.opus");
    assert_eq!(body["contentType"], "track");
    assert_eq!(body["quality"], "standard");
    assert!(body["expiresAt"].as_u64().unwrap() > START);
    assert_eq!(
        body["watermark"].as_str().unwrap(),
        headers["x-watermark"].to_str().unwrap()
    );

    gw.teardown().await;
}

#[tokio::test]
async fn test_watermark_differs_per_identity() {
    let gw = TestGateway::start().await;
    let a = gw.open_token(&wallet(1), CATALOGUED).await;
    let b = gw.open_token(&wallet(2), CATALOGUED).await;

    let wa = gw.stream(&a).await.headers()["x-watermark"].clone();
    let wb = gw.stream(&b).await.headers()["x-watermark"].clone();
    assert_ne!(wa, wb);

    gw.teardown().await;
}

#[tokio::test]
async fn test_token_redeems_once() {
    let gw = TestGateway::start().await;
    let token = gw.open_token(&wallet(1), CATALOGUED).await;

    assert_eq!(gw.stream(&token).await.status(), 200);
    let resp = gw.stream(&token).await;
    assert_eq!(resp.status(), 401);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "token_invalid");

    gw.teardown().await;
}

#[tokio::test]
async fn test_stream_after_ttl_is_token_expired() {
    let gw = TestGateway::start().await;
    let token = gw.open_token(&wallet(1), CATALOGUED).await;

    gw.clock.advance(31);
    let resp = gw.stream(&token).await;
    assert_eq!(resp.status(), 401);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "token_expired");
    assert_eq!(body["retryable"], false);

    gw.teardown().await;
}

#[tokio::test]
async fn test_tampered_token_is_invalid() {
    let gw = TestGateway::start().await;
    let token = gw.open_token(&wallet(1), CATALOGUED).await;

    let (claims, signature) = token.split_once('.').unwrap();
    let mut chars: Vec<char> = claims.chars().collect();
    chars[4] = if chars[4] == 'A' { 'B' } else { 'A' };
    let tampered = format!("{}.{signature}", chars.into_iter().collect::<String>());

    let resp = gw.stream(&tampered).await;
    assert_eq!(resp.status(), 401);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "token_invalid");

    gw.teardown().await;
}

#[tokio::test]
async fn test_stream_rate_limit_keeps_token_redeemable() {
    let gw = TestGateway::start_with(TestGatewayConfig {
        // START is a multiple of 20, so the next window opens before the
        // 30 s token lifetime runs out
        stream_limit: Some(WindowLimit {
            max_requests: 1,
            window_secs: 20,
        }),
        ..TestGatewayConfig::default()
    })
    .await;
    let listener = wallet(3);
    let first = gw.open_token(&listener, CATALOGUED).await;
    let second = gw.open_token(&listener, CATALOGUED).await;

    assert_eq!(gw.stream(&first).await.status(), 200);
    let resp = gw.stream(&second).await;
    assert_eq!(resp.status(), 429);
    assert_eq!(resp.headers()["retry-after"], "20");
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "rate_limited");

    gw.clock.advance(20);
    let resp = gw.stream(&second).await;
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["url"], "https://media.example/track-1.opus");

    gw.teardown().await;
}

#[tokio::test]
async fn test_withdrawn_content_not_found() {
    let gw = TestGateway::start().await;
    let token = gw.open_token(&wallet(1), WITHDRAWN).await;

    let resp = gw.stream(&token).await;
    assert_eq!(resp.status(), 404);

    gw.teardown().await;
}

#[tokio::test]
async fn test_report_accepted_after_playback() {
    let gw = TestGateway::start().await;
    let token = gw.open_token(&wallet(1), CATALOGUED).await;
    assert_eq!(gw.stream(&token).await.status(), 200);

    gw.clock.advance(200);
    let resp = gw.report(&token, 180.0).await;
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body, serde_json::json!({ "accepted": true }));

    let resp = gw.report(&token, -3.0).await;
    assert_eq!(resp.status(), 400);

    gw.teardown().await;
}

#[tokio::test]
async fn test_breadth_is_flagged_but_never_surfaced() {
    let mut gw = TestGateway::start().await;
    let ripper = wallet(9);

    for i in 0..EPISODES {
        let token = gw.open_token(&ripper, &format!("episode-{i}")).await;
        let resp = gw.report(&token, 120.0).await;
        assert_eq!(resp.status(), 200);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body, serde_json::json!({ "accepted": true }));
    }

    let flagged = gw.drain_events().into_iter().any(|event| {
        matches!(
            event,
            GateEvent::SuspiciousActivity { ref reasons, .. } if reasons.contains(&AbuseReason::Breadth)
        )
    });
    assert!(flagged);

    gw.teardown().await;
}

#[tokio::test]
async fn test_fifteen_titles_not_flagged() {
    let mut gw = TestGateway::start().await;
    let listener = wallet(8);

    for i in 0..15 {
        let token = gw.open_token(&listener, &format!("episode-{i}")).await;
        assert_eq!(gw.report(&token, 120.0).await.status(), 200);
    }

    let flagged = gw
        .drain_events()
        .into_iter()
        .any(|event| matches!(event, GateEvent::SuspiciousActivity { .. }));
    assert!(!flagged);

    gw.teardown().await;
}
