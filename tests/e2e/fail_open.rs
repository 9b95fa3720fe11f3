//! Counter store outages: the limiter and monitor fail open, the resolver
//! does not.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use super::{mint, wallet, TestGateway, TestGatewayConfig, CATALOGUED, PREMIUM};
use serde_json::{json, Value};
use stream_gate::GateEvent;

fn degraded(events: &[GateEvent], component: &str) -> bool {
    events.iter().any(|event| {
        matches!(event, GateEvent::StoreDegraded { component: c, .. } if *c == component)
    })
}

#[tokio::test]
async fn test_unreachable_store_fails_open() {
    let mut gw = TestGateway::start_with(TestGatewayConfig {
        unreachable_store: true,
        ..TestGatewayConfig::default()
    })
    .await;
    let holder = wallet(1);

    // well past the 30/minute limit
    let mut tokens = Vec::new();
    for _ in 0..40 {
        tokens.push(gw.open_token(&holder, CATALOGUED).await);
    }
    for token in tokens.iter().take(5) {
        assert_eq!(gw.stream(token).await.status(), 200);
        assert_eq!(gw.report(token, 1.0).await.status(), 200);
    }

    let events = gw.drain_events();
    assert!(degraded(&events, "rate_limiter"));
    assert!(degraded(&events, "abuse_monitor"));

    gw.teardown().await;
}

#[tokio::test]
async fn test_store_outage_does_not_open_the_resolver() {
    let gw = TestGateway::start_with(TestGatewayConfig {
        unreachable_store: true,
        ..TestGatewayConfig::default()
    })
    .await;
    let holder = wallet(2);
    gw.chain.give(&holder, &mint(1), 10, 0);

    let request = json!({
        "identity": holder.as_str(),
        "contentId": PREMIUM,
    });
    let resp = gw.gate(request.clone()).await;
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["hasAccess"], false);

    gw.chain.set_down(true);
    let resp = gw.gate(request).await;
    assert_eq!(resp.status(), 503);

    gw.teardown().await;
}
