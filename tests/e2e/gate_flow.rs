//! `POST /gate` over HTTP.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use super::{
    mint, wallet, wallet_key, TestGateway, TestGatewayConfig, CATALOGUED, COLLECTOR, PREMIUM,
    START,
};
use ed25519_dalek::Signer;
use serde_json::{json, Value};
use stream_gate::identity::access_message;

fn premium(identity: &str) -> Value {
    json!({
        "identity": identity,
        "contentId": PREMIUM,
        "quality": "high",
    })
}

fn open(identity: &str) -> Value {
    json!({
        "identity": identity,
        "contentId": CATALOGUED,
    })
}

#[tokio::test]
async fn test_sufficient_balance_grants_access() {
    let gw = TestGateway::start().await;
    let holder = wallet(1);
    gw.chain.give(&holder, &mint(1), 100, 0);
    gw.chain.give(&holder, &mint(1), 50, 0);

    let resp = gw.gate(premium(holder.as_str())).await;
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["hasAccess"], true);
    assert_eq!(body["balance"], 150);
    assert_eq!(body["expiresAt"], START + 30);
    assert!(body["accessToken"].as_str().is_some_and(|t| t.contains('.')));

    gw.teardown().await;
}

#[tokio::test]
async fn test_insufficient_balance_denied_without_token() {
    let gw = TestGateway::start().await;
    let holder = wallet(2);
    gw.chain.give(&holder, &mint(1), 50, 0);

    let resp = gw.gate(premium(holder.as_str())).await;
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["hasAccess"], false);
    assert_eq!(body["balance"], 50);
    assert_eq!(body["reason"], "insufficient_balance");
    assert!(body.get("accessToken").is_none());

    gw.teardown().await;
}

#[tokio::test]
async fn test_client_declared_rule_cannot_unlock_gated_content() {
    let gw = TestGateway::start().await;
    let freeloader = wallet(10);

    let mut request = premium(freeloader.as_str());
    request["gatingRule"] = json!({ "kind": "none" });
    let resp = gw.gate(request).await;
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "invalid_request");
    assert!(body.get("accessToken").is_none());

    // a lower threshold than the catalogue's is refused too
    let mut request = premium(freeloader.as_str());
    request["gatingRule"] =
        json!({ "kind": "fungibleToken", "address": mint(1), "minimumAmount": 1 });
    assert_eq!(gw.gate(request).await.status(), 400);

    let resp = gw.gate(premium(freeloader.as_str())).await;
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["hasAccess"], false);

    gw.teardown().await;
}

#[tokio::test]
async fn test_declared_rule_matching_catalogue_accepted() {
    let gw = TestGateway::start().await;
    let holder = wallet(11);
    gw.chain.give(&holder, &mint(1), 100, 0);

    let mut request = premium(holder.as_str());
    request["gatingRule"] =
        json!({ "kind": "fungibleToken", "address": mint(1), "minimumAmount": 100 });
    let resp = gw.gate(request).await;
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["hasAccess"], true);

    gw.teardown().await;
}

#[tokio::test]
async fn test_uncatalogued_content_not_found() {
    let gw = TestGateway::start().await;

    let resp = gw
        .gate(json!({
            "identity": wallet(12).as_str(),
            "contentId": "never-published",
            "gatingRule": { "kind": "none" },
        }))
        .await;
    assert_eq!(resp.status(), 404);

    gw.teardown().await;
}

#[tokio::test]
async fn test_nft_collection_holder_granted() {
    let gw = TestGateway::start().await;
    let holder = wallet(3);
    gw.chain.give(&holder, &mint(20), 1, 0);
    gw.chain.set_supply(&mint(20), 1);
    // fungible-looking holding must not count as a collection member
    gw.chain.give(&holder, &mint(21), 500, 6);

    let resp = gw
        .gate(json!({
            "identity": holder.as_str(),
            "contentId": COLLECTOR,
        }))
        .await;
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["hasAccess"], true);
    assert_eq!(body["balance"], 1);

    gw.teardown().await;
}

#[tokio::test]
async fn test_invalid_identity_is_bad_request() {
    let gw = TestGateway::start().await;

    let resp = gw.gate(premium("0xdeadbeef")).await;
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "invalid_identity");
    assert_eq!(body["retryable"], false);

    gw.teardown().await;
}

#[tokio::test]
async fn test_malformed_body_is_bad_request() {
    let gw = TestGateway::start().await;

    let resp = gw
        .http
        .post(gw.url("/gate"))
        .header("content-type", "application/json")
        .body("{\"identity\": ")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    gw.teardown().await;
}

#[tokio::test]
async fn test_chain_outage_fails_closed() {
    let gw = TestGateway::start().await;
    let holder = wallet(4);
    gw.chain.give(&holder, &mint(1), 1_000, 0);
    gw.chain.set_down(true);

    let resp = gw.gate(premium(holder.as_str())).await;
    assert_eq!(resp.status(), 503);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "unavailable");
    assert_eq!(body["retryable"], true);
    assert!(body.get("accessToken").is_none());

    gw.teardown().await;
}

#[tokio::test]
async fn test_thirty_first_request_in_a_minute_is_rate_limited() {
    let gw = TestGateway::start().await;
    let holder = wallet(5);

    for i in 0..30 {
        let resp = gw.gate(open(holder.as_str())).await;
        assert_eq!(resp.status(), 200, "request {i}");
    }

    let resp = gw.gate(open(holder.as_str())).await;
    assert_eq!(resp.status(), 429);
    let retry_after: u64 = resp.headers()["retry-after"]
        .to_str()
        .unwrap()
        .parse()
        .unwrap();
    assert!((1..=60).contains(&retry_after));

    gw.clock.advance(60);
    let resp = gw.gate(open(holder.as_str())).await;
    assert_eq!(resp.status(), 200);

    gw.teardown().await;
}

#[tokio::test]
async fn test_proof_of_possession_required_above_threshold() {
    let gw = TestGateway::start_with(TestGatewayConfig {
        proof_threshold: Some(100),
        ..TestGatewayConfig::default()
    })
    .await;
    let holder = wallet(6);
    gw.chain.give(&holder, &mint(1), 150, 0);

    let resp = gw.gate(premium(holder.as_str())).await;
    assert_eq!(resp.status(), 401);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "proof_rejected");

    let message = access_message(&holder, PREMIUM, START);
    let signature = wallet_key(6).sign(message.as_bytes());
    let mut request = premium(holder.as_str());
    request["message"] = json!(message);
    request["signature"] = json!(bs58::encode(signature.to_bytes()).into_string());

    let resp = gw.gate(request.clone()).await;
    assert_eq!(resp.status(), 200);

    // someone else's signature over the same message
    let forged = wallet_key(7).sign(message.as_bytes());
    request["signature"] = json!(bs58::encode(forged.to_bytes()).into_string());
    let resp = gw.gate(request).await;
    assert_eq!(resp.status(), 401);

    gw.teardown().await;
}
