//! Test harness: a fake chain RPC endpoint plus a running gateway.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use async_trait::async_trait;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use parking_lot::RwLock;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use stream_gate::abuse::{CounterStore, StoreError, StreamEvent};
use stream_gate::config::{GatewayConfig, MediaEntry, WindowLimit};
use stream_gate::entitlement::GatingRule;
use stream_gate::gateway::ShutdownHandle;
use stream_gate::{GateEventsChannel, GatewayBuilder, Identity, ManualClock};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// Unix time every test gateway starts at.
pub const START: u64 = 1_700_000_000;

/// An ungated content id present in the test catalogue.
pub const CATALOGUED: &str = "track-1";

/// Content gated on 100 units of [`mint`]`(1)`.
pub const PREMIUM: &str = "premium-track";

/// Content gated on membership of collection [`mint`]`(30)`.
pub const COLLECTOR: &str = "collector-edition";

/// Ungated catalogue entries `episode-0` to `episode-{EPISODES - 1}`.
pub const EPISODES: u8 = 25;

/// A withdrawn content id.
pub const WITHDRAWN: &str = "track-withdrawn";

#[derive(Default)]
struct ChainState {
    // owner -> (mint, raw amount, decimals)
    holdings: RwLock<HashMap<String, Vec<(String, u64, u8)>>>,
    supplies: RwLock<HashMap<String, u64>>,
    down: AtomicBool,
}

/// Minimal JSON-RPC endpoint answering the two methods the gateway uses.
pub struct FakeRpc {
    state: Arc<ChainState>,
    addr: SocketAddr,
    task: JoinHandle<()>,
}

impl FakeRpc {
    /// Start the endpoint on an ephemeral port.
    pub async fn start() -> Self {
        let state = Arc::new(ChainState::default());
        let app = Router::new()
            .route("/", post(handle_rpc))
            .with_state(Arc::clone(&state));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let task = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        Self { state, addr, task }
    }

    /// Endpoint URL.
    pub fn url(&self) -> String {
        format!("http://{}/", self.addr)
    }

    /// Credit `owner` with a token account.
    pub fn give(&self, owner: &Identity, mint: &str, amount: u64, decimals: u8) {
        self.state
            .holdings
            .write()
            .entry(owner.to_string())
            .or_default()
            .push((mint.to_string(), amount, decimals));
    }

    /// Set a mint's total supply.
    pub fn set_supply(&self, mint: &str, supply: u64) {
        self.state.supplies.write().insert(mint.to_string(), supply);
    }

    /// Make every call fail with HTTP 503.
    pub fn set_down(&self, down: bool) {
        self.state.down.store(down, Ordering::SeqCst);
    }
}

impl Drop for FakeRpc {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn handle_rpc(
    State(state): State<Arc<ChainState>>,
    Json(request): Json<Value>,
) -> Result<Json<Value>, StatusCode> {
    if state.down.load(Ordering::SeqCst) {
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    }
    let id = request["id"].clone();
    let params = &request["params"];

    let result = match request["method"].as_str() {
        Some("getTokenAccountsByOwner") => {
            let owner = params[0].as_str().unwrap_or_default();
            let mint_filter = params[1]["mint"].as_str();
            let holdings = state.holdings.read();
            let accounts: Vec<Value> = holdings
                .get(owner)
                .into_iter()
                .flatten()
                .enumerate()
                .filter(|(_, (mint, _, _))| mint_filter.map_or(true, |m| m == mint.as_str()))
                .map(|(i, (mint, amount, decimals))| {
                    json!({
                        "pubkey": format!("acct-{i}"),
                        "account": { "data": { "parsed": { "info": {
                            "mint": mint,
                            "owner": owner,
                            "tokenAmount": { "amount": amount.to_string(), "decimals": decimals },
                        }}}}
                    })
                })
                .collect();
            json!({ "context": { "slot": 1 }, "value": accounts })
        }
        Some("getTokenSupply") => {
            let mint = params[0].as_str().unwrap_or_default();
            match state.supplies.read().get(mint) {
                Some(supply) => json!({
                    "context": { "slot": 1 },
                    "value": { "amount": supply.to_string(), "decimals": 0 },
                }),
                None => {
                    return Ok(Json(json!({
                        "jsonrpc": "2.0",
                        "id": id,
                        "error": { "code": -32602, "message": "Invalid param: not a Token mint" },
                    })))
                }
            }
        }
        _ => {
            return Ok(Json(json!({
                "jsonrpc": "2.0",
                "id": id,
                "error": { "code": -32601, "message": "Method not found" },
            })))
        }
    };

    Ok(Json(json!({ "jsonrpc": "2.0", "id": id, "result": result })))
}

/// Counter store that is never reachable.
pub struct UnreachableStore;

#[async_trait]
impl CounterStore for UnreachableStore {
    async fn increment(&self, _: &str, _: u64, _: u64) -> Result<u64, StoreError> {
        Err(StoreError::Unavailable("connection refused".to_string()))
    }

    async fn append_and_prune(
        &self,
        _: &str,
        _: StreamEvent,
        _: u64,
        _: usize,
        _: u64,
    ) -> Result<Vec<StreamEvent>, StoreError> {
        Err(StoreError::Unavailable("connection refused".to_string()))
    }

    async fn sweep(&self, _: u64) -> usize {
        0
    }
}

/// Knobs for a test gateway.
#[derive(Default)]
pub struct TestGatewayConfig {
    /// Replace the counter store with one that always fails.
    pub unreachable_store: bool,
    /// Require a proof of key possession at or above this minimum.
    pub proof_threshold: Option<u64>,
    /// Override the `GET /stream/{token}` limit.
    pub stream_limit: Option<WindowLimit>,
}

fn entry(content_id: &str, gating_rule: GatingRule, withdrawn: bool) -> MediaEntry {
    MediaEntry {
        content_id: content_id.to_string(),
        locator: format!("https://media.example/{content_id}.opus"),
        gating_rule,
        withdrawn,
    }
}

/// A running gateway plus its fake chain and controllable clock.
pub struct TestGateway {
    /// Fake chain endpoint.
    pub chain: FakeRpc,
    /// Gateway clock.
    pub clock: Arc<ManualClock>,
    /// HTTP client.
    pub http: reqwest::Client,
    base: String,
    events: GateEventsChannel,
    shutdown: ShutdownHandle,
    task: JoinHandle<stream_gate::Result<()>>,
}

impl TestGateway {
    /// Start a gateway with default settings.
    pub async fn start() -> Self {
        Self::start_with(TestGatewayConfig::default()).await
    }

    /// Start a gateway with custom settings.
    pub async fn start_with(options: TestGatewayConfig) -> Self {
        let chain = FakeRpc::start().await;
        let clock = Arc::new(ManualClock::new(START));

        let mut config = GatewayConfig::default();
        config.listen = "127.0.0.1:0".parse().unwrap();
        config.chain.rpc_url = chain.url();
        config.chain.freshness_secs = 0;
        config.chain.proof_threshold = options.proof_threshold;
        if let Some(limit) = options.stream_limit {
            config.rate_limit.stream = limit;
        }
        config.media.catalog = vec![
            entry(CATALOGUED, GatingRule::open(), false),
            entry(PREMIUM, GatingRule::fungible(mint(1), 100), false),
            entry(COLLECTOR, GatingRule::nft_collection(mint(30)), false),
            entry(WITHDRAWN, GatingRule::open(), true),
        ];
        config.media.catalog.extend(
            (0..EPISODES).map(|i| entry(&format!("episode-{i}"), GatingRule::open(), false)),
        );

        let mut builder = GatewayBuilder::new(config).with_clock(clock.clone());
        if options.unreachable_store {
            builder = builder.with_store(Arc::new(UnreachableStore));
        }
        let mut gateway = builder.build().await.unwrap();

        let base = format!("http://{}", gateway.local_addr());
        let events = gateway.subscribe_events();
        let shutdown = gateway.shutdown_handle();
        let task = tokio::spawn(async move { gateway.run().await });

        let gateway = Self {
            chain,
            clock,
            http: reqwest::Client::new(),
            base,
            events,
            shutdown,
            task,
        };
        gateway.wait_ready().await;
        gateway
    }

    async fn wait_ready(&self) {
        for _ in 0..50 {
            if let Ok(resp) = self.http.get(self.url("/health")).send().await {
                if resp.status().is_success() {
                    return;
                }
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
        panic!("gateway did not become ready");
    }

    /// Absolute URL for `path`.
    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base)
    }

    /// `POST /gate` with a JSON body.
    pub async fn gate(&self, body: Value) -> reqwest::Response {
        self.http
            .post(self.url("/gate"))
            .json(&body)
            .send()
            .await
            .unwrap()
    }

    /// `GET /stream/{token}`.
    pub async fn stream(&self, token: &str) -> reqwest::Response {
        self.http
            .get(self.url(&format!("/stream/{token}")))
            .send()
            .await
            .unwrap()
    }

    /// `POST /stream/{token}/report`.
    pub async fn report(&self, token: &str, seconds: f64) -> reqwest::Response {
        self.http
            .post(self.url(&format!("/stream/{token}/report")))
            .json(&json!({ "listenedDurationSeconds": seconds }))
            .send()
            .await
            .unwrap()
    }

    /// Obtain a token for ungated content.
    pub async fn open_token(&self, identity: &Identity, content_id: &str) -> String {
        let resp = self
            .gate(json!({
                "identity": identity.to_string(),
                "contentId": content_id,
            }))
            .await;
        assert_eq!(resp.status(), 200);
        let body: Value = resp.json().await.unwrap();
        body["accessToken"].as_str().unwrap().to_string()
    }

    /// Events published so far that have not yet been read.
    pub fn drain_events(&mut self) -> Vec<stream_gate::GateEvent> {
        let mut out = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            out.push(event);
        }
        out
    }

    /// Shut the gateway down and wait for it to stop.
    pub async fn teardown(self) {
        self.shutdown.shutdown();
        self.task.await.unwrap().unwrap();
    }
}

/// Deterministic wallet identity number `n`.
pub fn wallet(n: u8) -> Identity {
    let key = ed25519_dalek::SigningKey::from_bytes(&[n; 32]);
    Identity::from_bytes(key.verifying_key().to_bytes())
}

/// Deterministic signing key for [`wallet`] `n`.
pub fn wallet_key(n: u8) -> ed25519_dalek::SigningKey {
    ed25519_dalek::SigningKey::from_bytes(&[n; 32])
}

/// A syntactically valid mint address.
pub fn mint(n: u8) -> String {
    Identity::from_bytes([n; 32]).to_string()
}
