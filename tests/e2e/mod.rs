//! End-to-end tests for stream-gate.
//!
//! Each test spawns a real gateway on an ephemeral port, backed by a fake
//! JSON-RPC chain endpoint, and drives it over HTTP with `reqwest`.
//!
//! Run with: `cargo test --test e2e`

mod harness;

mod fail_open;
mod gate_flow;
mod stream_flow;

pub use harness::{
    mint, wallet, wallet_key, TestGateway, TestGatewayConfig, CATALOGUED, COLLECTOR, EPISODES,
    PREMIUM, START, WITHDRAWN,
};
