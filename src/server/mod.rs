//! HTTP surface.
//!
//! Handlers are thin adapters over [`GateService`]: they decode bodies, call
//! one operation and encode the result. All error bodies come from
//! [`crate::Error`]'s `IntoResponse` and carry no internal detail.

mod routes;

use crate::gate::GateService;
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

pub use routes::{HealthResponse, ReportRequest, ReportResponse};

/// Handler state.
pub type SharedGate = Arc<GateService>;

/// Build the gateway router.
pub fn create_router(gate: SharedGate) -> Router {
    Router::new()
        .route("/gate", post(routes::gate))
        .route("/stream/:token", get(routes::stream))
        .route("/stream/:token/report", post(routes::report))
        .route("/health", get(routes::health))
        .with_state(gate)
}
