use super::SharedGate;
use crate::delivery::MediaDescriptor;
use crate::error::{Error, Result};
use crate::gate::{GateOutcome, GateRequest};
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::header::{self, HeaderMap, HeaderName, HeaderValue};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::debug;

const X_WATERMARK: HeaderName = HeaderName::from_static("x-watermark");

/// Body of `POST /stream/{token}/report`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportRequest {
    /// Seconds of playback.
    pub listened_duration_seconds: f64,
}

/// Reply to a playback report. Carries no abuse verdict.
#[derive(Debug, Clone, Serialize)]
pub struct ReportResponse {
    /// Always `true` once the report is recorded.
    pub accepted: bool,
}

/// Reply to `GET /health`.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// `ok` while serving.
    pub status: &'static str,
    /// Crate version.
    pub version: &'static str,
}

fn decode<T>(body: std::result::Result<Json<T>, JsonRejection>) -> Result<T> {
    body.map(|Json(value)| value).map_err(|rejection| {
        debug!("Rejected request body: {rejection}");
        Error::InvalidRequest("malformed body".to_string())
    })
}

pub(super) async fn gate(
    State(gate): State<SharedGate>,
    body: std::result::Result<Json<GateRequest>, JsonRejection>,
) -> Result<Json<GateOutcome>> {
    let request = decode(body)?;
    gate.request_access(request).await.map(Json)
}

pub(super) async fn stream(
    State(gate): State<SharedGate>,
    Path(token): Path<String>,
) -> Result<Response> {
    let descriptor = gate.open_stream(&token).await?;
    Ok(protected(descriptor))
}

pub(super) async fn report(
    State(gate): State<SharedGate>,
    Path(token): Path<String>,
    body: std::result::Result<Json<ReportRequest>, JsonRejection>,
) -> Result<Json<ReportResponse>> {
    let request = decode(body)?;
    gate.report(&token, request.listened_duration_seconds).await?;
    Ok(Json(ReportResponse { accepted: true }))
}

pub(super) async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Descriptor response with anti-caching, anti-framing and watermark headers.
fn protected(descriptor: MediaDescriptor) -> Response {
    let mut headers = HeaderMap::new();
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
    headers.insert(header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
    headers.insert(
        header::CONTENT_SECURITY_POLICY,
        HeaderValue::from_static("frame-ancestors 'none'"),
    );
    headers.insert(header::ACCEPT_RANGES, HeaderValue::from_static("none"));
    // hex, always a valid header value
    if let Ok(value) = HeaderValue::from_str(&descriptor.watermark) {
        headers.insert(X_WATERMARK, value);
    }
    (headers, Json(descriptor)).into_response()
}
