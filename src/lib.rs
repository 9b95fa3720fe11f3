//! # stream-gate
//!
//! Access control and anti-piracy layer for token-gated media streaming.
//!
//! Every content-access request passes through three components:
//!
//! - **Entitlement resolver** ([`entitlement`]): checks on-chain holdings of a
//!   wallet identity against the content's gating rule. Fails closed.
//! - **Capability tokens** ([`token`]): short-lived HMAC-signed tokens that
//!   authorize exactly one stream start for one (identity, content, quality)
//!   tuple. Verification is stateless.
//! - **Abuse monitor** ([`abuse`]): per-identity rate limiting and a rolling
//!   window of playback reports evaluated for ripping patterns. Fails open.
//!
//! ```text
//! POST /gate ──► rate limit ──► catalogue rule ──► resolver ──► mint token
//!                                                               │
//! GET /stream/{token} ◄─────────────────────────────────────────┘
//!        │ verify + redeem, locate media
//!        ▼
//! POST /stream/{token}/report ──► abuse monitor (advisory)
//! ```
//!
//! The [`gate::GateService`] composes the pipeline; [`server`] exposes it
//! over HTTP and [`gateway`] owns the process lifecycle.

pub mod abuse;
pub mod clock;
pub mod config;
pub mod delivery;
pub mod entitlement;
pub mod error;
pub mod event;
pub mod gate;
pub mod gateway;
pub mod identity;
pub mod server;
pub mod token;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{GatewayConfig, Posture};
pub use error::{Error, Result};
pub use event::{GateEvent, GateEventsChannel};
pub use gate::GateService;
pub use gateway::{GatewayBuilder, RunningGateway, ShutdownHandle};
pub use identity::Identity;
