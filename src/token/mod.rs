//! Capability tokens for stream initiation.
//!
//! A token authorizes exactly one (identity, content, quality) stream start
//! for at most 30 seconds. It is self-contained: the delivery endpoint checks
//! it with one HMAC computation and no lookups.
//!
//! # Wire format
//!
//! ```text
//! base64url(canonical claims) "." base64url(HMAC-SHA256(secret, canonical claims))
//! ```
//!
//! The canonical claims are a versioned, length-prefixed byte string (see
//! [`Claims::to_canonical_bytes`]). The MAC is checked before the claims are
//! parsed, so a tampered token can only ever fail as `bad_signature` or
//! `malformed`.

mod claims;
mod replay;
mod secret;
mod service;

pub use claims::{Claims, ContentType, Quality, MAX_CONTENT_ID_LEN, NONCE_LEN};
pub use replay::ReplayGuard;
pub use secret::{check_strength, SigningSecret, MIN_SECRET_LEN, SAMPLE_SECRET_HEX};
pub use service::{IssuedToken, TokenRejection, TokenService};
