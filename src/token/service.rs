//! Token issuance and verification.

use super::claims::{Claims, ContentType, Quality, MAX_CONTENT_ID_LEN, NONCE_LEN};
use super::replay::ReplayGuard;
use super::secret::SigningSecret;
use crate::clock::Clock;
use crate::config::MAX_TOKEN_TTL_SECS;
use crate::error::{Error, Result};
use crate::identity::Identity;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use rand::rngs::OsRng;
use rand::RngCore;
use std::sync::Arc;
use tracing::debug;

/// Domain separator for watermark derivation.
const WATERMARK_DOMAIN: &[u8] = b"stream-gate/watermark/v1\0";

/// Watermark length in bytes before hex encoding.
const WATERMARK_LEN: usize = 16;

/// HMAC-SHA256 tag length.
const TAG_LEN: usize = 32;

/// Why a token was refused.
///
/// Deliberately coarse: finer detail would help forgers probe the verifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenRejection {
    /// Signature valid but `now >= expires_at`.
    Expired,
    /// The MAC does not match the claims.
    BadSignature,
    /// Not decodable as a token.
    Malformed,
    /// Already redeemed at the delivery endpoint.
    Replayed,
}

impl TokenRejection {
    /// Stable name for logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Expired => "expired",
            Self::BadSignature => "bad_signature",
            Self::Malformed => "malformed",
            Self::Replayed => "replayed",
        }
    }
}

impl From<TokenRejection> for Error {
    fn from(rejection: TokenRejection) -> Self {
        match rejection {
            TokenRejection::Expired => Self::TokenExpired,
            TokenRejection::BadSignature | TokenRejection::Malformed | TokenRejection::Replayed => {
                Self::TokenInvalid
            }
        }
    }
}

/// A freshly minted token and the claims it carries.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    /// Encoded token for the client.
    pub token: String,
    /// Claims inside the token.
    pub claims: Claims,
}

/// Mints and verifies capability tokens.
pub struct TokenService {
    secret: SigningSecret,
    clock: Arc<dyn Clock>,
    replay: ReplayGuard,
    ttl_secs: u64,
    report_grace_secs: u64,
}

impl TokenService {
    /// Create a token service.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if `ttl_secs` is 0 or above 30.
    pub fn new(
        secret: SigningSecret,
        clock: Arc<dyn Clock>,
        ttl_secs: u64,
        report_grace_secs: u64,
    ) -> Result<Self> {
        if ttl_secs == 0 || ttl_secs > MAX_TOKEN_TTL_SECS {
            return Err(Error::Config(format!(
                "token ttl must be between 1 and {MAX_TOKEN_TTL_SECS} seconds"
            )));
        }
        Ok(Self {
            secret,
            clock,
            replay: ReplayGuard::new(),
            ttl_secs,
            report_grace_secs,
        })
    }

    /// Token lifetime in seconds.
    #[must_use]
    pub const fn ttl_secs(&self) -> u64 {
        self.ttl_secs
    }

    /// Mint a token for one (identity, content, quality) stream start.
    ///
    /// Callers must only do this after a successful entitlement check.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidRequest` if `content_id` is empty or too long.
    pub fn issue(
        &self,
        identity: &Identity,
        content_id: &str,
        content_type: ContentType,
        quality: Quality,
    ) -> Result<IssuedToken> {
        if content_id.is_empty() || content_id.len() > MAX_CONTENT_ID_LEN {
            return Err(Error::InvalidRequest(format!(
                "content id must be 1..={MAX_CONTENT_ID_LEN} bytes"
            )));
        }

        let mut nonce = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce);

        let issued_at = self.clock.now();
        let claims = Claims {
            content_id: content_id.to_string(),
            identity: identity.clone(),
            content_type,
            quality,
            issued_at,
            expires_at: issued_at + self.ttl_secs,
            nonce,
        };

        let token = self.encode(&claims);
        debug!(
            "Issued token for {identity} -> {content_id} (expires_at={})",
            claims.expires_at
        );
        Ok(IssuedToken { token, claims })
    }

    /// Verify a token against the current time.
    ///
    /// # Errors
    ///
    /// Returns `Malformed`, `BadSignature` or `Expired`.
    pub fn verify(&self, token: &str) -> std::result::Result<Claims, TokenRejection> {
        self.verify_at(token, self.clock.now())
    }

    /// Verify a token as of `now`. Valid iff the MAC matches and
    /// `now < expires_at`.
    ///
    /// # Errors
    ///
    /// Returns `Malformed`, `BadSignature` or `Expired`.
    pub fn verify_at(&self, token: &str, now: u64) -> std::result::Result<Claims, TokenRejection> {
        let claims = self.authenticate(token)?;
        if now >= claims.expires_at {
            return Err(TokenRejection::Expired);
        }
        Ok(claims)
    }

    /// Verify and consume a token at stream start.
    ///
    /// # Errors
    ///
    /// Everything [`verify`](Self::verify) returns, plus `Replayed` if the
    /// nonce was already redeemed.
    pub fn redeem(&self, token: &str) -> std::result::Result<Claims, TokenRejection> {
        let now = self.clock.now();
        let claims = self.verify_at(token, now)?;
        if !self.replay.first_use(&claims, now) {
            debug!("Replayed token for {} rejected", claims.identity);
            return Err(TokenRejection::Replayed);
        }
        Ok(claims)
    }

    /// Verify a token carrying a playback report.
    ///
    /// Reports arrive after playback, well past the stream-start lifetime,
    /// so expiry is extended by the report grace period. The MAC is still
    /// required.
    ///
    /// # Errors
    ///
    /// Returns `Malformed`, `BadSignature`, or `Expired` once the grace
    /// period has passed.
    pub fn verify_for_report(&self, token: &str) -> std::result::Result<Claims, TokenRejection> {
        let claims = self.authenticate(token)?;
        if self.clock.now() >= claims.expires_at.saturating_add(self.report_grace_secs) {
            return Err(TokenRejection::Expired);
        }
        Ok(claims)
    }

    /// Per-(identity, content) forensic watermark, hex encoded.
    #[must_use]
    pub fn watermark(&self, identity: &Identity, content_id: &str) -> String {
        let tag = self.secret.sign(&[
            WATERMARK_DOMAIN,
            identity.as_bytes().as_slice(),
            content_id.as_bytes(),
        ]);
        hex::encode(&tag[..WATERMARK_LEN])
    }

    /// Drop replay records for expired tokens.
    pub fn sweep_nonces(&self) -> usize {
        self.replay.sweep(self.clock.now())
    }

    /// Number of nonces currently held by the replay guard.
    #[must_use]
    pub fn tracked_nonces(&self) -> usize {
        self.replay.len()
    }

    fn encode(&self, claims: &Claims) -> String {
        let payload = claims.to_canonical_bytes();
        let tag = self.secret.sign(&[payload.as_slice()]);
        format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(&payload),
            URL_SAFE_NO_PAD.encode(tag)
        )
    }

    /// Decode and check the MAC, then parse claims. Expiry is not checked.
    fn authenticate(&self, token: &str) -> std::result::Result<Claims, TokenRejection> {
        let (payload_b64, tag_b64) = token.split_once('.').ok_or(TokenRejection::Malformed)?;
        let payload = URL_SAFE_NO_PAD
            .decode(payload_b64)
            .map_err(|_| TokenRejection::Malformed)?;
        let tag = URL_SAFE_NO_PAD
            .decode(tag_b64)
            .map_err(|_| TokenRejection::Malformed)?;
        if payload.is_empty() || tag.len() != TAG_LEN {
            return Err(TokenRejection::Malformed);
        }

        if !self.secret.verify(&[payload.as_slice()], &tag) {
            return Err(TokenRejection::BadSignature);
        }

        Claims::from_canonical_bytes(&payload).ok_or(TokenRejection::Malformed)
    }
}
