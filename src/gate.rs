//! The access pipeline: gate check, stream start, playback report.
//!
//! [`GateService`] wires the resolver, token service, rate limiters, abuse
//! monitor and media locator together. The HTTP layer in [`crate::server`]
//! is a thin adapter over its three operations.

use crate::abuse::{AbuseMonitor, CounterStore, LimitScope, RateLimiter};
use crate::clock::Clock;
use crate::config::GatewayConfig;
use crate::delivery::{MediaDescriptor, MediaLocator, RuleSource};
use crate::entitlement::{
    CacheStats, ChainClient, CollectionVerifier, Denial, EntitlementResolver, GateKind,
    GatingRule, ResolverConfig,
};
use crate::error::{Error, Result};
use crate::event::{GateEvent, GateEventsSender};
use crate::identity::Identity;
use crate::token::{ContentType, Quality, SigningSecret, TokenService, MAX_CONTENT_ID_LEN};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

/// Body of `POST /gate`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GateRequest {
    /// Wallet address.
    pub identity: String,
    /// Content being requested.
    pub content_id: String,
    /// Rule the client believes applies. Checked against the catalogue,
    /// never used for the decision.
    #[serde(default)]
    pub gating_rule: Option<GatingRule>,
    /// Media kind.
    #[serde(default)]
    pub content_type: ContentType,
    /// Requested quality tier.
    #[serde(default)]
    pub quality: Quality,
    /// Base58 ed25519 signature over `message`.
    #[serde(default)]
    pub signature: Option<String>,
    /// Signed access message.
    #[serde(default)]
    pub message: Option<String>,
}

/// Response to a gate check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GateOutcome {
    /// Whether a token was issued.
    pub has_access: bool,
    /// Observed balance or member count.
    pub balance: u64,
    /// Capability token, when access is granted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    /// Token expiry as Unix seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<u64>,
    /// Why access was denied.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<&'static str>,
}

/// External collaborators the pipeline runs against.
pub struct GateDeps {
    /// Chain state source.
    pub chain: Arc<dyn ChainClient>,
    /// NFT collection membership check.
    pub verifier: Arc<dyn CollectionVerifier>,
    /// Counter store shared by the limiters and the monitor.
    pub store: Arc<dyn CounterStore>,
    /// Content to media resolution.
    pub locator: Arc<dyn MediaLocator>,
    /// Content to gating rule resolution.
    pub rules: Arc<dyn RuleSource>,
    /// Token signing secret.
    pub secret: SigningSecret,
    /// Time source.
    pub clock: Arc<dyn Clock>,
    /// Event channel.
    pub events: GateEventsSender,
}

/// The composed access pipeline.
pub struct GateService {
    resolver: EntitlementResolver,
    tokens: TokenService,
    gate_limiter: RateLimiter,
    stream_limiter: RateLimiter,
    report_limiter: RateLimiter,
    monitor: AbuseMonitor,
    locator: Arc<dyn MediaLocator>,
    rules: Arc<dyn RuleSource>,
    clock: Arc<dyn Clock>,
    events: GateEventsSender,
    proof_threshold: Option<u64>,
    proof_max_age_secs: u64,
    descriptor_ttl_secs: u64,
    max_reported_duration_secs: f64,
}

impl GateService {
    /// Assemble the pipeline.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the token lifetime is out of range.
    pub fn new(config: &GatewayConfig, deps: GateDeps) -> Result<Self> {
        let GateDeps {
            chain,
            verifier,
            store,
            locator,
            rules,
            secret,
            clock,
            events,
        } = deps;

        let resolver = EntitlementResolver::new(
            chain,
            verifier,
            Arc::clone(&clock),
            ResolverConfig::from(&config.chain),
        );
        let tokens = TokenService::new(
            secret,
            Arc::clone(&clock),
            config.token.ttl_secs,
            config.token.report_grace_secs,
        )?;
        let gate_limiter = RateLimiter::new(
            Arc::clone(&store),
            Arc::clone(&clock),
            config.rate_limit.gate,
            LimitScope::Gate,
        )
        .with_events(events.clone());
        let stream_limiter = RateLimiter::new(
            Arc::clone(&store),
            Arc::clone(&clock),
            config.rate_limit.stream,
            LimitScope::Stream,
        )
        .with_events(events.clone());
        let report_limiter = RateLimiter::new(
            Arc::clone(&store),
            Arc::clone(&clock),
            config.rate_limit.report,
            LimitScope::Report,
        )
        .with_events(events.clone());
        let monitor = AbuseMonitor::new(store, Arc::clone(&clock), config.abuse.clone())
            .with_events(events.clone());

        Ok(Self {
            resolver,
            tokens,
            gate_limiter,
            stream_limiter,
            report_limiter,
            monitor,
            locator,
            rules,
            clock,
            events,
            proof_threshold: config.chain.proof_threshold,
            proof_max_age_secs: config.chain.proof_max_age_secs,
            descriptor_ttl_secs: config.media.descriptor_ttl_secs,
            max_reported_duration_secs: config.abuse.max_reported_duration_secs,
        })
    }

    /// Check entitlement and mint a capability token on success.
    ///
    /// The rule is looked up in the catalogue by content id. Insufficient
    /// holdings are a normal outcome (`has_access = false`), not an error.
    ///
    /// # Errors
    ///
    /// - `InvalidIdentity` / `InvalidRequest` for malformed input, or a
    ///   declared rule that differs from the catalogued one
    /// - `RateLimited` when the identity exceeded its gate budget
    /// - `ContentNotFound` when the catalogue has no rule for the content
    /// - `ProofRejected` when a proof is required or supplied and fails
    /// - `Unavailable` when chain state could not be observed
    pub async fn request_access(&self, request: GateRequest) -> Result<GateOutcome> {
        let identity = Identity::parse(&request.identity)?;
        check_content_id(&request.content_id)?;

        let rate = self.gate_limiter.check(identity.as_str()).await;
        if !rate.allowed {
            return Err(Error::RateLimited {
                retry_after_secs: rate.retry_after_secs.unwrap_or(1),
            });
        }

        let rule = self
            .rules
            .gating_rule(&request.content_id)
            .await?
            .ok_or_else(|| Error::ContentNotFound(request.content_id.clone()))?;
        if request.gating_rule.as_ref().is_some_and(|declared| *declared != rule) {
            debug!(
                "Declared rule for {} differs from catalogue ({})",
                request.content_id,
                rule.kind.as_str()
            );
            return Err(Error::InvalidRequest(
                "gatingRule does not match the content's rule".to_string(),
            ));
        }

        self.check_proof(&identity, &rule, &request)?;

        let decision = self
            .resolver
            .check_access(&identity, &request.content_id, &rule)
            .await;

        let balance = match decision.require() {
            Ok(balance) => balance,
            Err(Error::InsufficientEntitlement) => {
                let reason = Denial::InsufficientBalance.as_str();
                debug!("Access denied {identity} -> {}: {reason}", request.content_id);
                self.publish(GateEvent::AccessDenied {
                    identity: identity.to_string(),
                    content_id: request.content_id,
                    reason,
                });
                return Ok(GateOutcome {
                    has_access: false,
                    balance: decision.observed_balance,
                    access_token: None,
                    expires_at: None,
                    reason: Some(reason),
                });
            }
            Err(err) => {
                debug!(
                    "Could not evaluate {} rule for {}",
                    rule.kind.as_str(),
                    request.content_id
                );
                self.publish(GateEvent::AccessDenied {
                    identity: identity.to_string(),
                    content_id: request.content_id,
                    reason: Denial::Unavailable.as_str(),
                });
                return Err(err);
            }
        };

        let issued = self.tokens.issue(
            &identity,
            &request.content_id,
            request.content_type,
            request.quality,
        )?;
        info!(
            "Access granted {identity} -> {} (balance={balance})",
            request.content_id
        );
        self.publish(GateEvent::AccessGranted {
            identity: identity.to_string(),
            content_id: request.content_id,
        });
        Ok(GateOutcome {
            has_access: true,
            balance,
            access_token: Some(issued.token),
            expires_at: Some(issued.claims.expires_at),
            reason: None,
        })
    }

    /// Redeem a token and describe where to fetch the media.
    ///
    /// # Errors
    ///
    /// - `TokenExpired` / `TokenInvalid` for unusable or replayed tokens
    /// - `RateLimited` when the identity exceeded its stream budget
    /// - `ContentNotFound` when the content is unknown or withdrawn
    pub async fn open_stream(&self, token: &str) -> Result<MediaDescriptor> {
        let claims = self.tokens.verify(token).map_err(|rejection| {
            debug!("Stream token rejected: {}", rejection.as_str());
            Error::from(rejection)
        })?;

        let rate = self.stream_limiter.check(claims.identity.as_str()).await;
        if !rate.allowed {
            return Err(Error::RateLimited {
                retry_after_secs: rate.retry_after_secs.unwrap_or(1),
            });
        }

        let claims = self.tokens.redeem(token).map_err(|rejection| {
            debug!("Stream token rejected: {}", rejection.as_str());
            Error::from(rejection)
        })?;

        let location = self
            .locator
            .locate(&claims.content_id)
            .await?
            .ok_or_else(|| Error::ContentNotFound(claims.content_id.clone()))?;

        self.publish(GateEvent::StreamStarted {
            identity: claims.identity.to_string(),
            content_id: claims.content_id.clone(),
        });

        Ok(MediaDescriptor {
            url: location.url,
            expires_at: self.clock.now().saturating_add(self.descriptor_ttl_secs),
            watermark: self.tokens.watermark(&claims.identity, &claims.content_id),
            content_type: claims.content_type,
            quality: claims.quality,
        })
    }

    /// Record a playback report for the token's identity and content.
    ///
    /// The abuse verdict is never returned to the caller.
    ///
    /// # Errors
    ///
    /// - `TokenExpired` / `TokenInvalid` for unusable tokens
    /// - `RateLimited` when the identity exceeded its report budget
    /// - `InvalidRequest` for negative, non-finite or oversized durations
    pub async fn report(&self, token: &str, listened_duration_secs: f64) -> Result<()> {
        let claims = self.tokens.verify_for_report(token).map_err(Error::from)?;

        let rate = self.report_limiter.check(claims.identity.as_str()).await;
        if !rate.allowed {
            return Err(Error::RateLimited {
                retry_after_secs: rate.retry_after_secs.unwrap_or(1),
            });
        }

        if !listened_duration_secs.is_finite()
            || listened_duration_secs < 0.0
            || listened_duration_secs > self.max_reported_duration_secs
        {
            return Err(Error::InvalidRequest(
                "listened duration out of range".to_string(),
            ));
        }

        self.monitor
            .record_and_evaluate(
                claims.identity.as_str(),
                &claims.content_id,
                listened_duration_secs,
            )
            .await;
        Ok(())
    }

    /// Drop expired replay records.
    pub fn sweep_nonces(&self) -> usize {
        self.tokens.sweep_nonces()
    }

    /// Balance cache statistics.
    #[must_use]
    pub fn cache_stats(&self) -> CacheStats {
        self.resolver.cache_stats()
    }

    /// The gateway clock.
    #[must_use]
    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.clock)
    }

    /// Token lifetime in seconds.
    #[must_use]
    pub const fn token_ttl_secs(&self) -> u64 {
        self.tokens.ttl_secs()
    }

    fn check_proof(
        &self,
        identity: &Identity,
        rule: &GatingRule,
        request: &GateRequest,
    ) -> Result<()> {
        let required = rule.kind != GateKind::None
            && self
                .proof_threshold
                .is_some_and(|threshold| rule.minimum_amount >= threshold);

        match (&request.signature, &request.message) {
            (Some(signature), Some(message)) => identity.verify_access_proof(
                &request.content_id,
                message,
                signature,
                self.clock.now(),
                self.proof_max_age_secs,
            ),
            (None, None) if !required => Ok(()),
            (None, None) => Err(Error::ProofRejected("proof required".to_string())),
            _ => Err(Error::ProofRejected(
                "signature and message must be supplied together".to_string(),
            )),
        }
    }

    fn publish(&self, event: GateEvent) {
        let _ = self.events.send(event);
    }
}

fn check_content_id(content_id: &str) -> Result<()> {
    if content_id.is_empty() || content_id.len() > MAX_CONTENT_ID_LEN {
        return Err(Error::InvalidRequest(format!(
            "contentId must be 1..={MAX_CONTENT_ID_LEN} bytes"
        )));
    }
    Ok(())
}
