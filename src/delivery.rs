//! Content catalogue: media location, gating rules, and the descriptor
//! returned at stream start.

use crate::config::MediaConfig;
use crate::entitlement::GatingRule;
use crate::error::Result;
use crate::token::{ContentType, Quality};
use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;
use tracing::debug;

/// Where a content item's media lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaLocation {
    /// Object-storage locator.
    pub url: String,
}

/// Resolves content ids to media locations.
#[async_trait]
pub trait MediaLocator: Send + Sync {
    /// Locate `content_id`. `Ok(None)` when the content is unknown or
    /// withdrawn.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing catalogue cannot be read.
    async fn locate(&self, content_id: &str) -> Result<Option<MediaLocation>>;
}

/// Content management's view of which holdings unlock a content item.
///
/// This is the only source of gating rules; a rule sent by a client is never
/// trusted.
#[async_trait]
pub trait RuleSource: Send + Sync {
    /// The rule attached to `content_id`. `Ok(None)` when the content is
    /// unknown.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing catalogue cannot be read.
    async fn gating_rule(&self, content_id: &str) -> Result<Option<GatingRule>>;
}

#[derive(Debug, Clone)]
struct CatalogEntry {
    location: MediaLocation,
    rule: GatingRule,
    withdrawn: bool,
}

/// Locator and rule source backed by the static catalogue in
/// [`MediaConfig`].
///
/// Withdrawn entries keep their rule, so a gate check still resolves, but
/// are never located.
#[derive(Debug, Clone, Default)]
pub struct CatalogLocator {
    entries: HashMap<String, CatalogEntry>,
}

impl CatalogLocator {
    /// Build from configuration.
    #[must_use]
    pub fn from_config(config: &MediaConfig) -> Self {
        let entries = config
            .catalog
            .iter()
            .map(|e| {
                (
                    e.content_id.clone(),
                    CatalogEntry {
                        location: MediaLocation {
                            url: e.locator.clone(),
                        },
                        rule: e.gating_rule.clone(),
                        withdrawn: e.withdrawn,
                    },
                )
            })
            .collect::<HashMap<_, _>>();
        debug!(
            "Media catalogue loaded: {} entries, {} withdrawn",
            entries.len(),
            entries.values().filter(|e| e.withdrawn).count()
        );
        Self { entries }
    }
}

#[async_trait]
impl MediaLocator for CatalogLocator {
    async fn locate(&self, content_id: &str) -> Result<Option<MediaLocation>> {
        Ok(self
            .entries
            .get(content_id)
            .filter(|e| !e.withdrawn)
            .map(|e| e.location.clone()))
    }
}

#[async_trait]
impl RuleSource for CatalogLocator {
    async fn gating_rule(&self, content_id: &str) -> Result<Option<GatingRule>> {
        Ok(self.entries.get(content_id).map(|e| e.rule.clone()))
    }
}

/// Returned by `GET /stream/{token}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaDescriptor {
    /// Media URL.
    pub url: String,
    /// Unix time after which the descriptor should not be used.
    pub expires_at: u64,
    /// Per-(identity, content) forensic watermark.
    pub watermark: String,
    /// Media kind.
    pub content_type: ContentType,
    /// Quality tier.
    pub quality: Quality,
}
