//! Playback-pattern heuristics.
//!
//! Each playback report is appended to the identity's rolling window and the
//! window is checked against three independent heuristics. A verdict is
//! advisory: it goes to the `stream_gate::abuse` log target and the event
//! channel, never to the client.

use super::store::{CounterStore, StreamEvent};
use crate::clock::Clock;
use crate::config::AbuseConfig;
use crate::event::{GateEvent, GateEventsSender};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Which heuristic flagged a window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AbuseReason {
    /// Too many distinct content ids (bulk traversal).
    Breadth,
    /// Too many plays below the engagement threshold (skip-scraping).
    ShallowListens,
    /// One content id requested too often (fragment reassembly).
    Repetition,
}

impl AbuseReason {
    /// Stable name for logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Breadth => "breadth",
            Self::ShallowListens => "shallow_listens",
            Self::Repetition => "repetition",
        }
    }
}

/// Result of evaluating one identity's window.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AbuseVerdict {
    /// Whether any heuristic fired.
    pub suspicious: bool,
    /// Heuristics that fired, in evaluation order.
    pub reasons: Vec<AbuseReason>,
    /// The store was unavailable and evaluation was skipped.
    pub degraded: bool,
}

/// Evaluate the three heuristics over a window.
#[must_use]
pub fn evaluate(window: &[StreamEvent], config: &AbuseConfig) -> Vec<AbuseReason> {
    let mut per_content: HashMap<&str, usize> = HashMap::new();
    let mut shallow = 0usize;
    for event in window {
        *per_content.entry(event.content_id.as_str()).or_default() += 1;
        if event.listened_duration_secs < config.shallow_listen_secs {
            shallow += 1;
        }
    }

    let mut reasons = Vec::new();
    if per_content.len() > config.breadth_threshold {
        reasons.push(AbuseReason::Breadth);
    }
    if shallow > config.shallow_threshold {
        reasons.push(AbuseReason::ShallowListens);
    }
    if per_content
        .values()
        .any(|&count| count > config.repetition_threshold)
    {
        reasons.push(AbuseReason::Repetition);
    }
    reasons
}

/// Rolling-window abuse monitor.
pub struct AbuseMonitor {
    store: Arc<dyn CounterStore>,
    clock: Arc<dyn Clock>,
    config: AbuseConfig,
    events: Option<GateEventsSender>,
}

impl AbuseMonitor {
    /// Create a monitor over `store`.
    #[must_use]
    pub fn new(store: Arc<dyn CounterStore>, clock: Arc<dyn Clock>, config: AbuseConfig) -> Self {
        Self {
            store,
            clock,
            config,
            events: None,
        }
    }

    /// Publish verdicts and store degradation on `events`.
    #[must_use]
    pub fn with_events(mut self, events: GateEventsSender) -> Self {
        self.events = Some(events);
        self
    }

    /// Record a playback report and evaluate the identity's window.
    ///
    /// Never fails: an unavailable store yields a non-suspicious verdict with
    /// `degraded` set.
    pub async fn record_and_evaluate(
        &self,
        identity: &str,
        content_id: &str,
        listened_duration_secs: f64,
    ) -> AbuseVerdict {
        let now = self.clock.now();
        let event = StreamEvent {
            content_id: content_id.to_string(),
            timestamp: now,
            listened_duration_secs,
        };

        let window = match self
            .store
            .append_and_prune(
                identity,
                event,
                self.config.window_secs,
                self.config.max_window_events,
                now,
            )
            .await
        {
            Ok(window) => window,
            Err(e) => {
                warn!(
                    target: "stream_gate::alert",
                    "Abuse monitor store unavailable, skipping heuristics: {e}"
                );
                self.publish(GateEvent::StoreDegraded {
                    component: "abuse_monitor",
                    message: e.to_string(),
                });
                return AbuseVerdict {
                    degraded: true,
                    ..AbuseVerdict::default()
                };
            }
        };

        let reasons = evaluate(&window, &self.config);
        if reasons.is_empty() {
            return AbuseVerdict::default();
        }

        let names: Vec<&str> = reasons.iter().map(|r| r.as_str()).collect();
        info!(
            target: "stream_gate::abuse",
            identity,
            window_len = window.len(),
            "Suspicious playback pattern: {}",
            names.join(",")
        );
        self.publish(GateEvent::SuspiciousActivity {
            identity: identity.to_string(),
            reasons: reasons.clone(),
        });

        AbuseVerdict {
            suspicious: true,
            reasons,
            degraded: false,
        }
    }

    fn publish(&self, event: GateEvent) {
        if let Some(events) = &self.events {
            let _ = events.send(event);
        }
    }
}
