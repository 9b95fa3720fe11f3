//! Nonce replay suppression.
//!
//! Remembers each redeemed nonce until its token expires. After that the
//! token fails verification anyway, so the set never needs to hold more than
//! one token lifetime of nonces.

use super::claims::{Claims, NONCE_LEN};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::debug;

/// TTL-bounded set of redeemed nonces.
#[derive(Debug, Default)]
pub struct ReplayGuard {
    seen: DashMap<[u8; NONCE_LEN], u64>,
}

impl ReplayGuard {
    /// Create an empty guard.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the nonce of `claims`. Returns `false` if it was already
    /// redeemed and has not yet expired.
    pub fn first_use(&self, claims: &Claims, now: u64) -> bool {
        match self.seen.entry(claims.nonce) {
            Entry::Occupied(mut entry) => {
                if *entry.get() > now {
                    return false;
                }
                entry.insert(claims.expires_at);
                true
            }
            Entry::Vacant(entry) => {
                entry.insert(claims.expires_at);
                true
            }
        }
    }

    /// Drop nonces whose tokens have expired. Returns how many were removed.
    pub fn sweep(&self, now: u64) -> usize {
        let before = self.seen.len();
        self.seen.retain(|_, expires_at| *expires_at > now);
        let removed = before.saturating_sub(self.seen.len());
        if removed > 0 {
            debug!("Replay guard swept {removed} expired nonces");
        }
        removed
    }

    /// Number of nonces currently tracked.
    #[must_use]
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    /// Whether no nonces are tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}
