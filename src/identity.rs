//! Wallet identities and proof of key possession.
//!
//! An identity is a base58-encoded 32-byte ed25519 public key. It is the unit
//! of entitlement and of rate limiting.
//!
//! A balance check alone only proves that *some* wallet holds the tokens. For
//! high-value gates the caller also presents a signed access message, which
//! shows the requester controls the key right now.

use crate::error::{Error, Result};
use ed25519_dalek::{Signature, VerifyingKey};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// First line of every signed access message.
pub const ACCESS_MESSAGE_HEADER: &str = "stream-gate access";

/// Signed messages may be dated at most this far in the future.
const MAX_CLOCK_SKEW_SECS: u64 = 30;

/// A validated wallet address.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Identity {
    address: String,
    key: [u8; 32],
}

impl Identity {
    /// Parse and validate a base58 wallet address.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidIdentity` if the string is not base58 or does
    /// not decode to exactly 32 bytes.
    pub fn parse(address: &str) -> Result<Self> {
        let trimmed = address.trim();
        if trimmed.is_empty() {
            return Err(Error::InvalidIdentity("empty address".to_string()));
        }
        let bytes = bs58::decode(trimmed)
            .into_vec()
            .map_err(|e| Error::InvalidIdentity(format!("not base58: {e}")))?;
        let key: [u8; 32] = bytes.try_into().map_err(|b: Vec<u8>| {
            Error::InvalidIdentity(format!("expected 32 bytes, got {}", b.len()))
        })?;
        Ok(Self {
            address: trimmed.to_string(),
            key,
        })
    }

    /// Build an identity from raw public key bytes.
    #[must_use]
    pub fn from_bytes(key: [u8; 32]) -> Self {
        Self {
            address: bs58::encode(key).into_string(),
            key,
        }
    }

    /// The base58 address.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.address
    }

    /// The raw public key bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.key
    }

    /// Verify a signed access message for `content_id`.
    ///
    /// The message must be exactly what [`access_message`] produces for this
    /// identity and content, dated within `max_age_secs` of `now`, and signed
    /// by this identity's key. The signature is base58 (wallet convention).
    ///
    /// # Errors
    ///
    /// Returns `Error::ProofRejected` on any mismatch.
    pub fn verify_access_proof(
        &self,
        content_id: &str,
        message: &str,
        signature: &str,
        now: u64,
        max_age_secs: u64,
    ) -> Result<()> {
        let issued_at = parse_access_message(message, self, content_id)?;
        if issued_at > now.saturating_add(MAX_CLOCK_SKEW_SECS) {
            return Err(Error::ProofRejected("message dated in the future".to_string()));
        }
        if now.saturating_sub(issued_at) > max_age_secs {
            return Err(Error::ProofRejected("message too old".to_string()));
        }

        let sig_bytes = bs58::decode(signature.trim())
            .into_vec()
            .map_err(|_| Error::ProofRejected("signature not base58".to_string()))?;
        let sig_bytes: [u8; 64] = sig_bytes
            .try_into()
            .map_err(|_| Error::ProofRejected("signature must be 64 bytes".to_string()))?;
        let signature = Signature::from_bytes(&sig_bytes);

        let key = VerifyingKey::from_bytes(&self.key)
            .map_err(|_| Error::ProofRejected("identity is not a valid ed25519 key".to_string()))?;
        key.verify_strict(message.as_bytes(), &signature)
            .map_err(|_| Error::ProofRejected("signature does not verify".to_string()))
    }
}

/// Canonical access message a wallet signs to prove key possession.
#[must_use]
pub fn access_message(identity: &Identity, content_id: &str, issued_at: u64) -> String {
    format!(
        "{ACCESS_MESSAGE_HEADER}\nidentity: {}\ncontent: {content_id}\nissued: {issued_at}",
        identity.as_str()
    )
}

fn parse_access_message(message: &str, identity: &Identity, content_id: &str) -> Result<u64> {
    let reject = |what: &str| Error::ProofRejected(format!("malformed message: {what}"));

    let mut lines = message.lines();
    if lines.next() != Some(ACCESS_MESSAGE_HEADER) {
        return Err(reject("header"));
    }
    let signer = lines
        .next()
        .and_then(|l| l.strip_prefix("identity: "))
        .ok_or_else(|| reject("identity line"))?;
    if signer != identity.as_str() {
        return Err(Error::ProofRejected("message names another identity".to_string()));
    }
    let content = lines
        .next()
        .and_then(|l| l.strip_prefix("content: "))
        .ok_or_else(|| reject("content line"))?;
    if content != content_id {
        return Err(Error::ProofRejected("message names other content".to_string()));
    }
    let issued = lines
        .next()
        .and_then(|l| l.strip_prefix("issued: "))
        .and_then(|v| v.parse::<u64>().ok())
        .ok_or_else(|| reject("issued line"))?;
    if lines.next().is_some() {
        return Err(reject("trailing data"));
    }
    Ok(issued)
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.address)
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Identity({})", self.address)
    }
}

impl FromStr for Identity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Identity {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<Identity> for String {
    fn from(identity: Identity) -> Self {
        identity.address
    }
}
