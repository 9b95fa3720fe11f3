//! Process-wide HMAC signing secret.
//!
//! Loaded once at startup and immutable afterwards. The decoded key bytes
//! are zeroized as soon as the keyed MAC state has been derived.

use crate::config::{Posture, TokenConfig};
use crate::error::{Error, Result};
use hmac::{Hmac, Mac};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;
use std::collections::HashSet;
use std::fmt;
use subtle::ConstantTimeEq;
use tracing::{info, warn};
use zeroize::Zeroizing;

type HmacSha256 = Hmac<Sha256>;

/// Minimum secret length in bytes.
pub const MIN_SECRET_LEN: usize = 32;

/// Placeholder secret shown in documentation and sample configs.
///
/// Always rejected as weak.
pub const SAMPLE_SECRET_HEX: &str =
    "00112233445566778899aabbccddeeff00112233445566778899aabbccddeeff";

/// Fewest distinct byte values accepted in a secret.
const MIN_DISTINCT_BYTES: usize = 16;

/// Keyed HMAC-SHA256 state.
#[derive(Clone)]
pub struct SigningSecret {
    mac: HmacSha256,
}

impl SigningSecret {
    /// Key from raw bytes without strength checks.
    ///
    /// # Errors
    ///
    /// Returns an error if the key cannot initialize HMAC.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mac = <HmacSha256 as Mac>::new_from_slice(bytes)
            .map_err(|e| Error::Config(format!("invalid signing key: {e}")))?;
        Ok(Self { mac })
    }

    /// Decode a hex secret and key from it without strength checks.
    ///
    /// # Errors
    ///
    /// Returns an error if the string is not hex.
    pub fn from_hex(hex_secret: &str) -> Result<Self> {
        let bytes = decode_hex(hex_secret)?;
        Self::from_bytes(&bytes)
    }

    /// Generate a random secret.
    ///
    /// # Errors
    ///
    /// Returns an error if HMAC cannot be keyed.
    pub fn generate() -> Result<Self> {
        let mut bytes = Zeroizing::new([0u8; MIN_SECRET_LEN]);
        OsRng.fill_bytes(bytes.as_mut());
        Self::from_bytes(bytes.as_ref())
    }

    /// Load the signing secret for `posture`.
    ///
    /// - Production: the secret must be present and pass [`check_strength`].
    /// - Development: a weak secret is accepted with a warning; a missing one
    ///   is replaced with an ephemeral random secret.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if production requirements are not met or the
    /// secret is not valid hex.
    pub fn load(config: &TokenConfig, posture: Posture) -> Result<Self> {
        let Some(hex_secret) = config.secret_hex.as_deref().filter(|s| !s.trim().is_empty())
        else {
            return match posture {
                Posture::Production => Err(Error::Config(
                    "production posture requires token.secret_hex (generate one with stream-gate-keygen)"
                        .to_string(),
                )),
                Posture::Development => {
                    warn!("No signing secret configured - using an ephemeral random secret; tokens will not survive restart");
                    Self::generate()
                }
            };
        };

        let bytes = decode_hex(hex_secret)?;
        if let Err(reason) = check_strength(&bytes) {
            match posture {
                Posture::Production => {
                    return Err(Error::Config(format!("weak signing secret: {reason}")));
                }
                Posture::Development => {
                    warn!("Weak signing secret accepted in development posture: {reason}");
                }
            }
        }

        info!("Signing secret loaded ({} bytes)", bytes.len());
        Self::from_bytes(&bytes)
    }

    /// HMAC-SHA256 over `parts` in order.
    #[must_use]
    pub fn sign(&self, parts: &[&[u8]]) -> [u8; 32] {
        let mut mac = self.mac.clone();
        for part in parts {
            mac.update(part);
        }
        let mut tag = [0u8; 32];
        tag.copy_from_slice(&mac.finalize().into_bytes());
        tag
    }

    /// Constant-time check of `tag` against the HMAC of `parts`.
    #[must_use]
    pub fn verify(&self, parts: &[&[u8]], tag: &[u8]) -> bool {
        self.sign(parts).ct_eq(tag).into()
    }
}

impl fmt::Debug for SigningSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SigningSecret(<redacted>)")
    }
}

fn decode_hex(hex_secret: &str) -> Result<Zeroizing<Vec<u8>>> {
    hex::decode(hex_secret.trim())
        .map(Zeroizing::new)
        .map_err(|_| Error::Config("token.secret_hex is not valid hex".to_string()))
}

/// Reject secrets that are short, documented placeholders or low-entropy.
///
/// # Errors
///
/// Returns a description of the first failed check.
pub fn check_strength(bytes: &[u8]) -> std::result::Result<(), String> {
    if bytes.len() < MIN_SECRET_LEN {
        return Err(format!(
            "secret is {} bytes, need at least {MIN_SECRET_LEN}",
            bytes.len()
        ));
    }
    if hex::encode(bytes) == SAMPLE_SECRET_HEX {
        return Err("secret is the documented sample value".to_string());
    }
    if bytes.iter().all(|b| b.is_ascii_graphic() || *b == b' ') {
        return Err("secret is printable text, not random bytes".to_string());
    }
    let distinct: HashSet<u8> = bytes.iter().copied().collect();
    if distinct.len() < MIN_DISTINCT_BYTES {
        return Err(format!(
            "secret uses only {} distinct byte values",
            distinct.len()
        ));
    }
    Ok(())
}
