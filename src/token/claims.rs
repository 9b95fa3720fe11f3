//! Token claims and their canonical byte encoding.

use crate::identity::Identity;
use serde::{Deserialize, Serialize};

/// Canonical encoding version.
const CLAIMS_VERSION: u8 = 1;

/// Nonce length in bytes.
pub const NONCE_LEN: usize = 16;

/// Longest content identifier a token can carry.
pub const MAX_CONTENT_ID_LEN: usize = 256;

/// Kind of media being streamed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    /// A music track.
    #[default]
    Track,
    /// A video.
    Video,
    /// A podcast or show episode.
    Episode,
}

impl ContentType {
    const fn tag(self) -> u8 {
        match self {
            Self::Track => 1,
            Self::Video => 2,
            Self::Episode => 3,
        }
    }

    const fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(Self::Track),
            2 => Some(Self::Video),
            3 => Some(Self::Episode),
            _ => None,
        }
    }
}

/// Delivery quality tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Quality {
    /// Short low-bitrate preview.
    Preview,
    /// Standard bitrate.
    #[default]
    Standard,
    /// High bitrate.
    High,
    /// Lossless.
    Lossless,
}

impl Quality {
    const fn tag(self) -> u8 {
        match self {
            Self::Preview => 1,
            Self::Standard => 2,
            Self::High => 3,
            Self::Lossless => 4,
        }
    }

    const fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(Self::Preview),
            2 => Some(Self::Standard),
            3 => Some(Self::High),
            4 => Some(Self::Lossless),
            _ => None,
        }
    }
}

/// Everything a capability token asserts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Claims {
    /// Content the holder may start streaming.
    pub content_id: String,
    /// Identity the token was issued to.
    pub identity: Identity,
    /// Media kind.
    pub content_type: ContentType,
    /// Quality tier.
    pub quality: Quality,
    /// Unix time of issuance.
    pub issued_at: u64,
    /// Unix time after which the token is invalid.
    pub expires_at: u64,
    /// Random per-token nonce.
    pub nonce: [u8; NONCE_LEN],
}

impl Claims {
    /// Canonical byte encoding covered by the signature.
    ///
    /// Layout: version (1) | identity key (32) | content id length (2, BE) |
    /// content id | content type (1) | quality (1) | issued at (8, BE) |
    /// expires at (8, BE) | nonce (16).
    #[must_use]
    pub fn to_canonical_bytes(&self) -> Vec<u8> {
        let content = self.content_id.as_bytes();
        let mut out = Vec::with_capacity(1 + 32 + 2 + content.len() + 2 + 16 + NONCE_LEN);
        out.push(CLAIMS_VERSION);
        out.extend_from_slice(self.identity.as_bytes());
        // content ids are capped at MAX_CONTENT_ID_LEN at issuance
        let len = u16::try_from(content.len()).unwrap_or(u16::MAX);
        out.extend_from_slice(&len.to_be_bytes());
        out.extend_from_slice(content);
        out.push(self.content_type.tag());
        out.push(self.quality.tag());
        out.extend_from_slice(&self.issued_at.to_be_bytes());
        out.extend_from_slice(&self.expires_at.to_be_bytes());
        out.extend_from_slice(&self.nonce);
        out
    }

    /// Parse the canonical encoding. Returns `None` on any deviation,
    /// including trailing bytes.
    #[must_use]
    pub fn from_canonical_bytes(bytes: &[u8]) -> Option<Self> {
        let mut reader = Reader { bytes };

        if reader.take(1)?[0] != CLAIMS_VERSION {
            return None;
        }
        let key: [u8; 32] = reader.take(32)?.try_into().ok()?;
        let len = usize::from(u16::from_be_bytes(reader.take(2)?.try_into().ok()?));
        if len == 0 || len > MAX_CONTENT_ID_LEN {
            return None;
        }
        let content_id = std::str::from_utf8(reader.take(len)?).ok()?.to_string();
        let content_type = ContentType::from_tag(reader.take(1)?[0])?;
        let quality = Quality::from_tag(reader.take(1)?[0])?;
        let issued_at = u64::from_be_bytes(reader.take(8)?.try_into().ok()?);
        let expires_at = u64::from_be_bytes(reader.take(8)?.try_into().ok()?);
        let nonce: [u8; NONCE_LEN] = reader.take(NONCE_LEN)?.try_into().ok()?;

        if !reader.bytes.is_empty() || expires_at < issued_at {
            return None;
        }

        Some(Self {
            content_id,
            identity: Identity::from_bytes(key),
            content_type,
            quality,
            issued_at,
            expires_at,
            nonce,
        })
    }
}

struct Reader<'a> {
    bytes: &'a [u8],
}

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize) -> Option<&'a [u8]> {
        if self.bytes.len() < n {
            return None;
        }
        let (head, tail) = self.bytes.split_at(n);
        self.bytes = tail;
        Some(head)
    }
}
