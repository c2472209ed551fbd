//! Branded opaque tokens for loader requests and mutation actions.
//!
//! ## Purpose
//!
//! Every adapter exposes its loaders as `Opaque<LoaderKind>` and its actions
//! as `Opaque<ActionKind>`, but each adapter's payload is a private type.
//! The declared token type alone cannot stop one adapter from decoding
//! another adapter's token, so each [`OpaqueCodec`] instance brands what it
//! encodes:
//!
//! - an in-memory **marker** unique to the codec instance (never serialized)
//! - an HMAC-SHA256 **seal** over `tag | canonical payload`, keyed by a
//!   per-instance random secret
//!
//! Decoding checks the marker first (cheap, exact), then the seal. A token
//! that went through serialization has no marker and is accepted only if the
//! seal verifies, so the brand survives persistence.
//!
//! ```text
//! adapter A codec ──encode──▶ Opaque<loader> ──▶ renderer ──▶ adapter A codec ──decode──▶ payload
//!                                                     └──────▶ adapter B codec ──decode──▶ BrandMismatch
//! ```
//!
//! A brand mismatch is a programmer error (the wrong adapter was handed the
//! token) and is never converted into a data-level error.

use hmac::{Hmac, Mac};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::Sha256;
use std::fmt;
use std::marker::PhantomData;
use uuid::Uuid;

/// Number of HMAC bytes kept in a seal.
const SEAL_BYTES: usize = 16;

/// Declared kind of an opaque token.
pub trait TokenKind: Send + Sync + 'static {
    /// Tag string carried by every token of this kind.
    const TAG: &'static str;
}

/// Tokens that request more content (pagination, expanding collapsed parts).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoaderKind {}

impl TokenKind for LoaderKind {
    const TAG: &'static str = "loader";
}

/// Tokens that perform a mutation (vote, reply, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {}

impl TokenKind for ActionKind {
    const TAG: &'static str = "action";
}

/// Identity of one codec instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CodecMarker(Uuid);

impl fmt::Display for CodecMarker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // First 8 hex chars are enough to tell codecs apart in logs.
        let simple = self.0.simple().to_string();
        write!(f, "{}", &simple[..8])
    }
}

/// Error type for token encoding and decoding.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TokenError {
    /// Token was produced by a different codec instance.
    #[error("Opaque {tag} token brand mismatch: expected codec {expected}, observed {}", describe_marker(.observed))]
    BrandMismatch {
        /// Declared tag of the token.
        tag: &'static str,
        /// Marker of the decoding codec.
        expected: CodecMarker,
        /// Marker carried by the token (`None` once serialized).
        observed: Option<CodecMarker>,
    },

    /// Marker matched but the payload no longer matches its seal.
    #[error("Opaque {tag} token payload does not match its seal")]
    TamperedPayload {
        /// Declared tag of the token.
        tag: &'static str,
    },

    /// Payload could not be encoded.
    #[error("Failed to encode opaque token payload: {0}")]
    Encode(String),

    /// Payload could not be decoded into the codec's type.
    #[error("Failed to decode opaque token payload: {0}")]
    Decode(String),
}

fn describe_marker(marker: &Option<CodecMarker>) -> String {
    marker.map(|m| m.to_string()).unwrap_or_else(|| "detached".to_string())
}

/// Branded, adapter-private payload.
///
/// Only the [`OpaqueCodec`] that created a token can decode it. Tokens
/// serialize as `{tag, payload, seal}`; the in-memory marker is dropped.
pub struct Opaque<K: TokenKind> {
    marker: Option<CodecMarker>,
    payload: serde_json::Value,
    seal: String,
    _kind: PhantomData<fn() -> K>,
}

impl<K: TokenKind> Opaque<K> {
    /// Tag of this token.
    pub fn tag(&self) -> &'static str {
        K::TAG
    }

    /// Whether the token still carries its in-memory marker.
    pub fn is_attached(&self) -> bool {
        self.marker.is_some()
    }

    /// Hex seal of this token.
    pub fn seal(&self) -> &str {
        &self.seal
    }

    #[cfg(test)]
    pub(crate) fn payload_mut(&mut self) -> &mut serde_json::Value {
        &mut self.payload
    }
}

impl<K: TokenKind> Clone for Opaque<K> {
    fn clone(&self) -> Self {
        Self {
            marker: self.marker,
            payload: self.payload.clone(),
            seal: self.seal.clone(),
            _kind: PhantomData,
        }
    }
}

impl<K: TokenKind> PartialEq for Opaque<K> {
    fn eq(&self, other: &Self) -> bool {
        self.marker == other.marker && self.seal == other.seal && self.payload == other.payload
    }
}

impl<K: TokenKind> fmt::Debug for Opaque<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Opaque")
            .field("tag", &K::TAG)
            .field("marker", &self.marker)
            .field("seal", &self.seal)
            .finish_non_exhaustive()
    }
}

/// Serialized form of a token.
#[derive(Serialize, Deserialize)]
struct OpaqueWire {
    tag: String,
    payload: serde_json::Value,
    seal: String,
}

impl<K: TokenKind> Serialize for Opaque<K> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        OpaqueWire {
            tag: K::TAG.to_string(),
            payload: self.payload.clone(),
            seal: self.seal.clone(),
        }
        .serialize(serializer)
    }
}

impl<'de, K: TokenKind> Deserialize<'de> for Opaque<K> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let wire = OpaqueWire::deserialize(deserializer)?;
        if wire.tag != K::TAG {
            return Err(serde::de::Error::custom(format!(
                "expected opaque {} token, found {}",
                K::TAG,
                wire.tag
            )));
        }
        Ok(Self {
            marker: None,
            payload: wire.payload,
            seal: wire.seal,
            _kind: PhantomData,
        })
    }
}

/// Encoder/decoder pair for one adapter's private token payload.
///
/// Construct one instance per adapter and hand it to every code path that
/// mints or consumes that adapter's tokens. Two instances never accept each
/// other's tokens, even for the same `T` and `K`.
pub struct OpaqueCodec<T, K: TokenKind> {
    marker: CodecMarker,
    secret: [u8; 32],
    _types: PhantomData<fn(T) -> (T, K)>,
}

impl<T, K> OpaqueCodec<T, K>
where
    T: Serialize + DeserializeOwned,
    K: TokenKind,
{
    /// Create a codec with a fresh marker and seal secret.
    pub fn new() -> Self {
        let mut secret = [0u8; 32];
        secret[..16].copy_from_slice(Uuid::new_v4().as_bytes());
        secret[16..].copy_from_slice(Uuid::new_v4().as_bytes());

        Self {
            marker: CodecMarker(Uuid::new_v4()),
            secret,
            _types: PhantomData,
        }
    }

    /// Marker of this codec instance.
    pub fn marker(&self) -> CodecMarker {
        self.marker
    }

    /// Brand a payload.
    pub fn encode(&self, value: &T) -> Result<Opaque<K>, TokenError> {
        let payload = serde_json::to_value(value).map_err(|e| TokenError::Encode(e.to_string()))?;
        let seal = hex::encode(self.seal_bytes(&payload)?);

        Ok(Opaque {
            marker: Some(self.marker),
            payload,
            seal,
            _kind: PhantomData,
        })
    }

    /// Check whether a token carries this codec's brand.
    pub fn owns(&self, token: &Opaque<K>) -> bool {
        match token.marker {
            Some(marker) => marker == self.marker,
            None => self.seal_matches(token).unwrap_or(false),
        }
    }

    /// Unbrand a token produced by this codec.
    pub fn decode(&self, token: &Opaque<K>) -> Result<T, TokenError> {
        match token.marker {
            Some(marker) if marker != self.marker => {
                return Err(self.brand_mismatch(token.marker));
            }
            Some(_) => {
                if !self.seal_matches(token)? {
                    return Err(TokenError::TamperedPayload { tag: K::TAG });
                }
            }
            None => {
                if !self.seal_matches(token)? {
                    return Err(self.brand_mismatch(None));
                }
            }
        }

        serde_json::from_value(token.payload.clone()).map_err(|e| TokenError::Decode(e.to_string()))
    }

    fn brand_mismatch(&self, observed: Option<CodecMarker>) -> TokenError {
        tracing::error!(
            tag = K::TAG,
            expected = %self.marker,
            observed = %describe_marker(&observed),
            "OPAQUE_BRAND_MISMATCH: token handed to a codec that did not issue it"
        );
        TokenError::BrandMismatch {
            tag: K::TAG,
            expected: self.marker,
            observed,
        }
    }

    fn mac(&self, payload: &serde_json::Value) -> Result<Hmac<Sha256>, TokenError> {
        let bytes = serde_json::to_vec(payload).map_err(|e| TokenError::Encode(e.to_string()))?;
        let mut mac = Hmac::<Sha256>::new_from_slice(&self.secret)
            .expect("HMAC accepts any key size");
        mac.update(K::TAG.as_bytes());
        mac.update(b"|");
        mac.update(&bytes);
        Ok(mac)
    }

    fn seal_bytes(&self, payload: &serde_json::Value) -> Result<Vec<u8>, TokenError> {
        let result = self.mac(payload)?.finalize().into_bytes();
        Ok(result[..SEAL_BYTES].to_vec())
    }

    fn seal_matches(&self, token: &Opaque<K>) -> Result<bool, TokenError> {
        let Ok(observed) = hex::decode(&token.seal) else {
            return Ok(false);
        };
        if observed.len() != SEAL_BYTES {
            return Ok(false);
        }
        Ok(self.mac(&token.payload)?.verify_truncated_left(&observed).is_ok())
    }
}

impl<T, K> Default for OpaqueCodec<T, K>
where
    T: Serialize + DeserializeOwned,
    K: TokenKind,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T, K: TokenKind> fmt::Debug for OpaqueCodec<T, K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpaqueCodec")
            .field("tag", &K::TAG)
            .field("marker", &self.marker)
            .finish_non_exhaustive()
    }
}
