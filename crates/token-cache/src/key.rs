//! Cache-key derivation.
//!
//! A [`CacheKey`] is the HMAC-SHA256 of the request's token and audiences
//! under a per-deriver random key. The token itself is never stored by the
//! cache; once [`KeyDeriver::derive`] returns, the caller can drop it.
//!
//! # Encoding
//!
//! Every variable-length field is preceded by its length as an 8-byte
//! big-endian integer:
//!
//! ```text
//! len(token) || token || count(audiences) || len(aud_0) || aud_0 || ...
//! ```
//!
//! so `("xy" + "z")` and `("x" + "yz")` can never produce the same MAC input,
//! and neither can moving bytes between the token and the first audience.
//!
//! # Security
//!
//! - The MAC key is generated from the system CSPRNG and lives only inside the
//!   deriver. Leaked cache keys cannot be used to recover or forge tokens.
//! - An attacker who does not know the MAC key cannot precompute colliding
//!   inputs to poison another user's cache entry.
//! - `CacheKey` debug output is limited to an 8-hex-character correlation
//!   prefix.

use crate::error::CacheError;
use crate::secret::{generate_mac_key_material, ExposeSecret, MacKeyMaterial, MAC_KEY_LEN};
use ring::hmac;
use std::fmt;

/// Length of a derived cache key in bytes (HMAC-SHA256 output).
pub const CACHE_KEY_LEN: usize = 32;

/// Number of key bytes rendered by [`CacheKey::correlation_id`].
const CORRELATION_PREFIX_LEN: usize = 4;

/// Opaque, fixed-size cache key.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey([u8; CACHE_KEY_LEN]);

impl CacheKey {
    /// Raw digest bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; CACHE_KEY_LEN] {
        &self.0
    }

    /// Short hex prefix of the key, safe to put in logs for correlating
    /// lookups of the same credential.
    #[must_use]
    pub fn correlation_id(&self) -> String {
        hex::encode(self.0.get(..CORRELATION_PREFIX_LEN).unwrap_or_default())
    }
}

impl fmt::Debug for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CacheKey")
            .field(&self.correlation_id())
            .finish()
    }
}

/// Derives cache keys from `(audiences, token)` pairs.
///
/// The MAC key is fixed for the lifetime of the deriver and is never
/// exposed. Derivers are `Send + Sync` and are shared without locking.
pub struct KeyDeriver {
    key: hmac::Key,
}

impl fmt::Debug for KeyDeriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyDeriver")
            .field("key", &"[REDACTED]")
            .finish()
    }
}

impl KeyDeriver {
    /// Create a deriver with a freshly generated random MAC key.
    ///
    /// # Errors
    ///
    /// Returns `CacheError::KeyGeneration` if the system CSPRNG fails.
    pub fn generate() -> Result<Self, CacheError> {
        let material = generate_mac_key_material()?;
        Self::from_key_material(&material)
    }

    /// Create a deriver from caller-supplied key material.
    ///
    /// Intended for tests that need reproducible keys. Production code should
    /// use [`KeyDeriver::generate`].
    ///
    /// # Errors
    ///
    /// Returns `CacheError::KeyMaterialTooShort` if fewer than
    /// [`MAC_KEY_LEN`] bytes are supplied.
    pub fn from_key_material(material: &MacKeyMaterial) -> Result<Self, CacheError> {
        let bytes = material.expose_secret();
        if bytes.len() < MAC_KEY_LEN {
            return Err(CacheError::KeyMaterialTooShort { len: bytes.len() });
        }
        Ok(Self {
            key: hmac::Key::new(hmac::HMAC_SHA256, bytes),
        })
    }

    /// Derive the cache key for a request.
    ///
    /// Deterministic for a given deriver. Empty tokens and empty audience
    /// lists are valid inputs.
    #[must_use]
    pub fn derive<S: AsRef<str>>(&self, audiences: &[S], token: &str) -> CacheKey {
        let mut ctx = hmac::Context::with_key(&self.key);

        write_length_prefixed(&mut ctx, token.as_bytes());
        write_length(&mut ctx, audiences.len());
        for audience in audiences {
            write_length_prefixed(&mut ctx, audience.as_ref().as_bytes());
        }

        let tag = ctx.sign();
        let mut digest = [0u8; CACHE_KEY_LEN];
        // HMAC_SHA256 tags are always CACHE_KEY_LEN bytes
        digest.copy_from_slice(tag.as_ref());
        CacheKey(digest)
    }
}

fn write_length(ctx: &mut hmac::Context, len: usize) {
    ctx.update(&(len as u64).to_be_bytes());
}

fn write_length_prefixed(ctx: &mut hmac::Context, bytes: &[u8]) {
    write_length(ctx, bytes.len());
    ctx.update(bytes);
}
