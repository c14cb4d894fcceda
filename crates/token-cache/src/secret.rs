//! Secret types for MAC key material and bearer tokens.
//!
//! This module re-exports types from the [`secrecy`] crate and adds the
//! cache's key-material helpers. The HMAC key used for cache-key derivation
//! only ever exists in two places: inside a [`MacKeyMaterial`] while it is
//! being handed to the deriver, and inside the deriver's `ring` key. Neither
//! prints its contents through `Debug`, and the `SecretBox` copy is zeroized
//! on drop.
//!
//! Callers that keep bearer tokens around (for example in request structs)
//! should hold them as [`SecretString`] and expose them only at the call to
//! the cache:
//!
//! ```rust,ignore
//! use token_cache::secret::{ExposeSecret, SecretString};
//!
//! let bearer = SecretString::from(header_value);
//! let outcome = cache.authenticate(&audiences, bearer.expose_secret()).await;
//! ```

use crate::error::CacheError;
use ring::rand::{SecureRandom, SystemRandom};

pub use secrecy::{ExposeSecret, SecretBox, SecretString};

/// Length of generated MAC key material in bytes (HMAC-SHA256 output length).
pub const MAC_KEY_LEN: usize = 32;

/// Raw HMAC key bytes, redacted in `Debug` and zeroized on drop.
pub type MacKeyMaterial = SecretBox<Vec<u8>>;

/// Generate fresh MAC key material from the system CSPRNG.
///
/// # Errors
///
/// Returns `CacheError::KeyGeneration` if the system random source fails.
pub fn generate_mac_key_material() -> Result<MacKeyMaterial, CacheError> {
    let rng = SystemRandom::new();
    let mut bytes = vec![0u8; MAC_KEY_LEN];
    rng.fill(&mut bytes).map_err(|_| {
        tracing::error!(target: "token_cache.key", "System CSPRNG failed to fill MAC key");
        CacheError::KeyGeneration
    })?;
    Ok(SecretBox::new(Box::new(bytes)))
}
