//! Deterministic MAC key fixtures for testing
//!
//! Production caches generate their key from the system CSPRNG. Tests that
//! compare keys across cache instances, or benchmarks that want stable
//! inputs, use these seeded fixtures instead.

use token_cache::{KeyDeriver, MacKeyMaterial, SecretBox, MAC_KEY_LEN};

/// Deterministic MAC key material for testing.
///
/// The same seed always produces the same bytes; different seeds produce
/// different bytes.
///
/// # Example
/// ```rust,ignore
/// let deriver = KeyDeriver::from_key_material(&test_mac_key(1))?;
/// ```
#[must_use]
pub fn test_mac_key(seed: u8) -> MacKeyMaterial {
    let mut bytes = vec![0u8; MAC_KEY_LEN];
    for (i, byte) in bytes.iter_mut().enumerate() {
        let i = i as u8;
        *byte = seed.wrapping_mul(31).wrapping_add(i.wrapping_mul(7)) ^ 0xA5;
    }
    SecretBox::new(Box::new(bytes))
}

/// Key deriver built from [`test_mac_key`].
#[must_use]
pub fn test_key_deriver(seed: u8) -> KeyDeriver {
    KeyDeriver::from_key_material(&test_mac_key(seed)).expect("fixture key has full length")
}
