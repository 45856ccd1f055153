//! Cache key derivation for provider requests
//!
//! A key is the hex SHA-256 digest of the ordered tuple
//! `(provider, model, system_prompt, prompt)` joined with [`FIELD_SEPARATOR`].
//! There is no salt, so keys are stable across runs and processes.

use sha2::{Digest, Sha256};

/// Separator placed between tuple fields before hashing.
///
/// NUL and record-separator bytes do not occur in natural-language prompts,
/// so a field boundary cannot be forged by prompt text.
pub const FIELD_SEPARATOR: &str = "\u{0}\u{1e}\u{0}";

/// Length of a derived key in hex characters.
pub const KEY_LEN: usize = 64;

/// Derive the cache key for one logical completion request.
///
/// Identical inputs always yield identical keys; changing any field,
/// including the provider name, yields a different key.
#[must_use]
pub fn derive_cache_key(prompt: &str, system_prompt: &str, model: &str, provider: &str) -> String {
    let mut hasher = Sha256::new();
    for (i, field) in [provider, model, system_prompt, prompt].iter().enumerate() {
        if i > 0 {
            hasher.update(FIELD_SEPARATOR.as_bytes());
        }
        hasher.update(field.as_bytes());
    }
    hex::encode(hasher.finalize().as_slice())
}
