//! Store key generation.

use sha2::{Digest, Sha256};

/// Compute the key an entry is stored under within a named store.
///
/// Keys are exact: method and URL must match byte for byte.
pub fn compute_cache_key(method: &str, url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(method.to_ascii_uppercase().as_bytes());
    hasher.update(b"\n");
    hasher.update(url.as_bytes());
    hex::encode(hasher.finalize())
}
