//! Key digests
//!
//! The DHT addresses both nodes and keys by the SHA-1 of their canonical
//! byte form. Signed values are prehashed with SHA-256 and signed over the
//! ASCII hexdigest.

use sha1::{Digest, Sha1};
use sha2::Sha256;

/// SHA-1 digest of the input's byte form.
///
/// Callers hashing non-byte inputs (integers, etc.) pass the canonical
/// string form; string keys hash as UTF-8.
pub fn digest(input: impl AsRef<[u8]>) -> [u8; 20] {
    let mut hasher = Sha1::new();
    hasher.update(input.as_ref());
    hasher.finalize().into()
}

/// Lowercase ASCII hexdigest of the SHA-256 of `value`.
///
/// This is the message actually signed and verified by the authorization
/// scheme, not the raw value bytes.
pub fn sha256_hexdigest(value: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(value);
    hex::encode(hasher.finalize())
}
