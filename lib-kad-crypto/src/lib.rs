//! Kad DHT Cryptography Foundation
//!
//! Digest primitives for the 160-bit key space and the signed-value
//! authorization scheme (RSA-PSS over a SHA-256 hexdigest prehash, with
//! base64-wrapped OpenSSH public keys).

pub mod digest;
pub mod error;
pub mod sign;
pub mod value;

// Re-export commonly used types and functions
pub use digest::{digest, sha256_hexdigest};
pub use error::AuthError;
pub use sign::{check_signature, get_signature, SigningKey};
pub use value::{AuthPublicKey, Authorization, Value, ValueData};
