//! Authorization error taxonomy
//!
//! These are the failures the write gate surfaces to the admin facade;
//! everything else in this crate is an internal detail of producing them.

/// Errors raised while validating or constructing signed values.
#[derive(thiserror::Error, Debug)]
pub enum AuthError {
    /// The carried signature does not verify, or the key has expired.
    #[error("signature is not valid: {0}")]
    InvalidSign(String),

    /// The operation is outside the scope the existing authorization
    /// grants, e.g. overwriting an authorized value with a different key.
    #[error("unauthorized operation: {0}")]
    Unauthorized(String),

    /// The payload is not the signed-value JSON shape.
    #[error("can not parse json: {0}")]
    InvalidJson(#[from] serde_json::Error),

    /// The public key is not a base64-wrapped OpenSSH RSA key, or the
    /// private key is not a readable PEM.
    #[error("unsupported key material: {0}")]
    KeyFormat(String),
}
