//! Signed-value write gate
//!
//! Applied by `set_auth` before a value leaves this node and by the
//! STORE handler on receiving replicas when auth enforcement is on. A
//! payload that does not parse as the signed-value JSON shape is treated
//! as plain and only checked against the stored predecessor's policy.

use std::time::{SystemTime, UNIX_EPOCH};

use tracing::debug;

use lib_kad_crypto::{check_signature, digest, AuthError, Value};

use crate::id::NodeId;

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

fn parse_value(raw: &[u8]) -> Option<Value> {
    let text = std::str::from_utf8(raw).ok()?;
    Value::from_json(text).ok()
}

/// Validate a store of `new_raw` under `key` given the currently stored
/// bytes, if any. Passing means the write may proceed.
pub fn validate_store(
    key: &NodeId,
    new_raw: &[u8],
    existing_raw: Option<&[u8]>,
) -> Result<(), AuthError> {
    let new_value = parse_value(new_raw);
    let existing_auth = existing_raw
        .and_then(parse_value)
        .and_then(|value| value.authorization);

    match new_value.as_ref().and_then(|value| value.authorization.as_ref()) {
        Some(auth) => {
            if let Some(exp_time) = auth.pub_key.exp_time {
                if exp_time < now_secs() {
                    return Err(AuthError::InvalidSign(format!(
                        "public key expired at {exp_time}"
                    )));
                }
            }
            let data = new_value
                .as_ref()
                .map(|value| value.data.canonical_bytes())
                .unwrap_or_default();
            if !check_signature(&data, &auth.sign, &auth.pub_key.key)? {
                return Err(AuthError::InvalidSign(
                    "signature does not match value".into(),
                ));
            }
            // The signer's key must hash to the DHT key, binding the
            // key-space location to the key pair.
            if digest(&auth.pub_key.key) != *key.as_bytes() {
                return Err(AuthError::Unauthorized(
                    "public key is not bound to this key-space location".into(),
                ));
            }
            if let Some(existing) = existing_auth {
                if existing.pub_key.key != auth.pub_key.key {
                    return Err(AuthError::Unauthorized(
                        "stored value is owned by a different public key".into(),
                    ));
                }
            }
            debug!(key = %key, "authorized store accepted");
            Ok(())
        }
        None => {
            if existing_auth.is_some() {
                return Err(AuthError::Unauthorized(
                    "cannot strip authorization from a stored value".into(),
                ));
            }
            Ok(())
        }
    }
}
