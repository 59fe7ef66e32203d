//! Signed-value data transfer objects
//!
//! The facade-level JSON shape of a stored value:
//!
//! ```json
//! {"data": <scalar>,
//!  "authorization": {
//!      "sign": "<base64>",
//!      "pub_key": {"key": "<ssh-base64>", "exp_time": <int|null>}
//!  }}
//! ```

use serde::{Deserialize, Serialize};

use crate::error::AuthError;

/// The scalar payload of a DHT value.
///
/// Only these five types may be placed in the DHT; the untagged
/// representation keeps the facade JSON a plain scalar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ValueData {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
}

impl ValueData {
    /// Canonical byte form, the input to signing and verification.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        match self {
            ValueData::Bool(b) => b.to_string().into_bytes(),
            ValueData::Int(i) => i.to_string().into_bytes(),
            ValueData::Float(f) => f.to_string().into_bytes(),
            ValueData::Str(s) => s.as_bytes().to_vec(),
            ValueData::Bytes(b) => b.clone(),
        }
    }
}

impl From<&str> for ValueData {
    fn from(s: &str) -> Self {
        ValueData::Str(s.to_string())
    }
}

/// A public key as carried on the wire: base64 of an OpenSSH-encoded RSA
/// key, with an optional expiry (seconds since the epoch).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthPublicKey {
    pub key: String,
    pub exp_time: Option<u64>,
}

impl AuthPublicKey {
    pub fn new(key: impl Into<String>, exp_time: Option<u64>) -> Self {
        Self { key: key.into(), exp_time }
    }
}

/// A signature binding a value to a public key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Authorization {
    pub sign: String,
    pub pub_key: AuthPublicKey,
}

impl Authorization {
    pub fn new(sign: impl Into<String>, pub_key: AuthPublicKey) -> Self {
        Self { sign: sign.into(), pub_key }
    }
}

/// A DHT value, optionally authorized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Value {
    pub data: ValueData,
    pub authorization: Option<Authorization>,
}

impl Value {
    /// Plain value without authorization.
    pub fn of_data(data: impl Into<ValueData>) -> Self {
        Self { data: data.into(), authorization: None }
    }

    /// Value bound to a signature.
    pub fn of_auth(data: impl Into<ValueData>, auth: Authorization) -> Self {
        Self { data: data.into(), authorization: Some(auth) }
    }

    /// Parse the facade JSON shape. Both fields must be present
    /// (`authorization` may be null).
    pub fn from_json(raw: &str) -> Result<Self, AuthError> {
        let parsed: serde_json::Value = serde_json::from_str(raw)?;
        let object = parsed
            .as_object()
            .filter(|o| o.contains_key("data") && o.contains_key("authorization"))
            .ok_or_else(|| {
                AuthError::InvalidJson(serde::de::Error::custom(
                    "expected object with data and authorization",
                ))
            })?;
        Ok(serde_json::from_value(serde_json::Value::Object(object.clone()))?)
    }

    pub fn to_json(&self) -> Result<String, AuthError> {
        Ok(serde_json::to_string(self)?)
    }
}
