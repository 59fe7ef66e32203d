//! RSA-PSS signatures over value prehashes
//!
//! A signature covers the ASCII hexdigest of the SHA-256 of the value
//! bytes, with MGF1-SHA256 padding at maximum salt length. Public keys
//! travel as base64 of their OpenSSH encoding; private keys load from
//! PEM (PKCS#8 or PKCS#1).

use base64::{engine::general_purpose, Engine as _};
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs8::DecodePrivateKey;
use rsa::traits::PublicKeyParts;
use rsa::{Pss, RsaPrivateKey, RsaPublicKey};
use sha2::{Digest, Sha256};

use crate::digest::sha256_hexdigest;
use crate::error::AuthError;

const SHA256_LEN: usize = 32;

/// Maximum PSS salt length for a key: emLen - hLen - 2.
fn max_salt_len(modulus_bytes: usize) -> usize {
    modulus_bytes - SHA256_LEN - 2
}

/// SHA-256 of the prehash message (the hexdigest string) for `value`.
fn prehash(value: &[u8]) -> Vec<u8> {
    let message = sha256_hexdigest(value);
    let mut hasher = Sha256::new();
    hasher.update(message.as_bytes());
    hasher.finalize().to_vec()
}

/// Decode a base64-wrapped OpenSSH public key into an RSA key.
fn decode_public_key(pub_key_b64: &str) -> Result<RsaPublicKey, AuthError> {
    let decoded = general_purpose::STANDARD
        .decode(pub_key_b64.trim())
        .map_err(|e| AuthError::KeyFormat(format!("public key is not base64: {e}")))?;
    let text = std::str::from_utf8(&decoded)
        .map_err(|e| AuthError::KeyFormat(format!("public key is not utf-8: {e}")))?;
    let key = ssh_key::PublicKey::from_openssh(text)
        .map_err(|e| AuthError::KeyFormat(format!("not an openssh public key: {e}")))?;
    match key.key_data() {
        ssh_key::public::KeyData::Rsa(rsa_data) => RsaPublicKey::try_from(rsa_data)
            .map_err(|e| AuthError::KeyFormat(format!("unusable rsa key: {e}"))),
        other => Err(AuthError::KeyFormat(format!(
            "unsupported key algorithm: {}",
            other.algorithm()
        ))),
    }
}

/// Sign `value` with a PEM private key, returning the raw signature bytes.
pub fn get_signature(value: &[u8], priv_key_pem: &str) -> Result<Vec<u8>, AuthError> {
    SigningKey::from_pem(priv_key_pem)?.sign(value)
}

/// Verify a base64 signature on `value` against a base64-wrapped OpenSSH
/// public key. `Ok(false)` means the key parsed but the signature does
/// not match.
pub fn check_signature(
    value: &[u8],
    sign_b64: &str,
    pub_key_b64: &str,
) -> Result<bool, AuthError> {
    let key = decode_public_key(pub_key_b64)?;
    let signature = general_purpose::STANDARD
        .decode(sign_b64.trim())
        .map_err(|e| AuthError::KeyFormat(format!("signature is not base64: {e}")))?;
    let hashed = prehash(value);
    let padding = Pss::new_with_salt::<Sha256>(max_salt_len(key.size()));
    let verified = key.verify(padding, &hashed, &signature).is_ok();
    if !verified {
        tracing::debug!("signature did not verify under the carried public key");
    }
    Ok(verified)
}

/// A loaded RSA private key used to produce value signatures.
pub struct SigningKey {
    key: RsaPrivateKey,
}

impl SigningKey {
    /// Load from a PEM string, accepting PKCS#8 and PKCS#1 encodings.
    pub fn from_pem(pem: &str) -> Result<Self, AuthError> {
        let key = RsaPrivateKey::from_pkcs8_pem(pem)
            .or_else(|_| RsaPrivateKey::from_pkcs1_pem(pem))
            .map_err(|e| AuthError::KeyFormat(format!("unreadable private key: {e}")))?;
        Ok(Self { key })
    }

    /// Load from a PEM file on disk.
    pub fn from_pem_file(path: impl AsRef<std::path::Path>) -> Result<Self, AuthError> {
        let pem = std::fs::read_to_string(path)
            .map_err(|e| AuthError::KeyFormat(format!("unreadable key file: {e}")))?;
        Self::from_pem(&pem)
    }

    pub fn from_key(key: RsaPrivateKey) -> Self {
        Self { key }
    }

    /// Sign `value`, returning raw signature bytes.
    pub fn sign(&self, value: &[u8]) -> Result<Vec<u8>, AuthError> {
        let hashed = prehash(value);
        let padding = Pss::new_with_salt::<Sha256>(max_salt_len(self.key.size()));
        self.key
            .sign_with_rng(&mut rand::thread_rng(), padding, &hashed)
            .map_err(|e| AuthError::InvalidSign(format!("signing failed: {e}")))
    }

    /// Sign `value`, returning the base64 form carried on the wire.
    pub fn sign_b64(&self, value: &[u8]) -> Result<String, AuthError> {
        Ok(general_purpose::STANDARD.encode(self.sign(value)?))
    }

    /// The matching public key as base64 of its OpenSSH encoding, the
    /// form carried in [`crate::AuthPublicKey`].
    pub fn public_key_b64(&self) -> Result<String, AuthError> {
        let public = RsaPublicKey::from(&self.key);
        let ssh_rsa = ssh_key::public::RsaPublicKey::try_from(&public)
            .map_err(|e| AuthError::KeyFormat(format!("unencodable public key: {e}")))?;
        let encoded = ssh_key::PublicKey::new(ssh_key::public::KeyData::Rsa(ssh_rsa), "")
            .to_openssh()
            .map_err(|e| AuthError::KeyFormat(format!("unencodable public key: {e}")))?;
        Ok(general_purpose::STANDARD.encode(encoded.as_bytes()))
    }
}
