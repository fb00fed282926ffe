//! Ed25519 authentication wrapper.
//!
//! A [`SignedBlock`] carries a block plus the author's signature over the
//! block's canonical form. The wrapper is not itself hashed: the block inside
//! keeps its own content address.

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};

use super::Block;
use super::canonical::CanonicalError;
use crate::error::ErrorCode;

/// Protocol version stamped on every signed wrapper.
pub const PROTOCOL_VERSION: &str = "0.4.0";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignError {
    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error(transparent)]
    Canonical(#[from] CanonicalError),
}

impl SignError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidKey(_) => ErrorCode::InvalidKey,
            Self::Canonical(e) => e.code(),
        }
    }
}

/// `{foodblock, author_hash, signature, protocol_version}` on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignedBlock {
    #[serde(rename = "foodblock")]
    pub block: Block,
    pub author_hash: String,
    /// Hex-encoded 64-byte Ed25519 signature.
    pub signature: String,
    pub protocol_version: String,
}

/// Generate a fresh signing key from the OS RNG.
#[must_use]
pub fn generate_keypair() -> SigningKey {
    SigningKey::generate(&mut OsRng)
}

/// Parse a hex-encoded 32-byte secret key.
///
/// # Errors
///
/// [`SignError::InvalidKey`] if the input is not 64 hex characters.
pub fn signing_key_from_hex(hex_key: &str) -> Result<SigningKey, SignError> {
    let bytes = decode_key_bytes(hex_key)?;
    Ok(SigningKey::from_bytes(&bytes))
}

/// Parse a hex-encoded 32-byte public key.
///
/// # Errors
///
/// [`SignError::InvalidKey`] if the input is not 64 hex characters or not a
/// valid curve point.
pub fn verifying_key_from_hex(hex_key: &str) -> Result<VerifyingKey, SignError> {
    let bytes = decode_key_bytes(hex_key)?;
    VerifyingKey::from_bytes(&bytes).map_err(|e| SignError::InvalidKey(e.to_string()))
}

fn decode_key_bytes(hex_key: &str) -> Result<[u8; 32], SignError> {
    let raw = hex::decode(hex_key).map_err(|e| SignError::InvalidKey(e.to_string()))?;
    <[u8; 32]>::try_from(raw.as_slice())
        .map_err(|_| SignError::InvalidKey(format!("expected 32 bytes, got {}", raw.len())))
}

/// Sign `block` as `author_hash`.
///
/// # Errors
///
/// Propagates [`CanonicalError`] if the block has no canonical form.
pub fn sign(block: &Block, author_hash: &str, key: &SigningKey) -> Result<SignedBlock, SignError> {
    let content = block.canonical()?;
    let signature = key.sign(content.as_bytes());

    Ok(SignedBlock {
        block: block.clone(),
        author_hash: author_hash.to_owned(),
        signature: hex::encode(signature.to_bytes()),
        protocol_version: PROTOCOL_VERSION.to_owned(),
    })
}

/// Check the wrapper's signature against `key`. Any malformed input is
/// simply `false`.
#[must_use]
pub fn verify(signed: &SignedBlock, key: &VerifyingKey) -> bool {
    let Ok(content) = signed.block.canonical() else {
        return false;
    };
    let Ok(raw) = hex::decode(&signed.signature) else {
        return false;
    };
    let Ok(signature) = Signature::from_slice(&raw) else {
        return false;
    };
    key.verify(content.as_bytes(), &signature).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::factory::create;
    use crate::value::{Map, Value};
    use serde_json::json;

    fn product() -> Block {
        let state = Value::from(json!({"name": "Sourdough", "price": 4.5}))
            .into_object()
            .expect("object");
        create("substance.product", state, Map::new()).expect("create")
    }

    #[test]
    fn sign_then_verify() {
        let key = generate_keypair();
        let signed = sign(&product(), "author", &key).expect("sign");
        assert_eq!(signed.protocol_version, PROTOCOL_VERSION);
        assert_eq!(signed.signature.len(), 128);
        assert!(verify(&signed, &key.verifying_key()));
    }

    #[test]
    fn wrong_key_fails() {
        let signed = sign(&product(), "author", &generate_keypair()).expect("sign");
        assert!(!verify(&signed, &generate_keypair().verifying_key()));
    }

    #[test]
    fn tampered_state_fails() {
        let key = generate_keypair();
        let signed = sign(&product(), "author", &key).expect("sign");

        let mut wire = serde_json::to_value(&signed).expect("serialize");
        wire["foodblock"]["state"]["price"] = json!(0.5);
        let tampered: SignedBlock = serde_json::from_value(wire).expect("deserialize");
        assert!(!verify(&tampered, &key.verifying_key()));
    }

    #[test]
    fn garbage_signature_is_false() {
        let key = generate_keypair();
        let mut signed = sign(&product(), "author", &key).expect("sign");
        signed.signature = "zz".into();
        assert!(!verify(&signed, &key.verifying_key()));
        signed.signature = "00".repeat(10);
        assert!(!verify(&signed, &key.verifying_key()));
    }

    #[test]
    fn wire_shape() {
        let signed = sign(&product(), "author", &generate_keypair()).expect("sign");
        let wire = serde_json::to_value(&signed).expect("serialize");
        assert!(wire.get("foodblock").is_some());
        assert_eq!(wire["author_hash"], "author");
        assert_eq!(wire["protocol_version"], "0.4.0");
    }

    #[test]
    fn hex_keys_round_trip() {
        let key = generate_keypair();
        let secret = hex::encode(key.to_bytes());
        let public = hex::encode(key.verifying_key().to_bytes());

        let restored = signing_key_from_hex(&secret).expect("secret");
        let verifying = verifying_key_from_hex(&public).expect("public");
        let signed = sign(&product(), "author", &restored).expect("sign");
        assert!(verify(&signed, &verifying));
    }

    #[test]
    fn bad_hex_key_is_invalid() {
        let err = verifying_key_from_hex("abcd").expect_err("short");
        assert_eq!(err.code(), ErrorCode::InvalidKey);
        assert!(signing_key_from_hex("not hex").is_err());
    }
}
