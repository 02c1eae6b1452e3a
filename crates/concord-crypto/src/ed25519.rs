//! Message signatures.
//!
//! A party signs every message it sends with the signing key it announced
//! in its view entry for the room. Peers verify against that announced key
//! only, never against the long-term identity.

use ed25519_dalek::Signer;
use serde::{Deserialize, Serialize};

use crate::{CryptoError, Result};

pub const SIGNATURE_LENGTH: usize = ed25519_dalek::SIGNATURE_LENGTH;

/// Per-room signing key. `ed25519-dalek` wipes the secret on drop.
#[derive(Clone)]
pub struct SigningKey(ed25519_dalek::SigningKey);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyingKey(ed25519_dalek::VerifyingKey);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Signature(ed25519_dalek::Signature);

impl SigningKey {
    pub fn generate() -> Self {
        Self(ed25519_dalek::SigningKey::generate(&mut rand::rngs::OsRng))
    }

    pub fn from_bytes(secret: &[u8; 32]) -> Self {
        Self(ed25519_dalek::SigningKey::from_bytes(secret))
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        VerifyingKey(self.0.verifying_key())
    }

    pub fn sign(&self, message: &[u8]) -> Signature {
        Signature(self.0.sign(message))
    }
}

impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("SigningKey")
            .field(&hex::encode(self.0.verifying_key().as_bytes()))
            .finish()
    }
}

impl VerifyingKey {
    /// Decode a key from a view entry. Fails on a non-canonical point.
    pub fn from_bytes(bytes: &[u8; 32]) -> Result<Self> {
        ed25519_dalek::VerifyingKey::from_bytes(bytes)
            .map(Self)
            .map_err(|e| CryptoError::InvalidInput(format!("verifying key: {e}")))
    }

    pub fn to_bytes(&self) -> [u8; 32] {
        self.0.to_bytes()
    }

    /// Strict verification: rejects malleable and small-order signatures.
    pub fn verify(&self, message: &[u8], signature: &Signature) -> Result<()> {
        self.0
            .verify_strict(message, &signature.0)
            .map_err(|_| CryptoError::SignatureVerification)
    }
}

impl Signature {
    pub fn from_bytes(bytes: &[u8; SIGNATURE_LENGTH]) -> Self {
        Self(ed25519_dalek::Signature::from_bytes(bytes))
    }

    pub fn to_bytes(&self) -> [u8; SIGNATURE_LENGTH] {
        self.0.to_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_verifies_under_announced_key() {
        let key = SigningKey::from_bytes(&[3u8; 32]);
        let announced = VerifyingKey::from_bytes(&key.verifying_key().to_bytes())
            .expect("announced key decodes");
        let sig = key.sign(b"participant info");
        assert!(announced.verify(b"participant info", &sig).is_ok());
    }

    #[test]
    fn test_altered_payload_rejected() {
        let key = SigningKey::generate();
        let sig = key.sign(b"hello room");
        assert!(matches!(
            key.verifying_key().verify(b"hello roon", &sig),
            Err(CryptoError::SignatureVerification)
        ));
    }

    #[test]
    fn test_other_party_key_rejected() {
        let alice = SigningKey::from_bytes(&[1u8; 32]);
        let mallory = SigningKey::from_bytes(&[2u8; 32]);
        let sig = mallory.sign(b"leave");
        assert!(alice.verifying_key().verify(b"leave", &sig).is_err());
    }

    #[test]
    fn test_signature_bytes_survive_the_wire() {
        let key = SigningKey::generate();
        let sig = key.sign(b"ack");
        let wire = sig.to_bytes();
        assert!(key
            .verifying_key()
            .verify(b"ack", &Signature::from_bytes(&wire))
            .is_ok());
    }
}
