//! X25519 agreement for pairwise keys.
//!
//! Every party holds two secrets: a long-term identity key and a per-room
//! ephemeral key. Both are reused across all peers of the room, so both are
//! `StaticSecret`s rather than single-use ephemerals.

use serde::{Deserialize, Serialize};
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::{Zeroize, ZeroizeOnDrop};

#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct X25519StaticSecret(StaticSecret);

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct X25519PublicKey([u8; 32]);

/// Raw agreement output. Only ever fed into a derivation.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SharedSecret([u8; 32]);

impl X25519StaticSecret {
    pub fn random() -> Self {
        Self(StaticSecret::random_from_rng(rand::rngs::OsRng))
    }

    pub fn from_bytes(secret: [u8; 32]) -> Self {
        Self(StaticSecret::from(secret))
    }

    pub fn public_key(&self) -> X25519PublicKey {
        X25519PublicKey(PublicKey::from(&self.0).to_bytes())
    }

    pub fn diffie_hellman(&self, peer: &X25519PublicKey) -> SharedSecret {
        SharedSecret(*self.0.diffie_hellman(&PublicKey::from(peer.0)).as_bytes())
    }
}

impl std::fmt::Debug for X25519StaticSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("X25519StaticSecret")
            .field(&hex::encode(self.public_key().0))
            .finish()
    }
}

impl X25519PublicKey {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn to_bytes(&self) -> [u8; 32] {
        self.0
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl SharedSecret {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}
