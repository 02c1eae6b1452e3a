//! # concord-crypto
//!
//! Cryptographic primitives consumed by the Concord session layer.
//!
//! The suite is fixed: there is no negotiation. The session crate treats
//! everything here as opaque building blocks.
//!
//! ## Modules
//!
//! - [`blake3`] — Per-role derivation contexts and digests
//! - [`ed25519`] — Signatures over every relayed message
//! - [`x25519`] — Long-term and per-room agreement keys

pub mod blake3;
pub mod ed25519;
pub mod x25519;

/// Error types for cryptographic operations.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    /// Ed25519 signature verification failed.
    #[error("signature verification failed")]
    SignatureVerification,

    /// Invalid input data.
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

pub type Result<T> = std::result::Result<T, CryptoError>;

/// Compare two 32-byte values without early exit.
pub fn hashes_equal(a: &[u8; 32], b: &[u8; 32]) -> bool {
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// XOR `other` into `acc` in place.
pub fn xor_into(acc: &mut [u8; 32], other: &[u8; 32]) {
    for (a, b) in acc.iter_mut().zip(other.iter()) {
        *a ^= b;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hashes_equal() {
        assert!(hashes_equal(&[7u8; 32], &[7u8; 32]));
        let mut other = [7u8; 32];
        other[31] = 8;
        assert!(!hashes_equal(&[7u8; 32], &other));
    }

    #[test]
    fn test_xor_into_is_involution() {
        let mut acc = [0x5Au8; 32];
        xor_into(&mut acc, &[0xFF; 32]);
        assert_eq!(acc, [0xA5; 32]);
        xor_into(&mut acc, &[0xFF; 32]);
        assert_eq!(acc, [0x5A; 32]);
    }
}
