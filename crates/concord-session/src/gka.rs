//! Ring secret sharing.
//!
//! Every member derives one share with each ring neighbour from the
//! pairwise key and the session id, and publishes the XOR of the two. Any
//! member can then walk the ring from its own right share, peeling off
//! neighbours' contributions, and recover every share in ring order. The
//! group key is a derivation over all of them.
//!
//! Walking back to the starting share and landing on our own left share
//! proves the published contributions are mutually consistent.

use concord_crypto::blake3::{self, contexts};
use concord_crypto::{hashes_equal, xor_into};
use concord_types::{Hash, ParticipantId, SessionIdBytes};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::ring::RingPosition;
use crate::{Result, SessionError};

/// Our shares with the left and right ring neighbours.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct RingShares {
    pub left: Hash,
    pub right: Hash,
}

impl RingShares {
    /// Derive both shares from the neighbours' pairwise keys.
    pub fn derive(left_p2p: &Hash, right_p2p: &Hash, session_id: &SessionIdBytes) -> Self {
        Self {
            left: share_with(left_p2p, session_id),
            right: share_with(right_p2p, session_id),
        }
    }

    /// The value we publish.
    pub fn contribution(&self) -> Hash {
        let mut z = self.left;
        xor_into(&mut z, &self.right);
        z
    }
}

/// Share with one neighbour.
pub fn share_with(p2p_key: &Hash, session_id: &SessionIdBytes) -> Hash {
    blake3::derive_multi(contexts::SECRET_SHARE, &[p2p_key, session_id])
}

/// Recover the group key from every member's contribution, in ring order.
///
/// Fails with [`SessionError::KeyDerivation`] if the walk does not close.
pub fn reconstruct(
    position: RingPosition,
    contributions: &[Hash],
    shares: &RingShares,
    session_id: &SessionIdBytes,
) -> Result<Hash> {
    if contributions.len() != position.ring_len() as usize {
        return Err(SessionError::KeyDerivation(format!(
            "expected {} contributions, have {}",
            position.ring_len(),
            contributions.len()
        )));
    }

    let mut all_shares = vec![[0u8; 32]; contributions.len()];
    let mut running = shares.right;
    let mut current = position;
    for _ in 0..contributions.len() {
        all_shares[current.as_usize()] = running;
        current = current.right();
        xor_into(&mut running, &contributions[current.as_usize()]);
    }

    let closed = hashes_equal(&running, &shares.right);
    let left_matches = hashes_equal(&all_shares[position.left().as_usize()], &shares.left);
    if !(closed && left_matches) {
        all_shares.zeroize();
        running.zeroize();
        return Err(SessionError::KeyDerivation(
            "ring contributions are inconsistent".to_string(),
        ));
    }

    let mut fields: Vec<&[u8]> = all_shares.iter().map(|s| s.as_slice()).collect();
    fields.push(session_id);
    let key = blake3::derive_multi(contexts::GROUP_KEY, &fields);
    all_shares.zeroize();
    running.zeroize();
    Ok(key)
}

/// Token proving to `peer` that we hold our half of the pairwise key.
pub fn auth_token(p2p_key: &Hash, peer: &ParticipantId) -> Hash {
    blake3::derive_multi(contexts::AUTH_TOKEN, &[p2p_key, &peer.to_bytes()])
}

/// `H(key, nickname)`, broadcast once the key is derived.
pub fn confirmation(session_key: &Hash, nickname: &str) -> Hash {
    blake3::derive_multi(
        contexts::SESSION_CONFIRMATION,
        &[session_key, nickname.as_bytes()],
    )
}

/// Ledger anchor shared by every member of an established session.
pub fn key_consistency(session_key: &Hash, session_id: &SessionIdBytes) -> Hash {
    blake3::derive_multi(contexts::KEY_CONSISTENCY, &[session_key, session_id])
}
