//! Session identifiers.
//!
//! The identifier is a BLAKE3 derivation over every member's nickname,
//! long-term key and ephemeral keys, taken in nickname order so that every
//! party computes the same value however it learned the view.

use std::cell::OnceCell;

use concord_crypto::blake3::{self, contexts};
use concord_types::{SessionIdBytes, UnauthenticatedParticipant};

use crate::participant::ParticipantMap;
use crate::{Result, SessionError};

/// Set-once holder of a session's identifier.
#[derive(Clone, Debug, Default)]
pub struct SessionId {
    cell: OnceCell<SessionIdBytes>,
}

impl SessionId {
    pub fn new() -> Self {
        Self::default()
    }

    /// Identifier of the view formed by `participants`.
    pub fn compute(participants: &ParticipantMap) -> SessionIdBytes {
        Self::compute_from_view(participants.values().map(|p| p.view_entry()))
    }

    /// Identifier of an arbitrary view, in any order.
    pub fn compute_from_view<'a>(
        view: impl IntoIterator<Item = &'a UnauthenticatedParticipant>,
    ) -> SessionIdBytes {
        let mut entries: Vec<&UnauthenticatedParticipant> = view.into_iter().collect();
        entries.sort_by(|a, b| a.nickname().cmp(b.nickname()));

        let mut encoded: Vec<Vec<u8>> = Vec::with_capacity(entries.len() * 3);
        for entry in entries {
            encoded.push(entry.id.to_bytes());
            encoded.push(entry.ephemeral_key.to_vec());
            encoded.push(entry.signing_key.to_vec());
        }
        let fields: Vec<&[u8]> = encoded.iter().map(Vec::as_slice).collect();
        blake3::derive_multi(contexts::SESSION_ID, &fields)
    }

    /// Install the identifier. Fails if one is already set.
    pub fn set(&self, id: SessionIdBytes) -> Result<()> {
        self.cell.set(id).map_err(|_| SessionError::SessionIdAlreadySet)
    }

    pub fn get(&self) -> Option<&SessionIdBytes> {
        self.cell.get()
    }

    /// The identifier, or [`SessionError::NoSessionId`].
    pub fn require(&self) -> Result<&SessionIdBytes> {
        self.cell.get().ok_or(SessionError::NoSessionId)
    }

    pub fn is_set(&self) -> bool {
        self.cell.get().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use concord_types::ParticipantId;

    fn entry(nickname: &str, seed: u8) -> UnauthenticatedParticipant {
        UnauthenticatedParticipant {
            id: ParticipantId {
                nickname: nickname.to_string(),
                long_term_key: [seed; 32],
            },
            ephemeral_key: [seed.wrapping_add(1); 32],
            signing_key: [seed.wrapping_add(2); 32],
        }
    }

    #[test]
    fn test_compute_is_order_independent() {
        let a = entry("alice", 1);
        let b = entry("bob", 2);
        let c = entry("carol", 3);
        let forward = SessionId::compute_from_view([&a, &b, &c]);
        let shuffled = SessionId::compute_from_view([&c, &a, &b]);
        assert_eq!(forward, shuffled);
    }

    #[test]
    fn test_compute_binds_ephemeral_keys() {
        let a = entry("alice", 1);
        let b = entry("bob", 2);
        let mut b_rekeyed = b.clone();
        b_rekeyed.ephemeral_key = [0xFF; 32];
        assert_ne!(
            SessionId::compute_from_view([&a, &b]),
            SessionId::compute_from_view([&a, &b_rekeyed])
        );
    }

    #[test]
    fn test_set_once() {
        let id = SessionId::new();
        assert!(matches!(id.require(), Err(SessionError::NoSessionId)));
        id.set([1; 32]).expect("first set");
        assert!(matches!(
            id.set([2; 32]),
            Err(SessionError::SessionIdAlreadySet)
        ));
        assert_eq!(id.get(), Some(&[1; 32]));
    }
}
