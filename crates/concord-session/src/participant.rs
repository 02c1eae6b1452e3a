//! Participant records.
//!
//! A [`LocalParty`] holds the local user's secrets for one room and is
//! shared by every session of that room. A [`Participant`] is one member of
//! a session as seen from the local party: its announced keys, the pairwise
//! key we share with it, and the handshake flags that gate key agreement.

use std::collections::BTreeMap;
use std::fmt;

use concord_crypto::blake3::{self, contexts};
use concord_crypto::ed25519::{Signature, SigningKey, VerifyingKey};
use concord_crypto::x25519::{X25519PublicKey, X25519StaticSecret};
use concord_types::{Hash, MessageId, ParticipantId, RingIndex, UnauthenticatedParticipant};
use zeroize::Zeroizing;

use crate::Result;

/// Session members keyed by nickname. Iteration order is ring order.
pub type ParticipantMap = BTreeMap<String, Participant>;

/// The local user's key material for one room.
pub struct LocalParty {
    nickname: String,
    long_term: X25519StaticSecret,
    ephemeral: X25519StaticSecret,
    signing: SigningKey,
}

impl LocalParty {
    /// Fresh long-term and ephemeral keys.
    pub fn generate(nickname: impl Into<String>) -> Self {
        Self {
            nickname: nickname.into(),
            long_term: X25519StaticSecret::random(),
            ephemeral: X25519StaticSecret::random(),
            signing: SigningKey::generate(),
        }
    }

    /// Rebuild a party from stored secrets.
    pub fn from_secrets(
        nickname: impl Into<String>,
        long_term: [u8; 32],
        ephemeral: [u8; 32],
        signing: [u8; 32],
    ) -> Self {
        Self {
            nickname: nickname.into(),
            long_term: X25519StaticSecret::from_bytes(long_term),
            ephemeral: X25519StaticSecret::from_bytes(ephemeral),
            signing: SigningKey::from_bytes(&signing),
        }
    }

    pub fn nickname(&self) -> &str {
        &self.nickname
    }

    pub fn id(&self) -> ParticipantId {
        ParticipantId {
            nickname: self.nickname.clone(),
            long_term_key: self.long_term.public_key().to_bytes(),
        }
    }

    /// Our entry in a session view.
    pub fn view_entry(&self) -> UnauthenticatedParticipant {
        UnauthenticatedParticipant {
            id: self.id(),
            ephemeral_key: self.ephemeral.public_key().to_bytes(),
            signing_key: self.signing.verifying_key().to_bytes(),
        }
    }

    pub(crate) fn sign(&self, bytes: &[u8]) -> Signature {
        self.signing.sign(bytes)
    }

    /// Triple Diffie-Hellman against `peer`, ordered so both ends agree.
    pub(crate) fn pairwise_key(&self, peer: &UnauthenticatedParticipant) -> Hash {
        let their_long_term = X25519PublicKey::from_bytes(peer.id.long_term_key);
        let their_ephemeral = X25519PublicKey::from_bytes(peer.ephemeral_key);

        let ours_to_theirs = self.long_term.diffie_hellman(&their_ephemeral);
        let theirs_to_ours = self.ephemeral.diffie_hellman(&their_long_term);
        let ephemeral = self.ephemeral.diffie_hellman(&their_ephemeral);

        let (first, second) = if self.nickname.as_str() < peer.nickname() {
            (ours_to_theirs.as_bytes(), theirs_to_ours.as_bytes())
        } else {
            (theirs_to_ours.as_bytes(), ours_to_theirs.as_bytes())
        };
        blake3::derive_multi(
            contexts::P2P_KEY,
            &[first.as_slice(), second.as_slice(), ephemeral.as_bytes().as_slice()],
        )
    }
}

impl fmt::Debug for LocalParty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalParty")
            .field("nickname", &self.nickname)
            .finish_non_exhaustive()
    }
}

/// One member of a session.
#[derive(Clone)]
pub struct Participant {
    view: UnauthenticatedParticipant,
    verifying_key: VerifyingKey,
    p2p_key: Zeroizing<Hash>,
    pub(crate) key_share: Option<Hash>,
    pub(crate) authenticated: bool,
    /// We have sent this participant our authentication token.
    pub(crate) authenticated_by_me: bool,
    pub(crate) confirmed: bool,
    pub(crate) index: Option<RingIndex>,
    pub(crate) last_acked: MessageId,
}

impl Participant {
    /// Build a record for `view` and derive the pairwise key with `local`.
    ///
    /// Fails if the announced signing key is not a valid Ed25519 point.
    pub fn new(view: UnauthenticatedParticipant, local: &LocalParty) -> Result<Self> {
        let verifying_key = VerifyingKey::from_bytes(&view.signing_key)?;
        let p2p_key = Zeroizing::new(local.pairwise_key(&view));
        let is_local = view.id == local.id();
        Ok(Self {
            view,
            verifying_key,
            p2p_key,
            key_share: None,
            authenticated: is_local,
            authenticated_by_me: is_local,
            confirmed: false,
            index: None,
            last_acked: 0,
        })
    }

    pub fn nickname(&self) -> &str {
        self.view.nickname()
    }

    pub fn id(&self) -> &ParticipantId {
        &self.view.id
    }

    pub fn view_entry(&self) -> &UnauthenticatedParticipant {
        &self.view
    }

    pub fn verifying_key(&self) -> &VerifyingKey {
        &self.verifying_key
    }

    pub(crate) fn p2p_key(&self) -> &Hash {
        &self.p2p_key
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    pub fn has_contributed(&self) -> bool {
        self.key_share.is_some()
    }

    pub fn is_confirmed(&self) -> bool {
        self.confirmed
    }

    pub fn ring_index(&self) -> Option<RingIndex> {
        self.index
    }

    /// Copy for a bred session: authentication survives, everything bound
    /// to the old session is cleared.
    pub(crate) fn carried_over(&self) -> Self {
        let mut copy = self.clone();
        copy.key_share = None;
        copy.confirmed = false;
        copy.index = None;
        copy.last_acked = 0;
        copy
    }
}

impl fmt::Debug for Participant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Participant")
            .field("nickname", &self.nickname())
            .field("authenticated", &self.authenticated)
            .field("authenticated_by_me", &self.authenticated_by_me)
            .field("contributed", &self.key_share.is_some())
            .field("confirmed", &self.confirmed)
            .field("index", &self.index)
            .finish()
    }
}
