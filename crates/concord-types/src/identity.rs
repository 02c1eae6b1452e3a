//! Participant identity structures.

use serde::{Deserialize, Serialize};
use serde_with::serde_as;

/// Long-term identity of a room participant.
#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ParticipantId {
    pub nickname: String,
    /// X25519 long-term public key.
    #[serde_as(as = "serde_with::hex::Hex")]
    pub long_term_key: [u8; 32],
}

impl ParticipantId {
    /// Byte string binding nickname and long-term key, used wherever the
    /// identity is hashed.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(4 + self.nickname.len() + 32);
        out.extend_from_slice(&(self.nickname.len() as u32).to_le_bytes());
        out.extend_from_slice(self.nickname.as_bytes());
        out.extend_from_slice(&self.long_term_key);
        out
    }
}

/// A participant as announced in a session view, before anyone has
/// verified their authentication token.
#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnauthenticatedParticipant {
    pub id: ParticipantId,
    /// X25519 ephemeral agreement key for this room.
    #[serde_as(as = "serde_with::hex::Hex")]
    pub ephemeral_key: [u8; 32],
    /// Ed25519 ephemeral signing key for this room.
    #[serde_as(as = "serde_with::hex::Hex")]
    pub signing_key: [u8; 32],
}

impl UnauthenticatedParticipant {
    pub fn nickname(&self) -> &str {
        &self.id.nickname
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_bytes_bind_nickname_and_key() {
        let a = ParticipantId {
            nickname: "alice".to_string(),
            long_term_key: [1; 32],
        };
        let b = ParticipantId {
            nickname: "alice".to_string(),
            long_term_key: [2; 32],
        };
        let c = ParticipantId {
            nickname: "alicf".to_string(),
            long_term_key: [1; 32],
        };
        assert_ne!(a.to_bytes(), b.to_bytes());
        assert_ne!(a.to_bytes(), c.to_bytes());
    }

    #[test]
    fn test_view_entry_json_uses_hex() {
        let entry = UnauthenticatedParticipant {
            id: ParticipantId {
                nickname: "bob".to_string(),
                long_term_key: [0xAB; 32],
            },
            ephemeral_key: [0x01; 32],
            signing_key: [0x02; 32],
        };
        let json = serde_json::to_string(&entry).expect("serialize");
        assert!(json.contains(&"ab".repeat(32)));
        let parsed: UnauthenticatedParticipant = serde_json::from_str(&json).expect("parse");
        assert_eq!(parsed, entry);
    }
}
