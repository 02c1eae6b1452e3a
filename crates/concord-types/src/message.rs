//! Protocol message taxonomy.
//!
//! These are the logical, pre-decoded messages a session consumes and
//! produces. The transport that moves them between parties is outside the
//! session layer; it hands sessions a [`Message`] and receives outbound
//! ones through the host's `send` effect.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_with::serde_as;

use crate::{Hash, MessageId, RingIndex, SessionIdBytes, UnauthenticatedParticipant};

/// A signed protocol message.
#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Nickname of the sending participant.
    pub sender: String,
    pub body: MessageBody,
    /// Ed25519 signature by the sender's ephemeral signing key over the
    /// canonical encoding of `(sender, body)`.
    #[serde_as(as = "Option<serde_with::Bytes>")]
    pub signature: Option<[u8; 64]>,
}

/// Message payloads by type.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageBody {
    /// A party asks the room's current session to admit it.
    JoinRequest { joiner: UnauthenticatedParticipant },
    /// Full session view plus the sender's key share, and an
    /// authentication token for the joiner when there is one.
    ParticipantInfo {
        session_id: SessionIdBytes,
        view: Vec<UnauthenticatedParticipant>,
        auth_token: Option<Hash>,
        key_share: Hash,
    },
    /// The joiner's tokens for every member, keyed by the member's ring
    /// index, plus the joiner's key share.
    JoinerAuth {
        session_id: SessionIdBytes,
        auth_tokens: BTreeMap<RingIndex, Hash>,
        key_share: Hash,
    },
    /// A fresh key share for a session whose view every member already
    /// holds.
    GroupShare {
        session_id: SessionIdBytes,
        key_share: Hash,
    },
    /// `H(group key, sender nickname)`.
    SessionConfirmation {
        session_id: SessionIdBytes,
        confirmation: Hash,
    },
    InSession(InSessionMessage),
}

/// Steady-state message exchanged once a group key is established.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InSessionMessage {
    pub session_id: SessionIdBytes,
    /// Sender position in the session ring.
    pub sender_index: RingIndex,
    /// Sender's own outbound counter.
    pub own_message_id: MessageId,
    /// Last message id the sender had received when sending.
    pub parent_id: MessageId,
    /// Sender's transcript hash at `parent_id`.
    pub transcript_hash: Hash,
    pub kind: InSessionKind,
    pub payload: String,
}

/// Sub-types of [`InSessionMessage`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InSessionKind {
    UserMessage,
    LeaveMessage,
    JustAck,
}

/// Message type used for state-machine dispatch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MessageKind {
    JoinRequest,
    ParticipantInfo,
    JoinerAuth,
    GroupShare,
    SessionConfirmation,
    InSessionMessage,
    /// Assigned locally to a message whose signature does not verify.
    /// Never produced by a peer.
    Inadmissible,
}

impl Message {
    /// An unsigned message; the session signs it before sending.
    pub fn new(sender: impl Into<String>, body: MessageBody) -> Self {
        Self {
            sender: sender.into(),
            body,
            signature: None,
        }
    }

    pub fn kind(&self) -> MessageKind {
        self.body.kind()
    }

    /// Session id this message is bound to. `None` for join requests.
    pub fn session_id(&self) -> Option<&SessionIdBytes> {
        self.body.session_id()
    }

    pub fn key_share(&self) -> Option<&Hash> {
        match &self.body {
            MessageBody::ParticipantInfo { key_share, .. }
            | MessageBody::JoinerAuth { key_share, .. }
            | MessageBody::GroupShare { key_share, .. } => Some(key_share),
            _ => None,
        }
    }
}

impl MessageBody {
    pub fn kind(&self) -> MessageKind {
        match self {
            MessageBody::JoinRequest { .. } => MessageKind::JoinRequest,
            MessageBody::ParticipantInfo { .. } => MessageKind::ParticipantInfo,
            MessageBody::JoinerAuth { .. } => MessageKind::JoinerAuth,
            MessageBody::GroupShare { .. } => MessageKind::GroupShare,
            MessageBody::SessionConfirmation { .. } => MessageKind::SessionConfirmation,
            MessageBody::InSession(_) => MessageKind::InSessionMessage,
        }
    }

    pub fn session_id(&self) -> Option<&SessionIdBytes> {
        match self {
            MessageBody::JoinRequest { .. } => None,
            MessageBody::ParticipantInfo { session_id, .. }
            | MessageBody::JoinerAuth { session_id, .. }
            | MessageBody::GroupShare { session_id, .. }
            | MessageBody::SessionConfirmation { session_id, .. } => Some(session_id),
            MessageBody::InSession(inner) => Some(&inner.session_id),
        }
    }
}
