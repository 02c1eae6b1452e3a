//! # concord-types
//!
//! Shared plain-data types for the Concord workspace: participant
//! identities and the protocol message taxonomy. Nothing here performs
//! cryptography; keys travel as raw bytes and are parsed by the session
//! layer.

pub mod identity;
pub mod message;

pub use identity::{ParticipantId, UnauthenticatedParticipant};
pub use message::{InSessionKind, InSessionMessage, Message, MessageBody, MessageKind};

/// Common type aliases.
pub type Hash = [u8; 32];
pub type SessionIdBytes = [u8; 32];
pub type MessageId = u64;
pub type RingIndex = u32;

/// Maximum number of participants in one session.
pub const MAX_SESSION_SIZE: usize = 256;

/// Origin label used for protocol directives shown in the room.
pub const DIRECTIVE_ORIGIN: &str = "concord directive";
