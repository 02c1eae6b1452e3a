//! # concord-session
//!
//! Session layer of the Concord multiparty messaging protocol.
//!
//! A [`Session`] establishes an authenticated group key for a fixed set of
//! room participants, keeps per-message transcript chains so that a relay
//! dropping or reordering messages is noticed, and breeds replacement
//! sessions whenever membership changes.
//!
//! ## Modules
//!
//! - [`participant`] — Per-member authentication and key-share state.
//! - [`session_id`] — Order-independent fingerprint of a participant set.
//! - [`ring`] — Cyclic neighbour arithmetic for share exchange.
//! - [`gka`] — Ring secret sharing that produces the group key.
//! - [`ledger`] — Sent and received transcript chains with ack timers.
//! - [`host`] — The host surface: timers, display, leave, send.
//! - [`state`] — Session states and the transition table.
//! - [`session`] — The session aggregate and its handlers.
//! - [`breed`] — Deriving a new session after a membership change.
//! - [`message`] — Signing, verification and canonical encoding.
//! - [`config`] — Timer intervals.
//!
//! ## Key Concepts
//!
//! - **Session view**: the participant list (identities plus ephemeral keys)
//!   a session is bound to. A different view is always a different session.
//! - **Breeding**: building the next session from an authenticated view
//!   without touching the current one.
//! - **Directive**: a protocol notice surfaced in the room (for example a
//!   transcript mismatch).

pub mod breed;
pub mod config;
pub mod gka;
pub mod host;
pub mod ledger;
pub mod message;
pub mod participant;
pub mod ring;
pub mod session;
pub mod session_id;
pub mod state;

pub use breed::BreedOp;
pub use config::SessionConfig;
pub use host::{RoomAction, SessionHost, Timer, TimerEvent, TimerHandle, TimerKind};
pub use participant::{LocalParty, Participant, ParticipantMap};
pub use session::{RoomContext, Session};
pub use session_id::SessionId;
pub use state::State;

use concord_crypto::CryptoError;

/// Error types for session operations.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Sender or referenced participant is not part of this session.
    #[error("unknown participant: {0}")]
    UnknownParticipant(String),

    /// A participant's authentication token did not verify.
    #[error("authentication failed for {0}")]
    AuthenticationFailed(String),

    /// Message signature did not verify against the sender's key.
    #[error("bad signature from {0}")]
    BadSignature(String),

    /// The message is bound to a different session.
    #[error("session id mismatch: expected {expected}, got {actual}")]
    SessionIdMismatch { expected: String, actual: String },

    /// The session identifier may only be computed once.
    #[error("session id already set")]
    SessionIdAlreadySet,

    /// The session has no identifier and cannot run key agreement.
    #[error("session id not computed")]
    NoSessionId,

    /// Group key reconstruction was inconsistent.
    #[error("key derivation error: {0}")]
    KeyDerivation(String),

    /// The announced session view is unusable for us.
    #[error("session view mismatch: {0}")]
    ViewMismatch(String),

    /// Operation requires an established session.
    #[error("session is not established (state {0:?})")]
    NotInSession(State),

    /// Session would exceed the participant limit.
    #[error("session is at maximum capacity ({max} participants)")]
    SessionFull { max: usize },

    /// Underlying cryptographic failure.
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    /// The host could not schedule a timer.
    #[error("timer error: {0}")]
    Timer(String),

    /// Canonical encoding failed.
    #[error("encoding error: {0}")]
    Encoding(String),

    /// Configuration could not be read or parsed.
    #[error("config error: {0}")]
    Config(String),
}

/// Convenience result type for session operations.
pub type Result<T> = std::result::Result<T, SessionError>;
