//! # concord-sim
//!
//! Deterministic harness for the Concord session layer: an in-memory relay
//! that echoes every message to every party, a virtual clock for timers,
//! and the minimal per-party routing needed to run join, leave and
//! membership-change scenarios end to end.

pub mod config;
pub mod network;
pub mod party;
pub mod room;

pub use config::{SimConfig, Step};
pub use network::{Displayed, Network, SimHost};
pub use party::Party;
pub use room::{Room, RoomReport};

use concord_session::SessionError;

/// Error types for the simulator.
#[derive(Debug, thiserror::Error)]
pub enum SimError {
    #[error("unknown party: {0}")]
    UnknownParty(String),

    #[error("party already in the room: {0}")]
    DuplicateParty(String),

    #[error("{0} has no established session")]
    NotInSession(String),

    /// The relay never went quiet.
    #[error("relay still busy after {0} deliveries")]
    Runaway(usize),

    #[error("config error: {0}")]
    Config(String),

    #[error(transparent)]
    Session(#[from] SessionError),
}

pub type Result<T> = std::result::Result<T, SimError>;
