//! Host surface consumed by a session.
//!
//! The host owns the clock, the transport and the room UI. A session only
//! ever asks it to schedule or cancel a timer, show a line in the room,
//! leave the room, or send a message.
//!
//! Timers are handed back to the session as [`Timer`] values. Dropping a
//! `Timer` cancels it, so clearing a slot, replacing it, or dropping the
//! whole session releases every outstanding timer without call sites having
//! to remember. When a timer fires the host routes its [`TimerEvent`] back
//! to the owning session through `Session::on_timer`.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use concord_types::{Message, MessageId, SessionIdBytes};

use crate::{Result, Session, SessionError};

/// Opaque identifier of a scheduled timer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimerHandle(pub u64);

/// What a timer is for.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TimerKind {
    /// Send an empty keep-alive.
    Heartbeat,
    /// Acknowledge received traffic with an empty message.
    SendAck,
    /// `participant` has not acknowledged `message_id`.
    AckNotReceived {
        participant: String,
        message_id: MessageId,
    },
    /// The relay has not echoed our own message `own_message_id`.
    EchoNotReceived { own_message_id: MessageId },
    /// Leave regardless of outstanding farewells.
    FarewellDeadline,
}

/// Context carried by a scheduled timer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TimerEvent {
    /// Session that armed the timer.
    pub session: SessionIdBytes,
    pub kind: TimerKind,
}

/// The host could not schedule a timer.
#[derive(Debug, Clone, thiserror::Error)]
#[error("timer unavailable: {0}")]
pub struct TimerUnavailable(pub String);

/// Effects a session requires from its environment.
///
/// Cancelling an unknown or already fired handle must be a no-op.
pub trait SessionHost: Send + Sync {
    fn set_timer(
        &self,
        event: TimerEvent,
        interval: Duration,
    ) -> std::result::Result<TimerHandle, TimerUnavailable>;

    fn cancel_timer(&self, handle: TimerHandle);

    fn display_message(&self, room: &str, origin: &str, text: &str);

    /// Leave the room, telling the remaining `peers`.
    fn leave(&self, room: &str, peers: &[String]);

    fn send(&self, room: &str, message: Message);
}

/// A scheduled timer, cancelled when dropped.
pub struct Timer {
    handle: TimerHandle,
    host: Arc<dyn SessionHost>,
}

impl Timer {
    /// Schedule `event` after `interval`.
    pub fn arm(host: &Arc<dyn SessionHost>, event: TimerEvent, interval: Duration) -> Result<Self> {
        let handle = host
            .set_timer(event, interval)
            .map_err(|e| SessionError::Timer(e.to_string()))?;
        Ok(Self {
            handle,
            host: Arc::clone(host),
        })
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        self.host.cancel_timer(self.handle);
    }
}

impl fmt::Debug for Timer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Timer").field(&self.handle.0).finish()
    }
}

/// What the host should do after a session handled a message.
#[derive(Debug)]
pub enum RoomAction {
    NoAction,
    /// The message was not valid for the session's current state and was
    /// discarded.
    BadAction,
    /// A bred session the host should adopt.
    NewSession(Box<Session>),
}

impl RoomAction {
    pub fn is_bad(&self) -> bool {
        matches!(self, RoomAction::BadAction)
    }

    /// Take the bred session out of the action, if any.
    pub fn into_new_session(self) -> Option<Session> {
        match self {
            RoomAction::NewSession(session) => Some(*session),
            _ => None,
        }
    }
}
