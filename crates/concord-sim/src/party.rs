//! One simulated room member and its session routing.
//!
//! A party keeps at most one active session plus any number of pending
//! ones being negotiated. JOIN_REQUESTs go to the active session; every
//! other message goes to whichever session carries its id. A pending
//! session that reaches `InSession` replaces the active one and its
//! siblings are abandoned.

use std::sync::Arc;

use concord_session::{LocalParty, RoomAction, RoomContext, Session, SessionConfig, State};
use concord_types::{Message, MessageKind, SessionIdBytes};

use crate::network::Network;
use crate::{Result, SimError};

pub struct Party {
    ctx: RoomContext,
    active: Option<Session>,
    pending: Vec<Session>,
    joining: bool,
}

impl Party {
    pub fn new(
        room: &str,
        local: LocalParty,
        network: &Arc<Network>,
        config: SessionConfig,
    ) -> Self {
        let host = network.host_for(local.nickname());
        let ctx = RoomContext::new(room, Arc::new(local), host, config);
        Self {
            ctx,
            active: None,
            pending: Vec::new(),
            joining: false,
        }
    }

    pub fn nickname(&self) -> &str {
        self.ctx.local.nickname()
    }

    /// The session currently carrying the room.
    pub fn active(&self) -> Option<&Session> {
        self.active.as_ref()
    }

    /// Sessions still negotiating a membership change.
    pub fn pending(&self) -> &[Session] {
        &self.pending
    }

    /// Start a room alone.
    pub fn found(&mut self) -> Result<()> {
        let session = Session::solo(self.ctx.clone())?;
        self.pending.push(session);
        Ok(())
    }

    /// Ask the room's current session to admit us.
    pub fn request_join(&mut self) -> Result<Message> {
        self.joining = true;
        Ok(Session::join_request(&self.ctx.local)?)
    }

    pub fn send(&mut self, text: &str) -> Result<()> {
        let session = self
            .active
            .as_mut()
            .ok_or_else(|| SimError::NotInSession(self.ctx.local.nickname().to_string()))?;
        session.send(text, concord_types::InSessionKind::UserMessage)?;
        Ok(())
    }

    pub fn leave(&mut self) -> Result<()> {
        let session = self
            .active
            .as_mut()
            .ok_or_else(|| SimError::NotInSession(self.ctx.local.nickname().to_string()))?;
        session.leave()?;
        Ok(())
    }

    /// Breed a session without `leaver`, who dropped off the relay.
    pub fn shrink(&mut self, leaver: &str) -> Result<()> {
        let session = self
            .active
            .as_mut()
            .ok_or_else(|| SimError::NotInSession(self.ctx.local.nickname().to_string()))?;
        let action = session.shrink(leaver)?;
        self.adopt(action);
        Ok(())
    }

    /// Route one relayed message.
    pub fn handle(&mut self, message: &Message) {
        if message.kind() == MessageKind::JoinRequest {
            if let Some(active) = self.active.as_mut() {
                if active.state() == State::InSession {
                    let action = active.state_handler(message);
                    self.adopt(action);
                }
            }
            return;
        }

        let Some(sid) = message.session_id().copied() else {
            return;
        };
        if let Some(session) = self.session_mut(&sid) {
            let action = session.state_handler(message);
            self.adopt(action);
        } else if self.joining && message.kind() == MessageKind::ParticipantInfo {
            match Session::join(self.ctx.clone(), message) {
                Ok(session) => self.pending.push(session),
                Err(e) => tracing::debug!(
                    party = %self.nickname(),
                    error = %e,
                    "participant info not for us"
                ),
            }
        }
        self.settle();
    }

    /// Route an expired timer to the session that armed it.
    pub fn on_timer(&mut self, event: &concord_session::TimerEvent) {
        if let Some(session) = self.session_mut(&event.session) {
            if let Err(e) = session.on_timer(event) {
                tracing::warn!(party = %self.ctx.local.nickname(), error = %e, "timer handler failed");
            }
        }
        self.settle();
    }

    fn session_mut(&mut self, sid: &SessionIdBytes) -> Option<&mut Session> {
        if self
            .active
            .as_ref()
            .is_some_and(|s| s.session_id() == Some(sid))
        {
            return self.active.as_mut();
        }
        self.pending
            .iter_mut()
            .find(|s| s.session_id() == Some(sid))
    }

    fn adopt(&mut self, action: RoomAction) {
        if let Some(child) = action.into_new_session() {
            let duplicate = self
                .pending
                .iter()
                .any(|s| s.session_id() == child.session_id());
            if !duplicate {
                self.pending.push(child);
            }
        }
        self.settle();
    }

    /// Promote an established pending session and drop dead ones.
    fn settle(&mut self) {
        if let Some(ready) = self
            .pending
            .iter()
            .position(|s| s.state() == State::InSession)
        {
            let promoted = self.pending.remove(ready);
            for mut sibling in self.pending.drain(..) {
                sibling.abandon();
            }
            tracing::info!(
                party = %self.ctx.local.nickname(),
                session_id = %promoted.session_id().map(hex::encode).unwrap_or_default(),
                "session promoted"
            );
            self.active = Some(promoted);
            self.joining = false;
        }
        self.pending.retain(|s| s.state() != State::Dead);
        if self.active.as_ref().is_some_and(|s| s.state() == State::Dead) {
            self.active = None;
        }
    }
}

impl std::fmt::Debug for Party {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Party")
            .field("nickname", &self.nickname())
            .field("active", &self.active)
            .field("pending", &self.pending.len())
            .finish()
    }
}
