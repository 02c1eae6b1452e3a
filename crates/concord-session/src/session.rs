//! The session aggregate.
//!
//! A session is bound to one view of the room. It runs the handshake that
//! authenticates every member and derives the group key, then carries
//! steady-state traffic while checking every member's transcript against
//! ours. Membership changes never mutate a session: they breed a new one
//! (see [`crate::breed`]) which the host adopts once it is established.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use concord_crypto::ed25519::VerifyingKey;
use concord_crypto::hashes_equal;
use concord_types::{
    Hash, InSessionKind, InSessionMessage, Message, MessageBody, MessageId, MessageKind,
    RingIndex, SessionIdBytes, DIRECTIVE_ORIGIN, MAX_SESSION_SIZE,
};
use zeroize::Zeroizing;

use crate::breed::{self, Broadcast, BreedOp};
use crate::config::SessionConfig;
use crate::gka::{self, RingShares};
use crate::host::{RoomAction, SessionHost, Timer, TimerEvent, TimerKind};
use crate::ledger::{Consistency, TranscriptLedger};
use crate::message;
use crate::participant::{LocalParty, Participant, ParticipantMap};
use crate::ring::{Ring, RingPosition};
use crate::session_id::SessionId;
use crate::state::{self, Handler, State};
use crate::{Result, SessionError};

/// Everything a session needs from the room it lives in.
#[derive(Clone)]
pub struct RoomContext {
    pub room: String,
    pub local: Arc<LocalParty>,
    pub host: Arc<dyn SessionHost>,
    pub config: SessionConfig,
}

impl RoomContext {
    pub fn new(
        room: impl Into<String>,
        local: Arc<LocalParty>,
        host: Arc<dyn SessionHost>,
        config: SessionConfig,
    ) -> Self {
        Self {
            room: room.into(),
            local,
            host,
            config,
        }
    }
}

impl fmt::Debug for RoomContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RoomContext")
            .field("room", &self.room)
            .field("local", &self.local.nickname())
            .finish_non_exhaustive()
    }
}

/// One negotiated session of a room.
pub struct Session {
    ctx: RoomContext,
    state: State,
    participants: ParticipantMap,
    ring: Ring,
    session_id: SessionId,
    shares: Option<RingShares>,
    session_key: Option<Zeroizing<Hash>>,
    own_confirmation: Option<Hash>,
    own_message_id: MessageId,
    last_received: MessageId,
    ledger: TranscriptLedger,
    heartbeat: Option<Timer>,
    send_ack: Option<Timer>,
    farewell: Option<Timer>,
    leave_anchor: Option<MessageId>,
}

impl Session {
    fn empty(ctx: RoomContext, state: State) -> Self {
        Self {
            ctx,
            state,
            participants: ParticipantMap::new(),
            ring: Ring::default(),
            session_id: SessionId::new(),
            shares: None,
            session_key: None,
            own_confirmation: None,
            own_message_id: 0,
            last_received: 0,
            ledger: TranscriptLedger::new(),
            heartbeat: None,
            send_ack: None,
            farewell: None,
            leave_anchor: None,
        }
    }

    /// A session with only ourselves in it.
    ///
    /// Broadcasts our participant info; the relay echo completes the
    /// handshake.
    pub fn solo(ctx: RoomContext) -> Result<Self> {
        let mut participants = ParticipantMap::new();
        let own = Participant::new(ctx.local.view_entry(), &ctx.local)?;
        participants.insert(own.nickname().to_string(), own);
        Self::from_view(ctx, participants, Broadcast::ParticipantInfo { joiner: None })
            .map(|mut session| {
                session.state = State::RepliedToNewJoin;
                session
            })
    }

    /// Join a room from the first PARTICIPANT_INFO answering our request.
    pub fn join(ctx: RoomContext, info: &Message) -> Result<Self> {
        if info.kind() != MessageKind::ParticipantInfo {
            return Err(SessionError::ViewMismatch(format!(
                "cannot join from {:?}",
                info.kind()
            )));
        }
        let mut session = Self::empty(ctx, State::JoinRequested);
        session.auth_and_reshare(info)?;
        Ok(session)
    }

    /// Answer a JOIN_REQUEST or a LEAVE seen in a parent session whose
    /// members are `parent`.
    pub fn respond(ctx: RoomContext, parent: &ParticipantMap, trigger: &Message) -> Result<Self> {
        let op = match &trigger.body {
            MessageBody::JoinRequest { joiner } => BreedOp::Added(joiner.clone()),
            MessageBody::InSession(inner) if inner.kind == InSessionKind::LeaveMessage => {
                BreedOp::Removed(trigger.sender.clone())
            }
            _ => {
                return Err(SessionError::ViewMismatch(format!(
                    "{:?} does not change membership",
                    trigger.kind()
                )))
            }
        };
        let (participants, broadcast) = breed::apply(parent, &ctx.local, op)?;
        Self::from_view(ctx, participants, broadcast)
    }

    /// The JOIN_REQUEST a joining party sends to the room.
    pub fn join_request(local: &LocalParty) -> Result<Message> {
        message::sign(
            local,
            MessageBody::JoinRequest {
                joiner: local.view_entry(),
            },
        )
    }

    /// Bind `participants` as the view and announce it.
    pub(crate) fn from_view(
        ctx: RoomContext,
        participants: ParticipantMap,
        broadcast: Broadcast,
    ) -> Result<Self> {
        let mut session = Self::empty(ctx, State::ReShared);
        session.participants = participants;
        session.bind_view()?;

        let sid = *session.session_id.require()?;
        let key_share = session.own_key_share()?;
        let body = match broadcast {
            Broadcast::ParticipantInfo { joiner } => {
                let auth_token = match joiner {
                    Some(nickname) => {
                        let joiner = session
                            .participants
                            .get_mut(&nickname)
                            .ok_or_else(|| SessionError::UnknownParticipant(nickname.clone()))?;
                        joiner.authenticated_by_me = true;
                        session.state = State::RepliedToNewJoin;
                        Some(gka::auth_token(joiner.p2p_key(), joiner.id()))
                    }
                    None => None,
                };
                MessageBody::ParticipantInfo {
                    session_id: sid,
                    view: session.view(),
                    auth_token,
                    key_share,
                }
            }
            Broadcast::GroupShare => MessageBody::GroupShare {
                session_id: sid,
                key_share,
            },
        };

        tracing::debug!(
            room = %session.ctx.room,
            session_id = %hex::encode(sid),
            members = session.participants.len(),
            state = ?session.state,
            "session bred"
        );
        session.broadcast(body)?;
        Ok(session)
    }

    // ----- accessors -----

    pub fn room(&self) -> &str {
        &self.ctx.room
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn session_id(&self) -> Option<&SessionIdBytes> {
        self.session_id.get()
    }

    pub fn session_key(&self) -> Option<&Hash> {
        self.session_key.as_deref()
    }

    pub fn participants(&self) -> &ParticipantMap {
        &self.participants
    }

    pub fn local(&self) -> &LocalParty {
        &self.ctx.local
    }

    pub fn last_received_id(&self) -> MessageId {
        self.last_received
    }

    pub fn own_message_id(&self) -> MessageId {
        self.own_message_id
    }

    pub fn leave_anchor(&self) -> Option<MessageId> {
        self.leave_anchor
    }

    /// Our transcript hash as of message `id`.
    pub fn transcript_hash(&self, id: MessageId) -> Option<Hash> {
        self.ledger.chain_hash(id)
    }

    /// Ids `nickname` has not acknowledged yet.
    pub fn outstanding_acks(&self, nickname: &str) -> Vec<MessageId> {
        self.ring
            .index_of(nickname)
            .map(|index| self.ledger.outstanding_acks(index))
            .unwrap_or_default()
    }

    /// The view as announced on the wire.
    pub fn view(&self) -> Vec<concord_types::UnauthenticatedParticipant> {
        self.participants
            .values()
            .map(|p| p.view_entry().clone())
            .collect()
    }

    // ----- dispatch -----

    /// Feed one inbound message to the session.
    pub fn state_handler(&mut self, message: &Message) -> RoomAction {
        if let (Some(ours), Some(theirs)) = (self.session_id.get(), message.session_id()) {
            if ours != theirs {
                tracing::debug!(
                    session_id = %hex::encode(ours),
                    other = %hex::encode(theirs),
                    "message for another session"
                );
                return RoomAction::BadAction;
            }
        }

        let kind = if self.admissible(message) {
            message.kind()
        } else {
            MessageKind::Inadmissible
        };

        let Some(handler) = state::route(self.state, kind) else {
            if kind == MessageKind::Inadmissible {
                tracing::warn!(
                    session_id = %self.sid_hex(),
                    sender = %message.sender,
                    state = ?self.state,
                    "inadmissible message"
                );
                if !self.state.is_established() {
                    self.die();
                }
            } else {
                tracing::debug!(
                    session_id = %self.sid_hex(),
                    kind = ?kind,
                    state = ?self.state,
                    "message ignored in this state"
                );
            }
            return RoomAction::BadAction;
        };

        let result = match handler {
            Handler::AuthAndReshare => self.auth_and_reshare(message),
            Handler::ConfirmOrResession => self.confirm_or_resession(message),
            Handler::ConfirmAuthAddUpdateShareRepo => {
                self.confirm_auth_add_update_share_repo(message)
            }
            Handler::MarkConfirmedAndMayMoveSession => {
                self.mark_confirmed_and_may_move_session(message)
            }
            Handler::InitASessionWithNewPlist => self.init_a_session_with_new_plist(message),
            Handler::Receive => self.receive(message),
        };

        match result {
            Ok(action) => action,
            Err(e) => {
                tracing::warn!(
                    session_id = %self.sid_hex(),
                    sender = %message.sender,
                    handler = ?handler,
                    error = %e,
                    "handler failed"
                );
                if !self.state.is_established() {
                    self.die();
                }
                RoomAction::BadAction
            }
        }
    }

    fn admissible(&self, message: &Message) -> bool {
        match &message.body {
            MessageBody::JoinRequest { joiner } => {
                message.sender == joiner.nickname()
                    && VerifyingKey::from_bytes(&joiner.signing_key)
                        .ok()
                        .is_some_and(|key| message::verify(message, &key).is_ok())
            }
            _ => match self.participants.get(&message.sender) {
                Some(sender) => message::verify(message, sender.verifying_key()).is_ok(),
                // Senders outside the view are judged by the handler.
                None => true,
            },
        }
    }

    // ----- handshake handlers -----

    fn auth_and_reshare(&mut self, message: &Message) -> Result<RoomAction> {
        let MessageBody::ParticipantInfo {
            session_id,
            view,
            auth_token,
            key_share,
        } = &message.body
        else {
            return Ok(RoomAction::BadAction);
        };

        if !self.session_id.is_set() {
            self.bind_joined_view(session_id, view)?;
            let sender = self
                .participants
                .get(&message.sender)
                .ok_or_else(|| SessionError::UnknownParticipant(message.sender.clone()))?;
            message::verify(message, sender.verifying_key())?;
            self.send_joiner_auth()?;
        }

        let my_id = self.ctx.local.id();
        let sender = self
            .participants
            .get_mut(&message.sender)
            .ok_or_else(|| SessionError::UnknownParticipant(message.sender.clone()))?;
        if let Some(token) = auth_token {
            let expected = gka::auth_token(sender.p2p_key(), &my_id);
            if !hashes_equal(&expected, token) {
                return Err(SessionError::AuthenticationFailed(message.sender.clone()));
            }
            sender.authenticated = true;
        }
        sender.key_share = Some(*key_share);

        self.send_confirmation_if_everybody_contributed()
    }

    fn bind_joined_view(
        &mut self,
        session_id: &SessionIdBytes,
        view: &[concord_types::UnauthenticatedParticipant],
    ) -> Result<()> {
        let own_entry = self.ctx.local.view_entry();
        if !view.contains(&own_entry) {
            return Err(SessionError::ViewMismatch(
                "our keys are not in the announced view".to_string(),
            ));
        }
        for entry in view {
            let participant = Participant::new(entry.clone(), &self.ctx.local)?;
            self.participants
                .insert(participant.nickname().to_string(), participant);
        }
        self.bind_view()?;

        let computed = self.session_id.require()?;
        if computed != session_id {
            return Err(SessionError::SessionIdMismatch {
                expected: hex::encode(computed),
                actual: hex::encode(session_id),
            });
        }
        Ok(())
    }

    fn send_joiner_auth(&mut self) -> Result<()> {
        let me = self.ctx.local.nickname().to_string();
        let mut auth_tokens = BTreeMap::new();
        for (nickname, peer) in self.participants.iter_mut() {
            if *nickname == me || peer.authenticated_by_me {
                continue;
            }
            let index = peer
                .index
                .ok_or_else(|| SessionError::UnknownParticipant(nickname.clone()))?;
            auth_tokens.insert(index, gka::auth_token(peer.p2p_key(), peer.id()));
            peer.authenticated_by_me = true;
        }

        let body = MessageBody::JoinerAuth {
            session_id: *self.session_id.require()?,
            auth_tokens,
            key_share: self.own_key_share()?,
        };
        self.broadcast(body)
    }

    fn confirm_or_resession(&mut self, message: &Message) -> Result<RoomAction> {
        if self.session_key.is_none() {
            tracing::debug!(
                session_id = %self.sid_hex(),
                sender = %message.sender,
                "confirmation before key, discarded"
            );
            return Ok(RoomAction::NoAction);
        }
        self.mark_confirmed_and_may_move_session(message)
    }

    fn confirm_auth_add_update_share_repo(&mut self, message: &Message) -> Result<RoomAction> {
        let my_index = self.my_position()?.index();
        let my_id = self.ctx.local.id();
        let sender = self
            .participants
            .get_mut(&message.sender)
            .ok_or_else(|| SessionError::UnknownParticipant(message.sender.clone()))?;

        if let MessageBody::JoinerAuth { auth_tokens, .. } = &message.body {
            if let Some(token) = auth_tokens.get(&my_index) {
                let expected = gka::auth_token(sender.p2p_key(), &my_id);
                if !hashes_equal(&expected, token) {
                    return Err(SessionError::AuthenticationFailed(message.sender.clone()));
                }
                sender.authenticated = true;
            }
        }

        let share = message
            .key_share()
            .ok_or_else(|| SessionError::ViewMismatch("message carries no key share".to_string()))?;
        sender.key_share = Some(*share);

        self.send_confirmation_if_everybody_contributed()
    }

    fn send_confirmation_if_everybody_contributed(&mut self) -> Result<RoomAction> {
        let ready = self
            .participants
            .values()
            .all(|p| p.is_authenticated() && p.has_contributed());
        if !ready {
            return Ok(RoomAction::NoAction);
        }

        let sid = *self.session_id.require()?;
        let position = self.my_position()?;
        let contributions: Vec<Hash> = self
            .participants
            .values()
            .filter_map(|p| p.key_share)
            .collect();
        let shares = self.shares.as_ref().ok_or(SessionError::NoSessionId)?;
        let key = gka::reconstruct(position, &contributions, shares, &sid)?;

        let confirmation = gka::confirmation(&key, self.ctx.local.nickname());
        self.session_key = Some(Zeroizing::new(key));
        self.own_confirmation = Some(confirmation);
        self.state = State::GroupKeyGenerated;
        tracing::debug!(session_id = %hex::encode(sid), "group key derived");

        self.broadcast(MessageBody::SessionConfirmation {
            session_id: sid,
            confirmation,
        })?;
        Ok(RoomAction::NoAction)
    }

    fn mark_confirmed_and_may_move_session(&mut self, message: &Message) -> Result<RoomAction> {
        let MessageBody::SessionConfirmation { confirmation, .. } = &message.body else {
            return Ok(RoomAction::BadAction);
        };
        let key = self.session_key.as_deref().ok_or(SessionError::NoSessionId)?;
        let expected = gka::confirmation(key, &message.sender);
        let sender = self
            .participants
            .get_mut(&message.sender)
            .ok_or_else(|| SessionError::UnknownParticipant(message.sender.clone()))?;
        if !hashes_equal(&expected, confirmation) {
            return Err(SessionError::KeyDerivation(format!(
                "{} confirmed a different key",
                message.sender
            )));
        }
        sender.confirmed = true;

        if self.participants.values().all(Participant::is_confirmed) {
            self.enter_in_session()?;
        }
        Ok(RoomAction::NoAction)
    }

    fn enter_in_session(&mut self) -> Result<()> {
        let sid = *self.session_id.require()?;
        let key = self.session_key.as_deref().ok_or(SessionError::NoSessionId)?;
        self.ledger.anchor(0, gka::key_consistency(key, &sid));
        self.state = State::InSession;
        self.heartbeat = Some(self.arm(TimerKind::Heartbeat, self.ctx.config.heartbeat_interval())?);
        tracing::info!(
            room = %self.ctx.room,
            session_id = %hex::encode(sid),
            members = self.participants.len(),
            "session established"
        );
        Ok(())
    }

    fn init_a_session_with_new_plist(&mut self, message: &Message) -> Result<RoomAction> {
        let child = Session::respond(self.ctx.clone(), &self.participants, message)?;
        Ok(RoomAction::NewSession(Box::new(child)))
    }

    fn send_farewell_and_reshare(&mut self, leave: &Message) -> Result<RoomAction> {
        self.send("", InSessionKind::JustAck)?;
        let child = Session::respond(self.ctx.clone(), &self.participants, leave)?;
        self.become_farewelled();
        Ok(RoomAction::NewSession(Box::new(child)))
    }

    // ----- steady state -----

    fn receive(&mut self, message: &Message) -> Result<RoomAction> {
        let MessageBody::InSession(inner) = &message.body else {
            return Ok(RoomAction::BadAction);
        };
        let sender_index = self
            .participants
            .get(&message.sender)
            .and_then(Participant::ring_index)
            .filter(|index| *index == inner.sender_index)
            .ok_or_else(|| SessionError::UnknownParticipant(message.sender.clone()))?;
        let my_index = self.my_position()?.index();
        let is_own = sender_index == my_index;

        self.last_received += 1;
        let id = self.last_received;
        if is_own {
            let digest = message::digest(message)?;
            if !self.ledger.confirm_echo(inner.own_message_id, &digest) {
                tracing::warn!(
                    session_id = %self.sid_hex(),
                    own_message_id = inner.own_message_id,
                    "echo differs from the message we sent"
                );
            }
        }
        let raw = message::transcript_bytes(message)?;
        self.ledger.append(id, &raw);

        self.check_consistency(&message.sender, inner);
        self.settle_sender_acks(&message.sender, inner.parent_id);
        self.arm_receive_acks(id, sender_index, my_index)?;

        if self.state == State::LeaveRequested {
            if is_own && inner.kind == InSessionKind::LeaveMessage {
                self.leave_anchor = Some(id);
                if let Some(ours) = self.ledger.chain_hash(id) {
                    self.ledger.record_peer_hash(id, my_index, ours);
                }
            }
            if self.farewell_complete() {
                self.farewell = None;
                self.finish_leave();
            }
            return Ok(RoomAction::NoAction);
        }

        match inner.kind {
            InSessionKind::UserMessage if !is_own => {
                self.ctx
                    .host
                    .display_message(&self.ctx.room, &message.sender, &inner.payload);
                if self.send_ack.is_none() {
                    self.send_ack = Some(self.arm(TimerKind::SendAck, self.ctx.config.ack_interval())?);
                }
                Ok(RoomAction::NoAction)
            }
            InSessionKind::LeaveMessage if !is_own && self.state == State::InSession => {
                self.send_farewell_and_reshare(message)
            }
            _ => Ok(RoomAction::NoAction),
        }
    }

    fn check_consistency(&mut self, sender: &str, inner: &InSessionMessage) {
        let outcome =
            self.ledger
                .record_peer_hash(inner.parent_id, inner.sender_index, inner.transcript_hash);
        if outcome == Consistency::Mismatch {
            tracing::warn!(
                session_id = %self.sid_hex(),
                participant = %sender,
                message_id = inner.parent_id,
                "transcript mismatch"
            );
            self.directive(&format!(
                "{sender} transcript doesn't match ours as of {}",
                inner.parent_id
            ));
        }
    }

    fn settle_sender_acks(&mut self, sender: &str, parent_id: MessageId) {
        let Some(participant) = self.participants.get_mut(sender) else {
            return;
        };
        let Some(index) = participant.index else {
            return;
        };
        let from = participant.last_acked + 1;
        if parent_id < from {
            return;
        }
        self.ledger.settle_acks(index, from, parent_id);
        participant.last_acked = parent_id;

        // No sender's parent id ever moves backwards, so nothing below
        // the lowest acknowledged id is consulted again.
        let floor = self
            .participants
            .values()
            .map(|p| p.last_acked)
            .min()
            .unwrap_or_default()
            .min(self.last_received);
        self.ledger.prune_below(floor);
    }

    fn arm_receive_acks(
        &mut self,
        id: MessageId,
        sender_index: RingIndex,
        my_index: RingIndex,
    ) -> Result<()> {
        let interval = self.ctx.config.consistency_failure_interval();
        let waiting: Vec<(RingIndex, String)> = self
            .participants
            .values()
            .filter_map(|p| p.index.map(|index| (index, p.nickname().to_string())))
            .filter(|(index, _)| *index != sender_index && *index != my_index)
            .collect();
        for (index, participant) in waiting {
            let timer = self.arm(
                TimerKind::AckNotReceived {
                    participant,
                    message_id: id,
                },
                interval,
            )?;
            self.ledger.arm_ack(id, index, timer);
        }
        Ok(())
    }

    /// Send a steady-state message to the room.
    pub fn send(&mut self, payload: &str, kind: InSessionKind) -> Result<()> {
        if !self.state.is_established() {
            return Err(SessionError::NotInSession(self.state));
        }
        let sid = *self.session_id.require()?;
        let sender_index = self.my_position()?.index();
        let transcript_hash = self
            .ledger
            .chain_hash(self.last_received)
            .ok_or(SessionError::NotInSession(self.state))?;

        self.own_message_id += 1;
        let own_message_id = self.own_message_id;
        let message = message::sign(
            &self.ctx.local,
            MessageBody::InSession(InSessionMessage {
                session_id: sid,
                sender_index,
                own_message_id,
                parent_id: self.last_received,
                transcript_hash,
                kind,
                payload: payload.to_string(),
            }),
        )?;

        let echo = self.arm(
            TimerKind::EchoNotReceived { own_message_id },
            self.ctx.config.send_receive_interval(),
        )?;
        self.ledger
            .record_sent(own_message_id, message::digest(&message)?, echo);

        self.send_ack = None;
        if kind == InSessionKind::UserMessage {
            self.send_ack = Some(self.arm(TimerKind::SendAck, self.ctx.config.ack_interval())?);
        }
        if self.state == State::InSession {
            self.heartbeat =
                Some(self.arm(TimerKind::Heartbeat, self.ctx.config.heartbeat_interval())?);
        }

        self.ctx.host.send(&self.ctx.room, message);
        Ok(())
    }

    /// Start leaving: send LEAVE and wait for everyone's farewell.
    pub fn leave(&mut self) -> Result<()> {
        if self.state != State::InSession {
            return Err(SessionError::NotInSession(self.state));
        }
        self.send("", InSessionKind::LeaveMessage)?;
        self.state = State::LeaveRequested;
        self.heartbeat = None;
        self.send_ack = None;
        self.farewell = Some(self.arm(
            TimerKind::FarewellDeadline,
            self.ctx.config.farewell_deadline(),
        )?);
        tracing::debug!(session_id = %self.sid_hex(), "leave requested");
        Ok(())
    }

    /// Breed a session without `leaver`, who vanished without saying
    /// goodbye. No farewell is sent.
    pub fn shrink(&mut self, leaver: &str) -> Result<RoomAction> {
        if !self.state.is_established() {
            return Err(SessionError::NotInSession(self.state));
        }
        let child = self.breed(BreedOp::Removed(leaver.to_string()))?;
        self.become_farewelled();
        Ok(RoomAction::NewSession(Box::new(child)))
    }

    /// Id of the session [`Session::shrink`] would breed.
    pub fn shrank_session_id(&self, leaver: &str) -> Result<SessionIdBytes> {
        let mut remaining = self.participants.clone();
        remaining
            .remove(leaver)
            .ok_or_else(|| SessionError::UnknownParticipant(leaver.to_string()))?;
        Ok(SessionId::compute(&remaining))
    }

    /// Give up on this session because a sibling won.
    pub fn abandon(&mut self) {
        tracing::debug!(session_id = %self.sid_hex(), "session abandoned");
        self.die();
    }

    /// Handle an expired timer the host routed back to us.
    pub fn on_timer(&mut self, event: &TimerEvent) -> Result<()> {
        if self.session_id.get() != Some(&event.session) || self.state == State::Dead {
            return Ok(());
        }
        match &event.kind {
            TimerKind::Heartbeat => {
                self.heartbeat = None;
                if self.state == State::InSession {
                    self.send("", InSessionKind::JustAck)?;
                }
            }
            TimerKind::SendAck => {
                self.send_ack = None;
                if self.state.is_established() {
                    self.send("", InSessionKind::JustAck)?;
                }
            }
            TimerKind::AckNotReceived {
                participant,
                message_id,
            } => {
                if let Some(index) = self.ring.index_of(participant) {
                    self.ledger.forget_ack(*message_id, index);
                }
                tracing::warn!(
                    session_id = %self.sid_hex(),
                    participant = %participant,
                    message_id,
                    "ack not received"
                );
                self.directive(&format!("{participant} failed to ack"));
            }
            TimerKind::EchoNotReceived { own_message_id } => {
                if self.ledger.expire_echo(*own_message_id) {
                    tracing::warn!(
                        session_id = %self.sid_hex(),
                        own_message_id,
                        "own message not echoed"
                    );
                    self.directive("we did not receive our own sent message");
                }
            }
            TimerKind::FarewellDeadline => {
                self.farewell = None;
                if self.state == State::LeaveRequested {
                    tracing::debug!(session_id = %self.sid_hex(), "farewell deadline reached");
                    self.finish_leave();
                }
            }
        }
        Ok(())
    }

    // ----- leave -----

    fn farewell_complete(&self) -> bool {
        self.leave_anchor
            .is_some_and(|anchor| self.ledger.hashes_complete_at(anchor, self.ring.len()))
    }

    fn finish_leave(&mut self) {
        if let Some(anchor) = self.leave_anchor {
            for index in self.ledger.mismatches_at(anchor) {
                let nickname = self.ring.nickname_at(index).unwrap_or("?").to_string();
                self.directive(&format!(
                    "{nickname} transcript doesn't match ours as of {anchor}"
                ));
            }
        }
        let me = self.ctx.local.nickname();
        let peers: Vec<String> = self
            .participants
            .keys()
            .filter(|nickname| nickname.as_str() != me)
            .cloned()
            .collect();
        self.ctx.host.leave(&self.ctx.room, &peers);
        tracing::info!(room = %self.ctx.room, session_id = %self.sid_hex(), "left room");
        self.die();
    }

    fn become_farewelled(&mut self) {
        self.state = State::Farewelled;
        self.heartbeat = None;
    }

    /// Terminal: drop every timer and all key material.
    fn die(&mut self) {
        self.state = State::Dead;
        self.session_key = None;
        self.own_confirmation = None;
        self.shares = None;
        self.heartbeat = None;
        self.send_ack = None;
        self.farewell = None;
        self.ledger.clear_timers();
    }

    // ----- helpers -----

    /// Freeze the participant set: ring, indices, session id and our
    /// shares.
    fn bind_view(&mut self) -> Result<()> {
        if self.participants.len() > MAX_SESSION_SIZE {
            return Err(SessionError::SessionFull {
                max: MAX_SESSION_SIZE,
            });
        }
        self.ring = Ring::from_participants(&self.participants);
        for (index, participant) in self.participants.values_mut().enumerate() {
            participant.index = Some(index as RingIndex);
        }
        self.session_id.set(SessionId::compute(&self.participants))?;

        let sid = *self.session_id.require()?;
        let position = self.my_position()?;
        let left = self.participant_at(position.left())?.p2p_key();
        let right = self.participant_at(position.right())?.p2p_key();
        let shares = RingShares::derive(left, right, &sid);
        let contribution = shares.contribution();
        self.shares = Some(shares);

        let me = self.ctx.local.nickname().to_string();
        let own = self
            .participants
            .get_mut(&me)
            .ok_or(SessionError::UnknownParticipant(me))?;
        own.key_share = Some(contribution);
        Ok(())
    }

    fn my_position(&self) -> Result<RingPosition> {
        self.ring
            .position_of(self.ctx.local.nickname())
            .ok_or_else(|| SessionError::ViewMismatch("we are not in the view".to_string()))
    }

    fn participant_at(&self, position: RingPosition) -> Result<&Participant> {
        self.ring
            .nickname_at(position.index())
            .and_then(|nickname| self.participants.get(nickname))
            .ok_or_else(|| SessionError::UnknownParticipant(format!("ring index {}", position.index())))
    }

    fn own_key_share(&self) -> Result<Hash> {
        self.participants
            .get(self.ctx.local.nickname())
            .and_then(|p| p.key_share)
            .ok_or(SessionError::NoSessionId)
    }

    fn broadcast(&self, body: MessageBody) -> Result<()> {
        let message = message::sign(&self.ctx.local, body)?;
        self.ctx.host.send(&self.ctx.room, message);
        Ok(())
    }

    fn arm(&self, kind: TimerKind, interval: Duration) -> Result<Timer> {
        let event = TimerEvent {
            session: *self.session_id.require()?,
            kind,
        };
        Timer::arm(&self.ctx.host, event, interval)
    }

    fn directive(&self, text: &str) {
        self.ctx
            .host
            .display_message(&self.ctx.room, DIRECTIVE_ORIGIN, text);
    }

    fn sid_hex(&self) -> String {
        self.session_id
            .get()
            .map(hex::encode)
            .unwrap_or_else(|| "unbound".to_string())
    }

    pub(crate) fn context(&self) -> &RoomContext {
        &self.ctx
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("room", &self.ctx.room)
            .field("session_id", &self.sid_hex())
            .field("state", &self.state)
            .field("participants", &self.participants.keys().collect::<Vec<_>>())
            .field("last_received", &self.last_received)
            .finish_non_exhaustive()
    }
}
