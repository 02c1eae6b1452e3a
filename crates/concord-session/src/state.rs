//! Session states and the transition table.

use concord_types::MessageKind;
use serde::{Deserialize, Serialize};

/// Where a session is in its lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum State {
    /// We asked to join and are waiting for the view.
    JoinRequested,
    /// We answered a join request with our participant info.
    RepliedToNewJoin,
    /// Key derived and confirmation sent; waiting for the others.
    GroupKeyGenerated,
    /// We broadcast a fresh share for an already authenticated view.
    ReShared,
    InSession,
    /// Our LEAVE is out; waiting for everyone to acknowledge it.
    LeaveRequested,
    /// A newer session replaced this one; still draining farewells.
    Farewelled,
    /// Terminal.
    Dead,
}

/// Message handlers reachable from the transition table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Handler {
    AuthAndReshare,
    ConfirmOrResession,
    ConfirmAuthAddUpdateShareRepo,
    MarkConfirmedAndMayMoveSession,
    InitASessionWithNewPlist,
    Receive,
}

/// Handler for `kind` in `state`, or `None` if the message must be ignored.
pub fn route(state: State, kind: MessageKind) -> Option<Handler> {
    use MessageKind as K;
    use State as S;

    match (state, kind) {
        (S::JoinRequested, K::ParticipantInfo) => Some(Handler::AuthAndReshare),
        (S::JoinRequested, K::SessionConfirmation) => Some(Handler::ConfirmOrResession),

        (S::RepliedToNewJoin, K::JoinerAuth | K::ParticipantInfo)
        | (S::ReShared, K::ParticipantInfo | K::GroupShare) => {
            Some(Handler::ConfirmAuthAddUpdateShareRepo)
        }

        (S::GroupKeyGenerated, K::SessionConfirmation) => {
            Some(Handler::MarkConfirmedAndMayMoveSession)
        }

        (S::InSession, K::JoinRequest) => Some(Handler::InitASessionWithNewPlist),
        (S::InSession | S::LeaveRequested | S::Farewelled, K::InSessionMessage) => {
            Some(Handler::Receive)
        }

        (S::Dead, _) | (_, K::Inadmissible) => None,
        (
            S::JoinRequested
            | S::RepliedToNewJoin
            | S::GroupKeyGenerated
            | S::ReShared
            | S::InSession
            | S::LeaveRequested
            | S::Farewelled,
            _,
        ) => None,
    }
}

impl State {
    /// States that accept steady-state traffic.
    pub fn is_established(self) -> bool {
        matches!(self, State::InSession | State::LeaveRequested | State::Farewelled)
    }
}
