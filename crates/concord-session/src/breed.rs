//! Session breeding.
//!
//! A membership change never edits a running session. Instead a child is
//! built from a copy of the parent's participant records: authentication
//! carries over, shares and confirmations do not, and the child gets a new
//! session id. The parent keeps running until the host adopts the child.

use concord_types::UnauthenticatedParticipant;

use crate::participant::{LocalParty, Participant, ParticipantMap};
use crate::session::Session;
use crate::{Result, SessionError};

/// How the child's view differs from the parent's.
#[derive(Debug)]
pub enum BreedOp<'a> {
    /// A joiner from a JOIN_REQUEST.
    Added(UnauthenticatedParticipant),
    /// A member who left or vanished.
    Removed(String),
    /// Union with another session's members.
    Merged(&'a Session),
    /// Everyone except the other session's members (and us).
    Subtracted(&'a Session),
}

/// What the child announces when it is created.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Broadcast {
    /// Full view plus share; with a token for `joiner` when there is one.
    ParticipantInfo { joiner: Option<String> },
    /// Share only; every member already holds the view.
    GroupShare,
}

/// Child view for `op` over `base`.
pub(crate) fn apply(
    base: &ParticipantMap,
    local: &LocalParty,
    op: BreedOp<'_>,
) -> Result<(ParticipantMap, Broadcast)> {
    let mut participants: ParticipantMap = base
        .iter()
        .map(|(nickname, p)| (nickname.clone(), p.carried_over()))
        .collect();

    let broadcast = match op {
        BreedOp::Added(joiner) => {
            let nickname = joiner.nickname().to_string();
            if participants.contains_key(&nickname) {
                return Err(SessionError::ViewMismatch(format!(
                    "{nickname} is already a member"
                )));
            }
            let record = Participant::new(joiner, local)?;
            participants.insert(nickname.clone(), record);
            Broadcast::ParticipantInfo {
                joiner: Some(nickname),
            }
        }
        BreedOp::Removed(leaver) => {
            if leaver == local.nickname() {
                return Err(SessionError::ViewMismatch(
                    "cannot breed a session without ourselves".to_string(),
                ));
            }
            participants
                .remove(&leaver)
                .ok_or(SessionError::UnknownParticipant(leaver))?;
            Broadcast::GroupShare
        }
        BreedOp::Merged(other) => {
            for (nickname, p) in other.participants() {
                participants
                    .entry(nickname.clone())
                    .or_insert_with(|| p.carried_over());
            }
            Broadcast::ParticipantInfo { joiner: None }
        }
        BreedOp::Subtracted(other) => {
            for nickname in other.participants().keys() {
                if nickname != local.nickname() {
                    participants.remove(nickname);
                }
            }
            Broadcast::ParticipantInfo { joiner: None }
        }
    };
    Ok((participants, broadcast))
}

impl Session {
    /// Build and announce a child session. `self` is left untouched.
    pub fn breed(&self, op: BreedOp<'_>) -> Result<Session> {
        let ctx = self.context().clone();
        let (participants, broadcast) = apply(self.participants(), &ctx.local, op)?;
        Session::from_view(ctx, participants, broadcast)
    }
}
