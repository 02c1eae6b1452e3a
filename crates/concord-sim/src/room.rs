//! A scripted room: parties, relay delivery and virtual time.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use concord_session::{LocalParty, SessionConfig};
use concord_types::Message;
use serde::Serialize;

use crate::network::{Displayed, Network, ScheduledTimer};
use crate::party::Party;
use crate::{Result, SimError};

/// Upper bound on deliveries per flush; a protocol loop trips it.
const MAX_DELIVERIES: usize = 100_000;

pub struct Room {
    name: String,
    config: SessionConfig,
    network: Arc<Network>,
    parties: BTreeMap<String, Party>,
    /// Deliveries to skip per party, for relay misbehaviour.
    drops: BTreeMap<String, u32>,
}

impl Room {
    pub fn new(name: impl Into<String>, config: SessionConfig) -> Self {
        Self {
            name: name.into(),
            config,
            network: Network::new(),
            parties: BTreeMap::new(),
            drops: BTreeMap::new(),
        }
    }

    pub fn party(&self, nickname: &str) -> Option<&Party> {
        self.parties.get(nickname)
    }

    fn party_mut(&mut self, nickname: &str) -> Result<&mut Party> {
        self.parties
            .get_mut(nickname)
            .ok_or_else(|| SimError::UnknownParty(nickname.to_string()))
    }

    fn admit(&mut self, local: LocalParty) -> Result<&mut Party> {
        let nickname = local.nickname().to_string();
        if self.parties.contains_key(&nickname) {
            return Err(SimError::DuplicateParty(nickname));
        }
        let party = Party::new(&self.name, local, &self.network, self.config.clone());
        Ok(self.parties.entry(nickname).or_insert(party))
    }

    /// First member: a solo session.
    pub fn found(&mut self, local: LocalParty) -> Result<()> {
        self.admit(local)?.found()?;
        self.flush()
    }

    /// A new member asks to join and the room negotiates until quiet.
    pub fn join(&mut self, local: LocalParty) -> Result<()> {
        let request = self.admit(local)?.request_join()?;
        self.relay(&request);
        self.flush()
    }

    pub fn say(&mut self, nickname: &str, text: &str) -> Result<()> {
        self.party_mut(nickname)?.send(text)?;
        self.flush()
    }

    pub fn leave(&mut self, nickname: &str) -> Result<()> {
        self.begin_leave(nickname)?;
        self.flush()
    }

    /// Queue `nickname`'s LEAVE without delivering anything.
    pub fn begin_leave(&mut self, nickname: &str) -> Result<()> {
        self.party_mut(nickname)?.leave()
    }

    /// `nickname` drops off the relay; the others shrink around it.
    pub fn vanish(&mut self, nickname: &str) -> Result<()> {
        let departed = self
            .parties
            .remove(nickname)
            .ok_or_else(|| SimError::UnknownParty(nickname.to_string()))?;
        drop(departed);
        for party in self.parties.values_mut() {
            party.shrink(nickname)?;
        }
        self.flush()
    }

    /// Skip the next `count` deliveries to `nickname`.
    pub fn drop_deliveries_to(&mut self, nickname: &str, count: u32) {
        *self.drops.entry(nickname.to_string()).or_default() += count;
    }

    /// Queue `message` as if a party had sent it.
    pub fn inject(&mut self, message: Message) -> Result<()> {
        self.relay(&message);
        self.flush()
    }

    fn relay(&mut self, message: &Message) {
        for (nickname, party) in self.parties.iter_mut() {
            if let Some(remaining) = self.drops.get_mut(nickname) {
                if *remaining > 0 {
                    *remaining -= 1;
                    tracing::debug!(party = %nickname, sender = %message.sender, "delivery dropped");
                    continue;
                }
            }
            party.handle(message);
        }
    }

    /// Relay the oldest queued message. False when the relay is quiet.
    pub fn deliver_next(&mut self) -> bool {
        match self.network.next_outbound() {
            Some(message) => {
                self.relay(&message);
                true
            }
            None => false,
        }
    }

    /// Deliver queued messages until the relay is quiet.
    pub fn flush(&mut self) -> Result<()> {
        let mut delivered = 0usize;
        while self.deliver_next() {
            delivered += 1;
            if delivered > MAX_DELIVERIES {
                return Err(SimError::Runaway(delivered));
            }
        }
        Ok(())
    }

    /// Move virtual time forward, firing due timers in order.
    pub fn advance(&mut self, by: Duration) -> Result<()> {
        let deadline = self.network.now() + by;
        while let Some(timer) = self.network.pop_due_timer(deadline) {
            if let Some(party) = self.parties.get_mut(&timer.party) {
                party.on_timer(&timer.event);
            }
            self.flush()?;
        }
        self.network.set_now(deadline);
        Ok(())
    }

    pub fn displayed(&self, nickname: &str) -> Vec<Displayed> {
        self.network.displayed(nickname)
    }

    pub fn left(&self, nickname: &str) -> Option<Vec<String>> {
        self.network.left(nickname)
    }

    pub fn live_timers(&self, nickname: &str) -> Vec<ScheduledTimer> {
        self.network.live_timers(nickname)
    }

    pub fn report(&self) -> RoomReport {
        let parties = self
            .parties
            .values()
            .map(|party| {
                let session = party.active();
                PartyReport {
                    nickname: party.nickname().to_string(),
                    state: session.map(|s| format!("{:?}", s.state())),
                    session_id: session.and_then(|s| s.session_id()).map(hex::encode),
                    members: session
                        .map(|s| s.participants().keys().cloned().collect())
                        .unwrap_or_default(),
                    received: session.map(|s| s.last_received_id()).unwrap_or_default(),
                    displayed: self.network.displayed(party.nickname()),
                    left: self.network.left(party.nickname()).is_some(),
                }
            })
            .collect();
        RoomReport {
            room: self.name.clone(),
            elapsed_ms: self.network.now().as_millis() as u64,
            parties,
        }
    }
}

/// End-of-run summary printed by the binary.
#[derive(Debug, Serialize)]
pub struct RoomReport {
    pub room: String,
    pub elapsed_ms: u64,
    pub parties: Vec<PartyReport>,
}

#[derive(Debug, Serialize)]
pub struct PartyReport {
    pub nickname: String,
    pub state: Option<String>,
    pub session_id: Option<String>,
    pub members: Vec<String>,
    pub received: u64,
    pub displayed: Vec<Displayed>,
    pub left: bool,
}
