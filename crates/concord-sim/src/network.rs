//! In-memory relay and virtual clock.
//!
//! Every party of a simulated room shares one [`Network`]. Outbound
//! messages queue in send order and are delivered to every party,
//! the sender included, the way a chat relay echoes a room's traffic.
//! Timers are kept against a virtual clock that only moves when the
//! room advances it.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use concord_session::host::TimerUnavailable;
use concord_session::{SessionHost, TimerEvent, TimerHandle};
use concord_types::Message;

#[derive(Clone, Debug)]
pub struct ScheduledTimer {
    pub party: String,
    pub due: Duration,
    pub event: TimerEvent,
}

/// A line shown in one party's room window.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
pub struct Displayed {
    pub origin: String,
    pub text: String,
}

#[derive(Debug, Default)]
struct NetworkState {
    now: Duration,
    next_handle: u64,
    outbound: VecDeque<Message>,
    timers: BTreeMap<TimerHandle, ScheduledTimer>,
    displayed: BTreeMap<String, Vec<Displayed>>,
    left: BTreeMap<String, Vec<String>>,
}

/// Shared relay state.
#[derive(Debug, Default)]
pub struct Network {
    state: Mutex<NetworkState>,
}

impl Network {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn lock(&self) -> MutexGuard<'_, NetworkState> {
        // A poisoned lock only means a test panicked mid-delivery.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// A host handle for `party`.
    pub fn host_for(self: &Arc<Self>, party: impl Into<String>) -> Arc<SimHost> {
        Arc::new(SimHost {
            party: party.into(),
            network: Arc::clone(self),
        })
    }

    pub fn now(&self) -> Duration {
        self.lock().now
    }

    pub fn next_outbound(&self) -> Option<Message> {
        self.lock().outbound.pop_front()
    }

    /// Remove and return the earliest timer due at or before `deadline`,
    /// moving the clock to its due time.
    pub fn pop_due_timer(&self, deadline: Duration) -> Option<ScheduledTimer> {
        let mut state = self.lock();
        let (handle, due) = state
            .timers
            .iter()
            .filter(|(_, t)| t.due <= deadline)
            .min_by_key(|(handle, t)| (t.due, **handle))
            .map(|(handle, t)| (*handle, t.due))?;
        state.now = state.now.max(due);
        state.timers.remove(&handle)
    }

    pub fn set_now(&self, now: Duration) {
        let mut state = self.lock();
        state.now = state.now.max(now);
    }

    pub fn live_timers(&self, party: &str) -> Vec<ScheduledTimer> {
        self.lock()
            .timers
            .values()
            .filter(|t| t.party == party)
            .cloned()
            .collect()
    }

    pub fn displayed(&self, party: &str) -> Vec<Displayed> {
        self.lock().displayed.get(party).cloned().unwrap_or_default()
    }

    pub fn left(&self, party: &str) -> Option<Vec<String>> {
        self.lock().left.get(party).cloned()
    }
}

/// [`SessionHost`] for one simulated party.
#[derive(Debug)]
pub struct SimHost {
    party: String,
    network: Arc<Network>,
}

impl SessionHost for SimHost {
    fn set_timer(
        &self,
        event: TimerEvent,
        interval: Duration,
    ) -> Result<TimerHandle, TimerUnavailable> {
        let mut state = self.network.lock();
        state.next_handle += 1;
        let handle = TimerHandle(state.next_handle);
        let due = state.now + interval;
        state.timers.insert(
            handle,
            ScheduledTimer {
                party: self.party.clone(),
                due,
                event,
            },
        );
        Ok(handle)
    }

    fn cancel_timer(&self, handle: TimerHandle) {
        self.network.lock().timers.remove(&handle);
    }

    fn display_message(&self, _room: &str, origin: &str, text: &str) {
        tracing::debug!(party = %self.party, origin, text, "display");
        self.network
            .lock()
            .displayed
            .entry(self.party.clone())
            .or_default()
            .push(Displayed {
                origin: origin.to_string(),
                text: text.to_string(),
            });
    }

    fn leave(&self, room: &str, peers: &[String]) {
        tracing::info!(party = %self.party, room, peers = peers.len(), "left");
        self.network
            .lock()
            .left
            .insert(self.party.clone(), peers.to_vec());
    }

    fn send(&self, _room: &str, message: Message) {
        self.network.lock().outbound.push_back(message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use concord_session::TimerKind;

    fn event() -> TimerEvent {
        TimerEvent {
            session: [0; 32],
            kind: TimerKind::Heartbeat,
        }
    }

    #[test]
    fn test_timers_fire_in_due_order() {
        let network = Network::new();
        let host = network.host_for("alice");
        host.set_timer(event(), Duration::from_secs(5)).expect("arm");
        let early = host.set_timer(event(), Duration::from_secs(1)).expect("arm");

        assert!(network.pop_due_timer(Duration::from_millis(500)).is_none());
        let fired = network
            .pop_due_timer(Duration::from_secs(10))
            .expect("timer due");
        assert_eq!(fired.due, Duration::from_secs(1));
        assert_eq!(network.now(), Duration::from_secs(1));

        host.cancel_timer(early);
        assert_eq!(network.live_timers("alice").len(), 1);
    }

    #[test]
    fn test_display_and_leave_are_recorded() {
        let network = Network::new();
        let host = network.host_for("bob");
        host.display_message("lobby", "alice", "hello");
        host.leave("lobby", &["alice".to_string()]);
        assert_eq!(
            network.displayed("bob"),
            vec![Displayed {
                origin: "alice".to_string(),
                text: "hello".to_string()
            }]
        );
        assert_eq!(network.left("bob"), Some(vec!["alice".to_string()]));
    }
}
