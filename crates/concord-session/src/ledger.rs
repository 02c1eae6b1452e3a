//! Transcript consistency ledger.
//!
//! The received side keeps, per message id, our running transcript hash,
//! the hash each participant claimed for that id, and the timers waiting
//! for participants to acknowledge it. The sent side keeps a digest of each
//! of our own messages still waiting for the relay to echo it, with the
//! timer for that wait.
//!
//! Received entries below the lowest id every member has acknowledged are
//! pruned; sent entries leave the ledger once echoed or expired.

use std::collections::BTreeMap;

use concord_crypto::blake3::{self, contexts};
use concord_crypto::hashes_equal;
use concord_types::{Hash, MessageId, RingIndex};

use crate::host::Timer;

#[derive(Debug, Default)]
struct ReceivedEntry {
    chain: Option<Hash>,
    peer_hashes: BTreeMap<RingIndex, Hash>,
    ack_timers: BTreeMap<RingIndex, Timer>,
}

#[derive(Debug)]
struct SentEntry {
    digest: Hash,
    _echo_timer: Timer,
}

/// Outcome of comparing a participant's claimed hash with ours.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Consistency {
    Consistent,
    Mismatch,
    /// We have no chain entry at that id yet.
    Unknown,
}

#[derive(Debug, Default)]
pub struct TranscriptLedger {
    received: BTreeMap<MessageId, ReceivedEntry>,
    sent: BTreeMap<MessageId, SentEntry>,
}

impl TranscriptLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the chain at `id` with a hash every member agrees on.
    pub fn anchor(&mut self, id: MessageId, hash: Hash) {
        self.received.entry(id).or_default().chain = Some(hash);
    }

    /// Extend the chain with message `id` and return the new link.
    pub fn append(&mut self, id: MessageId, raw: &[u8]) -> Hash {
        let previous = id
            .checked_sub(1)
            .and_then(|prev| self.chain_hash(prev));
        let link = match previous {
            Some(prev) => blake3::derive_multi(contexts::TRANSCRIPT_CHAIN, &[&prev, raw]),
            None => blake3::derive_multi(contexts::TRANSCRIPT_CHAIN, &[raw]),
        };
        self.received.entry(id).or_default().chain = Some(link);
        link
    }

    pub fn chain_hash(&self, id: MessageId) -> Option<Hash> {
        self.received.get(&id).and_then(|entry| entry.chain)
    }

    /// Record the hash `index` claims for `id` and compare it with ours.
    pub fn record_peer_hash(&mut self, id: MessageId, index: RingIndex, hash: Hash) -> Consistency {
        let entry = self.received.entry(id).or_default();
        entry.peer_hashes.insert(index, hash);
        match entry.chain {
            Some(ours) if hashes_equal(&ours, &hash) => Consistency::Consistent,
            Some(_) => Consistency::Mismatch,
            None => Consistency::Unknown,
        }
    }

    /// True once every index below `ring_len` has a hash recorded at `id`.
    pub fn hashes_complete_at(&self, id: MessageId, ring_len: usize) -> bool {
        self.received.get(&id).is_some_and(|entry| {
            (0..ring_len as RingIndex).all(|index| entry.peer_hashes.contains_key(&index))
        })
    }

    /// Indices whose recorded hash at `id` differs from ours.
    pub fn mismatches_at(&self, id: MessageId) -> Vec<RingIndex> {
        let Some(entry) = self.received.get(&id) else {
            return Vec::new();
        };
        let Some(ours) = entry.chain else {
            return Vec::new();
        };
        entry
            .peer_hashes
            .iter()
            .filter(|(_, theirs)| !hashes_equal(&ours, theirs))
            .map(|(index, _)| *index)
            .collect()
    }

    /// Wait for `index` to acknowledge message `id`.
    pub fn arm_ack(&mut self, id: MessageId, index: RingIndex, timer: Timer) {
        self.received
            .entry(id)
            .or_default()
            .ack_timers
            .insert(index, timer);
    }

    /// Cancel `index`'s ack timers for every id in `from..=to`.
    pub fn settle_acks(&mut self, index: RingIndex, from: MessageId, to: MessageId) {
        if from > to {
            return;
        }
        for (_, entry) in self.received.range_mut(from..=to) {
            entry.ack_timers.remove(&index);
        }
    }

    /// Message ids `index` has not acknowledged yet.
    pub fn outstanding_acks(&self, index: RingIndex) -> Vec<MessageId> {
        self.received
            .iter()
            .filter(|(_, entry)| entry.ack_timers.contains_key(&index))
            .map(|(id, _)| *id)
            .collect()
    }

    /// Drop a fired ack timer without touching the others.
    pub fn forget_ack(&mut self, id: MessageId, index: RingIndex) {
        if let Some(entry) = self.received.get_mut(&id) {
            entry.ack_timers.remove(&index);
        }
    }

    /// Drop received entries below `floor`, with any timers they hold.
    pub fn prune_below(&mut self, floor: MessageId) {
        self.received = self.received.split_off(&floor);
    }

    pub fn record_sent(&mut self, own_id: MessageId, digest: Hash, echo_timer: Timer) {
        self.sent.insert(
            own_id,
            SentEntry {
                digest,
                _echo_timer: echo_timer,
            },
        );
    }

    /// Our message `own_id` came back as `digest`. False when the relay
    /// echoed something other than what we sent; the wait stays armed.
    pub fn confirm_echo(&mut self, own_id: MessageId, digest: &Hash) -> bool {
        match self.sent.get(&own_id) {
            Some(entry) if !hashes_equal(&entry.digest, digest) => false,
            Some(_) => {
                self.sent.remove(&own_id);
                true
            }
            None => true,
        }
    }

    /// The echo wait for `own_id` ran out. Returns false if it had already
    /// been confirmed.
    pub fn expire_echo(&mut self, own_id: MessageId) -> bool {
        self.sent.remove(&own_id).is_some()
    }

    pub fn echo_pending(&self, own_id: MessageId) -> bool {
        self.sent.contains_key(&own_id)
    }

    /// Cancel every ack and echo timer.
    pub fn clear_timers(&mut self) {
        for entry in self.received.values_mut() {
            entry.ack_timers.clear();
        }
        self.sent.clear();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::host::testing::RecordingHost;
    use crate::host::{SessionHost, TimerEvent, TimerKind};

    fn ack_timer(host: &Arc<dyn SessionHost>, id: MessageId) -> Timer {
        let event = TimerEvent {
            session: [0; 32],
            kind: TimerKind::AckNotReceived {
                participant: "bob".to_string(),
                message_id: id,
            },
        };
        Timer::arm(host, event, Duration::from_secs(1)).expect("arm")
    }

    #[test]
    fn test_chain_depends_on_history() {
        let mut a = TranscriptLedger::new();
        let mut b = TranscriptLedger::new();
        a.append(1, b"one");
        b.append(1, b"uno");
        assert_ne!(a.append(2, b"two"), b.append(2, b"two"));
    }

    #[test]
    fn test_anchor_seeds_chain() {
        let mut anchored = TranscriptLedger::new();
        anchored.anchor(0, [9; 32]);
        let mut bare = TranscriptLedger::new();
        assert_ne!(anchored.append(1, b"m"), bare.append(1, b"m"));
        assert_eq!(anchored.chain_hash(0), Some([9; 32]));
    }

    #[test]
    fn test_record_peer_hash() {
        let mut ledger = TranscriptLedger::new();
        let ours = ledger.append(1, b"m");
        assert_eq!(ledger.record_peer_hash(1, 1, ours), Consistency::Consistent);
        assert_eq!(ledger.record_peer_hash(1, 2, [0; 32]), Consistency::Mismatch);
        assert_eq!(ledger.record_peer_hash(5, 1, ours), Consistency::Unknown);
        assert_eq!(ledger.mismatches_at(1), vec![2]);
    }

    #[test]
    fn test_hashes_complete_at() {
        let mut ledger = TranscriptLedger::new();
        let ours = ledger.append(1, b"m");
        ledger.record_peer_hash(1, 0, ours);
        assert!(!ledger.hashes_complete_at(1, 2));
        ledger.record_peer_hash(1, 1, ours);
        assert!(ledger.hashes_complete_at(1, 2));
    }

    #[test]
    fn test_settle_acks_covers_range_only() {
        let recording = Arc::new(RecordingHost::default());
        let host: Arc<dyn SessionHost> = recording.clone();
        let mut ledger = TranscriptLedger::new();
        for id in 1..=4 {
            ledger.append(id, b"m");
            ledger.arm_ack(id, 1, ack_timer(&host, id));
        }

        ledger.settle_acks(1, 1, 2);
        assert_eq!(ledger.outstanding_acks(1), vec![3, 4]);
        assert_eq!(recording.live_timers().len(), 2);

        ledger.clear_timers();
        assert!(recording.live_timers().is_empty());
    }

    #[test]
    fn test_echo_must_match_sent_digest() {
        let recording = Arc::new(RecordingHost::default());
        let host: Arc<dyn SessionHost> = recording.clone();
        let mut ledger = TranscriptLedger::new();
        ledger.record_sent(1, [1; 32], ack_timer(&host, 1));
        ledger.record_sent(2, [2; 32], ack_timer(&host, 2));

        assert!(!ledger.confirm_echo(1, &[9; 32]));
        assert!(ledger.echo_pending(1));
        assert!(ledger.confirm_echo(1, &[1; 32]));
        assert!(!ledger.echo_pending(1));
        assert_eq!(recording.live_timers().len(), 1);

        assert!(ledger.expire_echo(2));
        assert!(!ledger.expire_echo(2));
        assert!(recording.live_timers().is_empty());
    }

    #[test]
    fn test_prune_below_keeps_recent_links() {
        let recording = Arc::new(RecordingHost::default());
        let host: Arc<dyn SessionHost> = recording.clone();
        let mut ledger = TranscriptLedger::new();
        ledger.anchor(0, [9; 32]);
        for id in 1..=4 {
            ledger.append(id, b"m");
        }
        ledger.arm_ack(2, 1, ack_timer(&host, 2));
        let before = ledger.chain_hash(4);

        ledger.prune_below(3);
        assert_eq!(ledger.chain_hash(0), None);
        assert_eq!(ledger.chain_hash(2), None);
        assert_eq!(ledger.chain_hash(4), before);
        assert!(recording.live_timers().is_empty());

        let mut reference = TranscriptLedger::new();
        reference.anchor(0, [9; 32]);
        for id in 1..=5 {
            reference.append(id, b"m");
        }
        assert_eq!(ledger.append(5, b"m"), reference.chain_hash(5).expect("link"));
    }
}
