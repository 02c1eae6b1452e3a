//! Integration test: transcript consistency and acknowledgement timers.
//!
//! The relay is made to misbehave by skipping deliveries to one party;
//! the others must notice through the transcript hashes carried on every
//! message.

use std::time::Duration;

use concord_session::message;
use concord_session::{LocalParty, SessionConfig, State, TimerKind};
use concord_sim::Room;
use concord_types::{InSessionKind, InSessionMessage, MessageBody, DIRECTIVE_ORIGIN};

fn party(nickname: &str, seed: u8) -> LocalParty {
    LocalParty::from_secrets(nickname, [seed; 32], [seed + 1; 32], [seed + 2; 32])
}

fn three_party_room() -> Room {
    let mut room = Room::new("lobby", SessionConfig::default());
    room.found(party("alice", 1)).expect("found");
    room.join(party("bob", 11)).expect("join");
    room.join(party("carol", 21)).expect("join");
    room
}

#[test]
fn test_chat_keeps_transcripts_equal() {
    let mut room = three_party_room();
    room.say("alice", "hello").expect("say");
    room.say("bob", "hi alice").expect("say");
    room.say("carol", "hey").expect("say");

    let hashes: Vec<_> = ["alice", "bob", "carol"]
        .iter()
        .map(|name| {
            let session = room.party(name).and_then(|p| p.active()).expect("session");
            assert_eq!(session.last_received_id(), 3);
            session.transcript_hash(3).expect("hash")
        })
        .collect();
    assert!(hashes.windows(2).all(|w| w[0] == w[1]));

    assert!(room
        .displayed("bob")
        .iter()
        .any(|d| d.origin == "alice" && d.text == "hello"));
    assert!(room
        .displayed("alice")
        .iter()
        .all(|d| d.origin != DIRECTIVE_ORIGIN));
}

#[test]
fn test_dropped_message_surfaces_mismatch() {
    let mut room = three_party_room();
    room.drop_deliveries_to("carol", 1);
    room.say("alice", "carol never sees this").expect("say");
    room.say("bob", "but she sees this").expect("say");

    let directives: Vec<String> = room
        .displayed("carol")
        .into_iter()
        .filter(|d| d.origin == DIRECTIVE_ORIGIN)
        .map(|d| d.text)
        .collect();
    assert!(
        directives.contains(&"bob transcript doesn't match ours as of 1".to_string()),
        "directives: {directives:?}"
    );
    let carol = room.party("carol").and_then(|p| p.active()).expect("carol");
    assert_eq!(carol.state(), State::InSession);
}

#[test]
fn test_ack_settles_only_covered_ids() {
    let mut room = three_party_room();
    room.say("alice", "one").expect("say");
    room.drop_deliveries_to("bob", 1);
    room.say("alice", "two").expect("say");

    let alice = room.party("alice").and_then(|p| p.active()).expect("alice");
    assert_eq!(alice.outstanding_acks("bob"), vec![1, 2]);

    // Bob only saw "one", so his next message acknowledges id 1.
    room.say("bob", "ack").expect("say");
    let alice = room.party("alice").and_then(|p| p.active()).expect("alice");
    assert_eq!(alice.outstanding_acks("bob"), vec![2]);
    assert_eq!(alice.outstanding_acks("carol"), vec![1, 2, 3]);
}

#[test]
fn test_missing_ack_reported_after_interval() {
    let config = SessionConfig {
        ack_interval_ms: 60_000,
        heartbeat_interval_ms: 120_000,
        ..SessionConfig::default()
    };
    let wait = config.consistency_failure_interval() + Duration::from_millis(1);
    let mut room = Room::new("lobby", config);
    room.found(party("alice", 1)).expect("found");
    room.join(party("bob", 11)).expect("join");
    room.join(party("carol", 21)).expect("join");

    room.say("alice", "anyone?").expect("say");
    room.advance(wait).expect("advance");

    assert!(room
        .displayed("alice")
        .iter()
        .any(|d| d.origin == DIRECTIVE_ORIGIN && d.text == "bob failed to ack"));
}

#[test]
fn test_send_ack_timer_acknowledges_traffic() {
    let config = SessionConfig::default();
    let mut room = Room::new("lobby", config.clone());
    room.found(party("alice", 1)).expect("found");
    room.join(party("bob", 11)).expect("join");

    room.say("alice", "ping").expect("say");
    room.advance(config.ack_interval() + Duration::from_millis(1))
        .expect("advance");

    let alice = room.party("alice").and_then(|p| p.active()).expect("alice");
    assert!(alice.outstanding_acks("bob").is_empty());
}

#[test]
fn test_heartbeat_sends_keepalive_and_rearms() {
    let config = SessionConfig::default();
    let mut room = Room::new("lobby", config.clone());
    room.found(party("alice", 1)).expect("found");
    room.join(party("bob", 11)).expect("join");
    let received = |room: &Room| {
        room.party("alice")
            .and_then(|p| p.active())
            .map(|s| s.last_received_id())
            .expect("alice")
    };
    assert_eq!(received(&room), 0);

    room.advance(config.heartbeat_interval() + Duration::from_millis(1))
        .expect("advance");

    assert!(received(&room) > 0);
    let heartbeats = room
        .live_timers("alice")
        .iter()
        .filter(|t| t.event.kind == TimerKind::Heartbeat)
        .count();
    assert_eq!(heartbeats, 1);
    assert!(room
        .displayed("alice")
        .iter()
        .all(|d| d.origin != DIRECTIVE_ORIGIN));
}

#[test]
fn test_forged_signature_is_dropped() {
    let mut room = three_party_room();
    let carol_keys = party("carol", 21);
    let alice = room.party("alice").and_then(|p| p.active()).expect("alice");
    let body = MessageBody::InSession(InSessionMessage {
        session_id: *alice.session_id().expect("sid"),
        sender_index: 0,
        own_message_id: 99,
        parent_id: 0,
        transcript_hash: [0; 32],
        kind: InSessionKind::UserMessage,
        payload: "not really alice".to_string(),
    });
    let mut forged = message::sign(&carol_keys, body).expect("sign");
    forged.sender = "alice".to_string();

    room.inject(forged).expect("inject");
    for name in ["alice", "bob", "carol"] {
        let session = room.party(name).and_then(|p| p.active()).expect("session");
        assert_eq!(session.state(), State::InSession);
        assert_eq!(session.last_received_id(), 0);
    }
    assert!(room
        .displayed("bob")
        .iter()
        .all(|d| d.text != "not really alice"));
}
