//! End-to-end engine scenarios.
//!
//! Each test drives the full engine through a realistic event sequence:
//! connect, handshake, join, then the traffic pattern under test. Broker
//! responses are handcrafted frames; time is virtual via `MockEnv`, so
//! every timeout and backoff step is exact.

use std::time::Duration;

use hotline_client::{
    ChatMessage, ClientIdentity, DeliveryState, Engine, EngineAction, EngineConfig, EngineEvent,
    EngineNotice, Environment, MessageKind,
};
use hotline_core::env::test_utils::MockEnv;
use hotline_proto::{
    Frame, FrameHeader, Payload,
    payloads::{session, sync},
};

const CONV: u128 = 0xA11CE;
const OTHER_CONV: u128 = 0xB0B;
const SELF_ID: u64 = 42;
const PEER_ID: u64 = 77;

fn engine() -> (MockEnv, Engine<MockEnv>) {
    let env = MockEnv::new();
    let identity = ClientIdentity::new(SELF_ID, "ada");
    let engine = Engine::new(env.clone(), identity, EngineConfig::default());
    (env, engine)
}

fn connected_engine() -> (MockEnv, Engine<MockEnv>) {
    let (env, mut engine) = engine();
    engine.handle(EngineEvent::Connect).unwrap();
    engine.handle(EngineEvent::TransportOpened).unwrap();
    let reply = Payload::HelloReply(session::HelloReply { session_id: 1 });
    engine.handle(EngineEvent::FrameReceived(broker_frame(0, reply))).unwrap();
    (env, engine)
}

fn join(engine: &mut Engine<MockEnv>, conversation_id: u128) {
    engine.handle(EngineEvent::JoinConversation { conversation_id }).unwrap();
    let ack = broker_frame(conversation_id, Payload::JoinedConversation);
    engine.handle(EngineEvent::FrameReceived(ack)).unwrap();
}

fn broker_frame(conversation_id: u128, payload: Payload) -> Frame {
    let mut header = FrameHeader::new(payload.opcode());
    header.set_conversation_id(conversation_id);
    header.set_sender_id(0);
    header.set_timestamp(1_700_000_000_000);
    payload.into_frame(header).unwrap()
}

fn delivered(conversation_id: u128, id: u64, sender_id: u64) -> ChatMessage {
    ChatMessage {
        id: Some(id),
        optimistic_id: None,
        conversation_id,
        sender_id,
        sender_name: "bo".to_string(),
        sender_avatar: None,
        kind: MessageKind::Text,
        content: format!("message {id}"),
        timestamp: 1_700_000_000_000 + id,
        status: DeliveryState::Delivered,
    }
}

fn queued_message(actions: &[EngineAction]) -> ChatMessage {
    actions
        .iter()
        .find_map(|action| match action {
            EngineAction::Notify(EngineNotice::MessageQueued { message, .. }) => {
                Some(message.clone())
            },
            _ => None,
        })
        .expect("send should queue a message")
}

fn has_dial(actions: &[EngineAction]) -> bool {
    actions.iter().any(|action| matches!(action, EngineAction::Dial))
}

fn tick(engine: &mut Engine<MockEnv>, env: &MockEnv) -> Vec<EngineAction> {
    engine.handle(EngineEvent::Tick { now: env.now() }).unwrap()
}

/// Send "hi" while the link is down: the message appears with status
/// `Sending` before any network action, and a later broker failure flips
/// it to `Failed` in place with the content untouched.
#[test]
fn offline_send_reconciles_failure_in_place() {
    let (env, mut engine) = connected_engine();
    join(&mut engine, CONV);

    engine
        .handle(EngineEvent::TransportClosed { reason: Some("connection reset".to_string()) })
        .unwrap();

    let actions = engine
        .handle(EngineEvent::SendMessage {
            conversation_id: CONV,
            kind: MessageKind::Text,
            content: "hi".to_string(),
        })
        .unwrap();

    // Optimistic copy first, network send after.
    let queue_position = actions
        .iter()
        .position(|action| {
            matches!(action, EngineAction::Notify(EngineNotice::MessageQueued { .. }))
        })
        .unwrap();
    let send_position =
        actions.iter().position(|action| matches!(action, EngineAction::Send(_))).unwrap();
    assert!(queue_position < send_position);

    let queued = queued_message(&actions);
    assert_eq!(queued.status, DeliveryState::Sending);
    assert_eq!(engine.conversation(CONV).unwrap().messages().len(), 1);

    // Backoff elapses, the link reopens, the session resumes.
    env.advance(Duration::from_secs(1));
    let actions = tick(&mut engine, &env);
    assert!(has_dial(&actions));
    engine.handle(EngineEvent::TransportOpened).unwrap();
    let reply = Payload::HelloReply(session::HelloReply { session_id: 2 });
    engine.handle(EngineEvent::FrameReceived(broker_frame(0, reply))).unwrap();

    // The broker rejects the queued send.
    let optimistic_id = queued.optimistic_id.unwrap();
    let failure = Payload::MessageFailed(sync::MessageFailed {
        optimistic_id,
        error: "rate limited".to_string(),
    });
    let actions = engine.handle(EngineEvent::FrameReceived(broker_frame(CONV, failure))).unwrap();
    assert!(actions.iter().any(|action| matches!(
        action,
        EngineAction::Notify(EngineNotice::MessageFailed { .. })
    )));

    let conversation = engine.conversation(CONV).unwrap();
    let message = conversation.find_by_optimistic(optimistic_id).unwrap();
    assert_eq!(message.status, DeliveryState::Failed);
    assert_eq!(message.content, "hi");
    assert_eq!(conversation.messages().len(), 1);
}

/// A history page for one conversation must not resolve another
/// conversation's pending fetch; the matching page later does.
#[test]
fn history_page_resolves_only_its_conversation() {
    let (_env, mut engine) = connected_engine();
    join(&mut engine, CONV);
    join(&mut engine, OTHER_CONV);

    engine
        .handle(EngineEvent::FetchMessages {
            conversation_id: CONV,
            limit: Some(20),
            before: None,
            after: None,
        })
        .unwrap();
    assert!(engine.conversation(CONV).unwrap().is_loading());

    // A page for a conversation nobody fetched arrives first. It must be
    // dropped, not applied to the waiting fetch.
    let stray = Payload::MessagesLoaded(sync::MessagesLoaded {
        messages: vec![delivered(OTHER_CONV, 1, PEER_ID)],
        has_more: false,
        cursor: None,
        total: 1,
    });
    let actions =
        engine.handle(EngineEvent::FrameReceived(broker_frame(OTHER_CONV, stray))).unwrap();
    assert!(!actions.iter().any(|action| matches!(
        action,
        EngineAction::Notify(EngineNotice::HistoryLoaded { .. })
    )));
    assert!(engine.conversation(CONV).unwrap().is_loading());
    assert!(engine.conversation(CONV).unwrap().messages().is_empty());
    assert!(engine.conversation(OTHER_CONV).unwrap().messages().is_empty());

    // The matching page resolves the fetch.
    let page = Payload::MessagesLoaded(sync::MessagesLoaded {
        messages: vec![delivered(CONV, 1, PEER_ID), delivered(CONV, 2, PEER_ID)],
        has_more: true,
        cursor: Some("cursor-1".to_string()),
        total: 40,
    });
    let actions = engine.handle(EngineEvent::FrameReceived(broker_frame(CONV, page))).unwrap();
    assert!(actions.iter().any(|action| matches!(
        action,
        EngineAction::Notify(EngineNotice::HistoryLoaded { conversation_id: CONV, count: 2, .. })
    )));

    let conversation = engine.conversation(CONV).unwrap();
    assert!(!conversation.is_loading());
    assert_eq!(conversation.messages().len(), 2);
}

/// Delivering the same broker message id twice stores exactly one copy
/// and counts one unread.
#[test]
fn duplicate_delivery_stores_one_message() {
    let (_env, mut engine) = connected_engine();
    join(&mut engine, CONV);

    let first = Payload::NewMessage(sync::NewMessage { message: delivered(CONV, 7, PEER_ID) });
    let actions = engine.handle(EngineEvent::FrameReceived(broker_frame(CONV, first))).unwrap();
    assert!(actions.iter().any(|action| matches!(
        action,
        EngineAction::Notify(EngineNotice::MessageReceived { .. })
    )));

    let replay = Payload::NewMessage(sync::NewMessage { message: delivered(CONV, 7, PEER_ID) });
    let actions = engine.handle(EngineEvent::FrameReceived(broker_frame(CONV, replay))).unwrap();
    assert!(!actions.iter().any(|action| matches!(
        action,
        EngineAction::Notify(EngineNotice::MessageReceived { .. })
    )));

    let conversation = engine.conversation(CONV).unwrap();
    assert_eq!(conversation.messages().len(), 1);
    assert_eq!(conversation.unread(), 1);
}

/// Backoff doubles across failed attempts (1s, 2s, 4s), and a successful
/// handshake resets the ladder to the base delay.
#[test]
fn reconnect_backoff_doubles_until_success_then_resets() {
    let (env, mut engine) = connected_engine();
    join(&mut engine, CONV);

    engine
        .handle(EngineEvent::TransportClosed { reason: Some("connection reset".to_string()) })
        .unwrap();

    // Attempt 1 dials after the 1s base delay.
    env.advance(Duration::from_secs(1));
    assert!(has_dial(&tick(&mut engine, &env)));
    engine.handle(EngineEvent::DialFailed { reason: "refused".to_string() }).unwrap();

    // Attempt 2 waits 2s: nothing at 1s, dial at 2s.
    env.advance(Duration::from_secs(1));
    assert!(!has_dial(&tick(&mut engine, &env)));
    env.advance(Duration::from_secs(1));
    assert!(has_dial(&tick(&mut engine, &env)));
    engine.handle(EngineEvent::DialFailed { reason: "refused".to_string() }).unwrap();

    // Attempt 3 waits 4s.
    env.advance(Duration::from_secs(3));
    assert!(!has_dial(&tick(&mut engine, &env)));
    env.advance(Duration::from_secs(1));
    assert!(has_dial(&tick(&mut engine, &env)));
    engine.handle(EngineEvent::DialFailed { reason: "refused".to_string() }).unwrap();

    // Attempt 4 waits 8s and succeeds.
    env.advance(Duration::from_secs(8));
    assert!(has_dial(&tick(&mut engine, &env)));
    engine.handle(EngineEvent::TransportOpened).unwrap();
    let reply = Payload::HelloReply(session::HelloReply { session_id: 2 });
    engine.handle(EngineEvent::FrameReceived(broker_frame(0, reply))).unwrap();
    assert!(engine.status().connected);

    // The next outage starts over at the base delay.
    engine.handle(EngineEvent::TransportClosed { reason: None }).unwrap();
    env.advance(Duration::from_secs(1));
    assert!(has_dial(&tick(&mut engine, &env)));
}

/// A resumed session re-requests every desired membership, so state
/// built up before the outage keeps flowing after it.
#[test]
fn resume_rejoins_memberships() {
    let (env, mut engine) = connected_engine();
    join(&mut engine, CONV);
    join(&mut engine, OTHER_CONV);

    engine.handle(EngineEvent::TransportClosed { reason: None }).unwrap();
    env.advance(Duration::from_secs(1));
    assert!(has_dial(&tick(&mut engine, &env)));
    engine.handle(EngineEvent::TransportOpened).unwrap();

    let reply = Payload::HelloReply(session::HelloReply { session_id: 9 });
    let actions = engine.handle(EngineEvent::FrameReceived(broker_frame(0, reply))).unwrap();

    let rejoined: Vec<u128> = actions
        .iter()
        .filter_map(|action| match action {
            EngineAction::Send(frame) => match Payload::from_frame(frame).unwrap() {
                Payload::JoinConversation => Some(frame.header.conversation_id()),
                _ => None,
            },
            _ => None,
        })
        .collect();
    assert_eq!(rejoined, vec![OTHER_CONV, CONV]);
    assert!(actions
        .iter()
        .any(|action| matches!(action, EngineAction::Notify(EngineNotice::Resynchronize))));
}
