//! Golden snapshots of reconciliation outcomes.
//!
//! These pin the exact local message list at the interesting points of
//! the optimistic lifecycle: queued, confirmed in place, failed and
//! retried, and replaced wholesale by a history page. Optimistic
//! correlation ids come from the engine's RNG, so a redaction stands in
//! for them.

use std::collections::VecDeque;
use std::time::Instant;

use hotline_client::{ClientIdentity, Engine, EngineAction, EngineConfig, EngineEvent};
use hotline_core::env::test_utils::MockEnv;
use hotline_harness::SimBroker;
use hotline_proto::{ChatMessage, ConversationId, Frame, MessageKind, UserId};

const CONV: ConversationId = 7;
const SELF_ID: UserId = 42;
const PEER_ID: UserId = 707;

/// Engine plus broker double, exchanging frames synchronously.
struct Rig {
    engine: Engine<MockEnv>,
    broker: SimBroker,
}

impl Rig {
    fn connected() -> Self {
        let engine = Engine::new(
            MockEnv::new(),
            ClientIdentity::new(SELF_ID, "ada"),
            EngineConfig::default(),
        );
        let mut rig = Self { engine, broker: SimBroker::new() };
        rig.drive(EngineEvent::Connect);
        rig.drive(EngineEvent::TransportOpened);
        rig
    }

    fn joined() -> Self {
        let mut rig = Self::connected();
        rig.drive(EngineEvent::JoinConversation { conversation_id: CONV });
        rig
    }

    /// Run one event, forwarding outbound frames to the broker and its
    /// replies back into the engine until the exchange settles.
    fn drive(&mut self, event: EngineEvent<Instant>) {
        let mut inbound = VecDeque::new();
        let actions = self.engine.handle(event).expect("event accepted");
        self.exchange(actions, &mut inbound);

        while let Some(frame) = inbound.pop_front() {
            let actions =
                self.engine.handle(EngineEvent::FrameReceived(frame)).expect("frame accepted");
            self.exchange(actions, &mut inbound);
        }
    }

    fn exchange(&mut self, actions: Vec<EngineAction>, inbound: &mut VecDeque<Frame>) {
        for action in actions {
            if let EngineAction::Send(frame) = action {
                inbound.extend(self.broker.handle_frame(&frame));
            }
        }
    }

    fn send(&mut self, content: &str) {
        self.drive(EngineEvent::SendMessage {
            conversation_id: CONV,
            kind: MessageKind::Text,
            content: content.to_string(),
        });
    }

    fn messages(&self) -> Vec<ChatMessage> {
        self.engine
            .conversation(CONV)
            .map(|conversation| conversation.messages().to_vec())
            .unwrap_or_default()
    }
}

#[test]
fn optimistic_sends_confirm_in_place() {
    let mut rig = Rig::joined();

    // Two sends the broker never answers stay optimistic.
    rig.broker.script_mut().swallow_sends = 2;
    rig.send("first");
    rig.send("second");

    insta::assert_json_snapshot!(rig.messages(), { "[].optimistic_id" => "[oid]" }, @r#"
    [
      {
        "optimistic_id": "[oid]",
        "conversation_id": 7,
        "sender_id": 42,
        "sender_name": "ada",
        "kind": "text",
        "content": "first",
        "timestamp": 1700000000000,
        "status": "sending"
      },
      {
        "optimistic_id": "[oid]",
        "conversation_id": 7,
        "sender_id": 42,
        "sender_name": "ada",
        "kind": "text",
        "content": "second",
        "timestamp": 1700000000000,
        "status": "sending"
      }
    ]
    "#);

    // A third send the broker answers is confirmed in place while the
    // earlier two stay queued.
    rig.send("third");

    insta::assert_json_snapshot!(rig.messages(), { "[].optimistic_id" => "[oid]" }, @r#"
    [
      {
        "optimistic_id": "[oid]",
        "conversation_id": 7,
        "sender_id": 42,
        "sender_name": "ada",
        "kind": "text",
        "content": "first",
        "timestamp": 1700000000000,
        "status": "sending"
      },
      {
        "optimistic_id": "[oid]",
        "conversation_id": 7,
        "sender_id": 42,
        "sender_name": "ada",
        "kind": "text",
        "content": "second",
        "timestamp": 1700000000000,
        "status": "sending"
      },
      {
        "id": 1,
        "optimistic_id": "[oid]",
        "conversation_id": 7,
        "sender_id": 42,
        "sender_name": "ada",
        "kind": "text",
        "content": "third",
        "timestamp": 1700000000000,
        "status": "sent"
      }
    ]
    "#);
}

#[test]
fn rejected_send_keeps_content_and_retries_in_place() {
    let mut rig = Rig::joined();

    rig.broker.script_mut().reject_sends = 1;
    rig.send("hold the line");

    insta::assert_json_snapshot!(rig.messages(), { "[].optimistic_id" => "[oid]" }, @r#"
    [
      {
        "optimistic_id": "[oid]",
        "conversation_id": 7,
        "sender_id": 42,
        "sender_name": "ada",
        "kind": "text",
        "content": "hold the line",
        "timestamp": 1700000000000,
        "status": "failed"
      }
    ]
    "#);

    // Retry reuses the correlation id; the broker accepts this time.
    let optimistic_id = rig.messages()[0].optimistic_id.expect("optimistic id assigned");
    rig.drive(EngineEvent::RetryMessage { conversation_id: CONV, optimistic_id });

    insta::assert_json_snapshot!(rig.messages(), { "[].optimistic_id" => "[oid]" }, @r#"
    [
      {
        "id": 1,
        "optimistic_id": "[oid]",
        "conversation_id": 7,
        "sender_id": 42,
        "sender_name": "ada",
        "kind": "text",
        "content": "hold the line",
        "timestamp": 1700000000000,
        "status": "sent"
      }
    ]
    "#);
}

#[test]
fn history_page_replaces_local_state_wholesale() {
    let mut rig = Rig::joined();

    // Traffic the client missed: composed in the broker, never delivered.
    let _ = rig.broker.compose_peer_message(CONV, PEER_ID, "grace", "hello there");
    let _ = rig.broker.compose_peer_message(CONV, PEER_ID, "grace", "anyone home");

    // A stranded optimistic send is replaced along with everything else.
    rig.broker.script_mut().swallow_sends = 1;
    rig.send("draft");

    rig.drive(EngineEvent::FetchMessages {
        conversation_id: CONV,
        limit: None,
        before: None,
        after: None,
    });

    insta::assert_json_snapshot!(rig.messages(), @r#"
    [
      {
        "id": 1,
        "conversation_id": 7,
        "sender_id": 707,
        "sender_name": "grace",
        "kind": "text",
        "content": "hello there",
        "timestamp": 1700000001000,
        "status": "delivered"
      },
      {
        "id": 2,
        "conversation_id": 7,
        "sender_id": 707,
        "sender_name": "grace",
        "kind": "text",
        "content": "anyone home",
        "timestamp": 1700000002000,
        "status": "delivered"
      }
    ]
    "#);
}

#[test]
fn connection_status_tracks_the_transport() {
    let mut rig = Rig::connected();

    insta::assert_json_snapshot!(rig.engine.status(), @r#"
    {
      "connected": true,
      "connecting": false
    }
    "#);

    rig.drive(EngineEvent::TransportClosed { reason: Some("gateway restart".to_string()) });

    insta::assert_json_snapshot!(rig.engine.status(), @r#"
    {
      "connected": false,
      "connecting": true,
      "error": "gateway restart"
    }
    "#);
}
