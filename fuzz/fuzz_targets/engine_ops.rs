//! Fuzz target for the engine state machine.
//!
//! # Strategy
//!
//! Drive `Engine` with an arbitrary interleaving of local commands and
//! broker-shaped inbound frames over a tiny id space (4 conversations,
//! 3 senders, 16 message ids), so confirmations race deliveries, pages
//! land on dirty state, and replays collide with live traffic. Clock
//! advances let timeout sweeps and typing expiry fire mid-sequence.
//!
//! # Invariants
//!
//! - `Engine::handle` never panics; bad commands return typed errors
//! - Every structural invariant in the standard registry holds after
//!   every step: unique message ids, unique optimistic ids, coherent
//!   delivery status, read active conversation, no self in typing
//! - Confirmations for unknown optimistic ids leave state untouched

#![no_main]

use std::time::Duration;

use arbitrary::Arbitrary;
use hotline_client::{
    ClientIdentity, Engine, EngineAction, EngineConfig, EngineEvent, EngineNotice, Environment,
};
use hotline_core::env::test_utils::MockEnv;
use hotline_harness::{ClientSnapshot, InvariantRegistry, SystemSnapshot};
use hotline_proto::payloads::{session, sync};
use hotline_proto::{
    ChatMessage, ConversationId, DeliveryState, ErrorPayload, Frame, FrameFlags, FrameHeader,
    MessageKind, Payload, UserId,
};
use libfuzzer_sys::fuzz_target;

const SELF_ID: UserId = 42;
const BROKER_SENDER: UserId = 0;

#[derive(Debug, Arbitrary)]
enum EngineOp {
    Connect,
    Open,
    HelloReply { session: u8 },
    Join { conversation: u8 },
    Leave { conversation: u8 },
    Send { conversation: u8, content_seed: u8 },
    RetryAny { conversation: u8 },
    Fetch { conversation: u8 },
    SetActive { conversation: Option<u8> },
    MarkRead { conversation: u8 },
    ConfirmFrame { conversation: u8, pick: u8, id: u8 },
    FailFrame { conversation: u8, pick: u8 },
    DeliverFrame { conversation: u8, sender: u8, id: u8, replay: bool },
    HistoryFrame { conversation: u8, rows: u8 },
    TypingFrame { conversation: u8, sender: u8, starts: bool },
    ErrorFrame { conversation: u8 },
    CloseTransport,
    AdvanceAndTick { millis: u16 },
}

fn conversation_id(raw: u8) -> ConversationId {
    ConversationId::from(raw % 4) + 1
}

/// Sender space overlapping `SELF_ID` so the self-echo filters get hit.
fn sender_id(raw: u8) -> UserId {
    UserId::from(raw % 3) + SELF_ID
}

fn broker_frame(conversation: ConversationId, payload: Payload, replay: bool) -> Frame {
    let mut header = FrameHeader::new(payload.opcode());
    header.set_conversation_id(conversation);
    header.set_sender_id(BROKER_SENDER);
    header.set_timestamp(1_700_000_000_000);
    header.set_flags(FrameFlags { replay });
    payload.into_frame(header).expect("broker payload encodes")
}

fn delivered(conversation: ConversationId, sender: UserId, id: u8) -> ChatMessage {
    let id = u64::from(id % 16) + 1;
    ChatMessage {
        id: Some(id),
        optimistic_id: None,
        conversation_id: conversation,
        sender_id: sender,
        sender_name: format!("user-{sender}"),
        sender_avatar: None,
        kind: MessageKind::Text,
        content: format!("m{id}"),
        timestamp: 1_700_000_000_000 + id,
        status: DeliveryState::Delivered,
    }
}

fuzz_target!(|ops: Vec<EngineOp>| {
    let env = MockEnv::new();
    let identity = ClientIdentity::new(SELF_ID, "fuzz");
    let mut engine = Engine::new(env.clone(), identity, EngineConfig::default());
    let registry = InvariantRegistry::standard();

    // Optimistic ids harvested from queue notices; confirm and fail ops
    // draw from here, or fabricate a miss when the pool is empty.
    let mut pool: Vec<u64> = Vec::new();

    for op in ops {
        let event = match &op {
            EngineOp::Connect => EngineEvent::Connect,
            EngineOp::Open => EngineEvent::TransportOpened,
            EngineOp::HelloReply { session } => EngineEvent::FrameReceived(broker_frame(
                0,
                Payload::HelloReply(session::HelloReply { session_id: u64::from(*session) }),
                false,
            )),
            EngineOp::Join { conversation } => EngineEvent::JoinConversation {
                conversation_id: conversation_id(*conversation),
            },
            EngineOp::Leave { conversation } => EngineEvent::LeaveConversation {
                conversation_id: conversation_id(*conversation),
            },
            EngineOp::Send { conversation, content_seed } => EngineEvent::SendMessage {
                conversation_id: conversation_id(*conversation),
                kind: MessageKind::Text,
                content: format!("s{content_seed}"),
            },
            EngineOp::RetryAny { conversation } => EngineEvent::RetryMessage {
                conversation_id: conversation_id(*conversation),
                optimistic_id: pool.last().copied().unwrap_or(7),
            },
            EngineOp::Fetch { conversation } => EngineEvent::FetchMessages {
                conversation_id: conversation_id(*conversation),
                limit: None,
                before: None,
                after: None,
            },
            EngineOp::SetActive { conversation } => EngineEvent::SetActiveConversation {
                conversation_id: conversation.map(conversation_id),
            },
            EngineOp::MarkRead { conversation } => EngineEvent::MarkRead {
                conversation_id: conversation_id(*conversation),
                message_id: 0,
            },
            EngineOp::ConfirmFrame { conversation, pick, id } => {
                let conversation = conversation_id(*conversation);
                let optimistic_id = pool
                    .get(usize::from(*pick) % pool.len().max(1))
                    .copied()
                    .unwrap_or(u64::from(*pick));
                let mut message = delivered(conversation, SELF_ID, *id);
                message.optimistic_id = Some(optimistic_id);
                message.status = DeliveryState::Sent;
                EngineEvent::FrameReceived(broker_frame(
                    conversation,
                    Payload::MessageSent(sync::MessageSent { optimistic_id, message }),
                    false,
                ))
            }
            EngineOp::FailFrame { conversation, pick } => {
                let conversation = conversation_id(*conversation);
                let optimistic_id = pool
                    .get(usize::from(*pick) % pool.len().max(1))
                    .copied()
                    .unwrap_or(u64::from(*pick));
                EngineEvent::FrameReceived(broker_frame(
                    conversation,
                    Payload::MessageFailed(sync::MessageFailed {
                        optimistic_id,
                        error: "refused".to_string(),
                    }),
                    false,
                ))
            }
            EngineOp::DeliverFrame { conversation, sender, id, replay } => {
                let conversation = conversation_id(*conversation);
                let message = delivered(conversation, sender_id(*sender), *id);
                EngineEvent::FrameReceived(broker_frame(
                    conversation,
                    Payload::NewMessage(sync::NewMessage { message }),
                    *replay,
                ))
            }
            EngineOp::HistoryFrame { conversation, rows } => {
                let conversation = conversation_id(*conversation);
                let messages: Vec<ChatMessage> = (0..rows % 6)
                    .map(|row| delivered(conversation, BROKER_SENDER + 100, row))
                    .collect();
                let total = messages.len() as u64;
                EngineEvent::FrameReceived(broker_frame(
                    conversation,
                    Payload::MessagesLoaded(sync::MessagesLoaded {
                        messages,
                        has_more: rows % 2 == 0,
                        cursor: None,
                        total,
                    }),
                    false,
                ))
            }
            EngineOp::TypingFrame { conversation, sender, starts } => {
                let sender = sender_id(*sender);
                EngineEvent::FrameReceived(broker_frame(
                    conversation_id(*conversation),
                    Payload::UserTyping(sync::UserTyping {
                        user_id: sender,
                        user_name: format!("user-{sender}"),
                        is_typing: *starts,
                    }),
                    false,
                ))
            }
            EngineOp::ErrorFrame { conversation } => {
                let conversation = conversation_id(*conversation);
                EngineEvent::FrameReceived(broker_frame(
                    conversation,
                    Payload::Error(ErrorPayload::not_a_member(conversation)),
                    false,
                ))
            }
            EngineOp::CloseTransport => EngineEvent::TransportClosed {
                reason: Some("fuzz close".to_string()),
            },
            EngineOp::AdvanceAndTick { millis } => {
                env.advance(Duration::from_millis(u64::from(*millis)));
                EngineEvent::Tick { now: env.now() }
            }
        };

        // Typed rejections (not joined, not retryable) are expected; only
        // a panic or an invariant break counts as a finding.
        if let Ok(actions) = engine.handle(event) {
            for action in &actions {
                if let EngineAction::Notify(EngineNotice::MessageQueued { message, .. }) = action {
                    if let Some(id) = message.optimistic_id {
                        pool.push(id);
                    }
                }
            }
        }

        let snapshot = SystemSnapshot::single(ClientSnapshot::of_engine(&engine));
        if let Err(violations) = registry.check_all(&snapshot) {
            panic!("invariant violations after {op:?}: {violations:?}");
        }
    }
});
