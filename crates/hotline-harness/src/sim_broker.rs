//! In-process broker double.
//!
//! [`SimBroker`] answers client frames the way the production broker
//! does: handshakes get sessions, joins get acknowledgments, sends get
//! sequential ids echoed back as confirmations, and history requests get
//! pages from an in-memory log. A [`BrokerScript`] injects the failure
//! modes tests care about (refusals, rejections, silence) without any
//! networking.
//!
//! The broker is pure state: `handle_frame` maps one request to zero or
//! more reply frames. The simulated link decides when and whether those
//! replies reach the client.

use std::collections::HashMap;

use hotline_core::env::test_utils::MOCK_WALL_CLOCK_BASE;
use hotline_proto::{
    ChatMessage, ConversationId, DeliveryState, ErrorPayload, Frame, FrameHeader, MessageId,
    Payload, UserId,
    payloads::{chat, session, sync},
};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Scripted failure modes, consumed as they fire.
#[derive(Debug, Clone, Copy, Default)]
pub struct BrokerScript {
    /// Refuse this many joins with a not-a-member error.
    pub refuse_joins: u32,
    /// Swallow this many sends without any reply (timeout path).
    pub swallow_sends: u32,
    /// Reject this many sends with a `MessageFailed`.
    pub reject_sends: u32,
    /// Swallow this many history requests without any reply.
    pub swallow_fetches: u32,
}

/// Deterministic broker for simulation tests.
pub struct SimBroker {
    next_session: u64,
    next_ids: HashMap<ConversationId, MessageId>,
    histories: HashMap<ConversationId, Vec<ChatMessage>>,
    profile: Option<(UserId, String)>,
    script: BrokerScript,
}

impl SimBroker {
    /// Create a broker with empty history and no scripted failures.
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_session: 1,
            next_ids: HashMap::new(),
            histories: HashMap::new(),
            profile: None,
            script: BrokerScript::default(),
        }
    }

    /// Mutable access to the failure script.
    pub fn script_mut(&mut self) -> &mut BrokerScript {
        &mut self.script
    }

    /// Number of messages the broker holds for a conversation.
    #[must_use]
    pub fn history_len(&self, conversation_id: ConversationId) -> usize {
        self.histories.get(&conversation_id).map_or(0, Vec::len)
    }

    /// Pre-fill a conversation's history with peer messages.
    ///
    /// Contents and senders come from a seeded RNG, so a test names one
    /// seed and gets the same history every run.
    pub fn seed_history(&mut self, conversation_id: ConversationId, count: usize, seed: u64) {
        const LINES: [&str; 6] = ["syncing now", "later", "sounds good", "on my way", "done", "ack"];
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        for _ in 0..count {
            let id = self.next_id(conversation_id);
            let peer = rng.gen_range(0..4u64);
            let message = ChatMessage {
                id: Some(id),
                optimistic_id: None,
                conversation_id,
                sender_id: 100 + peer,
                sender_name: format!("peer-{peer}"),
                sender_avatar: None,
                kind: hotline_proto::MessageKind::Text,
                content: LINES[rng.gen_range(0..LINES.len())].to_string(),
                timestamp: MOCK_WALL_CLOCK_BASE + id * 1_000,
                status: DeliveryState::Delivered,
            };
            self.histories.entry(conversation_id).or_default().push(message);
        }
    }

    /// Answer one client frame with zero or more reply frames.
    pub fn handle_frame(&mut self, frame: &Frame) -> Vec<Frame> {
        let payload = match Payload::from_frame(frame) {
            Ok(payload) => payload,
            Err(error) => {
                tracing::warn!(%error, "broker dropping undecodable frame");
                return Vec::new();
            },
        };
        let conversation_id = frame.header.conversation_id();

        match payload {
            Payload::Hello(hello) => {
                self.profile = Some((hello.user_id, hello.display_name));
                let session_id = self.next_session;
                self.next_session += 1;
                self.reply(0, Payload::HelloReply(session::HelloReply { session_id }))
            },
            Payload::Ping => self.reply(0, Payload::Pong),
            Payload::Goodbye(_)
            | Payload::LeaveConversation
            | Payload::MarkRead(_)
            | Payload::TypingStart
            | Payload::TypingStop => Vec::new(),
            Payload::JoinConversation => {
                if self.script.refuse_joins > 0 {
                    self.script.refuse_joins -= 1;
                    let error = ErrorPayload::not_a_member(conversation_id);
                    return self.reply(conversation_id, Payload::Error(error));
                }
                self.reply(conversation_id, Payload::JoinedConversation)
            },
            Payload::SendMessage(send) => {
                self.handle_send(conversation_id, send, frame.header.timestamp())
            },
            Payload::GetMessages(get) => self.handle_get(conversation_id, &get),
            other => {
                tracing::warn!(opcode = ?other.opcode(), "broker ignoring client-bound frame");
                Vec::new()
            },
        }
    }

    /// Fan out a fresh peer message, recording it in the history.
    pub fn compose_peer_message(
        &mut self,
        conversation_id: ConversationId,
        sender_id: UserId,
        sender_name: &str,
        content: &str,
    ) -> Vec<Frame> {
        let id = self.next_id(conversation_id);
        let message = ChatMessage {
            id: Some(id),
            optimistic_id: None,
            conversation_id,
            sender_id,
            sender_name: sender_name.to_string(),
            sender_avatar: None,
            kind: hotline_proto::MessageKind::Text,
            content: content.to_string(),
            timestamp: MOCK_WALL_CLOCK_BASE + id * 1_000,
            status: DeliveryState::Delivered,
        };
        self.histories.entry(conversation_id).or_default().push(message.clone());
        self.reply(conversation_id, Payload::NewMessage(sync::NewMessage { message }))
    }

    /// Compose a typing state change for a peer.
    pub fn compose_typing(
        &mut self,
        conversation_id: ConversationId,
        user_id: UserId,
        user_name: &str,
        is_typing: bool,
    ) -> Vec<Frame> {
        let typing = sync::UserTyping { user_id, user_name: user_name.to_string(), is_typing };
        self.reply(conversation_id, Payload::UserTyping(typing))
    }

    fn handle_send(
        &mut self,
        conversation_id: ConversationId,
        send: chat::SendMessage,
        timestamp: u64,
    ) -> Vec<Frame> {
        if self.script.swallow_sends > 0 {
            self.script.swallow_sends -= 1;
            tracing::debug!(conversation_id, "broker swallowing send");
            return Vec::new();
        }
        if self.script.reject_sends > 0 {
            self.script.reject_sends -= 1;
            let failed = sync::MessageFailed {
                optimistic_id: send.optimistic_id,
                error: "rejected by broker".to_string(),
            };
            return self.reply(conversation_id, Payload::MessageFailed(failed));
        }

        let id = self.next_id(conversation_id);
        let (sender_id, sender_name) =
            self.profile.clone().unwrap_or_else(|| (0, "unknown".to_string()));
        let message = ChatMessage {
            id: Some(id),
            optimistic_id: Some(send.optimistic_id),
            conversation_id,
            sender_id,
            sender_name,
            sender_avatar: None,
            kind: send.kind,
            content: send.content,
            timestamp,
            status: DeliveryState::Sent,
        };
        self.histories.entry(conversation_id).or_default().push(message.clone());

        let sent = sync::MessageSent { optimistic_id: send.optimistic_id, message };
        self.reply(conversation_id, Payload::MessageSent(sent))
    }

    fn handle_get(&mut self, conversation_id: ConversationId, get: &chat::GetMessages) -> Vec<Frame> {
        if self.script.swallow_fetches > 0 {
            self.script.swallow_fetches -= 1;
            tracing::debug!(conversation_id, "broker swallowing history request");
            return Vec::new();
        }

        let history = self.histories.get(&conversation_id).cloned().unwrap_or_default();
        let limit = get.limit.unwrap_or(50) as usize;
        let start = history.len().saturating_sub(limit);
        let has_more = start > 0;
        let loaded = sync::MessagesLoaded {
            messages: history[start..].to_vec(),
            has_more,
            cursor: has_more.then(|| format!("cursor-{start}")),
            total: history.len() as u64,
        };
        self.reply(conversation_id, Payload::MessagesLoaded(loaded))
    }

    fn next_id(&mut self, conversation_id: ConversationId) -> MessageId {
        let next = self.next_ids.entry(conversation_id).or_insert(1);
        let id = *next;
        *next += 1;
        id
    }

    fn reply(&self, conversation_id: ConversationId, payload: Payload) -> Vec<Frame> {
        let mut header = FrameHeader::new(payload.opcode());
        header.set_conversation_id(conversation_id);
        header.set_sender_id(0);
        header.set_timestamp(MOCK_WALL_CLOCK_BASE);
        match payload.into_frame(header) {
            Ok(frame) => vec![frame],
            Err(error) => {
                tracing::error!(%error, "broker reply failed to encode");
                Vec::new()
            },
        }
    }
}

impl Default for SimBroker {
    fn default() -> Self {
        Self::new()
    }
}
