//! Point-in-time captures of client state for invariant checking.
//!
//! Snapshots carry only the facts invariants reason about: message
//! id/status pairings, typing membership, unread counts, and the active
//! conversation marker. Builder methods construct synthetic snapshots in
//! check unit tests; [`ClientSnapshot::of_engine`] captures a live engine.

use std::collections::BTreeMap;

use hotline_client::{Engine, Environment};
use hotline_core::store::Conversation;
use hotline_proto::{ChatMessage, ConversationId, DeliveryState, MessageId, OptimisticId, UserId};

/// Observable state of every client in a simulation.
#[derive(Debug, Clone, Default)]
pub struct SystemSnapshot {
    /// Per-client snapshots.
    pub clients: Vec<ClientSnapshot>,
}

impl SystemSnapshot {
    /// A snapshot with no clients.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// A snapshot of a single client.
    #[must_use]
    pub fn single(client: ClientSnapshot) -> Self {
        Self { clients: vec![client] }
    }

    /// A snapshot of several clients.
    #[must_use]
    pub fn from_clients(clients: Vec<ClientSnapshot>) -> Self {
        Self { clients }
    }

    /// Add a client (builder style).
    #[must_use]
    pub fn add_client(mut self, client: ClientSnapshot) -> Self {
        self.clients.push(client);
        self
    }
}

/// Observable state of one client.
#[derive(Debug, Clone)]
pub struct ClientSnapshot {
    /// The client's own user id.
    pub user_id: UserId,
    /// Foregrounded conversation, if any.
    pub active_conversation: Option<ConversationId>,
    /// Per-conversation state, keyed and iterated in id order.
    pub conversations: BTreeMap<ConversationId, ConversationSnapshot>,
}

impl ClientSnapshot {
    /// An empty snapshot for the given user.
    #[must_use]
    pub fn new(user_id: UserId) -> Self {
        Self { user_id, active_conversation: None, conversations: BTreeMap::new() }
    }

    /// Set the active conversation (builder style).
    #[must_use]
    pub fn with_active_conversation(mut self, conversation_id: ConversationId) -> Self {
        self.active_conversation = Some(conversation_id);
        self
    }

    /// Add a conversation (builder style).
    #[must_use]
    pub fn with_conversation(
        mut self,
        conversation_id: ConversationId,
        conversation: ConversationSnapshot,
    ) -> Self {
        self.conversations.insert(conversation_id, conversation);
        self
    }

    /// Capture a live engine's observable state.
    pub fn of_engine<E: Environment>(engine: &Engine<E>) -> Self {
        let store = engine.store();
        Self {
            user_id: engine.user_id(),
            active_conversation: store.active(),
            conversations: store
                .conversations()
                .map(|(id, conversation)| (id, ConversationSnapshot::of_conversation(conversation)))
                .collect(),
        }
    }
}

/// Observable state of one conversation.
#[derive(Debug, Clone, Default)]
pub struct ConversationSnapshot {
    /// Message facts in display order.
    pub messages: Vec<MessageFacts>,
    /// Users with a live typing indicator, oldest first.
    pub typing_user_ids: Vec<UserId>,
    /// Unread message count.
    pub unread: u32,
}

impl ConversationSnapshot {
    /// An empty conversation snapshot.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message (builder style).
    #[must_use]
    pub fn with_message(mut self, message: MessageFacts) -> Self {
        self.messages.push(message);
        self
    }

    /// Set the typing user ids (builder style).
    #[must_use]
    pub fn with_typing(mut self, user_ids: impl IntoIterator<Item = UserId>) -> Self {
        self.typing_user_ids = user_ids.into_iter().collect();
        self
    }

    /// Set the unread count (builder style).
    #[must_use]
    pub fn with_unread(mut self, unread: u32) -> Self {
        self.unread = unread;
        self
    }

    /// Capture a live conversation's observable state.
    #[must_use]
    pub fn of_conversation(conversation: &Conversation) -> Self {
        Self {
            messages: conversation.messages().iter().map(MessageFacts::of_message).collect(),
            typing_user_ids: conversation.typing().iter().map(|user| user.user_id).collect(),
            unread: conversation.unread(),
        }
    }
}

/// The facts invariants need about one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageFacts {
    /// Broker-assigned id, absent until confirmation.
    pub id: Option<MessageId>,
    /// Client correlation id, absent on broker-originated messages.
    pub optimistic_id: Option<OptimisticId>,
    /// Delivery status.
    pub status: DeliveryState,
}

impl MessageFacts {
    /// Facts for a broker-delivered message.
    #[must_use]
    pub fn delivered(id: MessageId) -> Self {
        Self { id: Some(id), optimistic_id: None, status: DeliveryState::Delivered }
    }

    /// Facts for an in-flight optimistic message.
    #[must_use]
    pub fn sending(optimistic_id: OptimisticId) -> Self {
        Self { id: None, optimistic_id: Some(optimistic_id), status: DeliveryState::Sending }
    }

    /// Facts for a failed optimistic message.
    #[must_use]
    pub fn failed(optimistic_id: OptimisticId) -> Self {
        Self { id: None, optimistic_id: Some(optimistic_id), status: DeliveryState::Failed }
    }

    /// Facts for a confirmed message that kept its correlation id.
    #[must_use]
    pub fn confirmed(id: MessageId, optimistic_id: OptimisticId) -> Self {
        Self { id: Some(id), optimistic_id: Some(optimistic_id), status: DeliveryState::Sent }
    }

    /// Extract the facts from a full message.
    #[must_use]
    pub fn of_message(message: &ChatMessage) -> Self {
        Self { id: message.id, optimistic_id: message.optimistic_id, status: message.status }
    }
}
