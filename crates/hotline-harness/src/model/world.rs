//! The model world: a predictable oracle for client state.
//!
//! [`ModelWorld`] pairs the per-conversation model with a [`ModelBroker`]
//! that assigns message ids the way the real broker does: sequentially,
//! in the order requests are answered. A test drives the real engine with
//! the same operations and broker decisions, then compares
//! [`ObservableState`]s.

use std::collections::{BTreeMap, BTreeSet};

use hotline_proto::{ConversationId, DeliveryState, MessageId, UserId};
use serde::Serialize;

use super::{
    client::ModelConversation,
    operation::{ModelConversationId, Operation, OperationError, OperationResult},
};

/// Lowest peer user id; peers occupy a small range above it.
pub const PEER_ID_BASE: UserId = 100;

/// Map a model conversation id into the real id space.
///
/// Offset by one so no operation ever targets conversation 0, which the
/// wire protocol reserves for session-scoped frames.
#[must_use]
pub fn real_conversation_id(conversation: ModelConversationId) -> ConversationId {
    ConversationId::from(conversation) + 1
}

/// Stable user id for a generated peer.
#[must_use]
pub fn peer_user_id(peer: u8) -> UserId {
    PEER_ID_BASE + UserId::from(peer % 4)
}

/// Display name for a generated peer.
#[must_use]
pub fn peer_user_name(peer: u8) -> String {
    format!("peer-{}", peer % 4)
}

/// Sender attributed to a history row, derived from its id.
#[must_use]
pub fn history_sender(id: MessageId) -> (UserId, String) {
    (PEER_ID_BASE + id % 4, format!("peer-{}", id % 4))
}

/// Content of a history row, derived from its id.
#[must_use]
pub fn history_content(id: MessageId) -> String {
    format!("history {id}")
}

/// A broker-side view of one delivered or confirmed message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Broker-assigned id.
    pub id: MessageId,
    /// Author.
    pub sender_id: UserId,
    /// Author display name.
    pub sender_name: String,
    /// Body.
    pub content: String,
}

/// A deterministic history page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryPage {
    /// Rows, oldest first.
    pub rows: Vec<Delivery>,
    /// Whether older rows remain.
    pub has_more: bool,
    /// Total messages the broker claims for the conversation.
    pub total: u64,
}

/// The broker's id assignment, shared by both worlds.
///
/// Both the model and the driver of the real engine hold one of these and
/// advance it in lockstep, so the ids they produce for the same operation
/// sequence are identical.
#[derive(Debug, Clone, Default)]
pub struct ModelBroker {
    next_ids: BTreeMap<ModelConversationId, MessageId>,
    last_deliveries: BTreeMap<ModelConversationId, Delivery>,
}

impl ModelBroker {
    /// Create a broker with no ids assigned.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(&mut self, conversation: ModelConversationId) -> MessageId {
        let next = self.next_ids.entry(conversation).or_insert(1);
        let id = *next;
        *next += 1;
        id
    }

    fn issued(&self, conversation: ModelConversationId) -> u64 {
        self.next_ids.get(&conversation).map_or(0, |next| next - 1)
    }

    /// Assign the id for a send confirmation.
    pub fn confirm_id(&mut self, conversation: ModelConversationId) -> MessageId {
        self.next_id(conversation)
    }

    /// Fan out a peer message, remembering it for duplicate re-delivery.
    pub fn deliver(
        &mut self,
        conversation: ModelConversationId,
        peer: u8,
        content: String,
    ) -> Delivery {
        let delivery = Delivery {
            id: self.next_id(conversation),
            sender_id: peer_user_id(peer),
            sender_name: peer_user_name(peer),
            content,
        };
        self.last_deliveries.insert(conversation, delivery.clone());
        delivery
    }

    /// The last fan-out message for a conversation, if any.
    #[must_use]
    pub fn last_delivery(&self, conversation: ModelConversationId) -> Option<Delivery> {
        self.last_deliveries.get(&conversation).cloned()
    }

    /// Produce a history page of fresh rows.
    ///
    /// `count` folds into 1..=8 rows; an odd count claims more history
    /// remains. Entirely deterministic so both worlds derive the same page.
    pub fn page(&mut self, conversation: ModelConversationId, count: u8) -> HistoryPage {
        let rows = (0..=usize::from(count % 8))
            .map(|_| {
                let id = self.next_id(conversation);
                let (sender_id, sender_name) = history_sender(id);
                Delivery { id, sender_id, sender_name, content: history_content(id) }
            })
            .collect();
        HistoryPage { rows, has_more: count % 2 == 1, total: self.issued(conversation) }
    }
}

/// Observable state of the whole client, in model space.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ObservableState {
    /// Foregrounded conversation.
    pub active: Option<ModelConversationId>,
    /// Conversations in id order.
    pub conversations: Vec<ConversationView>,
}

/// Observable state of one conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConversationView {
    /// Model-space conversation id.
    pub conversation: ModelConversationId,
    /// Messages in display order.
    pub messages: Vec<MessageView>,
    /// Typing peers, oldest indicator first.
    pub typing: Vec<UserId>,
    /// Unread counter.
    pub unread: u32,
    /// Whether older history remains.
    pub has_more: bool,
}

/// Observable facts about one message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MessageView {
    /// Broker id once confirmed or delivered.
    pub id: Option<MessageId>,
    /// Author.
    pub sender_id: UserId,
    /// Body.
    pub content: String,
    /// Delivery status.
    pub status: DeliveryState,
}

/// The model world: conversations, memberships, and the broker oracle.
#[derive(Debug, Clone)]
pub struct ModelWorld {
    /// The client's own user id.
    pub self_id: UserId,
    /// Broker id assignment.
    pub broker: ModelBroker,
    conversations: BTreeMap<ModelConversationId, ModelConversation>,
    joined: BTreeSet<ModelConversationId>,
    active: Option<ModelConversationId>,
}

impl ModelWorld {
    /// Create a world for a client with the given user id.
    #[must_use]
    pub fn new(self_id: UserId) -> Self {
        Self {
            self_id,
            broker: ModelBroker::new(),
            conversations: BTreeMap::new(),
            joined: BTreeSet::new(),
            active: None,
        }
    }

    /// Apply one operation.
    pub fn apply(&mut self, operation: &Operation) -> OperationResult {
        match operation {
            Operation::Join { conversation } => {
                self.joined.insert(*conversation);
                self.conversations.entry(*conversation).or_default();
                OperationResult::Ok
            },
            Operation::Leave { conversation } => {
                if !self.joined.remove(conversation) {
                    return OperationResult::Error(OperationError::NotJoined);
                }
                self.conversations.remove(conversation);
                if self.active == Some(*conversation) {
                    self.active = None;
                }
                OperationResult::Ok
            },
            Operation::Send { conversation, text } => {
                // Sending does not require membership; the conversation is
                // created on demand, exactly as the engine's store does.
                self.conversations
                    .entry(*conversation)
                    .or_default()
                    .push_send(self.self_id, text.render());
                OperationResult::Ok
            },
            Operation::ConfirmOldest { conversation } => {
                let Some(state) = self.conversations.get_mut(conversation) else {
                    return OperationResult::Ok;
                };
                let Some(tag) = state.pending.pop_front() else {
                    return OperationResult::Ok;
                };
                let id = self.broker.confirm_id(*conversation);
                state.confirm(tag, id);
                OperationResult::Ok
            },
            Operation::RejectOldest { conversation } => {
                if let Some(state) = self.conversations.get_mut(conversation)
                    && let Some(tag) = state.pending.pop_front()
                {
                    state.fail(tag);
                }
                OperationResult::Ok
            },
            Operation::RetryLatestFailed { conversation } => {
                let Some(state) = self.conversations.get_mut(conversation) else {
                    return OperationResult::Error(OperationError::NotJoined);
                };
                match state.retry_latest_failed() {
                    Some(_) => OperationResult::Ok,
                    None => OperationResult::Error(OperationError::NotRetryable),
                }
            },
            Operation::DeliverPeer { conversation, peer, text } => {
                let delivery = self.broker.deliver(*conversation, *peer, text.render());
                self.accept_delivery(*conversation, &delivery);
                OperationResult::Ok
            },
            Operation::RedeliverLast { conversation } => {
                if let Some(delivery) = self.broker.last_delivery(*conversation) {
                    self.accept_delivery(*conversation, &delivery);
                }
                OperationResult::Ok
            },
            Operation::LoadHistory { conversation, count } => {
                let page = self.broker.page(*conversation, *count);
                let state = self.conversations.entry(*conversation).or_default();
                state.replace_history(
                    page.rows.iter().map(|row| (row.id, row.sender_id, row.content.clone())),
                    page.has_more,
                );
                OperationResult::Ok
            },
            Operation::SetActive { conversation } => {
                self.active = *conversation;
                if let Some(id) = conversation
                    && let Some(state) = self.conversations.get_mut(id)
                {
                    state.unread = 0;
                }
                OperationResult::Ok
            },
            Operation::MarkRead { conversation } => {
                if let Some(state) = self.conversations.get_mut(conversation) {
                    state.unread = 0;
                }
                OperationResult::Ok
            },
            Operation::PeerTyping { conversation, peer, is_typing } => {
                // Typing is ephemeral: it never creates conversation state.
                let Some(state) = self.conversations.get_mut(conversation) else {
                    return OperationResult::Ok;
                };
                let user_id = peer_user_id(*peer);
                if *is_typing {
                    if !state.typing.contains(&user_id) {
                        state.typing.push(user_id);
                    }
                } else {
                    state.typing.retain(|typing| *typing != user_id);
                }
                OperationResult::Ok
            },
        }
    }

    /// Apply a fan-out message, bumping unread if the conversation is not
    /// in the foreground.
    fn accept_delivery(&mut self, conversation: ModelConversationId, delivery: &Delivery) {
        let state = self.conversations.entry(conversation).or_default();
        let applied = state.deliver(delivery.id, delivery.sender_id, delivery.content.clone());
        if applied && self.active != Some(conversation) {
            state.unread += 1;
        }
    }

    /// The state an application could observe.
    #[must_use]
    pub fn observable_state(&self) -> ObservableState {
        ObservableState {
            active: self.active,
            conversations: self
                .conversations
                .iter()
                .map(|(id, state)| ConversationView {
                    conversation: *id,
                    messages: state
                        .messages
                        .iter()
                        .map(|message| MessageView {
                            id: message.id,
                            sender_id: message.sender_id,
                            content: message.content.clone(),
                            status: message.status,
                        })
                        .collect(),
                    typing: state.typing.clone(),
                    unread: state.unread,
                    has_more: state.has_more,
                })
                .collect(),
        }
    }
}
