//! Chat data model shared between the wire protocol and client state.
//!
//! `ChatMessage` travels inside `MessageSent`, `NewMessage`, and
//! `MessagesLoaded` payloads and is also the unit the conversation store
//! holds, so it lives here rather than in the client crate.

use serde::{Deserialize, Serialize};

/// 128-bit conversation identifier (UUID).
pub type ConversationId = u128;

/// Broker-assigned message identifier. Unique within a conversation.
pub type MessageId = u64;

/// Client-assigned correlation id for optimistic sends.
///
/// Generated from the client's entropy source at send time; the sole key
/// correlating an outbound send with its eventual confirmation or failure.
pub type OptimisticId = u64;

/// Stable user identifier.
pub type UserId = u64;

/// Message content category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// Plain text content.
    Text,
    /// File attachment reference.
    File,
    /// Image attachment reference.
    Image,
    /// Broker-generated notice (member joined, etc.).
    System,
}

/// Delivery status of a chat message.
///
/// Client-originated messages walk `Sending -> Sent | Failed`; a `Failed`
/// message can re-enter `Sending` on retry. Broker-originated messages
/// arrive directly in `Delivered`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryState {
    /// Optimistically shown, not yet confirmed by the broker.
    Sending,
    /// Confirmed by the broker.
    Sent,
    /// Delivered to recipients.
    Delivered,
    /// Rejected by the broker or timed out unconfirmed.
    Failed,
}

impl DeliveryState {
    /// True while the message still awaits a broker verdict.
    #[must_use]
    pub const fn is_pending(self) -> bool {
        matches!(self, Self::Sending)
    }
}

/// A single chat message.
///
/// # Invariants
///
/// - `id == None` implies `status` is `Sending` or `Failed`.
/// - `id == Some(_)` implies `status` is `Sent` or `Delivered`.
/// - Client-originated messages always carry an `optimistic_id`.
///
/// The conversation store's mutators preserve these; the wire does not
/// enforce them, so inbound messages are normalized at the engine boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Broker-assigned id. Absent until confirmation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<MessageId>,

    /// Client correlation id. Absent on broker-originated messages.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub optimistic_id: Option<OptimisticId>,

    /// Conversation this message belongs to.
    pub conversation_id: ConversationId,

    /// Author's user id.
    pub sender_id: UserId,

    /// Author's display name (denormalized for display without a lookup).
    pub sender_name: String,

    /// Author's avatar URL, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sender_avatar: Option<String>,

    /// Content category.
    pub kind: MessageKind,

    /// Message body. For `File`/`Image` kinds this is the attachment URL.
    pub content: String,

    /// Creation time in Unix milliseconds.
    pub timestamp: u64,

    /// Current delivery status.
    pub status: DeliveryState,
}

impl ChatMessage {
    /// True once the broker has assigned a final id.
    #[must_use]
    pub const fn is_confirmed(&self) -> bool {
        self.id.is_some()
    }

    /// Whether the id/status invariant holds for this message.
    ///
    /// Used by debug assertions and the test harness; the store never
    /// produces a message violating it.
    #[must_use]
    pub const fn status_consistent(&self) -> bool {
        match self.status {
            DeliveryState::Sending | DeliveryState::Failed => self.id.is_none(),
            DeliveryState::Sent | DeliveryState::Delivered => self.id.is_some(),
        }
    }
}
