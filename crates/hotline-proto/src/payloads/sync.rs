//! Broker-to-client synchronization event payloads.
//!
//! These drive the client's inbound reconciliation: send confirmations and
//! failures correlated by optimistic id, new-message fan-out, history pages,
//! and typing state changes. The affected conversation id rides in the
//! frame header.

use serde::{Deserialize, Serialize};

use crate::types::{ChatMessage, OptimisticId, UserId};

/// Send confirmation. The carried message is final: broker id assigned,
/// status `Sent`, broker timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageSent {
    /// Correlation id from the original `SendMessage`.
    pub optimistic_id: OptimisticId,

    /// The confirmed message, replacing the optimistic copy in place.
    pub message: ChatMessage,
}

/// Send rejection. The optimistic copy stays in the conversation with
/// status `Failed` so the user can retry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageFailed {
    /// Correlation id from the original `SendMessage`.
    pub optimistic_id: OptimisticId,

    /// Human-readable rejection reason.
    pub error: String,
}

/// Message originated by another participant (or another device).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMessage {
    /// The delivered message, broker id assigned.
    pub message: ChatMessage,
}

/// History page response to `GetMessages`.
///
/// Pages are authoritative: the client replaces its message list wholesale
/// rather than merging, so ordering inside the page is the broker's.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessagesLoaded {
    /// The page, oldest first.
    pub messages: Vec<ChatMessage>,

    /// Whether older messages exist beyond this page.
    pub has_more: bool,

    /// Cursor for fetching the next page, absent on the last page.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cursor: Option<String>,

    /// Total messages in the conversation.
    pub total: u64,
}

/// History request rejection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetMessagesError {
    /// Human-readable rejection reason.
    pub error: String,
}

/// Remote participant typing state change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserTyping {
    /// The participant whose state changed.
    pub user_id: UserId,

    /// Their display name (denormalized for rendering).
    pub user_name: String,

    /// True to add/refresh the typing entry, false to remove it.
    pub is_typing: bool,
}
