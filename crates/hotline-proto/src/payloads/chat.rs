//! Client-to-broker chat operation payloads.
//!
//! The conversation id these operations target rides in the frame header,
//! not here. Join, leave, and typing signals carry no payload at all; the
//! opcode plus header is the whole message.

use serde::{Deserialize, Serialize};

use crate::types::{MessageId, MessageKind, OptimisticId};

/// Send a chat message.
///
/// The client shows the message optimistically before emitting this frame;
/// `optimistic_id` is the correlation key the broker echoes back in
/// `MessageSent` or `MessageFailed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendMessage {
    /// Client-generated correlation id.
    pub optimistic_id: OptimisticId,

    /// Content category.
    pub kind: MessageKind,

    /// Message body.
    pub content: String,
}

/// Request a page of conversation history.
///
/// Cursor-based pagination: `before` walks backward from a cursor returned
/// by a previous page, `after` walks forward. Both absent means "latest
/// page".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetMessages {
    /// Maximum messages to return. Broker default applies when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,

    /// Opaque cursor: return messages older than this position.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub before: Option<String>,

    /// Opaque cursor: return messages newer than this position.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub after: Option<String>,
}

/// Mark conversation messages as read up to and including `message_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkRead {
    /// Highest message id the user has seen.
    pub message_id: MessageId,
}
