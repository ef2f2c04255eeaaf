//! Operations driving the model and real worlds.

use arbitrary::Arbitrary;

/// Conversation id in model space.
///
/// Uses `u8` to keep the operation space small enough that generated
/// sequences collide on the same conversations; mapped to the real `u128`
/// id space via [`super::world::real_conversation_id`].
pub type ModelConversationId = u8;

/// Compact deterministic message content.
///
/// Two bytes expand to a printable string, so generated operations stay
/// small while still exercising distinct contents and lengths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Arbitrary)]
pub struct SmallText {
    /// Seed byte selecting the characters.
    pub seed: u8,
    /// Length class: 1, 8, 64, or 256 characters.
    pub size_class: u8,
}

impl SmallText {
    /// Expand into the message content.
    #[must_use]
    pub fn render(&self) -> String {
        let len: usize = match self.size_class % 4 {
            0 => 1,
            1 => 8,
            2 => 64,
            _ => 256,
        };
        (0..len).map(|i| char::from(b'a' + self.seed.wrapping_add(i as u8) % 26)).collect()
    }
}

/// A single operation against a chat client.
///
/// Each variant maps to one engine event (or one broker frame) in the
/// real world and one state transition in the model.
#[derive(Debug, Clone, Arbitrary)]
pub enum Operation {
    /// Join a conversation; the broker acknowledges immediately.
    Join {
        /// Conversation to join.
        conversation: ModelConversationId,
    },

    /// Leave a conversation, dropping its local state.
    Leave {
        /// Conversation to leave.
        conversation: ModelConversationId,
    },

    /// Send a message; it stays unconfirmed until a later
    /// [`Operation::ConfirmOldest`] or [`Operation::RejectOldest`].
    Send {
        /// Target conversation.
        conversation: ModelConversationId,
        /// Message content.
        text: SmallText,
    },

    /// Broker confirms the oldest unanswered send in a conversation.
    ConfirmOldest {
        /// Conversation whose send to confirm.
        conversation: ModelConversationId,
    },

    /// Broker rejects the oldest unanswered send in a conversation.
    RejectOldest {
        /// Conversation whose send to reject.
        conversation: ModelConversationId,
    },

    /// Retry the most recently failed message.
    RetryLatestFailed {
        /// Conversation holding the failed message.
        conversation: ModelConversationId,
    },

    /// Broker fans out a message from another participant.
    DeliverPeer {
        /// Conversation receiving the message.
        conversation: ModelConversationId,
        /// Which peer sent it (mapped to a stable user id).
        peer: u8,
        /// Message content.
        text: SmallText,
    },

    /// Broker re-sends the last fan-out message (duplicate delivery).
    RedeliverLast {
        /// Conversation receiving the duplicate.
        conversation: ModelConversationId,
    },

    /// Fetch a history page; the broker responds with fresh messages that
    /// replace the conversation's list wholesale.
    LoadHistory {
        /// Conversation to load.
        conversation: ModelConversationId,
        /// Requested page size (folded into 1..=8 rows).
        count: u8,
    },

    /// Change the foregrounded conversation.
    SetActive {
        /// New focus, or none.
        conversation: Option<ModelConversationId>,
    },

    /// Mark a conversation read.
    MarkRead {
        /// Conversation to mark.
        conversation: ModelConversationId,
    },

    /// A peer's typing indicator turns on or off.
    PeerTyping {
        /// Conversation being typed in.
        conversation: ModelConversationId,
        /// Which peer (mapped to a stable user id).
        peer: u8,
        /// True to start typing, false to stop.
        is_typing: bool,
    },
}

/// Outcome of applying an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationResult {
    /// The operation applied (possibly as a no-op).
    Ok,
    /// The operation was rejected.
    Error(OperationError),
}

impl OperationResult {
    /// True when the operation applied.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok)
    }

    /// True when the operation was rejected.
    #[must_use]
    pub fn is_err(&self) -> bool {
        !self.is_ok()
    }
}

/// Why an operation was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationError {
    /// The conversation has no local state to operate on.
    NotJoined,
    /// No failed message was available to retry.
    NotRetryable,
}
