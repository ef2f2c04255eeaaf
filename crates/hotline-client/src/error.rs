//! Engine error types.

use hotline_proto::{ConversationId, OptimisticId};

/// Errors from [`Engine::handle`](crate::Engine::handle).
///
/// These indicate caller mistakes (operating on state that does not
/// exist). Network failures and broker rejections are not errors; they
/// surface as [`EngineNotice`](crate::EngineNotice) values so the
/// application can render them.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    /// Operation targeted a conversation the engine has not joined.
    #[error("not joined to conversation {conversation_id}")]
    NotJoined {
        /// Conversation the operation targeted.
        conversation_id: ConversationId,
    },

    /// Retry targeted a message that is not in the failed state.
    #[error("message {optimistic_id} in conversation {conversation_id} is not retryable")]
    MessageNotRetryable {
        /// Conversation holding the message.
        conversation_id: ConversationId,
        /// Optimistic id the retry targeted.
        optimistic_id: OptimisticId,
    },

    /// Outbound frame construction failed.
    #[error("invalid frame: {reason}")]
    InvalidFrame {
        /// What went wrong.
        reason: String,
    },
}
