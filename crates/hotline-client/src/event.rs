//! Engine events, actions, and notices.

use hotline_core::{ConnectionStatus, TypingUser};
use hotline_proto::{ChatMessage, ConversationId, Frame, MessageId, MessageKind, OptimisticId};

/// Events the caller feeds into the engine.
///
/// The caller is responsible for:
/// - Receiving frames from the transport
/// - Reporting transport lifecycle changes
/// - Driving time forward via ticks
/// - Forwarding application intents (send message, join conversation, etc.)
///
/// Generic over `I` (Instant type) to support both production
/// (`std::time::Instant`) and simulation (virtual time) environments.
#[derive(Debug, Clone)]
pub enum EngineEvent<I = std::time::Instant> {
    /// Application wants a connection to the broker.
    Connect,

    /// Application wants to disconnect and stay offline.
    Disconnect,

    /// Application wants to subscribe to a conversation's event stream.
    JoinConversation {
        /// Conversation to join.
        conversation_id: ConversationId,
    },

    /// Application wants to unsubscribe from a conversation.
    LeaveConversation {
        /// Conversation to leave.
        conversation_id: ConversationId,
    },

    /// Application changed which conversation is in the foreground.
    ///
    /// The active conversation does not accumulate unread counts.
    SetActiveConversation {
        /// Newly focused conversation, or `None` for no focus.
        conversation_id: Option<ConversationId>,
    },

    /// Application wants to send a chat message.
    ///
    /// The engine shows the message optimistically before any network
    /// round trip and assigns the optimistic id itself.
    SendMessage {
        /// Target conversation.
        conversation_id: ConversationId,
        /// Content category.
        kind: MessageKind,
        /// Message body.
        content: String,
    },

    /// Application wants to resend a failed message.
    ///
    /// The message keeps its original optimistic id, so a late
    /// confirmation of the first attempt still reconciles correctly.
    RetryMessage {
        /// Conversation holding the failed message.
        conversation_id: ConversationId,
        /// Optimistic id of the failed message.
        optimistic_id: OptimisticId,
    },

    /// Application wants a page of conversation history.
    FetchMessages {
        /// Conversation to fetch.
        conversation_id: ConversationId,
        /// Page size. Broker default applies when absent.
        limit: Option<u32>,
        /// Cursor: messages older than this position.
        before: Option<String>,
        /// Cursor: messages newer than this position.
        after: Option<String>,
    },

    /// Local user's typing state changed.
    SetTyping {
        /// Conversation being typed in.
        conversation_id: ConversationId,
        /// True when typing started, false when it stopped.
        is_typing: bool,
    },

    /// Application marked a conversation read up to a message.
    MarkRead {
        /// Conversation being marked.
        conversation_id: ConversationId,
        /// Highest message id the user has seen.
        message_id: MessageId,
    },

    /// Application wants all local state dropped.
    ///
    /// Disconnects, clears every conversation, and forgets joins. Used on
    /// logout.
    Reset,

    /// Transport reports the connection is open (before handshake).
    TransportOpened,

    /// Transport reports the connection attempt never opened.
    DialFailed {
        /// Failure reason from the dialer.
        reason: String,
    },

    /// Transport reports the connection closed or failed.
    TransportClosed {
        /// Close reason, if the transport knows one.
        reason: Option<String>,
    },

    /// Frame received from the broker.
    FrameReceived(Frame),

    /// Time tick for timeout processing.
    ///
    /// The caller should send ticks periodically to allow the engine to
    /// detect timeouts, expire typing indicators, and drive reconnection.
    Tick {
        /// Current time from the environment.
        now: I,
    },
}

/// Actions the engine produces for the caller to execute.
///
/// The engine never performs I/O; every externally visible effect is one
/// of these.
#[derive(Debug, Clone)]
pub enum EngineAction {
    /// Send a frame to the broker.
    Send(Frame),

    /// Open a transport connection.
    Dial,

    /// Tear down the transport connection, if any.
    HangUp,

    /// Write a single confirmed message to the local cache.
    CacheMessage(ChatMessage),

    /// Replace the cached history for a conversation.
    CacheBatch {
        /// Conversation whose cache to replace.
        conversation_id: ConversationId,
        /// Authoritative message list.
        messages: Vec<ChatMessage>,
    },

    /// Observable state changed; notify subscribers.
    Notify(EngineNotice),

    /// Log message for debugging.
    Log {
        /// Log message.
        message: String,
    },
}

/// State-change notifications for the application layer.
///
/// These are the engine's outward event surface: everything a UI needs to
/// re-render flows through here, already reconciled against local state.
#[derive(Debug, Clone)]
pub enum EngineNotice {
    /// Connection status changed.
    StatusChanged(ConnectionStatus),

    /// A join request was acknowledged by the broker.
    ConversationJoined {
        /// Conversation that was joined.
        conversation_id: ConversationId,
    },

    /// A join request failed or timed out.
    JoinFailed {
        /// Conversation the join targeted.
        conversation_id: ConversationId,
        /// Failure reason.
        error: String,
    },

    /// Local conversation state was dropped after leaving.
    ConversationLeft {
        /// Conversation that was left.
        conversation_id: ConversationId,
    },

    /// An optimistic message entered the conversation (initial send or
    /// retry). Emitted before the corresponding network send.
    MessageQueued {
        /// Conversation holding the message.
        conversation_id: ConversationId,
        /// The optimistic message, status `Sending`.
        message: ChatMessage,
    },

    /// An optimistic message was confirmed by the broker.
    MessageConfirmed {
        /// Conversation holding the message.
        conversation_id: ConversationId,
        /// Correlation id of the optimistic copy it replaced.
        optimistic_id: OptimisticId,
        /// The confirmed message.
        message: ChatMessage,
    },

    /// An optimistic message was rejected or timed out.
    ///
    /// The message stays in the conversation with status `Failed` and its
    /// content intact for retry.
    MessageFailed {
        /// Conversation holding the message.
        conversation_id: ConversationId,
        /// Correlation id of the failed message.
        optimistic_id: OptimisticId,
        /// Failure reason.
        error: String,
    },

    /// A message from another participant (or device) arrived.
    MessageReceived {
        /// Conversation the message belongs to.
        conversation_id: ConversationId,
        /// The delivered message.
        message: ChatMessage,
    },

    /// A history page was applied to a conversation.
    HistoryLoaded {
        /// Conversation that was loaded.
        conversation_id: ConversationId,
        /// Messages in the applied page.
        count: usize,
        /// Whether older history remains.
        has_more: bool,
        /// Total messages in the conversation, per the broker.
        total: u64,
    },

    /// A history fetch failed or timed out.
    HistoryFailed {
        /// Conversation the fetch targeted.
        conversation_id: ConversationId,
        /// Failure reason.
        error: String,
    },

    /// The set of users typing in a conversation changed.
    TypingChanged {
        /// Conversation whose typing set changed.
        conversation_id: ConversationId,
        /// Users currently typing, oldest first.
        typing: Vec<TypingUser>,
    },

    /// A conversation's unread count changed.
    UnreadChanged {
        /// Conversation whose count changed.
        conversation_id: ConversationId,
        /// New unread count.
        unread: u32,
    },

    /// A session was resumed after an outage.
    ///
    /// The broker replays missed traffic on resume, but its replay window
    /// is bounded; the application should refetch history for any
    /// conversation where a gap would matter.
    Resynchronize,
}
