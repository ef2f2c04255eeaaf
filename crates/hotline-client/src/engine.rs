//! Synchronization engine.
//!
//! The `Engine` is the top-level state machine: it owns the conversation
//! store, the reconnection supervisor, and the pending-request registry,
//! and turns [`EngineEvent`]s into [`EngineAction`]s. It performs no I/O;
//! the runtime (or a simulation harness) executes the actions and feeds
//! transport feedback and ticks back in.
//!
//! The reconciliation rules live here: optimistic sends are appended
//! before any network action, confirmations replace in place by
//! `optimistic_id`, deliveries deduplicate by server id, and history pages
//! wholesale-replace a conversation's message list.

use std::{collections::HashSet, time::Duration};

use hotline_core::{
    env::Environment,
    reconnect::{
        ConnectionStatus, ReconnectConfig, ReconnectSupervisor, SupervisorAction, SupervisorPhase,
    },
    store::{Conversation, ConversationStore, TypingUser},
};
use hotline_proto::{
    ChatMessage, ConversationId, DeliveryState, ErrorPayload, Frame, FrameHeader, MessageId,
    MessageKind, OptimisticId, Payload, UserId,
    payloads::{chat, session, sync},
};

use crate::{
    error::EngineError,
    event::{EngineAction, EngineEvent, EngineNotice},
    pending::{PendingRequests, RequestKind},
};

/// Timeout for join acknowledgments (10 seconds).
pub const DEFAULT_JOIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Timeout for history fetches (15 seconds).
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(15);

/// Timeout for send confirmations (10 seconds).
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(10);

/// Typing indicator lifetime without a refresh (15 seconds).
pub const DEFAULT_TYPING_TTL: Duration = Duration::from_secs(15);

/// Client identity.
///
/// Sent during the handshake and stamped into every outbound frame header;
/// also the source of sender fields on optimistic messages.
#[derive(Debug, Clone)]
pub struct ClientIdentity {
    /// Stable user id used in frame headers.
    pub user_id: UserId,
    /// Display name other participants see.
    pub display_name: String,
    /// Avatar URL, if any.
    pub avatar_url: Option<String>,
}

impl ClientIdentity {
    /// Create a new identity with the given user id and display name.
    pub fn new(user_id: UserId, display_name: impl Into<String>) -> Self {
        Self { user_id, display_name: display_name.into(), avatar_url: None }
    }

    /// Attach an avatar URL.
    #[must_use]
    pub fn with_avatar(mut self, url: impl Into<String>) -> Self {
        self.avatar_url = Some(url.into());
        self
    }
}

/// Engine tuning knobs.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// How long a join waits for its acknowledgment.
    pub join_timeout: Duration,
    /// How long a history fetch waits for its page.
    pub fetch_timeout: Duration,
    /// How long a send waits for confirmation before failing in place.
    pub send_timeout: Duration,
    /// How long a typing indicator lives without a refresh.
    pub typing_ttl: Duration,
    /// Connection lifecycle tuning.
    pub reconnect: ReconnectConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            join_timeout: DEFAULT_JOIN_TIMEOUT,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            send_timeout: DEFAULT_SEND_TIMEOUT,
            typing_ttl: DEFAULT_TYPING_TTL,
            reconnect: ReconnectConfig::default(),
        }
    }
}

/// Chat synchronization engine.
///
/// One engine serves one user session across any number of conversations
/// and transport generations. Feed it [`EngineEvent`]s, execute the
/// [`EngineAction`]s it returns.
pub struct Engine<E: Environment> {
    /// Environment for randomness and timing.
    env: E,

    /// Client identity.
    identity: ClientIdentity,

    /// Tuning knobs.
    config: EngineConfig,

    /// Connection lifecycle state machine.
    supervisor: ReconnectSupervisor<E::Instant>,

    /// Per-conversation state.
    store: ConversationStore,

    /// Requests awaiting broker replies.
    pending: PendingRequests<E::Instant>,

    /// Desired conversation memberships.
    ///
    /// Survives reconnects: every entry is re-joined after each handshake.
    joined: HashSet<ConversationId>,

    /// Most recent broker session, kept for resume across outages.
    ///
    /// Cleared on explicit disconnect; an involuntary drop keeps it so the
    /// next `Hello` can ask the broker to replay missed traffic.
    session: Option<u64>,
}

impl<E: Environment> Engine<E> {
    /// Create a new engine with the given identity and configuration.
    pub fn new(env: E, identity: ClientIdentity, config: EngineConfig) -> Self {
        let now = env.now();
        let supervisor = ReconnectSupervisor::new(now, config.reconnect.clone());
        Self {
            env,
            identity,
            config,
            supervisor,
            store: ConversationStore::new(),
            pending: PendingRequests::new(),
            joined: HashSet::new(),
            session: None,
        }
    }

    /// Client's stable user id used in frame headers.
    pub fn user_id(&self) -> UserId {
        self.identity.user_id
    }

    /// Current connection status snapshot.
    pub fn status(&self) -> ConnectionStatus {
        self.supervisor.status()
    }

    /// Broker session id available for resume. `None` before the first
    /// handshake and after an explicit disconnect.
    pub fn session_id(&self) -> Option<u64> {
        self.session
    }

    /// Whether the engine holds a membership for a conversation.
    pub fn is_joined(&self, conversation_id: ConversationId) -> bool {
        self.joined.contains(&conversation_id)
    }

    /// Local state for a conversation. `None` if never seen.
    pub fn conversation(&self, conversation_id: ConversationId) -> Option<&Conversation> {
        self.store.get(conversation_id)
    }

    /// Full conversation state, for snapshots.
    pub fn store(&self) -> &ConversationStore {
        &self.store
    }

    /// Process an event and produce actions.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] only for caller mistakes (operating on
    /// state that does not exist) and for outbound frame construction
    /// failures. Inbound broker traffic never errors; malformed or
    /// unexpected frames are dropped with a `Log` action.
    pub fn handle(
        &mut self,
        event: EngineEvent<E::Instant>,
    ) -> Result<Vec<EngineAction>, EngineError> {
        match event {
            EngineEvent::Connect => self.handle_connect(),
            EngineEvent::Disconnect => self.handle_disconnect(),
            EngineEvent::JoinConversation { conversation_id } => {
                self.handle_join_conversation(conversation_id)
            },
            EngineEvent::LeaveConversation { conversation_id } => {
                self.handle_leave_conversation(conversation_id)
            },
            EngineEvent::SetActiveConversation { conversation_id } => {
                Ok(self.handle_set_active(conversation_id))
            },
            EngineEvent::SendMessage { conversation_id, kind, content } => {
                self.handle_send_message(conversation_id, kind, content)
            },
            EngineEvent::RetryMessage { conversation_id, optimistic_id } => {
                self.handle_retry_message(conversation_id, optimistic_id)
            },
            EngineEvent::FetchMessages { conversation_id, limit, before, after } => {
                self.handle_fetch_messages(conversation_id, limit, before, after)
            },
            EngineEvent::SetTyping { conversation_id, is_typing } => {
                self.handle_set_typing(conversation_id, is_typing)
            },
            EngineEvent::MarkRead { conversation_id, message_id } => {
                self.handle_mark_read(conversation_id, message_id)
            },
            EngineEvent::Reset => self.handle_reset(),
            EngineEvent::TransportOpened => self.handle_transport_opened(),
            EngineEvent::DialFailed { reason } => self.handle_transport_closed(Some(reason)),
            EngineEvent::TransportClosed { reason } => self.handle_transport_closed(reason),
            EngineEvent::FrameReceived(frame) => self.handle_frame(&frame),
            EngineEvent::Tick { now } => self.handle_tick(now),
        }
    }

    fn handle_connect(&mut self) -> Result<Vec<EngineAction>, EngineError> {
        let supervisor_actions = self.supervisor.connect(self.env.now());
        let mut actions = Vec::new();
        self.map_supervisor_actions(supervisor_actions, &mut actions)?;
        Ok(actions)
    }

    fn handle_disconnect(&mut self) -> Result<Vec<EngineAction>, EngineError> {
        let mut actions = Vec::new();
        if self.supervisor.phase() == SupervisorPhase::Connected {
            let goodbye = Payload::Goodbye(session::Goodbye {
                reason: "client disconnect".to_string(),
            });
            actions.push(EngineAction::Send(self.frame(0, goodbye)?));
        }

        let supervisor_actions = self.supervisor.disconnect(self.env.now());
        self.session = None;
        self.map_supervisor_actions(supervisor_actions, &mut actions)?;
        Ok(actions)
    }

    fn handle_join_conversation(
        &mut self,
        conversation_id: ConversationId,
    ) -> Result<Vec<EngineAction>, EngineError> {
        self.joined.insert(conversation_id);
        self.store.upsert(conversation_id);
        self.pending.register_join(conversation_id, self.env.now());

        Ok(vec![EngineAction::Send(self.frame(conversation_id, Payload::JoinConversation)?)])
    }

    fn handle_leave_conversation(
        &mut self,
        conversation_id: ConversationId,
    ) -> Result<Vec<EngineAction>, EngineError> {
        if !self.joined.remove(&conversation_id) {
            return Err(EngineError::NotJoined { conversation_id });
        }

        self.store.remove(conversation_id);
        self.pending.purge_conversation(conversation_id);

        Ok(vec![
            EngineAction::Send(self.frame(conversation_id, Payload::LeaveConversation)?),
            EngineAction::Notify(EngineNotice::ConversationLeft { conversation_id }),
        ])
    }

    fn handle_set_active(&mut self, conversation_id: Option<ConversationId>) -> Vec<EngineAction> {
        let mut actions = Vec::new();
        if let Some(id) = conversation_id
            && self.store.get(id).is_some_and(|conversation| conversation.unread() > 0)
        {
            actions.push(EngineAction::Notify(EngineNotice::UnreadChanged {
                conversation_id: id,
                unread: 0,
            }));
        }
        self.store.set_active(conversation_id);
        actions
    }

    fn handle_send_message(
        &mut self,
        conversation_id: ConversationId,
        kind: MessageKind,
        content: String,
    ) -> Result<Vec<EngineAction>, EngineError> {
        let optimistic_id = self.env.random_u64();
        let message = ChatMessage {
            id: None,
            optimistic_id: Some(optimistic_id),
            conversation_id,
            sender_id: self.identity.user_id,
            sender_name: self.identity.display_name.clone(),
            sender_avatar: self.identity.avatar_url.clone(),
            kind,
            content: content.clone(),
            timestamp: self.env.wall_clock_millis(),
            status: DeliveryState::Sending,
        };

        // The optimistic append happens before any I/O action; even with no
        // transport the message appears, and the registry sweep fails it in
        // place if confirmation never comes.
        self.store.upsert(conversation_id).push(message.clone());
        self.pending.register_send(conversation_id, optimistic_id, self.env.now());

        let frame = self.frame(
            conversation_id,
            Payload::SendMessage(chat::SendMessage { optimistic_id, kind, content }),
        )?;

        Ok(vec![
            EngineAction::Notify(EngineNotice::MessageQueued { conversation_id, message }),
            EngineAction::Send(frame),
        ])
    }

    fn handle_retry_message(
        &mut self,
        conversation_id: ConversationId,
        optimistic_id: OptimisticId,
    ) -> Result<Vec<EngineAction>, EngineError> {
        let conversation = self
            .store
            .get_mut(conversation_id)
            .ok_or(EngineError::NotJoined { conversation_id })?;
        let message = conversation
            .retry(optimistic_id)
            .ok_or(EngineError::MessageNotRetryable { conversation_id, optimistic_id })?;

        // Same optimistic id on the wire: a late confirmation of the first
        // attempt still reconciles against this message.
        self.pending.register_send(conversation_id, optimistic_id, self.env.now());

        let frame = self.frame(
            conversation_id,
            Payload::SendMessage(chat::SendMessage {
                optimistic_id,
                kind: message.kind,
                content: message.content.clone(),
            }),
        )?;

        Ok(vec![
            EngineAction::Notify(EngineNotice::MessageQueued { conversation_id, message }),
            EngineAction::Send(frame),
        ])
    }

    fn handle_fetch_messages(
        &mut self,
        conversation_id: ConversationId,
        limit: Option<u32>,
        before: Option<String>,
        after: Option<String>,
    ) -> Result<Vec<EngineAction>, EngineError> {
        self.store.upsert(conversation_id).set_loading(true);
        self.pending.register_fetch(conversation_id, self.env.now());

        let frame = self.frame(
            conversation_id,
            Payload::GetMessages(chat::GetMessages { limit, before, after }),
        )?;

        Ok(vec![EngineAction::Send(frame)])
    }

    fn handle_set_typing(
        &mut self,
        conversation_id: ConversationId,
        is_typing: bool,
    ) -> Result<Vec<EngineAction>, EngineError> {
        let payload = if is_typing { Payload::TypingStart } else { Payload::TypingStop };
        Ok(vec![EngineAction::Send(self.frame(conversation_id, payload)?)])
    }

    fn handle_mark_read(
        &mut self,
        conversation_id: ConversationId,
        message_id: MessageId,
    ) -> Result<Vec<EngineAction>, EngineError> {
        let frame =
            self.frame(conversation_id, Payload::MarkRead(chat::MarkRead { message_id }))?;
        let mut actions = vec![EngineAction::Send(frame)];

        if let Some(conversation) = self.store.get_mut(conversation_id)
            && conversation.unread() > 0
        {
            conversation.clear_unread();
            actions.push(EngineAction::Notify(EngineNotice::UnreadChanged {
                conversation_id,
                unread: 0,
            }));
        }

        Ok(actions)
    }

    fn handle_reset(&mut self) -> Result<Vec<EngineAction>, EngineError> {
        let supervisor_actions = self.supervisor.disconnect(self.env.now());
        self.session = None;
        self.store.reset();
        self.joined.clear();
        self.pending = PendingRequests::new();

        let mut actions = Vec::new();
        self.map_supervisor_actions(supervisor_actions, &mut actions)?;
        Ok(actions)
    }

    fn handle_transport_opened(&mut self) -> Result<Vec<EngineAction>, EngineError> {
        let supervisor_actions = self.supervisor.transport_opened(self.env.now());
        let mut actions = Vec::new();
        self.map_supervisor_actions(supervisor_actions, &mut actions)?;
        Ok(actions)
    }

    fn handle_transport_closed(
        &mut self,
        reason: Option<String>,
    ) -> Result<Vec<EngineAction>, EngineError> {
        let supervisor_actions = self.supervisor.transport_closed(reason, self.env.now());
        let mut actions = Vec::new();
        self.map_supervisor_actions(supervisor_actions, &mut actions)?;
        Ok(actions)
    }

    fn handle_frame(&mut self, frame: &Frame) -> Result<Vec<EngineAction>, EngineError> {
        self.supervisor.activity(self.env.now());

        let payload = match Payload::from_frame(frame) {
            Ok(payload) => payload,
            Err(err) => {
                return Ok(vec![EngineAction::Log {
                    message: format!("dropping undecodable frame: {err}"),
                }]);
            },
        };

        let opcode = payload.opcode();
        match payload {
            Payload::HelloReply(reply) => self.handle_hello_reply(reply.session_id),
            Payload::Ping => Ok(vec![EngineAction::Send(self.frame(0, Payload::Pong)?)]),
            Payload::Pong => Ok(vec![]),
            Payload::Goodbye(goodbye) => Ok(vec![EngineAction::Log {
                message: format!("broker goodbye: {}", goodbye.reason),
            }]),
            Payload::JoinedConversation => Ok(self.handle_join_ack(frame)),
            Payload::MessageSent(confirmation) => Ok(self.handle_message_sent(confirmation)),
            Payload::MessageFailed(failure) => Ok(self.handle_message_failed(frame, failure)),
            Payload::NewMessage(delivery) => Ok(self.handle_new_message(frame, delivery.message)),
            Payload::MessagesLoaded(page) => Ok(self.handle_messages_loaded(frame, page)),
            Payload::GetMessagesError(failure) => {
                Ok(self.handle_get_messages_error(frame, failure.error))
            },
            Payload::UserTyping(typing) => Ok(self.handle_user_typing(frame, typing)),
            Payload::Error(error) => self.handle_error_frame(frame, error),
            Payload::Hello(_)
            | Payload::SendMessage(_)
            | Payload::GetMessages(_)
            | Payload::MarkRead(_)
            | Payload::JoinConversation
            | Payload::LeaveConversation
            | Payload::TypingStart
            | Payload::TypingStop => Ok(vec![EngineAction::Log {
                message: format!("dropping client-bound frame {opcode:?}"),
            }]),
        }
    }

    fn handle_hello_reply(&mut self, session_id: u64) -> Result<Vec<EngineAction>, EngineError> {
        let now = self.env.now();
        let resumed = self.session.is_some();

        match self.supervisor.handshake_complete(session_id, now) {
            Ok(supervisor_actions) => {
                self.session = Some(session_id);

                let mut actions = Vec::new();
                self.map_supervisor_actions(supervisor_actions, &mut actions)?;
                if resumed {
                    actions.push(EngineAction::Notify(EngineNotice::Resynchronize));
                }

                // Re-establish every desired membership on the new session.
                // Sorted so a simulated run replays identically.
                let mut rejoin: Vec<ConversationId> = self.joined.iter().copied().collect();
                rejoin.sort_unstable();
                for conversation_id in rejoin {
                    if !self.pending.contains(RequestKind::Join, conversation_id) {
                        self.pending.register_join(conversation_id, now);
                    }
                    actions.push(EngineAction::Send(
                        self.frame(conversation_id, Payload::JoinConversation)?,
                    ));
                }

                Ok(actions)
            },
            Err(err) => Ok(vec![EngineAction::Log {
                message: format!("ignoring unexpected handshake reply: {err}"),
            }]),
        }
    }

    fn handle_join_ack(&mut self, frame: &Frame) -> Vec<EngineAction> {
        let conversation_id = frame.header.conversation_id();
        if self.pending.resolve(RequestKind::Join, conversation_id).is_some() {
            vec![EngineAction::Notify(EngineNotice::ConversationJoined { conversation_id })]
        } else {
            vec![EngineAction::Log {
                message: format!("unsolicited join ack for conversation {conversation_id:032x}"),
            }]
        }
    }

    fn handle_message_sent(&mut self, confirmation: sync::MessageSent) -> Vec<EngineAction> {
        let sync::MessageSent { optimistic_id, message } = confirmation;
        self.pending.resolve_send(optimistic_id);

        if !message.is_confirmed() {
            return vec![EngineAction::Log {
                message: format!("dropping confirmation without server id for {optimistic_id}"),
            }];
        }

        let conversation_id = message.conversation_id;
        let Some(conversation) = self.store.get_mut(conversation_id) else {
            return vec![EngineAction::Log {
                message: format!(
                    "dropping confirmation for unknown conversation {conversation_id:032x}"
                ),
            }];
        };

        // A confirmation after the sweep already flipped the message to
        // failed still lands: the send did reach the broker.
        if conversation.confirm(optimistic_id, message.clone()) {
            vec![
                EngineAction::CacheMessage(message.clone()),
                EngineAction::Notify(EngineNotice::MessageConfirmed {
                    conversation_id,
                    optimistic_id,
                    message,
                }),
            ]
        } else {
            vec![EngineAction::Log {
                message: format!("dropping confirmation for unknown send {optimistic_id}"),
            }]
        }
    }

    fn handle_message_failed(
        &mut self,
        frame: &Frame,
        failure: sync::MessageFailed,
    ) -> Vec<EngineAction> {
        let sync::MessageFailed { optimistic_id, error } = failure;
        let entry = self.pending.resolve_send(optimistic_id);
        let conversation_id =
            entry.map_or(frame.header.conversation_id(), |entry| entry.conversation_id);

        let Some(conversation) = self.store.get_mut(conversation_id) else {
            return vec![EngineAction::Log {
                message: format!(
                    "dropping send failure for unknown conversation {conversation_id:032x}"
                ),
            }];
        };

        if conversation.fail(optimistic_id) {
            vec![EngineAction::Notify(EngineNotice::MessageFailed {
                conversation_id,
                optimistic_id,
                error,
            })]
        } else {
            vec![EngineAction::Log {
                message: format!("dropping send failure for settled message {optimistic_id}"),
            }]
        }
    }

    fn handle_new_message(&mut self, frame: &Frame, message: ChatMessage) -> Vec<EngineAction> {
        let conversation_id = message.conversation_id;
        let is_active = self.store.active() == Some(conversation_id);
        let is_own = message.sender_id == self.identity.user_id;
        let replay = frame.header.flags().replay;

        let conversation = self.store.upsert(conversation_id);
        if !conversation.insert_delivered(message.clone()) {
            // Same server id already present: idempotent re-delivery.
            return vec![];
        }

        let mut actions = vec![
            EngineAction::CacheMessage(message.clone()),
            EngineAction::Notify(EngineNotice::MessageReceived { conversation_id, message }),
        ];

        if !is_active && !is_own && !replay {
            conversation.increment_unread();
            actions.push(EngineAction::Notify(EngineNotice::UnreadChanged {
                conversation_id,
                unread: conversation.unread(),
            }));
        }

        actions
    }

    fn handle_messages_loaded(
        &mut self,
        frame: &Frame,
        page: sync::MessagesLoaded,
    ) -> Vec<EngineAction> {
        let conversation_id = frame.header.conversation_id();
        if self.pending.resolve(RequestKind::Fetch, conversation_id).is_none() {
            // Post-timeout straggler or unsolicited page; the handler was
            // already detached, so the page must not apply.
            return vec![EngineAction::Log {
                message: format!(
                    "dropping unsolicited history page for conversation {conversation_id:032x}"
                ),
            }];
        }

        let Some(conversation) = self.store.get_mut(conversation_id) else {
            return vec![EngineAction::Log {
                message: format!(
                    "dropping history page for unknown conversation {conversation_id:032x}"
                ),
            }];
        };

        let sync::MessagesLoaded { messages, has_more, cursor, total } = page;
        let count = messages.len();
        conversation.replace_history(messages.clone(), has_more, cursor);

        vec![
            EngineAction::CacheBatch { conversation_id, messages },
            EngineAction::Notify(EngineNotice::HistoryLoaded {
                conversation_id,
                count,
                has_more,
                total,
            }),
        ]
    }

    fn handle_get_messages_error(&mut self, frame: &Frame, error: String) -> Vec<EngineAction> {
        let conversation_id = frame.header.conversation_id();
        if self.pending.resolve(RequestKind::Fetch, conversation_id).is_none() {
            return vec![EngineAction::Log {
                message: format!(
                    "dropping unsolicited history error for conversation {conversation_id:032x}"
                ),
            }];
        }

        if let Some(conversation) = self.store.get_mut(conversation_id) {
            conversation.set_loading(false);
        }

        vec![EngineAction::Notify(EngineNotice::HistoryFailed { conversation_id, error })]
    }

    fn handle_user_typing(&mut self, frame: &Frame, typing: sync::UserTyping) -> Vec<EngineAction> {
        let sync::UserTyping { user_id, user_name, is_typing } = typing;
        if user_id == self.identity.user_id {
            // Own typing echo; the local user never sees their own
            // indicator.
            return vec![];
        }

        let conversation_id = frame.header.conversation_id();
        let since = self.env.wall_clock_millis();

        // Typing is ephemeral and never creates conversation state.
        let Some(conversation) = self.store.get_mut(conversation_id) else {
            return vec![];
        };

        if conversation.set_typing(TypingUser { user_id, user_name, since }, is_typing) {
            vec![EngineAction::Notify(EngineNotice::TypingChanged {
                conversation_id,
                typing: conversation.typing().to_vec(),
            })]
        } else {
            vec![]
        }
    }

    fn handle_error_frame(
        &mut self,
        frame: &Frame,
        error: ErrorPayload,
    ) -> Result<Vec<EngineAction>, EngineError> {
        let conversation_id = frame.header.conversation_id();

        if conversation_id != 0 {
            if self.pending.resolve(RequestKind::Join, conversation_id).is_some() {
                // The broker rejected the membership; keeping it in the
                // desired set would re-request it on every reconnect.
                self.joined.remove(&conversation_id);
                return Ok(vec![EngineAction::Notify(EngineNotice::JoinFailed {
                    conversation_id,
                    error: error.message,
                })]);
            }

            if self.pending.resolve(RequestKind::Fetch, conversation_id).is_some() {
                if let Some(conversation) = self.store.get_mut(conversation_id) {
                    conversation.set_loading(false);
                }
                return Ok(vec![EngineAction::Notify(EngineNotice::HistoryFailed {
                    conversation_id,
                    error: error.message,
                })]);
            }

            return Ok(vec![EngineAction::Log {
                message: format!(
                    "broker error {:#06x} for conversation {conversation_id:032x}: {}",
                    error.code, error.message
                ),
            }]);
        }

        // Session-scope error during the handshake is fatal for this
        // attempt; the supervisor schedules the retry.
        if matches!(
            self.supervisor.phase(),
            SupervisorPhase::Dialing | SupervisorPhase::Handshaking
        ) {
            let mut actions = vec![EngineAction::HangUp];
            let supervisor_actions =
                self.supervisor.transport_closed(Some(error.message), self.env.now());
            self.map_supervisor_actions(supervisor_actions, &mut actions)?;
            return Ok(actions);
        }

        Ok(vec![EngineAction::Log {
            message: format!("broker error {:#06x}: {}", error.code, error.message),
        }])
    }

    fn handle_tick(&mut self, now: E::Instant) -> Result<Vec<EngineAction>, EngineError> {
        let mut actions = Vec::new();

        let supervisor_actions = self.supervisor.tick(now);
        self.map_supervisor_actions(supervisor_actions, &mut actions)?;

        for entry in self.pending.sweep(now, &self.config) {
            match entry.kind {
                RequestKind::Join => {
                    actions.push(EngineAction::Notify(EngineNotice::JoinFailed {
                        conversation_id: entry.conversation_id,
                        error: "join timed out".to_string(),
                    }));
                },
                RequestKind::Fetch => {
                    if let Some(conversation) = self.store.get_mut(entry.conversation_id) {
                        conversation.set_loading(false);
                    }
                    actions.push(EngineAction::Notify(EngineNotice::HistoryFailed {
                        conversation_id: entry.conversation_id,
                        error: "history fetch timed out".to_string(),
                    }));
                },
                RequestKind::Send => {
                    let Some(optimistic_id) = entry.optimistic_id else { continue };
                    if let Some(conversation) = self.store.get_mut(entry.conversation_id)
                        && conversation.fail(optimistic_id)
                    {
                        actions.push(EngineAction::Notify(EngineNotice::MessageFailed {
                            conversation_id: entry.conversation_id,
                            optimistic_id,
                            error: "send timed out".to_string(),
                        }));
                    }
                },
            }
        }

        let now_millis = self.env.wall_clock_millis();
        let ttl = self.config.typing_ttl;
        for (conversation_id, conversation) in self.store.conversations_mut() {
            if conversation.expire_typing(now_millis, ttl) > 0 {
                actions.push(EngineAction::Notify(EngineNotice::TypingChanged {
                    conversation_id,
                    typing: conversation.typing().to_vec(),
                }));
            }
        }

        Ok(actions)
    }

    fn map_supervisor_actions(
        &self,
        supervisor_actions: Vec<SupervisorAction>,
        actions: &mut Vec<EngineAction>,
    ) -> Result<(), EngineError> {
        for action in supervisor_actions {
            match action {
                SupervisorAction::Dial => actions.push(EngineAction::Dial),
                SupervisorAction::HangUp => actions.push(EngineAction::HangUp),
                SupervisorAction::SendHello => {
                    let hello = Payload::Hello(session::Hello {
                        protocol_version: FrameHeader::VERSION,
                        user_id: self.identity.user_id,
                        display_name: self.identity.display_name.clone(),
                        avatar_url: self.identity.avatar_url.clone(),
                        resume: self.session.is_some(),
                    });
                    actions.push(EngineAction::Send(self.frame(0, hello)?));
                },
                SupervisorAction::SendPing => {
                    actions.push(EngineAction::Send(self.frame(0, Payload::Ping)?));
                },
                SupervisorAction::StatusChanged(status) => {
                    actions.push(EngineAction::Notify(EngineNotice::StatusChanged(status)));
                },
            }
        }
        Ok(())
    }

    /// Build an outbound frame with routing context stamped in.
    fn frame(
        &self,
        conversation_id: ConversationId,
        payload: Payload,
    ) -> Result<Frame, EngineError> {
        let mut header = FrameHeader::new(payload.opcode());
        header.set_conversation_id(conversation_id);
        header.set_sender_id(self.identity.user_id);
        header.set_timestamp(self.env.wall_clock_millis());

        payload
            .into_frame(header)
            .map_err(|err| EngineError::InvalidFrame { reason: err.to_string() })
    }
}
