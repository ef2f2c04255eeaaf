//! Async client task over the Sans-IO engine.
//!
//! [`ChatClient`] owns an [`Engine`] on a background task and exposes an
//! async handle. Commands flow in over a channel; notices fan out over a
//! broadcast channel; the task executes every engine action (frame sends,
//! dials, cache writes) against the [`Transport`] and [`CacheBridge`] it
//! was spawned with.
//!
//! Request/reply commands (join, send, fetch) are correlated with engine
//! notices by conversation id, first-come first-served. The engine itself
//! resolves one in-flight request per kind and conversation, so the FIFO
//! order here matches its reconciliation order.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use hotline_core::{
    env::{Environment, SystemEnv},
    reconnect::ConnectionStatus,
    store::Conversation,
};
use hotline_proto::{ChatMessage, ConversationId, MessageId, MessageKind, OptimisticId};
use tokio::{
    sync::{broadcast, mpsc, oneshot},
    time::{MissedTickBehavior, interval},
};

use crate::{
    cache::CacheBridge,
    engine::{ClientIdentity, Engine, EngineConfig},
    event::{EngineAction, EngineEvent, EngineNotice},
    transport::{Transport, TransportEvent},
    ws::WsTransport,
};

/// Commands buffered before callers see backpressure.
const COMMAND_CAPACITY: usize = 32;

/// Notices a slow subscriber may lag behind before losing some.
const NOTICE_CAPACITY: usize = 256;

/// How often the task ticks the engine for timeout processing.
const TICK_INTERVAL: Duration = Duration::from_millis(250);

/// Errors surfaced by [`ChatClient`] calls.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ClientError {
    /// The broker rejected the request, or it timed out in flight.
    #[error("request rejected: {reason}")]
    Rejected {
        /// Broker-supplied or locally generated reason.
        reason: String,
    },

    /// The client task has shut down.
    #[error("client closed")]
    Closed,
}

/// A history page applied to a conversation.
///
/// Returned by [`ChatClient::fetch_messages`] after the broker's page has
/// replaced the local history.
#[derive(Debug, Clone)]
pub struct HistoryPage {
    /// Conversation the page belongs to.
    pub conversation_id: ConversationId,
    /// Messages now in the conversation, oldest first.
    pub messages: Vec<ChatMessage>,
    /// Whether older history remains on the broker.
    pub has_more: bool,
    /// Total messages in the conversation, per the broker.
    pub total: u64,
}

/// Requests from the handle to the client task.
enum Command {
    Reconnect,
    Disconnect,
    Join {
        conversation_id: ConversationId,
        reply: oneshot::Sender<Result<(), ClientError>>,
    },
    Leave {
        conversation_id: ConversationId,
    },
    SetActive {
        conversation_id: Option<ConversationId>,
    },
    Send {
        conversation_id: ConversationId,
        kind: MessageKind,
        content: String,
        reply: oneshot::Sender<Result<ChatMessage, ClientError>>,
    },
    Retry {
        conversation_id: ConversationId,
        optimistic_id: OptimisticId,
    },
    Fetch {
        conversation_id: ConversationId,
        limit: Option<u32>,
        before: Option<String>,
        after: Option<String>,
        reply: oneshot::Sender<Result<HistoryPage, ClientError>>,
    },
    SetTyping {
        conversation_id: ConversationId,
        is_typing: bool,
    },
    MarkRead {
        conversation_id: ConversationId,
        message_id: MessageId,
    },
    Reset,
    Snapshot {
        conversation_id: ConversationId,
        reply: oneshot::Sender<Option<Conversation>>,
    },
    Status {
        reply: oneshot::Sender<ConnectionStatus>,
    },
}

/// Handle to a background chat client task.
///
/// Cheap to clone; all clones drive the same connection. The task shuts
/// down when the last handle is dropped.
#[derive(Debug, Clone)]
pub struct ChatClient {
    commands: mpsc::Sender<Command>,
    notices: broadcast::Sender<EngineNotice>,
}

impl ChatClient {
    /// Spawn a client over the production WebSocket transport and system
    /// clock.
    ///
    /// Connection management starts immediately and keeps retrying with
    /// backoff until [`disconnect`](ChatClient::disconnect); observe
    /// progress via [`subscribe`](ChatClient::subscribe) or
    /// [`status`](ChatClient::status).
    pub fn connect<C>(
        url: impl Into<String>,
        identity: ClientIdentity,
        config: EngineConfig,
        cache: C,
    ) -> Self
    where
        C: CacheBridge,
    {
        Self::spawn(WsTransport::new(), SystemEnv, url, identity, config, cache)
    }

    /// Spawn a client task over a custom transport and environment.
    ///
    /// Used by simulation to drive the full task with virtual time and an
    /// in-memory link.
    pub fn spawn<T, E, C>(
        transport: T,
        env: E,
        url: impl Into<String>,
        identity: ClientIdentity,
        config: EngineConfig,
        cache: C,
    ) -> Self
    where
        T: Transport + 'static,
        E: Environment,
        C: CacheBridge,
    {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CAPACITY);
        let (notice_tx, _) = broadcast::channel(NOTICE_CAPACITY);

        let task = ClientTask {
            engine: Engine::new(env.clone(), identity, config),
            env,
            transport,
            cache,
            url: url.into(),
            commands: command_rx,
            notices: notice_tx.clone(),
            waiting_joins: HashMap::new(),
            waiting_fetches: HashMap::new(),
        };
        tokio::spawn(task.run());

        Self { commands: command_tx, notices: notice_tx }
    }

    /// Subscribe to engine notices.
    ///
    /// Every state change the task observes is broadcast here. A receiver
    /// that falls too far behind loses the oldest notices.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<EngineNotice> {
        self.notices.subscribe()
    }

    /// Ask the task to resume connecting after a [`disconnect`](ChatClient::disconnect).
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Closed`] if the task has shut down.
    pub async fn reconnect(&self) -> Result<(), ClientError> {
        self.command(Command::Reconnect).await
    }

    /// Disconnect and stay offline until [`reconnect`](ChatClient::reconnect).
    ///
    /// Sends a goodbye to the broker when a session is up. Local state is
    /// kept; in-flight requests fail once their timeouts lapse.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Closed`] if the task has shut down.
    pub async fn disconnect(&self) -> Result<(), ClientError> {
        self.command(Command::Disconnect).await
    }

    /// Join a conversation and wait for the broker's acknowledgement.
    ///
    /// The membership is remembered and re-established automatically after
    /// every reconnect.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Rejected`] if the broker refuses the join or
    /// the request times out, [`ClientError::Closed`] if the task has shut
    /// down.
    pub async fn join_conversation(
        &self,
        conversation_id: ConversationId,
    ) -> Result<(), ClientError> {
        let (reply, result) = oneshot::channel();
        self.command(Command::Join { conversation_id, reply }).await?;
        result.await.map_err(|_| ClientError::Closed)?
    }

    /// Leave a conversation and drop its local state.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Closed`] if the task has shut down.
    pub async fn leave_conversation(
        &self,
        conversation_id: ConversationId,
    ) -> Result<(), ClientError> {
        self.command(Command::Leave { conversation_id }).await
    }

    /// Change which conversation is in the foreground.
    ///
    /// The active conversation does not accumulate unread counts.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Closed`] if the task has shut down.
    pub async fn set_active_conversation(
        &self,
        conversation_id: Option<ConversationId>,
    ) -> Result<(), ClientError> {
        self.command(Command::SetActive { conversation_id }).await
    }

    /// Send a message and return the optimistic copy.
    ///
    /// The returned message has status `Sending` and is already visible in
    /// the conversation; watch for `MessageConfirmed` or `MessageFailed`
    /// notices carrying its optimistic id.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Rejected`] if the conversation is not
    /// joined, [`ClientError::Closed`] if the task has shut down.
    pub async fn send_message(
        &self,
        conversation_id: ConversationId,
        kind: MessageKind,
        content: impl Into<String>,
    ) -> Result<ChatMessage, ClientError> {
        let (reply, result) = oneshot::channel();
        let command =
            Command::Send { conversation_id, kind, content: content.into(), reply };
        self.command(command).await?;
        result.await.map_err(|_| ClientError::Closed)?
    }

    /// Resend a failed message under its original optimistic id.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Closed`] if the task has shut down.
    pub async fn retry_message(
        &self,
        conversation_id: ConversationId,
        optimistic_id: OptimisticId,
    ) -> Result<(), ClientError> {
        self.command(Command::Retry { conversation_id, optimistic_id }).await
    }

    /// Fetch a history page and wait for it to be applied.
    ///
    /// `before` and `after` are broker cursors from a previous page; pass
    /// `None` for the newest page.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Rejected`] if the broker refuses the fetch
    /// or the request times out, [`ClientError::Closed`] if the task has
    /// shut down.
    pub async fn fetch_messages(
        &self,
        conversation_id: ConversationId,
        limit: Option<u32>,
        before: Option<String>,
        after: Option<String>,
    ) -> Result<HistoryPage, ClientError> {
        let (reply, result) = oneshot::channel();
        let command = Command::Fetch { conversation_id, limit, before, after, reply };
        self.command(command).await?;
        result.await.map_err(|_| ClientError::Closed)?
    }

    /// Tell the broker the local user started typing.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Closed`] if the task has shut down.
    pub async fn start_typing(&self, conversation_id: ConversationId) -> Result<(), ClientError> {
        self.command(Command::SetTyping { conversation_id, is_typing: true }).await
    }

    /// Tell the broker the local user stopped typing.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Closed`] if the task has shut down.
    pub async fn stop_typing(&self, conversation_id: ConversationId) -> Result<(), ClientError> {
        self.command(Command::SetTyping { conversation_id, is_typing: false }).await
    }

    /// Mark a conversation read up to a message.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Closed`] if the task has shut down.
    pub async fn mark_read(
        &self,
        conversation_id: ConversationId,
        message_id: MessageId,
    ) -> Result<(), ClientError> {
        self.command(Command::MarkRead { conversation_id, message_id }).await
    }

    /// Drop all local state and disconnect. Used on logout.
    ///
    /// In-flight joins and fetches fail with a rejection.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Closed`] if the task has shut down.
    pub async fn reset(&self) -> Result<(), ClientError> {
        self.command(Command::Reset).await
    }

    /// Snapshot a conversation's local state.
    ///
    /// Returns `None` when the conversation is unknown.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Closed`] if the task has shut down.
    pub async fn snapshot(
        &self,
        conversation_id: ConversationId,
    ) -> Result<Option<Conversation>, ClientError> {
        let (reply, result) = oneshot::channel();
        self.command(Command::Snapshot { conversation_id, reply }).await?;
        result.await.map_err(|_| ClientError::Closed)
    }

    /// Current connection status.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Closed`] if the task has shut down.
    pub async fn status(&self) -> Result<ConnectionStatus, ClientError> {
        let (reply, result) = oneshot::channel();
        self.command(Command::Status { reply }).await?;
        result.await.map_err(|_| ClientError::Closed)
    }

    async fn command(&self, command: Command) -> Result<(), ClientError> {
        self.commands.send(command).await.map_err(|_| ClientError::Closed)
    }
}

/// The background task owning the engine and its I/O.
struct ClientTask<T, E, C>
where
    T: Transport,
    E: Environment,
    C: CacheBridge,
{
    engine: Engine<E>,
    env: E,
    transport: T,
    cache: C,
    url: String,
    commands: mpsc::Receiver<Command>,
    notices: broadcast::Sender<EngineNotice>,
    waiting_joins: HashMap<ConversationId, VecDeque<oneshot::Sender<Result<(), ClientError>>>>,
    waiting_fetches:
        HashMap<ConversationId, VecDeque<oneshot::Sender<Result<HistoryPage, ClientError>>>>,
}

impl<T, E, C> ClientTask<T, E, C>
where
    T: Transport,
    E: Environment,
    C: CacheBridge,
{
    async fn run(mut self) {
        self.drive(EngineEvent::Connect).await;

        let mut ticker = interval(TICK_INTERVAL);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                command = self.commands.recv() => {
                    let Some(command) = command else { break };
                    self.handle_command(command).await;
                }
                event = self.transport.recv(), if self.transport.is_connected() => {
                    self.handle_transport_event(event).await;
                }
                _ = ticker.tick() => {
                    let now = self.env.now();
                    self.drive(EngineEvent::Tick { now }).await;
                }
            }
        }

        self.transport.close();
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Reconnect => self.drive(EngineEvent::Connect).await,
            Command::Disconnect => self.drive(EngineEvent::Disconnect).await,
            Command::Join { conversation_id, reply } => {
                self.waiting_joins.entry(conversation_id).or_default().push_back(reply);
                self.drive(EngineEvent::JoinConversation { conversation_id }).await;
            },
            Command::Leave { conversation_id } => {
                self.flush_conversation(conversation_id, "conversation left");
                self.drive(EngineEvent::LeaveConversation { conversation_id }).await;
            },
            Command::SetActive { conversation_id } => {
                self.drive(EngineEvent::SetActiveConversation { conversation_id }).await;
            },
            Command::Send { conversation_id, kind, content, reply } => {
                self.handle_send(conversation_id, kind, content, reply).await;
            },
            Command::Retry { conversation_id, optimistic_id } => {
                self.drive(EngineEvent::RetryMessage { conversation_id, optimistic_id }).await;
            },
            Command::Fetch { conversation_id, limit, before, after, reply } => {
                self.waiting_fetches.entry(conversation_id).or_default().push_back(reply);
                self.drive(EngineEvent::FetchMessages { conversation_id, limit, before, after })
                    .await;
            },
            Command::SetTyping { conversation_id, is_typing } => {
                self.drive(EngineEvent::SetTyping { conversation_id, is_typing }).await;
            },
            Command::MarkRead { conversation_id, message_id } => {
                self.drive(EngineEvent::MarkRead { conversation_id, message_id }).await;
            },
            Command::Reset => {
                self.flush_waiters("client reset");
                self.drive(EngineEvent::Reset).await;
            },
            Command::Snapshot { conversation_id, reply } => {
                let _ = reply.send(self.engine.conversation(conversation_id).cloned());
            },
            Command::Status { reply } => {
                let _ = reply.send(self.engine.status());
            },
        }
    }

    /// Send path: the optimistic copy is extracted from the engine's own
    /// notice so the caller gets exactly what subscribers see.
    async fn handle_send(
        &mut self,
        conversation_id: ConversationId,
        kind: MessageKind,
        content: String,
        reply: oneshot::Sender<Result<ChatMessage, ClientError>>,
    ) {
        match self.engine.handle(EngineEvent::SendMessage { conversation_id, kind, content }) {
            Ok(actions) => {
                let queued = actions.iter().find_map(|action| match action {
                    EngineAction::Notify(EngineNotice::MessageQueued { message, .. }) => {
                        Some(message.clone())
                    },
                    _ => None,
                });
                match queued {
                    Some(message) => {
                        let _ = reply.send(Ok(message));
                    },
                    None => {
                        let reason = "send produced no queued message".to_string();
                        let _ = reply.send(Err(ClientError::Rejected { reason }));
                    },
                }
                self.run_actions(actions).await;
            },
            Err(error) => {
                let _ = reply.send(Err(ClientError::Rejected { reason: error.to_string() }));
            },
        }
    }

    async fn handle_transport_event(&mut self, event: Option<TransportEvent>) {
        match event {
            Some(TransportEvent::Opened) => self.drive(EngineEvent::TransportOpened).await,
            Some(TransportEvent::Frame(frame)) => {
                self.drive(EngineEvent::FrameReceived(frame)).await;
            },
            Some(TransportEvent::Closed { reason }) => {
                self.transport.close();
                self.drive(EngineEvent::TransportClosed { reason }).await;
            },
            None => {
                // The pump died without a close event; treat it as a drop.
                self.transport.close();
                self.drive(EngineEvent::TransportClosed { reason: None }).await;
            },
        }
    }

    async fn drive(&mut self, event: EngineEvent<E::Instant>) {
        match self.engine.handle(event) {
            Ok(actions) => self.run_actions(actions).await,
            Err(error) => tracing::warn!(%error, "engine rejected event"),
        }
    }

    /// Execute actions, feeding any produced events back into the engine
    /// until the queue drains.
    async fn run_actions(&mut self, actions: Vec<EngineAction>) {
        let mut queue = VecDeque::new();
        self.apply_all(actions, &mut queue).await;

        while let Some(event) = queue.pop_front() {
            match self.engine.handle(event) {
                Ok(actions) => self.apply_all(actions, &mut queue).await,
                Err(error) => tracing::warn!(%error, "engine rejected event"),
            }
        }
    }

    async fn apply_all(
        &mut self,
        actions: Vec<EngineAction>,
        queue: &mut VecDeque<EngineEvent<E::Instant>>,
    ) {
        for action in actions {
            self.apply(action, queue).await;
        }
    }

    async fn apply(
        &mut self,
        action: EngineAction,
        queue: &mut VecDeque<EngineEvent<E::Instant>>,
    ) {
        match action {
            EngineAction::Send(frame) => {
                if let Err(error) = self.transport.send(frame).await {
                    tracing::warn!(%error, "frame send failed");
                }
            },
            EngineAction::Dial => {
                self.transport.close();
                if let Err(error) = self.transport.connect(&self.url).await {
                    queue.push_back(EngineEvent::DialFailed { reason: error.to_string() });
                }
            },
            EngineAction::HangUp => self.transport.close(),
            EngineAction::CacheMessage(message) => {
                if let Err(error) = self.cache.add_message(&message) {
                    tracing::warn!(%error, "cache write failed");
                }
            },
            EngineAction::CacheBatch { conversation_id, messages } => {
                if let Err(error) = self.cache.batch_sync(conversation_id, &messages) {
                    tracing::warn!(%error, "cache sync failed");
                }
            },
            EngineAction::Notify(notice) => self.dispatch(notice),
            EngineAction::Log { message } => tracing::debug!("{message}"),
        }
    }

    /// Resolve any waiter the notice settles, then broadcast it.
    fn dispatch(&mut self, notice: EngineNotice) {
        match &notice {
            EngineNotice::ConversationJoined { conversation_id } => {
                self.resolve_join(*conversation_id, Ok(()));
            },
            EngineNotice::JoinFailed { conversation_id, error } => {
                let result = Err(ClientError::Rejected { reason: error.clone() });
                self.resolve_join(*conversation_id, result);
            },
            EngineNotice::HistoryLoaded { conversation_id, has_more, total, .. } => {
                let messages = self
                    .engine
                    .conversation(*conversation_id)
                    .map(|conversation| conversation.messages().to_vec())
                    .unwrap_or_default();
                let page = HistoryPage {
                    conversation_id: *conversation_id,
                    messages,
                    has_more: *has_more,
                    total: *total,
                };
                self.resolve_fetch(*conversation_id, Ok(page));
            },
            EngineNotice::HistoryFailed { conversation_id, error } => {
                let result = Err(ClientError::Rejected { reason: error.clone() });
                self.resolve_fetch(*conversation_id, result);
            },
            _ => {},
        }
        let _ = self.notices.send(notice);
    }

    fn resolve_join(
        &mut self,
        conversation_id: ConversationId,
        result: Result<(), ClientError>,
    ) {
        let Some(queue) = self.waiting_joins.get_mut(&conversation_id) else { return };
        if let Some(reply) = queue.pop_front() {
            let _ = reply.send(result);
        }
        if queue.is_empty() {
            self.waiting_joins.remove(&conversation_id);
        }
    }

    fn resolve_fetch(
        &mut self,
        conversation_id: ConversationId,
        result: Result<HistoryPage, ClientError>,
    ) {
        let Some(queue) = self.waiting_fetches.get_mut(&conversation_id) else { return };
        if let Some(reply) = queue.pop_front() {
            let _ = reply.send(result);
        }
        if queue.is_empty() {
            self.waiting_fetches.remove(&conversation_id);
        }
    }

    fn flush_conversation(&mut self, conversation_id: ConversationId, reason: &str) {
        if let Some(queue) = self.waiting_joins.remove(&conversation_id) {
            for reply in queue {
                let _ = reply.send(Err(ClientError::Rejected { reason: reason.to_string() }));
            }
        }
        if let Some(queue) = self.waiting_fetches.remove(&conversation_id) {
            for reply in queue {
                let _ = reply.send(Err(ClientError::Rejected { reason: reason.to_string() }));
            }
        }
    }

    fn flush_waiters(&mut self, reason: &str) {
        for (_, queue) in self.waiting_joins.drain() {
            for reply in queue {
                let _ = reply.send(Err(ClientError::Rejected { reason: reason.to_string() }));
            }
        }
        for (_, queue) in self.waiting_fetches.drain() {
            for reply in queue {
                let _ = reply.send(Err(ClientError::Rejected { reason: reason.to_string() }));
            }
        }
    }
}
