//! Client
//!
//! Action-based chat synchronization engine for the hotline protocol.
//! Manages conversation state, optimistic message delivery, typing
//! indicators, and supervised reconnection.
//!
//! # Architecture
//!
//! The engine follows the same Sans-IO and Action-Based patterns as
//! [`hotline_core`]. It receives events ([`EngineEvent`]), processes them
//! through pure state machine logic, and returns actions
//! ([`EngineAction`]) for the caller to execute. Broker confirmations are
//! reconciled against optimistic local state by correlation id.
//!
//! # Components
//!
//! - [`Engine`]: Top-level state machine managing multiple conversations
//! - [`EngineEvent`]: Events fed into the engine
//! - [`EngineAction`]: Actions produced by the engine
//! - [`EngineNotice`]: State-change notifications for the application
//! - [`CacheBridge`]: Local persistence hook for confirmed messages
//! - [`transport::Transport`]: Pluggable broker link
//!
//! # Transport (optional)
//!
//! With the `transport` feature enabled, this crate also provides:
//! - [`ChatClient`]: Async handle running the engine on a background task
//! - [`WsTransport`]: WebSocket link to the broker

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod cache;
mod engine;
mod error;
mod event;
mod pending;
pub mod transport;

#[cfg(feature = "transport")]
mod client;
#[cfg(feature = "transport")]
mod ws;

pub use cache::{CacheBridge, CacheError, MemoryCache, NullCache};
#[cfg(feature = "transport")]
pub use client::{ChatClient, ClientError, HistoryPage};
pub use engine::{
    ClientIdentity, DEFAULT_FETCH_TIMEOUT, DEFAULT_JOIN_TIMEOUT, DEFAULT_SEND_TIMEOUT,
    DEFAULT_TYPING_TTL, Engine, EngineConfig,
};
pub use error::EngineError;
pub use event::{EngineAction, EngineEvent, EngineNotice};
pub use hotline_core::{
    env::Environment,
    reconnect::{ConnectionStatus, ReconnectConfig},
    store::{Conversation, ConversationStore, TypingUser},
};
pub use hotline_proto::{
    ChatMessage, ConversationId, DeliveryState, MessageId, MessageKind, OptimisticId, UserId,
};
#[cfg(feature = "transport")]
pub use ws::{DEFAULT_DIAL_TIMEOUT, TransportError, WsTransport};
