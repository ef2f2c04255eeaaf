//! Domain state for the hotline chat synchronization engine.
//!
//! Three concerns live here, all free of I/O:
//!
//! - [`store`]: per-conversation state (messages, typing, pagination,
//!   unread) and the map that owns it.
//! - [`reconnect`]: the connection lifecycle state machine covering dialing,
//!   handshake, heartbeats, and exponential-backoff reconnection.
//! - [`env`]: the environment abstraction (time, entropy) that keeps the
//!   state machines deterministic under simulation.
//!
//! The synchronization engine in `hotline-client` composes these; nothing
//! here touches a socket or a clock directly.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod env;
pub mod error;
pub mod reconnect;
pub mod store;

pub use env::{Environment, SystemEnv};
pub use error::SupervisorError;
pub use reconnect::{
    ConnectionStatus, ReconnectConfig, ReconnectSupervisor, SupervisorAction, SupervisorPhase,
};
pub use store::{Conversation, ConversationStore, TypingUser};
