//! Session management payload types.
//!
//! Handshake and keepalive run before any chat traffic: the client opens
//! the transport, sends `Hello`, and treats the connection as usable only
//! once `HelloReply` arrives.

use serde::{Deserialize, Serialize};

use crate::types::UserId;

/// Initial handshake, first frame on every connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hello {
    /// Protocol version the client speaks.
    pub protocol_version: u8,

    /// Authenticated user id (session issuance is out of scope; the id is
    /// carried here so the broker can attribute frames).
    pub user_id: UserId,

    /// Display name shown to other participants.
    pub display_name: String,

    /// Avatar URL, if the user has one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,

    /// True when this connection replaces one that dropped. The broker may
    /// flag subsequent re-deliveries as replays.
    pub resume: bool,
}

/// Broker acknowledgment of [`Hello`]. The connection is usable once this
/// arrives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HelloReply {
    /// Broker-assigned session identifier.
    pub session_id: u64,
}

/// Graceful disconnect notice, sent by either side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Goodbye {
    /// Human-readable reason for the disconnect.
    pub reason: String,
}
