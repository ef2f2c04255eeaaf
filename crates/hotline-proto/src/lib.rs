//! Wire protocol for the hotline chat synchronization engine.
//!
//! Frames are the unit of exchange between a client and the message broker:
//! a fixed 48-byte binary header (Big Endian) carrying routing context,
//! followed by a CBOR-encoded payload. Headers are raw binary so the broker
//! can route on conversation id without touching the payload; payloads are
//! CBOR so both sides get self-describing, forward-compatible bodies.
//!
//! Layering:
//! - [`FrameHeader`]: fixed header, zero-copy parsed.
//! - [`Frame`]: header plus raw payload bytes (the transport unit).
//! - [`Payload`]: typed payload enum, one variant per [`Opcode`].
//! - [`types`]: chat data model shared across the wire and client state.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod errors;
mod frame;
mod header;
mod opcode;
pub mod payloads;
pub mod types;

pub use frame::Frame;
pub use header::{FrameFlags, FrameHeader};
pub use opcode::Opcode;
pub use payloads::{ErrorPayload, Payload};
pub use types::{
    ChatMessage, ConversationId, DeliveryState, MessageId, MessageKind, OptimisticId, UserId,
};
