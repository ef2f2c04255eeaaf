//! CBOR-encoded protocol messages.
//!
//! Frame headers are raw binary for routing speed, but payloads use CBOR
//! for type safety and forward compatibility. The `Payload` enum covers all
//! message types: session management (Hello, Ping, etc.), client chat
//! operations, and broker synchronization events.
//!
//! # Invariants
//!
//! Each payload variant maps to exactly one opcode (enforced by match
//! exhaustiveness). Round-trip encoding must produce identical values.

pub mod chat;
pub mod session;
pub mod sync;

use bytes::BufMut;
use serde::{Deserialize, Serialize};

use crate::{
    Frame, FrameHeader, Opcode,
    errors::{ProtocolError, Result},
};

/// All possible frame payloads.
///
/// The payload type is determined by the `Opcode` in the frame header, so
/// we serialize only the inner struct content (no variant tag in CBOR).
/// Sending a mismatched opcode/payload pair is therefore impossible to
/// express. Operations whose entire meaning is the opcode plus the header's
/// conversation id (join, leave, typing signals) are unit variants with
/// zero-byte payloads.
///
/// All methods use exhaustive `match` statements; adding a variant will
/// cause compile errors in `encode()`, `decode()`, and `opcode()`, so no
/// variant can be left unhandled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    // Session management
    /// Initial handshake
    Hello(session::Hello),
    /// Broker response to Hello
    HelloReply(session::HelloReply),
    /// Graceful disconnect
    Goodbye(session::Goodbye),
    /// Ping for keepalive
    Ping,
    /// Pong response
    Pong,

    // Client -> broker
    /// Subscribe to a conversation (conversation id in header)
    JoinConversation,
    /// Unsubscribe from a conversation
    LeaveConversation,
    /// Send a chat message
    SendMessage(chat::SendMessage),
    /// Request a history page
    GetMessages(chat::GetMessages),
    /// Local user started typing
    TypingStart,
    /// Local user stopped typing
    TypingStop,
    /// Mark messages read
    MarkRead(chat::MarkRead),

    // Broker -> client
    /// Join acknowledgment
    JoinedConversation,
    /// Send confirmation
    MessageSent(sync::MessageSent),
    /// Send rejection
    MessageFailed(sync::MessageFailed),
    /// Fan-out of another participant's message
    NewMessage(sync::NewMessage),
    /// History page
    MessagesLoaded(sync::MessagesLoaded),
    /// History rejection
    GetMessagesError(sync::GetMessagesError),
    /// Typing state change
    UserTyping(sync::UserTyping),

    // Error frame
    /// Error response
    Error(ErrorPayload),
}

/// Error payload for error frames.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    /// Error code identifying the type of error.
    pub code: u16,
    /// Human-readable error message.
    pub message: String,
    /// Optional retry-after duration in seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
}

impl ErrorPayload {
    /// Frame was rejected by the broker.
    pub const FRAME_REJECTED: u16 = 0x0001;
    /// Conversation does not exist.
    pub const CONVERSATION_NOT_FOUND: u16 = 0x0002;
    /// Sender is not a member of the conversation.
    pub const NOT_A_MEMBER: u16 = 0x0003;
    /// Invalid payload format.
    pub const INVALID_PAYLOAD: u16 = 0x0004;
    /// Sender exceeded its rate budget.
    pub const RATE_LIMITED: u16 = 0x0005;
    /// Broker-side failure unrelated to the request.
    pub const INTERNAL_ERROR: u16 = 0x0006;

    /// Create a frame rejection error.
    pub fn frame_rejected(reason: impl Into<String>) -> Self {
        Self { code: Self::FRAME_REJECTED, message: reason.into(), retry_after: None }
    }

    /// Create a conversation not found error.
    #[must_use]
    pub fn conversation_not_found(conversation_id: u128) -> Self {
        Self {
            code: Self::CONVERSATION_NOT_FOUND,
            message: format!("conversation not found: {conversation_id:032x}"),
            retry_after: None,
        }
    }

    /// Create a not-a-member error.
    #[must_use]
    pub fn not_a_member(conversation_id: u128) -> Self {
        Self {
            code: Self::NOT_A_MEMBER,
            message: format!("not a member of conversation {conversation_id:032x}"),
            retry_after: None,
        }
    }

    /// Create an invalid payload error.
    pub fn invalid_payload(msg: impl Into<String>) -> Self {
        Self { code: Self::INVALID_PAYLOAD, message: msg.into(), retry_after: None }
    }

    /// Create a rate limit error with a retry hint.
    #[must_use]
    pub fn rate_limited(retry_after_secs: u64) -> Self {
        Self {
            code: Self::RATE_LIMITED,
            message: "rate limit exceeded".to_string(),
            retry_after: Some(retry_after_secs),
        }
    }

    /// Create an internal broker error.
    pub fn internal_error(msg: impl Into<String>) -> Self {
        Self { code: Self::INTERNAL_ERROR, message: msg.into(), retry_after: None }
    }
}

impl Payload {
    /// Opcode corresponding to this payload type.
    #[must_use]
    pub const fn opcode(&self) -> Opcode {
        match self {
            Self::Hello(_) => Opcode::Hello,
            Self::HelloReply(_) => Opcode::HelloReply,
            Self::Goodbye(_) => Opcode::Goodbye,
            Self::Ping => Opcode::Ping,
            Self::Pong => Opcode::Pong,
            Self::JoinConversation => Opcode::JoinConversation,
            Self::LeaveConversation => Opcode::LeaveConversation,
            Self::SendMessage(_) => Opcode::SendMessage,
            Self::GetMessages(_) => Opcode::GetMessages,
            Self::TypingStart => Opcode::TypingStart,
            Self::TypingStop => Opcode::TypingStop,
            Self::MarkRead(_) => Opcode::MarkRead,
            Self::JoinedConversation => Opcode::JoinedConversation,
            Self::MessageSent(_) => Opcode::MessageSent,
            Self::MessageFailed(_) => Opcode::MessageFailed,
            Self::NewMessage(_) => Opcode::NewMessage,
            Self::MessagesLoaded(_) => Opcode::MessagesLoaded,
            Self::GetMessagesError(_) => Opcode::GetMessagesError,
            Self::UserTyping(_) => Opcode::UserTyping,
            Self::Error(_) => Opcode::Error,
        }
    }

    /// Encode payload to buffer.
    ///
    /// Serializes only the inner struct, NOT the variant tag; the frame
    /// header's opcode already identifies the payload type. Unit variants
    /// encode to zero bytes. Size limits are enforced later in
    /// [`Frame::encode`], not here.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::CborEncode` if serialization fails
    pub fn encode(&self, dst: &mut impl BufMut) -> Result<()> {
        let mut writer = dst.writer();

        match self {
            Self::Hello(inner) => ciborium::ser::into_writer(inner, &mut writer),
            Self::HelloReply(inner) => ciborium::ser::into_writer(inner, &mut writer),
            Self::Goodbye(inner) => ciborium::ser::into_writer(inner, &mut writer),
            Self::SendMessage(inner) => ciborium::ser::into_writer(inner, &mut writer),
            Self::GetMessages(inner) => ciborium::ser::into_writer(inner, &mut writer),
            Self::MarkRead(inner) => ciborium::ser::into_writer(inner, &mut writer),
            Self::MessageSent(inner) => ciborium::ser::into_writer(inner, &mut writer),
            Self::MessageFailed(inner) => ciborium::ser::into_writer(inner, &mut writer),
            Self::NewMessage(inner) => ciborium::ser::into_writer(inner, &mut writer),
            Self::MessagesLoaded(inner) => ciborium::ser::into_writer(inner, &mut writer),
            Self::GetMessagesError(inner) => ciborium::ser::into_writer(inner, &mut writer),
            Self::UserTyping(inner) => ciborium::ser::into_writer(inner, &mut writer),
            Self::Error(inner) => ciborium::ser::into_writer(inner, &mut writer),
            // Zero-byte payloads
            Self::Ping
            | Self::Pong
            | Self::JoinConversation
            | Self::LeaveConversation
            | Self::TypingStart
            | Self::TypingStop
            | Self::JoinedConversation => Ok(()),
        }
        .map_err(|e| ProtocolError::CborEncode(e.to_string()))
    }

    /// Decode payload from bytes based on opcode.
    ///
    /// The size check happens BEFORE CBOR parsing begins, so the parser
    /// never processes inputs past the protocol limit. Zero-byte opcodes
    /// ignore any stray payload bytes.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::PayloadTooLarge` if bytes exceed
    ///   [`FrameHeader::MAX_PAYLOAD_SIZE`]
    /// - `ProtocolError::CborDecode` if CBOR deserialization fails
    pub fn decode(opcode: Opcode, bytes: &[u8]) -> Result<Self> {
        fn cbor<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T> {
            ciborium::de::from_reader(bytes).map_err(|e| ProtocolError::CborDecode(e.to_string()))
        }

        if bytes.len() > FrameHeader::MAX_PAYLOAD_SIZE as usize {
            return Err(ProtocolError::PayloadTooLarge {
                size: bytes.len(),
                max: FrameHeader::MAX_PAYLOAD_SIZE as usize,
            });
        }

        let payload = match opcode {
            Opcode::Hello => Self::Hello(cbor(bytes)?),
            Opcode::HelloReply => Self::HelloReply(cbor(bytes)?),
            Opcode::Goodbye => Self::Goodbye(cbor(bytes)?),
            Opcode::Ping => Self::Ping,
            Opcode::Pong => Self::Pong,
            Opcode::JoinConversation => Self::JoinConversation,
            Opcode::LeaveConversation => Self::LeaveConversation,
            Opcode::SendMessage => Self::SendMessage(cbor(bytes)?),
            Opcode::GetMessages => Self::GetMessages(cbor(bytes)?),
            Opcode::TypingStart => Self::TypingStart,
            Opcode::TypingStop => Self::TypingStop,
            Opcode::MarkRead => Self::MarkRead(cbor(bytes)?),
            Opcode::JoinedConversation => Self::JoinedConversation,
            Opcode::MessageSent => Self::MessageSent(cbor(bytes)?),
            Opcode::MessageFailed => Self::MessageFailed(cbor(bytes)?),
            Opcode::NewMessage => Self::NewMessage(cbor(bytes)?),
            Opcode::MessagesLoaded => Self::MessagesLoaded(cbor(bytes)?),
            Opcode::GetMessagesError => Self::GetMessagesError(cbor(bytes)?),
            Opcode::UserTyping => Self::UserTyping(cbor(bytes)?),
            Opcode::Error => Self::Error(cbor(bytes)?),
        };

        Ok(payload)
    }

    /// Convert payload into a transport frame.
    ///
    /// Encodes the payload to CBOR, stamps the matching opcode into the
    /// header, and creates a `Frame` with automatic `payload_size`
    /// calculation.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::CborEncode` if serialization fails
    pub fn into_frame(self, mut header: FrameHeader) -> Result<Frame> {
        let mut buf = Vec::new();
        self.encode(&mut buf)?;
        header.opcode = self.opcode().to_u16().to_be_bytes();
        Ok(Frame::new(header, buf))
    }

    /// Parse payload from a raw transport frame.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::UnknownOpcode` if the header opcode is unrecognized
    /// - `ProtocolError::CborDecode` if CBOR deserialization fails
    /// - `ProtocolError::PayloadTooLarge` if payload exceeds maximum size
    pub fn from_frame(frame: &Frame) -> Result<Self> {
        let opcode = frame
            .header
            .opcode_enum()
            .ok_or(ProtocolError::UnknownOpcode(frame.header.opcode()))?;
        Self::decode(opcode, &frame.payload)
    }
}
