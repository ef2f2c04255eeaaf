//! Frame operation codes.

/// Operation code identifying a frame's payload type.
///
/// Layout: `0x00xx` session management, `0x01xx` client-to-broker chat
/// operations, `0x02xx` broker-to-client events, `0x00FF` error frames.
/// The opcode in the frame header is the sole discriminator for payload
/// decoding; CBOR bodies carry no variant tag.
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    // Session management
    /// Initial handshake after transport connect.
    Hello = 0x0001,
    /// Broker acknowledgment of Hello.
    HelloReply = 0x0002,
    /// Graceful disconnect.
    Goodbye = 0x0003,
    /// Keepalive probe.
    Ping = 0x0004,
    /// Keepalive response.
    Pong = 0x0005,

    // Client -> broker
    /// Subscribe to a conversation's event stream.
    JoinConversation = 0x0100,
    /// Unsubscribe from a conversation.
    LeaveConversation = 0x0101,
    /// Send a chat message (optimistic, correlated by optimistic id).
    SendMessage = 0x0102,
    /// Request a page of conversation history.
    GetMessages = 0x0103,
    /// Local user started typing.
    TypingStart = 0x0104,
    /// Local user stopped typing.
    TypingStop = 0x0105,
    /// Mark conversation messages as read.
    MarkRead = 0x0106,

    // Broker -> client
    /// Join acknowledgment.
    JoinedConversation = 0x0200,
    /// Send confirmation carrying the final message.
    MessageSent = 0x0201,
    /// Send rejection.
    MessageFailed = 0x0202,
    /// Message originated by another participant.
    NewMessage = 0x0203,
    /// History page response.
    MessagesLoaded = 0x0204,
    /// History request rejection.
    GetMessagesError = 0x0205,
    /// Remote participant typing state change.
    UserTyping = 0x0206,

    /// Error frame.
    Error = 0x00FF,
}

impl Opcode {
    /// Raw u16 value for wire encoding.
    #[must_use]
    pub const fn to_u16(self) -> u16 {
        self as u16
    }

    /// Parse from wire value. Returns `None` for unrecognized codes.
    #[must_use]
    pub const fn from_u16(value: u16) -> Option<Self> {
        match value {
            0x0001 => Some(Self::Hello),
            0x0002 => Some(Self::HelloReply),
            0x0003 => Some(Self::Goodbye),
            0x0004 => Some(Self::Ping),
            0x0005 => Some(Self::Pong),
            0x0100 => Some(Self::JoinConversation),
            0x0101 => Some(Self::LeaveConversation),
            0x0102 => Some(Self::SendMessage),
            0x0103 => Some(Self::GetMessages),
            0x0104 => Some(Self::TypingStart),
            0x0105 => Some(Self::TypingStop),
            0x0106 => Some(Self::MarkRead),
            0x0200 => Some(Self::JoinedConversation),
            0x0201 => Some(Self::MessageSent),
            0x0202 => Some(Self::MessageFailed),
            0x0203 => Some(Self::NewMessage),
            0x0204 => Some(Self::MessagesLoaded),
            0x0205 => Some(Self::GetMessagesError),
            0x0206 => Some(Self::UserTyping),
            0x00FF => Some(Self::Error),
            _ => None,
        }
    }

    /// All opcodes defined by this protocol version.
    ///
    /// Used by tests and fuzz targets to enumerate the decode surface.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::Hello,
            Self::HelloReply,
            Self::Goodbye,
            Self::Ping,
            Self::Pong,
            Self::JoinConversation,
            Self::LeaveConversation,
            Self::SendMessage,
            Self::GetMessages,
            Self::TypingStart,
            Self::TypingStop,
            Self::MarkRead,
            Self::JoinedConversation,
            Self::MessageSent,
            Self::MessageFailed,
            Self::NewMessage,
            Self::MessagesLoaded,
            Self::GetMessagesError,
            Self::UserTyping,
            Self::Error,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_all_opcodes() {
        for &opcode in Opcode::all() {
            assert_eq!(Opcode::from_u16(opcode.to_u16()), Some(opcode));
        }
    }

    #[test]
    fn unknown_opcode_rejected() {
        assert_eq!(Opcode::from_u16(0xDEAD), None);
        assert_eq!(Opcode::from_u16(0x0000), None);
    }

    #[test]
    fn opcode_values_unique() {
        let all = Opcode::all();
        for (i, a) in all.iter().enumerate() {
            for b in &all[i + 1..] {
                assert_ne!(a.to_u16(), b.to_u16());
            }
        }
    }
}
