//! Protocol error types.

use thiserror::Error;

/// Convenience alias for protocol operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Errors produced while encoding or decoding wire data.
///
/// Every variant is a structural or serialization failure. Semantic
/// errors (unknown conversation, rejected send) travel as `Error`
/// frames, not as `ProtocolError`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// Buffer is too short to contain a frame header.
    #[error("frame too short: expected {expected} bytes, got {actual}")]
    FrameTooShort {
        /// Bytes required.
        expected: usize,
        /// Bytes available.
        actual: usize,
    },

    /// Header claims more payload bytes than the buffer holds.
    #[error("frame truncated: header claims {expected} payload bytes, got {actual}")]
    FrameTruncated {
        /// Payload bytes the header claims.
        expected: usize,
        /// Payload bytes actually present.
        actual: usize,
    },

    /// Magic number does not match [`crate::FrameHeader::MAGIC`].
    #[error("invalid magic number")]
    InvalidMagic,

    /// Protocol version is not supported by this build.
    #[error("unsupported protocol version: {0:#04x}")]
    UnsupportedVersion(u8),

    /// Payload exceeds the maximum allowed size.
    #[error("payload too large: {size} bytes exceeds maximum {max}")]
    PayloadTooLarge {
        /// Actual payload size.
        size: usize,
        /// Maximum permitted size.
        max: usize,
    },

    /// Opcode is not recognized by this protocol version.
    #[error("unknown opcode: {0:#06x}")]
    UnknownOpcode(u16),

    /// CBOR serialization failed.
    #[error("CBOR encode failed: {0}")]
    CborEncode(String),

    /// CBOR deserialization failed.
    #[error("CBOR decode failed: {0}")]
    CborDecode(String),
}
