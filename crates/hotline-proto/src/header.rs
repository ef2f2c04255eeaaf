//! Frame header implementation with zero-copy parsing.
//!
//! The `FrameHeader` is a fixed 48-byte structure serialized as raw binary
//! (Big Endian). The broker routes frames on the conversation id without
//! deserializing the CBOR payload, so all routing context lives here.

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::{
    Opcode,
    errors::{ProtocolError, Result},
};

/// Frame processing flags.
///
/// One byte on the wire; undefined bits must be zero and are preserved
/// through a decode/encode round trip only if set via [`Self::to_byte`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameFlags {
    /// Frame is a broker re-delivery during post-reconnect catch-up.
    ///
    /// Clients still deduplicate by message id; the flag only suppresses
    /// notification side effects (unread counting) for frames the client
    /// may have already seen before the outage.
    pub replay: bool,
}

impl FrameFlags {
    const REPLAY: u8 = 0b0000_0001;

    /// Parse flags from the header byte. Undefined bits are ignored.
    #[must_use]
    pub const fn from_byte(byte: u8) -> Self {
        Self { replay: byte & Self::REPLAY != 0 }
    }

    /// Serialize flags to the header byte.
    #[must_use]
    pub const fn to_byte(self) -> u8 {
        if self.replay { Self::REPLAY } else { 0 }
    }
}

/// Fixed 48-byte frame header (Big Endian network byte order).
///
/// All multi-byte integers are stored in Big Endian format to match network
/// byte order. Fields are stored as raw byte arrays to avoid alignment
/// issues. The header fits in a single 64-byte CPU cache line, so the broker
/// routes a frame touching one line of memory.
///
/// The #[repr(C, packed)] layout with zerocopy traits ensures this struct
/// can be safely cast from untrusted network bytes. All 48-byte patterns are
/// valid bit representations; validation of magic, version, and payload size
/// happens in [`Self::from_bytes`].
#[repr(C, packed)]
#[derive(Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct FrameHeader {
    // Protocol identification (8 bytes: 0-7)
    magic: [u8; 4],             // 0x484F544C ("HOTL" in ASCII)
    version: u8,                // 0x01
    flags: u8,                  // FrameFlags bitfield
    pub(crate) opcode: [u8; 2], // u16 operation code

    // Payload metadata (8 bytes: 8-15)
    pub(crate) payload_size: [u8; 4], // u32 payload length
    reserved: [u8; 4],                // must be zero, ignored on read

    // Routing context (32 bytes: 16-47)
    conversation_id: [u8; 16], // UUID (128-bit)
    sender_id: [u8; 8],        // u64 sender identifier
    timestamp: [u8; 8],        // u64 Unix milliseconds
}

impl FrameHeader {
    /// Size of the serialized header (48 bytes).
    pub const SIZE: usize = 48;

    /// Magic number: "HOTL" in ASCII (0x484F544C).
    pub const MAGIC: u32 = 0x484F_544C;

    /// Current protocol version.
    pub const VERSION: u8 = 0x01;

    /// Maximum payload size (1 MiB).
    ///
    /// Chat payloads are text and metadata; a full history page of 100
    /// messages stays well under this. Anything larger is malformed or
    /// hostile.
    pub const MAX_PAYLOAD_SIZE: u32 = 1024 * 1024;

    /// Create a new header with the specified opcode.
    #[must_use]
    pub fn new(opcode: Opcode) -> Self {
        let mut bytes = [0u8; Self::SIZE];
        bytes[0..4].copy_from_slice(&Self::MAGIC.to_be_bytes());
        bytes[4] = Self::VERSION;
        bytes[6..8].copy_from_slice(&opcode.to_u16().to_be_bytes());

        // SAFETY: We just constructed valid bytes with correct magic and version.
        // from_bytes will validate these and return a valid header.
        Self::from_bytes(&bytes)
            .ok()
            .unwrap_or_else(|| unreachable!("constructed valid header with correct magic/version"))
            .to_owned()
    }

    /// Parse header from network bytes (zero-copy, safe)
    ///
    /// Casts raw bytes directly to a `FrameHeader` reference using
    /// compile-time layout verification from `zerocopy`. No data is copied.
    /// Validation runs cheapest-first: size, magic, version, payload size.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::FrameTooShort` if buffer is shorter than 48 bytes
    /// - `ProtocolError::InvalidMagic` if magic number is invalid
    /// - `ProtocolError::UnsupportedVersion` if protocol version is unsupported
    /// - `ProtocolError::PayloadTooLarge` if payload size exceeds maximum
    pub fn from_bytes(bytes: &[u8]) -> Result<&Self> {
        let header = Self::ref_from_prefix(bytes)
            .map_err(|_| ProtocolError::FrameTooShort {
                expected: Self::SIZE,
                actual: bytes.len(),
            })?
            .0;

        if u32::from_be_bytes(header.magic) != Self::MAGIC {
            return Err(ProtocolError::InvalidMagic);
        }

        if header.version != Self::VERSION {
            return Err(ProtocolError::UnsupportedVersion(header.version));
        }

        let payload_size = u32::from_be_bytes(header.payload_size);
        if payload_size > Self::MAX_PAYLOAD_SIZE {
            return Err(ProtocolError::PayloadTooLarge {
                size: payload_size as usize,
                max: Self::MAX_PAYLOAD_SIZE as usize,
            });
        }

        Ok(header)
    }

    /// Serialize header to bytes (zero-copy).
    #[must_use]
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let bytes = IntoBytes::as_bytes(self);
        let mut arr = [0u8; Self::SIZE];
        arr.copy_from_slice(bytes);
        arr
    }

    /// Protocol magic number (0x484F544C = "HOTL").
    #[must_use]
    pub fn magic(&self) -> u32 {
        u32::from_be_bytes(self.magic)
    }

    /// Protocol version byte (currently 0x01).
    #[must_use]
    pub fn version(&self) -> u8 {
        self.version
    }

    /// Frame processing flags.
    #[must_use]
    pub fn flags(&self) -> FrameFlags {
        FrameFlags::from_byte(self.flags)
    }

    /// Operation code as raw u16.
    #[must_use]
    pub fn opcode(&self) -> u16 {
        u16::from_be_bytes(self.opcode)
    }

    /// Operation code as enum. `None` if unrecognized.
    #[must_use]
    pub fn opcode_enum(&self) -> Option<Opcode> {
        Opcode::from_u16(self.opcode())
    }

    /// Payload size in bytes (max 1 MiB).
    #[must_use]
    pub fn payload_size(&self) -> u32 {
        u32::from_be_bytes(self.payload_size)
    }

    /// 128-bit conversation UUID this frame routes to.
    ///
    /// Zero for session frames (Hello, Ping, Goodbye) that carry no
    /// conversation context.
    #[must_use]
    pub fn conversation_id(&self) -> u128 {
        u128::from_be_bytes(self.conversation_id)
    }

    /// Stable sender identifier (assigned during handshake).
    #[must_use]
    pub fn sender_id(&self) -> u64 {
        u64::from_be_bytes(self.sender_id)
    }

    /// Wall-clock timestamp in Unix milliseconds.
    #[must_use]
    pub fn timestamp(&self) -> u64 {
        u64::from_be_bytes(self.timestamp)
    }

    /// Update frame processing flags.
    pub fn set_flags(&mut self, flags: FrameFlags) {
        self.flags = flags.to_byte();
    }

    /// Update conversation UUID.
    pub fn set_conversation_id(&mut self, conversation_id: u128) {
        self.conversation_id = conversation_id.to_be_bytes();
    }

    /// Update sender identifier.
    pub fn set_sender_id(&mut self, sender_id: u64) {
        self.sender_id = sender_id.to_be_bytes();
    }

    /// Set wall-clock timestamp (Unix milliseconds).
    pub fn set_timestamp(&mut self, timestamp: u64) {
        self.timestamp = timestamp.to_be_bytes();
    }

    /// Set payload size.
    pub fn set_payload_size(&mut self, size: u32) {
        self.payload_size = size.to_be_bytes();
    }
}

// Manual Debug implementation (can't derive due to packed repr)
impl std::fmt::Debug for FrameHeader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameHeader")
            .field("magic", &format!("{:#010x}", self.magic()))
            .field("version", &self.version())
            .field("flags", &self.flags())
            .field("opcode", &format!("{:#06x}", self.opcode()))
            .field("payload_size", &self.payload_size())
            .field("conversation_id", &format!("{:#034x}", self.conversation_id()))
            .field("sender_id", &self.sender_id())
            .field("timestamp", &self.timestamp())
            .finish_non_exhaustive()
    }
}

// Manual PartialEq implementation (can't derive due to packed repr)
impl PartialEq for FrameHeader {
    fn eq(&self, other: &Self) -> bool {
        self.to_bytes() == other.to_bytes()
    }
}

impl Eq for FrameHeader {}
