//! Fuzz target for `Payload::from_frame`.
//!
//! # Strategy
//!
//! Pair every defined opcode with the same arbitrary payload bytes, so
//! each CBOR schema sees malformed input: wrong types, missing fields,
//! oversized collections, junk trailing data.
//!
//! # Invariants
//!
//! - Payload decoding never panics; invalid CBOR returns a typed error
//! - A payload that decodes reports the opcode of its carrier frame
//! - A decoded payload re-encodes into a frame with the same opcode

#![no_main]

use bytes::Bytes;
use hotline_proto::{Frame, FrameHeader, Opcode, Payload};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    for &opcode in Opcode::all() {
        let frame = Frame::new(FrameHeader::new(opcode), Bytes::copy_from_slice(data));
        let Ok(payload) = Payload::from_frame(&frame) else { continue };
        assert_eq!(payload.opcode(), opcode);

        let reframed = payload
            .into_frame(FrameHeader::new(opcode))
            .expect("decoded payload re-encodes");
        assert_eq!(reframed.header.opcode_enum(), Some(opcode));
    }
});
