//! Fuzz target for `Frame::decode`.
//!
//! # Strategy
//!
//! Raw arbitrary bytes straight into the wire decoder, covering corrupt
//! magic, bad versions, hostile size claims, and truncation.
//!
//! # Invariants
//!
//! - Decoding never panics; invalid input returns a typed error
//! - Accepted frames carry exactly the payload their header claims
//! - Accepted frames survive an encode/decode round trip unchanged

#![no_main]

use hotline_proto::Frame;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(frame) = Frame::decode(data) else { return };

    assert_eq!(frame.header.payload_size() as usize, frame.payload.len());

    let mut wire = Vec::new();
    frame.encode(&mut wire).expect("accepted frame re-encodes");
    let again = Frame::decode(&wire).expect("re-encoded frame decodes");
    assert_eq!(frame, again);
});
