//! Fuzz target: `FrameDecoder::push`
//!
//! Drives arbitrary byte sequences into the streaming frame decoder and
//! asserts that it never panics, never yields an oversize payload, and
//! that every delivered payload re-encodes to a frame that decodes to the
//! same bytes. Delivered payloads are also parsed as protocol packets.
//!
//! cargo fuzz run fuzz_frame_decoder

#![no_main]

use libfuzzer_sys::fuzz_target;
use powerbridge::link::codec::{
    Decoded, FrameDecoder, MAX_FRAME_PAYLOAD, MAX_PACKET_SIZE, RxState, encode_frame,
};
use powerbridge::protocol::packet::PacketView;

fuzz_target!(|data: &[u8]| {
    let mut decoder = FrameDecoder::new();

    for &byte in data {
        if let Some(Decoded::Packet(payload)) = decoder.push(byte) {
            assert!(payload.len() <= MAX_FRAME_PAYLOAD, "payload exceeds frame limit");

            let payload = payload.to_vec();
            if let Ok(view) = PacketView::parse(&payload) {
                assert_eq!(view.payload.len(), usize::from(view.header.length));
            }

            let mut wire = [0u8; MAX_PACKET_SIZE];
            let n = encode_frame(&payload, &mut wire).expect("payload fits a frame");
            let mut check = FrameDecoder::new();
            let mut echoed = None;
            for &b in &wire[..n] {
                if let Some(Decoded::Packet(p)) = check.push(b) {
                    echoed = Some(p.to_vec());
                }
            }
            assert_eq!(echoed.as_deref(), Some(&payload[..]));
        }
    }

    // After a reset the decoder must be hunting for START again.
    decoder.reset();
    assert_eq!(decoder.state(), RxState::Idle);
});
