//! Fuzz target: `FrameDecoder::feed` + `codec::decode`
//!
//! Drives arbitrary byte sequences into the streaming frame decoder, split
//! at a fuzzer-chosen point, and decodes every body it yields. Asserts that
//! nothing panics, that bodies are never empty or oversized, and that the
//! split point does not change which bodies come out.
//!
//! cargo fuzz run fuzz_frame_decoder

#![no_main]

use libfuzzer_sys::fuzz_target;
use rilbridge::ril::codec::{self, FrameDecoder, MAX_FRAME_SIZE};

fn run(chunks: &[&[u8]]) -> Vec<Vec<u8>> {
    let mut decoder = FrameDecoder::new();
    let mut bodies = Vec::new();
    for chunk in chunks {
        let ok = decoder
            .feed(chunk, |body| {
                assert!(!body.is_empty(), "decoder must not yield empty body");
                assert!(body.len() <= MAX_FRAME_SIZE, "body exceeds MAX_FRAME_SIZE");
                let _ = codec::decode(body);
                let _ = codec::decode_request(body);
                bodies.push(body.to_vec());
            })
            .is_ok();
        if !ok {
            break;
        }
    }
    bodies
}

fuzz_target!(|data: &[u8]| {
    if data.is_empty() {
        return;
    }
    let split = data[0] as usize % data.len();
    let rest = &data[1..];
    let split = split.min(rest.len());

    let whole = run(&[rest]);
    let parts = run(&[&rest[..split], &rest[split..]]);
    assert_eq!(whole, parts, "chunk boundaries must not change the frames");
});
