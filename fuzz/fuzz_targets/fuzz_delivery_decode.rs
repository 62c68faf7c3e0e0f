#![no_main]

use fabula::{ChapterCodec, FrameCodec, OffsetCodec, SyncSummary};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Broker lines are untrusted. Decoding must never panic, and the flat
    // variant must turn every line into a delivery.
    let line = String::from_utf8_lossy(data);
    let _ = ChapterCodec.decode_delivery(&line);
    let _ = ChapterCodec.decode_ack_response(&line);
    assert!(OffsetCodec.decode_delivery(&line).is_some());
    let _ = OffsetCodec.decode_ack_response(&line);
    let _ = SyncSummary::parse(&line);
});
