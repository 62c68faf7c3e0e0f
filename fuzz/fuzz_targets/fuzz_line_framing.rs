#![no_main]

use bytes::BytesMut;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Split arbitrary bytes into lines; never panic, never yield a line
    // longer than the limit. Lossy decoding turns each invalid byte into a
    // three-byte replacement character.
    let mut buf = BytesMut::from(data);
    while let Ok(Some(line)) = fabula::codec::decode_line(&mut buf, 256) {
        assert!(!line.contains('\n'));
        assert!(line.len() <= 256 * 3);
    }
});
