//! Decode throughput for broker lines.
//!
//! Measures positional decoding for both wire variants, the structured
//! overlay path, and line framing out of a read buffer.

use bytes::BytesMut;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use fabula::codec::{decode_line, encode_line};
use fabula::{ChapterCodec, FrameCodec, OffsetCodec, SyncSummary};

fn bench_decode_delivery(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode_delivery");

    let chapter = "msg;12;3456;false;orders;order 991 created";
    let structured = r#"{"topic":"orders","segment":12,"index":3456,"review":false,"message":"created"}"#;
    let offset = "881234;payments;charge settled";

    group.bench_function("chapter", |b| {
        b.iter(|| ChapterCodec.decode_delivery(black_box(chapter)))
    });
    group.bench_function("offset", |b| {
        b.iter(|| OffsetCodec.decode_delivery(black_box(offset)))
    });
    group.bench_function("structured_overlay", |b| {
        b.iter(|| OffsetCodec.decode_delivery(black_box(structured)))
    });
    group.bench_function("ack_response", |b| {
        b.iter(|| ChapterCodec.decode_ack_response(black_box("ok;12;3457")))
    });

    group.finish();
}

fn bench_sync_summary(c: &mut Criterion) {
    let line = r#"{"billing":{"read":120,"notRead":4,"reboot":1},"audit":{"read":9,"notRead":0,"reboot":0}}"#;
    c.bench_function("sync_summary_parse", |b| {
        b.iter(|| SyncSummary::parse(black_box(line)))
    });
}

fn bench_line_framing(c: &mut Criterion) {
    let mut group = c.benchmark_group("line_framing");

    for size in [16usize, 256, 4096] {
        let payload = "x".repeat(size);
        let mut encoded = BytesMut::new();
        for _ in 0..64 {
            encode_line(&format!("msg;1;2;false;t;{}", payload), &mut encoded);
        }
        let encoded = encoded.freeze();

        group.throughput(Throughput::Bytes(encoded.len() as u64));
        group.bench_with_input(BenchmarkId::new("decode_64_lines", size), &encoded, |b, input| {
            b.iter(|| {
                let mut buf = BytesMut::from(&input[..]);
                let mut count = 0;
                while let Ok(Some(line)) = decode_line(&mut buf, 64 * 1024) {
                    black_box(line);
                    count += 1;
                }
                count
            })
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_decode_delivery,
    bench_sync_summary,
    bench_line_framing
);
criterion_main!(benches);
