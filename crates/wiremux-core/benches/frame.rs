//! Frame codec benchmarks

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use wiremux_core::frame::{pack, parse_header, HEADER_LEN};

fn bench_pack(c: &mut Criterion) {
    let payload = vec![0x5au8; 1024];
    c.bench_function("pack_1k", |b| {
        b.iter(|| pack(black_box(&payload)).unwrap());
    });
}

fn bench_parse_header(c: &mut Criterion) {
    let frame = pack(&[0u8; 1024]).unwrap();
    let mut header = [0u8; HEADER_LEN];
    header.copy_from_slice(&frame[..HEADER_LEN]);
    c.bench_function("parse_header", |b| {
        b.iter(|| parse_header(black_box(&header)).unwrap());
    });
}

criterion_group!(benches, bench_pack, bench_parse_header);
criterion_main!(benches);
