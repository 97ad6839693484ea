use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use rand::Rng;

/// Run-structured bytes, compressible but not trivially so.
fn test_data(len: usize) -> Vec<u8> {
    let mut rng = rand::thread_rng();
    let mut data = vec![0u8; len];
    let mut run = 0u8;
    for byte in &mut data {
        if rng.gen_range(0..8) == 0 {
            run = rng.gen();
        }
        *byte = run;
    }
    data
}

fn inflate(c: &mut Criterion) {
    let data = test_data(1 << 20);
    let raw = miniz_oxide::deflate::compress_to_vec(&data, 6);
    let zlib = miniz_oxide::deflate::compress_to_vec_zlib(&data, 6);

    let mut group = c.benchmark_group("inflate");
    group.throughput(Throughput::Bytes(data.len() as u64));
    group.bench_function("raw", |b| {
        b.iter(|| inflex::inflate_to_vec(black_box(&raw)).unwrap())
    });
    group.bench_function("zlib", |b| {
        b.iter(|| inflex::zlib_inflate_to_vec(black_box(&zlib)).unwrap())
    });
    group.finish();
}

fn regex(c: &mut Criterion) {
    let mut rng = rand::thread_rng();
    let mut haystack = vec![0u8; 1 << 16];
    for byte in &mut haystack {
        *byte = rng.gen_range(b'a'..=b'z');
    }
    haystack.extend_from_slice(b"needle-2024");

    let plain = inflex::Regex::new("needle-\\d+").unwrap();
    let grouped = inflex::Regex::new("(ne+dle)-(\\d+)").unwrap();

    let mut group = c.benchmark_group("regex_search");
    group.throughput(Throughput::Bytes(haystack.len() as u64));
    group.bench_function("plain", |b| {
        b.iter(|| plain.search(black_box(&haystack)).unwrap().start())
    });
    group.bench_function("captures", |b| {
        b.iter(|| grouped.search(black_box(&haystack)).unwrap().start())
    });
    group.finish();
}

criterion_group!(benches, inflate, regex);
criterion_main!(benches);
