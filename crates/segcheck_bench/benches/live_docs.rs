//! Live-docs codec benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use segcheck_bench::{descriptor, pattern};
use segcheck_core::codec::{inspect_live_docs, AdaptiveLiveDocsFormat, DenseLiveDocsFormat};
use segcheck_core::{Bits, LiveDocsFormat, PredicateBits};
use segcheck_storage::{Directory, IoContext, RamDirectory};

const MAX_DOCS: u32 = 1 << 20;

/// Live fractions covering each encoding the adaptive format picks.
const SHAPES: [(&str, u32); 3] = [
    ("sparse_live", MAX_DOCS / 100),
    ("half", MAX_DOCS / 2),
    ("sparse_deleted", MAX_DOCS - MAX_DOCS / 100),
];

fn write_once(format: &dyn LiveDocsFormat, bits: &dyn Bits, live: u32) -> RamDirectory {
    let dir = RamDirectory::new();
    let segment = descriptor("_b", MAX_DOCS);
    format
        .write_live_docs(bits, &dir, &segment, MAX_DOCS - live, &IoContext::Default)
        .unwrap();
    dir
}

/// Benchmark writing live docs from a concrete bitset and from a predicate.
fn bench_write(c: &mut Criterion) {
    let mut group = c.benchmark_group("live_docs_write");
    group.throughput(Throughput::Elements(u64::from(MAX_DOCS)));

    for (shape, live) in SHAPES {
        let bits = pattern(MAX_DOCS, live);
        group.bench_with_input(BenchmarkId::new("fixed_bit_set", shape), &bits, |b, bits| {
            b.iter(|| black_box(write_once(&AdaptiveLiveDocsFormat, bits, live)));
        });
        group.bench_with_input(BenchmarkId::new("predicate", shape), &bits, |b, bits| {
            let opaque = PredicateBits::new(MAX_DOCS, |doc| bits.get(doc));
            b.iter(|| black_box(write_once(&AdaptiveLiveDocsFormat, &opaque, live)));
        });
    }

    group.finish();
}

/// Benchmark reading live docs back, adaptive versus always-dense.
fn bench_read(c: &mut Criterion) {
    let mut group = c.benchmark_group("live_docs_read");
    group.throughput(Throughput::Elements(u64::from(MAX_DOCS)));
    let formats: [(&str, &dyn LiveDocsFormat); 2] = [
        ("adaptive", &AdaptiveLiveDocsFormat),
        ("dense", &DenseLiveDocsFormat),
    ];

    for (shape, live) in SHAPES {
        let bits = pattern(MAX_DOCS, live);
        for (name, format) in formats {
            let dir = write_once(format, &bits, live);
            let segment = descriptor("_b", MAX_DOCS)
                .advance_del_gen(MAX_DOCS - live)
                .unwrap();
            group.bench_function(BenchmarkId::new(name, shape), |b| {
                b.iter(|| {
                    let read = format
                        .read_live_docs(&dir, black_box(&segment), &IoContext::ReadOnce)
                        .unwrap();
                    black_box(read);
                });
            });
        }
    }

    group.finish();
}

/// Benchmark header and checksum validation alone.
fn bench_inspect(c: &mut Criterion) {
    let bits = pattern(MAX_DOCS, MAX_DOCS / 2);
    let dir = write_once(&DenseLiveDocsFormat, &bits, MAX_DOCS / 2);
    let name = descriptor("_b", MAX_DOCS).live_docs_file_name(1);
    let bytes = dir.read_file(&name, &IoContext::ReadOnce).unwrap();

    let mut group = c.benchmark_group("live_docs_inspect");
    group.throughput(Throughput::Bytes(bytes.len() as u64));
    group.bench_function("dense_1m", |b| {
        b.iter(|| black_box(inspect_live_docs(black_box(&bytes)).unwrap()));
    });
    group.finish();
}

criterion_group!(benches, bench_write, bench_read, bench_inspect);
criterion_main!(benches);
