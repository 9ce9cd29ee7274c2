//! Directory benchmarks: in-memory versus file-backed live-docs files.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use segcheck_storage::{Directory, FsDirectory, IoContext, RamDirectory};
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::TempDir;

/// Payload sizes of a dense live-docs file at 1K, 64K and 1M docs.
const SIZES: [usize; 3] = [128, 8 * 1024, 128 * 1024];

fn payload(size: usize) -> Vec<u8> {
    (0..size).map(|i| (i % 251) as u8).collect()
}

fn bench_write(c: &mut Criterion, label: &str, dir: &dyn Directory) {
    let mut group = c.benchmark_group(format!("{label}_write"));
    group.sample_size(50);
    let counter = AtomicUsize::new(0);

    for size in SIZES {
        let data = payload(size);
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &data, |b, data| {
            b.iter(|| {
                let name = format!("_w{}.liv", counter.fetch_add(1, Ordering::Relaxed));
                dir.write_file(&name, black_box(data), &IoContext::Default)
                    .unwrap();
                dir.delete_file(&name).unwrap();
            });
        });
    }
    group.finish();
}

fn bench_read(c: &mut Criterion, label: &str, dir: &dyn Directory) {
    let mut group = c.benchmark_group(format!("{label}_read"));

    for size in SIZES {
        let name = format!("_r{size}.liv");
        dir.write_file(&name, &payload(size), &IoContext::Default)
            .unwrap();
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_function(BenchmarkId::from_parameter(size), |b| {
            b.iter(|| black_box(dir.read_file(&name, &IoContext::ReadOnce).unwrap()));
        });
    }
    group.finish();
}

/// Benchmark the in-memory directory.
fn bench_ram(c: &mut Criterion) {
    let dir = RamDirectory::new();
    bench_write(c, "ram", &dir);
    bench_read(c, "ram", &dir);
}

/// Benchmark the file-system directory.
fn bench_fs(c: &mut Criterion) {
    let temp_dir = TempDir::new().unwrap();
    let dir = FsDirectory::open(temp_dir.path()).unwrap();
    bench_write(c, "fs", &dir);
    bench_read(c, "fs", &dir);
}

criterion_group!(benches, bench_ram, bench_fs);
criterion_main!(benches);
