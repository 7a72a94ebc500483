// Virtual page cache benchmarks: hit-path lookup, eviction under
// Second-Chance, and sequential write throughput.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use tempfile::NamedTempFile;
use vpcache::{VirtualPageCache, Whence};

const PAGE_SIZE: usize = 4096;

fn open_cache(cache_size_pages: usize) -> (VirtualPageCache, NamedTempFile) {
    let cache = VirtualPageCache::new();
    cache.init(cache_size_pages, PAGE_SIZE).unwrap();
    let tmp = NamedTempFile::new().unwrap();
    (cache, tmp)
}

fn bench_hit_path(c: &mut Criterion) {
    let (cache, tmp) = open_cache(256);
    let handle = cache.open(tmp.path()).unwrap();
    let buf = vec![0xABu8; PAGE_SIZE];
    cache.write(handle, &buf).unwrap();

    c.bench_function("read_hit", |b| {
        b.iter(|| {
            cache.lseek(handle, 0, Whence::Start).unwrap();
            let mut out = vec![0u8; PAGE_SIZE];
            cache.read(black_box(handle), &mut out).unwrap();
        });
    });
}

fn bench_eviction(c: &mut Criterion) {
    let mut group = c.benchmark_group("eviction_under_pressure");

    for cache_size_pages in [16usize, 64, 128] {
        group.bench_with_input(
            BenchmarkId::from_parameter(cache_size_pages),
            &cache_size_pages,
            |b, &cache_size_pages| {
                let (cache, tmp) = open_cache(cache_size_pages);
                let handle = cache.open(tmp.path()).unwrap();
                let page = vec![0x11u8; PAGE_SIZE];

                b.iter(|| {
                    for block in 0..(cache_size_pages * 2) {
                        cache.lseek(handle, (block * PAGE_SIZE) as i64, Whence::Start).unwrap();
                        cache.write(black_box(handle), &page).unwrap();
                    }
                });
            },
        );
    }

    group.finish();
}

fn bench_sequential_write(c: &mut Criterion) {
    let (cache, tmp) = open_cache(256);
    let handle = cache.open(tmp.path()).unwrap();
    let chunk = vec![0x42u8; PAGE_SIZE];

    c.bench_function("sequential_write", |b| {
        b.iter(|| {
            cache.lseek(handle, 0, Whence::Start).unwrap();
            for _ in 0..64 {
                cache.write(black_box(handle), &chunk).unwrap();
            }
        });
    });
}

criterion_group!(benches, bench_hit_path, bench_eviction, bench_sequential_write);
criterion_main!(benches);
