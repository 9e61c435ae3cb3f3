//! Pooled versus fresh decoding of depth frames.
//!
//! Compares:
//! - `fresh`: `DepthUpdate::decode` per frame (new struct and vectors)
//! - `pooled`: acquire, `decode_into`, release
//! - `fanout`: pooled decode shared with several consumers via `retain`
//!
//! Run with: cargo bench --bench pool
//! Results saved to: target/criterion/

use std::hint::black_box;

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use depth_stream::{DepthUpdate, Pool};

// ============================================================================
// Fixtures
// ============================================================================

const LEVEL_COUNTS: &[usize] = &[1, 20, 100];

fn frame(levels: usize) -> Vec<u8> {
    let side = |base: f64| {
        (0..levels)
            .map(|i| format!(r#"["{:.2}","{:.4}"]"#, base + i as f64 * 0.01, 0.5 + i as f64))
            .collect::<Vec<_>>()
            .join(",")
    };
    format!(
        r#"{{"e":"depthUpdate","E":1700000000000,"s":"BTCUSDT","U":1,"u":2,"b":[{}],"a":[{}]}}"#,
        side(27000.0),
        side(27001.0)
    )
    .into_bytes()
}

// ============================================================================
// Benchmark: Decode
// ============================================================================

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode");

    for &levels in LEVEL_COUNTS {
        let payload = frame(levels);
        group.throughput(Throughput::Bytes(payload.len() as u64));

        group.bench_with_input(BenchmarkId::new("fresh", levels), &payload, |b, payload| {
            b.iter(|| black_box(DepthUpdate::decode(black_box(payload)).unwrap()));
        });

        let pool = Pool::new(DepthUpdate::default, DepthUpdate::reset);
        group.bench_with_input(BenchmarkId::new("pooled", levels), &payload, |b, payload| {
            b.iter(|| {
                let depth = pool.acquire();
                depth.write().decode_into(black_box(payload)).unwrap();
                black_box(depth.read().last_update_id);
                depth.release().unwrap();
            });
        });
    }

    group.finish();
}

// ============================================================================
// Benchmark: Fan-out
// ============================================================================

fn bench_fanout(c: &mut Criterion) {
    let mut group = c.benchmark_group("fanout");
    let payload = frame(20);
    let pool = Pool::new(DepthUpdate::default, DepthUpdate::reset);

    for consumers in [1usize, 4, 16] {
        group.bench_with_input(
            BenchmarkId::new("retain_release", consumers),
            &consumers,
            |b, &consumers| {
                b.iter(|| {
                    let depth = pool.acquire();
                    depth.write().decode_into(&payload).unwrap();
                    let handles: Vec<_> = (0..consumers).map(|_| depth.retain().unwrap()).collect();
                    depth.release().unwrap();
                    for handle in handles {
                        black_box(handle.read().bids.len());
                        handle.release().unwrap();
                    }
                });
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_decode, bench_fanout);
criterion_main!(benches);
