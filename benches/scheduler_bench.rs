//! Benchmarks for pattern generation and the scheduler tick loop
//!
//! Run with: cargo bench --bench scheduler_bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use drome::clock::ManualClock;
use drome::error::DispatchError;
use drome::pattern_array::euclid;
use drome::scheduler::{Scheduler, SchedulerConfig};
use drome::timer::ManualTimer;
use drome::tone::ToneRequest;
use drome::voice::Voice;

/// Benchmark Bjorklund generation across pattern sizes
fn bench_euclid(c: &mut Criterion) {
    let mut group = c.benchmark_group("euclid");

    for steps in [8usize, 16, 64, 256] {
        group.bench_with_input(BenchmarkId::from_parameter(steps), &steps, |b, &steps| {
            b.iter(|| euclid(black_box(steps * 3 / 8), black_box(steps), black_box(1)));
        });
    }

    group.finish();
}

/// Benchmark one simulated second of polling with a growing voice count
fn bench_tick_loop(c: &mut Criterion) {
    let mut group = c.benchmark_group("tick_loop");

    for voices in [1usize, 8, 32] {
        group.bench_with_input(BenchmarkId::new("voices", voices), &voices, |b, &voices| {
            let clock = ManualClock::new(0.0);
            let timer = ManualTimer::new();
            let sink = |request: &ToneRequest| -> Result<(), DispatchError> {
                black_box(request);
                Ok(())
            };
            let config = SchedulerConfig {
                step_duration: 0.125,
                ..Default::default()
            };
            let scheduler = Scheduler::new(config, clock.clone(), timer.clone(), sink).unwrap();

            for i in 0..voices {
                let voice = Voice::new()
                    .note(&[48.0 + i as f64, 55.0, 60.0])
                    .unwrap()
                    .euclid(5, 16, i as i64)
                    .unwrap();
                scheduler.register_voice(voice, false);
            }
            scheduler.start();

            let mut now = 0.0;
            b.iter(|| {
                for _ in 0..10 {
                    now += 0.1;
                    clock.set(now);
                    timer.fire();
                }
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_euclid, bench_tick_loop);
criterion_main!(benches);
