//! Benchmarks for the Gray-Scott step.

use std::thread;

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};

use gray_scott::{
    compute::{GrayScott, SelfTransport, ThreadTransport},
    schema::Settings,
};

fn settings(size: usize) -> Settings {
    Settings {
        extent: [size, size, size],
        noise: 0.01,
        seed: Some(1),
        ..Default::default()
    }
}

fn bench_single_rank_step(c: &mut Criterion) {
    let mut group = c.benchmark_group("single_rank_step");

    for size in [16, 32, 64, 128] {
        let mut sim = GrayScott::new(settings(size), SelfTransport).unwrap();
        sim.init().unwrap();

        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{}^3", size)),
            &size,
            |b, _| {
                b.iter(|| {
                    black_box(&mut sim).iterate().unwrap();
                });
            },
        );
    }

    group.finish();
}

fn bench_decomposed_steps(c: &mut Criterion) {
    let mut group = c.benchmark_group("decomposed_10_steps");
    group.sample_size(10);

    for ranks in [1, 2, 4, 8] {
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{}_ranks", ranks)),
            &ranks,
            |b, &ranks| {
                b.iter(|| {
                    let handles: Vec<_> = ThreadTransport::universe(ranks)
                        .into_iter()
                        .map(|transport| {
                            thread::spawn(move || {
                                let mut sim = GrayScott::new(settings(64), transport).unwrap();
                                sim.init().unwrap();
                                for _ in 0..10 {
                                    sim.iterate().unwrap();
                                }
                            })
                        })
                        .collect();
                    for h in handles {
                        h.join().unwrap();
                    }
                });
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_single_rank_step, bench_decomposed_steps);
criterion_main!(benches);
