/*
Measures the record store under contention: writer threads append while reader
threads hammer count() (lock-free) or snapshot() (shared lock), plus the end-to-end
cost of pushing a fixed number of readings through the rendezvous pipeline.
*/

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};

use sensor_pipeline::{
    pipeline::{
        filter::FilterBounds,
        reading::{celsius_to_fahrenheit, Processed, Reading},
        Pipeline, Store,
    },
    utils::config::PipelineConfig,
};
use std::{
    hint::black_box,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
    time::{Duration, Instant},
};

//Number of concurrent writer threads appending to the same Store
const WRITER_COUNTS: &[usize] = &[1, 2, 4, 8];

//Appends each writer performs per iteration
const OPS_PER_WRITER: usize = 5_000;

#[derive(Debug, Clone, Copy)]
enum ReaderMode {
    Count,
    Snapshot,
}

fn record(seq: u64) -> Processed {
    let celsius = 25.0 + (seq % 10) as f64;
    Processed {
        reading: Reading {
            sensor_id: Arc::from("bench"),
            seq,
            celsius,
            at: Instant::now(),
        },
        fahrenheit: celsius_to_fahrenheit(celsius),
    }
}

fn bench_store_contention(c: &mut Criterion) {
    let mut group = c.benchmark_group("store_append_contention");
    group.sample_size(10);

    for mode in [ReaderMode::Count, ReaderMode::Snapshot] {
        for &writers in WRITER_COUNTS {
            group.bench_with_input(
                BenchmarkId::new(format!("{:?}", mode), writers),
                &writers,
                |b, &writers| {
                    b.iter(|| {
                        let store = Arc::new(Store::new());
                        let stop = Arc::new(AtomicBool::new(false));

                        // One background reader competing with the writers
                        let reader = {
                            let s = store.clone();
                            let stop = stop.clone();
                            thread::spawn(move || {
                                while !stop.load(Ordering::Relaxed) {
                                    match mode {
                                        ReaderMode::Count => {
                                            black_box(s.count());
                                        }
                                        ReaderMode::Snapshot => {
                                            black_box(s.snapshot().len());
                                        }
                                    }
                                }
                            })
                        };

                        let mut handles = Vec::with_capacity(writers);
                        for w in 0..writers {
                            let s = store.clone();
                            handles.push(thread::spawn(move || {
                                for i in 0..OPS_PER_WRITER {
                                    s.append(record((w * OPS_PER_WRITER + i) as u64));
                                }
                            }));
                        }

                        for h in handles {
                            let _ = h.join();
                        }
                        stop.store(true, Ordering::Relaxed);
                        let _ = reader.join();

                        black_box(store.count());
                    });
                },
            );
        }
    }

    group.finish();
}

fn bench_pipeline_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("pipeline_throughput");
    group.sample_size(10);
    group.measurement_time(Duration::from_secs(10));

    for &samples in &[100i64, 1_000] {
        group.bench_with_input(BenchmarkId::new("rendezvous", samples), &samples, |b, &n| {
            b.iter(|| {
                let config = PipelineConfig {
                    samples: n,
                    interval: Duration::ZERO,
                    bounds: FilterBounds::new(-50.0, 100.0, 30.0),
                    ..Default::default()
                };
                match Pipeline::new(config).and_then(|p| p.run()) {
                    Ok(report) => black_box(report.kept),
                    Err(_) => 0,
                }
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_store_contention, bench_pipeline_throughput);
criterion_main!(benches);
