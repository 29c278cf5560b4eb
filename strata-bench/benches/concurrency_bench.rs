//! Concurrent maintenance benchmarks

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use std::hint::black_box;
use std::thread;
use strata_bench::config::{layouts, StoreType};
use strata_bench::data_gen::generate_intervals;
use strata_bench::stores::{create_db, load_index};

fn bench_concurrent_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("Concurrency/Insert");
    let entries = generate_intervals(1_000);

    for threads in [1usize, 2, 4].iter() {
        for layout in layouts() {
            group.bench_with_input(
                BenchmarkId::new(layout.name.clone(), threads),
                threads,
                |b, &threads| {
                    b.iter_with_setup(
                        || {
                            let ctx = create_db(StoreType::InMemory).unwrap();
                            let index = load_index(&ctx, &layout.options, &[], 1).unwrap();
                            (ctx, index)
                        },
                        |(ctx, index)| {
                            let chunk_size = entries.len().div_ceil(threads);
                            thread::scope(|scope| {
                                for chunk in entries.chunks(chunk_size) {
                                    let db = ctx.db().clone();
                                    let index = index.clone();
                                    scope.spawn(move || {
                                        for entry in chunk {
                                            db.run(|tx| {
                                                index.maintain(
                                                    tx,
                                                    None,
                                                    Some(&entry.key),
                                                    &entry.primary_key,
                                                )?;
                                                Ok(())
                                            })
                                            .unwrap();
                                        }
                                    });
                                }
                            });
                            black_box(index);
                            ctx
                        },
                    );
                },
            );
        }
    }

    group.finish();
}

criterion_group!(benches, bench_concurrent_insert);
criterion_main!(benches);
