//! Index scan benchmarks

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use std::hint::black_box;
use strata_bench::config::{layouts, StoreType};
use strata_bench::data_gen::{generate_intervals, generate_overlap_query};
use strata_bench::stores::{create_db, load_index};
use strata_rtree::{Continuation, EvaluationContext};

fn bench_overlap_query(c: &mut Criterion) {
    let mut group = c.benchmark_group("Scan/Overlap Query");

    for size in [1_000usize, 10_000].iter() {
        let entries = generate_intervals(*size);
        for layout in layouts() {
            for store_type in [StoreType::InMemory, StoreType::Fjall] {
                let ctx = create_db(store_type).unwrap();
                let index = load_index(&ctx, &layout.options, &entries, 500).unwrap();

                group.bench_function(
                    BenchmarkId::new(format!("{}/{}", store_type, layout.name), size),
                    |b| {
                        b.iter_with_setup(
                            || {
                                index
                                    .bind(&generate_overlap_query(6 * 3600), &EvaluationContext::empty())
                                    .unwrap()
                            },
                            |bounds| {
                                let page = ctx
                                    .db()
                                    .run(|tx| Ok(index.scan(tx, &bounds, None, None)?))
                                    .unwrap();
                                black_box(page.results.len())
                            },
                        );
                    },
                );
            }
        }
    }

    group.finish();
}

fn bench_paginated_scan(c: &mut Criterion) {
    let mut group = c.benchmark_group("Scan/Paginated");

    for page_size in [10usize, 100].iter() {
        let entries = generate_intervals(10_000);
        for layout in layouts() {
            let ctx = create_db(StoreType::InMemory).unwrap();
            let index = load_index(&ctx, &layout.options, &entries, 500).unwrap();
            let bounds = index
                .bind(&generate_overlap_query(5 * 86_400), &EvaluationContext::empty())
                .unwrap();

            group.bench_function(BenchmarkId::new(layout.name.clone(), page_size), |b| {
                b.iter(|| {
                    let mut continuation: Option<Continuation> = None;
                    let mut total = 0;
                    loop {
                        let page = ctx
                            .db()
                            .run(|tx| {
                                Ok(index.scan(tx, &bounds, continuation.as_ref(), Some(*page_size))?)
                            })
                            .unwrap();
                        total += page.results.len();
                        match page.continuation {
                            Some(next) => continuation = Some(next),
                            None => break,
                        }
                    }
                    black_box(total)
                });
            });
        }
    }

    group.finish();
}

criterion_group!(benches, bench_overlap_query, bench_paginated_scan);
criterion_main!(benches);
