//! Criterion benchmarks for the orderset hot paths.
//!
//! Benchmarks:
//! 1. Record decode over a synthetic tab-separated orderset
//! 2. Stock aggregation over the decoded stream

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::collections::{HashMap, HashSet};

use marketfill_core::domain::{ItemModel, ItemSummary, ModelPrices, StationId, TypeId};
use marketfill_core::orderset::OrdersetStream;
use marketfill_core::stock::aggregate;

// ── Helpers ──────────────────────────────────────────────────────────

fn make_orderset(stations: i64, items: i64, orders_per_item: i64) -> String {
    let mut out = String::new();
    for station in 0..stations {
        for item in 0..items {
            for n in 0..orders_per_item {
                let price = 50.0 + ((item * 7 + n * 13) % 100) as f64;
                let is_buy = if n % 3 == 0 { "True" } else { "False" };
                out.push_str(&format!(
                    "1\t{}\t2024-01-01T00:00:00Z\t{is_buy}\t{}\t100\t1\t{price}\t{}\tregion\t90\t1\t42\n",
                    1000 + item,
                    10 + n,
                    60000000 + station
                ));
            }
        }
    }
    out
}

fn make_models(items: i64) -> HashMap<TypeId, ItemModel> {
    (0..items)
        .map(|i| {
            let id = TypeId(1000 + i);
            let model = ItemModel::priced(
                ItemSummary {
                    id,
                    name: format!("item {i}"),
                    group_id: 1,
                    category_id: 1,
                    market_group: "mgroup".into(),
                    value_traded: 1e9,
                    reference_buy: None,
                    reference_sell: None,
                },
                ModelPrices {
                    buy: 80.0,
                    sell: 100.0,
                    new_sell: 100.0,
                },
            );
            (id, model)
        })
        .collect()
}

// ── 1. Decode ────────────────────────────────────────────────────────

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("orderset_decode");
    for &items in &[100i64, 1000] {
        let input = make_orderset(5, items, 8);
        group.bench_with_input(BenchmarkId::from_parameter(items), &input, |b, input| {
            b.iter(|| {
                let count = OrdersetStream::from_reader(input.as_bytes()).count();
                black_box(count)
            })
        });
    }
    group.finish();
}

// ── 2. Aggregate ─────────────────────────────────────────────────────

fn bench_aggregate(c: &mut Criterion) {
    let mut group = c.benchmark_group("stock_aggregate");
    for &items in &[100i64, 1000] {
        let input = make_orderset(5, items, 8);
        let models = make_models(items);
        let stations: HashSet<_> = (0..3).map(|s| StationId(60000000 + s)).collect();
        group.bench_with_input(BenchmarkId::from_parameter(items), &input, |b, input| {
            b.iter(|| {
                let stream = OrdersetStream::from_reader(input.as_bytes()).orders();
                let agg = aggregate(stream, &models, &stations);
                black_box(agg.map(|a| a.stock.len()))
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_decode, bench_aggregate);
criterion_main!(benches);
