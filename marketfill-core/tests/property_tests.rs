//! Property tests for stream, accumulator and aggregator invariants.
//!
//! Uses proptest to verify:
//! 1. Grouping: `(station, type)` groups are contiguous and never repeat
//! 2. Info accumulator: date never decreases and the batch id never changes
//! 3. Aggregator: counters are subset tests, not a counter relationship
//! 4. Decision engine: quantities stay within the target

use proptest::prelude::*;
use std::collections::{HashMap, HashSet};

use marketfill_core::decision::{
    DecisionEngine, DecisionInput, DecisionPolicy, OrderSizeRule, OrderSizeRules, OwnOrder,
};
use marketfill_core::domain::{BatchId, ItemModel, ItemSummary, ModelPrices, Order, StationId, TypeId};
use marketfill_core::orderset::{OrderGroups, OrdersetInfoAccumulator, OrdersetStream};
use marketfill_core::stock::{aggregate, LowestSell, StationStock};

// ── Strategies (proptest) ────────────────────────────────────────────

fn arb_price() -> impl Strategy<Value = f64> {
    (1.0..200.0_f64).prop_map(|p| (p * 100.0).round() / 100.0)
}

/// A well-grouped orderset: distinct stations, each with distinct items.
fn arb_grouped_lines() -> impl Strategy<Value = Vec<String>> {
    prop::collection::btree_map(
        1i64..20,
        prop::collection::btree_map(1i64..50, prop::collection::vec((any::<bool>(), arb_price(), 1u64..1000), 1..4), 1..5),
        1..5,
    )
    .prop_map(|stations| {
        let mut lines = Vec::new();
        for (station, items) in stations {
            for (type_id, orders) in items {
                for (is_buy, price, volume) in orders {
                    lines.push(format!(
                        "1\t{type_id}\t2024-01-01T00:00:00Z\t{}\t{volume}\t{volume}\t1\t{price}\t{station}\tregion\t90\t1\t42",
                        if is_buy { "True" } else { "False" }
                    ));
                }
            }
        }
        lines
    })
}

fn order(station: i64, type_id: i64, price: f64, volume: u64) -> Order {
    Order {
        type_id: TypeId(type_id),
        station_id: StationId(station),
        is_buy: false,
        price,
        volume,
        date: None,
    }
}

fn model(buy: f64, sell: f64, new_sell: f64) -> ItemModel {
    ItemModel::priced(
        ItemSummary {
            id: TypeId(1),
            name: "Item1".into(),
            group_id: 1,
            category_id: 1,
            market_group: "mgroup".into(),
            value_traded: 10_000.0,
            reference_buy: None,
            reference_sell: None,
        },
        ModelPrices {
            buy,
            sell,
            new_sell,
        },
    )
}

// ── 1. Grouping ──────────────────────────────────────────────────────

proptest! {
    #[test]
    fn groups_never_repeat(lines in arb_grouped_lines()) {
        let input = lines.join("\n");
        let stream = OrdersetStream::from_reader(input.as_bytes());
        let groups: Vec<_> = OrderGroups::new(stream.orders()).collect::<Result<_, _>>().unwrap();

        let mut seen = HashSet::new();
        for g in &groups {
            prop_assert!(seen.insert((g.station_id, g.type_id)));
        }
        let total: usize = groups.iter().map(|g| g.orders.len()).sum();
        prop_assert_eq!(total, lines.len());
    }

    #[test]
    fn reversed_station_order_is_still_valid(lines in arb_grouped_lines()) {
        // Stations in any order are fine as long as each appears once.
        let mut reversed = lines.clone();
        reversed.reverse();
        let input = reversed.join("\n");
        let ok = OrdersetStream::from_reader(input.as_bytes()).all(|r| r.is_ok());
        prop_assert!(ok);
    }
}

// ── 2. Info accumulator ──────────────────────────────────────────────

proptest! {
    #[test]
    fn date_non_decreasing_and_batch_stable(
        days in prop::collection::vec((1u32..28, prop::bool::weighted(0.3)), 1..40)
    ) {
        let mut acc = OrdersetInfoAccumulator::new();
        let mut last = None;
        for (day, untagged) in days {
            let mut o = order(1, 1, 1.0, 1);
            o.date = chrono::NaiveDate::from_ymd_opt(2024, 2, day).and_then(|d| d.and_hms_opt(0, 0, 0));
            let batch = if untagged { BatchId::UNTAGGED } else { BatchId(7) };
            acc.observe(&o, batch).unwrap();
            let info = acc.info();
            prop_assert!(info.date >= last);
            last = info.date;
            if let Some(b) = info.orderset {
                prop_assert_eq!(b, BatchId(7));
            }
        }
    }

    #[test]
    fn second_batch_always_fails(a in 1i64..1000, b in 1i64..1000) {
        prop_assume!(a != b);
        let mut acc = OrdersetInfoAccumulator::new();
        acc.observe(&order(1, 1, 1.0, 1), BatchId(a)).unwrap();
        acc.observe(&order(1, 1, 1.0, 1), BatchId::UNTAGGED).unwrap();
        prop_assert!(acc.observe(&order(1, 1, 1.0, 1), BatchId(b)).is_err());
    }
}

// ── 3. Aggregator ────────────────────────────────────────────────────

proptest! {
    #[test]
    fn aggregator_counts_match_thresholds(
        buy in arb_price(),
        spread in 0.0..50.0_f64,
        orders in prop::collection::vec((arb_price(), 1u64..1000), 0..50)
    ) {
        let sell = buy + spread;
        let models: HashMap<_, _> = [(TypeId(1), model(buy, sell, sell))].into_iter().collect();
        let stations: HashSet<_> = [StationId(1)].into_iter().collect();

        let stream: Vec<_> = orders.iter().map(|&(p, v)| Ok(order(1, 1, p, v))).collect();
        let agg = aggregate(stream, &models, &stations).unwrap();
        let got = agg.at(TypeId(1), StationId(1));

        let expect_buy: u64 = orders.iter().filter(|(p, _)| *p < buy).map(|(_, v)| v).sum();
        let expect_sell: u64 = orders.iter().filter(|(p, _)| *p < sell).map(|(_, v)| v).sum();
        prop_assert_eq!(got, StationStock { below_buy: expect_buy, below_sell: expect_sell });
        // sell >= buy here, so every below-buy order also counts below sell
        prop_assert!(got.below_buy <= got.below_sell);

        let min = orders.iter().map(|(p, _)| *p).fold(None, |m: Option<f64>, p| Some(m.map_or(p, |m| m.min(p))));
        prop_assert_eq!(agg.lowest(TypeId(1)).map(|l| l.price), min);
    }
}

// ── 4. Decision engine ───────────────────────────────────────────────

proptest! {
    #[test]
    fn decision_quantities_are_bounded(
        dest_stock in 0u64..20,
        source_stock in 0u64..20,
        assets in 0u64..10,
        listed in prop::option::of((0u64..10, 80.0..120.0_f64)),
    ) {
        let rules = OrderSizeRules::new(vec![OrderSizeRule {
            prefix: "mgroup".into(),
            normal_market_size: 1,
            min_order_size: 1,
        }]);
        let engine = DecisionEngine::new(&rules, DecisionPolicy::default());
        let item = model(80.0, 90.0, 90.0);
        let stocks: HashMap<_, _> = [
            (StationId(1), StationStock { below_buy: 0, below_sell: dest_stock }),
            (StationId(2), StationStock { below_buy: source_stock, below_sell: source_stock }),
        ]
        .into_iter()
        .collect();
        let allowed: HashSet<_> = [StationId(2)].into_iter().collect();
        let order = listed.map(|(quantity, price)| OwnOrder { quantity, price });

        let r = engine.decide(&DecisionInput {
            destination: StationId(1),
            item: &item,
            station_stocks: Some(&stocks),
            lowest_sell: Some(LowestSell { price: 78.0, station: StationId(2) }),
            allowed_sources: &allowed,
            current_assets: assets,
            current_order: order,
            build_cost: None,
        }).unwrap();

        prop_assert!(r.stock_quantity <= 5);
        prop_assert!(r.sell_quantity <= r.stock_quantity);
        prop_assert!(r.buy_quantity <= source_stock);
        if r.buy_quantity > 0 {
            prop_assert_eq!(r.from_station, Some(StationId(2)));
        }
        if order.is_none() {
            // no listing: the whole destination stock counts against the target
            prop_assert_eq!(r.stock_quantity, 5u64.saturating_sub(dest_stock));
        }
    }
}
