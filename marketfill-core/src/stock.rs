//! Single-pass aggregation of sell-side supply per item and station.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::domain::{ItemModel, Order, StationId, TypeId};
use crate::orderset::{OrdersetError, OrdersetStream};

/// Sell volume at one station priced strictly below each model threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StationStock {
    pub below_buy: u64,
    pub below_sell: u64,
}

/// Cheapest sell order seen for an item across the aggregated stations.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LowestSell {
    pub price: f64,
    pub station: StationId,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StockAggregate {
    pub stock: HashMap<TypeId, HashMap<StationId, StationStock>>,
    pub lowest_sell: HashMap<TypeId, LowestSell>,
}

impl StockAggregate {
    /// Stock at `station`, zero when nothing was recorded there.
    pub fn at(&self, type_id: TypeId, station: StationId) -> StationStock {
        self.stock
            .get(&type_id)
            .and_then(|s| s.get(&station))
            .copied()
            .unwrap_or_default()
    }

    pub fn stations(&self, type_id: TypeId) -> Option<&HashMap<StationId, StationStock>> {
        self.stock.get(&type_id)
    }

    pub fn lowest(&self, type_id: TypeId) -> Option<LowestSell> {
        self.lowest_sell.get(&type_id).copied()
    }
}

/// Fold `orders` into per-station stock for every priced model.
///
/// Buy orders, orders at stations outside `stations`, and orders for items
/// without a priced model are ignored. The terminator fails every filter.
pub fn aggregate<I>(
    orders: I,
    models: &HashMap<TypeId, ItemModel>,
    stations: &HashSet<StationId>,
) -> Result<StockAggregate, OrdersetError>
where
    I: IntoIterator<Item = Result<Order, OrdersetError>>,
{
    let mut out = StockAggregate::default();
    for order in orders {
        let order = order?;
        if order.is_buy || !stations.contains(&order.station_id) {
            continue;
        }
        let Some(prices) = models.get(&order.type_id).and_then(|m| m.prices) else {
            continue;
        };

        let below_buy = order.price < prices.buy;
        let below_sell = order.price < prices.sell;
        if below_buy || below_sell {
            let entry = out
                .stock
                .entry(order.type_id)
                .or_default()
                .entry(order.station_id)
                .or_default();
            if below_buy {
                entry.below_buy += order.volume;
            }
            if below_sell {
                entry.below_sell += order.volume;
            }
        }

        let lower = out
            .lowest_sell
            .get(&order.type_id)
            .map_or(true, |l| order.price < l.price);
        if lower {
            out.lowest_sell.insert(
                order.type_id,
                LowestSell {
                    price: order.price,
                    station: order.station_id,
                },
            );
        }
    }
    Ok(out)
}

/// Run [`aggregate`] over an orderset file.
pub fn aggregate_file(
    path: &Path,
    models: &HashMap<TypeId, ItemModel>,
    stations: &HashSet<StationId>,
) -> Result<StockAggregate, OrdersetError> {
    aggregate(OrdersetStream::open(path)?.orders(), models, stations)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ItemSummary, ModelPrices};

    const DEST: StationId = StationId(1);
    const SRC: StationId = StationId(2);
    const ELSEWHERE: StationId = StationId(3);

    fn models() -> HashMap<TypeId, ItemModel> {
        let summary = |id: i64| ItemSummary {
            id: TypeId(id),
            name: format!("item {id}"),
            group_id: 1,
            category_id: 1,
            market_group: "mgroup".into(),
            value_traded: 10_000.0,
            reference_buy: None,
            reference_sell: None,
        };
        let mut m = HashMap::new();
        m.insert(
            TypeId(10),
            ItemModel::priced(
                summary(10),
                ModelPrices {
                    buy: 80.0,
                    sell: 90.0,
                    new_sell: 90.0,
                },
            ),
        );
        m.insert(TypeId(11), ItemModel::unpriced(summary(11)));
        m
    }

    fn sell(type_id: i64, station: StationId, price: f64, volume: u64) -> Result<Order, OrdersetError> {
        Ok(Order {
            type_id: TypeId(type_id),
            station_id: station,
            is_buy: false,
            price,
            volume,
            date: None,
        })
    }

    fn stations() -> HashSet<StationId> {
        [DEST, SRC].into_iter().collect()
    }

    #[test]
    fn counts_between_below_and_above_thresholds() {
        let orders = vec![
            sell(10, DEST, 70.0, 1),  // below both
            sell(10, DEST, 85.0, 10), // between buy and sell
            sell(10, DEST, 95.0, 100), // above both
            Ok(Order::terminator()),
        ];
        let agg = aggregate(orders, &models(), &stations()).unwrap();
        assert_eq!(
            agg.at(TypeId(10), DEST),
            StationStock {
                below_buy: 1,
                below_sell: 11
            }
        );
        assert_eq!(
            agg.lowest(TypeId(10)),
            Some(LowestSell {
                price: 70.0,
                station: DEST
            })
        );
    }

    #[test]
    fn ignores_buys_foreign_stations_and_unpriced_items() {
        let mut buy = sell(10, DEST, 1.0, 1000).unwrap();
        buy.is_buy = true;
        let orders = vec![
            Ok(buy),
            sell(10, ELSEWHERE, 1.0, 1000),
            sell(11, DEST, 1.0, 1000),
            sell(99, DEST, 1.0, 1000),
        ];
        let agg = aggregate(orders, &models(), &stations()).unwrap();
        assert!(agg.stock.is_empty());
        assert!(agg.lowest_sell.is_empty());
    }

    #[test]
    fn expensive_orders_only_move_lowest_sell() {
        let agg = aggregate(vec![sell(10, SRC, 200.0, 5)], &models(), &stations()).unwrap();
        assert!(agg.stations(TypeId(10)).is_none());
        assert_eq!(agg.lowest(TypeId(10)).map(|l| l.station), Some(SRC));
    }

    #[test]
    fn first_lowest_wins_ties() {
        let orders = vec![sell(10, DEST, 50.0, 1), sell(10, SRC, 50.0, 1)];
        let agg = aggregate(orders, &models(), &stations()).unwrap();
        assert_eq!(agg.lowest(TypeId(10)).map(|l| l.station), Some(DEST));
    }

    #[test]
    fn stream_error_aborts() {
        let orders = vec![
            sell(10, DEST, 50.0, 1),
            Err(OrdersetError::Arity {
                line: 2,
                expected: 13,
                found: 1,
            }),
        ];
        assert!(aggregate(orders, &models(), &stations()).is_err());
    }
}
