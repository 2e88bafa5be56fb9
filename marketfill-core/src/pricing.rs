//! Fair price model and the derived per-item price model.
//!
//! The fair price of an item on a given day is the mean, over every day in
//! the trailing window that has at least one hub sell observation, of that
//! day's lowest hub sell price. Days without a hub observation are skipped,
//! and an empty window yields no fair price.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::domain::{ItemModel, ItemSummary, ModelPrices, Note, StationId, TypeId};
use crate::history::{store::window_start, HistoryError, PriceHistory};

/// Jita 4-4, Dodixie FNAP, Amarr EFA.
pub const DEFAULT_HUB_STATIONS: [StationId; 3] = [
    StationId(60003760),
    StationId(60011866),
    StationId(60008494),
];

/// Pricing facts for one item on one day.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ItemPricing {
    pub fair_price: Option<f64>,
    /// `(sell, sell_volume)` recorded for the exact day, keyed by station.
    pub other_stations: HashMap<StationId, (Option<f64>, Option<u64>)>,
}

/// Multipliers applied to the fair price.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PriceMarkup {
    pub buy: f64,
    pub new_sell: f64,
    pub sell: f64,
}

impl Default for PriceMarkup {
    fn default() -> Self {
        Self {
            buy: 1.01,
            new_sell: 1.24,
            sell: 1.26,
        }
    }
}

pub struct FairPriceModel<'a> {
    history: &'a PriceHistory,
    hubs: HashSet<StationId>,
    window_months: u32,
}

impl<'a> FairPriceModel<'a> {
    pub fn new(
        history: &'a PriceHistory,
        hubs: impl IntoIterator<Item = StationId>,
        window_months: u32,
    ) -> Self {
        Self {
            history,
            hubs: hubs.into_iter().collect(),
            window_months,
        }
    }

    pub fn get_pricing(&self, type_id: TypeId, date: NaiveDate) -> Result<ItemPricing, HistoryError> {
        let other_stations = self
            .history
            .on_date(type_id, date)
            .map(|r| (r.station_id, (r.sell, r.sell_volume)))
            .collect();

        let after = window_start(date, self.window_months)?;
        let mut daily_min: BTreeMap<NaiveDate, f64> = BTreeMap::new();
        for r in self.history.in_window(type_id, after, date, &self.hubs) {
            let Some(sell) = r.sell else { continue };
            daily_min
                .entry(r.date)
                .and_modify(|m| *m = m.min(sell))
                .or_insert(sell);
        }
        let fair_price = if daily_min.is_empty() {
            None
        } else {
            Some(daily_min.values().sum::<f64>() / daily_min.len() as f64)
        };

        Ok(ItemPricing {
            fair_price,
            other_stations,
        })
    }
}

/// Build the run's price model for one basket item.
pub fn price_item(summary: ItemSummary, pricing: &ItemPricing, markup: &PriceMarkup) -> ItemModel {
    match pricing.fair_price {
        Some(fair) => ItemModel::priced(
            summary,
            ModelPrices {
                buy: fair * markup.buy,
                sell: fair * markup.sell,
                new_sell: fair * markup.new_sell,
            },
        ),
        None => {
            let mut model = ItemModel::unpriced(summary);
            model.notes.push(Note::NoFairPrice);
            model
        }
    }
}
