//! In-memory price-history rows and the two lookups the fair price model needs.

use std::collections::{HashMap, HashSet};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::domain::{StationId, TypeId};

/// Best prices for one item at one station on one day.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceRecord {
    pub date: NaiveDate,
    pub type_id: TypeId,
    pub station_id: StationId,
    /// Highest buy order price; `None` when the station had no buy orders.
    pub buy: Option<f64>,
    /// Lowest sell order price; `None` when the station had no sell orders.
    pub sell: Option<f64>,
    /// Volume listed within 1% of the lowest sell price.
    pub sell_volume: Option<u64>,
}

/// Price history indexed by item, each item's rows sorted by date.
#[derive(Debug, Clone, Default)]
pub struct PriceHistory {
    by_type: HashMap<TypeId, Vec<PriceRecord>>,
}

impl PriceHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records(records: impl IntoIterator<Item = PriceRecord>) -> Self {
        let mut history = Self::new();
        for record in records {
            history.by_type.entry(record.type_id).or_default().push(record);
        }
        for rows in history.by_type.values_mut() {
            rows.sort_by_key(|r| (r.date, r.station_id));
        }
        history
    }

    pub fn len(&self) -> usize {
        self.by_type.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.by_type.is_empty()
    }

    /// Rows for `type_id` recorded exactly on `date`, one per station.
    pub fn on_date(&self, type_id: TypeId, date: NaiveDate) -> impl Iterator<Item = &PriceRecord> {
        self.rows(type_id).iter().filter(move |r| r.date == date)
    }

    /// Rows for `type_id` with `after < date <= until` at any of `stations`.
    pub fn in_window<'a>(
        &'a self,
        type_id: TypeId,
        after: NaiveDate,
        until: NaiveDate,
        stations: &'a HashSet<StationId>,
    ) -> impl Iterator<Item = &'a PriceRecord> + 'a {
        self.rows(type_id)
            .iter()
            .skip_while(move |r| r.date <= after)
            .take_while(move |r| r.date <= until)
            .filter(move |r| stations.contains(&r.station_id))
    }

    fn rows(&self, type_id: TypeId) -> &[PriceRecord] {
        self.by_type
            .get(&type_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}
