//! Market-history ingestion: collapse an orderset into one day's price records.

use std::collections::HashSet;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use marketfill_core::domain::{BatchId, Order, StationId, TypeId};
use marketfill_core::history::{HistoryError, ParquetPriceStore, PriceRecord};
use marketfill_core::orderset::{read_orderset_info, OrderGroup, OrderGroups, OrdersetError, OrdersetStream};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Sell orders priced within this factor of the lowest sell count toward sell volume.
pub const SELL_VOLUME_BAND: f64 = 1.01;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("orderset error: {0}")]
    Orderset(#[from] OrdersetError),

    #[error("history error: {0}")]
    History(#[from] HistoryError),

    #[error("orderset '{}' carries no order dates", path.display())]
    NoDate { path: PathBuf },

    #[error("failed to read item filter '{}': {reason}", path.display())]
    Filter { path: PathBuf, reason: String },
}

/// Outcome of one ingestion.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IngestSummary {
    pub orderset: Option<BatchId>,
    pub date: NaiveDate,
    pub written: usize,
    pub skipped: usize,
    pub partition_rows: usize,
}

/// Summarise one `(station, item)` group.
pub fn price_record(group: &OrderGroup, date: NaiveDate) -> PriceRecord {
    let sell = group.best_sell();
    let sell_volume = sell.map(|lowest| {
        group
            .orders
            .iter()
            .filter(|o| !o.is_buy && o.price <= lowest * SELL_VOLUME_BAND)
            .map(|o| o.volume)
            .sum()
    });
    PriceRecord {
        date,
        type_id: group.type_id,
        station_id: group.station_id,
        buy: group.best_buy(),
        sell,
        sell_volume,
    }
}

/// Collapse an order stream into one record per group at `stations`.
///
/// Each group is summarised and dropped as soon as the next one starts.
pub fn price_records<'a, I>(
    orders: I,
    stations: &'a HashSet<StationId>,
    date: NaiveDate,
) -> impl Iterator<Item = Result<PriceRecord, OrdersetError>> + 'a
where
    I: Iterator<Item = Result<Order, OrdersetError>> + 'a,
{
    OrderGroups::new(orders).filter_map(move |group| match group {
        Ok(g) if !stations.contains(&g.station_id) => None,
        Ok(g) => Some(Ok(price_record(&g, date))),
        Err(e) => Some(Err(e)),
    })
}

/// Record the orderset's prices at `stations` as the partition for its date.
///
/// A first pass establishes the orderset's batch and date; the second streams
/// groups into records. `item_filter`, when given, limits which items are written.
pub fn add_orderset_to_history(
    orderset: &Path,
    store: &ParquetPriceStore,
    stations: &HashSet<StationId>,
    item_filter: Option<&HashSet<TypeId>>,
) -> Result<IngestSummary, IngestError> {
    tracing::info!(orderset = %orderset.display(), stations = stations.len(), "ingesting orderset");
    let info = read_orderset_info(orderset)?;
    let date = info
        .date
        .ok_or_else(|| IngestError::NoDate {
            path: orderset.to_path_buf(),
        })?
        .date();
    tracing::info!(orderset = ?info.orderset, %date, "orderset identified");

    let mut records = Vec::new();
    let mut skipped = 0;
    for record in price_records(OrdersetStream::open(orderset)?.orders(), stations, date) {
        let record = record?;
        if item_filter.is_some_and(|f| !f.contains(&record.type_id)) {
            skipped += 1;
            continue;
        }
        records.push(record);
    }

    let partition_rows = store.append_day(date, &records, info.orderset)?;
    tracing::info!(written = records.len(), skipped, "history updated");

    Ok(IngestSummary {
        orderset: info.orderset,
        date,
        written: records.len(),
        skipped,
        partition_rows,
    })
}

#[derive(Debug, Deserialize)]
struct FilterRow {
    #[serde(rename = "ID")]
    id: TypeId,
}

/// Item ids from a CSV with an `ID` column, such as a basket file.
pub fn read_filter_file(path: &Path) -> Result<HashSet<TypeId>, IngestError> {
    let fail = |reason: String| IngestError::Filter {
        path: path.to_path_buf(),
        reason,
    };
    let file = File::open(path).map_err(|e| fail(e.to_string()))?;
    let ids = read_filter(file).map_err(|e| fail(e.to_string()))?;
    tracing::info!(path = %path.display(), items = ids.len(), "item filter loaded");
    Ok(ids)
}

fn read_filter<R: Read>(reader: R) -> Result<HashSet<TypeId>, csv::Error> {
    csv::Reader::from_reader(reader)
        .into_deserialize::<FilterRow>()
        .map(|row| row.map(|r| r.id))
        .collect()
}
