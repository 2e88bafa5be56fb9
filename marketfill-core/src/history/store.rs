//! Parquet store for the daily price history.
//!
//! Layout: `{dir}/date={YYYY-MM-DD}.parquet`, one partition per orderset day,
//! each with a `date={YYYY-MM-DD}.meta.json` sidecar.
//!
//! - Atomic writes (write to .tmp, rename into place)
//! - Re-ingesting a day replaces rows with the same `(type, station)` key
//! - Pricing loads read only the partitions inside the requested window

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{Months, NaiveDate, NaiveDateTime};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::record::{PriceHistory, PriceRecord};
use crate::domain::{BatchId, StationId, TypeId};

const COLUMNS: [&str; 6] = ["date", "type_id", "station_id", "buy", "sell", "sell_volume"];

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("history I/O error at '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parquet error: {0}")]
    Parquet(String),

    #[error("invalid history partition '{}': {reason}", path.display())]
    Validation { path: PathBuf, reason: String },

    #[error("manifest error: {0}")]
    Manifest(String),

    #[error("window of {months} months before {date} is out of range")]
    Window { date: NaiveDate, months: u32 },
}

/// Sidecar written next to each partition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartitionManifest {
    pub date: NaiveDate,
    pub rows: usize,
    pub orderset: Option<BatchId>,
    pub data_hash: String,
    pub written_at: NaiveDateTime,
}

/// One line of `history status`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartitionStatus {
    pub date: NaiveDate,
    pub manifest: Option<PartitionManifest>,
}

/// Directory of daily Parquet partitions.
pub struct ParquetPriceStore {
    dir: PathBuf,
}

impl ParquetPriceStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn partition_path(&self, date: NaiveDate) -> PathBuf {
        self.dir.join(format!("date={date}.parquet"))
    }

    fn manifest_path(&self, date: NaiveDate) -> PathBuf {
        self.dir.join(format!("date={date}.meta.json"))
    }

    /// Write one day's records, merging with any rows already stored for that day.
    ///
    /// Returns the number of rows in the partition after the merge.
    pub fn append_day(
        &self,
        date: NaiveDate,
        records: &[PriceRecord],
        orderset: Option<BatchId>,
    ) -> Result<usize, HistoryError> {
        fs::create_dir_all(&self.dir).map_err(|source| HistoryError::Io {
            path: self.dir.clone(),
            source,
        })?;

        let path = self.partition_path(date);
        let mut merged: BTreeMap<(TypeId, StationId), PriceRecord> = BTreeMap::new();
        if path.exists() {
            for r in read_partition(&path)? {
                merged.insert((r.type_id, r.station_id), r);
            }
        }
        for r in records {
            merged.insert((r.type_id, r.station_id), PriceRecord { date, ..*r });
        }
        let rows: Vec<PriceRecord> = merged.into_values().collect();

        let tmp_path = path.with_extension("parquet.tmp");
        write_partition(&rows, &tmp_path)?;
        fs::rename(&tmp_path, &path).map_err(|source| {
            let _ = fs::remove_file(&tmp_path);
            HistoryError::Io {
                path: path.clone(),
                source,
            }
        })?;

        let manifest = PartitionManifest {
            date,
            rows: rows.len(),
            orderset,
            data_hash: blake3::hash(
                &serde_json::to_vec(&rows)
                    .map_err(|e| HistoryError::Manifest(format!("hash serialization: {e}")))?,
            )
            .to_hex()
            .to_string(),
            written_at: chrono::Local::now().naive_local(),
        };
        let json = serde_json::to_string_pretty(&manifest)
            .map_err(|e| HistoryError::Manifest(format!("serialization: {e}")))?;
        let manifest_path = self.manifest_path(date);
        fs::write(&manifest_path, json).map_err(|source| HistoryError::Io {
            path: manifest_path,
            source,
        })?;

        tracing::debug!(%date, rows = rows.len(), "history partition written");
        Ok(rows.len())
    }

    /// Dates of every stored partition, ascending.
    pub fn partitions(&self) -> Result<Vec<NaiveDate>, HistoryError> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let entries = fs::read_dir(&self.dir).map_err(|source| HistoryError::Io {
            path: self.dir.clone(),
            source,
        })?;
        let mut dates = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| HistoryError::Io {
                path: self.dir.clone(),
                source,
            })?;
            let name = entry.file_name();
            if let Some(date) = name.to_str().and_then(partition_date) {
                dates.push(date);
            }
        }
        dates.sort();
        Ok(dates)
    }

    /// Load every row of one day.
    pub fn load_day(&self, date: NaiveDate) -> Result<Vec<PriceRecord>, HistoryError> {
        let path = self.partition_path(date);
        if !path.exists() {
            return Ok(Vec::new());
        }
        read_partition(&path)
    }

    /// Rows needed to price items on `date`: hub rows in the trailing window
    /// `(date - months, date]`, plus every station's rows on `date` itself.
    pub fn load_for_pricing(
        &self,
        date: NaiveDate,
        months: u32,
        hubs: &HashSet<StationId>,
    ) -> Result<PriceHistory, HistoryError> {
        let after = window_start(date, months)?;
        let mut rows = Vec::new();
        for day in self.partitions()? {
            if day <= after || day > date {
                continue;
            }
            let records = read_partition(&self.partition_path(day))?;
            if day == date {
                rows.extend(records);
            } else {
                rows.extend(records.into_iter().filter(|r| hubs.contains(&r.station_id)));
            }
        }
        tracing::info!(%date, months, rows = rows.len(), "price history loaded");
        Ok(PriceHistory::from_records(rows))
    }

    pub fn manifest(&self, date: NaiveDate) -> Option<PartitionManifest> {
        let content = fs::read_to_string(self.manifest_path(date)).ok()?;
        serde_json::from_str(&content).ok()
    }

    pub fn status(&self) -> Result<Vec<PartitionStatus>, HistoryError> {
        Ok(self
            .partitions()?
            .into_iter()
            .map(|date| PartitionStatus {
                date,
                manifest: self.manifest(date),
            })
            .collect())
    }
}

/// Exclusive lower bound of a trailing window of `months` ending at `date`.
pub fn window_start(date: NaiveDate, months: u32) -> Result<NaiveDate, HistoryError> {
    date.checked_sub_months(Months::new(months))
        .ok_or(HistoryError::Window { date, months })
}

fn partition_date(file_name: &str) -> Option<NaiveDate> {
    let stem = file_name.strip_prefix("date=")?.strip_suffix(".parquet")?;
    NaiveDate::parse_from_str(stem, "%Y-%m-%d").ok()
}

// ── Parquet I/O helpers ─────────────────────────────────────────────

fn epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(1970, 1, 1).unwrap_or_default()
}

fn records_to_dataframe(rows: &[PriceRecord]) -> Result<DataFrame, HistoryError> {
    let dates: Vec<i32> = rows
        .iter()
        .map(|r| (r.date - epoch()).num_days() as i32)
        .collect();
    let types: Vec<i64> = rows.iter().map(|r| r.type_id.0).collect();
    let stations: Vec<i64> = rows.iter().map(|r| r.station_id.0).collect();
    let buys: Vec<Option<f64>> = rows.iter().map(|r| r.buy).collect();
    let sells: Vec<Option<f64>> = rows.iter().map(|r| r.sell).collect();
    let volumes: Vec<Option<u64>> = rows.iter().map(|r| r.sell_volume).collect();

    DataFrame::new(vec![
        Column::new("date".into(), dates)
            .cast(&DataType::Date)
            .map_err(|e| HistoryError::Parquet(format!("date cast: {e}")))?,
        Column::new("type_id".into(), types),
        Column::new("station_id".into(), stations),
        Column::new("buy".into(), buys),
        Column::new("sell".into(), sells),
        Column::new("sell_volume".into(), volumes),
    ])
    .map_err(|e| HistoryError::Parquet(format!("dataframe creation: {e}")))
}

fn write_partition(rows: &[PriceRecord], path: &Path) -> Result<(), HistoryError> {
    let mut df = records_to_dataframe(rows)?;
    let file = fs::File::create(path).map_err(|source| HistoryError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    ParquetWriter::new(file)
        .finish(&mut df)
        .map_err(|e| HistoryError::Parquet(format!("write parquet: {e}")))?;
    Ok(())
}

fn read_partition(path: &Path) -> Result<Vec<PriceRecord>, HistoryError> {
    let file = fs::File::open(path).map_err(|source| HistoryError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let df = ParquetReader::new(file)
        .finish()
        .map_err(|e| HistoryError::Parquet(format!("read {}: {e}", path.display())))?;

    for name in COLUMNS {
        if df.column(name).is_err() {
            return Err(HistoryError::Validation {
                path: path.to_path_buf(),
                reason: format!("missing column '{name}'"),
            });
        }
    }
    dataframe_to_records(&df, path)
}

fn dataframe_to_records(df: &DataFrame, path: &Path) -> Result<Vec<PriceRecord>, HistoryError> {
    let col_err = |e: PolarsError| HistoryError::Parquet(format!("column read: {e}"));

    let date_ca = df.column("date").map_err(col_err)?.date().map_err(col_err)?;
    let type_ca = df.column("type_id").map_err(col_err)?.i64().map_err(col_err)?;
    let station_ca = df.column("station_id").map_err(col_err)?.i64().map_err(col_err)?;
    let buy_ca = df.column("buy").map_err(col_err)?.f64().map_err(col_err)?;
    let sell_ca = df.column("sell").map_err(col_err)?.f64().map_err(col_err)?;
    let vol_ca = df.column("sell_volume").map_err(col_err)?.u64().map_err(col_err)?;

    let null_at = |column: &str, row: usize| HistoryError::Validation {
        path: path.to_path_buf(),
        reason: format!("null {column} at row {row}"),
    };

    let mut rows = Vec::with_capacity(df.height());
    for i in 0..df.height() {
        let days = date_ca.get(i).ok_or_else(|| null_at("date", i))?;
        rows.push(PriceRecord {
            date: epoch() + chrono::Duration::days(i64::from(days)),
            type_id: TypeId(type_ca.get(i).ok_or_else(|| null_at("type_id", i))?),
            station_id: StationId(station_ca.get(i).ok_or_else(|| null_at("station_id", i))?),
            buy: buy_ca.get(i),
            sell: sell_ca.get(i),
            sell_volume: vol_ca.get(i),
        });
    }
    Ok(rows)
}
