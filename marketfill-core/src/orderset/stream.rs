//! Streaming decoder for gzip-compressed orderset dumps.
//!
//! Column layout (0-indexed, tab-separated, no header):
//!
//! ```text
//! 0 order id   1 type id   2 issued (ISO-8601, trailing Z)   3 is buy ("True"/"False")
//! 4 volume     5 total     6 min volume   7 price   8 station id   9 range
//! 10 duration  11 region id   12 orderset id
//! ```
//!
//! Only the current record is held in memory.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use csv::StringRecord;
use flate2::read::GzDecoder;
use thiserror::Error;

use super::groups::GroupingGuard;
use crate::domain::{BatchId, Order, StationId, TypeId};

/// Fixed arity of one orderset record.
pub const ORDERSET_FIELDS: usize = 13;

const COL_TYPE: usize = 1;
const COL_DATE: usize = 2;
const COL_IS_BUY: usize = 3;
const COL_VOLUME: usize = 4;
const COL_PRICE: usize = 7;
const COL_STATION: usize = 8;
const COL_ORDERSET: usize = 12;

#[derive(Debug, Error)]
pub enum OrdersetError {
    #[error("failed to open orderset '{}': {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("orderset read error: {0}")]
    Read(#[from] csv::Error),

    #[error("line {line}: expected {expected} tab-separated fields, found {found}")]
    Arity {
        line: u64,
        expected: usize,
        found: usize,
    },

    #[error("line {line}: cannot parse {field} from '{value}'")]
    Field {
        line: u64,
        field: &'static str,
        value: String,
    },

    #[error("line {line}: station {station} / type {type_id} reappears after its group was closed")]
    Grouping {
        line: u64,
        station: StationId,
        type_id: TypeId,
    },

    #[error("orderset batch id changed mid-pass: established {established}, record {record} carries {found}")]
    BatchMismatch {
        record: u64,
        established: BatchId,
        found: BatchId,
    },
}

/// Lazy, single-pass sequence of `(Order, BatchId)` pairs, always ending with
/// `(Order::terminator(), BatchId::UNTAGGED)`.
///
/// The stream stops after the first error.
pub struct OrdersetStream<R: Read> {
    reader: csv::Reader<R>,
    record: StringRecord,
    guard: GroupingGuard,
    done: bool,
}

impl OrdersetStream<GzDecoder<File>> {
    /// Open a gzip-compressed orderset file.
    pub fn open(path: &Path) -> Result<Self, OrdersetError> {
        let file = File::open(path).map_err(|source| OrdersetError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::from_reader(GzDecoder::new(file)))
    }
}

impl<R: Read> OrdersetStream<R> {
    /// Decode an already-decompressed tab-separated stream.
    pub fn from_reader(reader: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .has_headers(false)
            .flexible(true)
            .quoting(false)
            .from_reader(reader);
        Self {
            reader,
            record: StringRecord::new(),
            guard: GroupingGuard::default(),
            done: false,
        }
    }

    /// Drop the batch ids, keeping only the orders.
    pub fn orders(self) -> impl Iterator<Item = Result<Order, OrdersetError>> {
        self.map(|r| r.map(|(order, _)| order))
    }

    fn next_record(&mut self) -> Result<Option<(Order, BatchId)>, OrdersetError> {
        if !self.reader.read_record(&mut self.record)? {
            return Ok(None);
        }
        let line = self.record.position().map(|p| p.line()).unwrap_or(0);
        let decoded = decode_record(&self.record, line)?;
        self.guard.observe(&decoded.0, line)?;
        Ok(Some(decoded))
    }
}

impl<R: Read> Iterator for OrdersetStream<R> {
    type Item = Result<(Order, BatchId), OrdersetError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.next_record() {
            Ok(Some(item)) => Some(Ok(item)),
            Ok(None) => {
                self.done = true;
                Some(Ok((Order::terminator(), BatchId::UNTAGGED)))
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

/// Decode one tab-separated record.
pub fn decode_record(record: &StringRecord, line: u64) -> Result<(Order, BatchId), OrdersetError> {
    if record.len() != ORDERSET_FIELDS {
        return Err(OrdersetError::Arity {
            line,
            expected: ORDERSET_FIELDS,
            found: record.len(),
        });
    }

    let field = |idx: usize| record.get(idx).unwrap_or_default();
    let bad = |name: &'static str, idx: usize| OrdersetError::Field {
        line,
        field: name,
        value: field(idx).to_string(),
    };

    let type_id = field(COL_TYPE)
        .parse::<i64>()
        .map_err(|_| bad("type id", COL_TYPE))?;
    let date = NaiveDateTime::parse_from_str(
        field(COL_DATE).trim_end_matches('Z'),
        "%Y-%m-%dT%H:%M:%S%.f",
    )
    .map_err(|_| bad("date", COL_DATE))?;
    let is_buy = field(COL_IS_BUY) == "True";
    let volume = field(COL_VOLUME)
        .parse::<u64>()
        .map_err(|_| bad("volume", COL_VOLUME))?;
    let price = field(COL_PRICE)
        .parse::<f64>()
        .map_err(|_| bad("price", COL_PRICE))?;
    let station_id = field(COL_STATION)
        .parse::<i64>()
        .map_err(|_| bad("station id", COL_STATION))?;
    let batch = field(COL_ORDERSET)
        .parse::<i64>()
        .map_err(|_| bad("orderset id", COL_ORDERSET))?;

    Ok((
        Order {
            type_id: TypeId(type_id),
            station_id: StationId(station_id),
            is_buy,
            price,
            volume,
            date: Some(date),
        },
        BatchId(batch),
    ))
}
