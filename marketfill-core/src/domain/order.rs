//! One open market order read from an orderset snapshot.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::ids::{StationId, TypeId};

/// A single open order. Immutable once read from the stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub type_id: TypeId,
    pub station_id: StationId,
    pub is_buy: bool,
    pub price: f64,
    pub volume: u64,
    /// Issue timestamp. `None` only on the synthetic terminator.
    pub date: Option<NaiveDateTime>,
}

impl Order {
    /// The record appended after the last real order so that consumers can close
    /// their final group without special-casing end of stream.
    pub fn terminator() -> Self {
        Self {
            type_id: TypeId(0),
            station_id: StationId(0),
            is_buy: false,
            price: 0.0,
            volume: 0,
            date: None,
        }
    }

    pub fn is_terminator(&self) -> bool {
        self.type_id.0 == 0 && self.station_id.0 == 0
    }
}
