//! Structured decision notes, rendered to text only at the report boundary.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::ids::StationId;

/// Why the decision engine did (or did not) do something for an item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum Note {
    NoFairPrice,
    AlreadyInStock { volume: u64 },
    SomeStockBelowTarget { volume: u64 },
    AlreadyListed { quantity: u64, price: f64 },
    TargetTooLow { target: u64 },
    Build { build_cost: f64, lowest_sell: f64 },
    NotAvailableAtStation { station: StationId, want: u64 },
    NotAvailableInQuantity { station: StationId, want: u64, available: u64 },
    RepriceOrder { current: f64, target: f64 },
}

impl Note {
    /// Render with station names resolved by `station_name`; unknown stations
    /// fall back to their id.
    pub fn render<F>(&self, station_name: F) -> String
    where
        F: Fn(StationId) -> Option<String>,
    {
        let name = |s: StationId| station_name(s).unwrap_or_else(|| s.to_string());
        match self {
            Note::NotAvailableAtStation { station, want } => {
                format!("not available at station {} (quantity {want})", name(*station))
            }
            Note::NotAvailableInQuantity {
                station,
                want,
                available,
            } => format!(
                "not available in quantity at station {} for target price (want {want} available {available})",
                name(*station)
            ),
            other => other.to_string(),
        }
    }
}

impl fmt::Display for Note {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Note::NoFairPrice => write!(f, "no fair price available"),
            Note::AlreadyInStock { volume } => {
                write!(f, "already in stock below target price, volume={volume}")
            }
            Note::SomeStockBelowTarget { volume } => {
                write!(f, "some stock below target price, volume={volume}")
            }
            Note::AlreadyListed { quantity, price } => {
                write!(f, "already listed for sale, quantity={quantity} price={price:.2}")
            }
            Note::TargetTooLow { target } => {
                write!(f, "target stock quantity too low ({target})")
            }
            Note::Build {
                build_cost,
                lowest_sell,
            } => write!(
                f,
                "cheaper to build at {build_cost:.2} than buy at {lowest_sell:.2}"
            ),
            Note::NotAvailableAtStation { station, want } => {
                write!(f, "not available at station {station} (quantity {want})")
            }
            Note::NotAvailableInQuantity {
                station,
                want,
                available,
            } => write!(
                f,
                "not available in quantity at station {station} for target price (want {want} available {available})"
            ),
            Note::RepriceOrder { current, target } => {
                write!(f, "listed at {current:.2}, reprice towards {target:.2}")
            }
        }
    }
}
