//! The basket: most-traded items and their market-wide traded value.
//!
//! CSV with header `ID,Name,GroupID,CategoryID,MarketGroup,Value Traded`.
//! Older files add `Buy,Sell` reference prices, where `-` means unknown.
//! Any row that fails to parse aborts the whole load.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::domain::{ItemSummary, TypeId};

#[derive(Debug, Error)]
pub enum BasketError {
    #[error("failed to open basket '{}': {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("basket line {line}: {reason}")]
    Parse { line: u64, reason: String },
}

#[derive(Debug, Deserialize)]
struct BasketRow {
    #[serde(rename = "ID")]
    id: i64,
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "GroupID")]
    group_id: i64,
    #[serde(rename = "CategoryID")]
    category_id: i64,
    #[serde(rename = "MarketGroup", default)]
    market_group: String,
    #[serde(rename = "Value Traded")]
    value_traded: f64,
    #[serde(rename = "Buy", default)]
    buy: Option<String>,
    #[serde(rename = "Sell", default)]
    sell: Option<String>,
}

/// Load up to `limit` basket items from a file, in file order.
///
/// A limit of zero reads the whole basket.
pub fn load_basket(path: &Path, limit: Option<usize>) -> Result<Vec<ItemSummary>, BasketError> {
    let file = File::open(path).map_err(|source| BasketError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    let items = read_basket(file, limit)?;
    tracing::info!(items = items.len(), path = %path.display(), "basket loaded");
    Ok(items)
}

pub fn read_basket<R: Read>(reader: R, limit: Option<usize>) -> Result<Vec<ItemSummary>, BasketError> {
    let limit = limit.filter(|&max| max > 0);
    let mut rdr = csv::Reader::from_reader(reader);
    let mut items = Vec::new();
    for (idx, row) in rdr.deserialize::<BasketRow>().enumerate() {
        if limit.is_some_and(|max| items.len() >= max) {
            break;
        }
        let line = idx as u64 + 2;
        let parse_err = |reason: String| BasketError::Parse { line, reason };
        let row = row.map_err(|e| parse_err(e.to_string()))?;
        let reference_buy = optional_price(row.buy.as_deref()).map_err(parse_err)?;
        let reference_sell = optional_price(row.sell.as_deref()).map_err(parse_err)?;
        items.push(ItemSummary {
            id: TypeId(row.id),
            name: row.name,
            group_id: row.group_id,
            category_id: row.category_id,
            market_group: row.market_group,
            value_traded: row.value_traded,
            reference_buy,
            reference_sell,
        });
    }
    Ok(items)
}

fn optional_price(raw: Option<&str>) -> Result<Option<f64>, String> {
    match raw.map(str::trim) {
        None | Some("") | Some("-") => Ok(None),
        Some(s) => s
            .parse::<f64>()
            .map(Some)
            .map_err(|e| format!("bad price '{s}': {e}")),
    }
}
