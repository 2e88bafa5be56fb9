//! Optional operator inputs: current assets and listed sell orders.
//!
//! Both files are CSV exports of the account's state. Only rows located at the
//! destination station count; rows for type ids missing from reference data
//! are logged and skipped.

use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use marketfill_core::decision::OwnOrder;
use marketfill_core::domain::{StationId, TypeId};
use marketfill_core::reference::ReferenceData;
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum InputError {
    #[error("failed to open '{}': {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{file} line {line}: {reason}")]
    Parse {
        file: &'static str,
        line: u64,
        reason: String,
    },
}

#[derive(Debug, Deserialize)]
struct AssetRow {
    #[serde(rename = "TypeID")]
    type_id: TypeId,
    #[serde(rename = "Quantity")]
    quantity: u64,
    #[serde(rename = "LocationID")]
    location_id: StationId,
}

#[derive(Debug, Deserialize)]
struct OrderRow {
    #[serde(rename = "TypeID")]
    type_id: TypeId,
    #[serde(rename = "Quantity")]
    quantity: u64,
    #[serde(rename = "Price")]
    price: f64,
    #[serde(rename = "LocationID")]
    location_id: StationId,
}

fn open(path: &Path) -> Result<File, InputError> {
    File::open(path).map_err(|source| InputError::Open {
        path: path.to_path_buf(),
        source,
    })
}

fn rows<T, R>(reader: R, file: &'static str) -> impl Iterator<Item = Result<T, InputError>>
where
    T: serde::de::DeserializeOwned,
    R: Read,
{
    csv::Reader::from_reader(reader)
        .into_deserialize::<T>()
        .map(move |row| {
            row.map_err(|e| InputError::Parse {
                file,
                line: e.position().map_or(0, |p| p.line()),
                reason: e.to_string(),
            })
        })
}

fn known(reference: &ReferenceData, type_id: TypeId, file: &str) -> bool {
    if reference.type_info(type_id).is_some() {
        return true;
    }
    tracing::warn!(%type_id, file, "unknown type id, skipping");
    false
}

pub fn load_assets(
    path: &Path,
    destination: StationId,
    reference: &ReferenceData,
) -> Result<HashMap<TypeId, u64>, InputError> {
    let assets = read_assets(open(path)?, destination, reference)?;
    tracing::info!(path = %path.display(), items = assets.len(), "assets loaded");
    Ok(assets)
}

/// Quantity held per type at `destination`.
pub fn read_assets<R: Read>(
    reader: R,
    destination: StationId,
    reference: &ReferenceData,
) -> Result<HashMap<TypeId, u64>, InputError> {
    let mut out = HashMap::new();
    for row in rows::<AssetRow, _>(reader, "assets") {
        let row = row?;
        if row.location_id != destination || !known(reference, row.type_id, "assets") {
            continue;
        }
        *out.entry(row.type_id).or_insert(0) += row.quantity;
    }
    Ok(out)
}

pub fn load_orders(
    path: &Path,
    destination: StationId,
    reference: &ReferenceData,
) -> Result<HashMap<TypeId, OwnOrder>, InputError> {
    let orders = read_orders(open(path)?, destination, reference)?;
    tracing::info!(path = %path.display(), items = orders.len(), "own orders loaded");
    Ok(orders)
}

/// Listed sell orders per type at `destination`: quantities summed, lowest price kept.
pub fn read_orders<R: Read>(
    reader: R,
    destination: StationId,
    reference: &ReferenceData,
) -> Result<HashMap<TypeId, OwnOrder>, InputError> {
    let mut out: HashMap<TypeId, OwnOrder> = HashMap::new();
    for row in rows::<OrderRow, _>(reader, "orders") {
        let row = row?;
        if row.location_id != destination || !known(reference, row.type_id, "orders") {
            continue;
        }
        out.entry(row.type_id)
            .and_modify(|o| {
                o.quantity += row.quantity;
                o.price = o.price.min(row.price);
            })
            .or_insert(OwnOrder {
                quantity: row.quantity,
                price: row.price,
            });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use marketfill_core::reference::TypeInfo;

    const DEST: StationId = StationId(60005686);

    fn reference() -> ReferenceData {
        let mut r = ReferenceData::default();
        for (id, name) in [(34, "Tritanium"), (35, "Pyerite")] {
            r.insert_type(TypeInfo {
                id: TypeId(id),
                name: name.into(),
                group_id: 18,
                group_name: "Mineral".into(),
                category_id: 4,
                category_name: "Material".into(),
                market_group: "Materials/Minerals".into(),
            })
            .unwrap();
        }
        r
    }

    #[test]
    fn assets_sum_at_destination_only() {
        let csv = "TypeID,Singleton,Quantity,LocationFlag,LocationType,LocationID\n\
                   34,False,100,Hangar,station,60005686\n\
                   34,False,50,Hangar,station,60005686\n\
                   34,False,999,Hangar,station,60003760\n\
                   35,True,1,Hangar,station,60005686\n";
        let assets = read_assets(csv.as_bytes(), DEST, &reference()).unwrap();
        assert_eq!(assets.len(), 2);
        assert_eq!(assets[&TypeId(34)], 150);
        assert_eq!(assets[&TypeId(35)], 1);
    }

    #[test]
    fn unknown_types_are_skipped() {
        let csv = "TypeID,Singleton,Quantity,LocationFlag,LocationType,LocationID\n\
                   99999,False,7,Hangar,station,60005686\n";
        let assets = read_assets(csv.as_bytes(), DEST, &reference()).unwrap();
        assert!(assets.is_empty());
    }

    #[test]
    fn orders_keep_lowest_price() {
        let csv = "TypeID,Quantity,Original Quantity,Price,LocationID\n\
                   34,10,20,6.5,60005686\n\
                   34,5,5,6.2,60005686\n\
                   35,3,3,12.0,60003760\n";
        let orders = read_orders(csv.as_bytes(), DEST, &reference()).unwrap();
        assert_eq!(orders.len(), 1);
        assert_eq!(
            orders[&TypeId(34)],
            OwnOrder {
                quantity: 15,
                price: 6.2
            }
        );
    }

    #[test]
    fn malformed_row_reports_line() {
        let csv = "TypeID,Quantity,Original Quantity,Price,LocationID\n\
                   34,10,20,6.5,60005686\n\
                   34,ten,20,6.5,60005686\n";
        let err = read_orders(csv.as_bytes(), DEST, &reference()).unwrap_err();
        assert!(matches!(err, InputError::Parse { file: "orders", line: 3, .. }));
    }

    #[test]
    fn missing_file_is_an_open_error() {
        let err = load_assets(Path::new("/nonexistent/assets.csv"), DEST, &reference()).unwrap_err();
        assert!(matches!(err, InputError::Open { .. }));
    }
}
