//! Static reference tables: item types and stations.
//!
//! Lookups return `None` for unknown keys. Duplicate ids are rejected at load
//! time. A name shared by several rows is only an error when it is looked up.

use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{StationId, TypeId};

pub const TYPES_FILE: &str = "types.csv";
pub const STATIONS_FILE: &str = "stations.csv";

#[derive(Debug, Error)]
pub enum ReferenceError {
    #[error("failed to open reference table '{}': {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{table} line {line}: {reason}")]
    Parse {
        table: &'static str,
        line: u64,
        reason: String,
    },

    #[error("duplicate {key} in {table}")]
    Duplicate { table: &'static str, key: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeInfo {
    #[serde(rename = "ID")]
    pub id: TypeId,
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "GroupID")]
    pub group_id: i64,
    #[serde(rename = "GroupName")]
    pub group_name: String,
    #[serde(rename = "CategoryID")]
    pub category_id: i64,
    #[serde(rename = "CategoryName")]
    pub category_name: String,
    #[serde(rename = "MarketGroup", default)]
    pub market_group: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StationInfo {
    #[serde(rename = "ID")]
    pub id: StationId,
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "SystemID")]
    pub system_id: i64,
    #[serde(rename = "RegionID")]
    pub region_id: i64,
}

#[derive(Debug, Clone, Default)]
pub struct ReferenceData {
    types: HashMap<TypeId, TypeInfo>,
    /// `None` marks a name carried by more than one type.
    type_names: HashMap<String, Option<TypeId>>,
    stations: HashMap<StationId, StationInfo>,
    station_names: HashMap<String, Option<StationId>>,
}

impl ReferenceData {
    /// Load `types.csv` and `stations.csv` from `dir`.
    pub fn load(dir: &Path) -> Result<Self, ReferenceError> {
        let open = |name: &str| {
            let path = dir.join(name);
            File::open(&path).map_err(|source| ReferenceError::Open { path, source })
        };
        let data = Self::from_readers(open(TYPES_FILE)?, open(STATIONS_FILE)?)?;
        tracing::info!(
            types = data.types.len(),
            stations = data.stations.len(),
            "reference data loaded"
        );
        Ok(data)
    }

    pub fn from_readers<T: Read, S: Read>(types: T, stations: S) -> Result<Self, ReferenceError> {
        let mut data = Self::default();
        for info in read_table::<TypeInfo, _>(types, "types")? {
            data.insert_type(info)?;
        }
        for info in read_table::<StationInfo, _>(stations, "stations")? {
            data.insert_station(info)?;
        }
        Ok(data)
    }

    pub fn insert_type(&mut self, info: TypeInfo) -> Result<(), ReferenceError> {
        if self.types.contains_key(&info.id) {
            return Err(duplicate("types", format!("id {}", info.id)));
        }
        record_name(&mut self.type_names, &info.name, info.id);
        self.types.insert(info.id, info);
        Ok(())
    }

    pub fn insert_station(&mut self, info: StationInfo) -> Result<(), ReferenceError> {
        if self.stations.contains_key(&info.id) {
            return Err(duplicate("stations", format!("id {}", info.id)));
        }
        record_name(&mut self.station_names, &info.name, info.id);
        self.stations.insert(info.id, info);
        Ok(())
    }

    pub fn type_info(&self, id: TypeId) -> Option<&TypeInfo> {
        self.types.get(&id)
    }

    /// Fails with [`ReferenceError::Duplicate`] when several types share `name`.
    pub fn type_info_by_name(&self, name: &str) -> Result<Option<&TypeInfo>, ReferenceError> {
        let id = resolve_name(&self.type_names, name, "types")?;
        Ok(id.and_then(|id| self.types.get(&id)))
    }

    pub fn station_info(&self, id: StationId) -> Option<&StationInfo> {
        self.stations.get(&id)
    }

    pub fn station_info_by_name(&self, name: &str) -> Result<Option<&StationInfo>, ReferenceError> {
        let id = resolve_name(&self.station_names, name, "stations")?;
        Ok(id.and_then(|id| self.stations.get(&id)))
    }

    /// Station name, if known.
    pub fn station_name(&self, id: StationId) -> Option<String> {
        self.station_info(id).map(|s| s.name.clone())
    }
}

fn duplicate(table: &'static str, key: String) -> ReferenceError {
    ReferenceError::Duplicate { table, key }
}

fn record_name<K: Copy>(names: &mut HashMap<String, Option<K>>, name: &str, id: K) {
    names
        .entry(name.to_string())
        .and_modify(|slot| *slot = None)
        .or_insert(Some(id));
}

fn resolve_name<K: Copy>(
    names: &HashMap<String, Option<K>>,
    name: &str,
    table: &'static str,
) -> Result<Option<K>, ReferenceError> {
    match names.get(name) {
        None => Ok(None),
        Some(Some(id)) => Ok(Some(*id)),
        Some(None) => Err(duplicate(table, format!("name '{name}'"))),
    }
}

fn read_table<T, R>(reader: R, table: &'static str) -> Result<Vec<T>, ReferenceError>
where
    T: serde::de::DeserializeOwned,
    R: Read,
{
    let mut rdr = csv::Reader::from_reader(reader);
    let mut rows = Vec::new();
    for (idx, row) in rdr.deserialize().enumerate() {
        rows.push(row.map_err(|e| ReferenceError::Parse {
            table,
            line: idx as u64 + 2,
            reason: e.to_string(),
        })?);
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TYPES: &str = "ID,Name,GroupID,GroupName,CategoryID,CategoryName,MarketGroup
34,Tritanium,18,Mineral,4,Material,Materials>Minerals
12608,Hail S,373,Advanced Artillery Ammo,8,Charge,Ammunition & Charges>Projectile Ammo
";
    const STATIONS: &str = "ID,Name,SystemID,RegionID
60003760,Jita IV - Moon 4 - Caldari Navy Assembly Plant,30000142,10000002
60008494,Amarr VIII (Oris) - Emperor Family Academy,30002187,10000043
";

    #[test]
    fn lookups_by_id_and_name() {
        let data = ReferenceData::from_readers(TYPES.as_bytes(), STATIONS.as_bytes()).unwrap();
        assert_eq!(data.type_info(TypeId(34)).map(|t| t.name.as_str()), Some("Tritanium"));
        assert_eq!(
            data.type_info_by_name("Hail S").unwrap().map(|t| t.id),
            Some(TypeId(12608))
        );
        assert_eq!(
            data.station_info_by_name("Amarr VIII (Oris) - Emperor Family Academy")
                .unwrap()
                .map(|s| s.id),
            Some(StationId(60008494))
        );
        assert_eq!(data.station_info(StationId(60003760)).map(|s| s.region_id), Some(10000002));
    }

    #[test]
    fn unknown_keys_are_not_errors() {
        let data = ReferenceData::from_readers(TYPES.as_bytes(), STATIONS.as_bytes()).unwrap();
        assert!(data.type_info(TypeId(1)).is_none());
        assert!(data.type_info_by_name("Veldspar").unwrap().is_none());
        assert!(data.station_name(StationId(1)).is_none());
    }

    #[test]
    fn duplicate_id_is_fatal() {
        let types = format!("{TYPES}34,Tritanium II,18,Mineral,4,Material,Materials\n");
        let err = ReferenceData::from_readers(types.as_bytes(), STATIONS.as_bytes()).unwrap_err();
        assert!(matches!(err, ReferenceError::Duplicate { table: "types", .. }));
    }

    #[test]
    fn shared_type_name_loads_and_fails_only_when_queried() {
        let types = format!(
            "{TYPES}1001,Widget,1,Widgets,1,Things,Things\n1002,Widget,1,Widgets,1,Things,Things\n"
        );
        let data = ReferenceData::from_readers(types.as_bytes(), STATIONS.as_bytes()).unwrap();
        assert_eq!(data.type_info(TypeId(34)).map(|t| t.name.as_str()), Some("Tritanium"));
        assert_eq!(data.type_info(TypeId(1002)).map(|t| t.id), Some(TypeId(1002)));
        assert_eq!(
            data.type_info_by_name("Tritanium").unwrap().map(|t| t.id),
            Some(TypeId(34))
        );
        let err = data.type_info_by_name("Widget").unwrap_err();
        assert!(matches!(err, ReferenceError::Duplicate { table: "types", .. }));
    }

    #[test]
    fn shared_station_name_fails_only_when_queried() {
        let stations = format!("{STATIONS}1,Jita IV - Moon 4 - Caldari Navy Assembly Plant,1,1\n");
        let data = ReferenceData::from_readers(TYPES.as_bytes(), stations.as_bytes()).unwrap();
        assert!(data.station_name(StationId(60003760)).is_some());
        let err = data
            .station_info_by_name("Jita IV - Moon 4 - Caldari Navy Assembly Plant")
            .unwrap_err();
        assert!(matches!(err, ReferenceError::Duplicate { table: "stations", .. }));
    }

    #[test]
    fn malformed_row_reports_line() {
        let stations = "ID,Name,SystemID,RegionID\nabc,Somewhere,1,1\n";
        let err = ReferenceData::from_readers(TYPES.as_bytes(), stations.as_bytes()).unwrap_err();
        assert!(matches!(err, ReferenceError::Parse { line: 2, .. }));
    }
}
