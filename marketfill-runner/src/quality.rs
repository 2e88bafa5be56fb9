//! Station quality: how much of the basket each station stocks, and how far
//! above the market-wide reference its best sells sit.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use marketfill_core::domain::{ItemSummary, Order, StationId, TypeId};
use marketfill_core::orderset::{OrderGroups, OrdersetError, OrdersetFilter, OrdersetInfo, OrdersetStream};
use marketfill_core::reference::ReferenceData;
use serde::{Deserialize, Serialize};

/// Efficiencies above this are treated as the item being unavailable.
pub const MAX_EFFICIENCY: f64 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ItemEfficiency {
    pub type_id: TypeId,
    pub value_traded: f64,
    /// Best sell at the station over the basket's reference sell.
    pub efficiency: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StationQuality {
    pub station_id: StationId,
    pub efficiencies: Vec<ItemEfficiency>,
}

impl StationQuality {
    /// Share of the basket available, in percent.
    pub fn coverage(&self, basket_size: usize) -> f64 {
        if basket_size == 0 {
            return 0.0;
        }
        self.efficiencies.len() as f64 / basket_size as f64 * 100.0
    }

    /// Value-traded-weighted mean markup over reference, in percent.
    pub fn inefficiency(&self) -> Option<f64> {
        let weight: f64 = self.efficiencies.iter().map(|e| e.value_traded).sum();
        if self.efficiencies.is_empty() || weight == 0.0 {
            return None;
        }
        let weighted: f64 = self
            .efficiencies
            .iter()
            .map(|e| e.value_traded * e.efficiency)
            .sum();
        Some((weighted / weight - 1.0) * 100.0)
    }
}

/// Everything one quality pass produces.
#[derive(Debug, Clone, PartialEq)]
pub struct QualityReport {
    pub stations: Vec<StationQuality>,
    pub basket_size: usize,
    pub info: OrdersetInfo,
}

/// Score every station in the orderset against the basket, in file order.
pub fn station_quality<I>(
    orders: I,
    basket: &HashMap<TypeId, ItemSummary>,
) -> Result<Vec<StationQuality>, OrdersetError>
where
    I: Iterator<Item = Result<Order, OrdersetError>>,
{
    let mut stations: Vec<StationQuality> = Vec::new();
    for group in OrderGroups::new(orders) {
        let group = group?;
        if stations.last().map_or(true, |s| s.station_id != group.station_id) {
            stations.push(StationQuality {
                station_id: group.station_id,
                efficiencies: Vec::new(),
            });
        }
        let Some(item) = basket.get(&group.type_id) else {
            continue;
        };
        let Some(best_sell) = group.best_sell() else {
            continue;
        };
        let efficiency = match item.reference_sell {
            Some(reference) => best_sell / reference,
            None => {
                tracing::info!(type_id = %item.id, "no reference sell price for basket item");
                1.0
            }
        };
        if efficiency <= MAX_EFFICIENCY {
            if let Some(station) = stations.last_mut() {
                station.efficiencies.push(ItemEfficiency {
                    type_id: item.id,
                    value_traded: item.value_traded,
                    efficiency,
                });
            }
        }
    }
    Ok(stations)
}

/// Run a quality pass over an orderset file.
pub fn run_quality(orderset: &Path, basket: &[ItemSummary]) -> Result<QualityReport, OrdersetError> {
    tracing::info!(orderset = %orderset.display(), "scoring stations");
    let basket: HashMap<TypeId, ItemSummary> = basket.iter().map(|i| (i.id, i.clone())).collect();
    let mut filter = OrdersetFilter::new(OrdersetStream::open(orderset)?);
    let stations = station_quality(filter.by_ref(), &basket)?;
    Ok(QualityReport {
        stations,
        basket_size: basket.len(),
        info: filter.finish(),
    })
}

// ─── CSV export ─────────────────────────────────────────────────────

/// One row per station: `StationID, Station Name, Coverage %, Inefficiency %, Orderset, Date`.
pub fn export_quality_csv(report: &QualityReport, reference: &ReferenceData) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record([
        "StationID",
        "Station Name",
        "Coverage %",
        "Inefficiency %",
        "Orderset",
        "Date",
    ])?;

    let orderset = report.info.orderset.map(|b| b.to_string()).unwrap_or_default();
    let date = report
        .info
        .date
        .map(|d| d.date().to_string())
        .unwrap_or_default();
    for station in &report.stations {
        let name = reference.station_name(station.station_id).unwrap_or_else(|| {
            tracing::info!(station = %station.station_id, "station not in reference data");
            "-".to_string()
        });
        wtr.write_record([
            station.station_id.to_string(),
            name,
            format!("{:.1}", station.coverage(report.basket_size)),
            station
                .inefficiency()
                .map_or_else(|| "-".to_string(), |i| format!("{i:.1}")),
            orderset.clone(),
            date.clone(),
        ])?;
    }

    let bytes = wtr.into_inner().context("failed to flush quality CSV")?;
    String::from_utf8(bytes).context("quality CSV is not UTF-8")
}

/// Per-item detail for one station.
pub fn export_detail_csv(station: &StationQuality, reference: &ReferenceData) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(["TypeID", "Name", "Value Traded (universal)", "Efficiency"])?;
    for e in &station.efficiencies {
        let name = reference
            .type_info(e.type_id)
            .map(|t| t.name.clone())
            .unwrap_or_default();
        wtr.write_record([
            e.type_id.to_string(),
            name,
            e.value_traded.to_string(),
            e.efficiency.to_string(),
        ])?;
    }
    let bytes = wtr.into_inner().context("failed to flush detail CSV")?;
    String::from_utf8(bytes).context("detail CSV is not UTF-8")
}

#[cfg(test)]
mod tests {
    use super::*;
    use marketfill_core::reference::StationInfo;

    fn item(id: i64, value_traded: f64, sell: Option<f64>) -> ItemSummary {
        ItemSummary {
            id: TypeId(id),
            name: format!("item {id}"),
            group_id: 1,
            category_id: 1,
            market_group: String::new(),
            value_traded,
            reference_buy: None,
            reference_sell: sell,
        }
    }

    fn sell(station: i64, type_id: i64, price: f64) -> Result<Order, OrdersetError> {
        Ok(Order {
            type_id: TypeId(type_id),
            station_id: StationId(station),
            is_buy: false,
            price,
            volume: 1,
            date: None,
        })
    }

    fn buy(station: i64, type_id: i64, price: f64) -> Result<Order, OrdersetError> {
        sell(station, type_id, price).map(|o| Order { is_buy: true, ..o })
    }

    fn station_with(efficiencies: &[(i64, f64, f64)]) -> StationQuality {
        StationQuality {
            station_id: StationId(1),
            efficiencies: efficiencies
                .iter()
                .map(|&(id, w, e)| ItemEfficiency {
                    type_id: TypeId(id),
                    value_traded: w,
                    efficiency: e,
                })
                .collect(),
        }
    }

    #[test]
    fn weighted_inefficiency() {
        let s = station_with(&[(1, 1.0, 1.0), (2, 2.0, 2.0), (3, 5.0, 3.0)]);
        assert!((s.inefficiency().unwrap() - 150.0).abs() < 1e-9);
        assert_eq!(station_with(&[]).inefficiency(), None);
    }

    #[test]
    fn efficiencies_per_station() {
        let basket: HashMap<TypeId, ItemSummary> = [
            item(10, 1000.0, Some(400_000.0)),
            item(11, 2000.0, None),
            item(12, 1000.0, Some(1.0)),
            item(13, 1.0, Some(1.0)),
        ]
        .into_iter()
        .map(|i| (i.id, i))
        .collect();
        let orders = vec![
            sell(1, 10, 460_000.0),
            sell(1, 10, 450_000.0),
            sell(1, 11, 7.0),
            sell(1, 12, 500.0),
            buy(1, 13, 1.0),
            sell(1, 99, 1.0),
            sell(2, 10, 400_000.0),
            Ok(Order::terminator()),
        ];
        let stations = station_quality(orders.into_iter(), &basket).unwrap();
        assert_eq!(stations.len(), 2);

        let first = &stations[0];
        assert_eq!(first.station_id, StationId(1));
        let effs: Vec<(TypeId, f64)> = first.efficiencies.iter().map(|e| (e.type_id, e.efficiency)).collect();
        assert_eq!(effs, vec![(TypeId(10), 1.125), (TypeId(11), 1.0)]);
        assert_eq!(first.coverage(basket.len()), 50.0);

        assert_eq!(stations[1].efficiencies.len(), 1);
        assert_eq!(stations[1].efficiencies[0].efficiency, 1.0);
    }

    #[test]
    fn station_without_basket_items_still_reported() {
        let basket: HashMap<TypeId, ItemSummary> = HashMap::from([(TypeId(10), item(10, 1.0, Some(1.0)))]);
        let orders = vec![sell(5, 77, 1.0), Ok(Order::terminator())];
        let stations = station_quality(orders.into_iter(), &basket).unwrap();
        assert_eq!(stations.len(), 1);
        assert!(stations[0].efficiencies.is_empty());
    }

    #[test]
    fn csv_row_format() {
        let mut reference = ReferenceData::default();
        reference
            .insert_station(StationInfo {
                id: StationId(1),
                name: "Amo - Minmatar Fleet Market".into(),
                system_id: 123,
                region_id: 100,
            })
            .unwrap();
        let report = QualityReport {
            stations: vec![
                station_with(&[(11, 5.0, 1.1), (12, 1.0, 1.3), (13, 2.0, 1.2)]),
                StationQuality {
                    station_id: StationId(2),
                    efficiencies: Vec::new(),
                },
            ],
            basket_size: 4,
            info: OrdersetInfo {
                orderset: Some(marketfill_core::domain::BatchId(126876)),
                date: chrono::NaiveDate::from_ymd_opt(2023, 11, 19).and_then(|d| d.and_hms_opt(8, 0, 0)),
            },
        };
        let csv = export_quality_csv(&report, &reference).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "StationID,Station Name,Coverage %,Inefficiency %,Orderset,Date");
        assert_eq!(lines[1], "1,Amo - Minmatar Fleet Market,75.0,15.0,126876,2023-11-19");
        assert_eq!(lines[2], "2,-,0.0,-,126876,2023-11-19");
    }
}
