//! Fill report CSV.

use anyhow::{Context, Result};
use marketfill_core::decision::Recommendation;
use marketfill_core::reference::ReferenceData;

use crate::pipeline::FillReport;

pub const FILL_HEADER: [&str; 14] = [
    "TypeID",
    "Item Name",
    "Buy Quantity",
    "Build Quantity",
    "Sell Quantity",
    "Stock Quantity",
    "Max Buy",
    "My Sell Price",
    "My Assets",
    "My Current Sell",
    "From StationID",
    "From Station Name",
    "Adjust Order",
    "Notes",
];

fn row(r: &Recommendation, reference: &ReferenceData) -> [String; 14] {
    let (station_id, station_name) = match r.from_station {
        Some(s) => (
            s.to_string(),
            reference.station_name(s).unwrap_or_else(|| "-".to_string()),
        ),
        None => ("-".to_string(), "-".to_string()),
    };
    let notes: Vec<String> = r
        .notes
        .iter()
        .map(|n| n.render(|s| reference.station_name(s)))
        .collect();
    [
        r.type_id.to_string(),
        r.name.clone(),
        r.buy_quantity.to_string(),
        r.build_quantity.to_string(),
        r.sell_quantity.to_string(),
        r.stock_quantity.to_string(),
        format!("{:.2}", r.max_buy),
        format!("{:.2}", r.sell_price),
        r.my_assets.to_string(),
        r.my_current_sell.to_string(),
        station_id,
        station_name,
        r.adjust_order.to_string(),
        notes.join("; "),
    ]
}

pub fn export_fill_csv(recommendations: &[Recommendation], reference: &ReferenceData) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(FILL_HEADER)?;
    for r in recommendations {
        wtr.write_record(row(r, reference))
            .with_context(|| format!("failed to write row for item {}", r.type_id))?;
    }
    let bytes = wtr.into_inner().context("failed to flush fill CSV")?;
    String::from_utf8(bytes).context("fill CSV is not UTF-8")
}

/// Render a whole run.
pub fn export_report(report: &FillReport) -> Result<String> {
    export_fill_csv(&report.recommendations, &report.reference)
}
