//! Market filler runner: configuration, operator inputs, and the jobs built on
//! `marketfill-core`.
//!
//! - The fill run: basket, fair prices, stock aggregation, per-item decisions
//! - Market-history ingestion into the daily Parquet store
//! - Station quality scoring
//! - Basket building from monthly trade volumes
//! - CSV export of fill and quality reports

pub mod basket;
pub mod config;
pub mod history;
pub mod inputs;
pub mod pipeline;
pub mod quality;
pub mod report;

pub use basket::{build_basket, export_basket_csv, BasketBuildError, BasketBuildOptions, BasketFilter, ScoredItem};
pub use config::{ConfigError, FillerConfig, PathsConfig, PolicyConfig};
pub use history::{add_orderset_to_history, read_filter_file, IngestError, IngestSummary};
pub use inputs::{load_assets, load_orders, InputError};
pub use pipeline::{run_fill, FillReport, RunError};
pub use quality::{export_quality_csv, run_quality, QualityReport, StationQuality};
pub use report::{export_fill_csv, export_report};
