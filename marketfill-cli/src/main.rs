//! Market filler CLI.
//!
//! Commands:
//! - `fill`: decide what to buy, build, and list at the destination station
//! - `history add`: record an orderset's hub prices in the price history
//! - `history status`: list stored history partitions
//! - `quality`: score every station against the basket
//! - `basket build`: rank items from monthly trade volumes into a basket file
//! - `info`: print an orderset's batch id and date
//!
//! Logs go to stderr so report CSV on stdout stays clean. `RUST_LOG` overrides
//! the default `info` filter.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use marketfill_core::basket::load_basket;
use marketfill_core::domain::StationId;
use marketfill_core::history::ParquetPriceStore;
use marketfill_core::orderset::read_orderset_info;
use marketfill_core::reference::ReferenceData;
use marketfill_runner::quality::export_detail_csv;
use marketfill_runner::{
    add_orderset_to_history, build_basket, export_basket_csv, export_quality_csv, export_report, read_filter_file,
    run_fill, run_quality, BasketBuildOptions, BasketFilter, FillerConfig,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "marketfill",
    about = "Market filler: stock decisions for a destination station"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Recommend buy, build, and sell quantities for every basket item.
    Fill {
        /// Path to the filler TOML config.
        #[arg(long, default_value = "filler.toml")]
        config: PathBuf,

        /// Gzip orderset snapshot.
        #[arg(long)]
        orderset: PathBuf,

        /// Destination station, overriding the config.
        #[arg(long)]
        station: Option<i64>,

        /// Source stations, overriding the config.
        #[arg(long, num_args = 1..)]
        from_stations: Option<Vec<i64>>,

        /// Only consider the N most traded items.
        #[arg(long)]
        limit_top_traded_items: Option<usize>,

        /// Write the report here instead of stdout.
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Price history management.
    History {
        #[command(subcommand)]
        action: HistoryAction,
    },
    /// Coverage and price inefficiency per station.
    Quality {
        #[arg(long, default_value = "filler.toml")]
        config: PathBuf,

        #[arg(long)]
        orderset: PathBuf,

        /// Also write per-item detail for this station to dump.csv.
        #[arg(long)]
        dump_detail_for: Option<i64>,

        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Print the orderset's batch id and date.
    Info {
        #[arg(long)]
        orderset: PathBuf,
    },
    /// Basket file management.
    Basket {
        #[command(subcommand)]
        action: BasketAction,
    },
}

#[derive(Subcommand)]
enum BasketAction {
    /// Rank items that trade heavily every month into a basket CSV.
    Build {
        #[arg(long, default_value = "filler.toml")]
        config: PathBuf,

        /// Monthly trade volume exports, one per month.
        #[arg(long, num_args = 1.., required = true)]
        volumes: Vec<PathBuf>,

        #[arg(long, num_args = 0..)]
        include_group: Option<Vec<i64>>,

        #[arg(long, num_args = 0..)]
        exclude_group: Option<Vec<i64>>,

        #[arg(long, num_args = 0..)]
        include_category: Option<Vec<i64>>,

        #[arg(long, num_args = 0..)]
        exclude_category: Option<Vec<i64>>,

        /// Drop items priced below their reprocessed value.
        #[arg(long)]
        exclude_junk: bool,

        /// Day whose fair prices decide junk. Defaults to today.
        #[arg(long)]
        date: Option<NaiveDate>,

        #[arg(long)]
        output: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum HistoryAction {
    /// Add one orderset's prices as the partition for its date.
    Add {
        #[arg(long, default_value = "filler.toml")]
        config: PathBuf,

        #[arg(long)]
        orderset: PathBuf,

        /// Stations recorded in addition to the hubs.
        #[arg(long, num_args = 1..)]
        extra_stations: Vec<i64>,

        /// CSV with an `ID` column; only those items are recorded.
        #[arg(long)]
        filter_items: Option<PathBuf>,
    },
    /// List stored partitions.
    Status {
        #[arg(long, default_value = "filler.toml")]
        config: PathBuf,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Fill {
            config,
            orderset,
            station,
            from_stations,
            limit_top_traded_items,
            output,
        } => run_fill_cmd(
            &config,
            &orderset,
            station,
            from_stations,
            limit_top_traded_items,
            output.as_deref(),
        ),
        Commands::History { action } => match action {
            HistoryAction::Add {
                config,
                orderset,
                extra_stations,
                filter_items,
            } => run_history_add(&config, &orderset, &extra_stations, filter_items.as_deref()),
            HistoryAction::Status { config } => run_history_status(&config),
        },
        Commands::Quality {
            config,
            orderset,
            dump_detail_for,
            output,
        } => run_quality_cmd(&config, &orderset, dump_detail_for, output.as_deref()),
        Commands::Info { orderset } => run_info(&orderset),
        Commands::Basket {
            action:
                BasketAction::Build {
                    config,
                    volumes,
                    include_group,
                    exclude_group,
                    include_category,
                    exclude_category,
                    exclude_junk,
                    date,
                    output,
                },
        } => {
            let set = |ids: Option<Vec<i64>>| ids.map(|v| v.into_iter().collect::<HashSet<_>>());
            let options = BasketBuildOptions {
                volumes,
                filter: BasketFilter {
                    include_groups: set(include_group),
                    exclude_groups: set(exclude_group),
                    include_categories: set(include_category),
                    exclude_categories: set(exclude_category),
                },
                exclude_junk,
                date: date.unwrap_or_else(|| chrono::Local::now().date_naive()),
            };
            run_basket_build(&config, &options, output.as_deref())
        }
    }
}

fn load_config(path: &Path) -> Result<FillerConfig> {
    FillerConfig::from_file(path).with_context(|| format!("loading config {}", path.display()))
}

fn emit(csv: &str, output: Option<&Path>) -> Result<()> {
    match output {
        Some(path) => {
            std::fs::write(path, csv).with_context(|| format!("writing {}", path.display()))?;
            tracing::info!(path = %path.display(), "report written");
        }
        None => print!("{csv}"),
    }
    Ok(())
}

fn run_fill_cmd(
    config_path: &Path,
    orderset: &Path,
    station: Option<i64>,
    from_stations: Option<Vec<i64>>,
    limit: Option<usize>,
    output: Option<&Path>,
) -> Result<()> {
    let mut config = load_config(config_path)?;
    config.apply_overrides(
        station.map(StationId),
        from_stations.map(|s| s.into_iter().map(StationId).collect()),
        limit,
    );
    let report = run_fill(&config, orderset)?;
    if !report.unpriced.is_empty() {
        tracing::warn!(count = report.unpriced.len(), "basket items skipped without a fair price");
    }
    emit(&export_report(&report)?, output)
}

fn run_history_add(
    config_path: &Path,
    orderset: &Path,
    extra_stations: &[i64],
    filter_items: Option<&Path>,
) -> Result<()> {
    let config = load_config(config_path)?;
    let mut stations: HashSet<StationId> = config.hub_stations.iter().copied().collect();
    stations.extend(extra_stations.iter().copied().map(StationId));

    let filter = filter_items.map(read_filter_file).transpose()?;
    let store = ParquetPriceStore::new(&config.paths.price_history);
    let summary = add_orderset_to_history(orderset, &store, &stations, filter.as_ref())?;
    println!(
        "{}: wrote {} items, skipped {} ({} rows in partition)",
        summary.date, summary.written, summary.skipped, summary.partition_rows
    );
    Ok(())
}

fn run_history_status(config_path: &Path) -> Result<()> {
    let config = load_config(config_path)?;
    let store = ParquetPriceStore::new(&config.paths.price_history);
    let status = store.status()?;
    if status.is_empty() {
        println!("No history partitions in {}", store.dir().display());
        return Ok(());
    }

    println!("{:<12} {:>8} {:>10}  written", "date", "rows", "orderset");
    for s in &status {
        match &s.manifest {
            Some(m) => println!(
                "{:<12} {:>8} {:>10}  {}",
                s.date,
                m.rows,
                m.orderset.map_or_else(|| "-".to_string(), |b| b.to_string()),
                m.written_at.format("%Y-%m-%d %H:%M")
            ),
            None => println!("{:<12} {:>8} {:>10}  -", s.date, "?", "-"),
        }
    }
    println!("{} partitions", status.len());
    Ok(())
}

fn run_quality_cmd(
    config_path: &Path,
    orderset: &Path,
    dump_detail_for: Option<i64>,
    output: Option<&Path>,
) -> Result<()> {
    let config = load_config(config_path)?;
    let reference = ReferenceData::load(&config.paths.reference_dir)?;
    let basket = load_basket(&config.paths.basket, config.basket_limit)?;
    let report = run_quality(orderset, &basket)?;

    if let Some(station) = dump_detail_for.map(StationId) {
        match report.stations.iter().find(|s| s.station_id == station) {
            Some(s) => {
                tracing::info!(%station, "dumping detail");
                std::fs::write("dump.csv", export_detail_csv(s, &reference)?).context("writing dump.csv")?;
            }
            None => tracing::warn!(%station, "station not in orderset, no detail written"),
        }
    }

    emit(&export_quality_csv(&report, &reference)?, output)
}

fn run_basket_build(config_path: &Path, options: &BasketBuildOptions, output: Option<&Path>) -> Result<()> {
    let config = load_config(config_path)?;
    let items = build_basket(&config, options)?;
    emit(&export_basket_csv(&items)?, output)
}

fn run_info(orderset: &Path) -> Result<()> {
    let info = read_orderset_info(orderset)?;
    println!(
        "orderset {}: #{}, {}",
        orderset.display(),
        info.orderset.map_or_else(|| "-".to_string(), |b| b.to_string()),
        info.date.map_or_else(|| "-".to_string(), |d| d.to_string())
    );
    Ok(())
}
