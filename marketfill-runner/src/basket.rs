//! Basket building: rank items by how consistently they trade across monthly
//! market-volume exports, and write the result in basket file format.
//!
//! Volume exports carry `Commodity, Value of trades, Traded items` with `.`
//! as the thousands separator. An item's score is its worst month's value
//! traded scaled down by the value of one normal-sized trade, so items that
//! trade heavily every month rank above bursty or seasonal ones.

use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::NaiveDate;
use marketfill_core::decision::{OrderSizeRules, RuleError};
use marketfill_core::domain::{ItemSummary, TypeId};
use marketfill_core::history::{HistoryError, ParquetPriceStore};
use marketfill_core::industry::{IndustryError, ReprocessTable, REPROCESS_FILE};
use marketfill_core::pricing::FairPriceModel;
use marketfill_core::reference::{ReferenceData, ReferenceError, TypeInfo};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::FillerConfig;

/// Rows written to a built basket.
pub const MAX_BASKET_ITEMS: usize = 10_000;

/// An item is junk when its fair price is below this multiple of its
/// reprocessed value.
pub const JUNK_MARGIN: f64 = 1.1;

const SCORE_EXPONENT: f64 = 0.6;

#[derive(Debug, Error)]
pub enum BasketBuildError {
    #[error("failed to open volume file '{}': {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("volume file line {line}: {reason}")]
    Parse { line: u64, reason: String },

    #[error("order size rules: {0}")]
    Rules(#[from] RuleError),

    #[error("reference data error: {0}")]
    Reference(#[from] ReferenceError),

    #[error("history error: {0}")]
    History(#[from] HistoryError),

    #[error("industry error: {0}")]
    Industry(#[from] IndustryError),
}

/// One row of a monthly volume export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeEntry {
    pub commodity: String,
    pub value: u64,
    pub traded_items: u64,
}

#[derive(Debug, Deserialize)]
struct VolumeRow {
    #[serde(rename = "Commodity")]
    commodity: String,
    #[serde(rename = "Value of trades")]
    value: String,
    #[serde(rename = "Traded items")]
    traded_items: String,
}

pub fn load_volumes(path: &Path) -> Result<Vec<VolumeEntry>, BasketBuildError> {
    let file = File::open(path).map_err(|source| BasketBuildError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    let entries = read_volumes(file)?;
    tracing::info!(path = %path.display(), rows = entries.len(), "trade volumes read");
    Ok(entries)
}

pub fn read_volumes<R: Read>(reader: R) -> Result<Vec<VolumeEntry>, BasketBuildError> {
    let mut entries = Vec::new();
    for (idx, row) in csv::Reader::from_reader(reader).deserialize::<VolumeRow>().enumerate() {
        let line = idx as u64 + 2;
        let parse_err = |reason: String| BasketBuildError::Parse { line, reason };
        let row = row.map_err(|e| parse_err(e.to_string()))?;
        entries.push(VolumeEntry {
            value: dotted_number(&row.value).map_err(parse_err)?,
            traded_items: dotted_number(&row.traded_items).map_err(parse_err)?,
            commodity: row.commodity,
        });
    }
    Ok(entries)
}

/// Parse an integer written with `.` thousands separators, e.g. `1.234.567`.
fn dotted_number(raw: &str) -> Result<u64, String> {
    let digits = raw.trim().replace('.', "");
    digits.parse::<u64>().map_err(|e| format!("bad number '{raw}': {e}"))
}

// ── Filtering ──

/// Group and category selection. `None` leaves that test out.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BasketFilter {
    pub include_groups: Option<HashSet<i64>>,
    pub exclude_groups: Option<HashSet<i64>>,
    pub include_categories: Option<HashSet<i64>>,
    pub exclude_categories: Option<HashSet<i64>>,
}

impl BasketFilter {
    pub fn admits(&self, info: &TypeInfo) -> bool {
        let allowed = |set: &Option<HashSet<i64>>, id: i64| set.as_ref().map_or(true, |s| s.contains(&id));
        let denied = |set: &Option<HashSet<i64>>, id: i64| set.as_ref().is_some_and(|s| s.contains(&id));
        allowed(&self.include_groups, info.group_id)
            && !denied(&self.exclude_groups, info.group_id)
            && allowed(&self.include_categories, info.category_id)
            && !denied(&self.exclude_categories, info.category_id)
    }
}

/// Flags items worth more reprocessed than sold.
pub struct JunkCheck<'a> {
    fair: FairPriceModel<'a>,
    reprocess: ReprocessTable,
    date: NaiveDate,
    seen: HashMap<TypeId, bool>,
}

impl<'a> JunkCheck<'a> {
    pub fn new(fair: FairPriceModel<'a>, reprocess: ReprocessTable, date: NaiveDate) -> Self {
        Self {
            fair,
            reprocess,
            date,
            seen: HashMap::new(),
        }
    }

    pub fn is_junk(&mut self, id: TypeId) -> Result<bool, HistoryError> {
        if let Some(&junk) = self.seen.get(&id) {
            return Ok(junk);
        }
        let price = self.fair.get_pricing(id, self.date)?.fair_price;
        let (fair, date) = (&self.fair, self.date);
        let reprocessed = self
            .reprocess
            .value(id, |output| fair.get_pricing(output, date).ok().and_then(|p| p.fair_price));
        let junk = match (price, reprocessed) {
            (Some(p), Some(r)) => p < r * JUNK_MARGIN,
            _ => false,
        };
        if junk {
            tracing::info!(item = %id, price = ?price, reprocessed = ?reprocessed, "excluded as junk");
        }
        self.seen.insert(id, junk);
        Ok(junk)
    }
}

// ── Scoring ──

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonthlyVolume {
    pub traded_items: u64,
    pub value: u64,
}

/// A candidate basket item with its per-month volumes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredItem {
    pub id: TypeId,
    pub name: String,
    pub group_id: i64,
    pub category_id: i64,
    pub market_group: String,
    pub normal_market_size: u64,
    pub months: Vec<MonthlyVolume>,
    /// Lowest monthly value traded.
    pub value: u64,
    pub score: f64,
}

/// Worst-month value traded over `(value of one normal-sized trade)^0.6`.
///
/// Zero when the item traded in fewer than `month_count` months, or when the
/// per-trade value cannot be formed.
pub fn consistency_score(months: &[MonthlyVolume], normal_market_size: u64, month_count: usize) -> f64 {
    if months.len() < month_count {
        return 0.0;
    }
    let (Some(num), Some(value)) = (
        months.iter().map(|m| m.traded_items).min(),
        months.iter().map(|m| m.value).min(),
    ) else {
        return 0.0;
    };
    if num == 0 {
        return 0.0;
    }
    let per_trade = value as f64 / num as f64 * normal_market_size as f64;
    if per_trade <= 0.0 {
        return 0.0;
    }
    let scale = per_trade.powf(SCORE_EXPONENT);
    months
        .iter()
        .map(|m| m.value as f64 / scale)
        .fold(f64::INFINITY, f64::min)
}

/// Counts logged after each month is added.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MonthStats {
    pub new: usize,
    pub updated: usize,
    pub junk: usize,
}

/// Accumulates monthly volumes into scored candidates, keeping first-seen order.
pub struct BasketScorer<'a> {
    reference: &'a ReferenceData,
    rules: &'a OrderSizeRules,
    filter: &'a BasketFilter,
    months: usize,
    items: Vec<ScoredItem>,
    index: HashMap<TypeId, usize>,
}

impl<'a> BasketScorer<'a> {
    pub fn new(reference: &'a ReferenceData, rules: &'a OrderSizeRules, filter: &'a BasketFilter) -> Self {
        Self {
            reference,
            rules,
            filter,
            months: 0,
            items: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Add one month. `is_junk` is asked only about items that pass the filter.
    pub fn add_month<J>(&mut self, entries: &[VolumeEntry], mut is_junk: J) -> Result<MonthStats, BasketBuildError>
    where
        J: FnMut(TypeId) -> Result<bool, BasketBuildError>,
    {
        self.months += 1;
        let mut stats = MonthStats::default();
        for entry in entries {
            let Some(info) = self.reference.type_info_by_name(&entry.commodity)? else {
                tracing::debug!(commodity = %entry.commodity, "unknown commodity");
                continue;
            };
            if !self.filter.admits(info) {
                continue;
            }
            if is_junk(info.id)? {
                stats.junk += 1;
                continue;
            }
            if info.market_group.is_empty() {
                tracing::debug!(item = %info.name, "non-market item");
                continue;
            }

            let month = MonthlyVolume {
                traded_items: entry.traded_items,
                value: entry.value,
            };
            match self.index.get(&info.id) {
                Some(&at) => {
                    self.items[at].months.push(month);
                    stats.updated += 1;
                }
                None => {
                    let candidate = self.candidate(info, month)?;
                    self.index.insert(info.id, self.items.len());
                    self.items.push(candidate);
                    stats.new += 1;
                }
            }
        }
        Ok(stats)
    }

    fn candidate(&self, info: &TypeInfo, month: MonthlyVolume) -> Result<ScoredItem, BasketBuildError> {
        let summary = ItemSummary {
            id: info.id,
            name: info.name.clone(),
            group_id: info.group_id,
            category_id: info.category_id,
            market_group: info.market_group.clone(),
            value_traded: 0.0,
            reference_buy: None,
            reference_sell: None,
        };
        let rule = self.rules.lookup(&summary)?;
        Ok(ScoredItem {
            id: info.id,
            name: info.name.clone(),
            group_id: info.group_id,
            category_id: info.category_id,
            market_group: info.market_group.clone(),
            normal_market_size: rule.normal_market_size,
            months: vec![month],
            value: 0,
            score: 0.0,
        })
    }

    /// Score every candidate and rank them, best first. Ties keep first-seen order.
    pub fn finish(self) -> Vec<ScoredItem> {
        let months = self.months;
        let mut items = self.items;
        for item in &mut items {
            item.value = item.months.iter().map(|m| m.value).min().unwrap_or(0);
            item.score = consistency_score(&item.months, item.normal_market_size, months);
        }
        items.sort_by(|a, b| b.score.total_cmp(&a.score));
        items.truncate(MAX_BASKET_ITEMS);
        items
    }
}

// ── Job ──

#[derive(Debug, Clone, PartialEq)]
pub struct BasketBuildOptions {
    /// One volume export per month.
    pub volumes: Vec<PathBuf>,
    pub filter: BasketFilter,
    pub exclude_junk: bool,
    /// Day whose fair prices decide junk.
    pub date: NaiveDate,
}

/// Build a ranked basket from the monthly volume exports.
pub fn build_basket(config: &FillerConfig, options: &BasketBuildOptions) -> Result<Vec<ScoredItem>, BasketBuildError> {
    let paths = &config.paths;
    let reference = ReferenceData::load(&paths.reference_dir)?;
    let rules = OrderSizeRules::from_file(&paths.order_sizes)?;

    let history;
    let mut junk = if options.exclude_junk {
        let hubs: HashSet<_> = config.hub_stations.iter().copied().collect();
        let store = ParquetPriceStore::new(&paths.price_history);
        history = store.load_for_pricing(options.date, config.fair_price_window_months, &hubs)?;
        let fair = FairPriceModel::new(&history, hubs, config.fair_price_window_months);
        let reprocess = ReprocessTable::load(&paths.reference_dir.join(REPROCESS_FILE))?;
        Some(JunkCheck::new(fair, reprocess, options.date))
    } else {
        None
    };

    let mut scorer = BasketScorer::new(&reference, &rules, &options.filter);
    for path in &options.volumes {
        let entries = load_volumes(path)?;
        let stats = scorer.add_month(&entries, |id| match junk.as_mut() {
            Some(check) => Ok(check.is_junk(id)?),
            None => Ok(false),
        })?;
        tracing::info!(
            path = %path.display(),
            new = stats.new,
            updated = stats.updated,
            junk = stats.junk,
            "trade volumes added"
        );
    }

    let items = scorer.finish();
    tracing::info!(items = items.len(), months = options.volumes.len(), "basket ranked");
    Ok(items)
}

// ─── CSV export ─────────────────────────────────────────────────────

/// Basket file rows: `ID, Name, GroupID, CategoryID, MarketGroup, Value Traded`.
pub fn export_basket_csv(items: &[ScoredItem]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(["ID", "Name", "GroupID", "CategoryID", "MarketGroup", "Value Traded"])?;
    for item in items {
        wtr.write_record([
            item.id.to_string(),
            item.name.clone(),
            item.group_id.to_string(),
            item.category_id.to_string(),
            item.market_group.clone(),
            item.value.to_string(),
        ])?;
    }
    let bytes = wtr.into_inner().context("failed to flush basket CSV")?;
    String::from_utf8(bytes).context("basket CSV is not UTF-8")
}
