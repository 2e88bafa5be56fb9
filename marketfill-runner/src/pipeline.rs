//! The end-to-end fill run.
//!
//! Two passes over the orderset: the first establishes its batch id and date,
//! which selects the price history; the second aggregates stock against the
//! price models built from that history.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use marketfill_core::basket::{load_basket, BasketError};
use marketfill_core::decision::{DecisionEngine, DecisionError, DecisionInput, OrderSizeRules, Recommendation, RuleError};
use marketfill_core::domain::{ItemModel, StationId, TypeId};
use marketfill_core::history::{HistoryError, ParquetPriceStore};
use marketfill_core::industry::{load_exclusions, load_recipes, resolve_build_costs, BuildCosts, IndustryError};
use marketfill_core::orderset::{read_orderset_info, OrdersetError, OrdersetInfo};
use marketfill_core::pricing::{price_item, FairPriceModel};
use marketfill_core::reference::{ReferenceData, ReferenceError};
use marketfill_core::stock::aggregate_file;
use thiserror::Error;

use crate::config::{ConfigError, FillerConfig};
use crate::inputs::{load_assets, load_orders, InputError};

#[derive(Debug, Error)]
pub enum RunError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("basket error: {0}")]
    Basket(#[from] BasketError),
    #[error("orderset error: {0}")]
    Orderset(#[from] OrdersetError),
    #[error("history error: {0}")]
    History(#[from] HistoryError),
    #[error("order size rules: {0}")]
    Rules(#[from] RuleError),
    #[error("reference data error: {0}")]
    Reference(#[from] ReferenceError),
    #[error("industry error: {0}")]
    Industry(#[from] IndustryError),
    #[error("input error: {0}")]
    Input(#[from] InputError),
    #[error("decision error: {0}")]
    Decision(#[from] DecisionError),
    #[error("orderset '{}' carries no order dates", .0.display())]
    NoOrdersetDate(PathBuf),
}

/// Output of [`run_fill`].
#[derive(Debug, Clone)]
pub struct FillReport {
    pub info: OrdersetInfo,
    pub destination: StationId,
    pub recommendations: Vec<Recommendation>,
    /// Basket items left out for lack of a fair price.
    pub unpriced: Vec<TypeId>,
    pub reference: ReferenceData,
}

/// Everything loaded before the second orderset pass.
struct Prepared {
    models: HashMap<TypeId, ItemModel>,
    unpriced: Vec<TypeId>,
    build_costs: BuildCosts,
}

pub fn run_fill(config: &FillerConfig, orderset: &Path) -> Result<FillReport, RunError> {
    let destination = config.validate_for_fill()?;
    let paths = &config.paths;

    let reference = ReferenceData::load(&paths.reference_dir)?;
    let basket = load_basket(&paths.basket, config.basket_limit)?;
    let rules = OrderSizeRules::from_file(&paths.order_sizes)?;

    let info = read_orderset_info(orderset)?;
    let date = info
        .date
        .ok_or_else(|| RunError::NoOrdersetDate(orderset.to_path_buf()))?
        .date();
    tracing::info!(orderset = %orderset.display(), batch = ?info.orderset, %date, "orderset identified");

    let hubs: HashSet<StationId> = config.hub_stations.iter().copied().collect();
    let history = ParquetPriceStore::new(&paths.price_history).load_for_pricing(
        date,
        config.fair_price_window_months,
        &hubs,
    )?;
    let fair = FairPriceModel::new(&history, hubs, config.fair_price_window_months);

    let mut prepared = Prepared {
        models: HashMap::new(),
        unpriced: Vec::new(),
        build_costs: BuildCosts::default(),
    };
    for item in basket {
        let pricing = fair.get_pricing(item.id, date)?;
        let model = price_item(item, &pricing, &config.markup);
        if model.is_priced() {
            prepared.models.insert(model.id(), model);
        } else {
            tracing::warn!(type_id = %model.id(), name = %model.trade.name, "no fair price, skipping");
            prepared.unpriced.push(model.id());
        }
    }
    tracing::info!(priced = prepared.models.len(), unpriced = prepared.unpriced.len(), "price models built");

    let assets = match &paths.assets {
        Some(p) => load_assets(p, destination, &reference)?,
        None => HashMap::new(),
    };
    let own_orders = match &paths.orders {
        Some(p) => load_orders(p, destination, &reference)?,
        None => HashMap::new(),
    };

    if let Some(recipes_path) = &paths.industry_recipes {
        let mut recipes = load_recipes(recipes_path, &reference)?;
        if let Some(exclude_path) = &paths.industry_exclude {
            for id in load_exclusions(exclude_path, &reference)? {
                recipes.remove(&id);
            }
        }
        prepared.build_costs = resolve_build_costs(&recipes, |id| {
            fair.get_pricing(id, date).ok().and_then(|p| p.fair_price)
        });
        tracing::info!(
            recipes = recipes.len(),
            resolved = prepared.build_costs.costs.len(),
            unresolved = prepared.build_costs.unresolved.len(),
            "build costs resolved"
        );
    }

    let sources: HashSet<StationId> = config.source_stations.iter().copied().collect();
    let mut stations = sources.clone();
    stations.insert(destination);
    let stock = aggregate_file(orderset, &prepared.models, &stations)?;

    let engine = DecisionEngine::new(&rules, config.decision_policy());
    let mut ordered: Vec<&ItemModel> = prepared.models.values().collect();
    ordered.sort_by_key(|m| m.order_key());

    let mut recommendations = Vec::with_capacity(ordered.len());
    for model in ordered {
        let id = model.id();
        let input = DecisionInput {
            destination,
            item: model,
            station_stocks: stock.stations(id),
            lowest_sell: stock.lowest(id),
            allowed_sources: &sources,
            current_assets: assets.get(&id).copied().unwrap_or(0),
            current_order: own_orders.get(&id).copied(),
            build_cost: prepared.build_costs.get(id),
        };
        recommendations.push(engine.decide(&input)?);
    }
    tracing::info!(items = recommendations.len(), "fill decided");

    Ok(FillReport {
        info,
        destination,
        recommendations,
        unpriced: prepared.unpriced,
        reference,
    })
}
