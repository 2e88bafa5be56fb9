//! Build cost resolution over a recipe dependency graph.
//!
//! A recipe's cost is the sum of its input costs divided by the quantity one
//! run produces. Buildable inputs use their own resolved build cost and
//! everything else uses the supplied market price. Resolution runs in passes
//! and stops as soon as a pass resolves nothing, so cycles and unpriced
//! inputs end up in [`BuildCosts::unresolved`] instead of looping.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::domain::TypeId;
use crate::reference::{ReferenceData, ReferenceError};

#[derive(Debug, Error)]
pub enum IndustryError {
    #[error("failed to open industry file '{}': {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("industry recipes line {line}: {reason}")]
    Parse { line: u64, reason: String },

    #[error("industry exclusion list read error: {0}")]
    Read(#[from] std::io::Error),

    #[error(transparent)]
    Reference(#[from] ReferenceError),

    #[error("reprocess table line {line}: {reason}")]
    Reprocess { line: u64, reason: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Recipe {
    pub output: TypeId,
    pub quantity_built: u64,
    /// `(input, quantity required per run)`.
    pub inputs: BTreeMap<TypeId, f64>,
}

/// Why a recipe has no cost.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unresolved {
    /// A non-buildable input has no market price.
    MissingPrice { input: TypeId },
    /// A buildable input never resolved, possibly through a cycle.
    Blocked { on: TypeId },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BuildCosts {
    pub costs: HashMap<TypeId, f64>,
    pub unresolved: HashMap<TypeId, Unresolved>,
}

impl BuildCosts {
    pub fn get(&self, id: TypeId) -> Option<f64> {
        self.costs.get(&id).copied()
    }
}

enum InputCost {
    Known(f64),
    Missing(Unresolved),
}

/// Resolve every recipe's per-unit build cost.
pub fn resolve_build_costs<F>(recipes: &HashMap<TypeId, Recipe>, mut market_price: F) -> BuildCosts
where
    F: FnMut(TypeId) -> Option<f64>,
{
    let mut prices: HashMap<TypeId, Option<f64>> = HashMap::new();
    let mut pending: BTreeSet<TypeId> = recipes.keys().copied().collect();
    let mut out = BuildCosts::default();
    let mut pass = 0;

    loop {
        pass += 1;
        let mut resolved = Vec::new();
        for id in &pending {
            let Some(recipe) = recipes.get(id) else { continue };
            if let InputCost::Known(total) =
                recipe_cost(recipe, recipes, &out.costs, &mut prices, &mut market_price)
            {
                resolved.push((*id, total / recipe.quantity_built as f64));
            }
        }
        tracing::debug!(pass, resolved = resolved.len(), "build cost pass");
        if resolved.is_empty() {
            break;
        }
        for (id, cost) in resolved {
            pending.remove(&id);
            out.costs.insert(id, cost);
        }
    }

    for id in pending {
        let Some(recipe) = recipes.get(&id) else { continue };
        if let InputCost::Missing(reason) =
            recipe_cost(recipe, recipes, &out.costs, &mut prices, &mut market_price)
        {
            out.unresolved.insert(id, reason);
        }
    }
    tracing::info!(
        resolved = out.costs.len(),
        unresolved = out.unresolved.len(),
        "build costs computed"
    );
    out
}

fn recipe_cost<F>(
    recipe: &Recipe,
    recipes: &HashMap<TypeId, Recipe>,
    costs: &HashMap<TypeId, f64>,
    prices: &mut HashMap<TypeId, Option<f64>>,
    market_price: &mut F,
) -> InputCost
where
    F: FnMut(TypeId) -> Option<f64>,
{
    let mut total = 0.0;
    for (&input, &quantity) in &recipe.inputs {
        let unit = if recipes.contains_key(&input) {
            match costs.get(&input) {
                Some(c) => *c,
                None => return InputCost::Missing(Unresolved::Blocked { on: input }),
            }
        } else {
            match *prices.entry(input).or_insert_with(|| market_price(input)) {
                Some(p) => p,
                None => return InputCost::Missing(Unresolved::MissingPrice { input }),
            }
        };
        total += unit * quantity;
    }
    InputCost::Known(total)
}

// ── Recipe files ────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct RecipeRow {
    #[serde(rename = "Thing to make")]
    output: String,
    #[serde(rename = "Input")]
    input: String,
    #[serde(rename = "Quantity made")]
    quantity_made: String,
    #[serde(rename = "Quantity for N")]
    quantity_for_n: String,
}

pub fn load_recipes(path: &Path, reference: &ReferenceData) -> Result<HashMap<TypeId, Recipe>, IndustryError> {
    let file = File::open(path).map_err(|source| IndustryError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    read_recipes(file, reference)
}

/// Read recipes, one `(output, input)` pair per row. Names are resolved
/// through `reference`; rows naming unknown items are skipped.
pub fn read_recipes<R: Read>(
    reader: R,
    reference: &ReferenceData,
) -> Result<HashMap<TypeId, Recipe>, IndustryError> {
    let mut rdr = csv::Reader::from_reader(reader);
    let mut recipes: HashMap<TypeId, Recipe> = HashMap::new();

    for (idx, row) in rdr.deserialize::<RecipeRow>().enumerate() {
        let line = idx as u64 + 2;
        let parse_err = |reason: String| IndustryError::Parse { line, reason };
        let row = row.map_err(|e| parse_err(e.to_string()))?;

        let Some(output) = reference.type_info_by_name(&row.output)? else {
            tracing::warn!(name = %row.output, line, "recipe output not recognised");
            continue;
        };
        let Some(input) = reference.type_info_by_name(&row.input)? else {
            tracing::warn!(name = %row.input, line, "recipe input not recognised");
            continue;
        };
        let quantity_built = parse_grouped(&row.quantity_made)
            .and_then(|q| if q >= 1.0 && q.fract() == 0.0 { Some(q as u64) } else { None })
            .ok_or_else(|| parse_err(format!("bad quantity made '{}'", row.quantity_made)))?;
        let required = parse_grouped(&row.quantity_for_n)
            .filter(|q| *q >= 0.0)
            .ok_or_else(|| parse_err(format!("bad input quantity '{}'", row.quantity_for_n)))?;

        let recipe = recipes.entry(output.id).or_insert_with(|| Recipe {
            output: output.id,
            quantity_built,
            inputs: BTreeMap::new(),
        });
        recipe.quantity_built = quantity_built;
        recipe.inputs.insert(input.id, required);
    }
    Ok(recipes)
}

/// Read an exclusion list, one item name per line.
pub fn read_exclusions<R: Read>(reader: R, reference: &ReferenceData) -> Result<HashSet<TypeId>, IndustryError> {
    let mut out = HashSet::new();
    for line in BufReader::new(reader).lines() {
        let line = line?;
        let name = line.trim_end();
        if name.is_empty() {
            continue;
        }
        match reference.type_info_by_name(name)? {
            Some(info) => {
                out.insert(info.id);
            }
            None => tracing::warn!(%name, "excluded item not recognised"),
        }
    }
    Ok(out)
}

pub fn load_exclusions(path: &Path, reference: &ReferenceData) -> Result<HashSet<TypeId>, IndustryError> {
    let file = File::open(path).map_err(|source| IndustryError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    read_exclusions(file, reference)
}

// ── Reprocessing ────────────────────────────────────────────────────

pub const REPROCESS_FILE: &str = "reprocess.csv";

/// Share of each listed yield actually recovered.
const REPROCESS_EFFICIENCY_DIVISOR: u64 = 2;

#[derive(Debug, Deserialize)]
struct ReprocessRow {
    #[serde(rename = "ID")]
    id: TypeId,
    #[serde(rename = "OutputID")]
    output: TypeId,
    #[serde(rename = "QuantityYielded")]
    quantity: u64,
}

/// What each item breaks down into, from `ID,OutputID,QuantityYielded` rows.
#[derive(Debug, Clone, Default)]
pub struct ReprocessTable {
    yields: HashMap<TypeId, Vec<(TypeId, u64)>>,
}

impl ReprocessTable {
    pub fn load(path: &Path) -> Result<Self, IndustryError> {
        let file = File::open(path).map_err(|source| IndustryError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        let table = Self::from_reader(file)?;
        tracing::info!(items = table.yields.len(), path = %path.display(), "reprocess table loaded");
        Ok(table)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self, IndustryError> {
        let mut table = Self::default();
        for (idx, row) in csv::Reader::from_reader(reader).deserialize::<ReprocessRow>().enumerate() {
            let row = row.map_err(|e| IndustryError::Reprocess {
                line: idx as u64 + 2,
                reason: e.to_string(),
            })?;
            table.yields.entry(row.id).or_default().push((row.output, row.quantity));
        }
        Ok(table)
    }

    /// Market value of reprocessing one unit at half yield.
    ///
    /// `None` when the item has no yields, any output has no price, or the
    /// total is zero.
    pub fn value<F>(&self, id: TypeId, mut price: F) -> Option<f64>
    where
        F: FnMut(TypeId) -> Option<f64>,
    {
        let mut total = 0.0;
        for &(output, quantity) in self.yields.get(&id)? {
            let Some(p) = price(output) else {
                tracing::warn!(item = %id, %output, "no fair price for reprocess output");
                return None;
            };
            total += p * (quantity / REPROCESS_EFFICIENCY_DIVISOR) as f64;
        }
        (total > 0.0).then_some(total)
    }
}

/// Parse a number that may carry `,` thousands separators.
fn parse_grouped(raw: &str) -> Option<f64> {
    raw.trim().replace(',', "").parse::<f64>().ok()
}
