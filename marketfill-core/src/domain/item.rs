//! Basket items and their per-run price model.

use serde::{Deserialize, Serialize};

use super::ids::TypeId;
use super::note::Note;

/// Static description of a traded item, loaded once from the basket file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemSummary {
    pub id: TypeId,
    pub name: String,
    pub group_id: i64,
    pub category_id: i64,
    /// Market-group path, e.g. `Ammunition & Charges>Hybrid Charges`.
    pub market_group: String,
    /// Total ISK value traded market-wide per reference period.
    pub value_traded: f64,
    /// Reference best buy, present in older basket variants only.
    pub reference_buy: Option<f64>,
    /// Reference best sell, present in older basket variants only.
    pub reference_sell: Option<f64>,
}

/// Prices derived from the fair price for one item.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelPrices {
    /// Highest price we are willing to pay when buying stock.
    pub buy: f64,
    /// Sell price at which existing supply already counts as "in stock".
    pub sell: f64,
    /// Price we would list new sell orders at.
    pub new_sell: f64,
}

/// An item plus its pricing for this run.
///
/// `notes` is diagnostic only. It is appended to while pricing and deciding and
/// never drives control flow.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemModel {
    pub trade: ItemSummary,
    pub prices: Option<ModelPrices>,
    pub notes: Vec<Note>,
}

impl ItemModel {
    pub fn unpriced(trade: ItemSummary) -> Self {
        Self {
            trade,
            prices: None,
            notes: Vec::new(),
        }
    }

    pub fn priced(trade: ItemSummary, prices: ModelPrices) -> Self {
        Self {
            trade,
            prices: Some(prices),
            notes: Vec::new(),
        }
    }

    pub fn id(&self) -> TypeId {
        self.trade.id
    }

    pub fn is_priced(&self) -> bool {
        self.prices.is_some()
    }

    /// Report ordering: category, then group, then id.
    pub fn order_key(&self) -> (i64, i64, TypeId) {
        (self.trade.category_id, self.trade.group_id, self.trade.id)
    }
}
