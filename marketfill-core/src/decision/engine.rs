//! Per-item stock decision.
//!
//! Stages, in order:
//! - **A** target stock: market quantity at our buy price, scaled by the
//!   stock fraction, rounded to the min order size, then reduced by
//!   competitor stock at the destination.
//! - **B** how much more to sell, with existing supply overweighted.
//! - **C** what to buy after assets and our own listing.
//! - **D** sourcing: skip tiny buys, prefer building when the market premium
//!   is high, otherwise pick one source station.
//! - **E** final sell quantity.

use std::cmp::Reverse;
use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::sizing::{OrderSizeRules, RuleError};
use crate::domain::{ItemModel, ModelPrices, Note, StationId, TypeId};
use crate::stock::{LowestSell, StationStock};

#[derive(Debug, Error)]
pub enum DecisionError {
    #[error(transparent)]
    Rule(#[from] RuleError),

    #[error("item {type_id} reached the decision engine without a fair price")]
    Unpriced { type_id: TypeId },

    #[error("item {type_id} has non-positive buy price {price}")]
    InvalidBuyPrice { type_id: TypeId, price: f64 },
}

/// Tunables for the heuristic.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecisionPolicy {
    /// Fraction of total market volume we aim to supply.
    pub stock_fraction: f64,
    /// Build instead of buy when the lowest sell exceeds build cost by this factor.
    pub build_premium: f64,
    /// Flag a listing for repricing when it exceeds the new sell price by this factor.
    pub reprice_margin: f64,
    /// Weight of existing supply in the "already in stock" test.
    pub existing_stock_weight: u64,
}

impl Default for DecisionPolicy {
    fn default() -> Self {
        Self {
            stock_fraction: 0.04,
            build_premium: 1.1,
            reprice_margin: 1.1,
            existing_stock_weight: 2,
        }
    }
}

/// Our own sell listing at the destination.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OwnOrder {
    pub quantity: u64,
    pub price: f64,
}

/// Everything the engine needs to decide one item.
#[derive(Debug, Clone, Copy)]
pub struct DecisionInput<'a> {
    pub destination: StationId,
    pub item: &'a ItemModel,
    /// Per-station stock for this item; `None` when no station had any.
    pub station_stocks: Option<&'a HashMap<StationId, StationStock>>,
    pub lowest_sell: Option<LowestSell>,
    pub allowed_sources: &'a HashSet<StationId>,
    pub current_assets: u64,
    pub current_order: Option<OwnOrder>,
    pub build_cost: Option<f64>,
}

/// One report row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub type_id: TypeId,
    pub name: String,
    pub buy_quantity: u64,
    pub build_quantity: u64,
    pub sell_quantity: u64,
    /// Competitor-adjusted target stock level.
    pub stock_quantity: u64,
    pub from_station: Option<StationId>,
    pub adjust_order: bool,
    pub my_assets: u64,
    pub my_current_sell: u64,
    pub max_buy: f64,
    pub sell_price: f64,
    pub notes: Vec<Note>,
}

pub struct DecisionEngine<'a> {
    rules: &'a OrderSizeRules,
    policy: DecisionPolicy,
}

impl<'a> DecisionEngine<'a> {
    pub fn new(rules: &'a OrderSizeRules, policy: DecisionPolicy) -> Self {
        Self { rules, policy }
    }

    pub fn policy(&self) -> &DecisionPolicy {
        &self.policy
    }

    pub fn decide(&self, input: &DecisionInput<'_>) -> Result<Recommendation, DecisionError> {
        let item = input.item;
        let type_id = item.id();
        let prices: ModelPrices = item.prices.ok_or(DecisionError::Unpriced { type_id })?;
        if prices.buy <= 0.0 || !prices.buy.is_finite() {
            return Err(DecisionError::InvalidBuyPrice {
                type_id,
                price: prices.buy,
            });
        }
        let min_order = self.rules.lookup(&item.trade)?.min_order_size;
        let mut notes = item.notes.clone();

        let stock_at = |station: StationId| {
            input
                .station_stocks
                .and_then(|s| s.get(&station))
                .copied()
                .unwrap_or_default()
        };
        let order_qty = input.current_order.map_or(0, |o| o.quantity);

        // A: target
        let market_quantity = (item.trade.value_traded / prices.buy).floor() as u64;
        let raw_target = round_to_multiple(
            (market_quantity as f64 * self.policy.stock_fraction).floor() as u64,
            min_order,
        );
        let existing = stock_at(input.destination).below_sell;
        let competitor = match input.current_order {
            Some(o) if o.price <= prices.new_sell => existing.saturating_sub(o.quantity),
            _ => existing,
        };
        let target = raw_target.saturating_sub(competitor);

        // B: how much more
        let weight = self.policy.existing_stock_weight;
        let stock_quantity = if existing * weight + order_qty * weight >= target {
            notes.push(Note::AlreadyInStock { volume: existing });
            0
        } else {
            if existing > 0 {
                notes.push(Note::SomeStockBelowTarget { volume: existing });
            }
            target.saturating_sub(existing)
        };

        // C: buy after assets and listing
        let mut buy = stock_quantity.saturating_sub(input.current_assets);
        let held = stock_quantity - buy;
        let mut adjust_order = false;
        if let Some(order) = input.current_order {
            buy = buy.saturating_sub(order.quantity);
            notes.push(Note::AlreadyListed {
                quantity: order.quantity,
                price: order.price,
            });
            if prices.new_sell * self.policy.reprice_margin < order.price {
                adjust_order = true;
                notes.push(Note::RepriceOrder {
                    current: order.price,
                    target: prices.new_sell,
                });
            }
        }

        // D: sourcing
        let mut build_quantity = 0;
        let mut from_station = None;
        let buildable = match (input.build_cost, input.lowest_sell) {
            (Some(cost), Some(low)) if low.price > cost * self.policy.build_premium => {
                Some((cost, low.price))
            }
            _ => None,
        };
        if (buy as f64) < min_order as f64 / 2.0 {
            if existing == 0 && input.current_order.is_none() {
                notes.push(Note::TargetTooLow { target });
            }
            buy = 0;
        } else if let Some((build_cost, lowest_sell)) = buildable {
            notes.push(Note::Build {
                build_cost,
                lowest_sell,
            });
            build_quantity = buy;
            buy = 0;
        } else {
            let want = buy.div_ceil(min_order) * min_order;
            let lowest_station = input.lowest_sell.map(|l| l.station);
            let mut sources: Vec<StationId> = input.allowed_sources.iter().copied().collect();
            sources.sort_by_key(|s| (Some(*s) != lowest_station, Reverse(stock_at(*s).below_buy), *s));

            buy = 0;
            for station in sources {
                let available = stock_at(station).below_buy;
                if available == 0 {
                    notes.push(Note::NotAvailableAtStation { station, want });
                } else if available < min_order || (available as f64) < want as f64 / 2.0 {
                    notes.push(Note::NotAvailableInQuantity {
                        station,
                        want,
                        available,
                    });
                } else {
                    buy = available.min(want);
                    from_station = Some(station);
                    break;
                }
            }
        }

        // E: final sell quantity
        let sell_quantity = (buy + build_quantity + held).min(target.saturating_sub(order_qty));

        Ok(Recommendation {
            type_id,
            name: item.trade.name.clone(),
            buy_quantity: buy,
            build_quantity,
            sell_quantity,
            stock_quantity: target,
            from_station,
            adjust_order,
            my_assets: input.current_assets,
            my_current_sell: order_qty,
            max_buy: prices.buy,
            sell_price: prices.new_sell,
            notes,
        })
    }
}

/// Round to the nearest multiple of `step`, halves away from zero.
fn round_to_multiple(quantity: u64, step: u64) -> u64 {
    (quantity + step / 2) / step * step
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounding_to_multiples() {
        assert_eq!(round_to_multiple(5, 1), 5);
        assert_eq!(round_to_multiple(5, 1000), 0);
        assert_eq!(round_to_multiple(500, 1000), 1000);
        assert_eq!(round_to_multiple(499, 1000), 0);
        assert_eq!(round_to_multiple(1, 3), 0);
        assert_eq!(round_to_multiple(2, 3), 3);
        assert_eq!(round_to_multiple(2600, 1000), 3000);
    }

    #[test]
    fn default_policy_values() {
        let p = DecisionPolicy::default();
        assert_eq!(p.stock_fraction, 0.04);
        assert_eq!(p.existing_stock_weight, 2);
    }
}
