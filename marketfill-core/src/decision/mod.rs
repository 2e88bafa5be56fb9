//! Stock decision engine: target stock, competitor discount, buy/build
//! quantities and source station selection.

pub mod engine;
pub mod sizing;

pub use engine::{
    DecisionEngine, DecisionError, DecisionInput, DecisionPolicy, OwnOrder, Recommendation,
};
pub use sizing::{OrderSizeRule, OrderSizeRules, RuleError};
