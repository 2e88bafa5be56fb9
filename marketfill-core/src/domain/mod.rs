//! Domain types for the market filler

pub mod ids;
pub mod item;
pub mod note;
pub mod order;

pub use ids::{BatchId, StationId, TypeId};
pub use item::{ItemModel, ItemSummary, ModelPrices};
pub use note::Note;
pub use order::Order;
