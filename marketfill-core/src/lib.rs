//! Market filler core: orderset streaming, price history, fair prices,
//! stock aggregation and the stock decision engine.
//!
//! This crate contains everything that does algorithmic work:
//! - Domain types (orders, items, price models, decision notes)
//! - Gzip orderset stream with grouping enforcement and per-pass info
//! - Daily price history in Parquet and the trailing-window fair price
//! - Single-pass stock aggregation per item and station
//! - The staged stock decision heuristic and min order size rules
//! - Basket and reference tables, and the build cost resolver

pub mod basket;
pub mod decision;
pub mod domain;
pub mod history;
pub mod industry;
pub mod orderset;
pub mod pricing;
pub mod reference;
pub mod stock;
