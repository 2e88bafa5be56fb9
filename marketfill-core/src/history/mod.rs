//! Daily price history: per-station best prices and the on-disk store.

pub mod record;
pub mod store;

pub use record::{PriceHistory, PriceRecord};
pub use store::{HistoryError, ParquetPriceStore, PartitionManifest, PartitionStatus};
