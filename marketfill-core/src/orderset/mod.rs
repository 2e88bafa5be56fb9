//! Orderset snapshots: streaming decode, grouping enforcement, and the
//! per-pass info accumulator.
//!
//! An orderset file is a gzip-compressed, tab-separated dump of every open
//! order at capture time. Records arrive grouped by station, then by item.
//! The stream appends one synthetic terminator record so consumers can close
//! their last group without special-casing end of stream.

pub mod groups;
pub mod info;
pub mod stream;

pub use groups::{GroupingGuard, OrderGroup, OrderGroups};
pub use info::{read_orderset_info, OrdersetFilter, OrdersetInfo, OrdersetInfoAccumulator};
pub use stream::{decode_record, OrdersetError, OrdersetStream, ORDERSET_FIELDS};
