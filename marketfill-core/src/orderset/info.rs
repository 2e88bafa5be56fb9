//! Per-pass orderset identity and capture date.

use std::path::Path;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::stream::{OrdersetError, OrdersetStream};
use crate::domain::{BatchId, Order};

/// Identity and capture time of one orderset pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OrdersetInfo {
    /// `None` when every record was untagged.
    pub orderset: Option<BatchId>,
    /// Latest issue date seen; `None` when no record carried a date.
    pub date: Option<NaiveDateTime>,
}

/// Accumulates [`OrdersetInfo`] over a single pass.
///
/// Each accumulator belongs to exactly one pass. Untagged records (batch 0)
/// pass without changing the established id.
#[derive(Debug, Default)]
pub struct OrdersetInfoAccumulator {
    info: OrdersetInfo,
    seen: u64,
}

impl OrdersetInfoAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, order: &Order, batch: BatchId) -> Result<(), OrdersetError> {
        self.seen += 1;
        match self.info.orderset {
            Some(established) if batch.is_tagged() && batch != established => {
                return Err(OrdersetError::BatchMismatch {
                    record: self.seen,
                    established,
                    found: batch,
                });
            }
            None if batch.is_tagged() => self.info.orderset = Some(batch),
            _ => {}
        }
        if let Some(date) = order.date {
            self.info.date = Some(self.info.date.map_or(date, |d| d.max(date)));
        }
        Ok(())
    }

    /// Current state without consuming the accumulator.
    pub fn info(&self) -> OrdersetInfo {
        self.info
    }

    pub fn finalize(self) -> OrdersetInfo {
        self.info
    }
}

/// Feeds every pair through an accumulator and yields the bare orders.
pub struct OrdersetFilter<I> {
    inner: I,
    acc: OrdersetInfoAccumulator,
}

impl<I> OrdersetFilter<I>
where
    I: Iterator<Item = Result<(Order, BatchId), OrdersetError>>,
{
    pub fn new(inner: I) -> Self {
        Self {
            inner,
            acc: OrdersetInfoAccumulator::new(),
        }
    }

    /// Info accumulated so far.
    pub fn finish(self) -> OrdersetInfo {
        self.acc.finalize()
    }
}

impl<I> Iterator for OrdersetFilter<I>
where
    I: Iterator<Item = Result<(Order, BatchId), OrdersetError>>,
{
    type Item = Result<Order, OrdersetError>;

    fn next(&mut self) -> Option<Self::Item> {
        let (order, batch) = match self.inner.next()? {
            Ok(pair) => pair,
            Err(e) => return Some(Err(e)),
        };
        Some(self.acc.observe(&order, batch).map(|()| order))
    }
}

/// Run a full info pass over an orderset file.
pub fn read_orderset_info(path: &Path) -> Result<OrdersetInfo, OrdersetError> {
    let mut filter = OrdersetFilter::new(OrdersetStream::open(path)?);
    for order in filter.by_ref() {
        order?;
    }
    Ok(filter.finish())
}
