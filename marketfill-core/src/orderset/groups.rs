//! Grouping enforcement and the `(station, type)` group adapter.

use std::collections::HashSet;

use super::stream::OrdersetError;
use crate::domain::{Order, StationId, TypeId};

/// Rejects records whose station or item group was already closed.
///
/// A station closes when the stream moves to a different station. Within
/// a station, an item group closes when the stream moves to a different type.
#[derive(Debug, Default)]
pub struct GroupingGuard {
    current: Option<(StationId, TypeId)>,
    closed_stations: HashSet<StationId>,
    closed_types: HashSet<TypeId>,
}

impl GroupingGuard {
    pub fn observe(&mut self, order: &Order, line: u64) -> Result<(), OrdersetError> {
        let station = order.station_id;
        let type_id = order.type_id;
        let violation = || OrdersetError::Grouping {
            line,
            station,
            type_id,
        };

        match self.current {
            None => {}
            Some((s, t)) if s == station => {
                if t != type_id {
                    if self.closed_types.contains(&type_id) {
                        return Err(violation());
                    }
                    self.closed_types.insert(t);
                }
            }
            Some((s, _)) => {
                if self.closed_stations.contains(&station) {
                    return Err(violation());
                }
                self.closed_stations.insert(s);
                self.closed_types.clear();
            }
        }
        self.current = Some((station, type_id));
        Ok(())
    }
}

/// All orders for one item at one station.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderGroup {
    pub station_id: StationId,
    pub type_id: TypeId,
    pub orders: Vec<Order>,
}

impl OrderGroup {
    fn start(order: Order) -> Self {
        Self {
            station_id: order.station_id,
            type_id: order.type_id,
            orders: vec![order],
        }
    }

    /// Highest buy price in the group.
    pub fn best_buy(&self) -> Option<f64> {
        self.orders
            .iter()
            .filter(|o| o.is_buy)
            .map(|o| o.price)
            .fold(None, |acc, p| Some(acc.map_or(p, |a: f64| a.max(p))))
    }

    /// Lowest sell price in the group.
    pub fn best_sell(&self) -> Option<f64> {
        self.orders
            .iter()
            .filter(|o| !o.is_buy)
            .map(|o| o.price)
            .fold(None, |acc, p| Some(acc.map_or(p, |a: f64| a.min(p))))
    }
}

/// Collapses an order stream into consecutive `(station, type)` groups.
///
/// The terminator closes the last group and is not emitted.
pub struct OrderGroups<I> {
    inner: I,
    pending: Option<OrderGroup>,
    done: bool,
}

impl<I> OrderGroups<I>
where
    I: Iterator<Item = Result<Order, OrdersetError>>,
{
    pub fn new(inner: I) -> Self {
        Self {
            inner,
            pending: None,
            done: false,
        }
    }
}

impl<I> Iterator for OrderGroups<I>
where
    I: Iterator<Item = Result<Order, OrdersetError>>,
{
    type Item = Result<OrderGroup, OrdersetError>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.done {
            let order = match self.inner.next() {
                None => {
                    self.done = true;
                    break;
                }
                Some(Err(e)) => {
                    self.done = true;
                    self.pending = None;
                    return Some(Err(e));
                }
                Some(Ok(order)) => order,
            };
            if order.is_terminator() {
                self.done = true;
                break;
            }
            let same_group = self
                .pending
                .as_ref()
                .is_some_and(|g| g.station_id == order.station_id && g.type_id == order.type_id);
            if same_group {
                if let Some(group) = self.pending.as_mut() {
                    group.orders.push(order);
                }
            } else if let Some(prev) = self.pending.replace(OrderGroup::start(order)) {
                return Some(Ok(prev));
            }
        }
        self.pending.take().map(Ok)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order(station: i64, type_id: i64, is_buy: bool, price: f64) -> Order {
        Order {
            type_id: TypeId(type_id),
            station_id: StationId(station),
            is_buy,
            price,
            volume: 1,
            date: None,
        }
    }

    #[test]
    fn guard_accepts_well_grouped_stream() {
        let mut guard = GroupingGuard::default();
        for (i, o) in [
            order(1, 10, false, 1.0),
            order(1, 10, true, 1.0),
            order(1, 11, false, 1.0),
            order(2, 10, false, 1.0),
        ]
        .iter()
        .enumerate()
        {
            guard.observe(o, i as u64 + 1).unwrap();
        }
    }

    #[test]
    fn guard_rejects_reopened_item_group() {
        let mut guard = GroupingGuard::default();
        guard.observe(&order(1, 10, false, 1.0), 1).unwrap();
        guard.observe(&order(1, 11, false, 1.0), 2).unwrap();
        let err = guard.observe(&order(1, 10, false, 1.0), 3).unwrap_err();
        assert!(matches!(err, OrdersetError::Grouping { line: 3, .. }));
    }

    #[test]
    fn guard_allows_same_type_at_new_station() {
        let mut guard = GroupingGuard::default();
        guard.observe(&order(1, 10, false, 1.0), 1).unwrap();
        guard.observe(&order(1, 11, false, 1.0), 2).unwrap();
        guard.observe(&order(2, 10, false, 1.0), 3).unwrap();
        guard.observe(&order(2, 11, false, 1.0), 4).unwrap();
    }

    #[test]
    fn groups_split_on_station_and_type() {
        let orders = vec![
            order(1, 10, false, 5.0),
            order(1, 10, true, 4.0),
            order(1, 10, false, 3.0),
            order(1, 11, true, 2.0),
            order(2, 10, false, 9.0),
            Order::terminator(),
        ];
        let groups: Vec<_> = OrderGroups::new(orders.into_iter().map(Ok))
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(groups.len(), 3);
        assert_eq!(groups[0].orders.len(), 3);
        assert_eq!(groups[0].best_sell(), Some(3.0));
        assert_eq!(groups[0].best_buy(), Some(4.0));
        assert_eq!(groups[1].best_sell(), None);
        assert_eq!(groups[2].station_id, StationId(2));
    }

    #[test]
    fn groups_flush_without_terminator() {
        let orders = vec![order(1, 10, false, 5.0)];
        let groups: Vec<_> = OrderGroups::new(orders.into_iter().map(Ok)).collect();
        assert_eq!(groups.len(), 1);
    }
}
