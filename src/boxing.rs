//! # Boxing Substrate
//!
//! A process-wide bijection between heterogeneous `Boxed` values and
//! compact 64-bit integer keys, so tuples can be stored as fixed-width
//! integer vectors (`spec.md` §4.2). Sharded per `Position` the way the
//! teacher shards storage state per relation (`hash_index::HashIndexManager`
//! keys its indexes by `JoinKeySpec` rather than locking one global table),
//! so unrelated columns never contend.

use crate::error::{RamError, RamResult};
use crate::value::Boxed;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

/// Reserved sentinel for an open-ended lower range bound. The boxing
/// substrate never assigns this as a real key (`spec.md` §4.2).
pub const MIN_SENTINEL: i64 = i64::MIN;
/// Reserved sentinel for an open-ended upper range bound.
pub const MAX_SENTINEL: i64 = i64::MAX;

/// A compile-time-enumerated discriminator for one column of one relation.
/// Two values boxed at different positions never alias, even if they
/// compare equal as `Boxed` (`spec.md` §3 "Boxing map").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Position {
    pub relation: u32,
    pub column: u16,
}

impl Position {
    pub const fn new(relation: u32, column: u16) -> Self {
        Position { relation, column }
    }
}

struct PositionTable {
    forward: DashMap<Boxed, i64>,
    backward: DashMap<i64, Boxed>,
    next_key: AtomicI64,
}

impl PositionTable {
    fn new() -> Self {
        PositionTable {
            forward: DashMap::new(),
            backward: DashMap::new(),
            // Start well clear of the sentinel extremes; a 64-bit counter
            // incrementing by one per distinct value never approaches
            // i64::MAX in practice, so the sentinels stay reserved for the
            // lifetime of any realistic solve (spec.md §4.2).
            next_key: AtomicI64::new(0),
        }
    }
}

/// The process-wide bijection. Cheap to clone (an `Arc` around sharded
/// maps) so it can be "shared across successive solves" per `spec.md` §6.
#[derive(Clone, Default)]
pub struct Boxing {
    tables: Arc<DashMap<Position, Arc<PositionTable>>>,
}

impl Boxing {
    pub fn new() -> Self {
        Boxing::default()
    }

    fn table_for(&self, position: Position) -> Arc<PositionTable> {
        self.tables
            .entry(position)
            .or_insert_with(|| Arc::new(PositionTable::new()))
            .clone()
    }

    /// Given an integer key and a position discriminator, return the
    /// original boxed value. Fails with `UnknownBoxingKey` if the key was
    /// never produced by `unbox_with` at that position.
    pub fn box_with(&self, key: i64, position: Position) -> RamResult<Boxed> {
        let table = self.table_for(position);
        table
            .backward
            .get(&key)
            .map(|entry| entry.value().clone())
            .ok_or(RamError::UnknownBoxingKey { key, position })
    }

    /// Return the key for `value` at `position`, assigning a fresh one on
    /// first sight. Safe to call concurrently: key assignment for a given
    /// value is atomic, so two threads observing the same value at the
    /// same time converge on one key (`spec.md` §4.2 "Thread safety").
    pub fn unbox_with(&self, value: Boxed, position: Position) -> i64 {
        let table = self.table_for(position);

        match table.forward.entry(value.clone()) {
            Entry::Occupied(existing) => *existing.get(),
            Entry::Vacant(vacant) => {
                let key = table.next_key.fetch_add(1, Ordering::Relaxed);
                vacant.insert(key);
                table.backward.insert(key, value);
                key
            }
        }
    }

    /// Number of distinct values interned at `position`. Exposed for
    /// diagnostics and tests, not part of the core contract.
    pub fn len_at(&self, position: Position) -> usize {
        self.tables
            .get(&position)
            .map(|t| t.forward.len())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const P0: Position = Position::new(1, 0);
    const P1: Position = Position::new(1, 1);

    #[test]
    fn round_trip() {
        let boxing = Boxing::new();
        let key = boxing.unbox_with(Boxed::from(42i64), P0);
        assert_eq!(boxing.box_with(key, P0).unwrap(), Boxed::from(42i64));
    }

    #[test]
    fn same_value_same_key_within_a_position() {
        let boxing = Boxing::new();
        let k1 = boxing.unbox_with(Boxed::from("hello"), P0);
        let k2 = boxing.unbox_with(Boxed::from("hello"), P0);
        assert_eq!(k1, k2);
    }

    #[test]
    fn positions_are_independent() {
        let boxing = Boxing::new();
        let k0 = boxing.unbox_with(Boxed::from(7i64), P0);
        let k1 = boxing.unbox_with(Boxed::from(7i64), P1);
        // Both happen to be the first value interned at their position, so
        // the keys collide numerically, but boxing back at the wrong
        // position must not silently succeed with the other position's
        // value identity conflated — each position keeps its own table.
        assert_eq!(boxing.box_with(k0, P0).unwrap(), Boxed::from(7i64));
        assert_eq!(boxing.box_with(k1, P1).unwrap(), Boxed::from(7i64));
    }

    #[test]
    fn unknown_key_is_an_error() {
        let boxing = Boxing::new();
        assert!(matches!(
            boxing.box_with(999, P0),
            Err(RamError::UnknownBoxingKey { .. })
        ));
    }

    proptest! {
        /// `spec.md` §8.5 "Boxing round-trip": `boxWith(unboxWith(v, p), p) == v`
        /// for any value and position.
        #[test]
        fn round_trip_holds_for_arbitrary_ints_and_strings(ints in prop::collection::vec(any::<i64>(), 1..32), strs in prop::collection::vec(".*", 1..32)) {
            let boxing = Boxing::new();
            for v in ints {
                let key = boxing.unbox_with(Boxed::Int(v), P0);
                prop_assert_eq!(boxing.box_with(key, P0).unwrap(), Boxed::Int(v));
            }
            for v in strs {
                let value = Boxed::from(v.as_str());
                let key = boxing.unbox_with(value.clone(), P1);
                prop_assert_eq!(boxing.box_with(key, P1).unwrap(), value);
            }
        }

        /// `spec.md` §8.5: `unboxWith(v1, p) == unboxWith(v2, p) <=> v1 == v2`.
        #[test]
        fn distinct_values_get_distinct_keys(values in prop::collection::hash_set(any::<i64>(), 1..64)) {
            let boxing = Boxing::new();
            let keys: Vec<i64> = values.iter().map(|&v| boxing.unbox_with(Boxed::Int(v), P0)).collect();
            let mut sorted = keys.clone();
            sorted.sort_unstable();
            sorted.dedup();
            prop_assert_eq!(sorted.len(), keys.len());

            // Re-unboxing any already-seen value returns the same key.
            for &v in &values {
                let key = boxing.unbox_with(Boxed::Int(v), P0);
                prop_assert!(keys.contains(&key));
            }
        }
    }

    #[test]
    fn concurrent_unbox_of_same_value_converges_on_one_key() {
        use std::sync::Barrier;
        let boxing = Boxing::new();
        let barrier = Arc::new(Barrier::new(8));
        let keys: Vec<i64> = std::thread::scope(|scope| {
            (0..8)
                .map(|_| {
                    let boxing = boxing.clone();
                    let barrier = barrier.clone();
                    scope.spawn(move || {
                        barrier.wait();
                        boxing.unbox_with(Boxed::from("shared"), P0)
                    })
                })
                .collect::<Vec<_>>()
                .into_iter()
                .map(|h| h.join().unwrap())
                .collect()
        });
        assert!(keys.windows(2).all(|w| w[0] == w[1]));
    }
}
