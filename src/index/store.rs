//! The indexed tuple store: a concurrent ordered map from tuple to lattice
//! value, parameterized by a search-key permutation (`spec.md` §4.1).
//!
//! Concrete realization (`SPEC_FULL.md` §4.1): a `BTreeMap` guarded by
//! `parking_lot::RwLock`, the same lock the teacher reaches for around its
//! `Database` state (`storage_engine::StorageEngine` uses `Arc<RwLock<_>>`
//! throughout). A B+-tree proper is the textbook structure this emulates;
//! `BTreeMap`'s ordered range API gives the same scan shape without hand
//! writing node splitting.

use crate::error::{RamError, RamResult};
use crate::lattice::LatticeOps;
use crate::relation::DenotationKind;
use crate::value::{Boxed, Tuple};
use parking_lot::RwLock;
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Permutation of column positions defining an index's sort order
/// (`spec.md` §3 "Search key"). `key[i]` is the natural column consulted at
/// comparison depth `i`.
pub type SearchKey = Arc<[usize]>;

/// The paired value stored alongside a tuple: nothing, for relational
/// predicates, or a boxed lattice value for latticenal ones.
#[derive(Clone, Debug)]
pub enum IndexValue {
    Unit,
    Lat(Boxed),
}

impl IndexValue {
    pub fn as_lat(&self) -> Option<&Boxed> {
        match self {
            IndexValue::Lat(v) => Some(v),
            IndexValue::Unit => None,
        }
    }
}

/// A tuple ordered under a particular `SearchKey`. Every `PermutedTuple`
/// compared against another must share the same `key` Arc (always true
/// within one `Index`), so `Ord` is self-consistent without external
/// context.
#[derive(Clone)]
struct PermutedTuple {
    tuple: Tuple,
    key: SearchKey,
}

impl PermutedTuple {
    fn permuted(&self) -> impl Iterator<Item = i64> + '_ {
        self.key.iter().map(move |&c| self.tuple[c])
    }
}

impl PartialEq for PermutedTuple {
    fn eq(&self, other: &Self) -> bool {
        self.tuple == other.tuple
    }
}
impl Eq for PermutedTuple {}

impl PartialOrd for PermutedTuple {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PermutedTuple {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.permuted().cmp(other.permuted())
    }
}

/// One concrete index: a search key, an arity, a denotation, and the
/// ordered map itself.
pub struct Index {
    search_key: SearchKey,
    arity: usize,
    lattice: Option<LatticeOps>,
    map: RwLock<BTreeMap<PermutedTuple, IndexValue>>,
}

impl Index {
    pub fn new_relational(arity: usize, search_key: impl Into<SearchKey>) -> Self {
        Index {
            search_key: search_key.into(),
            arity,
            lattice: None,
            map: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn new_latticenal(arity: usize, search_key: impl Into<SearchKey>, lattice: LatticeOps) -> Self {
        Index {
            search_key: search_key.into(),
            arity,
            lattice: Some(lattice),
            map: RwLock::new(BTreeMap::new()),
        }
    }

    /// An empty index with the same shape (arity, search key, denotation) as
    /// `self`. Used by `Statement::Purge`.
    pub fn fresh_like(&self) -> Index {
        Index {
            search_key: self.search_key.clone(),
            arity: self.arity,
            lattice: self.lattice.clone(),
            map: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn arity(&self) -> usize {
        self.arity
    }

    pub fn denotation(&self) -> DenotationKind {
        if self.lattice.is_some() {
            DenotationKind::Latticenal
        } else {
            DenotationKind::Relational
        }
    }

    pub fn lattice(&self) -> Option<&LatticeOps> {
        self.lattice.as_ref()
    }

    pub fn search_key(&self) -> &SearchKey {
        &self.search_key
    }

    fn check_arity(&self, tuple: &Tuple) -> RamResult<()> {
        if tuple.len() != self.arity {
            return Err(RamError::ArityMismatch {
                index: format!("{:?}", self.search_key),
                expected: self.arity,
                actual: tuple.len(),
            });
        }
        Ok(())
    }

    fn keyed(&self, tuple: Tuple) -> PermutedTuple {
        PermutedTuple {
            tuple,
            key: self.search_key.clone(),
        }
    }

    /// Point insertion. For relational indexes only; fails (programming
    /// error, per `spec.md` §4.1 "Failure semantics") on arity mismatch.
    pub fn put(&self, tuple: Tuple) -> RamResult<()> {
        self.check_arity(&tuple)?;
        let mut map = self.map.write();
        map.insert(self.keyed(tuple), IndexValue::Unit);
        Ok(())
    }

    /// Point insertion with a merge function: if the key exists, replace its
    /// value with `merge(existing, new)` (`spec.md` §4.1 "putWith"). Used
    /// for lattice LUB on `Project` and for `MergeInto`.
    pub fn put_with(
        &self,
        tuple: Tuple,
        value: Boxed,
        merge: impl Fn(&Boxed, &Boxed) -> Boxed,
    ) -> RamResult<()> {
        self.check_arity(&tuple)?;
        let key = self.keyed(tuple);
        let mut map = self.map.write();
        match map.get(&key) {
            Some(IndexValue::Lat(existing)) => {
                let merged = merge(existing, &value);
                map.insert(key, IndexValue::Lat(merged));
            }
            _ => {
                map.insert(key, IndexValue::Lat(value));
            }
        }
        Ok(())
    }

    pub fn contains(&self, tuple: &Tuple) -> bool {
        self.map.read().contains_key(&self.keyed(tuple.clone()))
    }

    pub fn get(&self, tuple: &Tuple) -> Option<IndexValue> {
        self.map.read().get(&self.keyed(tuple.clone())).cloned()
    }

    pub fn is_empty(&self) -> bool {
        self.map.read().is_empty()
    }

    pub fn len(&self) -> usize {
        self.map.read().len()
    }

    /// Every entry, in search-key order.
    pub fn scan_all(&self) -> Vec<(Tuple, IndexValue)> {
        self.map
            .read()
            .iter()
            .map(|(k, v)| (k.tuple.clone(), v.clone()))
            .collect()
    }

    /// Entries `t` such that `lo[c] <= t[c] <= hi[c]` for every natural
    /// column `c` (`spec.md` §4.1 "Contracts"). Implemented by first
    /// narrowing to the contiguous range under the search-key permutation
    /// (cheap, uses the tree's ordering), then filtering the (small)
    /// candidate set against the exact per-column bounds — correct
    /// regardless of how many leading search-key columns the caller left
    /// unconstrained.
    pub fn range(&self, lo: &Tuple, hi: &Tuple) -> Vec<(Tuple, IndexValue)> {
        let lo_key = self.keyed(lo.clone());
        let hi_key = self.keyed(hi.clone());
        self.map
            .read()
            .range(lo_key..=hi_key)
            .filter(|(k, _)| within_bounds(&k.tuple, lo, hi))
            .map(|(k, v)| (k.tuple.clone(), v.clone()))
            .collect()
    }

    /// Partition the full scan across the shared rayon pool, visiting each
    /// tuple exactly once (`spec.md` §4.1 "parForEach").
    pub fn par_for_each(&self, f: impl Fn(&Tuple, &IndexValue) + Sync) {
        let entries = self.scan_all();
        entries.par_iter().for_each(|(t, v)| f(t, v));
    }

    /// Merge every entry of `other` into `self`. Relational: plain set
    /// union. Latticenal: union with per-key `lub` (`spec.md` §4.6
    /// "MergeInto").
    pub fn merge_from(&self, other: &Index) -> RamResult<()> {
        for (tuple, value) in other.scan_all() {
            match (&value, &self.lattice) {
                (IndexValue::Unit, _) => self.put(tuple)?,
                (IndexValue::Lat(v), Some(lattice)) => {
                    let lattice = lattice.clone();
                    self.put_with(tuple, v.clone(), move |a, b| lattice.lub(a, b))?;
                }
                (IndexValue::Lat(_), None) => {
                    return Err(RamError::MalformedProgram(
                        "MergeInto: source carries lattice values but destination index is relational".into(),
                    ))
                }
            }
        }
        Ok(())
    }
}

fn within_bounds(t: &Tuple, lo: &Tuple, hi: &Tuple) -> bool {
    t.iter().zip(lo.iter()).zip(hi.iter()).all(|((tc, loc), hic)| loc <= tc && tc <= hic)
}
