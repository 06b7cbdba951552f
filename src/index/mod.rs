//! Indexes table: a flat array of indexes addressed by slot integer
//! (`spec.md` §3 "Indexes table", §9 "Indexes addressed by slot integers").

pub mod store;

pub use store::{Index, IndexValue, SearchKey};

use crate::error::{RamError, RamResult};
use arc_swap::ArcSwap;
use std::sync::Arc;

/// A small integer identifying one concrete index in the global table. The
/// RAM program refers to relations exclusively by slot, never by name, at
/// run time.
pub type IndexSlot = usize;

/// The flat, index-by-integer table built once when a program's indexes are
/// allocated. Each slot is an `ArcSwap<Index>`: the same lock-free
/// publish/read pattern the teacher uses for its `KnowledgeGraphSnapshot`
/// (`storage_engine::snapshot`) — readers (`with_index`, every `Search`,
/// `Query`, `Project`, ...) load the current `Arc<Index>` without ever
/// blocking on a lock, and `Swap`/`Purge` publish a new one atomically
/// (`spec.md` §3 "Indexes table", §9 "lock-free for lookup"). `Index`'s own
/// interior `RwLock<BTreeMap<..>>` (`index::store`) still guards concurrent
/// `put`/`put_with` against the one `Index` value a slot currently points
/// to; `ArcSwap` only ever replaces *which* `Index` a slot points to.
pub struct IndexesTable {
    slots: Vec<ArcSwap<Index>>,
}

impl IndexesTable {
    pub fn new(slots: Vec<Index>) -> Self {
        IndexesTable {
            slots: slots.into_iter().map(|idx| ArcSwap::new(Arc::new(idx))).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    fn slot(&self, slot: IndexSlot) -> RamResult<&ArcSwap<Index>> {
        self.slots
            .get(slot)
            .ok_or_else(|| RamError::MalformedProgram(format!("index slot {slot} out of range")))
    }

    /// Run `f` against the index currently published at `slot`. Lock-free:
    /// `ArcSwap::load` never blocks on a writer publishing a new index via
    /// `swap`/`purge`.
    pub fn with_index<T>(&self, slot: IndexSlot, f: impl FnOnce(&Index) -> T) -> RamResult<T> {
        Ok(f(&self.slot(slot)?.load()))
    }

    /// `Statement::Swap(i, j)`: exchange two index slots. Two atomic
    /// pointer publishes, one per slot; enables delta/new rotation
    /// (`spec.md` §4.6).
    pub fn swap(&self, i: IndexSlot, j: IndexSlot) -> RamResult<()> {
        if i == j {
            self.slot(i)?;
            return Ok(());
        }
        let a = self.slot(i)?;
        let b = self.slot(j)?;
        let old_a = a.load_full();
        let old_b = b.load_full();
        a.store(old_b);
        b.store(old_a);
        Ok(())
    }

    /// `Statement::Purge(i)`: publish a fresh empty index of the same arity
    /// and search key (`spec.md` §4.6).
    pub fn purge(&self, slot: IndexSlot) -> RamResult<()> {
        let cell = self.slot(slot)?;
        let fresh = cell.load().fresh_like();
        cell.store(Arc::new(fresh));
        Ok(())
    }

    /// `Statement::MergeInto(src, dst, _)`.
    pub fn merge_into(&self, src: IndexSlot, dst: IndexSlot) -> RamResult<()> {
        let src_guard = self.slot(src)?.load();
        let dst_guard = self.slot(dst)?.load();
        dst_guard.merge_from(&src_guard)
    }
}
