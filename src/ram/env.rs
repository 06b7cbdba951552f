//! Per-evaluation-thread search environment: four parallel arrays indexed
//! by row variable (`spec.md` §3 "Search environment"). Thread-local by
//! construction — cloned whenever a `Par`/parallel `Search` spawns a worker
//! (`spec.md` §4.7, §9 "Per-task environment cloning").

use crate::boxing::{MAX_SENTINEL, MIN_SENTINEL};
use crate::error::{RamError, RamResult};
use crate::ram::ast::RowVar;
use crate::value::{tuple_of, Boxed, Tuple};

/// Four parallel arrays, one slot per row variable:
/// 1. min tuple — lower search bound for range queries.
/// 2. max tuple — upper search bound.
/// 3. current tuple — most recently bound tuple.
/// 4. current lattice value — latticenal searches only.
#[derive(Clone)]
pub struct SearchEnvironment {
    min: Vec<Tuple>,
    max: Vec<Tuple>,
    current: Vec<Tuple>,
    current_lat: Vec<Option<Boxed>>,
}

impl SearchEnvironment {
    /// `arities[r]` is the arity of whatever index row variable `r` is ever
    /// bound against — the compiler is assumed to assign one consistent
    /// arity per row variable.
    pub fn new(arities: &[usize]) -> Self {
        let min = arities.iter().map(|&a| tuple_of(vec![MIN_SENTINEL; a])).collect();
        let max = arities.iter().map(|&a| tuple_of(vec![MAX_SENTINEL; a])).collect();
        let current = arities.iter().map(|&a| tuple_of(vec![0i64; a])).collect();
        let current_lat = vec![None; arities.len()];
        SearchEnvironment { min, max, current, current_lat }
    }

    /// An undefined row variable is a `MalformedProgram` (`spec.md` §7: "a
    /// RAM node refers to ... an undefined row variable"), the same taxonomy
    /// entry `IndexesTable::slot` and `LoadFromTuple`'s column check already
    /// cover — fatal, never a panic.
    fn undefined_row(row: RowVar) -> RamError {
        RamError::MalformedProgram(format!("undefined row variable {row}"))
    }

    pub fn min(&self, row: RowVar) -> RamResult<&Tuple> {
        self.min.get(row).ok_or_else(|| Self::undefined_row(row))
    }

    pub fn max(&self, row: RowVar) -> RamResult<&Tuple> {
        self.max.get(row).ok_or_else(|| Self::undefined_row(row))
    }

    pub fn current(&self, row: RowVar) -> RamResult<&Tuple> {
        self.current.get(row).ok_or_else(|| Self::undefined_row(row))
    }

    pub fn current_lat(&self, row: RowVar) -> RamResult<Option<&Boxed>> {
        self.current_lat.get(row).map(Option::as_ref).ok_or_else(|| Self::undefined_row(row))
    }

    pub fn set_current(&mut self, row: RowVar, tuple: Tuple) -> RamResult<()> {
        *self.current.get_mut(row).ok_or_else(|| Self::undefined_row(row))? = tuple;
        Ok(())
    }

    pub fn set_current_lat(&mut self, row: RowVar, value: Option<Boxed>) -> RamResult<()> {
        *self.current_lat.get_mut(row).ok_or_else(|| Self::undefined_row(row))? = value;
        Ok(())
    }

    /// Reset `row`'s min/max bounds to the reserved sentinels
    /// (`spec.md` §4.5 "Range bounds are refreshed to the reserved
    /// min/max-64-bit sentinels at initialization").
    pub fn reset_bounds(&mut self, row: RowVar, arity: usize) -> RamResult<()> {
        *self.min.get_mut(row).ok_or_else(|| Self::undefined_row(row))? = tuple_of(vec![MIN_SENTINEL; arity]);
        *self.max.get_mut(row).ok_or_else(|| Self::undefined_row(row))? = tuple_of(vec![MAX_SENTINEL; arity]);
        Ok(())
    }

    /// Apply one `writes` triple: propagate `t[source_column]` into both
    /// the min and max tuple of `dest_row` at `dest_column`.
    pub fn narrow(&mut self, dest_row: RowVar, dest_column: usize, value: i64) -> RamResult<()> {
        let mut min = self.min.get(dest_row).ok_or_else(|| Self::undefined_row(dest_row))?.to_vec();
        let mut max = self.max.get(dest_row).ok_or_else(|| Self::undefined_row(dest_row))?.to_vec();
        min[dest_column] = value;
        max[dest_column] = value;
        self.min[dest_row] = tuple_of(min);
        self.max[dest_row] = tuple_of(max);
        Ok(())
    }
}
