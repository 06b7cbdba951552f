//! The RAM program representation: a nested tagged-variant tree
//! (`spec.md` §4.3). Row variables and index slots are dense integers
//! assigned at compile time by the (external) lowering pass; this crate
//! only consumes them.

use crate::boxing::Position;
use crate::index::IndexSlot;
use crate::lattice::LatticeOps;
use crate::value::Boxed;
use std::fmt;
use std::sync::Arc;

/// A named binding produced by `Search`, `Query`, or `Functional` and
/// consumed by inner operators. Dense integer index into a
/// `SearchEnvironment`.
pub type RowVar = usize;

/// `App1..App5` collapse into one arity-generic variant: the function
/// receives its bound argument values as a slice rather than as five fixed
/// positional parameters. The arity distinction in `spec.md` exists to avoid
/// heap-allocating an argument vector per call in the source language; in
/// Rust, a `Vec<Boxed>` reused from a small stack buffer is the idiomatic
/// equivalent and it keeps one variant instead of five near-identical ones.
/// User functions return a plain `String` error message rather than a
/// `RamError`: the caller supplying the closure has no business knowing
/// this crate's error enum, and the interpreter wraps the message into
/// `RamError::UserFunctionFailure` (naming the function) at the call site.
pub type AppFn = Arc<dyn Fn(&[Boxed]) -> Result<Boxed, String> + Send + Sync>;
/// `Guard1..Guard5` collapse the same way; a guard returns a boolean rather
/// than a boxed value.
pub type GuardFn = Arc<dyn Fn(&[Boxed]) -> Result<bool, String> + Send + Sync>;
/// The callable behind `RelOp::Functional`: given the bound argument values,
/// produce zero or more result tuples (already boxed, one `Boxed` per
/// column).
pub type FunctionalFn = Arc<dyn Fn(&[Boxed]) -> Result<Vec<Vec<Boxed>>, String> + Send + Sync>;

/// A named function reference, carried alongside its callable so
/// `UserFunctionFailure` errors can name the offending function
/// (`spec.md` §7).
#[derive(Clone)]
pub struct NamedFn<F> {
    pub name: Arc<str>,
    pub f: F,
}

impl<F> NamedFn<F> {
    pub fn new(name: impl Into<Arc<str>>, f: F) -> Self {
        NamedFn { name: name.into(), f }
    }
}

impl<F> fmt::Debug for NamedFn<F> {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmt, "NamedFn({})", self.name)
    }
}

/// A term: `Lit | LoadFromTuple | LoadLatVar | Meet | App` (`spec.md` §4.3,
/// §4.4).
#[derive(Clone, Debug)]
pub enum RamTerm {
    /// A precomputed key, paired with its boxed value for diagnostics and
    /// for `evalBoxedTerm`.
    Lit(i64, Boxed),
    /// Read column `column` of the current tuple bound to `row`. `position`
    /// identifies the boxing sub-table that column's keys were interned
    /// into, for callers that need `evalBoxedTerm` rather than the raw key.
    LoadFromTuple {
        row: RowVar,
        column: usize,
        position: Position,
    },
    /// Read the current lattice value bound to `row`, unboxed via
    /// `position`.
    LoadLatVar { row: RowVar, position: Position },
    /// Evaluate both sides as boxed values, take the lattice `glb`, rebox at
    /// `position`.
    Meet {
        lattice: LatticeOps,
        lhs: Box<RamTerm>,
        rhs: Box<RamTerm>,
        position: Position,
    },
    /// Evaluate `args` to boxed values, apply `function`, rebox the result
    /// at `position`.
    App {
        function: NamedFn<AppFn>,
        args: Vec<RamTerm>,
        position: Position,
    },
}

/// A boolean expression (`spec.md` §4.3, §4.4). Evaluation short-circuits
/// left-to-right; the compiler is expected to emit side-effect-free guards
/// (`spec.md` §9 Open Questions — resolved: do not rely on evaluation
/// order for anything but short-circuiting cost).
#[derive(Clone, Debug)]
pub enum BoolExp {
    Not(Box<BoolExp>),
    IsEmpty(IndexSlot),
    /// Relational: point membership test. Latticenal: true iff the proposed
    /// lattice value would strictly grow the value already stored for that
    /// tuple (`lattice.would_grow`, `spec.md` §4.4).
    NotMemberOf {
        terms: Vec<RamTerm>,
        index: IndexSlot,
        lattice: Option<LatticeOps>,
    },
    Eq(RamTerm, RamTerm),
    /// `bound <= current lattice value of row` under `lattice`'s order.
    Leq {
        bound: RamTerm,
        row: RowVar,
        lattice: LatticeOps,
    },
    Guard {
        function: NamedFn<GuardFn>,
        args: Vec<RamTerm>,
    },
}

/// One column-propagation triple: `t[source_column]` is written into both
/// the min and max tuple of `dest_row` at `dest_column`, narrowing a later
/// `Query` (`spec.md` §4.3 "writes").
#[derive(Clone, Copy, Debug)]
pub struct Write {
    pub source_column: usize,
    pub dest_row: RowVar,
    pub dest_column: usize,
}

/// A relational operator (`spec.md` §4.3, §4.5).
#[derive(Clone, Debug)]
pub enum RelOp {
    /// Iterate the full index bound to `row`.
    Search {
        row: RowVar,
        index: IndexSlot,
        /// If set, the row variable whose current lattice value this
        /// search's tuple value is met with (`spec.md` §4.5 step 3).
        meet_with: Option<RowVar>,
        lattice: Option<LatticeOps>,
        writes: Vec<Write>,
        body: Box<RelOp>,
    },
    /// Iterate a range bounded by the current search environment's min/max
    /// for `row`.
    Query {
        row: RowVar,
        index: IndexSlot,
        meet_with: Option<RowVar>,
        lattice: Option<LatticeOps>,
        writes: Vec<Write>,
        body: Box<RelOp>,
    },
    /// Execute `body` iff every expression in `tests` holds.
    If { tests: Vec<BoolExp>, body: Box<RelOp> },
    /// Evaluate `terms` into a tuple (and, for lattices, a lattice value)
    /// and insert into `index`.
    Project {
        terms: Vec<RamTerm>,
        index: IndexSlot,
        lattice: Option<LatticeOps>,
    },
    /// Call `function(args)`, bind each result tuple to `row` in turn, and
    /// recurse into `body`.
    Functional {
        row: RowVar,
        function: NamedFn<FunctionalFn>,
        args: Vec<RamTerm>,
        /// Boxing position for each output column, used to unbox the
        /// function's result tuples into the dense key space.
        result_positions: Vec<Position>,
        writes: Vec<Write>,
        body: Box<RelOp>,
    },
}

/// A top-level statement (`spec.md` §4.3, §4.6).
#[derive(Clone, Debug)]
pub enum Statement {
    Insert(RelOp),
    MergeInto { src: IndexSlot, dst: IndexSlot },
    Swap(IndexSlot, IndexSlot),
    Purge(IndexSlot),
    Seq(Vec<Statement>),
    /// If every test in `tests` holds, stop; otherwise run `body` and
    /// retry. The test is `IsEmpty(new)` for each recursive predicate in the
    /// stratum (`spec.md` §4.6). `stratum` is a diagnostic label only (which
    /// stratum this fixed-point loop belongs to, for `FixpointNotReached`
    /// errors when `EngineConfig::max_iterations` is set) — it plays no role
    /// in the classical semantics `spec.md` specifies.
    Until {
        tests: Vec<BoolExp>,
        body: Box<Statement>,
        stratum: u32,
    },
    /// Spawn sibling statements concurrently, join before returning.
    Par(Vec<Statement>),
    Comment(String),
}
