//! Predicate identity and metadata.
//!
//! `RelSym`/`PredicateMeta` mirror the shape of the teacher's catalog types
//! (`catalog::Catalog`, `recursion::DependencyGraph` node metadata) but are
//! deliberately inert here: this crate never computes a stratum or infers an
//! arity, it only carries what the (external) compiler/stratifier handed it.

use std::fmt;

/// Identifies one relation. Lookups at run time go through index slots
/// (`spec.md` §4.3 "indexes addressed by slot integers"); `RelSym` exists for
/// diagnostics, tracing, and the public result map, never as a lookup key
/// into the interpreter's hot path.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RelSym(pub u32);

impl RelSym {
    pub const fn new(id: u32) -> Self {
        RelSym(id)
    }
}

impl fmt::Display for RelSym {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rel#{}", self.0)
    }
}

/// Relational or latticenal flavor of a predicate (`spec.md` §3).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DenotationKind {
    Relational,
    Latticenal,
}

/// Externally-supplied per-predicate metadata. The stratifier (out of scope,
/// `spec.md` §1) is assumed to have already produced the `stratum` ordering;
/// the driver only respects it by the order in which the caller sequences
/// `Until` blocks inside `Seq` — it is never recomputed here.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PredicateMeta {
    pub sym: RelSym,
    pub name: String,
    /// Physical tuple length: the number of non-lattice key columns actually
    /// stored in this predicate's index (`spec.md` GLOSSARY "Arity"), plus
    /// two if the program carries provenance columns (`spec.md` §4.8) —
    /// from the tuple store's point of view those are ordinary key columns,
    /// not something layered outside it. Matches `IndexDescriptor::arity`
    /// for the index `solve` reads this predicate back from.
    pub arity: usize,
    pub denotation: DenotationKind,
    pub stratum: u32,
}

impl PredicateMeta {
    pub fn new(sym: RelSym, name: impl Into<String>, arity: usize, denotation: DenotationKind, stratum: u32) -> Self {
        PredicateMeta {
            sym,
            name: name.into(),
            arity,
            denotation,
            stratum,
        }
    }
}
