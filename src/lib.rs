//! # ramalog — a bottom-up Datalog evaluation engine core
//!
//! This crate is the RAM (Relational Algebra Machine) interpreter at the
//! heart of a larger Datalog toolchain: given a compiled relational-algebra
//! program (nested loops over indexed relations, with projections, guards,
//! and joins) plus a set of initial facts, it computes the least fixed
//! point — the full set of derived facts for every predicate, optionally
//! decorated with lattice values.
//!
//! ## Pipeline position
//!
//! ```text
//! Surface language, parser, type checker       (external collaborator)
//!     ↓
//! Stratification analyzer                      (external collaborator)
//!     ↓
//! RAM program (ram::ast::Statement tree)        ← this crate consumes
//!     ↓
//! [solve] ── indexed tuple store ── boxing substrate ── parallel runtime
//!     ↓
//! Result map (RelSym → tuples, optionally with lattice values)
//! ```
//!
//! ## Module map
//!
//! | Module | Role |
//! |---|---|
//! | `value` | `Boxed`: the heterogeneous value type, and `Tuple`, the fixed-width interned key vector. |
//! | `boxing` | The bijection between `Boxed` values and dense 64-bit keys. |
//! | `lattice` | Join-semilattice capability records (`LatticeOps`) and the two lattices this crate ships. |
//! | `relation` | `RelSym`, `DenotationKind`, `PredicateMeta` — predicate identity and externally-supplied metadata. |
//! | `index` | The indexed tuple store (`index::store::Index`) and the flat slot table (`IndexesTable`). |
//! | `ram` | The RAM AST (`ram::ast`), the per-thread search environment (`ram::env`), the interpreter (`ram::interp`), and `ProgramBuilder`. |
//! | `parallel` | Depth-bounded structured fan-out over the shared rayon pool. |
//! | `config` | `EngineConfig`: par level, provenance, iteration cap, loaded via `figment`. |
//! | `error` | `RamError`/`ConfigError`, this crate's `thiserror` taxonomy. |
//!
//! ## Example: transitive closure
//!
//! ```rust,ignore
//! use ramalog::*;
//!
//! let mut builder = ProgramBuilder::new();
//! // ... allocate rows/slots, assemble a Statement, then:
//! let program = Program { statement, index_descriptors, seed_slots, result_slots, row_arities };
//! let boxing = Boxing::new();
//! let metas = vec![/* PredicateMeta for `edge`, `path` */];
//! let mut facts = InitialFacts::new();
//! facts.insert(edge_sym, vec![InitialFact::relational(vec![Boxed::int(1), Boxed::int(2)])]);
//! let results = solve(&program, &facts, &boxing, &metas, 3, false)?;
//! ```

pub mod boxing;
pub mod config;
pub mod error;
pub mod index;
pub mod lattice;
pub mod parallel;
pub mod ram;
pub mod relation;
pub mod value;

pub use boxing::{Boxing, Position, MAX_SENTINEL, MIN_SENTINEL};
pub use config::EngineConfig;
pub use error::{ConfigError, RamError, RamResult};
pub use index::{Index, IndexSlot, IndexValue, IndexesTable, SearchKey};
pub use lattice::{ConstProp, LatticeOps};
pub use parallel::ParBudget;
pub use ram::{BoolExp, NamedFn, ProgramBuilder, RamTerm, RelOp, RowVar, SearchEnvironment, Statement, Write};
pub use relation::{DenotationKind, PredicateMeta, RelSym};
pub use value::{tuple_of, Boxed, Tuple};

use ram::interp::Interpreter;
use std::collections::HashMap;
use tracing::instrument;

/// A column's worth of facts for one predicate, prior to boxing
/// (`spec.md` §6 "initialFacts"). `lattice_value` is `None` for relational
/// predicates, and for latticenal predicates whose value would be bottom
/// (`spec.md` §3 "the bottom element is never stored").
#[derive(Clone, Debug)]
pub struct InitialFact {
    pub columns: Vec<Boxed>,
    pub lattice_value: Option<Boxed>,
}

impl InitialFact {
    pub fn relational(columns: Vec<Boxed>) -> Self {
        InitialFact { columns, lattice_value: None }
    }

    pub fn latticenal(columns: Vec<Boxed>, value: Boxed) -> Self {
        InitialFact { columns, lattice_value: Some(value) }
    }
}

/// `spec.md` §6 "initialFacts: map from predicate symbol to an initial set
/// of boxed tuples (+ lattice values)."
pub type InitialFacts = HashMap<RelSym, Vec<InitialFact>>;

/// One concrete index the program needs, described well enough for `solve`
/// to allocate it before evaluation starts. Mirrors `spec.md` §3's
/// "Indexes table": a flat array slot per (predicate, search-key) pair. The
/// RAM program inside `Program::statement` refers to these exclusively by
/// position in `Program::index_descriptors` (i.e. by `IndexSlot`).
///
/// `RamTerm::LoadFromTuple`/`Project` never rebox a column's key as it flows
/// from one relation into another — that round trip through the boxing map
/// is exactly what the dense integer representation exists to avoid
/// (`spec.md` §4.2, §9 "Boxing vs generics"). A key is only ever valid under
/// the `Position` it was minted at (`unbox_with`/seeding, or
/// `RelOp::Functional`'s explicit `result_positions`, which is the one
/// operator that does produce genuinely new values). So a column that is a
/// pure projection of an existing column — `Path(x,z) :- Edge(x,z)`, say —
/// carries *that column's* position forward, not a fresh one scoped to its
/// own predicate symbol. `column_positions` records, per physical column,
/// which position's table `seed`/`marshal` must read or write; for a
/// genuinely new column (an EDB predicate's own facts, or a `Functional`
/// result) that's simply `Position::new(sym.0, column)`, but for a
/// passthrough column it is whatever upstream position that value's domain
/// already uses.
#[derive(Clone)]
pub struct IndexDescriptor {
    pub sym: RelSym,
    pub denotation: DenotationKind,
    /// Physical tuple length this index stores — the number of non-lattice
    /// key columns, `+2` if the program carries provenance columns
    /// (`spec.md` §4.8). Matches `PredicateMeta::arity` for the common case
    /// of one index per predicate with no provenance.
    pub arity: usize,
    pub search_key: SearchKey,
    pub lattice: Option<LatticeOps>,
    /// One boxing `Position` per key column (length `arity`, or `arity - 2`
    /// worth of real columns plus the two provenance slots when provenance
    /// is carried — provenance columns always use the predicate's own
    /// symbol, since they are `solve`-internal and never shared).
    pub column_positions: Vec<Position>,
}

impl IndexDescriptor {
    /// Convenience for the common case: every column is its own domain,
    /// scoped to this predicate's own symbol. Reach for a bare struct
    /// literal instead when a column passes a value through from another
    /// predicate's domain.
    pub fn own_columns(sym: RelSym, denotation: DenotationKind, arity: usize, search_key: SearchKey, lattice: Option<LatticeOps>) -> Self {
        let column_positions = (0..arity).map(|c| Position::new(sym.0, c as u16)).collect();
        IndexDescriptor { sym, denotation, arity, search_key, lattice, column_positions }
    }
}

impl IndexDescriptor {
    fn build(&self) -> Index {
        match &self.lattice {
            Some(lattice) => Index::new_latticenal(self.arity, self.search_key.clone(), lattice.clone()),
            None => Index::new_relational(self.arity, self.search_key.clone()),
        }
    }
}

/// A complete RAM program ready to run: the statement tree plus everything
/// `solve` needs to allocate indexes, seed initial facts, and marshal
/// results, without the interpreter ever having to infer predicate shape
/// from the tree itself (`spec.md` §3 "indexes addressed by slot integers").
#[derive(Clone)]
pub struct Program {
    pub statement: Statement,
    /// Index slot `i` of the built `IndexesTable` is
    /// `index_descriptors[i].build()`.
    pub index_descriptors: Vec<IndexDescriptor>,
    /// Where `solve` inserts each predicate's `InitialFacts` before running
    /// the statement — typically the predicate's `full` slot.
    pub seed_slots: Vec<(RelSym, IndexSlot)>,
    /// Which index slot to read back for each public predicate once the
    /// statement has run (`spec.md` §4.8 "any one suffices since all hold
    /// the same set of tuples").
    pub result_slots: Vec<(RelSym, IndexSlot)>,
    /// Arity of every row variable the statement references, in the dense
    /// order `ProgramBuilder::alloc_row` assigned them — sizes the
    /// `SearchEnvironment`.
    pub row_arities: Vec<usize>,
}

/// One reconstructed fact, boxed back from its interned keys
/// (`spec.md` §4.8).
#[derive(Clone, Debug)]
pub struct ResultTuple {
    pub columns: Vec<Boxed>,
    pub lattice_value: Option<Boxed>,
    /// The two provenance annotation columns, present only when `solve` was
    /// called `with_provenance = true`.
    pub provenance: Option<(Boxed, Boxed)>,
}

/// One predicate's full result: its metadata plus every derived fact.
#[derive(Clone, Debug)]
pub struct RelationResult {
    pub meta: PredicateMeta,
    pub tuples: Vec<ResultTuple>,
}

/// `spec.md` §6 "resultMap: mapping predicate symbol → tuple-to-lattice-value
/// map with boxed values."
pub type ResultMap = HashMap<RelSym, RelationResult>;

fn find_meta<'a>(metas: &'a [PredicateMeta], sym: RelSym) -> RamResult<&'a PredicateMeta> {
    metas
        .iter()
        .find(|m| m.sym == sym)
        .ok_or_else(|| RamError::MalformedProgram(format!("no PredicateMeta supplied for {sym}")))
}

fn seed(indexes: &IndexesTable, boxing: &Boxing, metas: &[PredicateMeta], program: &Program, initial_facts: &InitialFacts) -> RamResult<()> {
    for (sym, slot) in &program.seed_slots {
        let Some(facts) = initial_facts.get(sym) else { continue };
        let meta = find_meta(metas, *sym)?;
        let positions = &program.index_descriptors[*slot].column_positions;
        for fact in facts {
            let keys: Vec<i64> = fact
                .columns
                .iter()
                .enumerate()
                .map(|(c, v)| boxing.unbox_with(v.clone(), positions[c]))
                .collect();
            let tuple = tuple_of(keys);
            match (meta.denotation, &fact.lattice_value) {
                (DenotationKind::Relational, None) => {
                    indexes.with_index(*slot, |idx| idx.put(tuple.clone()))??;
                }
                (DenotationKind::Latticenal, Some(value)) => {
                    let lattice = indexes
                        .with_index(*slot, |idx| idx.lattice().cloned())?
                        .ok_or_else(|| RamError::MalformedProgram(format!("index slot {slot} for {sym} has no lattice")))?;
                    indexes.with_index(*slot, |idx| idx.put_with(tuple.clone(), value.clone(), move |a, b| lattice.lub(a, b)))??;
                }
                (DenotationKind::Relational, Some(_)) => {
                    return Err(RamError::MalformedProgram(format!(
                        "initial fact for relational predicate {sym} carries a lattice value"
                    )))
                }
                (DenotationKind::Latticenal, None) => {
                    // Bottom is never stored (`spec.md` §3 invariant): a missing
                    // lattice value on a latticenal initial fact is bottom, and
                    // seeding it is a no-op rather than an error.
                }
            }
        }
    }
    Ok(())
}

/// `spec.md` §4.8 "Result Marshalling": walk every public predicate, rebox
/// each column's key back to its heterogeneous value, and (if requested)
/// rebox the two provenance annotation columns too.
#[instrument(skip_all)]
fn marshal(indexes: &IndexesTable, boxing: &Boxing, metas: &[PredicateMeta], program: &Program, with_provenance: bool) -> RamResult<ResultMap> {
    let mut out = HashMap::with_capacity(program.result_slots.len());
    for (sym, slot) in &program.result_slots {
        let meta = find_meta(metas, *sym)?;
        let positions = &program.index_descriptors[*slot].column_positions;
        let entries = indexes.with_index(*slot, |idx| idx.scan_all())?;
        let mut tuples = Vec::with_capacity(entries.len());
        for (tuple, value) in entries {
            let key_columns = if with_provenance { meta.arity - 2 } else { meta.arity };
            let columns = (0..key_columns)
                .map(|c| boxing.box_with(tuple[c], positions[c]))
                .collect::<RamResult<Vec<_>>>()?;
            let lattice_value = match (meta.denotation, value.as_lat()) {
                (DenotationKind::Latticenal, Some(v)) => Some(v.clone()),
                _ => None,
            };
            let provenance = if with_provenance {
                let p0 = boxing.box_with(tuple[key_columns], positions[key_columns])?;
                let p1 = boxing.box_with(tuple[key_columns + 1], positions[key_columns + 1])?;
                Some((p0, p1))
            } else {
                None
            };
            tuples.push(ResultTuple { columns, lattice_value, provenance });
        }
        out.insert(*sym, RelationResult { meta: meta.clone(), tuples });
    }
    Ok(out)
}

/// The primary entry point (`spec.md` §6): run `program` to its least fixed
/// point starting from `initial_facts`, and return every public predicate's
/// derived facts reboxed to their heterogeneous values.
///
/// `par_level` bounds structured parallel fan-out (`spec.md` §4.7; `0` is
/// fully sequential). `with_provenance` selects whether the two provenance
/// annotation columns are preserved per tuple.
#[instrument(skip_all, fields(par_level, with_provenance))]
pub fn solve(
    program: &Program,
    initial_facts: &InitialFacts,
    boxing: &Boxing,
    metas: &[PredicateMeta],
    par_level: usize,
    with_provenance: bool,
) -> RamResult<ResultMap> {
    solve_with_limit(program, initial_facts, boxing, metas, par_level, with_provenance, None)
}

/// As `solve`, but aborts a stratum's `Until` loop with
/// `RamError::FixpointNotReached` if it runs more than `max_iterations`
/// rounds without the configured tests going empty. `None` reproduces
/// `spec.md`'s exact behavior (run to the fixed point, no cap) — this is
/// ambient safety scaffolding (`SPEC_FULL.md` §4.9), not part of the
/// classical semantics.
pub fn solve_with_limit(
    program: &Program,
    initial_facts: &InitialFacts,
    boxing: &Boxing,
    metas: &[PredicateMeta],
    par_level: usize,
    with_provenance: bool,
    max_iterations: Option<u64>,
) -> RamResult<ResultMap> {
    let indexes = IndexesTable::new(program.index_descriptors.iter().map(IndexDescriptor::build).collect());
    seed(&indexes, boxing, metas, program, initial_facts)?;

    let interp = Interpreter::new(&indexes, boxing).with_max_iterations(max_iterations);
    let mut env = SearchEnvironment::new(&program.row_arities);
    let budget = ParBudget::new(par_level);

    if let Err(err) = interp.eval_statement(&program.statement, &mut env, budget) {
        tracing::error!(error = %err, "solve aborted");
        return Err(err);
    }

    marshal(&indexes, boxing, metas, program, with_provenance)
}

/// A thin owner of an `EngineConfig` and a `Boxing` handle across repeated
/// `solve` calls, mirroring the teacher's long-lived
/// `DatalogEngine`/`StorageEngine` — the Boxing map is explicitly allowed to
/// be "shared across successive solves" (`spec.md` §6).
pub struct Engine {
    config: EngineConfig,
    boxing: Boxing,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        Engine { config, boxing: Boxing::new() }
    }

    /// Load configuration the way the teacher's `Config::load` does
    /// (`ramalog.toml`, then `ramalog.local.toml`, then `RAMALOG_*` env
    /// vars), and start with a fresh boxing map.
    pub fn load() -> Result<Self, ConfigError> {
        Ok(Engine::new(EngineConfig::load()?))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn boxing(&self) -> &Boxing {
        &self.boxing
    }

    /// Run `program` using this engine's configured `par_level`,
    /// `with_provenance`, and `max_iterations`, sharing the boxing map
    /// across every call made through this `Engine`.
    pub fn solve(&self, program: &Program, initial_facts: &InitialFacts, metas: &[PredicateMeta]) -> RamResult<ResultMap> {
        solve_with_limit(
            program,
            initial_facts,
            &self.boxing,
            metas,
            self.config.engine.par_level,
            self.config.engine.with_provenance,
            self.config.engine.max_iterations,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn key(n: usize) -> SearchKey {
        Arc::from((0..n).collect::<Vec<usize>>())
    }

    fn meta(sym: RelSym, name: &str, arity: usize, denotation: DenotationKind) -> PredicateMeta {
        PredicateMeta::new(sym, name, arity, denotation, 0)
    }

    /// `spec.md` §8 "Transitive closure": `Edge = {(1,2),(2,3),(3,4)}`,
    /// `Path(x,z) :- Edge(x,z). Path(x,z) :- Path(x,y), Edge(y,z).`
    #[test]
    fn transitive_closure_end_to_end() {
        let mut b = ProgramBuilder::new();
        let edge_slot = b.alloc_slot(); // 0
        let path_full = b.alloc_slot(); // 1
        let path_delta = b.alloc_slot(); // 2
        let path_new = b.alloc_slot(); // 3

        let edge_sym = RelSym::new(0);
        let path_sym = RelSym::new(1);

        let pos_edge = |c: usize| Position::new(edge_sym.0, c as u16);
        let pos_path = |c: usize| Position::new(path_sym.0, c as u16);

        // Seed: Path(x,z) :- Edge(x,z).
        let edge_row = b.alloc_row(2);
        let seed_path = ProgramBuilder::search(
            edge_row,
            edge_slot,
            vec![],
            ProgramBuilder::project(
                vec![ProgramBuilder::load(edge_row, 0, pos_edge(0)), ProgramBuilder::load(edge_row, 1, pos_edge(1))],
                path_full,
            ),
        );

        // Round body: Path(x,z) :- Path_delta(x,y), Edge(y,z). -> new
        let delta_row = b.alloc_row(2);
        let edge_row2 = b.alloc_row(2);
        let join_body = ProgramBuilder::search(
            delta_row,
            path_delta,
            vec![ProgramBuilder::write(1, edge_row2, 0)],
            ProgramBuilder::query(
                edge_row2,
                edge_slot,
                vec![],
                ProgramBuilder::project(
                    vec![ProgramBuilder::load(delta_row, 0, pos_path(0)), ProgramBuilder::load(edge_row2, 1, pos_edge(1))],
                    path_new,
                ),
            ),
        );

        let until_body = ProgramBuilder::seq(vec![
            ProgramBuilder::insert(join_body),
            ProgramBuilder::merge_into(path_new, path_full),
            ProgramBuilder::swap(path_delta, path_new),
            ProgramBuilder::purge(path_new),
        ]);

        let statement = ProgramBuilder::seq(vec![
            ProgramBuilder::insert(seed_path),
            ProgramBuilder::merge_into(path_full, path_delta),
            ProgramBuilder::until(vec![ProgramBuilder::is_empty(path_delta)], until_body, 0),
        ]);

        // Every Path column is a pure passthrough of an Edge column (x and z
        // both originate as Edge(x,z) values, even after recursion re-derives
        // them via Path_delta), so Path's indexes rebox through Edge's boxing
        // positions rather than their own (IndexDescriptor doc comment above).
        let path_columns = vec![pos_edge(0), pos_edge(1)];
        let path_descriptor = |search_key: SearchKey| IndexDescriptor {
            sym: path_sym,
            denotation: DenotationKind::Relational,
            arity: 2,
            search_key,
            lattice: None,
            column_positions: path_columns.clone(),
        };

        let program = Program {
            statement,
            index_descriptors: vec![
                IndexDescriptor::own_columns(edge_sym, DenotationKind::Relational, 2, key(2), None),
                path_descriptor(key(2)),
                path_descriptor(key(2)),
                path_descriptor(key(2)),
            ],
            seed_slots: vec![(edge_sym, edge_slot)],
            result_slots: vec![(path_sym, path_full)],
            row_arities: b.row_arities().to_vec(),
        };

        let boxing = Boxing::new();
        let metas = vec![
            meta(edge_sym, "edge", 2, DenotationKind::Relational),
            meta(path_sym, "path", 2, DenotationKind::Relational),
        ];
        let mut facts = InitialFacts::new();
        facts.insert(
            edge_sym,
            vec![
                InitialFact::relational(vec![Boxed::int(1), Boxed::int(2)]),
                InitialFact::relational(vec![Boxed::int(2), Boxed::int(3)]),
                InitialFact::relational(vec![Boxed::int(3), Boxed::int(4)]),
            ],
        );

        let result = solve(&program, &facts, &boxing, &metas, 0, false).unwrap();
        let path = &result[&path_sym];
        let mut pairs: Vec<(i64, i64)> = path
            .tuples
            .iter()
            .map(|t| (t.columns[0].as_int().unwrap(), t.columns[1].as_int().unwrap()))
            .collect();
        pairs.sort_unstable();
        assert_eq!(pairs, vec![(1, 2), (1, 3), (1, 4), (2, 3), (2, 4), (3, 4)]);
    }

    #[test]
    fn parallel_and_sequential_agree() {
        let mut b = ProgramBuilder::new();
        let edge_slot = b.alloc_slot();
        let path_slot = b.alloc_slot();
        let edge_sym = RelSym::new(0);
        let path_sym = RelSym::new(1);
        let row = b.alloc_row(2);
        let pos = |c: usize| Position::new(edge_sym.0, c as u16);
        let statement = ProgramBuilder::insert(ProgramBuilder::search(
            row,
            edge_slot,
            vec![],
            ProgramBuilder::project(vec![ProgramBuilder::load(row, 0, pos(0)), ProgramBuilder::load(row, 1, pos(1))], path_slot),
        ));

        // path_slot's columns are a pure passthrough of edge_slot's, so they
        // rebox through edge_sym's boxing positions (see the IndexDescriptor
        // doc comment on `column_positions`).
        let build_program = || Program {
            statement: statement.clone(),
            index_descriptors: vec![
                IndexDescriptor::own_columns(edge_sym, DenotationKind::Relational, 2, key(2), None),
                IndexDescriptor {
                    sym: path_sym,
                    denotation: DenotationKind::Relational,
                    arity: 2,
                    search_key: key(2),
                    lattice: None,
                    column_positions: vec![pos(0), pos(1)],
                },
            ],
            seed_slots: vec![(edge_sym, edge_slot)],
            result_slots: vec![(path_sym, path_slot)],
            row_arities: b.row_arities().to_vec(),
        };

        let metas = vec![meta(edge_sym, "edge", 2, DenotationKind::Relational), meta(path_sym, "path", 2, DenotationKind::Relational)];
        let mut facts = InitialFacts::new();
        facts.insert(
            edge_sym,
            (0..50).map(|i| InitialFact::relational(vec![Boxed::int(i), Boxed::int(i + 1)])).collect(),
        );

        let boxing_seq = Boxing::new();
        let seq = solve(&build_program(), &facts, &boxing_seq, &metas, 0, false).unwrap();
        let boxing_par = Boxing::new();
        let par = solve(&build_program(), &facts, &boxing_par, &metas, 4, false).unwrap();

        let extract = |m: &ResultMap| {
            let mut v: Vec<(i64, i64)> = m[&path_sym]
                .tuples
                .iter()
                .map(|t| (t.columns[0].as_int().unwrap(), t.columns[1].as_int().unwrap()))
                .collect();
            v.sort_unstable();
            v
        };
        assert_eq!(extract(&seq), extract(&par));
    }
}
