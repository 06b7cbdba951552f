//! Ergonomic program construction (`SPEC_FULL.md` §6 "ProgramBuilder").
//!
//! The RAM AST in `ast.rs` is the tagged-variant tree `spec.md` §4.3
//! specifies, unchanged. Hand-assembling it means tracking row variable and
//! index slot integers yourself; `ProgramBuilder` is just an allocator for
//! those two integer spaces plus thin constructors for each variant, the
//! same ergonomic layer the teacher's `ir_builder` puts in front of its own
//! tree of owned `IRNode`s. It does not change what a program *means* — a
//! tree built by hand, column by column, is indistinguishable at evaluation
//! time from one built through this API.

use crate::boxing::Position;
use crate::index::IndexSlot;
use crate::lattice::LatticeOps;
use crate::ram::ast::{AppFn, BoolExp, FunctionalFn, GuardFn, NamedFn, RamTerm, RelOp, RowVar, Statement, Write};
use crate::value::Boxed;
use std::sync::Arc;

/// Allocates dense `RowVar`/`IndexSlot` integers and remembers each row
/// variable's arity so a `SearchEnvironment` can be sized correctly
/// (`spec.md` §3 "Row variables are assigned dense integer indices at
/// compile time").
#[derive(Default)]
pub struct ProgramBuilder {
    row_arities: Vec<usize>,
    next_slot: usize,
}

impl ProgramBuilder {
    pub fn new() -> Self {
        ProgramBuilder::default()
    }

    /// Allocate a fresh row variable bound against indexes of the given
    /// arity.
    pub fn alloc_row(&mut self, arity: usize) -> RowVar {
        self.row_arities.push(arity);
        self.row_arities.len() - 1
    }

    /// Allocate a fresh index slot number. The caller is responsible for
    /// placing a matching `Index` at this slot in the `IndexesTable`
    /// (`spec.md` §3 "Indexes table").
    pub fn alloc_slot(&mut self) -> IndexSlot {
        let slot = self.next_slot;
        self.next_slot += 1;
        slot
    }

    /// Arities of every row variable allocated so far, in allocation order —
    /// feed directly to `SearchEnvironment::new`.
    pub fn row_arities(&self) -> &[usize] {
        &self.row_arities
    }

    pub fn search(row: RowVar, index: IndexSlot, writes: Vec<Write>, body: RelOp) -> RelOp {
        RelOp::Search { row, index, meet_with: None, lattice: None, writes, body: Box::new(body) }
    }

    pub fn search_latticenal(row: RowVar, index: IndexSlot, lattice: LatticeOps, meet_with: Option<RowVar>, writes: Vec<Write>, body: RelOp) -> RelOp {
        RelOp::Search { row, index, meet_with, lattice: Some(lattice), writes, body: Box::new(body) }
    }

    pub fn query(row: RowVar, index: IndexSlot, writes: Vec<Write>, body: RelOp) -> RelOp {
        RelOp::Query { row, index, meet_with: None, lattice: None, writes, body: Box::new(body) }
    }

    pub fn query_latticenal(row: RowVar, index: IndexSlot, lattice: LatticeOps, meet_with: Option<RowVar>, writes: Vec<Write>, body: RelOp) -> RelOp {
        RelOp::Query { row, index, meet_with, lattice: Some(lattice), writes, body: Box::new(body) }
    }

    pub fn if_(tests: Vec<BoolExp>, body: RelOp) -> RelOp {
        RelOp::If { tests, body: Box::new(body) }
    }

    pub fn project(terms: Vec<RamTerm>, index: IndexSlot) -> RelOp {
        RelOp::Project { terms, index, lattice: None }
    }

    pub fn project_latticenal(terms: Vec<RamTerm>, index: IndexSlot, lattice: LatticeOps) -> RelOp {
        RelOp::Project { terms, index, lattice: Some(lattice) }
    }

    pub fn functional(
        row: RowVar,
        name: impl Into<Arc<str>>,
        f: FunctionalFn,
        args: Vec<RamTerm>,
        result_positions: Vec<Position>,
        writes: Vec<Write>,
        body: RelOp,
    ) -> RelOp {
        RelOp::Functional {
            row,
            function: NamedFn::new(name, f),
            args,
            result_positions,
            writes,
            body: Box::new(body),
        }
    }

    pub fn write(source_column: usize, dest_row: RowVar, dest_column: usize) -> Write {
        Write { source_column, dest_row, dest_column }
    }

    pub fn lit(key: i64, boxed: Boxed) -> RamTerm {
        RamTerm::Lit(key, boxed)
    }

    pub fn load(row: RowVar, column: usize, position: Position) -> RamTerm {
        RamTerm::LoadFromTuple { row, column, position }
    }

    pub fn load_lat(row: RowVar, position: Position) -> RamTerm {
        RamTerm::LoadLatVar { row, position }
    }

    pub fn meet(lattice: LatticeOps, lhs: RamTerm, rhs: RamTerm, position: Position) -> RamTerm {
        RamTerm::Meet { lattice, lhs: Box::new(lhs), rhs: Box::new(rhs), position }
    }

    pub fn app(name: impl Into<Arc<str>>, f: AppFn, args: Vec<RamTerm>, position: Position) -> RamTerm {
        RamTerm::App { function: NamedFn::new(name, f), args, position }
    }

    pub fn not(be: BoolExp) -> BoolExp {
        BoolExp::Not(Box::new(be))
    }

    pub fn is_empty(index: IndexSlot) -> BoolExp {
        BoolExp::IsEmpty(index)
    }

    pub fn not_member_of(terms: Vec<RamTerm>, index: IndexSlot) -> BoolExp {
        BoolExp::NotMemberOf { terms, index, lattice: None }
    }

    pub fn not_member_of_latticenal(terms: Vec<RamTerm>, index: IndexSlot, lattice: LatticeOps) -> BoolExp {
        BoolExp::NotMemberOf { terms, index, lattice: Some(lattice) }
    }

    pub fn eq(lhs: RamTerm, rhs: RamTerm) -> BoolExp {
        BoolExp::Eq(lhs, rhs)
    }

    pub fn leq(bound: RamTerm, row: RowVar, lattice: LatticeOps) -> BoolExp {
        BoolExp::Leq { bound, row, lattice }
    }

    pub fn guard(name: impl Into<Arc<str>>, f: GuardFn, args: Vec<RamTerm>) -> BoolExp {
        BoolExp::Guard { function: NamedFn::new(name, f), args }
    }

    pub fn insert(op: RelOp) -> Statement {
        Statement::Insert(op)
    }

    pub fn merge_into(src: IndexSlot, dst: IndexSlot) -> Statement {
        Statement::MergeInto { src, dst }
    }

    pub fn swap(i: IndexSlot, j: IndexSlot) -> Statement {
        Statement::Swap(i, j)
    }

    pub fn purge(i: IndexSlot) -> Statement {
        Statement::Purge(i)
    }

    pub fn seq(stmts: Vec<Statement>) -> Statement {
        Statement::Seq(stmts)
    }

    /// `until(tests, body, stratum)` — `stratum` labels the fixed-point loop
    /// for diagnostics only (`ast::Statement::Until`).
    pub fn until(tests: Vec<BoolExp>, body: Statement, stratum: u32) -> Statement {
        Statement::Until { tests, body: Box::new(body), stratum }
    }

    pub fn par(stmts: Vec<Statement>) -> Statement {
        Statement::Par(stmts)
    }

    pub fn comment(text: impl Into<String>) -> Statement {
        Statement::Comment(text.into())
    }
}
