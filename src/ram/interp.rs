//! Statement, operator, and term evaluation (`spec.md` §4.4–§4.6).
//!
//! The interpreter is a pure function of the program tree, the shared index
//! table, and the boxing map; all thread-local state lives in the
//! `SearchEnvironment` passed through by `&mut` (sequential recursion) or
//! cloned (parallel fan-out, `crate::parallel`).

use crate::boxing::Boxing;
use crate::error::{RamError, RamResult};
use crate::index::IndexesTable;
use crate::parallel::{self, ParBudget};
use crate::ram::ast::{BoolExp, RamTerm, RelOp, RowVar, Statement, Write};
use crate::ram::env::SearchEnvironment;
use crate::value::{tuple_of, Boxed, Tuple};
use tracing::trace;

/// Bundles the two pieces of state every evaluation needs read access to.
/// Cheap to copy (both fields are references); constructed once per `solve`
/// call and threaded through every recursive call.
#[derive(Clone, Copy)]
pub struct Interpreter<'a> {
    pub indexes: &'a IndexesTable,
    pub boxing: &'a Boxing,
    /// Soft cap on semi-naive rounds per `Until`, from `EngineConfig`.
    /// `None` (the default `spec.md` behavior) runs to the fixed point with
    /// no cap.
    pub max_iterations: Option<u64>,
}

impl<'a> Interpreter<'a> {
    pub fn new(indexes: &'a IndexesTable, boxing: &'a Boxing) -> Self {
        Interpreter { indexes, boxing, max_iterations: None }
    }

    pub fn with_max_iterations(mut self, max_iterations: Option<u64>) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// A pure function of the current environment and the boxing map.
    /// Returns the term's already-interned `Int64` key.
    pub fn eval_term(&self, term: &RamTerm, env: &SearchEnvironment) -> RamResult<i64> {
        match term {
            RamTerm::Lit(key, _) => Ok(*key),
            RamTerm::LoadFromTuple { row, column, .. } => {
                let tuple = env.current(*row)?;
                tuple.get(*column).copied().ok_or_else(|| {
                    RamError::MalformedProgram(format!(
                        "LoadFromTuple: column {column} out of range for row {row} (arity {})",
                        tuple.len()
                    ))
                })
            }
            RamTerm::LoadLatVar { row, position } => {
                let value = self.current_lat_or_error(*row, env)?;
                Ok(self.boxing.unbox_with(value, *position))
            }
            RamTerm::Meet { lattice, lhs, rhs, position } => {
                let l = self.eval_boxed_term(lhs, env)?;
                let r = self.eval_boxed_term(rhs, env)?;
                let meet = lattice.glb(&l, &r);
                Ok(self.boxing.unbox_with(meet, *position))
            }
            RamTerm::App { function, args, position } => {
                let argv = self.eval_boxed_args(args, env)?;
                let result = (function.f)(&argv).map_err(|message| RamError::UserFunctionFailure {
                    function: function.name.to_string(),
                    message,
                    location: None,
                })?;
                Ok(self.boxing.unbox_with(result, *position))
            }
        }
    }

    /// Companion to `eval_term`: returns the corresponding boxed value.
    /// Needed wherever a lattice meet, user guard, or `NotMemberOf` lattice
    /// test must operate on boxed values rather than raw keys
    /// (`spec.md` §4.4).
    pub fn eval_boxed_term(&self, term: &RamTerm, env: &SearchEnvironment) -> RamResult<Boxed> {
        match term {
            RamTerm::Lit(_, boxed) => Ok(boxed.clone()),
            RamTerm::LoadFromTuple { row, column, position } => {
                let key = env.current(*row)?.get(*column).copied().ok_or_else(|| {
                    RamError::MalformedProgram(format!("LoadFromTuple: column {column} out of range for row {row}"))
                })?;
                self.boxing.box_with(key, *position)
            }
            RamTerm::LoadLatVar { row, .. } => self.current_lat_or_error(*row, env),
            RamTerm::Meet { lattice, lhs, rhs, .. } => {
                let l = self.eval_boxed_term(lhs, env)?;
                let r = self.eval_boxed_term(rhs, env)?;
                Ok(lattice.glb(&l, &r))
            }
            RamTerm::App { function, args, .. } => {
                let argv = self.eval_boxed_args(args, env)?;
                (function.f)(&argv).map_err(|message| RamError::UserFunctionFailure {
                    function: function.name.to_string(),
                    message,
                    location: None,
                })
            }
        }
    }

    fn eval_boxed_args(&self, args: &[RamTerm], env: &SearchEnvironment) -> RamResult<Vec<Boxed>> {
        args.iter().map(|a| self.eval_boxed_term(a, env)).collect()
    }

    fn current_lat_or_error(&self, row: RowVar, env: &SearchEnvironment) -> RamResult<Boxed> {
        env.current_lat(row)?
            .cloned()
            .ok_or_else(|| RamError::MalformedProgram(format!("row variable {row} has no current lattice value")))
    }

    /// Short-circuits left-to-right (`spec.md` §4.4, §9).
    pub fn eval_bool(&self, be: &BoolExp, env: &SearchEnvironment) -> RamResult<bool> {
        match be {
            BoolExp::Not(inner) => Ok(!self.eval_bool(inner, env)?),
            BoolExp::IsEmpty(slot) => self.indexes.with_index(*slot, |idx| idx.is_empty()),
            BoolExp::NotMemberOf { terms, index, lattice } => match lattice {
                None => {
                    let keys = terms.iter().map(|t| self.eval_term(t, env)).collect::<RamResult<Vec<_>>>()?;
                    let tuple = tuple_of(keys);
                    self.indexes.with_index(*index, |idx| !idx.contains(&tuple))
                }
                Some(lattice) => {
                    // Mirrors `Project`'s latticenal shape: all but the last term
                    // are the tuple columns, the last term evaluates to the
                    // proposed lattice value.
                    let (tuple_terms, value_term) = terms.split_at(terms.len() - 1);
                    let keys = tuple_terms.iter().map(|t| self.eval_term(t, env)).collect::<RamResult<Vec<_>>>()?;
                    let tuple = tuple_of(keys);
                    let proposed = self.eval_boxed_term(&value_term[0], env)?;
                    let existing = self.indexes.with_index(*index, |idx| idx.get(&tuple))?;
                    match existing {
                        None => Ok(true),
                        Some(value) => {
                            let stored = value.as_lat().cloned().ok_or_else(|| {
                                RamError::MalformedProgram("NotMemberOf: index holds no lattice value".into())
                            })?;
                            Ok(lattice.would_grow(&proposed, &stored))
                        }
                    }
                }
            },
            BoolExp::Eq(lhs, rhs) => Ok(self.eval_term(lhs, env)? == self.eval_term(rhs, env)?),
            BoolExp::Leq { bound, row, lattice } => {
                let bound = self.eval_boxed_term(bound, env)?;
                let current = self.current_lat_or_error(*row, env)?;
                Ok(lattice.leq(&bound, &current))
            }
            BoolExp::Guard { function, args } => {
                let argv = self.eval_boxed_args(args, env)?;
                (function.f)(&argv).map_err(|message| RamError::UserFunctionFailure {
                    function: function.name.to_string(),
                    message,
                    location: None,
                })
            }
        }
    }

    fn apply_writes(&self, writes: &[Write], tuple: &Tuple, env: &mut SearchEnvironment) -> RamResult<()> {
        for w in writes {
            env.narrow(w.dest_row, w.dest_column, tuple[w.source_column])?;
        }
        Ok(())
    }

    pub fn eval_relop(&self, op: &RelOp, env: &mut SearchEnvironment, budget: ParBudget) -> RamResult<()> {
        match op {
            RelOp::Search { row, index, meet_with, lattice, writes, body } => {
                let entries = self.indexes.with_index(*index, |idx| idx.scan_all())?;
                self.visit_entries(entries, *row, meet_with.as_ref().copied(), lattice.as_ref(), writes, body, env, budget)
            }
            RelOp::Query { row, index, meet_with, lattice, writes, body } => {
                let lo = env.min(*row)?.clone();
                let hi = env.max(*row)?.clone();
                let entries = self.indexes.with_index(*index, |idx| idx.range(&lo, &hi))?;
                // Query never fans out on its own (`spec.md` §4.7: "At the top of a
                // Search or Par" — Query is excluded), so it always runs with the
                // budget unchanged and sequentially.
                self.visit_entries_sequential(entries, *row, meet_with.as_ref().copied(), lattice.as_ref(), writes, body, env, budget)
            }
            RelOp::If { tests, body } => {
                for test in tests {
                    if !self.eval_bool(test, env)? {
                        return Ok(());
                    }
                }
                self.eval_relop(body, env, budget)
            }
            RelOp::Project { terms, index, lattice } => self.eval_project(terms, *index, lattice.as_ref(), env),
            RelOp::Functional { row, function, args, result_positions, writes, body } => {
                let argv = self.eval_boxed_args(args, env)?;
                let results = (function.f)(&argv).map_err(|message| RamError::UserFunctionFailure {
                    function: function.name.to_string(),
                    message,
                    location: None,
                })?;
                for result in results {
                    if result.len() != result_positions.len() {
                        return Err(RamError::ArityMismatch {
                            index: format!("Functional({})", function.name),
                            expected: result_positions.len(),
                            actual: result.len(),
                        });
                    }
                    let keys: Vec<i64> = result
                        .into_iter()
                        .zip(result_positions.iter())
                        .map(|(v, pos)| self.boxing.unbox_with(v, *pos))
                        .collect();
                    let tuple = tuple_of(keys);
                    self.apply_writes(writes, &tuple, env)?;
                    env.set_current(*row, tuple)?;
                    self.eval_relop(body, env, budget)?;
                }
                Ok(())
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn visit_entries(
        &self,
        entries: Vec<(Tuple, crate::index::IndexValue)>,
        row: RowVar,
        meet_with: Option<RowVar>,
        lattice: Option<&crate::lattice::LatticeOps>,
        writes: &[Write],
        body: &RelOp,
        env: &mut SearchEnvironment,
        budget: ParBudget,
    ) -> RamResult<()> {
        if budget.allows_fanout() && entries.len() > 1 {
            let child_budget = budget.child();
            let tasks: Vec<Box<dyn FnOnce() -> RamResult<()> + Send>> = entries
                .into_iter()
                .map(|(tuple, value)| {
                    let mut task_env = env.clone();
                    let interp = *self;
                    let writes = writes.to_vec();
                    let lattice = lattice.cloned();
                    let body = body.clone();
                    Box::new(move || {
                        if !interp.bind_one(row, meet_with, lattice.as_ref(), &writes, &tuple, value, &mut task_env)? {
                            return Ok(());
                        }
                        interp.eval_relop(&body, &mut task_env, child_budget)
                    }) as Box<dyn FnOnce() -> RamResult<()> + Send>
                })
                .collect();
            return parallel::run_tasks(budget, tasks);
        }
        self.visit_entries_sequential(entries, row, meet_with, lattice, writes, body, env, budget)
    }

    #[allow(clippy::too_many_arguments)]
    fn visit_entries_sequential(
        &self,
        entries: Vec<(Tuple, crate::index::IndexValue)>,
        row: RowVar,
        meet_with: Option<RowVar>,
        lattice: Option<&crate::lattice::LatticeOps>,
        writes: &[Write],
        body: &RelOp,
        env: &mut SearchEnvironment,
        budget: ParBudget,
    ) -> RamResult<()> {
        for (tuple, value) in entries {
            if !self.bind_one(row, meet_with, lattice, writes, &tuple, value, env)? {
                continue;
            }
            self.eval_relop(body, env, budget)?;
        }
        Ok(())
    }

    /// Implements `spec.md` §4.5 steps 1–3 for one candidate tuple. Returns
    /// `false` if the candidate should be skipped (the lattice meet would
    /// not exceed bottom).
    fn bind_one(
        &self,
        row: RowVar,
        meet_with: Option<RowVar>,
        lattice: Option<&crate::lattice::LatticeOps>,
        writes: &[Write],
        tuple: &Tuple,
        value: crate::index::IndexValue,
        env: &mut SearchEnvironment,
    ) -> RamResult<bool> {
        self.apply_writes(writes, tuple, env)?;
        env.set_current(row, tuple.clone())?;

        match (lattice, value.as_lat()) {
            (Some(lattice), Some(l)) => match meet_with {
                Some(other) => {
                    let other_lat = self.current_lat_or_error(other, env)?;
                    let meet = lattice.glb(l, &other_lat);
                    if lattice.leq(&meet, &lattice.bottom()) {
                        return Ok(false);
                    }
                    env.set_current_lat(row, Some(meet))?;
                    Ok(true)
                }
                None => {
                    env.set_current_lat(row, Some(l.clone()))?;
                    Ok(true)
                }
            },
            _ => {
                env.set_current_lat(row, None)?;
                Ok(true)
            }
        }
    }

    fn eval_project(
        &self,
        terms: &[RamTerm],
        index: crate::index::IndexSlot,
        lattice: Option<&crate::lattice::LatticeOps>,
        env: &SearchEnvironment,
    ) -> RamResult<()> {
        match lattice {
            None => {
                let keys = terms.iter().map(|t| self.eval_term(t, env)).collect::<RamResult<Vec<_>>>()?;
                let tuple = tuple_of(keys);
                self.indexes.with_index(index, |idx| idx.put(tuple))?
            }
            Some(lattice) => {
                let (tuple_terms, value_term) = terms.split_at(terms.len() - 1);
                let keys = tuple_terms.iter().map(|t| self.eval_term(t, env)).collect::<RamResult<Vec<_>>>()?;
                let tuple = tuple_of(keys);
                let value = self.eval_boxed_term(&value_term[0], env)?;
                if lattice.leq(&value, &lattice.bottom()) {
                    return Ok(());
                }
                let lattice = lattice.clone();
                self.indexes.with_index(index, |idx| idx.put_with(tuple, value, move |a, b| lattice.lub(a, b)))?
            }
        }
    }

    pub fn eval_statement(&self, stmt: &Statement, env: &mut SearchEnvironment, budget: ParBudget) -> RamResult<()> {
        match stmt {
            Statement::Insert(op) => self.eval_relop(op, env, budget),
            Statement::MergeInto { src, dst } => self.indexes.merge_into(*src, *dst),
            Statement::Swap(i, j) => self.indexes.swap(*i, *j),
            Statement::Purge(i) => self.indexes.purge(*i),
            Statement::Seq(stmts) => {
                for s in stmts {
                    self.eval_statement(s, env, budget)?;
                }
                Ok(())
            }
            Statement::Until { tests, body, stratum } => {
                let span = tracing::info_span!("stratum", stratum = *stratum);
                let _enter = span.enter();
                let mut round = 0u64;
                loop {
                    let done = tests.iter().try_fold(true, |acc, t| Ok::<_, RamError>(acc && self.eval_bool(t, env)?))?;
                    if done {
                        trace!(rounds = round, "fixed point reached");
                        return Ok(());
                    }
                    if let Some(max) = self.max_iterations {
                        if round >= max {
                            return Err(RamError::FixpointNotReached { stratum: *stratum, iterations: round });
                        }
                    }
                    self.eval_statement(body, env, budget)?;
                    round += 1;
                    trace!(round, "semi-naive round complete");
                }
            }
            Statement::Par(stmts) => {
                trace!(tasks = stmts.len(), "par fan-out");
                let tasks: Vec<Box<dyn FnOnce() -> RamResult<()> + Send>> = stmts
                    .iter()
                    .map(|s| {
                        let mut task_env = env.clone();
                        let interp = *self;
                        let s = s.clone();
                        let child_budget = budget.child();
                        Box::new(move || interp.eval_statement(&s, &mut task_env, child_budget)) as Box<dyn FnOnce() -> RamResult<()> + Send>
                    })
                    .collect();
                parallel::run_tasks(budget, tasks)
            }
            Statement::Comment(_) => Ok(()),
        }
    }
}
