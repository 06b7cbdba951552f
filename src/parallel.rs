//! Parallel execution runtime: structured, depth-bounded fan-out
//! (`spec.md` §4.7, §9 "Structured parallelism with a fuel counter").
//!
//! `parLevel` is a depth counter, not a worker-pool size — it bounds how
//! many more nested `Search`/`Par` levels are allowed to fan out before
//! falling back to sequential execution. Fan-out itself is spawn-then-join
//! structured parallelism over the crate's shared `rayon` pool (the same
//! pool the teacher configures once via `ThreadPoolBuilder` in
//! `StorageEngine::new`, rather than a long-lived pool this crate owns).

use crate::error::RamResult;
use parking_lot::Mutex;

/// The remaining fan-out budget. Cloning is cheap (a `usize`); `child()`
/// produces the budget passed one level deeper.
#[derive(Clone, Copy, Debug)]
pub struct ParBudget(usize);

impl ParBudget {
    pub fn new(level: usize) -> Self {
        ParBudget(level)
    }

    pub fn allows_fanout(self) -> bool {
        self.0 > 0
    }

    pub fn child(self) -> Self {
        ParBudget(self.0.saturating_sub(1))
    }
}

/// Run every task. If `budget` still allows fan-out and there is more than
/// one task, spawn them on the shared rayon pool and join before returning;
/// otherwise run them in order on the current thread. Either way, the first
/// error encountered (in task order, for the sequential path; in
/// nondeterministic completion order for the parallel path) is returned —
/// `spec.md` §7 "Propagation" requires the whole `solve` to abort, and since
/// fatal errors are the only thing that can happen here, which one surfaces
/// first is not user-observable behavior worth over-specifying.
pub fn run_tasks<'a>(budget: ParBudget, tasks: Vec<Box<dyn FnOnce() -> RamResult<()> + Send + 'a>>) -> RamResult<()> {
    if tasks.len() <= 1 || !budget.allows_fanout() {
        for task in tasks {
            task()?;
        }
        return Ok(());
    }

    let errors: Mutex<Vec<RamResult<()>>> = Mutex::new(Vec::new());
    rayon::scope(|scope| {
        for task in tasks {
            let errors = &errors;
            scope.spawn(move |_| {
                let result = task();
                errors.lock().push(result);
            });
        }
    });

    errors.into_inner().into_iter().collect::<RamResult<Vec<()>>>().map(|_| ())
}
