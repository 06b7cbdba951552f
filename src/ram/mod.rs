//! The RAM (Relational Algebra Machine) interpreter: program representation,
//! search environment, evaluation, and the ergonomic program builder
//! (`spec.md` §4.3–§4.6).

pub mod ast;
pub mod builder;
pub mod env;
pub mod interp;

pub use ast::{BoolExp, NamedFn, RamTerm, RelOp, RowVar, Statement, Write};
pub use builder::ProgramBuilder;
pub use env::SearchEnvironment;
pub use interp::Interpreter;
