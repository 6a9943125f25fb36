//! The algebraic query planner: a plan tree over `List`/`Set` sources,
//! bottom-up optimization that pushes predicate terms onto whatever
//! indexes are available, and execution to a persistent result collection
//! (spec §4.7).

#![warn(missing_docs)]

mod catalog;
mod error;
mod exec;
mod expression;
mod plan;

pub use catalog::{IndexCatalog, IndexEntry};
pub use error::{QueryError, Result};
pub use exec::{execute, DbCollection};
pub use expression::{CmpOp, CompileToken, Expression, Operand, Term};
pub use plan::{KeyFn, Plan, Source};
