//! Vectorized executor for logical plans.
//!
//! Architecture role:
//! - types every plan node from its children ([`schema`])
//! - compiles planner expressions into Arrow-kernel evaluators ([`expressions`])
//! - runs one operator per plan node over record batches ([`operators`])
//! - drives the post-order traversal and records metrics ([`executor`])

pub mod executor;
pub mod expressions;
pub mod operators;
pub mod schema;

pub use executor::{Executor, QueryResult};
pub use expressions::{compile_expr, PhysicalExpr};
pub use operators::ExecOutput;
pub use schema::{infer_schema, node_schema, ColumnHeader, PlanSchema, ROWS_AFFECTED};
