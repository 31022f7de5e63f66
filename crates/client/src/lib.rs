//! Embedding API for Tessera.
//!
//! [`Engine`] owns the shared catalog, optimizer and executor and acts as one
//! connection with its own current database. SQL text goes through parse,
//! DDL dispatch or optimize-then-execute, and every statement yields a
//! [`QueryResult`].

mod planner_facade;
mod session;

pub mod engine;

pub use engine::Engine;
pub use tessera_common::{EngineConfig, Result, TesseraError};
pub use tessera_execution::{PlanSchema, QueryResult};
pub use tessera_storage::ScalarValue;
