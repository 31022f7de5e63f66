//! Catalog, chunk storage, system tables and statistics.
//!
//! Tables are ordered sets of immutable Arrow chunks. The [`Catalog`] owns
//! metadata and chunk sets; the [`DataManager`] is the row-data surface used
//! by the executor.

pub mod catalog;
pub mod chunk;
pub mod data_manager;
pub mod schema;
pub mod stats;
pub mod system_tables;
pub mod value;

pub use catalog::Catalog;
pub use chunk::{Chunk, ChunkSet};
pub use data_manager::{ChunkScan, DataManager};
pub use schema::{ColumnMeta, ColumnType, Constraint, ConstraintKind, TableMeta};
pub use stats::{ColumnStatistics, NoStatistics, StatisticsProvider, TableStatistics};
pub use value::ScalarValue;
