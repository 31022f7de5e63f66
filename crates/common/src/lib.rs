//! Shared configuration, error types, IDs, session state, and metrics for Tessera crates.
//!
//! Architecture role:
//! - defines engine configuration passed across layers
//! - provides the common [`TesseraError`] / [`Result`] contracts
//! - carries the connection-scoped [`SessionState`] read by planner and executor
//! - hosts the prometheus-backed [`MetricsRegistry`]
//!
//! Key modules:
//! - [`config`]
//! - [`error`]
//! - [`ids`]
//! - [`metrics`]
//! - [`session`]

pub mod config;
pub mod error;
pub mod ids;
pub mod metrics;
pub mod session;

pub use config::EngineConfig;
pub use error::{Result, TesseraError};
pub use ids::*;
pub use metrics::MetricsRegistry;
pub use session::SessionState;
