//! Logical plan model, SQL translation rules, strategy hints and DDL.

pub mod ddl;
pub mod explain;
pub mod logical_plan;
pub mod optimizer;
pub mod sql_frontend;

pub use ddl::*;
pub use explain::*;
pub use logical_plan::*;
pub use optimizer::*;
pub use sql_frontend::*;
