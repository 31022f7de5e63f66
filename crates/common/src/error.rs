use thiserror::Error;

/// Canonical Tessera error taxonomy used across crates.
///
/// Every variant carries the names needed to build a precise diagnostic
/// without the original SQL text (database, table, column, plan node).
///
/// Classification guidance:
/// - catalog contract violations: [`TesseraError::DuplicateDatabase`],
///   [`TesseraError::DatabaseNotFound`], [`TesseraError::DuplicateTable`],
///   [`TesseraError::TableNotFound`], [`TesseraError::InvalidConstraint`],
///   [`TesseraError::SchemaMismatch`]
/// - statement/plan resolution failures: [`TesseraError::ColumnNotFound`],
///   [`TesseraError::ColumnCountMismatch`], [`TesseraError::TypeMismatch`]
/// - optimizer/executor version skew: [`TesseraError::UnsupportedStatement`],
///   [`TesseraError::UnsupportedPlanType`]
#[derive(Debug, Error)]
pub enum TesseraError {
    #[error("database '{database}' already exists")]
    DuplicateDatabase { database: String },

    #[error("database '{database}' not found")]
    DatabaseNotFound { database: String },

    #[error("table '{database}.{table}' already exists")]
    DuplicateTable { database: String, table: String },

    #[error("table '{database}.{table}' not found")]
    TableNotFound { database: String, table: String },

    #[error("column '{column}' is declared more than once in table '{table}'")]
    DuplicateColumn { table: String, column: String },

    /// A constraint references a column the table does not declare.
    #[error("constraint '{constraint}' on table '{table}' references unknown column '{column}'")]
    InvalidConstraint {
        table: String,
        constraint: String,
        column: String,
    },

    /// A chunk does not match its table's schema exactly.
    #[error("schema mismatch for table '{table}': {detail}")]
    SchemaMismatch { table: String, detail: String },

    /// Column resolution failed against the inferred schema of a plan node's children.
    #[error("column '{column}' not found while evaluating {plan}")]
    ColumnNotFound { column: String, plan: String },

    #[error("column reference '{column}' is ambiguous in {plan}")]
    AmbiguousColumn { column: String, plan: String },

    #[error("table '{table}' expects {expected} values per row, got {actual}")]
    ColumnCountMismatch {
        table: String,
        expected: usize,
        actual: usize,
    },

    #[error("type mismatch for column '{column}': expected {expected}, got {actual}")]
    TypeMismatch {
        column: String,
        expected: String,
        actual: String,
    },

    #[error("unsupported statement: {0}")]
    UnsupportedStatement(String),

    /// The executor received a plan node it cannot interpret.
    #[error("unsupported plan type: {0}")]
    UnsupportedPlanType(String),

    #[error("no database selected")]
    NoDatabaseSelected,

    /// Parse or statement-shape failures discovered before execution.
    #[error("planning error: {0}")]
    Planning(String),

    /// Runtime operator evaluation or batch-shape failures.
    #[error("execution error: {0}")]
    Execution(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Valid request for behavior intentionally left unimplemented.
    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Standard Tessera result alias.
pub type Result<T> = std::result::Result<T, TesseraError>;
