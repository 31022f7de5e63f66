use crate::error::{Result, TesseraError};

/// Connection-scoped state read by the optimizer and executor.
///
/// Owned and changed only by the client session layer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    database: Option<String>,
}

impl SessionState {
    pub fn new(database: Option<String>) -> Self {
        Self { database }
    }

    pub fn with_database(database: impl Into<String>) -> Self {
        Self {
            database: Some(database.into()),
        }
    }

    pub fn current_database(&self) -> Option<&str> {
        self.database.as_deref()
    }

    /// Resolves the database for a table reference, preferring an explicit qualifier.
    pub fn resolve_database<'a>(&'a self, explicit: Option<&'a str>) -> Result<&'a str> {
        explicit
            .or(self.database.as_deref())
            .ok_or(TesseraError::NoDatabaseSelected)
    }

    /// Switches the current database. Callers validate existence against the catalog first.
    pub fn use_database(&mut self, database: impl Into<String>) {
        self.database = Some(database.into());
    }
}
