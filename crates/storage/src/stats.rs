use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::catalog::Catalog;
use crate::value::scalar_from_array;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableStatistics {
    pub row_count: u64,
    pub chunk_count: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnStatistics {
    pub distinct_count: u64,
}

/// Cardinality hooks consumed by the optimizer's hint passes.
///
/// Every method may return `None`; callers fall back to default strategies.
pub trait StatisticsProvider: Send + Sync {
    fn table_statistics(&self, database: &str, table: &str) -> Option<TableStatistics>;

    fn column_statistics(&self, database: &str, table: &str, column: &str)
        -> Option<ColumnStatistics>;
}

/// Provider that knows nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoStatistics;

impl StatisticsProvider for NoStatistics {
    fn table_statistics(&self, _database: &str, _table: &str) -> Option<TableStatistics> {
        None
    }

    fn column_statistics(
        &self,
        _database: &str,
        _table: &str,
        _column: &str,
    ) -> Option<ColumnStatistics> {
        None
    }
}

impl StatisticsProvider for Catalog {
    fn table_statistics(&self, database: &str, table: &str) -> Option<TableStatistics> {
        let snap = self.chunk_snapshot(database, table).ok()?;
        Some(TableStatistics {
            row_count: snap.row_count() as u64,
            chunk_count: snap.len() as u64,
        })
    }

    /// Exact distinct count, computed only for tables within the configured row limit.
    fn column_statistics(
        &self,
        database: &str,
        table: &str,
        column: &str,
    ) -> Option<ColumnStatistics> {
        let meta = self.get_table(database, table).ok()?;
        let idx = meta.column_index(column)?;
        let snap = self.chunk_snapshot(database, table).ok()?;
        if snap.row_count() as u64 > self.distinct_stats_max_rows {
            return None;
        }
        let mut seen = HashSet::new();
        for chunk in &snap.chunks {
            let array = chunk.batch.column(idx);
            for row in 0..chunk.num_rows() {
                seen.insert(scalar_from_array(array, row).ok()?);
            }
        }
        Some(ColumnStatistics {
            distinct_count: seen.len() as u64,
        })
    }
}
