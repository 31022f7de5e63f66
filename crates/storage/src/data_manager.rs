use std::sync::Arc;

use arrow::array::{Array, ArrayRef};
use arrow::record_batch::RecordBatch;
use tessera_common::{ChunkId, Result, TesseraError};
use tracing::debug;

use crate::catalog::Catalog;
use crate::chunk::{Chunk, ChunkSet};
use crate::schema::{ColumnType, TableMeta};
use crate::value::{scalars_to_array, ScalarValue};

/// Row-data front end over the catalog: inserts, scans and chunk replacement.
#[derive(Debug, Clone)]
pub struct DataManager {
    catalog: Arc<Catalog>,
}

impl DataManager {
    pub fn new(catalog: Arc<Catalog>) -> Self {
        Self { catalog }
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    /// Ordered (name, type) pairs of `table`.
    pub fn table_schema(&self, database: &str, table: &str) -> Result<Vec<(String, ColumnType)>> {
        Ok(self.catalog.get_table(database, table)?.column_pairs())
    }

    /// Builds one chunk from `rows` and appends it. Returns rows inserted.
    ///
    /// An empty `columns` list targets every table column in order. Omitted
    /// columns are filled with NULL.
    pub fn insert_data(
        &self,
        database: &str,
        table: &str,
        columns: &[String],
        rows: &[Vec<ScalarValue>],
    ) -> Result<usize> {
        let meta = self.catalog.get_table(database, table)?;
        let batch = build_batch(&meta, columns, rows)?;
        if batch.num_rows() == 0 {
            return Ok(0);
        }
        let n = batch.num_rows();
        self.append_batch(database, table, batch)?;
        Ok(n)
    }

    pub fn append_batch(&self, database: &str, table: &str, batch: RecordBatch) -> Result<ChunkId> {
        self.catalog.append_chunk(database, table, batch)
    }

    /// Fresh scan over the current chunk snapshot. Every call starts at the
    /// first chunk.
    pub fn scan(&self, database: &str, table: &str) -> Result<ChunkScan> {
        let snapshot = self.catalog.chunk_snapshot(database, table)?;
        debug!(
            database,
            table,
            version = snapshot.version,
            chunks = snapshot.len(),
            "opened chunk scan"
        );
        Ok(ChunkScan { snapshot, next: 0 })
    }

    pub fn replace_chunks<T, F>(&self, database: &str, table: &str, f: F) -> Result<T>
    where
        F: FnOnce(&TableMeta, &ChunkSet) -> Result<(Vec<Arc<Chunk>>, T)>,
    {
        self.catalog.replace_chunks(database, table, f)
    }
}

/// Lazy iterator over one chunk-set snapshot.
#[derive(Debug, Clone)]
pub struct ChunkScan {
    snapshot: Arc<ChunkSet>,
    next: usize,
}

impl ChunkScan {
    pub fn snapshot(&self) -> &Arc<ChunkSet> {
        &self.snapshot
    }
}

impl Iterator for ChunkScan {
    type Item = RecordBatch;

    fn next(&mut self) -> Option<Self::Item> {
        let chunk = self.snapshot.chunks.get(self.next)?;
        self.next += 1;
        Some(chunk.batch.clone())
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.snapshot.len().saturating_sub(self.next);
        (left, Some(left))
    }
}

/// Validates arity, types and NOT NULL, and builds a batch in table column order.
pub fn build_batch(
    meta: &TableMeta,
    columns: &[String],
    rows: &[Vec<ScalarValue>],
) -> Result<RecordBatch> {
    let targets: Vec<usize> = if columns.is_empty() {
        (0..meta.columns.len()).collect()
    } else {
        columns
            .iter()
            .map(|name| {
                meta.column_index(name)
                    .ok_or_else(|| TesseraError::ColumnNotFound {
                        column: name.clone(),
                        plan: "InsertPlan".to_string(),
                    })
            })
            .collect::<Result<_>>()?
    };
    for (i, t) in targets.iter().enumerate() {
        if targets[..i].contains(t) {
            return Err(TesseraError::DuplicateColumn {
                table: meta.name.clone(),
                column: meta.columns[*t].name.clone(),
            });
        }
    }
    for row in rows {
        if row.len() != targets.len() {
            return Err(TesseraError::ColumnCountMismatch {
                table: meta.name.clone(),
                expected: targets.len(),
                actual: row.len(),
            });
        }
    }

    let mut arrays: Vec<ArrayRef> = Vec::with_capacity(meta.columns.len());
    for (col_idx, col) in meta.columns.iter().enumerate() {
        let values: Vec<ScalarValue> = match targets.iter().position(|t| *t == col_idx) {
            Some(pos) => rows.iter().map(|r| r[pos].clone()).collect(),
            None => vec![ScalarValue::Null; rows.len()],
        };
        let array = scalars_to_array(&values, &col.column_type.to_arrow(), &col.name)?;
        if col.not_null && array.null_count() > 0 {
            return Err(TesseraError::TypeMismatch {
                column: col.name.clone(),
                expected: format!("non-null {}", col.column_type),
                actual: "Null".to_string(),
            });
        }
        arrays.push(array);
    }
    RecordBatch::try_new(meta.arrow_schema(), arrays).map_err(|e| TesseraError::SchemaMismatch {
        table: meta.name.clone(),
        detail: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use arrow::array::{Array, Int64Array, StringArray};
    use tessera_common::TesseraError;

    use super::DataManager;
    use crate::catalog::Catalog;
    use crate::schema::{ColumnMeta, ColumnType, TableMeta};
    use crate::value::ScalarValue;

    fn manager() -> DataManager {
        let cat = Arc::new(Catalog::new("default"));
        cat.create_table(TableMeta::new(
            "default",
            "users",
            vec![
                ColumnMeta::new(0, "id", ColumnType::Int64, true),
                ColumnMeta::new(1, "name", ColumnType::Utf8, false),
            ],
            vec![],
        ))
        .expect("create");
        DataManager::new(cat)
    }

    fn cols(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn insert_then_scan_yields_the_row() {
        let dm = manager();
        let n = dm
            .insert_data(
                "default",
                "users",
                &cols(&["id", "name"]),
                &[vec![ScalarValue::Int64(1), ScalarValue::Utf8("test".into())]],
            )
            .expect("insert");
        assert_eq!(n, 1);

        let batches: Vec<_> = dm.scan("default", "users").expect("scan").collect();
        assert_eq!(batches.len(), 1);
        let ids = batches[0]
            .column(0)
            .as_any()
            .downcast_ref::<Int64Array>()
            .expect("ids");
        let names = batches[0]
            .column(1)
            .as_any()
            .downcast_ref::<StringArray>()
            .expect("names");
        assert_eq!(ids.value(0), 1);
        assert_eq!(names.value(0), "test");
    }

    #[test]
    fn omitted_nullable_columns_are_null() {
        let dm = manager();
        dm.insert_data("default", "users", &cols(&["id"]), &[vec![ScalarValue::Int64(7)]])
            .expect("insert");
        let batch = dm.scan("default", "users").expect("scan").next().expect("chunk");
        assert!(batch.column(1).is_null(0));
    }

    #[test]
    fn omitted_not_null_column_is_a_type_mismatch() {
        let dm = manager();
        let err = dm
            .insert_data(
                "default",
                "users",
                &cols(&["name"]),
                &[vec![ScalarValue::Utf8("x".into())]],
            )
            .expect_err("id is NOT NULL");
        assert!(matches!(err, TesseraError::TypeMismatch { ref column, .. } if column == "id"));
    }

    #[test]
    fn arity_and_unknown_columns_are_rejected() {
        let dm = manager();
        let err = dm
            .insert_data("default", "users", &[], &[vec![ScalarValue::Int64(1)]])
            .expect_err("arity");
        assert!(matches!(
            err,
            TesseraError::ColumnCountMismatch {
                expected: 2,
                actual: 1,
                ..
            }
        ));
        let err = dm
            .insert_data("default", "users", &cols(&["email"]), &[vec![ScalarValue::Null]])
            .expect_err("unknown column");
        assert!(matches!(err, TesseraError::ColumnNotFound { .. }));
    }

    #[test]
    fn scans_restart_from_the_first_chunk() {
        let dm = manager();
        for i in 0..3 {
            dm.insert_data(
                "default",
                "users",
                &cols(&["id"]),
                &[vec![ScalarValue::Int64(i)]],
            )
            .expect("insert");
        }
        let mut first = dm.scan("default", "users").expect("scan");
        assert!(first.next().is_some());
        assert!(first.next().is_some());
        let second = dm.scan("default", "users").expect("scan");
        assert_eq!(second.count(), 3);
        assert_eq!(first.count(), 1);
    }
}
