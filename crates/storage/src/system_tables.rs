//! Read-only catalog views generated from live metadata at scan time.

use arrow::record_batch::RecordBatch;
use tessera_common::{Result, TesseraError};

use crate::schema::{ColumnMeta, ColumnType, TableMeta};
use crate::value::{scalars_to_array, ScalarValue};

pub const SYS_DATABASES: &str = "sys_databases";
pub const SYS_TABLES: &str = "sys_tables";
pub const SYS_COLUMNS: &str = "sys_columns";

pub const SYSTEM_TABLES: [&str; 3] = [SYS_DATABASES, SYS_TABLES, SYS_COLUMNS];

pub fn is_system_table(name: &str) -> bool {
    SYSTEM_TABLES.contains(&name)
}

#[derive(Debug, Clone)]
pub(crate) struct DatabaseSnapshot {
    pub name: String,
    pub created_at: i64,
    pub tables: Vec<TableMeta>,
}

/// Consistent copy of catalog metadata taken under the registry read lock.
#[derive(Debug, Clone)]
pub(crate) struct CatalogSnapshot {
    pub databases: Vec<DatabaseSnapshot>,
}

fn columns(defs: &[(&str, ColumnType)]) -> Vec<ColumnMeta> {
    defs.iter()
        .enumerate()
        .map(|(i, (name, ty))| ColumnMeta::new(i as u32, *name, *ty, true))
        .collect()
}

/// Metadata for a system table, reported under whichever database asked.
pub fn system_table_meta(database: &str, name: &str) -> Option<TableMeta> {
    let cols = match name {
        SYS_DATABASES => columns(&[
            ("database_name", ColumnType::Utf8),
            ("created_at", ColumnType::Timestamp),
        ]),
        SYS_TABLES => columns(&[
            ("database_name", ColumnType::Utf8),
            ("table_name", ColumnType::Utf8),
            ("column_count", ColumnType::Int64),
            ("chunk_count", ColumnType::Int64),
            ("created_at", ColumnType::Timestamp),
            ("updated_at", ColumnType::Timestamp),
        ]),
        SYS_COLUMNS => columns(&[
            ("database_name", ColumnType::Utf8),
            ("table_name", ColumnType::Utf8),
            ("column_id", ColumnType::Int32),
            ("column_name", ColumnType::Utf8),
            ("data_type", ColumnType::Utf8),
            ("not_null", ColumnType::Boolean),
        ]),
        _ => return None,
    };
    Some(TableMeta::new(database, name, cols, Vec::new()))
}

pub(crate) fn build_system_batch(name: &str, snapshot: &CatalogSnapshot) -> Result<RecordBatch> {
    let meta = system_table_meta("", name)
        .ok_or_else(|| TesseraError::Execution(format!("'{name}' is not a system table")))?;
    let mut rows: Vec<Vec<ScalarValue>> = Vec::new();
    for db in &snapshot.databases {
        match name {
            SYS_DATABASES => rows.push(vec![
                ScalarValue::Utf8(db.name.clone()),
                ScalarValue::Int64(db.created_at),
            ]),
            SYS_TABLES => {
                for t in &db.tables {
                    rows.push(vec![
                        ScalarValue::Utf8(db.name.clone()),
                        ScalarValue::Utf8(t.name.clone()),
                        ScalarValue::Int64(t.columns.len() as i64),
                        ScalarValue::Int64(t.chunk_count as i64),
                        ScalarValue::Int64(t.created_at),
                        ScalarValue::Int64(t.updated_at),
                    ]);
                }
            }
            _ => {
                for t in &db.tables {
                    for c in &t.columns {
                        rows.push(vec![
                            ScalarValue::Utf8(db.name.clone()),
                            ScalarValue::Utf8(t.name.clone()),
                            ScalarValue::Int64(c.id as i64),
                            ScalarValue::Utf8(c.name.clone()),
                            ScalarValue::Utf8(c.column_type.to_string()),
                            ScalarValue::Boolean(c.not_null),
                        ]);
                    }
                }
            }
        }
    }

    let schema = meta.arrow_schema();
    let arrays = meta
        .columns
        .iter()
        .enumerate()
        .map(|(idx, col)| {
            let values: Vec<ScalarValue> = rows.iter().map(|r| r[idx].clone()).collect();
            scalars_to_array(&values, &col.column_type.to_arrow(), &col.name)
        })
        .collect::<Result<Vec<_>>>()?;
    RecordBatch::try_new(schema, arrays)
        .map_err(|e| TesseraError::Execution(format!("system table batch failed: {e}")))
}
