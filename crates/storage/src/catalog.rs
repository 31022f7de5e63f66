use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};

use arrow::record_batch::RecordBatch;
use tessera_common::{ChunkId, EngineConfig, Result, TesseraError};
use tracing::{debug, info};

use crate::chunk::{Chunk, ChunkSet};
use crate::schema::TableMeta;
use crate::system_tables::{self, CatalogSnapshot, DatabaseSnapshot};

/// Shared registry of databases, tables and their chunk sets.
///
/// Structural changes (create/drop) take the registry write lock. Each table
/// serializes its own writers with a mutex and publishes chunk sets by
/// swapping an `Arc`, so readers never block on row data.
#[derive(Debug)]
pub struct Catalog {
    databases: RwLock<HashMap<String, DatabaseEntry>>,
    pub(crate) distinct_stats_max_rows: u64,
}

#[derive(Debug)]
struct DatabaseEntry {
    created_at: i64,
    tables: HashMap<String, Arc<TableEntry>>,
}

#[derive(Debug)]
struct TableEntry {
    meta: RwLock<TableMeta>,
    chunks: RwLock<Arc<ChunkSet>>,
    writer: Mutex<()>,
}

impl TableEntry {
    fn meta(&self) -> TableMeta {
        self.meta.read().expect("table meta lock poisoned").clone()
    }

    fn snapshot(&self) -> Arc<ChunkSet> {
        Arc::clone(&self.chunks.read().expect("chunk set lock poisoned"))
    }

    /// Swaps the chunk set while holding the meta lock, so `meta()` never
    /// reports a count for a set other than the published one.
    fn publish(&self, next: ChunkSet) {
        let mut meta = self.meta.write().expect("table meta lock poisoned");
        meta.chunk_count = next.len() as u64;
        meta.updated_at = now_micros();
        *self.chunks.write().expect("chunk set lock poisoned") = Arc::new(next);
    }
}

pub(crate) fn now_micros() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as i64)
        .unwrap_or_default()
}

impl Catalog {
    /// Creates a catalog holding one empty database named `default_database`.
    pub fn new(default_database: &str) -> Self {
        let cat = Self {
            databases: RwLock::new(HashMap::new()),
            distinct_stats_max_rows: EngineConfig::default().distinct_stats_max_rows,
        };
        cat.databases
            .write()
            .expect("catalog lock poisoned")
            .insert(default_database.to_string(), DatabaseEntry::new());
        cat
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        let mut cat = Self::new(&config.default_database);
        cat.distinct_stats_max_rows = config.distinct_stats_max_rows;
        cat
    }

    pub fn create_database(&self, name: &str) -> Result<()> {
        let mut dbs = self.databases.write().expect("catalog lock poisoned");
        if dbs.contains_key(name) {
            return Err(TesseraError::DuplicateDatabase {
                database: name.to_string(),
            });
        }
        dbs.insert(name.to_string(), DatabaseEntry::new());
        info!(database = name, "created database");
        Ok(())
    }

    /// Validates that `name` exists. Switching is the session's job.
    pub fn use_database(&self, name: &str) -> Result<()> {
        if self.database_exists(name) {
            Ok(())
        } else {
            Err(TesseraError::DatabaseNotFound {
                database: name.to_string(),
            })
        }
    }

    pub fn database_exists(&self, name: &str) -> bool {
        self.databases
            .read()
            .expect("catalog lock poisoned")
            .contains_key(name)
    }

    pub fn drop_database(&self, name: &str) -> Result<()> {
        let removed = self
            .databases
            .write()
            .expect("catalog lock poisoned")
            .remove(name);
        match removed {
            Some(entry) => {
                info!(database = name, tables = entry.tables.len(), "dropped database");
                Ok(())
            }
            None => Err(TesseraError::DatabaseNotFound {
                database: name.to_string(),
            }),
        }
    }

    pub fn list_databases(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .databases
            .read()
            .expect("catalog lock poisoned")
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    /// User tables of `database`, sorted by name. System tables are not listed.
    pub fn list_tables(&self, database: &str) -> Result<Vec<String>> {
        let dbs = self.databases.read().expect("catalog lock poisoned");
        let db = dbs
            .get(database)
            .ok_or_else(|| TesseraError::DatabaseNotFound {
                database: database.to_string(),
            })?;
        let mut names: Vec<String> = db.tables.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    /// Registers a new table and returns the stored metadata.
    pub fn create_table(&self, mut meta: TableMeta) -> Result<TableMeta> {
        if system_tables::is_system_table(&meta.name) {
            return Err(TesseraError::DuplicateTable {
                database: meta.database.clone(),
                table: meta.name.clone(),
            });
        }
        meta.normalize()?;
        let now = now_micros();
        meta.chunk_count = 0;
        meta.created_at = now;
        meta.updated_at = now;

        let mut dbs = self.databases.write().expect("catalog lock poisoned");
        let db = dbs
            .get_mut(&meta.database)
            .ok_or_else(|| TesseraError::DatabaseNotFound {
                database: meta.database.clone(),
            })?;
        if db.tables.contains_key(&meta.name) {
            return Err(TesseraError::DuplicateTable {
                database: meta.database.clone(),
                table: meta.name.clone(),
            });
        }
        db.tables.insert(
            meta.name.clone(),
            Arc::new(TableEntry {
                meta: RwLock::new(meta.clone()),
                chunks: RwLock::new(Arc::new(ChunkSet::default())),
                writer: Mutex::new(()),
            }),
        );
        info!(
            database = %meta.database,
            table = %meta.name,
            columns = meta.columns.len(),
            "created table"
        );
        Ok(meta)
    }

    /// Looks up table metadata. System tables resolve from any database.
    pub fn get_table(&self, database: &str, name: &str) -> Result<TableMeta> {
        if let Some(meta) = system_tables::system_table_meta(database, name) {
            return Ok(meta);
        }
        Ok(self.table_entry(database, name)?.meta())
    }

    pub fn drop_table(&self, database: &str, name: &str) -> Result<()> {
        if system_tables::is_system_table(name) {
            return Err(TesseraError::Unsupported(format!(
                "system table '{name}' cannot be dropped"
            )));
        }
        let mut dbs = self.databases.write().expect("catalog lock poisoned");
        let db = dbs
            .get_mut(database)
            .ok_or_else(|| TesseraError::DatabaseNotFound {
                database: database.to_string(),
            })?;
        match db.tables.remove(name) {
            Some(_) => {
                info!(database, table = name, "dropped table");
                Ok(())
            }
            None => Err(TesseraError::TableNotFound {
                database: database.to_string(),
                table: name.to_string(),
            }),
        }
    }

    /// Appends one chunk. The batch schema must match the table exactly.
    pub fn append_chunk(&self, database: &str, table: &str, batch: RecordBatch) -> Result<ChunkId> {
        let entry = self.writable_entry(database, table)?;
        let meta = entry.meta();
        check_batch_schema(&meta, &batch)?;

        let _guard = entry.writer.lock().expect("table writer lock poisoned");
        let current = entry.snapshot();
        let chunk = Chunk::new(batch);
        let id = chunk.id;
        let rows = chunk.num_rows();
        entry.publish(current.appended(chunk));
        debug!(database, table, chunk = %id, rows, "appended chunk");
        Ok(id)
    }

    /// Current chunk snapshot. System tables produce one generated chunk.
    pub fn chunk_snapshot(&self, database: &str, table: &str) -> Result<Arc<ChunkSet>> {
        if system_tables::is_system_table(table) {
            let batch = system_tables::build_system_batch(table, &self.snapshot())?;
            return Ok(Arc::new(ChunkSet {
                version: 0,
                chunks: vec![Arc::new(Chunk::new(batch))],
            }));
        }
        Ok(self.table_entry(database, table)?.snapshot())
    }

    /// Read-modify-replace under the table's writer lock.
    ///
    /// `f` receives the current chunk set and returns the successor's chunk
    /// list plus a value passed back to the caller. Nothing is published if
    /// `f` fails or a returned chunk does not match the table schema.
    pub fn replace_chunks<T, F>(&self, database: &str, table: &str, f: F) -> Result<T>
    where
        F: FnOnce(&TableMeta, &ChunkSet) -> Result<(Vec<Arc<Chunk>>, T)>,
    {
        let entry = self.writable_entry(database, table)?;
        let _guard = entry.writer.lock().expect("table writer lock poisoned");
        let meta = entry.meta();
        let current = entry.snapshot();
        let (chunks, out) = f(&meta, &current)?;
        for chunk in &chunks {
            check_batch_schema(&meta, &chunk.batch)?;
        }
        let next = current.successor(chunks);
        debug!(
            database,
            table,
            version = next.version,
            chunks = next.len(),
            "replaced chunk set"
        );
        entry.publish(next);
        Ok(out)
    }

    fn table_entry(&self, database: &str, name: &str) -> Result<Arc<TableEntry>> {
        let dbs = self.databases.read().expect("catalog lock poisoned");
        let db = dbs
            .get(database)
            .ok_or_else(|| TesseraError::DatabaseNotFound {
                database: database.to_string(),
            })?;
        db.tables
            .get(name)
            .cloned()
            .ok_or_else(|| TesseraError::TableNotFound {
                database: database.to_string(),
                table: name.to_string(),
            })
    }

    fn writable_entry(&self, database: &str, name: &str) -> Result<Arc<TableEntry>> {
        if system_tables::is_system_table(name) {
            return Err(TesseraError::Unsupported(format!(
                "system table '{name}' is read-only"
            )));
        }
        self.table_entry(database, name)
    }

    fn snapshot(&self) -> CatalogSnapshot {
        let dbs = self.databases.read().expect("catalog lock poisoned");
        let mut databases: Vec<DatabaseSnapshot> = dbs
            .iter()
            .map(|(name, db)| {
                let mut tables: Vec<TableMeta> = db.tables.values().map(|t| t.meta()).collect();
                tables.sort_by(|a, b| a.name.cmp(&b.name));
                DatabaseSnapshot {
                    name: name.clone(),
                    created_at: db.created_at,
                    tables,
                }
            })
            .collect();
        databases.sort_by(|a, b| a.name.cmp(&b.name));
        CatalogSnapshot { databases }
    }
}

impl DatabaseEntry {
    fn new() -> Self {
        Self {
            created_at: now_micros(),
            tables: HashMap::new(),
        }
    }
}

fn check_batch_schema(meta: &TableMeta, batch: &RecordBatch) -> Result<()> {
    let schema = batch.schema();
    if schema.fields().len() != meta.columns.len() {
        return Err(TesseraError::SchemaMismatch {
            table: meta.name.clone(),
            detail: format!(
                "expected {} columns, batch has {}",
                meta.columns.len(),
                schema.fields().len()
            ),
        });
    }
    for (field, col) in schema.fields().iter().zip(meta.columns.iter()) {
        let expected = col.column_type.to_arrow();
        if field.name() != &col.name || field.data_type() != &expected {
            return Err(TesseraError::SchemaMismatch {
                table: meta.name.clone(),
                detail: format!(
                    "column {} expected {} {:?}, batch has {} {:?}",
                    col.id,
                    col.name,
                    expected,
                    field.name(),
                    field.data_type()
                ),
            });
        }
        if field.is_nullable() == col.not_null {
            return Err(TesseraError::SchemaMismatch {
                table: meta.name.clone(),
                detail: format!(
                    "column {} expected nullable={}, batch has nullable={}",
                    col.name,
                    !col.not_null,
                    field.is_nullable()
                ),
            });
        }
    }
    Ok(())
}
