use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use arrow_schema::{DataType, Field, Schema, SchemaRef, TimeUnit};
use serde::{Deserialize, Serialize};
use tessera_common::{Result, TesseraError};

/// Primitive column type tags understood by the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColumnType {
    Int32,
    Int64,
    Float64,
    Utf8,
    Boolean,
    /// Microseconds since the Unix epoch, no time zone.
    Timestamp,
}

impl ColumnType {
    pub fn to_arrow(self) -> DataType {
        match self {
            ColumnType::Int32 => DataType::Int32,
            ColumnType::Int64 => DataType::Int64,
            ColumnType::Float64 => DataType::Float64,
            ColumnType::Utf8 => DataType::Utf8,
            ColumnType::Boolean => DataType::Boolean,
            ColumnType::Timestamp => DataType::Timestamp(TimeUnit::Microsecond, None),
        }
    }

    pub fn from_arrow(dt: &DataType) -> Option<Self> {
        match dt {
            DataType::Int32 => Some(ColumnType::Int32),
            DataType::Int64 => Some(ColumnType::Int64),
            DataType::Float64 => Some(ColumnType::Float64),
            DataType::Utf8 => Some(ColumnType::Utf8),
            DataType::Boolean => Some(ColumnType::Boolean),
            DataType::Timestamp(TimeUnit::Microsecond, None) => Some(ColumnType::Timestamp),
            _ => None,
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ColumnType::Int32 => "INT",
            ColumnType::Int64 => "BIGINT",
            ColumnType::Float64 => "DOUBLE",
            ColumnType::Utf8 => "TEXT",
            ColumnType::Boolean => "BOOLEAN",
            ColumnType::Timestamp => "TIMESTAMP",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMeta {
    /// Zero-based position within the table.
    pub id: u32,
    pub name: String,
    pub column_type: ColumnType,
    pub not_null: bool,
}

impl ColumnMeta {
    pub fn new(id: u32, name: impl Into<String>, column_type: ColumnType, not_null: bool) -> Self {
        Self {
            id,
            name: name.into(),
            column_type,
            not_null,
        }
    }

    pub fn to_field(&self) -> Field {
        Field::new(&self.name, self.column_type.to_arrow(), !self.not_null)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConstraintKind {
    Primary,
    Unique,
}

impl fmt::Display for ConstraintKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstraintKind::Primary => f.write_str("PRIMARY"),
            ConstraintKind::Unique => f.write_str("UNIQUE"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Constraint {
    pub name: String,
    pub kind: ConstraintKind,
    pub columns: Vec<String>,
}

/// Table metadata as stored in the catalog.
///
/// `chunk_count`, `created_at` and `updated_at` are maintained by the catalog;
/// values supplied by callers of `create_table` are overwritten.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableMeta {
    pub database: String,
    pub name: String,
    pub columns: Vec<ColumnMeta>,
    pub constraints: Vec<Constraint>,
    pub chunk_count: u64,
    /// Microseconds since the Unix epoch.
    pub created_at: i64,
    pub updated_at: i64,
}

impl TableMeta {
    pub fn new(
        database: impl Into<String>,
        name: impl Into<String>,
        columns: Vec<ColumnMeta>,
        constraints: Vec<Constraint>,
    ) -> Self {
        Self {
            database: database.into(),
            name: name.into(),
            columns,
            constraints,
            chunk_count: 0,
            created_at: 0,
            updated_at: 0,
        }
    }

    pub fn column(&self, name: &str) -> Option<&ColumnMeta> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Ordered (name, type) pairs exchanged with planner and executor.
    pub fn column_pairs(&self) -> Vec<(String, ColumnType)> {
        self.columns
            .iter()
            .map(|c| (c.name.clone(), c.column_type))
            .collect()
    }

    pub fn arrow_schema(&self) -> SchemaRef {
        Arc::new(Schema::new(
            self.columns.iter().map(ColumnMeta::to_field).collect::<Vec<_>>(),
        ))
    }

    /// Checks name uniqueness and constraint references, and renumbers column ids.
    ///
    /// PRIMARY KEY columns become NOT NULL.
    pub(crate) fn normalize(&mut self) -> Result<()> {
        let mut seen = HashSet::new();
        for c in &self.columns {
            if !seen.insert(c.name.as_str()) {
                return Err(TesseraError::DuplicateColumn {
                    table: self.name.clone(),
                    column: c.name.clone(),
                });
            }
        }
        if self.columns.is_empty() {
            return Err(TesseraError::Planning(format!(
                "table '{}' must declare at least one column",
                self.name
            )));
        }

        let positions: HashMap<String, usize> = self
            .columns
            .iter()
            .enumerate()
            .map(|(i, c)| (c.name.clone(), i))
            .collect();
        let mut primary_cols = Vec::new();
        for constraint in &self.constraints {
            for col in &constraint.columns {
                let Some(idx) = positions.get(col) else {
                    return Err(TesseraError::InvalidConstraint {
                        table: self.name.clone(),
                        constraint: constraint.name.clone(),
                        column: col.clone(),
                    });
                };
                if constraint.kind == ConstraintKind::Primary {
                    primary_cols.push(*idx);
                }
            }
        }
        if self
            .constraints
            .iter()
            .filter(|c| c.kind == ConstraintKind::Primary)
            .count()
            > 1
        {
            return Err(TesseraError::Planning(format!(
                "table '{}' declares more than one primary key",
                self.name
            )));
        }
        for idx in primary_cols {
            self.columns[idx].not_null = true;
        }
        for (i, c) in self.columns.iter_mut().enumerate() {
            c.id = i as u32;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn users() -> TableMeta {
        TableMeta::new(
            "default",
            "users",
            vec![
                ColumnMeta::new(0, "id", ColumnType::Int64, false),
                ColumnMeta::new(0, "name", ColumnType::Utf8, false),
            ],
            vec![Constraint {
                name: "users_pkey".to_string(),
                kind: ConstraintKind::Primary,
                columns: vec!["id".to_string()],
            }],
        )
    }

    #[test]
    fn normalize_renumbers_and_marks_primary_not_null() {
        let mut meta = users();
        meta.normalize().expect("normalize");
        assert_eq!(meta.columns[1].id, 1);
        assert!(meta.columns[0].not_null);
        assert!(!meta.columns[1].not_null);
    }

    #[test]
    fn unknown_constraint_column_is_rejected() {
        let mut meta = users();
        meta.constraints[0].columns = vec!["missing".to_string()];
        let err = meta.normalize().expect_err("invalid constraint");
        assert!(matches!(
            err,
            TesseraError::InvalidConstraint { ref column, .. } if column == "missing"
        ));
    }

    #[test]
    fn duplicate_column_is_rejected() {
        let mut meta = users();
        meta.columns.push(ColumnMeta::new(2, "id", ColumnType::Int32, false));
        assert!(matches!(
            meta.normalize(),
            Err(TesseraError::DuplicateColumn { .. })
        ));
    }

    #[test]
    fn arrow_schema_follows_column_order_and_nullability() {
        let mut meta = users();
        meta.normalize().expect("normalize");
        let schema = meta.arrow_schema();
        assert_eq!(schema.field(0).name(), "id");
        assert!(!schema.field(0).is_nullable());
        assert_eq!(schema.field(1).data_type(), &DataType::Utf8);
        assert!(schema.field(1).is_nullable());
    }
}
