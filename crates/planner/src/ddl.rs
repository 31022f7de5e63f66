use sqlparser::ast::{
    ColumnDef, ColumnOption, CreateTable, DataType as SqlDataType, ObjectType, Statement,
    TableConstraint,
};
use tessera_common::{Result, SessionState, TesseraError};
use tessera_storage::{ColumnMeta, ColumnType, Constraint, ConstraintKind, TableMeta};

use crate::sql_frontend::split_object_name;

/// Catalog change requested by a DDL statement. Applied by the caller, not
/// executed as a plan.
#[derive(Debug, Clone, PartialEq)]
pub enum DdlCommand {
    CreateDatabase {
        name: String,
        if_not_exists: bool,
    },
    DropDatabase {
        name: String,
        if_exists: bool,
    },
    CreateTable {
        meta: TableMeta,
        if_not_exists: bool,
    },
    DropTable {
        database: String,
        table: String,
        if_exists: bool,
    },
}

/// Returns `Ok(None)` for statements that are not DDL.
pub fn statement_to_ddl(stmt: &Statement, session: &SessionState) -> Result<Option<DdlCommand>> {
    match stmt {
        Statement::CreateDatabase {
            db_name,
            if_not_exists,
            ..
        } => Ok(Some(DdlCommand::CreateDatabase {
            name: db_name.to_string(),
            if_not_exists: *if_not_exists,
        })),
        Statement::CreateTable(ct) => create_table(ct, session).map(Some),
        Statement::Drop {
            object_type,
            if_exists,
            names,
            ..
        } => {
            let [name] = names.as_slice() else {
                return Err(TesseraError::UnsupportedStatement(
                    "DROP supports exactly one object".to_string(),
                ));
            };
            match object_type {
                ObjectType::Table => {
                    let (database, table) = split_object_name(name)?;
                    let database = session.resolve_database(database.as_deref())?.to_string();
                    Ok(Some(DdlCommand::DropTable {
                        database,
                        table,
                        if_exists: *if_exists,
                    }))
                }
                other if *other == ObjectType::Schema || other.to_string() == "DATABASE" => {
                    Ok(Some(DdlCommand::DropDatabase {
                        name: name.to_string(),
                        if_exists: *if_exists,
                    }))
                }
                other => Err(TesseraError::UnsupportedStatement(format!("DROP {other}"))),
            }
        }
        _ => Ok(None),
    }
}

fn create_table(ct: &CreateTable, session: &SessionState) -> Result<DdlCommand> {
    let (database, table) = split_object_name(&ct.name)?;
    let database = session.resolve_database(database.as_deref())?.to_string();

    let mut columns = Vec::with_capacity(ct.columns.len());
    let mut constraints = Vec::new();
    for (i, def) in ct.columns.iter().enumerate() {
        columns.push(column_meta(i as u32, def)?);
        for opt in &def.options {
            if let ColumnOption::Unique { is_primary, .. } = &opt.option {
                constraints.push(Constraint {
                    name: opt
                        .name
                        .as_ref()
                        .map(|n| n.value.clone())
                        .unwrap_or_else(|| {
                            default_constraint_name(&table, &def.name.value, *is_primary)
                        }),
                    kind: if *is_primary {
                        ConstraintKind::Primary
                    } else {
                        ConstraintKind::Unique
                    },
                    columns: vec![def.name.value.clone()],
                });
            }
        }
    }
    for tc in &ct.constraints {
        let (name, kind, cols) = match tc {
            TableConstraint::PrimaryKey { name, columns, .. } => {
                (name, ConstraintKind::Primary, columns)
            }
            TableConstraint::Unique { name, columns, .. } => {
                (name, ConstraintKind::Unique, columns)
            }
            other => {
                return Err(TesseraError::UnsupportedStatement(format!(
                    "unsupported table constraint: {other}"
                )))
            }
        };
        let cols: Vec<String> = cols.iter().map(|c| c.value.clone()).collect();
        let name = name.as_ref().map(|n| n.value.clone()).unwrap_or_else(|| {
            default_constraint_name(&table, &cols.join("_"), kind == ConstraintKind::Primary)
        });
        constraints.push(Constraint {
            name,
            kind,
            columns: cols,
        });
    }

    Ok(DdlCommand::CreateTable {
        meta: TableMeta::new(database, table, columns, constraints),
        if_not_exists: ct.if_not_exists,
    })
}

fn default_constraint_name(table: &str, columns: &str, primary: bool) -> String {
    if primary {
        format!("{table}_pkey")
    } else {
        format!("{table}_{columns}_key")
    }
}

fn column_meta(id: u32, def: &ColumnDef) -> Result<ColumnMeta> {
    let not_null = def
        .options
        .iter()
        .any(|o| matches!(o.option, ColumnOption::NotNull));
    Ok(ColumnMeta::new(
        id,
        def.name.value.clone(),
        column_type(&def.data_type)?,
        not_null,
    ))
}

/// Maps a SQL type name onto a catalog type tag.
pub fn column_type(dt: &SqlDataType) -> Result<ColumnType> {
    let name = dt.to_string().to_ascii_uppercase();
    const PREFIXES: [(&str, ColumnType); 16] = [
        ("BIGINT", ColumnType::Int64),
        ("INT8", ColumnType::Int64),
        ("INT64", ColumnType::Int64),
        ("INT", ColumnType::Int32),
        ("SMALLINT", ColumnType::Int32),
        ("TINYINT", ColumnType::Int32),
        ("DOUBLE", ColumnType::Float64),
        ("FLOAT", ColumnType::Float64),
        ("REAL", ColumnType::Float64),
        ("DECIMAL", ColumnType::Float64),
        ("NUMERIC", ColumnType::Float64),
        ("VARCHAR", ColumnType::Utf8),
        ("CHAR", ColumnType::Utf8),
        ("TEXT", ColumnType::Utf8),
        ("BOOL", ColumnType::Boolean),
        ("TIMESTAMP", ColumnType::Timestamp),
    ];
    if name.starts_with("STRING") || name.starts_with("CHARACTER") {
        return Ok(ColumnType::Utf8);
    }
    if name.starts_with("DATETIME") {
        return Ok(ColumnType::Timestamp);
    }
    PREFIXES
        .iter()
        .find(|(p, _)| name.starts_with(p))
        .map(|(_, t)| *t)
        .ok_or_else(|| TesseraError::Unsupported(format!("unsupported column type: {name}")))
}

#[cfg(test)]
mod tests {
    use tessera_common::{SessionState, TesseraError};
    use tessera_storage::{ColumnType, ConstraintKind};

    use super::{statement_to_ddl, DdlCommand};

    fn ddl(sql: &str, session: &SessionState) -> tessera_common::Result<Option<DdlCommand>> {
        let stmt = tessera_sql::parse_statement(sql).expect("parse");
        statement_to_ddl(&stmt, session)
    }

    #[test]
    fn create_table_maps_types_and_constraints() {
        let session = SessionState::with_database("default");
        let cmd = ddl(
            "CREATE TABLE users (id BIGINT PRIMARY KEY, name VARCHAR(32) NOT NULL, \
             age INT, score DOUBLE, active BOOLEAN, seen TIMESTAMP, UNIQUE (name))",
            &session,
        )
        .expect("ddl")
        .expect("is ddl");
        let DdlCommand::CreateTable { meta, if_not_exists } = cmd else {
            panic!("create table");
        };
        assert!(!if_not_exists);
        assert_eq!(meta.database, "default");
        let types: Vec<ColumnType> = meta.columns.iter().map(|c| c.column_type).collect();
        assert_eq!(
            types,
            vec![
                ColumnType::Int64,
                ColumnType::Utf8,
                ColumnType::Int32,
                ColumnType::Float64,
                ColumnType::Boolean,
                ColumnType::Timestamp,
            ]
        );
        assert!(meta.columns[1].not_null);
        assert_eq!(meta.constraints.len(), 2);
        assert_eq!(meta.constraints[0].kind, ConstraintKind::Primary);
        assert_eq!(meta.constraints[0].name, "users_pkey");
        assert_eq!(meta.constraints[1].columns, vec!["name"]);
    }

    #[test]
    fn qualified_names_pick_their_database() {
        let session = SessionState::default();
        let cmd = ddl("DROP TABLE IF EXISTS analytics.events", &session)
            .expect("ddl")
            .expect("is ddl");
        assert_eq!(
            cmd,
            DdlCommand::DropTable {
                database: "analytics".to_string(),
                table: "events".to_string(),
                if_exists: true,
            }
        );
    }

    #[test]
    fn unqualified_table_needs_a_database() {
        let err = ddl("CREATE TABLE t (a INT)", &SessionState::default()).expect_err("no db");
        assert!(matches!(err, TesseraError::NoDatabaseSelected));
    }

    #[test]
    fn queries_are_not_ddl() {
        let session = SessionState::with_database("default");
        assert!(ddl("SELECT 1", &session).expect("ok").is_none());
    }
}
