use tessera_client::{Engine, EngineConfig, ScalarValue, TesseraError};

fn engine() -> Engine {
    Engine::new(EngineConfig::default()).expect("engine")
}

fn text(v: &str) -> ScalarValue {
    ScalarValue::Utf8(v.to_string())
}

#[test]
fn use_switches_the_connection_database() {
    let engine = engine();
    assert_eq!(engine.current_database().as_deref(), Some("default"));
    engine
        .sql("CREATE DATABASE analytics; USE analytics; CREATE TABLE events (id BIGINT)")
        .expect("ddl");
    assert_eq!(engine.current_database().as_deref(), Some("analytics"));
    assert_eq!(engine.list_tables().expect("tables"), vec!["events"]);

    engine.use_database("default").expect("use default");
    assert!(engine.list_tables().expect("tables").is_empty());
    let rows = engine
        .query("SELECT COUNT(*) FROM analytics.events")
        .expect("qualified")
        .rows()
        .expect("rows");
    assert_eq!(rows, vec![vec![ScalarValue::Int64(0)]]);
}

#[test]
fn unknown_database_is_reported_and_state_kept() {
    let engine = engine();
    let err = engine.use_database("nowhere").expect_err("missing");
    assert!(matches!(err, TesseraError::DatabaseNotFound { ref database } if database == "nowhere"));
    let err = engine.query("USE nowhere").expect_err("missing");
    assert!(matches!(err, TesseraError::DatabaseNotFound { .. }));
    assert_eq!(engine.current_database().as_deref(), Some("default"));
}

#[test]
fn connections_keep_their_own_current_database() {
    let engine = engine();
    engine.create_database("sales").expect("create");
    let other = engine.connect();
    other.use_database("sales").expect("use");
    other.query("CREATE TABLE deals (id BIGINT)").expect("create table");

    assert_eq!(engine.current_database().as_deref(), Some("default"));
    assert_eq!(other.current_database().as_deref(), Some("sales"));
    let err = engine.query("SELECT id FROM deals").expect_err("not in default");
    assert!(matches!(err, TesseraError::TableNotFound { .. }));
    assert!(engine.query("SELECT id FROM sales.deals").is_ok());
}

#[test]
fn if_exists_clauses_suppress_errors() {
    let engine = engine();
    engine.query("CREATE TABLE t (v INT)").expect("create");
    let err = engine.query("CREATE TABLE t (v INT)").expect_err("dup");
    assert!(matches!(err, TesseraError::DuplicateTable { .. }));
    engine
        .query("CREATE TABLE IF NOT EXISTS t (v INT)")
        .expect("if not exists");

    engine.query("DROP TABLE t").expect("drop");
    let err = engine.query("DROP TABLE t").expect_err("gone");
    assert!(matches!(err, TesseraError::TableNotFound { .. }));
    engine.query("DROP TABLE IF EXISTS t").expect("if exists");

    engine.query("CREATE DATABASE d").expect("create db");
    let err = engine.query("CREATE DATABASE d").expect_err("dup db");
    assert!(matches!(err, TesseraError::DuplicateDatabase { .. }));
    engine
        .query("CREATE DATABASE IF NOT EXISTS d")
        .expect("if not exists db");
}

#[test]
fn dropping_the_current_database_clears_it() {
    let engine = engine();
    engine.sql("CREATE DATABASE scratch; USE scratch").expect("ddl");
    engine.query("DROP DATABASE scratch").expect("drop");
    assert_eq!(engine.current_database(), None);
    let err = engine.query("SELECT v FROM t").expect_err("no database");
    assert!(matches!(err, TesseraError::NoDatabaseSelected));
    assert!(!engine.list_databases().contains(&"scratch".to_string()));
}

#[test]
fn duplicate_column_and_bad_constraint_are_rejected() {
    let engine = engine();
    let err = engine
        .query("CREATE TABLE t (a INT, a INT)")
        .expect_err("dup column");
    assert!(matches!(err, TesseraError::DuplicateColumn { .. }));
    let err = engine
        .query("CREATE TABLE t (a INT, PRIMARY KEY (b))")
        .expect_err("bad constraint");
    assert!(matches!(err, TesseraError::InvalidConstraint { .. }));
}

#[test]
fn system_tables_reflect_live_metadata() {
    let engine = engine();
    engine
        .sql(
            "CREATE TABLE users (id BIGINT NOT NULL, name TEXT);
             INSERT INTO users VALUES (1, 'ann');
             INSERT INTO users VALUES (2, 'bob');",
        )
        .expect("fixture");

    let tables = engine
        .query("SELECT table_name, column_count, chunk_count FROM sys_tables WHERE database_name = 'default'")
        .expect("sys_tables")
        .rows()
        .expect("rows");
    assert_eq!(
        tables,
        vec![vec![text("users"), ScalarValue::Int64(2), ScalarValue::Int64(2)]]
    );

    let columns = engine
        .query("SELECT column_name, data_type, not_null FROM sys_columns WHERE table_name = 'users'")
        .expect("sys_columns")
        .rows()
        .expect("rows");
    assert_eq!(columns.len(), 2);
    assert_eq!(columns[0][0], text("id"));
    assert_eq!(columns[0][2], ScalarValue::Boolean(true));
    assert_eq!(columns[1][2], ScalarValue::Boolean(false));

    engine.create_database("extra").expect("create");
    let dbs = engine
        .query("SELECT database_name FROM sys_databases")
        .expect("sys_databases")
        .rows()
        .expect("rows");
    assert!(dbs.contains(&vec![text("extra")]));
    assert!(dbs.contains(&vec![text("default")]));

    let err = engine.query("DROP TABLE sys_tables").expect_err("system");
    assert!(matches!(err, TesseraError::Unsupported(_)));
    let err = engine
        .query("CREATE TABLE sys_columns (x INT)")
        .expect_err("reserved");
    assert!(matches!(err, TesseraError::DuplicateTable { .. }));
}
