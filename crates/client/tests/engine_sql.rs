use std::sync::Arc;

use tessera_client::{Engine, EngineConfig, QueryResult, Result, ScalarValue, TesseraError};
use tessera_planner::{
    transform_up, JoinStrategy, LogicalPlan, OptimizerContext, OptimizerRule, PlanProperties,
};
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn engine() -> Engine {
    init_tracing();
    let engine = Engine::new(EngineConfig::default()).expect("engine");
    engine
        .sql(
            "CREATE TABLE users (id BIGINT NOT NULL PRIMARY KEY, name TEXT NOT NULL, age INT, dept TEXT);
             CREATE TABLE orders (order_id BIGINT NOT NULL, user_id BIGINT, total DOUBLE);
             INSERT INTO users VALUES (1, 'ann', 17, 'eng'), (2, 'bob', 18, 'ops'), (3, 'cid', NULL, 'eng');
             INSERT INTO users (id, name, age) VALUES (4, 'dee', 40);
             INSERT INTO orders VALUES (10, 1, 5.0), (11, 2, 20.0), (12, 1, 7.5), (13, 9, 1.0);",
        )
        .expect("fixture");
    engine
}

fn int(v: i64) -> ScalarValue {
    ScalarValue::Int64(v)
}

fn text(v: &str) -> ScalarValue {
    ScalarValue::Utf8(v.to_string())
}

fn rows(result: &QueryResult) -> Vec<Vec<ScalarValue>> {
    result.rows().expect("rows")
}

#[test]
fn ddl_and_insert_report_their_results() {
    let engine = Engine::new(EngineConfig::default()).expect("engine");
    let results = engine
        .sql("CREATE TABLE t (v INT); INSERT INTO t VALUES (1), (2), (3)")
        .expect("sql");
    assert_eq!(results.len(), 2);
    assert!(results[0].headers.is_empty());
    assert_eq!(results[0].num_rows(), 0);
    assert_eq!(results[1].headers, vec!["rows_affected"]);
    assert_eq!(results[1].rows_affected(), Some(3));
}

#[test]
fn filter_and_projection_use_aliases() {
    let engine = engine();
    let result = engine
        .query("SELECT name AS who, age FROM users WHERE age >= 18")
        .expect("query");
    assert_eq!(result.headers, vec!["who", "age"]);
    assert_eq!(
        rows(&result),
        vec![vec![text("bob"), int(18)], vec![text("dee"), int(40)]]
    );
}

#[test]
fn join_emits_matches_in_probe_order() {
    let engine = engine();
    let result = engine
        .query(
            "SELECT u.name, o.total FROM users u JOIN orders o ON u.id = o.user_id",
        )
        .expect("join");
    assert_eq!(result.headers, vec!["name", "total"]);
    assert_eq!(
        rows(&result),
        vec![
            vec![text("ann"), ScalarValue::float(5.0)],
            vec![text("bob"), ScalarValue::float(20.0)],
            vec![text("ann"), ScalarValue::float(7.5)],
        ]
    );
}

#[test]
fn group_by_with_having_keeps_first_seen_order() {
    let engine = engine();
    let result = engine
        .query("SELECT dept, COUNT(*) FROM users GROUP BY dept HAVING COUNT(*) >= 1")
        .expect("group");
    assert_eq!(result.headers, vec!["dept", "COUNT(*)"]);
    assert_eq!(
        rows(&result),
        vec![
            vec![text("eng"), int(2)],
            vec![text("ops"), int(1)],
            vec![ScalarValue::Null, int(1)],
        ]
    );
}

#[test]
fn order_by_and_limit_page_through_rows() {
    let engine = engine();
    let result = engine
        .query("SELECT id FROM users ORDER BY age DESC LIMIT 2 OFFSET 1")
        .expect("order");
    // DESC puts the NULL age first.
    assert_eq!(rows(&result), vec![vec![int(4)], vec![int(2)]]);
}

#[test]
fn update_and_delete_count_affected_rows() {
    let engine = engine();
    let updated = engine
        .query("UPDATE users SET age = age + 1 WHERE dept = 'eng'")
        .expect("update");
    assert_eq!(updated.rows_affected(), Some(2));

    let ages = engine
        .query("SELECT age FROM users WHERE dept = 'eng'")
        .expect("select");
    assert_eq!(rows(&ages), vec![vec![int(18)], vec![ScalarValue::Null]]);

    let deleted = engine
        .query("DELETE FROM users WHERE age IS NULL")
        .expect("delete");
    assert_eq!(deleted.rows_affected(), Some(1));
    let count = engine.query("SELECT COUNT(*) FROM users").expect("count");
    assert_eq!(rows(&count), vec![vec![int(3)]]);
}

#[test]
fn failing_statement_stops_the_batch() {
    let engine = engine();
    let err = engine
        .sql("INSERT INTO users (id, name) VALUES (5, 'eve'); SELECT nope FROM users; INSERT INTO users (id, name) VALUES (6, 'fay')")
        .expect_err("unknown column");
    assert!(matches!(err, TesseraError::ColumnNotFound { ref column, .. } if column == "nope"));
    let count = engine.query("SELECT COUNT(*) FROM users").expect("count");
    assert_eq!(rows(&count), vec![vec![int(5)]]);
}

#[test]
fn insert_validates_arity_and_not_null() {
    let engine = engine();
    let err = engine
        .query("INSERT INTO users VALUES (7, 'gus')")
        .expect_err("arity");
    assert!(matches!(err, TesseraError::ColumnCountMismatch { .. }));
    let err = engine
        .query("INSERT INTO users (id) VALUES (8)")
        .expect_err("not null");
    assert!(matches!(err, TesseraError::TypeMismatch { .. }));
}

#[test]
fn explain_and_output_schema_do_not_execute() {
    let engine = engine();
    let text = engine
        .explain("SELECT u.name FROM users u JOIN orders o ON u.id = o.user_id")
        .expect("explain");
    assert!(text.contains("SelectPlan"), "{text}");
    assert!(text.contains("JoinPlan type=INNER"), "{text}");
    assert!(text.contains("TableScanPlan table=orders alias=o"), "{text}");

    let schema = engine
        .output_schema("SELECT dept, AVG(age) FROM users GROUP BY dept")
        .expect("schema");
    assert_eq!(schema.names(), vec!["dept", "AVG(age)"]);
    assert_eq!(
        engine.query("SELECT COUNT(*) FROM orders").expect("count").rows_affected(),
        None
    );
}

#[test]
fn parse_errors_surface_as_planning_errors() {
    let engine = engine();
    let err = engine.query("SELEC id FROM users").expect_err("parse");
    assert!(matches!(err, TesseraError::Planning(_)));
}

#[test]
fn statements_are_counted_in_prometheus_text() {
    let engine = engine();
    engine.query("SELECT id FROM users").expect("select");
    let _ = engine.query("SELECT missing FROM users");
    let text = engine.prometheus_metrics();
    assert!(text.contains("tessera_statements_total"), "{text}");
    assert!(text.contains("kind=\"select\""), "{text}");
    assert!(text.contains("tessera_statement_errors_total"), "{text}");
    assert!(text.contains("tessera_operator_rows_out_total"), "{text}");
}

#[test]
fn small_batch_size_splits_materialized_output() {
    init_tracing();
    let config = EngineConfig {
        batch_size_rows: 2,
        ..EngineConfig::default()
    };
    let engine = Engine::new(config).expect("engine");
    engine
        .sql("CREATE TABLE n (v BIGINT); INSERT INTO n VALUES (5), (3), (4), (1), (2)")
        .expect("fixture");
    let result = engine.query("SELECT v FROM n ORDER BY v").expect("order");
    assert_eq!(result.batches.len(), 3);
    assert_eq!(
        rows(&result),
        (1..=5).map(|v| vec![int(v)]).collect::<Vec<_>>()
    );
}

#[test]
fn invalid_config_is_rejected() {
    let config = EngineConfig {
        batch_size_rows: 0,
        ..EngineConfig::default()
    };
    assert!(matches!(
        Engine::new(config),
        Err(TesseraError::InvalidConfig(_))
    ));
}

struct ForceNestedLoop;

impl OptimizerRule for ForceNestedLoop {
    fn name(&self) -> &str {
        "force_nested_loop"
    }

    fn rewrite(&self, plan: LogicalPlan, _ctx: &OptimizerContext<'_>) -> Result<LogicalPlan> {
        transform_up(plan, &|mut p| {
            if let PlanProperties::Join(j) = &mut p.properties {
                j.strategy = JoinStrategy::NestedLoop;
            }
            Ok(p)
        })
    }
}

#[test]
fn registered_rules_change_strategy_but_not_rows() {
    let engine = engine();
    let sql = "SELECT u.name, o.order_id FROM users u JOIN orders o ON u.id = o.user_id";
    let before = rows(&engine.query(sql).expect("hash join"));

    assert!(!engine.register_optimizer_rule(Arc::new(ForceNestedLoop)));
    let text = engine.explain(sql).expect("explain");
    assert!(text.contains("strategy=nested_loop"), "{text}");
    assert_eq!(rows(&engine.query(sql).expect("nested loop")), before);

    assert!(engine.deregister_optimizer_rule("force_nested_loop"));
    assert!(!engine.deregister_optimizer_rule("force_nested_loop"));
}

#[test]
fn update_leaves_unmatched_rows_unevaluated() {
    init_tracing();
    let engine = Engine::new(EngineConfig::default()).expect("engine");
    engine
        .sql(
            "CREATE TABLE t (id BIGINT, d BIGINT, v BIGINT);
             INSERT INTO t VALUES (1, 0, 0), (2, 5, 0);
             CREATE TABLE n (id BIGINT, big BIGINT, small INT);
             INSERT INTO n VALUES (1, 9999999999, 0), (2, 7, 0);",
        )
        .expect("fixture");

    // Row 1 would divide by zero.
    let updated = engine
        .query("UPDATE t SET v = 100 / d WHERE d <> 0")
        .expect("update");
    assert_eq!(updated.rows_affected(), Some(1));
    let v = engine.query("SELECT v FROM t ORDER BY id").expect("select");
    assert_eq!(rows(&v), vec![vec![int(0)], vec![int(20)]]);

    // Row 1 would not fit in INT.
    let updated = engine
        .query("UPDATE n SET small = big WHERE id = 2")
        .expect("update");
    assert_eq!(updated.rows_affected(), Some(1));
    let small = engine.query("SELECT small FROM n ORDER BY id").expect("select");
    assert_eq!(rows(&small), vec![vec![int(0)], vec![int(7)]]);

    let err = engine
        .query("UPDATE n SET small = big WHERE id = 1")
        .expect_err("overflow");
    assert!(!matches!(err, TesseraError::Planning(_)), "{err}");
}

#[test]
fn update_and_delete_resolve_table_aliases() {
    let engine = engine();
    let updated = engine
        .query("UPDATE users u SET age = 99 WHERE u.id = 1")
        .expect("aliased update");
    assert_eq!(updated.rows_affected(), Some(1));
    let age = engine
        .query("SELECT age FROM users WHERE id = 1")
        .expect("select");
    assert_eq!(rows(&age), vec![vec![int(99)]]);

    let deleted = engine
        .query("DELETE FROM users AS x WHERE x.id = 2")
        .expect("aliased delete");
    assert_eq!(deleted.rows_affected(), Some(1));
    let count = engine.query("SELECT COUNT(*) FROM users").expect("count");
    assert_eq!(rows(&count), vec![vec![int(3)]]);
}
