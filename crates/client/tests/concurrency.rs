use std::thread;

use tessera_client::{Engine, EngineConfig, ScalarValue};

const THREADS: i64 = 8;

fn engine() -> Engine {
    Engine::new(EngineConfig::default()).expect("engine")
}

fn single_int(engine: &Engine, sql: &str) -> i64 {
    let rows = engine.query(sql).expect("query").rows().expect("rows");
    match rows.as_slice() {
        [row] => match row.as_slice() {
            [ScalarValue::Int64(v)] => *v,
            other => panic!("unexpected row {other:?}"),
        },
        other => panic!("expected one row, got {other:?}"),
    }
}

#[test]
fn concurrent_inserts_are_all_visible() {
    let engine = engine();
    engine
        .query("CREATE TABLE log (writer BIGINT NOT NULL, seq BIGINT NOT NULL)")
        .expect("create");

    let per_thread = 20;
    let handles: Vec<_> = (0..THREADS)
        .map(|w| {
            let conn = engine.connect();
            thread::spawn(move || {
                for seq in 0..per_thread {
                    conn.query(&format!("INSERT INTO log VALUES ({w}, {seq})"))
                        .expect("insert");
                }
            })
        })
        .collect();
    for h in handles {
        h.join().expect("writer thread");
    }

    assert_eq!(
        single_int(&engine, "SELECT COUNT(*) FROM log"),
        THREADS * per_thread
    );
    let per_writer = engine
        .query("SELECT writer, COUNT(*) FROM log GROUP BY writer")
        .expect("group")
        .rows()
        .expect("rows");
    assert_eq!(per_writer.len(), THREADS as usize);
    assert!(per_writer
        .iter()
        .all(|row| row[1] == ScalarValue::Int64(per_thread)));
}

#[test]
fn concurrent_updates_lose_no_increments() {
    let engine = engine();
    engine
        .sql(
            "CREATE TABLE counters (id BIGINT NOT NULL, hits BIGINT NOT NULL);
             INSERT INTO counters VALUES (1, 0), (2, 0);",
        )
        .expect("fixture");

    let rounds = 25;
    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let conn = engine.connect();
            thread::spawn(move || {
                for _ in 0..rounds {
                    let r = conn
                        .query("UPDATE counters SET hits = hits + 1 WHERE id = 1")
                        .expect("update");
                    assert_eq!(r.rows_affected(), Some(1));
                }
            })
        })
        .collect();
    for h in handles {
        h.join().expect("updater thread");
    }

    assert_eq!(
        single_int(&engine, "SELECT hits FROM counters WHERE id = 1"),
        THREADS * rounds
    );
    assert_eq!(
        single_int(&engine, "SELECT hits FROM counters WHERE id = 2"),
        0
    );
}

#[test]
fn readers_see_whole_chunks_while_writers_append() {
    let engine = engine();
    engine
        .query("CREATE TABLE pairs (a BIGINT NOT NULL, b BIGINT NOT NULL)")
        .expect("create");

    let writer = {
        let conn = engine.connect();
        thread::spawn(move || {
            for i in 0..50 {
                conn.query(&format!("INSERT INTO pairs VALUES ({i}, {i}), ({i}, {i})"))
                    .expect("insert");
            }
        })
    };
    let reader = {
        let conn = engine.connect();
        thread::spawn(move || {
            for _ in 0..50 {
                let n = single_int(&conn, "SELECT COUNT(*) FROM pairs");
                // Each insert publishes one two-row chunk.
                assert_eq!(n % 2, 0, "saw a partial chunk: {n}");
            }
        })
    };
    writer.join().expect("writer");
    reader.join().expect("reader");
    assert_eq!(single_int(&engine, "SELECT COUNT(*) FROM pairs"), 100);
}
