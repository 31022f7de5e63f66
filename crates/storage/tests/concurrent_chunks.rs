use std::sync::Arc;
use std::thread;

use tessera_storage::{Catalog, ColumnMeta, ColumnType, DataManager, ScalarValue, TableMeta};

fn counter_table(cat: &Catalog) {
    cat.create_table(TableMeta::new(
        "default",
        "events",
        vec![
            ColumnMeta::new(0, "id", ColumnType::Int64, true),
            ColumnMeta::new(1, "writer", ColumnType::Int32, false),
        ],
        vec![],
    ))
    .expect("create table");
}

#[test]
fn concurrent_inserts_are_all_visible() {
    let cat = Arc::new(Catalog::new("default"));
    counter_table(&cat);
    let dm = DataManager::new(Arc::clone(&cat));

    let handles: Vec<_> = (0..8)
        .map(|writer| {
            let dm = dm.clone();
            thread::spawn(move || {
                for i in 0..25 {
                    dm.insert_data(
                        "default",
                        "events",
                        &[],
                        &[vec![
                            ScalarValue::Int64(writer * 100 + i),
                            ScalarValue::Int64(writer),
                        ]],
                    )
                    .expect("insert");
                }
            })
        })
        .collect();
    for h in handles {
        h.join().expect("writer thread");
    }

    let snap = cat.chunk_snapshot("default", "events").expect("snapshot");
    assert_eq!(snap.len(), 200);
    assert_eq!(snap.row_count(), 200);
    assert_eq!(cat.get_table("default", "events").expect("meta").chunk_count, 200);
}

#[test]
fn readers_see_whole_chunk_sets_during_replacement() {
    let cat = Arc::new(Catalog::new("default"));
    counter_table(&cat);
    let dm = DataManager::new(Arc::clone(&cat));
    for i in 0..10 {
        dm.insert_data(
            "default",
            "events",
            &[],
            &[vec![ScalarValue::Int64(i), ScalarValue::Null]],
        )
        .expect("insert");
    }

    let reader = {
        let dm = dm.clone();
        thread::spawn(move || {
            for _ in 0..200 {
                let rows: usize = dm
                    .scan("default", "events")
                    .expect("scan")
                    .map(|b| b.num_rows())
                    .sum();
                assert!(rows == 10 || rows == 0, "observed partial chunk set: {rows}");
            }
        })
    };
    dm.replace_chunks("default", "events", |_, _| Ok((Vec::new(), ())))
        .expect("replace");
    reader.join().expect("reader thread");
}
