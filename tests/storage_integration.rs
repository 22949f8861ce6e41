//! Storage Integration Tests
//!
//! Exercises the `Store` contract end to end. SQLite tests always run against
//! a temporary file. PostgreSQL tests run only when `RELSTORE_TEST_POSTGRES=1`
//! and the `RELSTORE_TEST_PG_*` variables point at a disposable server.

use relstore::storage::admin::{self, DatabaseCreation};
use relstore::storage::{FunctionArg, FunctionKey, ServerTarget};
use relstore::{Assignments, Engine, Filter, RowId, StorageBuilder, StorageError, Store, UpdateScope, Value};
use tempfile::TempDir;

// =============================================================================
// Test Helpers
// =============================================================================

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS reports (
    uid VARCHAR(60) PRIMARY KEY,
    title TEXT NOT NULL,
    current_status TEXT DEFAULT 'queue',
    error BOOLEAN DEFAULT 0
);
CREATE TABLE IF NOT EXISTS report_sentences (
    uid VARCHAR(60) PRIMARY KEY,
    report_uid VARCHAR(60) NOT NULL REFERENCES reports(uid) ON DELETE CASCADE,
    text TEXT,
    sen_index INTEGER,
    found_status BOOLEAN DEFAULT 0
);
"#;

/// Store on a fresh SQLite file with the schema applied.
async fn sqlite_store() -> (Store, TempDir) {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let store = StorageBuilder::sqlite(dir.path().join("db/thread.db"))
        .build()
        .expect("Failed to build storage");
    assert!(store.initialize_schema(SCHEMA).await);
    (store, dir)
}

/// Store on a freshly bootstrapped PostgreSQL database, if enabled.
async fn postgres_store() -> Option<Store> {
    postgres_store_with(SCHEMA).await
}

/// Same as [`postgres_store`] with a caller-supplied schema.
async fn postgres_store_with(schema: &str) -> Option<Store> {
    if std::env::var("RELSTORE_TEST_POSTGRES").ok().as_deref() != Some("1") {
        return None;
    }
    let env = |key: &str, default: &str| std::env::var(key).unwrap_or_else(|_| default.to_string());
    let target = ServerTarget::new(
        env("RELSTORE_TEST_PG_HOST", "127.0.0.1"),
        env("RELSTORE_TEST_PG_USER", "postgres"),
        env("RELSTORE_TEST_PG_PASSWORD", "postgres"),
        format!("relstore_it_{}", uuid::Uuid::new_v4().simple()),
    );
    let report = admin::bootstrap(&target, schema).await.expect("bootstrap failed");
    assert_eq!(report.creation, DatabaseCreation::Created);
    assert_eq!(
        admin::create_database(&target, admin::DEFAULT_MAINTENANCE_DB)
            .await
            .unwrap(),
        DatabaseCreation::AlreadyExists
    );
    Some(StorageBuilder::postgres(target).build().unwrap())
}

/// Contract checks shared by every engine.
async fn exercise_contract(store: &Store) {
    // Round trip through a generated identifier.
    let report = store
        .insert_generating_id("reports", &Assignments::new().set("title", "APT29"), "uid")
        .await
        .unwrap();
    let RowId::Text(report_uid) = report.clone() else {
        panic!("expected text identifier");
    };
    let rows = store
        .select("reports", &Filter::new().eq("uid", report.clone()))
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["title"], Value::from("APT29"));
    assert_eq!(rows[0]["current_status"], Value::from("queue"));
    assert_eq!(rows[0]["error"], store.false_value());

    // Boolean literal from the dialect works as a filter value.
    for (i, text) in ["first", "second", "third"].into_iter().enumerate() {
        store
            .insert_generating_id(
                "report_sentences",
                &Assignments::new()
                    .set("report_uid", report_uid.as_str())
                    .set("text", text)
                    .set("sen_index", i as i64)
                    .set("found_status", if i == 1 { store.true_value() } else { store.false_value() }),
                "uid",
            )
            .await
            .unwrap();
    }
    let found = store
        .select(
            "report_sentences",
            &Filter::new().eq("found_status", store.true_value()),
        )
        .await
        .unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0]["text"], Value::from("second"));

    // Not-equals filter.
    let others = store
        .select(
            "report_sentences",
            &Filter::new()
                .eq("report_uid", report_uid.as_str())
                .not_eq("text", "first"),
        )
        .await
        .unwrap();
    assert_eq!(others.len(), 2);

    // Function lookup is usable inside raw SQL.
    let pos = store
        .function_name(
            FunctionKey::StringPosition,
            &[FunctionArg::Raw("text"), FunctionArg::Str("ir")],
        )
        .unwrap();
    let positions = store
        .raw_select_column(
            &format!("SELECT {pos} FROM report_sentences WHERE text = 'third'"),
            &[],
        )
        .await
        .unwrap();
    assert_eq!(positions, vec![Value::Integer(3)]);

    // Update by filter, empty update is a no-op.
    let scope = UpdateScope::Matching(Filter::new().eq("uid", report.clone()));
    let changed = store
        .update(
            "reports",
            &scope,
            &Assignments::new().set("current_status", "done"),
        )
        .await
        .unwrap();
    assert_eq!(changed, 1);
    assert_eq!(
        store.update("reports", &scope, &Assignments::new()).await.unwrap(),
        0
    );

    // Column dump.
    let mut texts = store.select_column("report_sentences", "text").await.unwrap();
    texts.sort_by_key(|v| v.to_string());
    assert_eq!(
        texts,
        vec![Value::from("first"), Value::from("second"), Value::from("third")]
    );

    // Batch atomicity: a failing middle statement leaves the store unchanged.
    let before = store.select("reports", &Filter::new()).await.unwrap();
    let batch = vec![
        store.render_insert(
            "reports",
            &Assignments::new().set("uid", "b1").set("title", "one"),
        ),
        relstore::Statement::new("INSERT INTO missing_table VALUES (1)"),
        store.render_insert(
            "reports",
            &Assignments::new().set("uid", "b3").set("title", "three"),
        ),
    ];
    assert!(matches!(
        store.execute_batch(batch).await,
        Err(StorageError::Statement(_))
    ));
    let after = store.select("reports", &Filter::new()).await.unwrap();
    assert_eq!(before, after);

    // Delete with and without a filter.
    assert!(matches!(
        store.delete("report_sentences", &Filter::new()).await,
        Err(StorageError::EmptyFilter { .. })
    ));
    let deleted = store
        .delete(
            "report_sentences",
            &Filter::new()
                .eq("report_uid", report_uid.as_str())
                .eq("text", "first"),
        )
        .await
        .unwrap();
    assert_eq!(deleted, 1);

    // Foreign keys cascade.
    store
        .delete("reports", &Filter::new().eq("uid", report))
        .await
        .unwrap();
    assert!(
        store
            .select("report_sentences", &Filter::new())
            .await
            .unwrap()
            .is_empty()
    );
}

// =============================================================================
// SQLite
// =============================================================================

#[tokio::test]
async fn test_sqlite_contract() {
    let (store, _dir) = sqlite_store().await;
    assert_eq!(store.engine(), Engine::Sqlite);
    exercise_contract(&store).await;
}

#[tokio::test]
async fn test_sqlite_rejects_orphan_rows() {
    let (store, _dir) = sqlite_store().await;
    let err = store
        .insert(
            "report_sentences",
            &Assignments::new().set("uid", "s").set("report_uid", "nope"),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::Statement(_)));
}

#[tokio::test]
async fn test_sqlite_schema_rerun_is_logged_not_raised() {
    let (store, _dir) = sqlite_store().await;
    // Without IF NOT EXISTS the second run fails; the caller only sees `false`.
    assert!(
        !store
            .initialize_schema("CREATE TABLE reports (uid TEXT);")
            .await
    );
    assert!(store.select("reports", &Filter::new()).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_sqlite_batch_with_params_commits_together() {
    let (store, _dir) = sqlite_store().await;
    let batch = vec![
        relstore::Statement::with_params(
            "INSERT INTO reports (uid, title) VALUES (?, ?)",
            ["r1", "one"],
        ),
        relstore::Statement::with_params(
            "INSERT INTO report_sentences (uid, report_uid, text) VALUES (?, ?, ?)",
            ["s1", "r1", "hello"],
        ),
        relstore::Statement::new("UPDATE reports SET current_status = 'done'"),
    ];
    store.execute_batch(batch).await.unwrap();

    let rows = store
        .select("reports", &Filter::new().eq("current_status", "done"))
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
}

// =============================================================================
// PostgreSQL
// =============================================================================

#[tokio::test]
async fn test_postgres_contract() {
    let Some(store) = postgres_store().await else {
        return;
    };
    assert_eq!(store.engine(), Engine::Postgres);
    assert!(!store.initialize_schema(SCHEMA).await);
    exercise_contract(&store).await;

    let id = store
        .raw_select_column("SELECT 1", &[])
        .await
        .unwrap();
    assert_eq!(id, vec![Value::Integer(1)]);
}

const TYPED_SCHEMA: &str = r#"
CREATE TABLE readings (
    uid VARCHAR(60) PRIMARY KEY,
    n INTEGER,
    flag BOOLEAN DEFAULT 0,
    price NUMERIC,
    score DOUBLE PRECISION,
    raw BYTEA
);
"#;

#[tokio::test]
async fn test_postgres_null_into_typed_columns() {
    let Some(store) = postgres_store_with(TYPED_SCHEMA).await else {
        return;
    };

    store
        .insert(
            "readings",
            &Assignments::new()
                .set("uid", "r1")
                .set("n", Value::Null)
                .set("flag", Value::Null),
        )
        .await
        .unwrap();
    store
        .insert(
            "readings",
            &Assignments::new()
                .set("uid", "r2")
                .set("n", 7)
                .set("flag", store.true_value()),
        )
        .await
        .unwrap();

    let changed = store
        .update(
            "readings",
            &UpdateScope::Matching(Filter::new().eq("uid", "r2")),
            &Assignments::new().set("n", Value::Null).set("flag", Value::Null),
        )
        .await
        .unwrap();
    assert_eq!(changed, 1);

    for row in store.select("readings", &Filter::new()).await.unwrap() {
        assert_eq!(row["n"], Value::Null);
        assert_eq!(row["flag"], Value::Null);
    }
}

#[tokio::test]
async fn test_postgres_numeric_columns_decode() {
    let Some(store) = postgres_store_with(TYPED_SCHEMA).await else {
        return;
    };
    let batch = vec![
        relstore::Statement::new("INSERT INTO readings (uid, n, price) VALUES ('a', 1, 9.50)"),
        relstore::Statement::new("INSERT INTO readings (uid, n, price) VALUES ('b', 2, 10)"),
    ];
    store.execute_batch(batch).await.unwrap();

    let rows = store
        .select("readings", &Filter::new().eq("uid", "a"))
        .await
        .unwrap();
    assert!(
        matches!(&rows[0]["price"], Value::Text(p) if p.trim_end_matches('0') == "9.5"),
        "price decoded as {:?}",
        rows[0]["price"]
    );

    let avg = store
        .raw_select_column("SELECT AVG(n) FROM readings", &[])
        .await
        .unwrap();
    let Value::Text(avg) = &avg[0] else {
        panic!("expected numeric as text, got {avg:?}");
    };
    assert!(avg.starts_with("1.5"));
}

#[tokio::test]
async fn test_postgres_select_column_matches_raw_select() {
    let Some(store) = postgres_store_with(TYPED_SCHEMA).await else {
        return;
    };
    store
        .insert(
            "readings",
            &Assignments::new()
                .set("uid", "a")
                .set("score", 2.0)
                .set("raw", vec![1u8, 2]),
        )
        .await
        .unwrap();

    for column in ["score", "raw", "uid"] {
        let dumped = store.select_column("readings", column).await.unwrap();
        let raw = store
            .raw_select_column(&format!("SELECT {column} FROM readings"), &[])
            .await
            .unwrap();
        assert_eq!(dumped, raw, "column {column}");
    }
    assert_eq!(
        store.select_column("readings", "score").await.unwrap(),
        vec![Value::Real(2.0)]
    );
    assert_eq!(
        store.select_column("readings", "raw").await.unwrap(),
        vec![Value::Blob(vec![1, 2])]
    );
}
