#![cfg(feature = "pg-tests")]
//! Postgres document store tests against a real database.
//!
//! Run with `cargo test -p docstore --features pg-tests`. Tests are skipped when
//! neither `DOCSTORE_TEST_DATABASE_URL` nor `DATABASE_URL` is set.

use docstore::postgres::PostgresStore;
use docstore::{DocumentStore, Key, KeyId, PostgresConfig, Properties, Query, Transaction};
use serde_json::{Value, json};
use serial_test::serial;

async fn pg_store() -> Option<PostgresStore> {
    let url = match std::env::var("DOCSTORE_TEST_DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
    {
        Ok(url) => url,
        Err(_) => {
            eprintln!("skipping pg-tests: set DOCSTORE_TEST_DATABASE_URL or DATABASE_URL");
            return None;
        }
    };
    let store = match PostgresStore::connect(&PostgresConfig::new(url)).await {
        Ok(store) => store,
        Err(err) => {
            eprintln!("skipping pg-tests: cannot connect to postgres: {err}");
            return None;
        }
    };
    sqlx::query("TRUNCATE documents")
        .execute(store.pool())
        .await
        .expect("truncate");
    Some(store)
}

fn props(value: Value) -> Properties {
    match value {
        Value::Object(map) => map,
        _ => panic!("object expected"),
    }
}

#[tokio::test]
#[serial]
async fn named_documents_round_trip() {
    let Some(store) = pg_store().await else {
        return;
    };
    let key = Key::name("casbin", "conf").with_namespace("tenant-a");
    store
        .put(key.clone(), props(json!({"text": "first"})))
        .await
        .expect("put");
    store
        .put(key.clone(), props(json!({"text": "second"})))
        .await
        .expect("overwrite");

    let entity = store.get(&key).await.expect("get");
    assert_eq!(entity.properties["text"], "second");

    let other = Key::name("casbin", "conf").with_namespace("tenant-b");
    assert!(store.get(&other).await.is_err());
    store.close().await.expect("close");
}

#[tokio::test]
#[serial]
async fn filtered_queries_and_commits() {
    let Some(store) = pg_store().await else {
        return;
    };
    let mut tx = Transaction::new();
    tx.put(
        Key::incomplete("casbin"),
        props(json!({"p_type": "p", "v0": "alice", "v1": "data1"})),
    )
    .put(
        Key::incomplete("casbin"),
        props(json!({"p_type": "p", "v0": "bob", "v1": "data1"})),
    );
    let written = store.commit(tx).await.expect("commit");
    assert_eq!(written.len(), 2);
    assert!(written.iter().all(|key| matches!(key.id, KeyId::Id(_))));

    let alice = store
        .query(&Query::new("casbin").filter_eq("v0", "alice").filter_eq("v2", ""))
        .await
        .expect("query");
    assert_eq!(alice.len(), 1);

    let mut tx = Transaction::new();
    for entity in store.query(&Query::new("casbin")).await.expect("query") {
        tx.delete(entity.key);
    }
    store.commit(tx).await.expect("delete all");
    assert!(store.query(&Query::new("casbin")).await.expect("query").is_empty());
    store.close().await.expect("close");
}

#[tokio::test]
#[serial]
async fn allocated_ids_skip_explicit_ids() {
    let Some(store) = pg_store().await else {
        return;
    };
    let first = store
        .put(Key::incomplete("casbin"), props(json!({"v0": "allocated"})))
        .await
        .expect("put allocated");
    let KeyId::Id(first_id) = first.id else {
        panic!("allocated key expected, got {first}");
    };
    let explicit = Key::id("casbin", first_id + 1);
    store
        .put(explicit.clone(), props(json!({"v0": "explicit"})))
        .await
        .expect("put explicit");

    let mut tx = Transaction::new();
    tx.put(Key::incomplete("casbin"), props(json!({"v0": "allocated"})));
    let written = store.commit(tx).await.expect("commit");
    assert_ne!(written[0], explicit);

    assert_eq!(store.get(&explicit).await.expect("get").properties["v0"], "explicit");
    let rows = store.query(&Query::new("casbin")).await.expect("query");
    assert_eq!(rows.len(), 3);

    let err = store
        .put(Key::name("casbin", ""), props(json!({"v0": "x"})))
        .await
        .expect_err("empty name");
    assert!(matches!(err, docstore::StoreError::InvalidKey(_)));
    store.close().await.expect("close");
}
