use storage::sqlite::SqliteStore;
use storage::store::ProgressStore;

#[tokio::test]
async fn sqlite_roundtrip_persists_values() {
    let store = SqliteStore::open("sqlite:file:memdb_roundtrip?mode=memory&cache=shared")
        .await
        .expect("open");

    store
        .save("examprep-user-sam@example.com", r#"{"name":"Sam"}"#)
        .await
        .expect("save");

    let loaded = store
        .load("examprep-user-sam@example.com")
        .await
        .expect("load");
    assert_eq!(loaded.as_deref(), Some(r#"{"name":"Sam"}"#));

    store
        .save("examprep-user-sam@example.com", r#"{"name":"Samantha"}"#)
        .await
        .expect("overwrite");
    let loaded = store
        .load("examprep-user-sam@example.com")
        .await
        .expect("load after overwrite");
    assert_eq!(loaded.as_deref(), Some(r#"{"name":"Samantha"}"#));

    store
        .remove("examprep-user-sam@example.com")
        .await
        .expect("remove");
    assert_eq!(
        store
            .load("examprep-user-sam@example.com")
            .await
            .expect("load after remove"),
        None
    );
}

#[tokio::test]
async fn sqlite_lists_keys_by_prefix_in_order() {
    let store = SqliteStore::open("sqlite:file:memdb_prefix?mode=memory&cache=shared")
        .await
        .expect("open");

    store
        .save("examprep-progress-sam@example.com-test2", "{}")
        .await
        .expect("save");
    store
        .save("examprep-progress-sam@example.com-test1", "{}")
        .await
        .expect("save");
    store
        .save("examprep-progress-kim@example.com-test1", "{}")
        .await
        .expect("save");
    store
        .save("examprep-current-progress-sam@example.com", "{}")
        .await
        .expect("save");

    let keys = store
        .list_keys("examprep-progress-sam@example.com-")
        .await
        .expect("list");
    assert_eq!(
        keys,
        vec![
            "examprep-progress-sam@example.com-test1".to_string(),
            "examprep-progress-sam@example.com-test2".to_string(),
        ]
    );
}

#[tokio::test]
async fn migrations_are_idempotent() {
    let store = SqliteStore::open("sqlite:file:memdb_migrate?mode=memory&cache=shared")
        .await
        .expect("open");
    store.migrate().await.expect("second migrate");

    store.save("k", "v").await.expect("save");
    assert_eq!(store.load("k").await.expect("load").as_deref(), Some("v"));
}
