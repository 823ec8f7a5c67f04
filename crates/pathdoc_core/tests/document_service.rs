use pathdoc_core::db::{open_db, open_db_in_memory};
use pathdoc_core::{
    Deletion, DocumentObserver, DocumentService, Node, NodeId, NodeStore, ObserverError,
    RegistryError, ServiceError, SqliteBlobStore, SqliteNodeStore, StoreError,
};
use rusqlite::Connection;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};

fn id(value: &str) -> NodeId {
    NodeId::from(value)
}

fn sample() -> serde_json::Value {
    json!({
        "markup": "document",
        "id": "doc",
        "children": [
            { "markup": "paragraph", "id": "p0", "children": [
                { "markup": "text", "id": "t0", "content": "Hello world" }
            ]},
            { "markup": "paragraph", "id": "p1" }
        ]
    })
}

/// In-memory tree and stored rows describe the same document.
fn assert_store_matches_memory(service: &DocumentService<SqliteNodeStore<'_>>, root_id: &NodeId) {
    let memory = service.find(root_id).unwrap().to_value().unwrap();
    let stored = service.reload(root_id).unwrap().unwrap().to_value();
    assert_eq!(stored, memory);
}

#[test]
fn create_and_import_persist_whole_trees() {
    let conn = open_db_in_memory().unwrap();
    let service = DocumentService::new(SqliteNodeStore::try_new(&conn).unwrap());

    let empty = service.create().unwrap();
    let imported = service.import_document(&sample()).unwrap();

    assert_eq!(
        service.store().list_roots().unwrap(),
        vec![empty.id().clone(), imported.id().clone()]
    );
    assert_store_matches_memory(&service, imported.id());
}

#[test]
fn structural_and_attribute_edits_write_through() {
    let conn = open_db_in_memory().unwrap();
    let service = DocumentService::new(SqliteNodeStore::try_new(&conn).unwrap());
    service.import_document(&sample()).unwrap();
    let doc = id("doc");

    service.set(&doc, "1", "list").unwrap();
    service.set(&doc, "1/0", "item").unwrap();
    service.set(&doc, "1/style", "color: green").unwrap();
    service.set(&id("p0"), "0/content", "Hello there").unwrap();
    service
        .insert(&doc, "0", Node::with_id(id("intro"), "paragraph"))
        .unwrap();
    assert_store_matches_memory(&service, &doc);

    service.delete_path(&doc, "1").unwrap();
    service.delete_path(&doc, "1/style").unwrap();
    assert_store_matches_memory(&service, &doc);
    assert!(service.store().get_row(&id("p0")).unwrap().is_none());
}

#[test]
fn deleting_descendant_renumbers_stored_siblings() {
    let conn = open_db_in_memory().unwrap();
    let service = DocumentService::new(SqliteNodeStore::try_new(&conn).unwrap());
    service.import_document(&sample()).unwrap();

    let deletion = service.delete(&id("p0")).unwrap();
    assert!(matches!(deletion, Deletion::Descendant { .. }));

    assert_eq!(service.store().get_row(&id("p1")).unwrap().unwrap().path, "0");
    assert_store_matches_memory(&service, &id("doc"));
}

#[test]
fn attachments_gate_root_deletion_in_memory_and_store() {
    let conn = open_db_in_memory().unwrap();
    let service = DocumentService::new(SqliteNodeStore::try_new(&conn).unwrap());
    let root = service.create().unwrap();
    let root_id = root.id().clone();

    service.attach(&root_id, "viewer").unwrap();
    let err = service.delete(&root_id).unwrap_err();
    assert!(matches!(
        err,
        ServiceError::Registry(RegistryError::PermissionDenied { .. })
    ));
    assert!(service.store().get_row(&root_id).unwrap().is_some());

    service.detach(&root_id, "viewer").unwrap();
    service.delete(&root_id).unwrap();
    assert!(service.store().get_row(&root_id).unwrap().is_none());
}

#[test]
fn importing_over_a_root_drops_rows_of_the_old_root_id() {
    let conn = open_db_in_memory().unwrap();
    let service = DocumentService::new(SqliteNodeStore::try_new(&conn).unwrap());
    let root = service.create().unwrap();
    let old_id = root.id().clone();

    let change = service.import_json(&old_id, &sample()).unwrap();
    assert_eq!(change.node, id("doc"));

    assert!(service.store().get_row(&old_id).unwrap().is_none());
    assert_eq!(service.store().list_roots().unwrap(), vec![id("doc")]);
    assert_store_matches_memory(&service, &id("doc"));
}

#[test]
fn open_hydrates_registry_from_file_store() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("docs.db");
    {
        let conn = open_db(&path).unwrap();
        let service = DocumentService::new(SqliteNodeStore::try_new(&conn).unwrap());
        service.import_document(&sample()).unwrap();
        service.set(&id("doc"), "2", "table").unwrap();
    }

    let conn = open_db(&path).unwrap();
    let service = DocumentService::open(SqliteNodeStore::try_new(&conn).unwrap()).unwrap();
    let root = service.find(&id("doc")).unwrap();
    assert_eq!(root.list().unwrap().len(), 4);
    assert_eq!(
        service.render(&id("doc")).unwrap(),
        "\t<p>\nHello world\n</p>\n\t<p>\n\n</p>\n\t<table>\n</table>\n"
    );
    assert_eq!(service.parent(&id("t0")).unwrap().unwrap().id(), &id("p0"));
    assert_eq!(
        service.get_by_path(&id("doc"), "0/0").unwrap().unwrap().id(),
        &id("t0")
    );
}

#[test]
fn store_failure_after_memory_edit_is_reported_as_not_durable() {
    let conn = open_db_in_memory().unwrap();
    let service = DocumentService::new(SqliteNodeStore::try_new(&conn).unwrap());
    service.import_document(&sample()).unwrap();
    drop_rows(&conn);

    let err = service.set(&id("p1"), "style", "color: red").unwrap_err();
    match err {
        ServiceError::NotDurable { node, source } => {
            assert_eq!(node, id("p1"));
            assert!(matches!(source, StoreError::NodeNotFound(_)));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(
        service.get(&id("p1"), "style").unwrap().to_value(),
        json!("color: red")
    );
}

#[test]
fn listeners_may_read_the_tree_during_service_writes() {
    let conn = open_db_in_memory().unwrap();
    let service = DocumentService::new(SqliteNodeStore::try_new(&conn).unwrap());
    let root = service.import_document(&sample()).unwrap();

    let seen: Arc<Mutex<Vec<Value>>> = Arc::new(Mutex::new(Vec::new()));
    let reader = service.find(&id("t0")).unwrap();
    let sink = Arc::clone(&seen);
    let listener: Arc<dyn DocumentObserver> = Arc::new(
        move |_: &str, _: &NodeId| -> Result<(), ObserverError> {
            sink.lock().unwrap().push(reader.get("content")?.to_value());
            Ok(())
        },
    );
    root.watch(listener).unwrap();

    service.set(&id("t0"), "content", "first").unwrap();
    service.insert(&id("doc"), "0", Node::new("paragraph")).unwrap();
    service.set(&id("t0"), "content", "second").unwrap();

    assert_eq!(
        *seen.lock().unwrap(),
        vec![json!("first"), json!("first"), json!("second")]
    );
    assert_store_matches_memory(&service, &id("doc"));
}

#[test]
fn snapshots_round_trip_through_blob_store() {
    let conn = open_db_in_memory().unwrap();
    let service = DocumentService::new(SqliteNodeStore::try_new(&conn).unwrap());
    service.import_document(&sample()).unwrap();
    let blobs = SqliteBlobStore::try_new(&conn).unwrap();
    assert_eq!(service.export_snapshots(&blobs).unwrap(), 1);

    let other_conn = open_db_in_memory().unwrap();
    let restored = DocumentService::new(SqliteNodeStore::try_new(&other_conn).unwrap());
    assert_eq!(restored.import_snapshots(&blobs).unwrap(), 1);
    assert_eq!(restored.import_snapshots(&blobs).unwrap(), 0);
    assert_store_matches_memory(&restored, &id("doc"));
}

fn drop_rows(conn: &Connection) {
    conn.execute("DELETE FROM document_nodes;", []).unwrap();
}
