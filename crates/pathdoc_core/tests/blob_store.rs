use pathdoc_core::db::open_db_in_memory;
use pathdoc_core::{BlobStore, Node, NodeId, SqliteBlobStore, StoreError};
use serde_json::json;

#[test]
fn save_load_and_delete_documents() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteBlobStore::try_new(&conn).unwrap();
    let doc = Node::from_value(&json!({
        "markup": "document",
        "id": "doc",
        "children": [{ "markup": "text", "id": "t", "content": "hi" }]
    }))
    .unwrap();

    store.save_document(&doc).unwrap();
    store.save_document(&doc).unwrap();

    let loaded = store.load_document(&NodeId::from("doc")).unwrap().unwrap();
    assert_eq!(loaded.to_value(), doc.to_value());
    assert_eq!(store.load_documents().unwrap().len(), 1);

    assert!(store.delete_document(&NodeId::from("doc")).unwrap());
    assert!(!store.delete_document(&NodeId::from("doc")).unwrap());
    assert!(store.load_document(&NodeId::from("doc")).unwrap().is_none());
}

#[test]
fn corrupt_blob_is_invalid_data() {
    let conn = open_db_in_memory().unwrap();
    conn.execute(
        "INSERT INTO documents (id, document_json) VALUES ('bad', '{\"children\": []}');",
        [],
    )
    .unwrap();
    let store = SqliteBlobStore::try_new(&conn).unwrap();

    assert!(matches!(
        store.load_documents(),
        Err(StoreError::InvalidData(_))
    ));
}
