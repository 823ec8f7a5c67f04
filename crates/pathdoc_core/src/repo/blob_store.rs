//! Whole-document JSON blob store.
//!
//! # Responsibility
//! - Save and load complete root trees as one JSON text per document.
//!
//! # Invariants
//! - One row per root id; saving again replaces the previous blob.
//! - Loaded documents keep the ids they were saved with.

use crate::db::ensure_schema;
use crate::model::node::{Node, NodeId};
use crate::repo::node_store::{StoreError, StoreResult};
use log::info;
use rusqlite::{params, Connection};
use std::time::{SystemTime, UNIX_EPOCH};

const TABLE: &str = "documents";
const COLUMNS: &[&str] = &["id", "document_json", "updated_at"];

/// Repository interface for whole-document snapshots.
pub trait BlobStore {
    /// Inserts or replaces the blob of `root`.
    fn save_document(&self, root: &Node) -> StoreResult<()>;
    fn load_document(&self, id: &NodeId) -> StoreResult<Option<Node>>;
    /// Every saved document, most recently saved first.
    fn load_documents(&self) -> StoreResult<Vec<Node>>;
    /// Returns whether a blob was removed.
    fn delete_document(&self, id: &NodeId) -> StoreResult<bool>;
}

/// SQLite-backed blob store over the `documents` table.
pub struct SqliteBlobStore<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteBlobStore<'conn> {
    /// Creates store from migrated connection.
    pub fn try_new(conn: &'conn Connection) -> StoreResult<Self> {
        ensure_schema(conn, TABLE, COLUMNS)?;
        Ok(Self { conn })
    }
}

impl BlobStore for SqliteBlobStore<'_> {
    fn save_document(&self, root: &Node) -> StoreResult<()> {
        self.conn.execute(
            "INSERT INTO documents (id, document_json, updated_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(id) DO UPDATE SET
                document_json = excluded.document_json,
                updated_at = excluded.updated_at;",
            params![root.id().as_str(), root.to_value().to_string(), now_epoch_ms()],
        )?;
        info!(
            "event=blob_save module=repo status=ok document_id={}",
            root.id()
        );
        Ok(())
    }

    fn load_document(&self, id: &NodeId) -> StoreResult<Option<Node>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, document_json FROM documents WHERE id = ?1;")?;
        let mut rows = stmt.query([id.as_str()])?;
        if let Some(row) = rows.next()? {
            let id: String = row.get(0)?;
            let json: String = row.get(1)?;
            return decode_document(&id, &json).map(Some);
        }
        Ok(None)
    }

    fn load_documents(&self) -> StoreResult<Vec<Node>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, document_json
             FROM documents
             ORDER BY updated_at DESC, id ASC;",
        )?;
        let mut rows = stmt.query([])?;
        let mut documents = Vec::new();
        while let Some(row) = rows.next()? {
            let id: String = row.get(0)?;
            let json: String = row.get(1)?;
            documents.push(decode_document(&id, &json)?);
        }
        Ok(documents)
    }

    fn delete_document(&self, id: &NodeId) -> StoreResult<bool> {
        let changed = self
            .conn
            .execute("DELETE FROM documents WHERE id = ?1;", [id.as_str()])?;
        info!(
            "event=blob_delete module=repo status=ok document_id={} removed={}",
            id,
            changed > 0
        );
        Ok(changed > 0)
    }
}

fn decode_document(id: &str, json: &str) -> StoreResult<Node> {
    Node::from_json_str(json).map_err(|err| {
        StoreError::InvalidData(format!("invalid document_json for document {id}: {err}"))
    })
}

fn now_epoch_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}
