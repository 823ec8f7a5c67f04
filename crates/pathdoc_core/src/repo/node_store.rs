//! Flattened path store contracts and SQLite implementation.
//!
//! # Responsibility
//! - Persist document trees as one row per node, addressed by the
//!   materialized index path from the owning root.
//! - Rebuild node trees from row sets.
//! - Keep sibling indices contiguous under structural inserts and deletes.
//!
//! # Invariants
//! - The root row of a tree has `root_id = id` and the empty path.
//! - For every root, the rows under it enumerate a tree whose siblings at
//!   each depth use the contiguous range `0..n`.
//! - Every write of one operation commits in a single transaction.

use crate::db::{ensure_schema, DbError};
use crate::model::attributes::Attributes;
use crate::model::error::DocumentError;
use crate::model::node::{Node, NodeId};
use crate::model::path::{self, join_indices, parse_indices};
use log::{debug, info};
use rusqlite::{params, Connection, Row, Transaction, TransactionBehavior};
use serde_json::Value;
use std::error::Error;
use std::fmt::{Display, Formatter};

const TABLE: &str = "document_nodes";
const COLUMNS: &[&str] = &["id", "root_id", "path", "markup", "attributes"];
const ROW_SELECT_SQL: &str = "SELECT id, root_id, path, markup, attributes FROM document_nodes";

/// Result type used by node store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors from flattened store operations.
#[derive(Debug)]
pub enum StoreError {
    /// Underlying SQLite/bootstrap error.
    Db(DbError),
    /// No row carries this id.
    NodeNotFound(NodeId),
    /// Materialized path does not address a valid slot.
    InvalidPath(String),
    /// Persisted rows cannot be turned back into a valid tree.
    InvalidData(String),
    /// Row attributes violate the in-memory model.
    Document(DocumentError),
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::NodeNotFound(id) => write!(f, "stored node not found: {id}"),
            Self::InvalidPath(message) => write!(f, "invalid stored path: {message}"),
            Self::InvalidData(message) => write!(f, "invalid stored document data: {message}"),
            Self::Document(err) => write!(f, "{err}"),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::Document(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for StoreError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl From<DocumentError> for StoreError {
    fn from(value: DocumentError) -> Self {
        Self::Document(value)
    }
}

/// Persisted form of one node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeRow {
    pub id: NodeId,
    pub root_id: NodeId,
    /// Materialized index path from the root, `""` for the root itself.
    pub path: String,
    pub markup: String,
    /// JSON object text of the node attributes.
    pub attributes: String,
}

impl NodeRow {
    /// Parsed index chain of `path`.
    pub fn indices(&self) -> StoreResult<Vec<usize>> {
        parse_indices(&self.path).ok_or_else(|| {
            StoreError::InvalidData(format!(
                "invalid path `{}` in {TABLE}.path for node {}",
                self.path, self.id
            ))
        })
    }

    /// Childless node carrying this row's identity and attributes.
    pub fn to_node(&self) -> StoreResult<Node> {
        let parsed: Value = serde_json::from_str(&self.attributes).map_err(|err| {
            StoreError::InvalidData(format!(
                "invalid attributes json for node {}: {err}",
                self.id
            ))
        })?;
        let Value::Object(map) = parsed else {
            return Err(StoreError::InvalidData(format!(
                "attributes of node {} are not a JSON object",
                self.id
            )));
        };
        Ok(Node::with_id(self.id.clone(), self.markup.clone())
            .with_attributes(Attributes::from_map(map)))
    }
}

/// Repository interface for flattened document trees.
pub trait NodeStore {
    /// Writes every node of `root` as a row, replacing the tree's previous
    /// rows. Returns the number of rows written.
    fn persist_tree(&self, root: &Node) -> StoreResult<usize>;
    /// Places `node` and its subtree at `path` under `root_id`, shifting later
    /// siblings up by one.
    fn insert_subtree(&self, root_id: &NodeId, path: &str, node: &Node) -> StoreResult<usize>;
    /// Rewrites markup and attributes of one stored node.
    fn update_node(&self, node: &Node) -> StoreResult<()>;
    /// Rebuilds the subtree rooted at `id`.
    fn reconstruct(&self, id: &NodeId) -> StoreResult<Option<Node>>;
    /// Deletes `id` and its descendants, shifting later siblings down by one.
    fn delete_subtree(&self, id: &NodeId) -> StoreResult<usize>;
    /// Shifts the index component at the depth of `path` by `delta` for every
    /// sibling at or after it, descendants included.
    fn shift_siblings(&self, root_id: &NodeId, path: &str, delta: i64) -> StoreResult<usize>;
    fn get_row(&self, id: &NodeId) -> StoreResult<Option<NodeRow>>;
    fn get_by_path(&self, root_id: &NodeId, path: &str) -> StoreResult<Option<NodeRow>>;
    /// Row of the parent of `id`, `None` for roots.
    fn parent(&self, id: &NodeId) -> StoreResult<Option<NodeRow>>;
    /// Ids of every stored root.
    fn list_roots(&self) -> StoreResult<Vec<NodeId>>;
    /// Rows whose markup or attribute text contains `text`.
    fn search(&self, text: &str) -> StoreResult<Vec<NodeRow>>;
}

/// SQLite-backed flattened path store.
pub struct SqliteNodeStore<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteNodeStore<'conn> {
    /// Creates store from migrated connection.
    pub fn try_new(conn: &'conn Connection) -> StoreResult<Self> {
        ensure_schema(conn, TABLE, COLUMNS)?;
        Ok(Self { conn })
    }
}

impl NodeStore for SqliteNodeStore<'_> {
    fn persist_tree(&self, root: &Node) -> StoreResult<usize> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        tx.execute(
            "DELETE FROM document_nodes WHERE root_id = ?1;",
            [root.id().as_str()],
        )?;
        let written = upsert_rows(&tx, root.id(), &[], root)?;
        tx.commit()?;

        info!(
            "event=store_persist module=repo status=ok root_id={} rows={}",
            root.id(),
            written
        );
        Ok(written)
    }

    fn insert_subtree(&self, root_id: &NodeId, path: &str, node: &Node) -> StoreResult<usize> {
        let indices = parse_indices(path)
            .ok_or_else(|| StoreError::InvalidPath(format!("`{path}` is not an index path")))?;
        let Some((&index, parent)) = indices.split_last() else {
            return Err(StoreError::InvalidPath(
                "cannot insert at the root path".to_string(),
            ));
        };

        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let parent_path = join_indices(parent);
        let siblings = load_rows_under(&tx, root_id, &parent_path)?;
        if !siblings.iter().any(|row| row.path == parent_path) {
            return Err(StoreError::InvalidPath(format!(
                "no parent row at `{parent_path}` under root {root_id}"
            )));
        }
        let child_count = count_direct_children(&siblings, parent)?;
        if index > child_count {
            return Err(StoreError::InvalidPath(format!(
                "index {index} past {child_count} children at `{parent_path}`"
            )));
        }

        shift_rows(&tx, root_id, &indices, 1)?;
        let written = upsert_rows(&tx, root_id, &indices, node)?;
        tx.commit()?;

        info!(
            "event=store_insert module=repo status=ok root_id={} path={} rows={}",
            root_id, path, written
        );
        Ok(written)
    }

    fn update_node(&self, node: &Node) -> StoreResult<()> {
        let changed = self.conn.execute(
            "UPDATE document_nodes
             SET markup = ?2,
                 attributes = ?3
             WHERE id = ?1;",
            params![node.id().as_str(), node.markup(), attributes_json(node)],
        )?;
        if changed == 0 {
            return Err(StoreError::NodeNotFound(node.id().clone()));
        }
        Ok(())
    }

    fn reconstruct(&self, id: &NodeId) -> StoreResult<Option<Node>> {
        let Some(row) = self.get_row(id)? else {
            return Ok(None);
        };
        let base = row.indices()?;

        // Replay order must put every parent before its children and siblings
        // in index order; sorting by parsed path guarantees both.
        let mut rows = Vec::new();
        for candidate in load_rows_under(self.conn, &row.root_id, &row.path)? {
            let indices = candidate.indices()?;
            if indices.len() < base.len() || indices[..base.len()] != base[..] {
                continue;
            }
            rows.push((indices[base.len()..].to_vec(), candidate));
        }
        rows.sort_by(|left, right| left.0.cmp(&right.0));

        let mut replay = rows.into_iter();
        let mut root = match replay.next() {
            Some((relative, top)) if relative.is_empty() => top.to_node()?,
            _ => {
                return Err(StoreError::InvalidData(format!(
                    "rows under {} do not start with the node itself",
                    row.id
                )))
            }
        };

        let mut replayed = 1;
        for (relative, child_row) in replay {
            let Some((&index, parent)) = relative.split_last() else {
                return Err(StoreError::InvalidData(format!(
                    "duplicate row for path `{}`",
                    child_row.path
                )));
            };
            let expected = path::walk(&root, parent)
                .map(|parent_node| parent_node.children().len())
                .ok_or_else(|| {
                    StoreError::InvalidData(format!("orphan row at path `{}`", child_row.path))
                })?;
            if index != expected {
                return Err(StoreError::InvalidData(format!(
                    "non-contiguous sibling index at path `{}`, expected {}",
                    child_row.path, expected
                )));
            }
            root.insert(&join_indices(&relative), child_row.to_node()?)?;
            replayed += 1;
        }

        debug!(
            "event=store_reconstruct module=repo status=ok node_id={} rows={}",
            id, replayed
        );
        Ok(Some(root))
    }

    fn delete_subtree(&self, id: &NodeId) -> StoreResult<usize> {
        let row = self
            .get_row(id)?
            .ok_or_else(|| StoreError::NodeNotFound(id.clone()))?;
        let indices = row.indices()?;

        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let deleted = if row.path.is_empty() {
            tx.execute(
                "DELETE FROM document_nodes WHERE root_id = ?1;",
                [row.root_id.as_str()],
            )?
        } else {
            tx.execute(
                "DELETE FROM document_nodes
                 WHERE root_id = ?1
                   AND (path = ?2 OR path LIKE ?2 || '/%');",
                params![row.root_id.as_str(), row.path],
            )?
        };
        if row.id != row.root_id {
            shift_rows(&tx, &row.root_id, &indices, -1)?;
        }
        tx.commit()?;

        info!(
            "event=store_delete module=repo status=ok node_id={} root_id={} rows={}",
            id, row.root_id, deleted
        );
        Ok(deleted)
    }

    fn shift_siblings(&self, root_id: &NodeId, path: &str, delta: i64) -> StoreResult<usize> {
        let indices = parse_indices(path)
            .ok_or_else(|| StoreError::InvalidPath(format!("`{path}` is not an index path")))?;
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let moved = shift_rows(&tx, root_id, &indices, delta)?;
        tx.commit()?;
        Ok(moved)
    }

    fn get_row(&self, id: &NodeId) -> StoreResult<Option<NodeRow>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{ROW_SELECT_SQL} WHERE id = ?1;"))?;
        let mut rows = stmt.query([id.as_str()])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_node_row(row)?));
        }
        Ok(None)
    }

    fn get_by_path(&self, root_id: &NodeId, path: &str) -> StoreResult<Option<NodeRow>> {
        let mut stmt = self.conn.prepare(&format!(
            "{ROW_SELECT_SQL} WHERE root_id = ?1 AND path = ?2;"
        ))?;
        let mut rows = stmt.query(params![root_id.as_str(), path])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_node_row(row)?));
        }
        Ok(None)
    }

    fn parent(&self, id: &NodeId) -> StoreResult<Option<NodeRow>> {
        let row = self
            .get_row(id)?
            .ok_or_else(|| StoreError::NodeNotFound(id.clone()))?;
        let mut indices = row.indices()?;
        if indices.pop().is_none() {
            return Ok(None);
        }
        self.get_by_path(&row.root_id, &join_indices(&indices))
    }

    fn list_roots(&self) -> StoreResult<Vec<NodeId>> {
        let mut stmt = self.conn.prepare(
            "SELECT id
             FROM document_nodes
             WHERE path = ''
             ORDER BY rowid ASC;",
        )?;
        let mut rows = stmt.query([])?;
        let mut roots = Vec::new();
        while let Some(row) = rows.next()? {
            roots.push(NodeId::from(row.get::<_, String>(0)?));
        }
        Ok(roots)
    }

    fn search(&self, text: &str) -> StoreResult<Vec<NodeRow>> {
        // instr is case-sensitive, unlike LIKE.
        let mut stmt = self.conn.prepare(&format!(
            "{ROW_SELECT_SQL}
             WHERE instr(markup, ?1) > 0
                OR instr(attributes, ?1) > 0;"
        ))?;
        let mut rows = stmt.query([text])?;
        let mut keyed = Vec::new();
        while let Some(row) = rows.next()? {
            let row = parse_node_row(row)?;
            keyed.push((row.root_id.clone(), row.indices()?, row));
        }
        keyed.sort_by(|left, right| (&left.0, &left.1).cmp(&(&right.0, &right.1)));
        Ok(keyed.into_iter().map(|(_, _, row)| row).collect())
    }
}

/// Writes `node` at `base` and every descendant below it.
fn upsert_rows(
    conn: &Connection,
    root_id: &NodeId,
    base: &[usize],
    node: &Node,
) -> StoreResult<usize> {
    let mut stmt = conn.prepare(
        "INSERT INTO document_nodes (id, root_id, path, markup, attributes)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(id) DO UPDATE SET
            root_id = excluded.root_id,
            path = excluded.path,
            markup = excluded.markup,
            attributes = excluded.attributes;",
    )?;

    let mut written = 0;
    let mut stack: Vec<(&Node, Vec<usize>)> = vec![(node, base.to_vec())];
    while let Some((current, indices)) = stack.pop() {
        stmt.execute(params![
            current.id().as_str(),
            root_id.as_str(),
            join_indices(&indices),
            current.markup(),
            attributes_json(current),
        ])?;
        written += 1;

        for (index, child) in current.children().iter().enumerate() {
            let mut child_indices = indices.clone();
            child_indices.push(index);
            stack.push((child, child_indices));
        }
    }
    Ok(written)
}

/// Moves every row under the parent of `indices` whose component at the
/// affected depth is `>= indices.last()`.
fn shift_rows(
    conn: &Connection,
    root_id: &NodeId,
    indices: &[usize],
    delta: i64,
) -> StoreResult<usize> {
    let Some((&affected, parent)) = indices.split_last() else {
        return Err(StoreError::InvalidPath(
            "the root path has no siblings".to_string(),
        ));
    };
    let depth = parent.len();

    let mut moved = 0;
    for row in load_rows_under(conn, root_id, &join_indices(parent))? {
        let mut row_indices = row.indices()?;
        if row_indices.len() <= depth || row_indices[..depth] != *parent {
            continue;
        }
        if row_indices[depth] < affected {
            continue;
        }

        let shifted = i64::try_from(row_indices[depth])
            .ok()
            .and_then(|value| value.checked_add(delta))
            .and_then(|value| usize::try_from(value).ok())
            .ok_or_else(|| {
                StoreError::InvalidData(format!(
                    "shifting `{}` by {delta} leaves the index range",
                    row.path
                ))
            })?;
        row_indices[depth] = shifted;
        conn.execute(
            "UPDATE document_nodes SET path = ?2 WHERE id = ?1;",
            params![row.id.as_str(), join_indices(&row_indices)],
        )?;
        moved += 1;
    }

    debug!(
        "event=store_shift module=repo status=ok root_id={} depth={} from_index={} delta={} rows={}",
        root_id, depth, affected, delta, moved
    );
    Ok(moved)
}

/// Rows of `root_id` at `prefix` or below it.
fn load_rows_under(conn: &Connection, root_id: &NodeId, prefix: &str) -> StoreResult<Vec<NodeRow>> {
    let mut items = Vec::new();
    if prefix.is_empty() {
        let mut stmt = conn.prepare(&format!("{ROW_SELECT_SQL} WHERE root_id = ?1;"))?;
        let mut rows = stmt.query([root_id.as_str()])?;
        while let Some(row) = rows.next()? {
            items.push(parse_node_row(row)?);
        }
    } else {
        let mut stmt = conn.prepare(&format!(
            "{ROW_SELECT_SQL}
             WHERE root_id = ?1
               AND (path = ?2 OR path LIKE ?2 || '/%');"
        ))?;
        let mut rows = stmt.query(params![root_id.as_str(), prefix])?;
        while let Some(row) = rows.next()? {
            items.push(parse_node_row(row)?);
        }
    }
    Ok(items)
}

fn count_direct_children(rows: &[NodeRow], parent: &[usize]) -> StoreResult<usize> {
    let mut count = 0;
    for row in rows {
        let indices = row.indices()?;
        if indices.len() == parent.len() + 1 && indices[..parent.len()] == *parent {
            count += 1;
        }
    }
    Ok(count)
}

fn attributes_json(node: &Node) -> String {
    Value::Object(node.attributes().to_map()).to_string()
}

fn parse_node_row(row: &Row<'_>) -> StoreResult<NodeRow> {
    Ok(NodeRow {
        id: NodeId::from(row.get::<_, String>("id")?),
        root_id: NodeId::from(row.get::<_, String>("root_id")?),
        path: row.get("path")?,
        markup: row.get("markup")?,
        attributes: row.get("attributes")?,
    })
}

#[cfg(test)]
mod tests {
    use super::{count_direct_children, NodeRow};
    use crate::model::node::NodeId;

    fn row(path: &str) -> NodeRow {
        NodeRow {
            id: NodeId::from(format!("n-{path}")),
            root_id: NodeId::from("root"),
            path: path.to_string(),
            markup: "item".to_string(),
            attributes: "{}".to_string(),
        }
    }

    #[test]
    fn count_direct_children_ignores_grandchildren() {
        let rows = vec![row("1"), row("1/0"), row("1/1"), row("1/1/0"), row("10")];
        assert_eq!(count_direct_children(&rows, &[1]).unwrap(), 2);
        assert_eq!(count_direct_children(&rows, &[]).unwrap(), 2);
    }

    #[test]
    fn to_node_rejects_non_object_attributes() {
        let mut bad = row("0");
        bad.attributes = "[1,2]".to_string();
        assert!(bad.to_node().is_err());
    }
}
