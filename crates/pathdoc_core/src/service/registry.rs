//! In-memory registry of root documents.
//!
//! # Responsibility
//! - Own every root tree and resolve ids across the whole forest.
//! - Gate root deletion on an attachment set per root.
//!
//! # Invariants
//! - Roots are scanned in registration order; the first match wins.
//! - A root with a non-empty attachment set cannot be deleted.
//! - The registry lock is never held while a tree mutation notifies
//!   listeners, so listeners may call back into the registry.

use crate::model::error::DocumentError;
use crate::model::node::{Change, Node, NodeId};
use crate::model::tree::{DocumentTree, NodeRef};
use log::info;
use serde_json::Value;
use std::collections::HashSet;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

pub type RegistryResult<T> = Result<T, RegistryError>;

/// Errors from registry operations.
#[derive(Debug)]
pub enum RegistryError {
    /// Id matches neither a root nor any descendant.
    NotFound(NodeId),
    /// Root still has attached holders.
    PermissionDenied { id: NodeId, holders: usize },
    /// Tree-level failure while acting on a resolved node.
    Document(DocumentError),
}

impl Display for RegistryError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound(id) => write!(f, "document node not found: {id}"),
            Self::PermissionDenied { id, holders } => write!(
                f,
                "attached users present: document {id} has {holders} holder(s)"
            ),
            Self::Document(err) => write!(f, "{err}"),
        }
    }
}

impl Error for RegistryError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Document(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DocumentError> for RegistryError {
    fn from(value: DocumentError) -> Self {
        Self::Document(value)
    }
}

/// Outcome of [`DocumentRegistry::delete`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Deletion {
    /// A whole root tree and its attachment set were dropped.
    Root(NodeId),
    /// A descendant was removed from the tree rooted at `root_id`.
    Descendant { root_id: NodeId, change: Change },
}

#[derive(Debug)]
struct RegistryEntry {
    tree: Arc<DocumentTree>,
    attachments: HashSet<String>,
}

impl RegistryEntry {
    fn new(root: Node) -> Self {
        Self {
            tree: Arc::new(DocumentTree::new(root)),
            attachments: HashSet::new(),
        }
    }
}

/// Forest of root documents behind one coarse lock.
#[derive(Debug, Default)]
pub struct DocumentRegistry {
    entries: Mutex<Vec<RegistryEntry>>,
}

impl DocumentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new empty `document` root and returns its handle.
    pub fn create(&self) -> NodeRef {
        self.register(Node::default())
    }

    /// Takes ownership of `root` as a new root tree.
    pub fn register(&self, root: Node) -> NodeRef {
        let entry = RegistryEntry::new(root);
        let handle = NodeRef::root(Arc::clone(&entry.tree));
        self.lock().push(entry);
        info!(
            "event=document_create module=service status=ok document_id={}",
            handle.id()
        );
        handle
    }

    /// Builds a root from nested JSON and registers it.
    pub fn import_document(&self, data: &Value) -> RegistryResult<NodeRef> {
        let root = Node::from_value(data)?;
        Ok(self.register(root))
    }

    /// Handle on the first node carrying `id`, roots scanned in registration
    /// order.
    pub fn find_by_id(&self, id: &NodeId) -> Option<NodeRef> {
        self.tree_containing(id)
            .map(|tree| NodeRef::new(tree, id.clone()))
    }

    /// Handle on the root of the tree that contains `id`.
    pub fn root_of(&self, id: &NodeId) -> Option<NodeRef> {
        self.tree_containing(id).map(NodeRef::root)
    }

    /// Deletes a root tree or a descendant node.
    ///
    /// # Errors
    /// - `NotFound` when no tree contains `id`.
    /// - `PermissionDenied` when `id` is a root with attached holders.
    pub fn delete(&self, id: &NodeId) -> RegistryResult<Deletion> {
        let tree = {
            let mut entries = self.lock();
            let position = entries
                .iter()
                .position(|entry| entry.tree.read(|root| root.find_by_id(id).is_some()))
                .ok_or_else(|| RegistryError::NotFound(id.clone()))?;

            let entry = &entries[position];
            if entry.tree.root_id() == *id {
                if !entry.attachments.is_empty() {
                    return Err(RegistryError::PermissionDenied {
                        id: id.clone(),
                        holders: entry.attachments.len(),
                    });
                }
                entries.remove(position);
                info!(
                    "event=document_delete module=service status=ok document_id={} scope=root",
                    id
                );
                return Ok(Deletion::Root(id.clone()));
            }
            Arc::clone(&entry.tree)
        };

        // Descendant delete notifies listeners; the registry lock is released.
        let root = NodeRef::root(tree);
        let change = root
            .delete_by_id(id)?
            .ok_or_else(|| RegistryError::NotFound(id.clone()))?;
        info!(
            "event=document_delete module=service status=ok document_id={} root_id={} scope=descendant",
            id,
            root.id()
        );
        Ok(Deletion::Descendant {
            root_id: root.id().clone(),
            change,
        })
    }

    /// Adds `holder` to the attachment set of root `id`.
    ///
    /// Returns whether the holder was newly attached.
    pub fn attach(&self, id: &NodeId, holder: impl Into<String>) -> RegistryResult<bool> {
        let mut entries = self.lock();
        let entry = find_root_entry(&mut entries, id)?;
        Ok(entry.attachments.insert(holder.into()))
    }

    /// Removes `holder` from the attachment set of root `id`.
    ///
    /// Returns whether the holder was attached.
    pub fn detach(&self, id: &NodeId, holder: &str) -> RegistryResult<bool> {
        let mut entries = self.lock();
        let entry = find_root_entry(&mut entries, id)?;
        Ok(entry.attachments.remove(holder))
    }

    /// `(id, markup)` of every node, depth-first per root.
    pub fn list_all(&self) -> Vec<(NodeId, String)> {
        let mut items = Vec::new();
        for entry in self.lock().iter() {
            entry.tree.read(|root| {
                items.push((root.id().clone(), root.markup().to_string()));
                items.extend(root.list());
            });
        }
        items
    }

    /// `(id, markup)` of every root in registration order.
    pub fn list_roots(&self) -> Vec<(NodeId, String)> {
        self.lock()
            .iter()
            .map(|entry| entry.tree.read(|root| (root.id().clone(), root.markup().to_string())))
            .collect()
    }

    /// Roots `holder` is attached to.
    pub fn list_attached(&self, holder: &str) -> Vec<NodeId> {
        self.lock()
            .iter()
            .filter(|entry| entry.attachments.contains(holder))
            .map(|entry| entry.tree.root_id())
            .collect()
    }

    /// Detached copies of every root, in registration order.
    pub fn export_roots(&self) -> Vec<Node> {
        self.lock()
            .iter()
            .map(|entry| entry.tree.read(Node::snapshot))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn tree_containing(&self, id: &NodeId) -> Option<Arc<DocumentTree>> {
        self.lock()
            .iter()
            .find(|entry| entry.tree.read(|root| root.find_by_id(id).is_some()))
            .map(|entry| Arc::clone(&entry.tree))
    }

    fn lock(&self) -> MutexGuard<'_, Vec<RegistryEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn find_root_entry<'a>(
    entries: &'a mut [RegistryEntry],
    id: &NodeId,
) -> RegistryResult<&'a mut RegistryEntry> {
    entries
        .iter_mut()
        .find(|entry| entry.tree.root_id() == *id)
        .ok_or_else(|| RegistryError::NotFound(id.clone()))
}
