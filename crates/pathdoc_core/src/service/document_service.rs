//! Write-through document use-case service.
//!
//! # Responsibility
//! - Hydrate the registry from the flattened store at open.
//! - Route every in-memory mutation to the matching incremental store
//!   operation.
//! - Export and import whole-document snapshots through a blob store.
//!
//! # Invariants
//! - Memory is mutated first; a store failure afterwards surfaces as
//!   `ServiceError::NotDurable` and the in-memory change is kept.
//! - A service over `SqliteNodeStore` borrows its connection and stays on
//!   the thread that owns it; calls run one at a time, so store writes
//!   apply in the same order as memory writes.
//! - Listeners run before the store write of the change that woke them and
//!   must not write through the service.

use crate::model::error::DocumentError;
use crate::model::node::{Change, ChangeKind, Node, NodeId, NodeValue, PathValue};
use crate::model::path::{self, join_indices};
use crate::model::tree::NodeRef;
use crate::repo::blob_store::BlobStore;
use crate::repo::node_store::{NodeStore, StoreError, StoreResult};
use crate::service::registry::{Deletion, DocumentRegistry, RegistryError};
use log::{error, info};
use serde_json::Value;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Errors from document service operations.
#[derive(Debug)]
pub enum ServiceError {
    Registry(RegistryError),
    Document(DocumentError),
    /// Store failure with no in-memory change applied.
    Store(StoreError),
    /// The in-memory tree was mutated but the store write failed.
    NotDurable { node: NodeId, source: StoreError },
}

impl Display for ServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Registry(err) => write!(f, "{err}"),
            Self::Document(err) => write!(f, "{err}"),
            Self::Store(err) => write!(f, "{err}"),
            Self::NotDurable { node, source } => write!(
                f,
                "node {node} mutated in memory but not persisted: {source}"
            ),
        }
    }
}

impl Error for ServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Registry(err) => Some(err),
            Self::Document(err) => Some(err),
            Self::Store(err) => Some(err),
            Self::NotDurable { source, .. } => Some(source),
        }
    }
}

impl From<RegistryError> for ServiceError {
    fn from(value: RegistryError) -> Self {
        Self::Registry(value)
    }
}

impl From<DocumentError> for ServiceError {
    fn from(value: DocumentError) -> Self {
        Self::Document(value)
    }
}

impl From<StoreError> for ServiceError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

/// Use-case facade over the registry and a flattened store.
pub struct DocumentService<S: NodeStore> {
    registry: DocumentRegistry,
    store: S,
}

impl<S: NodeStore> DocumentService<S> {
    /// Creates a service with an empty registry.
    pub fn new(store: S) -> Self {
        Self {
            registry: DocumentRegistry::new(),
            store,
        }
    }

    /// Creates a service and registers every root found in `store`.
    pub fn open(store: S) -> ServiceResult<Self> {
        let service = Self::new(store);
        let roots = service.store.list_roots()?;
        for root_id in &roots {
            match service.store.reconstruct(root_id)? {
                Some(root) => {
                    service.registry.register(root);
                }
                None => return Err(StoreError::NodeNotFound(root_id.clone()).into()),
            }
        }
        info!(
            "event=service_open module=service status=ok roots={}",
            roots.len()
        );
        Ok(service)
    }

    pub fn registry(&self) -> &DocumentRegistry {
        &self.registry
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Registers and persists a new empty document root.
    pub fn create(&self) -> ServiceResult<NodeRef> {
        let handle = self.registry.create();
        self.persist_root(&handle)?;
        Ok(handle)
    }

    /// Registers and persists a document built from nested JSON.
    pub fn import_document(&self, data: &Value) -> ServiceResult<NodeRef> {
        let handle = self.registry.import_document(data)?;
        self.persist_root(&handle)?;
        Ok(handle)
    }

    /// Handle on any registered node.
    pub fn find(&self, id: &NodeId) -> ServiceResult<NodeRef> {
        self.registry
            .find_by_id(id)
            .ok_or_else(|| RegistryError::NotFound(id.clone()).into())
    }

    pub fn get(&self, id: &NodeId, path: &str) -> ServiceResult<PathValue> {
        Ok(self.find(id)?.get(path)?)
    }

    pub fn set(
        &self,
        id: &NodeId,
        path: &str,
        value: impl Into<NodeValue>,
    ) -> ServiceResult<Change> {
        let handle = self.find(id)?;
        let change = handle.set(path, value)?;
        self.sync(&handle, &change)?;
        Ok(change)
    }

    /// Places `child` at `path` keeping its ids.
    pub fn insert(&self, id: &NodeId, path: &str, child: Node) -> ServiceResult<Change> {
        let handle = self.find(id)?;
        let change = handle.insert(path, child)?;
        self.sync(&handle, &change)?;
        Ok(change)
    }

    /// Removes a child slot or attribute addressed relative to `id`.
    pub fn delete_path(&self, id: &NodeId, path: &str) -> ServiceResult<Change> {
        let handle = self.find(id)?;
        let change = handle.delete(path)?;
        self.sync(&handle, &change)?;
        Ok(change)
    }

    /// Replaces node `id` with `data`; returns the change naming the new id.
    pub fn import_json(&self, id: &NodeId, data: &Value) -> ServiceResult<Change> {
        let mut handle = self.find(id)?;
        let previous_root = handle.tree().root_id();
        let change = handle.import_json(data)?;
        // A root import may change the root id; rows keyed by the old one go.
        if handle.tree().root_id() != previous_root {
            let dropped = self.store.delete_subtree(&previous_root).map(|_| ());
            self.durable(&change.node, dropped)?;
        }
        self.sync(&handle, &change)?;
        Ok(change)
    }

    /// Deletes a root or descendant from memory and store.
    pub fn delete(&self, id: &NodeId) -> ServiceResult<Deletion> {
        let deletion = self.registry.delete(id)?;
        self.durable(id, self.store.delete_subtree(id).map(|_| ()))?;
        Ok(deletion)
    }

    pub fn attach(&self, id: &NodeId, holder: impl Into<String>) -> ServiceResult<bool> {
        Ok(self.registry.attach(id, holder)?)
    }

    pub fn detach(&self, id: &NodeId, holder: &str) -> ServiceResult<bool> {
        Ok(self.registry.detach(id, holder)?)
    }

    pub fn render(&self, id: &NodeId) -> ServiceResult<String> {
        Ok(self.find(id)?.render()?)
    }

    /// In-memory parent of `id`, `None` for roots.
    pub fn parent(&self, id: &NodeId) -> ServiceResult<Option<NodeRef>> {
        Ok(self.find(id)?.parent()?)
    }

    /// Handle on the node at the materialized index path under `root_id`.
    pub fn get_by_path(&self, root_id: &NodeId, path: &str) -> ServiceResult<Option<NodeRef>> {
        let root = self.find(root_id)?;
        let indices = path::parse_indices(path)
            .ok_or_else(|| DocumentError::invalid_path(path, "expected an index path"))?;
        let found = root
            .tree()
            .read(|node| path::walk(node, &indices).map(|target| target.id().clone()));
        Ok(found.and_then(|target| self.registry.find_by_id(&target)))
    }

    /// Rebuilds node `id` from its stored rows.
    pub fn reload(&self, id: &NodeId) -> ServiceResult<Option<Node>> {
        Ok(self.store.reconstruct(id)?)
    }

    /// Saves a snapshot of every registered root into `blobs`.
    pub fn export_snapshots(&self, blobs: &dyn BlobStore) -> ServiceResult<usize> {
        let roots = self.registry.export_roots();
        for root in &roots {
            blobs.save_document(root)?;
        }
        info!(
            "event=snapshot_export module=service status=ok documents={}",
            roots.len()
        );
        Ok(roots.len())
    }

    /// Registers and persists every snapshot in `blobs` whose root id is
    /// not registered yet.
    pub fn import_snapshots(&self, blobs: &dyn BlobStore) -> ServiceResult<usize> {
        let mut imported = 0;
        for root in blobs.load_documents()? {
            if self.registry.find_by_id(root.id()).is_some() {
                continue;
            }
            let handle = self.registry.register(root);
            self.persist_root(&handle)?;
            imported += 1;
        }
        info!(
            "event=snapshot_import module=service status=ok documents={}",
            imported
        );
        Ok(imported)
    }

    fn persist_root(&self, handle: &NodeRef) -> ServiceResult<()> {
        let written = handle
            .tree()
            .read(|root| self.store.persist_tree(root).map(|_| ()));
        self.durable(handle.id(), written)
    }

    /// Mirrors one in-memory change into the store.
    fn sync(&self, handle: &NodeRef, change: &Change) -> ServiceResult<()> {
        let tree = handle.tree();
        let written: StoreResult<()> = match &change.kind {
            ChangeKind::Inserted { index, .. } => {
                let mut child_path = change.path.clone();
                child_path.push(*index);
                let root_id = tree.root_id();
                tree.read(|root| match path::walk(root, &child_path) {
                    Some(child) => self
                        .store
                        .insert_subtree(&root_id, &join_indices(&child_path), child)
                        .map(|_| ()),
                    None => Err(StoreError::InvalidPath(join_indices(&child_path))),
                })
            }
            ChangeKind::Removed { child, .. } => self.store.delete_subtree(child).map(|_| ()),
            ChangeKind::Attribute { .. } => tree.read(|root| match root.find_by_id(&change.node) {
                Some(node) => self.store.update_node(node),
                None => Err(StoreError::NodeNotFound(change.node.clone())),
            }),
            ChangeKind::Replaced => tree.read(|root| self.store.persist_tree(root).map(|_| ())),
        };
        self.durable(&change.node, written)
    }

    fn durable(&self, node: &NodeId, written: StoreResult<()>) -> ServiceResult<()> {
        written.map_err(|source| {
            error!(
                "event=store_sync module=service status=error node_id={} error={}",
                node, source
            );
            ServiceError::NotDurable {
                node: node.clone(),
                source,
            }
        })
    }
}
