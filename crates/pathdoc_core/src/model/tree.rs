//! Shared document trees and node handles.
//!
//! # Responsibility
//! - Give every root tree its own exclusive region.
//! - Address any node of a shared tree by id and run path operations on it.
//! - Deliver one rendered root snapshot to listeners after each mutation.
//!
//! # Invariants
//! - Reads and writes of one tree are serialized by the tree mutex.
//! - Listeners are collected and the snapshot rendered while the region is
//!   held; delivery happens after it is released, so a listener may read the
//!   tree again.
//! - The ancestor walk is iterative and bounded by tree depth.

use super::error::{DocumentError, DocumentResult};
use super::node::{Change, Node, NodeId, PathValue};
use super::observer::{broadcast, DocumentObserver, WatchId};
use super::path;
use log::debug;
use serde_json::Value;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// One root tree behind its own mutex.
#[derive(Debug)]
pub struct DocumentTree {
    root: Mutex<Node>,
}

impl DocumentTree {
    pub fn new(root: Node) -> Self {
        Self {
            root: Mutex::new(root),
        }
    }

    /// Current id of the root node.
    pub fn root_id(&self) -> NodeId {
        self.lock().id().clone()
    }

    /// Runs `read` against the root while holding the tree region.
    pub fn read<R>(&self, read: impl FnOnce(&Node) -> R) -> R {
        read(&self.lock())
    }

    fn lock(&self) -> MutexGuard<'_, Node> {
        // A panic while holding the region leaves a structurally valid tree.
        self.root.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Handle on one node of a shared tree, addressed by id.
///
/// The handle stays valid while the node exists; structural edits elsewhere
/// in the tree do not invalidate it.
#[derive(Debug, Clone)]
pub struct NodeRef {
    tree: Arc<DocumentTree>,
    id: NodeId,
}

impl NodeRef {
    /// Handle on the root of `tree`.
    pub fn root(tree: Arc<DocumentTree>) -> Self {
        let id = tree.root_id();
        Self { tree, id }
    }

    pub(crate) fn new(tree: Arc<DocumentTree>, id: NodeId) -> Self {
        Self { tree, id }
    }

    pub fn id(&self) -> &NodeId {
        &self.id
    }

    pub fn tree(&self) -> &Arc<DocumentTree> {
        &self.tree
    }

    pub fn is_root(&self) -> bool {
        self.tree.root_id() == self.id
    }

    /// See [`Node::get`].
    pub fn get(&self, path: &str) -> DocumentResult<PathValue> {
        self.read(|node| node.get(path))?
    }

    /// See [`Node::set`].
    pub fn set(
        &self,
        path: &str,
        value: impl Into<super::node::NodeValue>,
    ) -> DocumentResult<Change> {
        self.mutate(|node| node.set(path, value))
    }

    /// See [`Node::delete`].
    pub fn delete(&self, path: &str) -> DocumentResult<Change> {
        self.mutate(|node| node.delete(path))
    }

    /// See [`Node::insert`].
    pub fn insert(&self, path: &str, child: Node) -> DocumentResult<Change> {
        self.mutate(|node| node.insert(path, child))
    }

    /// Replaces the addressed node with `data`; the handle follows the new id.
    pub fn import_json(&mut self, data: &Value) -> DocumentResult<Change> {
        let change = self.mutate(|node| node.import_value(data))?;
        self.id = change.node.clone();
        Ok(change)
    }

    pub fn import_json_str(&mut self, data: &str) -> DocumentResult<Change> {
        let value: Value = serde_json::from_str(data)?;
        self.import_json(&value)
    }

    /// Removes the descendant `id` from this subtree.
    ///
    /// Returns `Ok(None)` when `id` is not below this node.
    /// Lookup and removal share one hold of the tree region.
    pub fn delete_by_id(&self, id: &NodeId) -> DocumentResult<Option<Change>> {
        self.mutate_if(|node| node.delete_by_id(id))
    }

    pub fn markup(&self) -> DocumentResult<String> {
        self.read(|node| node.markup().to_string())
    }

    pub fn snapshot(&self) -> DocumentResult<Node> {
        self.read(Node::snapshot)
    }

    pub fn to_value(&self) -> DocumentResult<Value> {
        self.read(Node::to_value)
    }

    pub fn to_json(&self) -> DocumentResult<String> {
        self.read(Node::to_json)
    }

    pub fn render(&self) -> DocumentResult<String> {
        self.read(Node::render)
    }

    pub fn search(&self, text: &str) -> DocumentResult<Vec<Value>> {
        self.read(|node| node.search(text))
    }

    pub fn list(&self) -> DocumentResult<Vec<(NodeId, String)>> {
        self.read(Node::list)
    }

    /// Relative path from this node to `id`, if `id` is in this subtree.
    pub fn path_to(&self, id: &NodeId) -> DocumentResult<Option<String>> {
        self.read(|node| node.path_to(id))
    }

    /// Absolute index path of this node from the tree root.
    pub fn absolute_path(&self) -> DocumentResult<Vec<usize>> {
        let root = self.tree.lock();
        root.index_path_of(&self.id)
            .ok_or_else(|| DocumentError::NodeNotFound(self.id.clone()))
    }

    /// Handle on a node of this subtree.
    pub fn find_by_id(&self, id: &NodeId) -> DocumentResult<Option<NodeRef>> {
        let found = self.read(|node| node.find_by_id(id).is_some())?;
        Ok(found.then(|| NodeRef::new(Arc::clone(&self.tree), id.clone())))
    }

    /// Handle on the parent node, `None` for the root.
    pub fn parent(&self) -> DocumentResult<Option<NodeRef>> {
        let root = self.tree.lock();
        let mut indices = root
            .index_path_of(&self.id)
            .ok_or_else(|| DocumentError::NodeNotFound(self.id.clone()))?;
        if indices.pop().is_none() {
            return Ok(None);
        }
        let parent_id = path::walk(&root, &indices)
            .map(|parent| parent.id().clone())
            .ok_or_else(|| DocumentError::NodeNotFound(self.id.clone()))?;
        Ok(Some(NodeRef::new(Arc::clone(&self.tree), parent_id)))
    }

    /// Registers a listener on this node.
    pub fn watch(&self, observer: Arc<dyn DocumentObserver>) -> DocumentResult<WatchId> {
        self.write_node(|node| node.observers_mut().add(observer))
    }

    /// Returns whether the handle was registered on this node.
    pub fn unwatch(&self, watch_id: WatchId) -> DocumentResult<bool> {
        self.write_node(|node| node.observers_mut().remove(watch_id))
    }

    fn read<R>(&self, read: impl FnOnce(&Node) -> R) -> DocumentResult<R> {
        let root = self.tree.lock();
        let indices = root
            .index_path_of(&self.id)
            .ok_or_else(|| DocumentError::NodeNotFound(self.id.clone()))?;
        let node = path::walk(&root, &indices)
            .ok_or_else(|| DocumentError::NodeNotFound(self.id.clone()))?;
        Ok(read(node))
    }

    fn write_node<R>(&self, write: impl FnOnce(&mut Node) -> R) -> DocumentResult<R> {
        let mut root = self.tree.lock();
        let indices = root
            .index_path_of(&self.id)
            .ok_or_else(|| DocumentError::NodeNotFound(self.id.clone()))?;
        let node = path::walk_mut(&mut root, &indices)
            .ok_or_else(|| DocumentError::NodeNotFound(self.id.clone()))?;
        Ok(write(node))
    }

    /// Runs one mutation and notifies listeners from the mutated node up.
    fn mutate(
        &self,
        operation: impl FnOnce(&mut Node) -> DocumentResult<Change>,
    ) -> DocumentResult<Change> {
        self.mutate_if(|node| operation(node).map(Some))?
            .ok_or_else(|| DocumentError::NodeNotFound(self.id.clone()))
    }

    /// Like [`NodeRef::mutate`], for operations that may find nothing to do.
    fn mutate_if(
        &self,
        operation: impl FnOnce(&mut Node) -> DocumentResult<Option<Change>>,
    ) -> DocumentResult<Option<Change>> {
        let (change, observers, snapshot) = {
            let mut root = self.tree.lock();
            let base = root
                .index_path_of(&self.id)
                .ok_or_else(|| DocumentError::NodeNotFound(self.id.clone()))?;
            let node = path::walk_mut(&mut root, &base)
                .ok_or_else(|| DocumentError::NodeNotFound(self.id.clone()))?;

            let Some(mut change) = operation(node)? else {
                return Ok(None);
            };
            let mut absolute = base;
            absolute.append(&mut change.path);
            change.path = absolute;

            let mut observers = Vec::new();
            let mut cursor: Option<&Node> = Some(&*root);
            for &index in &change.path {
                if let Some(node) = cursor {
                    node.observers().collect_into(&mut observers);
                    cursor = node.children().get(index);
                }
            }
            if let Some(node) = cursor {
                node.observers().collect_into(&mut observers);
            }

            let snapshot = if observers.is_empty() {
                String::new()
            } else {
                root.render()
            };
            (change, observers, snapshot)
        };

        if !observers.is_empty() {
            let delivered = broadcast(&observers, &snapshot, &change.node);
            debug!(
                "event=observer_update module=model status=ok origin={} listeners={} delivered={}",
                change.node,
                observers.len(),
                delivered
            );
        }
        Ok(Some(change))
    }
}
