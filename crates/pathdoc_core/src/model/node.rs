//! Document node model and path-addressed operations.
//!
//! # Responsibility
//! - Own one node's identity, markup, attributes and ordered children.
//! - Implement get/set/delete/insert by positional path on an owned tree.
//! - Convert between nodes and the nested JSON wire format.
//!
//! # Invariants
//! - Children order is the only addressing coordinate.
//! - Parent relation is derived from index paths; nodes never point upward.
//! - Ids change only through `regenerate_ids` or a wholesale import.
//!
//! Operations here are lock-free and report a [`Change`]; shared trees go
//! through [`crate::model::tree::NodeRef`], which adds locking and listener
//! delivery.

use super::attributes::{Attributes, CONTENT_KEY};
use super::error::{DocumentError, DocumentResult};
use super::observer::ObserverSet;
use super::path::{self, NodePath, PathKey, TEXT_ALIAS};
use super::render;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Markup given to roots created without explicit content.
pub const DEFAULT_MARKUP: &str = "document";

const MARKUP_FIELD: &str = "markup";
const ID_FIELD: &str = "id";
const CHILDREN_FIELD: &str = "children";

/// Forest-wide node identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    /// Generates a fresh UUID v4 identifier.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for NodeId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for NodeId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for NodeId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Value accepted by [`Node::set`].
#[derive(Debug)]
pub enum NodeValue {
    /// Subtree copied (with fresh ids) into a child slot.
    Node(Node),
    /// Attribute value, or the markup of a new child for numeric keys.
    Scalar(Value),
}

impl From<Node> for NodeValue {
    fn from(value: Node) -> Self {
        Self::Node(value)
    }
}

impl From<Value> for NodeValue {
    fn from(value: Value) -> Self {
        Self::Scalar(value)
    }
}

impl From<&str> for NodeValue {
    fn from(value: &str) -> Self {
        Self::Scalar(Value::String(value.to_string()))
    }
}

impl From<String> for NodeValue {
    fn from(value: String) -> Self {
        Self::Scalar(Value::String(value))
    }
}

/// Result of [`Node::get`].
#[derive(Debug)]
pub enum PathValue {
    /// Detached copy of the addressed child (ids preserved, no listeners).
    Node(Node),
    /// Attribute value.
    Value(Value),
    /// `text` requested on a node without content.
    Absent,
}

impl PathValue {
    /// JSON form: nodes serialize, absence becomes `null`.
    pub fn to_value(&self) -> Value {
        match self {
            Self::Node(node) => node.to_value(),
            Self::Value(value) => value.clone(),
            Self::Absent => Value::Null,
        }
    }

    pub fn as_node(&self) -> Option<&Node> {
        match self {
            Self::Node(node) => Some(node),
            _ => None,
        }
    }
}

/// What a successful mutation did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeKind {
    /// A child was placed at `index`.
    Inserted { index: usize, child: NodeId },
    /// The child previously at `index` was removed.
    Removed { index: usize, child: NodeId },
    /// One attribute was assigned or removed.
    Attribute { key: String },
    /// The node and its subtree were rebuilt by an import.
    Replaced,
}

/// Mutation report: the mutated node and what happened to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change {
    /// Index path of the mutated node. Relative to the node the operation ran
    /// on for [`Node`] methods, absolute from the root for `NodeRef` methods.
    pub path: Vec<usize>,
    /// Id of the mutated node.
    pub node: NodeId,
    pub kind: ChangeKind,
}

/// One element of a document tree.
#[derive(Debug)]
pub struct Node {
    id: NodeId,
    markup: String,
    attributes: Attributes,
    children: Vec<Node>,
    observers: ObserverSet,
}

impl Default for Node {
    fn default() -> Self {
        Self::new(DEFAULT_MARKUP)
    }
}

impl Node {
    /// Creates an empty node with a generated id.
    pub fn new(markup: impl Into<String>) -> Self {
        Self::with_id(NodeId::generate(), markup)
    }

    /// Creates an empty node with a caller-provided id.
    ///
    /// Used by import and row reconstruction where identity already exists.
    pub fn with_id(id: NodeId, markup: impl Into<String>) -> Self {
        Self {
            id,
            markup: markup.into(),
            attributes: Attributes::default(),
            children: Vec::new(),
            observers: ObserverSet::default(),
        }
    }

    pub fn with_attributes(mut self, attributes: Attributes) -> Self {
        self.attributes = attributes;
        self
    }

    /// Appends `child` and returns `self` for tree building.
    pub fn with_child(mut self, child: Node) -> Self {
        self.children.push(child);
        self
    }

    pub fn id(&self) -> &NodeId {
        &self.id
    }

    pub fn markup(&self) -> &str {
        &self.markup
    }

    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    pub fn attributes_mut(&mut self) -> &mut Attributes {
        &mut self.attributes
    }

    pub fn children(&self) -> &[Node] {
        &self.children
    }

    pub(crate) fn children_mut(&mut self) -> &mut Vec<Node> {
        &mut self.children
    }

    pub fn observers(&self) -> &ObserverSet {
        &self.observers
    }

    pub(crate) fn observers_mut(&mut self) -> &mut ObserverSet {
        &mut self.observers
    }

    /// Deep copy keeping ids but dropping listeners.
    pub fn snapshot(&self) -> Node {
        Node {
            id: self.id.clone(),
            markup: self.markup.clone(),
            attributes: self.attributes.clone(),
            children: self.children.iter().map(Node::snapshot).collect(),
            observers: ObserverSet::default(),
        }
    }

    /// Assigns a fresh id to this node and every descendant.
    pub fn regenerate_ids(&mut self) {
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            node.id = NodeId::generate();
            stack.extend(node.children.iter_mut());
        }
    }

    /// Builds a node tree from the nested JSON wire format.
    pub fn from_value(data: &Value) -> DocumentResult<Node> {
        let mut node = Node::default();
        node.fill_from_value(data)?;
        Ok(node)
    }

    pub fn from_json_str(data: &str) -> DocumentResult<Node> {
        let value: Value = serde_json::from_str(data)?;
        Self::from_value(&value)
    }

    /// Replaces this node and its subtree with `data`, keeping listeners
    /// registered on this node.
    ///
    /// # Errors
    /// - `MissingField("markup")` when any object in `data` lacks markup.
    /// - On error the node is left unchanged.
    pub fn import_value(&mut self, data: &Value) -> DocumentResult<Change> {
        let mut rebuilt = Node::default();
        rebuilt.fill_from_value(data)?;
        rebuilt.observers = std::mem::take(&mut self.observers);
        *self = rebuilt;
        Ok(Change {
            path: Vec::new(),
            node: self.id.clone(),
            kind: ChangeKind::Replaced,
        })
    }

    fn fill_from_value(&mut self, data: &Value) -> DocumentResult<()> {
        let object = data.as_object().ok_or(DocumentError::InvalidAttribute {
            key: "document".to_string(),
            expected: "a JSON object",
        })?;

        let markup = match object.get(MARKUP_FIELD) {
            None => return Err(DocumentError::MissingField(MARKUP_FIELD)),
            Some(Value::String(markup)) => markup.clone(),
            Some(_) => {
                return Err(DocumentError::InvalidAttribute {
                    key: MARKUP_FIELD.to_string(),
                    expected: "a string",
                })
            }
        };
        let id = match object.get(ID_FIELD) {
            None | Some(Value::Null) => NodeId::generate(),
            Some(Value::String(id)) if !id.is_empty() => NodeId::from(id.as_str()),
            Some(_) => {
                return Err(DocumentError::InvalidAttribute {
                    key: ID_FIELD.to_string(),
                    expected: "a non-empty string",
                })
            }
        };

        let mut attributes = Attributes::default();
        for (key, value) in object {
            if matches!(key.as_str(), MARKUP_FIELD | ID_FIELD | CHILDREN_FIELD) {
                continue;
            }
            attributes.set(key, value.clone());
        }

        let children = match object.get(CHILDREN_FIELD) {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => items
                .iter()
                .map(Node::from_value)
                .collect::<DocumentResult<Vec<_>>>()?,
            Some(_) => {
                return Err(DocumentError::InvalidAttribute {
                    key: CHILDREN_FIELD.to_string(),
                    expected: "an array",
                })
            }
        };

        self.id = id;
        self.markup = markup;
        self.attributes = attributes;
        self.children = children;
        Ok(())
    }

    /// Serializes to `{markup, id, ...attributes, children?}`.
    pub fn to_value(&self) -> Value {
        let mut object = Map::new();
        object.insert(MARKUP_FIELD.to_string(), Value::String(self.markup.clone()));
        object.insert(ID_FIELD.to_string(), Value::String(self.id.0.clone()));
        object.extend(self.attributes.to_map());
        if !self.children.is_empty() {
            object.insert(
                CHILDREN_FIELD.to_string(),
                Value::Array(self.children.iter().map(Node::to_value).collect()),
            );
        }
        Value::Object(object)
    }

    /// Pretty-printed JSON form of [`Node::to_value`].
    pub fn to_json(&self) -> String {
        format!("{:#}", self.to_value())
    }

    pub fn render(&self) -> String {
        render::render(self)
    }

    /// Depth-first search of this subtree.
    pub fn find_by_id(&self, id: &NodeId) -> Option<&Node> {
        let indices = self.index_path_of(id)?;
        path::walk(self, &indices)
    }

    pub fn find_by_id_mut(&mut self, id: &NodeId) -> Option<&mut Node> {
        let indices = self.index_path_of(id)?;
        path::walk_mut(self, &indices)
    }

    /// Depth-first index path from this node to `id` (`[]` for self).
    pub fn index_path_of(&self, id: &NodeId) -> Option<Vec<usize>> {
        if self.id == *id {
            return Some(Vec::new());
        }

        // Each frame is (node, next child to visit); the index chain mirrors
        // the frames below the top.
        let mut frames: Vec<(&Node, usize)> = vec![(self, 0)];
        let mut indices: Vec<usize> = Vec::new();
        while let Some(frame) = frames.last_mut() {
            let (node, next) = *frame;
            let Some(child) = node.children.get(next) else {
                frames.pop();
                indices.pop();
                continue;
            };
            frame.1 += 1;
            indices.push(next);
            if child.id == *id {
                return Some(indices);
            }
            frames.push((child, 0));
        }
        None
    }

    /// Slash-joined form of [`Node::index_path_of`].
    pub fn path_to(&self, id: &NodeId) -> Option<String> {
        self.index_path_of(id)
            .map(|indices| path::join_indices(&indices))
    }

    /// Collects serialized `text` nodes whose content contains `text`.
    pub fn search(&self, text: &str) -> Vec<Value> {
        let mut hits = Vec::new();
        self.visit_depth_first(&mut |node: &Node| {
            let matches = node.markup == "text"
                && node
                    .attributes
                    .content()
                    .is_some_and(|content| !content.is_empty() && content.contains(text));
            if matches {
                hits.push(node.to_value());
            }
        });
        hits
    }

    /// `(id, markup)` of every descendant, depth-first.
    pub fn list(&self) -> Vec<(NodeId, String)> {
        let mut items = Vec::new();
        for child in &self.children {
            child.visit_depth_first(&mut |node: &Node| {
                items.push((node.id.clone(), node.markup.clone()));
            });
        }
        items
    }

    fn visit_depth_first(&self, visit: &mut impl FnMut(&Node)) {
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            visit(node);
            stack.extend(node.children.iter().rev());
        }
    }

    /// Reads the node or attribute addressed by `path`.
    ///
    /// # Errors
    /// - `InvalidPath` from resolution.
    /// - `IndexOutOfRange` for a numeric key past the last child.
    /// - `PathNotFound` for an unknown attribute name.
    pub fn get(&self, path: &str) -> DocumentResult<PathValue> {
        let parsed = NodePath::parse(path)?;
        let node = path::resolve(self, &parsed)?;

        match parsed.key() {
            PathKey::Index(index) => node
                .children
                .get(*index)
                .map(|child| PathValue::Node(child.snapshot()))
                .ok_or(DocumentError::IndexOutOfRange {
                    index: *index,
                    len: node.children.len(),
                }),
            PathKey::Name(key) if key == TEXT_ALIAS => Ok(node
                .attributes
                .get(CONTENT_KEY)
                .map_or(PathValue::Absent, PathValue::Value)),
            PathKey::Name(key) => node
                .attributes
                .get(key)
                .map(PathValue::Value)
                .ok_or_else(|| DocumentError::PathNotFound(path.to_string())),
        }
    }

    /// Writes a child slot or an attribute.
    ///
    /// Numeric keys insert a new child: a [`NodeValue::Node`] is copied with
    /// fresh ids, a scalar becomes an empty node whose markup is its string
    /// form. `text` writes `content`; any other name creates or replaces that
    /// attribute.
    pub fn set(&mut self, path: &str, value: impl Into<NodeValue>) -> DocumentResult<Change> {
        let parsed = NodePath::parse(path)?;
        let value = value.into();
        let node = path::resolve_mut(self, &parsed)?;

        match parsed.key() {
            PathKey::Index(index) => {
                let child = match value {
                    NodeValue::Node(source) => {
                        let mut copy = source.snapshot();
                        copy.regenerate_ids();
                        copy
                    }
                    NodeValue::Scalar(scalar) => Node::new(scalar_markup(scalar)),
                };
                node.place_child(*index, child)?;
                Ok(Change {
                    path: parsed.steps().to_vec(),
                    node: node.id.clone(),
                    kind: ChangeKind::Inserted {
                        index: *index,
                        child: node.children[*index].id.clone(),
                    },
                })
            }
            PathKey::Name(key) => {
                let key = if key == TEXT_ALIAS { CONTENT_KEY } else { key.as_str() };
                let value = match value {
                    NodeValue::Node(source) => source.to_value(),
                    NodeValue::Scalar(scalar) => scalar,
                };
                node.attributes.set(key, value);
                Ok(Change {
                    path: parsed.steps().to_vec(),
                    node: node.id.clone(),
                    kind: ChangeKind::Attribute {
                        key: key.to_string(),
                    },
                })
            }
        }
    }

    /// Places `child` at a numeric path, keeping its ids.
    ///
    /// # Errors
    /// - `InvalidPath` when the terminal key is not numeric.
    /// - `IndexOutOfRange` when the index is past `len(children)`.
    pub fn insert(&mut self, path: &str, child: Node) -> DocumentResult<Change> {
        let parsed = NodePath::parse(path)?;
        let index = parsed.index().ok_or_else(|| {
            DocumentError::invalid_path(path, "insert path must end in a numeric index")
        })?;
        let node = path::resolve_mut(self, &parsed)?;
        let child_id = child.id.clone();
        node.place_child(index, child)?;
        Ok(Change {
            path: parsed.steps().to_vec(),
            node: node.id.clone(),
            kind: ChangeKind::Inserted {
                index,
                child: child_id,
            },
        })
    }

    /// Removes a child slot or an attribute.
    ///
    /// # Errors
    /// - `IndexOutOfRange` for a numeric key without a child.
    /// - `InvalidKey` for a name that is neither `text` nor an attribute.
    pub fn delete(&mut self, path: &str) -> DocumentResult<Change> {
        let parsed = NodePath::parse(path)?;
        let node = path::resolve_mut(self, &parsed)?;

        let kind = match parsed.key() {
            PathKey::Index(index) => {
                if *index >= node.children.len() {
                    return Err(DocumentError::IndexOutOfRange {
                        index: *index,
                        len: node.children.len(),
                    });
                }
                let removed = node.children.remove(*index);
                ChangeKind::Removed {
                    index: *index,
                    child: removed.id,
                }
            }
            PathKey::Name(key) if key == TEXT_ALIAS => {
                node.attributes.remove(CONTENT_KEY);
                ChangeKind::Attribute {
                    key: CONTENT_KEY.to_string(),
                }
            }
            PathKey::Name(key) => {
                if node.attributes.remove(key).is_none() {
                    return Err(DocumentError::InvalidKey(key.clone()));
                }
                ChangeKind::Attribute { key: key.clone() }
            }
        };

        Ok(Change {
            path: parsed.steps().to_vec(),
            node: node.id.clone(),
            kind,
        })
    }

    /// Removes the descendant `id`; `Ok(None)` when it is not below this node.
    pub fn delete_by_id(&mut self, id: &NodeId) -> DocumentResult<Option<Change>> {
        let Some(indices) = self.index_path_of(id) else {
            return Ok(None);
        };
        if indices.is_empty() {
            return Err(DocumentError::invalid_path("", "a node cannot delete itself"));
        }
        self.delete(&path::join_indices(&indices)).map(Some)
    }

    fn place_child(&mut self, index: usize, child: Node) -> DocumentResult<()> {
        if index > self.children.len() {
            return Err(DocumentError::IndexOutOfRange {
                index,
                len: self.children.len(),
            });
        }
        self.children.insert(index, child);
        Ok(())
    }
}

fn scalar_markup(value: Value) -> String {
    match value {
        Value::String(text) => text,
        other => other.to_string(),
    }
}
