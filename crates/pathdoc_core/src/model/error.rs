//! Error taxonomy for in-memory document operations.

use std::error::Error;
use std::fmt::{Display, Formatter};

use super::node::NodeId;

/// Result type used by document tree operations.
pub type DocumentResult<T> = Result<T, DocumentError>;

/// Errors from path resolution, tree mutation and JSON import.
#[derive(Debug)]
pub enum DocumentError {
    /// Path is empty, has a non-numeric inner component, or walks past the
    /// children of an inner node.
    InvalidPath { path: String, reason: String },
    /// Path is well formed but names no attribute.
    PathNotFound(String),
    /// Numeric terminal key addresses no child slot.
    IndexOutOfRange { index: usize, len: usize },
    /// Delete target names neither a child index nor an attribute.
    InvalidKey(String),
    /// Import payload lacks a required field.
    MissingField(&'static str),
    /// Reserved attribute or import field has the wrong JSON type.
    InvalidAttribute { key: String, expected: &'static str },
    /// Handle points at a node that no longer exists in its tree.
    NodeNotFound(NodeId),
    /// Import payload is not valid JSON.
    Json(serde_json::Error),
}

impl DocumentError {
    pub(crate) fn invalid_path(path: &str, reason: impl Into<String>) -> Self {
        Self::InvalidPath {
            path: path.to_string(),
            reason: reason.into(),
        }
    }
}

impl Display for DocumentError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidPath { path, reason } => write!(f, "invalid path `{path}`: {reason}"),
            Self::PathNotFound(path) => write!(f, "path not found: `{path}`"),
            Self::IndexOutOfRange { index, len } => {
                write!(f, "child index {index} out of range for {len} children")
            }
            Self::InvalidKey(key) => write!(f, "invalid key in path: `{key}`"),
            Self::MissingField(field) => write!(f, "missing `{field}` in document data"),
            Self::InvalidAttribute { key, expected } => {
                write!(f, "attribute `{key}` must be {expected}")
            }
            Self::NodeNotFound(id) => write!(f, "document node not found: {id}"),
            Self::Json(err) => write!(f, "invalid document json: {err}"),
        }
    }
}

impl Error for DocumentError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Json(err) => Some(err),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for DocumentError {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value)
    }
}
