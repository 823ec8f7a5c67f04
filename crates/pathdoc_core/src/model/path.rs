//! Positional path parsing and tree walking.
//!
//! # Responsibility
//! - Parse `i0/i1/.../ik[/key]` strings into typed steps plus a terminal key.
//! - Walk a node tree by child index and return the containing node.
//! - Format and parse the materialized paths used by the row store.
//!
//! # Invariants
//! - Every component before the terminal one is a non-negative integer.
//! - A numeric terminal key is not range-checked here; `len(children)` is a
//!   valid "append" slot and larger values are rejected by the mutation.

use super::error::{DocumentError, DocumentResult};
use super::node::Node;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// Path key that aliases the `content` attribute.
pub const TEXT_ALIAS: &str = "text";

/// Terminal component of a path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathKey {
    /// Child slot under the containing node.
    Index(usize),
    /// Attribute name on the containing node.
    Name(String),
}

/// Parsed positional path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodePath {
    raw: String,
    steps: Vec<usize>,
    key: PathKey,
}

impl NodePath {
    /// Parses a slash-separated path.
    ///
    /// # Errors
    /// - `InvalidPath` when the path is empty or an inner component is not a
    ///   non-negative integer.
    pub fn parse(raw: &str) -> DocumentResult<Self> {
        if raw.is_empty() {
            return Err(DocumentError::invalid_path(raw, "path is empty"));
        }

        let parts: Vec<&str> = raw.split('/').collect();
        let (last, inner) = parts
            .split_last()
            .ok_or_else(|| DocumentError::invalid_path(raw, "path is empty"))?;

        let mut steps = Vec::with_capacity(inner.len());
        for part in inner {
            if !is_numeric(part) {
                return Err(DocumentError::invalid_path(
                    raw,
                    format!("path must be numeric indices except for the final leaf, got `{part}`"),
                ));
            }
            steps.push(parse_index(raw, part)?);
        }

        let key = if is_numeric(last) {
            PathKey::Index(parse_index(raw, last)?)
        } else {
            PathKey::Name((*last).to_string())
        };

        Ok(Self {
            raw: raw.to_string(),
            steps,
            key,
        })
    }

    /// Original path text.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Child indices leading to the containing node.
    pub fn steps(&self) -> &[usize] {
        &self.steps
    }

    pub fn key(&self) -> &PathKey {
        &self.key
    }

    /// Returns the child index when the terminal key is numeric.
    pub fn index(&self) -> Option<usize> {
        match self.key {
            PathKey::Index(index) => Some(index),
            PathKey::Name(_) => None,
        }
    }
}

impl FromStr for NodePath {
    type Err = DocumentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Display for NodePath {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Walks `path.steps()` from `root` and returns the containing node.
pub fn resolve<'a>(root: &'a Node, path: &NodePath) -> DocumentResult<&'a Node> {
    let mut current = root;
    for (depth, &index) in path.steps().iter().enumerate() {
        current = current
            .children()
            .get(index)
            .ok_or_else(|| out_of_bounds(path, index, depth))?;
    }
    Ok(current)
}

/// Mutable twin of [`resolve`].
pub fn resolve_mut<'a>(root: &'a mut Node, path: &NodePath) -> DocumentResult<&'a mut Node> {
    let mut current = root;
    for (depth, &index) in path.steps().iter().enumerate() {
        current = current
            .children_mut()
            .get_mut(index)
            .ok_or_else(|| out_of_bounds(path, index, depth))?;
    }
    Ok(current)
}

/// Walks an absolute index chain, returning `None` when any step is absent.
pub fn walk<'a>(root: &'a Node, indices: &[usize]) -> Option<&'a Node> {
    indices
        .iter()
        .try_fold(root, |node, &index| node.children().get(index))
}

pub fn walk_mut<'a>(root: &'a mut Node, indices: &[usize]) -> Option<&'a mut Node> {
    indices
        .iter()
        .try_fold(root, |node, &index| node.children_mut().get_mut(index))
}

/// Formats an index chain as a materialized path (`""` for the root).
pub fn join_indices(indices: &[usize]) -> String {
    indices
        .iter()
        .map(usize::to_string)
        .collect::<Vec<_>>()
        .join("/")
}

/// Parses a materialized path. The empty string is the root.
pub fn parse_indices(path: &str) -> Option<Vec<usize>> {
    if path.is_empty() {
        return Some(Vec::new());
    }
    path.split('/')
        .map(|part| {
            if is_numeric(part) {
                part.parse::<usize>().ok()
            } else {
                None
            }
        })
        .collect()
}

fn is_numeric(part: &str) -> bool {
    !part.is_empty() && part.bytes().all(|byte| byte.is_ascii_digit())
}

fn parse_index(raw: &str, part: &str) -> DocumentResult<usize> {
    part.parse::<usize>()
        .map_err(|_| DocumentError::invalid_path(raw, format!("index `{part}` is too large")))
}

fn out_of_bounds(path: &NodePath, index: usize, depth: usize) -> DocumentError {
    DocumentError::invalid_path(
        path.as_str(),
        format!("index {index} out of bounds at depth {depth}"),
    )
}
