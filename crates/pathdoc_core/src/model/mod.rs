//! In-memory document tree model.
//!
//! # Responsibility
//! - Define nodes, attributes and the positional path scheme.
//! - Provide path-addressed reads and mutations on shared trees.
//! - Render trees to HTML and notify listeners after mutations.
//!
//! # Invariants
//! - Every node id is unique across the whole forest.
//! - Sibling order is the addressing coordinate; there is no other handle
//!   for "the n-th child".

pub mod attributes;
pub mod error;
pub mod node;
pub mod observer;
pub mod path;
pub mod render;
pub mod tree;
