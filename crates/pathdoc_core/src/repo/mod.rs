//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define the data access contracts for flattened and blob persistence.
//! - Isolate SQLite query details from service orchestration.
//!
//! # Invariants
//! - Stores only accept connections whose schema is fully migrated.
//! - Store APIs return semantic errors (`NodeNotFound`, `InvalidData`) in
//!   addition to DB transport errors.

pub mod blob_store;
pub mod node_store;
