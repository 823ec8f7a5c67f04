//! Core domain logic for pathdoc path-addressed documents.
//! This crate is the single source of truth for tree and storage invariants.

pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use config::{ConfigError, CoreConfig};
pub use db::{open_db, open_db_in_memory, DbError, DbResult};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use model::attributes::Attributes;
pub use model::error::{DocumentError, DocumentResult};
pub use model::node::{Change, ChangeKind, Node, NodeId, NodeValue, PathValue};
pub use model::observer::{DocumentObserver, ObserverError, WatchId};
pub use model::tree::{DocumentTree, NodeRef};
pub use repo::blob_store::{BlobStore, SqliteBlobStore};
pub use repo::node_store::{NodeRow, NodeStore, SqliteNodeStore, StoreError, StoreResult};
pub use service::document_service::{DocumentService, ServiceError, ServiceResult};
pub use service::registry::{Deletion, DocumentRegistry, RegistryError, RegistryResult};

/// Minimal health-check API for early integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
