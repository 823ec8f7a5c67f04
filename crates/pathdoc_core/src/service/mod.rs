//! Core use-case services.
//!
//! # Responsibility
//! - Own the forest of root documents and gate their lifecycle.
//! - Orchestrate in-memory mutations with store writes.

pub mod document_service;
pub mod registry;
