//! `store` crate: the persistence layer for workflow definitions.
//!
//! Provides the [`WorkflowRepository`] trait plus an in-memory and a
//! JSON-directory implementation. No execution logic lives here: callers
//! load a workflow from a repository and hand it to the engine themselves.

pub mod error;
pub mod repository;

pub use error::StoreError;
pub use repository::{FileRepository, MemoryRepository, WorkflowRepository};
