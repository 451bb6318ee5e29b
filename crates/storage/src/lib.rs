//! Storage abstraction and implementations for Taskwise.
//!
//! This crate provides the trait-based task, history and proposal stores
//! with an in-memory and a JSON file implementation.

#![warn(missing_docs)]

pub mod trait_;
pub mod json_storage;
pub mod memory;

pub use trait_::{HistoryStore, ProposalStore, Result, StorageError, TaskStore};
pub use json_storage::JsonStorage;
pub use memory::MemoryStorage;
