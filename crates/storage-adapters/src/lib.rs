//! # storage-adapters
//!
//! Implementations of the `domains` storage ports. The in-memory store is
//! always compiled; cloud backends sit behind features.

pub mod memory;

#[cfg(any(feature = "db-dynamo", feature = "media-s3"))]
pub mod aws;

#[cfg(feature = "db-dynamo")]
pub mod dynamo;

#[cfg(feature = "media-s3")]
pub mod s3;

pub use memory::{InMemoryDocumentStore, InMemoryObjectStore};
