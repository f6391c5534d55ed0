//! Durable key-value store abstraction for FolderTrail.
//!
//! The credential provider and the result cache share one store, each under
//! its own keys. Values are opaque JSON blobs with no schema versioning.
//!
//! # Design Principles
//! - Dumb surface: get, set, remove and key listing only
//! - Async operations: every backend may suspend on I/O
//! - Unified error semantics: backends report `Error::Storage` or `Error::Io`

pub mod store;
pub mod memory;
pub mod local;

pub use store::KeyValueStore;
pub use memory::MemoryStore;
pub use local::FileStore;
