//! Resolution engine for FolderTrail.
//!
//! Turns a document identifier into the document's metadata plus its
//! immediate parent folders, serving repeated requests from a TTL cache and
//! reacting to rejected credentials by invalidating them.

pub mod cache;
pub mod config;
pub mod dispatch;
pub mod engine;

pub use cache::{CacheEntry, ResultCache, CACHE_PREFIX, CACHE_TTL};
pub use config::ResolverConfig;
pub use dispatch::{Dispatcher, Request, Response};
pub use engine::ResolutionEngine;
