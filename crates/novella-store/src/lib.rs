//! # novella-store
//!
//! Persistent on-device cache for Novella. Every entity kind lives in one
//! serialized table (a JSON array in the codec's wire format) stored under a
//! fixed key in a key-value substrate. The production substrate is a SQLite
//! file; tests use an in-memory map.
//!
//! [`LocalCache`] is the only way the rest of the system touches those
//! tables. All operations are synchronous and write-through.

pub mod cache;
pub mod database;
pub mod migrations;
pub mod substrate;

mod error;

pub use cache::LocalCache;
pub use database::Database;
pub use error::{Result, StoreError};
pub use substrate::{KvSubstrate, MemorySubstrate};
