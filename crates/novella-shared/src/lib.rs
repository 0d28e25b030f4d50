//! # novella-shared
//!
//! Domain types shared by every Novella crate: the story / draft / profile
//! models, the entity codec that converts them to and from their wire form,
//! and the search and ordering rules applied identically by the local cache
//! and the remote backend.

pub mod authority;
pub mod codec;
pub mod constants;
pub mod error;
pub mod models;
pub mod query;
pub mod types;

pub use codec::{Entity, EntityKind};
pub use error::CodecError;
pub use models::*;
pub use query::SearchFilters;
