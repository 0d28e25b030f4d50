//! Schema upgrades for the cache database.
//!
//! `PRAGMA user_version` records the last applied step; every open applies
//! the steps above it in order. Only the SQLite container is versioned. The
//! JSON tables inside it are repaired record by record when the codec decodes
//! them.

pub mod v001_initial;

use rusqlite::Connection;

use crate::error::{Result, StoreError};

/// Version written after the last step below has run.
const CURRENT_VERSION: u32 = 1;

/// Bring the schema behind `conn` up to [`CURRENT_VERSION`].
pub fn run_migrations(conn: &Connection) -> Result<()> {
    let current: u32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;

    if current >= CURRENT_VERSION {
        tracing::debug!(version = current, "cache schema up to date");
        return Ok(());
    }

    if current < 1 {
        tracing::info!(from = current, to = 1, "creating cache tables");
        v001_initial::up(conn).map_err(|e| StoreError::Migration(e.to_string()))?;
        conn.pragma_update(None, "user_version", 1)?;
    }

    Ok(())
}
