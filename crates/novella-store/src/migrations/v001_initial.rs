//! v001 -- Initial schema creation.
//!
//! A single key-value table: one row per serialized entity table.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS kv_tables (
    key        TEXT PRIMARY KEY NOT NULL,   -- e.g. 'novels', 'drafts'
    payload    TEXT NOT NULL,               -- JSON array of wire records
    updated_at TEXT NOT NULL                -- ISO-8601 / RFC-3339
);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
