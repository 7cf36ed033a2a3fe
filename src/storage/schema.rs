//! Database schema definitions and migration logic.

use rusqlite::{Connection, Result};

pub const CURRENT_SCHEMA_VERSION: i32 = 1;

/// The complete SQL schema for the cross-reference database.
pub const SCHEMA_SQL: &str = r"
    -- Links: one row per source ticket that reached the destination.
    -- state is 'partial' until every comment has been replicated.
    CREATE TABLE IF NOT EXISTS links (
        source_id TEXT PRIMARY KEY,
        destination_id TEXT NOT NULL,
        subject TEXT NOT NULL DEFAULT '',
        comments_created INTEGER NOT NULL DEFAULT 0,
        state TEXT NOT NULL DEFAULT 'partial' CHECK(state IN ('partial', 'complete')),
        created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
        updated_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
    );
    CREATE INDEX IF NOT EXISTS idx_links_destination ON links(destination_id);
    CREATE INDEX IF NOT EXISTS idx_links_state ON links(state) WHERE state = 'partial';

    -- Metadata
    CREATE TABLE IF NOT EXISTS metadata (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL
    );
";

/// Apply the schema to the database.
///
/// Idempotent: every statement uses `IF NOT EXISTS`.
///
/// # Errors
///
/// Returns an error if the SQL execution fails or pragmas cannot be set.
pub fn apply_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA_SQL)?;

    // WAL is a no-op for in-memory databases
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.pragma_update(None, "user_version", CURRENT_SCHEMA_VERSION)?;

    Ok(())
}
