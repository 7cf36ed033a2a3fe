//! `SQLite` storage implementation.

use crate::error::{FerryError, Result};
use crate::storage::schema::apply_schema;
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use rusqlite::{Connection, OptionalExtension, Transaction};
use serde::Serialize;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// SQLite-based cross-reference store.
#[derive(Debug)]
pub struct SqliteStorage {
    conn: Connection,
}

/// Replication state of a linked ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkState {
    /// Ticket exists on the destination but not every comment was replicated.
    Partial,
    Complete,
}

impl LinkState {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Partial => "partial",
            Self::Complete => "complete",
        }
    }
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LinkState {
    type Err = FerryError;

    fn from_str(input: &str) -> Result<Self> {
        match input {
            "partial" => Ok(Self::Partial),
            "complete" => Ok(Self::Complete),
            other => Err(FerryError::config(format!("Unknown link state: {other}"))),
        }
    }
}

/// Source ticket -> destination ticket cross-reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Link {
    pub source_id: String,
    pub destination_id: String,
    pub subject: String,
    pub comments_created: usize,
    pub state: LinkState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Link {
    #[must_use]
    pub fn new(source_id: &str, destination_id: &str, subject: &str, state: LinkState) -> Self {
        let now = Utc::now();
        Self {
            source_id: source_id.to_string(),
            destination_id: destination_id.to_string(),
            subject: subject.to_string(),
            comments_created: 0,
            state,
            created_at: now,
            updated_at: now,
        }
    }
}

impl SqliteStorage {
    /// Open a new connection to the database at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established or schema application fails.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        apply_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Open an in-memory database for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established.
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        apply_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Run `f` inside an immediate transaction, committing on success.
    ///
    /// # Errors
    ///
    /// Returns an error if `f` fails or the commit fails; the transaction is rolled back.
    pub fn mutate<F, R>(&mut self, op: &str, f: F) -> Result<R>
    where
        F: FnOnce(&Transaction) -> Result<R>,
    {
        let tx = self
            .conn
            .transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;
        let result = f(&tx)?;
        tx.commit()?;
        tracing::trace!(op, "Committed storage mutation");
        Ok(result)
    }

    /// Insert or replace the link for a source ticket.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub fn record_link(&mut self, link: &Link) -> Result<()> {
        self.mutate("record_link", |tx| {
            tx.execute(
                "INSERT INTO links (source_id, destination_id, subject, comments_created, state, created_at, updated_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?)
                 ON CONFLICT(source_id) DO UPDATE SET
                    destination_id = excluded.destination_id,
                    subject = excluded.subject,
                    comments_created = excluded.comments_created,
                    state = excluded.state,
                    updated_at = excluded.updated_at",
                rusqlite::params![
                    link.source_id,
                    link.destination_id,
                    link.subject,
                    i64::try_from(link.comments_created).unwrap_or(i64::MAX),
                    link.state.as_str(),
                    link.created_at.to_rfc3339(),
                    link.updated_at.to_rfc3339(),
                ],
            )?;
            Ok(())
        })
    }

    /// Update replication progress for an existing link.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails or no link exists for `source_id`.
    pub fn update_link_progress(
        &mut self,
        source_id: &str,
        comments_created: usize,
        state: LinkState,
    ) -> Result<()> {
        let changed = self.mutate("update_link_progress", |tx| {
            let changed = tx.execute(
                "UPDATE links SET comments_created = ?, state = ?, updated_at = ? WHERE source_id = ?",
                rusqlite::params![
                    i64::try_from(comments_created).unwrap_or(i64::MAX),
                    state.as_str(),
                    Utc::now().to_rfc3339(),
                    source_id,
                ],
            )?;
            Ok(changed)
        })?;

        if changed == 0 {
            return Err(FerryError::config(format!("No link recorded for {source_id}")));
        }
        Ok(())
    }

    /// Get the link for a source ticket.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub fn get_link(&self, source_id: &str) -> Result<Option<Link>> {
        let link = self
            .conn
            .query_row(
                "SELECT source_id, destination_id, subject, comments_created, state, created_at, updated_at
                 FROM links WHERE source_id = ?",
                [source_id],
                link_from_row,
            )
            .optional()?;
        Ok(link)
    }

    /// List all links ordered by creation time.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub fn list_links(&self) -> Result<Vec<Link>> {
        let mut stmt = self.conn.prepare(
            "SELECT source_id, destination_id, subject, comments_created, state, created_at, updated_at
             FROM links ORDER BY created_at, source_id",
        )?;
        let rows = stmt.query_map([], link_from_row)?;
        let mut links = Vec::new();
        for row in rows {
            links.push(row?);
        }
        Ok(links)
    }

    /// Count links, optionally restricted to one state.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub fn count_links(&self, state: Option<LinkState>) -> Result<usize> {
        let count: i64 = match state {
            Some(state) => self.conn.query_row(
                "SELECT count(*) FROM links WHERE state = ?",
                [state.as_str()],
                |row| row.get(0),
            )?,
            None => self
                .conn
                .query_row("SELECT count(*) FROM links", [], |row| row.get(0))?,
        };
        Ok(usize::try_from(count).unwrap_or(0))
    }

    /// Fetch a metadata value.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub fn get_metadata(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn
            .query_row("SELECT value FROM metadata WHERE key = ?", [key], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(value)
    }

    /// Set a metadata value.
    ///
    /// # Errors
    ///
    /// Returns an error if the database update fails.
    pub fn set_metadata(&mut self, key: &str, value: &str) -> Result<()> {
        self.mutate("set_metadata", |tx| {
            tx.execute(
                "INSERT INTO metadata (key, value) VALUES (?, ?)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                rusqlite::params![key, value],
            )?;
            Ok(())
        })
    }
}

fn link_from_row(row: &rusqlite::Row) -> rusqlite::Result<Link> {
    let state: String = row.get(4)?;
    let created_at = row
        .get::<_, Option<String>>(5)?
        .as_deref()
        .map_or_else(Utc::now, parse_datetime);
    let updated_at = row
        .get::<_, Option<String>>(6)?
        .as_deref()
        .map_or(created_at, parse_datetime);

    Ok(Link {
        source_id: row.get(0)?,
        destination_id: row.get(1)?,
        subject: row.get(2)?,
        comments_created: usize::try_from(row.get::<_, i64>(3)?).unwrap_or(0),
        state: state.parse().unwrap_or(LinkState::Partial),
        created_at,
        updated_at,
    })
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }

    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Utc.from_utc_datetime(&naive);
    }

    Utc::now()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_and_fetch_link() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        let link = Link::new("1042", "501", "Printer jam [SRC#1042]", LinkState::Partial);
        storage.record_link(&link).unwrap();

        let fetched = storage.get_link("1042").unwrap().unwrap();
        assert_eq!(fetched.destination_id, "501");
        assert_eq!(fetched.state, LinkState::Partial);
        assert!(storage.get_link("9999").unwrap().is_none());
    }

    #[test]
    fn progress_promotes_to_complete() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        storage
            .record_link(&Link::new("1042", "501", "s", LinkState::Partial))
            .unwrap();
        storage
            .update_link_progress("1042", 2, LinkState::Complete)
            .unwrap();

        let fetched = storage.get_link("1042").unwrap().unwrap();
        assert_eq!(fetched.comments_created, 2);
        assert_eq!(fetched.state, LinkState::Complete);
        assert_eq!(storage.count_links(Some(LinkState::Partial)).unwrap(), 0);
        assert_eq!(storage.count_links(None).unwrap(), 1);
    }

    #[test]
    fn progress_on_unknown_link_errors() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        assert!(
            storage
                .update_link_progress("missing", 1, LinkState::Complete)
                .is_err()
        );
    }

    #[test]
    fn record_link_upserts() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        storage
            .record_link(&Link::new("7", "100", "old", LinkState::Partial))
            .unwrap();
        storage
            .record_link(&Link::new("7", "200", "new", LinkState::Complete))
            .unwrap();

        let links = storage.list_links().unwrap();
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].destination_id, "200");
    }

    #[test]
    fn metadata_round_trip() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        assert!(storage.get_metadata("last_run_at").unwrap().is_none());
        storage.set_metadata("last_run_at", "now").unwrap();
        storage.set_metadata("last_run_at", "later").unwrap();
        assert_eq!(storage.get_metadata("last_run_at").unwrap().as_deref(), Some("later"));
    }

    #[test]
    fn metadata_is_committed_for_other_connections() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("links.db");
        let mut writer = SqliteStorage::open(&path).unwrap();
        writer.set_metadata("last_run_at", "2024-05-06T09:00:00+00:00").unwrap();

        let reader = SqliteStorage::open(&path).unwrap();
        assert_eq!(
            reader.get_metadata("last_run_at").unwrap().as_deref(),
            Some("2024-05-06T09:00:00+00:00")
        );
    }
}
