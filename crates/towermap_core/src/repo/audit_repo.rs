//! Audit log repository over `audit_logs` and `users`.
//!
//! # Responsibility
//! - Record one audit entry per marker mutation and read entries back for
//!   listings and per-marker history.
//! - Resolve import-source actors to `users` rows, creating them on first
//!   use.
//!
//! # Invariants
//! - `action` values persist through `AuditAction::as_str()`; anything else
//!   found in storage surfaces as `RepoError::InvalidData`.
//! - Entries are never deleted here. Marker deletion nulls `marker_id` via
//!   the FK action and merges repoint it, both outside this module's API.

use crate::model::audit::{AuditAction, AuditLogEntry, AuditLogId};
use crate::model::marker::{MarkerId, UserId};
use crate::repo::marker_repo::{RepoError, RepoResult};
use crate::repo::{table_exists, table_has_column};
use rusqlite::{params, Connection, Row};

/// Repository interface for the append-only audit trail.
pub trait AuditRepository {
    fn record(
        &self,
        actor: Option<UserId>,
        action: AuditAction,
        marker_id: Option<MarkerId>,
    ) -> RepoResult<AuditLogId>;
    /// Most recent entries first.
    fn list_recent(&self, limit: u32) -> RepoResult<Vec<AuditLogEntry>>;
    /// Entries pointing at one marker, oldest first.
    fn entries_for_marker(&self, marker_id: MarkerId) -> RepoResult<Vec<AuditLogEntry>>;
    /// Returns the user id for `username`, inserting a `user`-role row if
    /// none exists yet.
    fn ensure_actor(&self, username: &str) -> RepoResult<UserId>;
}

/// SQLite-backed audit repository.
pub struct SqliteAuditRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteAuditRepository<'conn> {
    /// Constructs a repository from a migrated/ready connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_audit_connection_ready(conn)?;
        Ok(Self { conn })
    }
}

impl AuditRepository for SqliteAuditRepository<'_> {
    fn record(
        &self,
        actor: Option<UserId>,
        action: AuditAction,
        marker_id: Option<MarkerId>,
    ) -> RepoResult<AuditLogId> {
        self.conn.execute(
            "INSERT INTO audit_logs (user_id, action, marker_id) VALUES (?1, ?2, ?3);",
            params![actor, action.as_str(), marker_id],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn list_recent(&self, limit: u32) -> RepoResult<Vec<AuditLogEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, user_id, action, marker_id, timestamp
             FROM audit_logs
             ORDER BY timestamp DESC, id DESC
             LIMIT ?1;",
        )?;
        let mut rows = stmt.query([limit])?;
        let mut entries = Vec::new();
        while let Some(row) = rows.next()? {
            entries.push(parse_entry_row(row)?);
        }
        Ok(entries)
    }

    fn entries_for_marker(&self, marker_id: MarkerId) -> RepoResult<Vec<AuditLogEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, user_id, action, marker_id, timestamp
             FROM audit_logs
             WHERE marker_id = ?1
             ORDER BY id ASC;",
        )?;
        let mut rows = stmt.query([marker_id])?;
        let mut entries = Vec::new();
        while let Some(row) = rows.next()? {
            entries.push(parse_entry_row(row)?);
        }
        Ok(entries)
    }

    fn ensure_actor(&self, username: &str) -> RepoResult<UserId> {
        let existing: Option<UserId> = self
            .conn
            .query_row(
                "SELECT id FROM users WHERE username = ?1;",
                [username],
                |row| row.get(0),
            )
            .map(Some)
            .or_else(|err| match err {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })?;
        if let Some(id) = existing {
            return Ok(id);
        }

        self.conn.execute(
            "INSERT INTO users (username, role) VALUES (?1, 'user');",
            [username],
        )?;
        Ok(self.conn.last_insert_rowid())
    }
}

fn parse_entry_row(row: &Row<'_>) -> RepoResult<AuditLogEntry> {
    let action_raw: String = row.get("action")?;
    let action = AuditAction::parse(&action_raw).ok_or_else(|| {
        RepoError::InvalidData(format!(
            "invalid action value `{action_raw}` in audit_logs.action"
        ))
    })?;
    Ok(AuditLogEntry {
        id: row.get("id")?,
        user_id: row.get("user_id")?,
        action,
        marker_id: row.get("marker_id")?,
        timestamp: row.get("timestamp")?,
    })
}

fn ensure_audit_connection_ready(conn: &Connection) -> RepoResult<()> {
    for table in ["audit_logs", "users"] {
        if !table_exists(conn, table)? {
            return Err(RepoError::MissingRequiredTable(table));
        }
    }

    for column in ["id", "user_id", "action", "marker_id", "timestamp"] {
        if !table_has_column(conn, "audit_logs", column)? {
            return Err(RepoError::MissingRequiredColumn {
                table: "audit_logs",
                column,
            });
        }
    }

    for column in ["id", "username", "role"] {
        if !table_has_column(conn, "users", column)? {
            return Err(RepoError::MissingRequiredColumn {
                table: "users",
                column,
            });
        }
    }

    Ok(())
}
