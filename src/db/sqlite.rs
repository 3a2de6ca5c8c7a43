//! SQLite store for the ATP workflow: connection setup and schema migrations.

use std::path::Path;

use rusqlite::{params, Connection};

use super::DatabaseError;

/// Schema migrations in apply order. Each script records its own version.
const MIGRATIONS: &[(i64, &str)] = &[(1, include_str!("../../resources/migrations/001_initial.sql"))];

/// Tables the workflow repositories read and write.
pub const WORKFLOW_TABLES: [&str; 4] = [
    "atp_documents",
    "atp_review_stages",
    "atp_punchlist_items",
    "atp_stage_events",
];

/// Open (or create) the workflow database at `path`, creating parent
/// directories as needed, and bring its schema up to date.
pub fn open_database(path: &Path) -> Result<Connection, DatabaseError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| {
            DatabaseError::ConstraintViolation(format!(
                "cannot create database directory {}: {e}",
                parent.display()
            ))
        })?;
    }
    let conn = Connection::open(path)?;
    prepare(&conn)?;
    tracing::debug!(path = %path.display(), "ATP database ready");
    Ok(conn)
}

/// Open an in-memory workflow database (tests and ephemeral runs).
pub fn open_memory_database() -> Result<Connection, DatabaseError> {
    let conn = Connection::open_in_memory()?;
    prepare(&conn)?;
    Ok(conn)
}

fn prepare(conn: &Connection) -> Result<(), DatabaseError> {
    // Stage and punchlist rows cascade from their document.
    conn.execute_batch(
        "PRAGMA journal_mode=DELETE;
         PRAGMA foreign_keys=ON;
         PRAGMA busy_timeout=5000;",
    )?;
    run_migrations(conn)?;
    verify_schema(conn)
}

/// Apply every migration newer than the recorded schema version.
/// Returns the version the database ends on.
pub fn run_migrations(conn: &Connection) -> Result<i64, DatabaseError> {
    let recorded = schema_version(conn)?;
    let mut current = recorded;

    for &(version, sql) in MIGRATIONS.iter().filter(|(v, _)| *v > recorded) {
        tracing::info!(version, "Applying ATP schema migration");
        conn.execute_batch(sql).map_err(|e| DatabaseError::MigrationFailed {
            version,
            reason: e.to_string(),
        })?;
        current = version;
    }

    Ok(current)
}

/// Recorded schema version, 0 for a fresh database.
pub fn schema_version(conn: &Connection) -> Result<i64, DatabaseError> {
    if !table_exists(conn, "schema_version")? {
        return Ok(0);
    }
    let version = conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |row| {
        row.get::<_, i64>(0)
    })?;
    Ok(version)
}

pub fn table_exists(conn: &Connection, name: &str) -> Result<bool, DatabaseError> {
    let exists = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1)",
        params![name],
        |row| row.get::<_, bool>(0),
    )?;
    Ok(exists)
}

fn verify_schema(conn: &Connection) -> Result<(), DatabaseError> {
    for table in WORKFLOW_TABLES {
        if !table_exists(conn, table)? {
            return Err(DatabaseError::MigrationFailed {
                version: schema_version(conn)?,
                reason: format!("table {table} is missing"),
            });
        }
    }
    Ok(())
}
