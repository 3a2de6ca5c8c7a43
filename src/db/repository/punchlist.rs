use std::str::FromStr;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::parse_uuid;
use crate::db::DatabaseError;
use crate::models::enums::*;
use crate::models::*;

const PUNCHLIST_COLUMNS: &str = "id, punchlist_number, document_id, review_stage_id,
     description, category, severity, status, assigned_team, identified_by, identified_at,
     resolved_at, resolved_by, resolution_notes";

pub fn insert_punchlist_item(conn: &Connection, item: &PunchlistItem) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO atp_punchlist_items (id, punchlist_number, document_id, review_stage_id,
         description, category, severity, status, assigned_team, identified_by, identified_at,
         resolved_at, resolved_by, resolution_notes)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
        params![
            item.id.to_string(),
            item.punchlist_number,
            item.document_id.to_string(),
            item.review_stage_id.to_string(),
            item.description,
            item.category,
            item.severity.as_str(),
            item.status.as_str(),
            item.assigned_team,
            item.identified_by,
            item.identified_at,
            item.resolved_at,
            item.resolved_by,
            item.resolution_notes,
        ],
    )?;
    Ok(())
}

pub fn get_punchlist_item(conn: &Connection, id: &Uuid) -> Result<Option<PunchlistItem>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {PUNCHLIST_COLUMNS} FROM atp_punchlist_items WHERE id = ?1"
    ))?;
    let row = stmt.query_row(params![id.to_string()], punchlist_row).optional()?;
    row.map(punchlist_from_row).transpose()
}

/// Punchlist items of a document, most severe first.
pub fn list_punchlist_for_document(
    conn: &Connection,
    document_id: &Uuid,
) -> Result<Vec<PunchlistItem>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {PUNCHLIST_COLUMNS} FROM atp_punchlist_items
         WHERE document_id = ?1 ORDER BY identified_at ASC, punchlist_number ASC"
    ))?;
    let rows = stmt.query_map(params![document_id.to_string()], punchlist_row)?;

    let mut items = Vec::new();
    for row in rows {
        items.push(punchlist_from_row(row?)?);
    }
    items.sort_by(|a, b| b.severity.cmp(&a.severity));
    Ok(items)
}

/// Mark an open item resolved. Returns `false` if the item was not open.
pub fn resolve_punchlist_item(
    conn: &Connection,
    id: &Uuid,
    resolved_by: Option<&str>,
    notes: Option<&str>,
    resolved_at: DateTime<Utc>,
) -> Result<bool, DatabaseError> {
    let rows = conn.execute(
        "UPDATE atp_punchlist_items
         SET status = 'resolved', resolved_by = ?2, resolution_notes = ?3, resolved_at = ?4
         WHERE id = ?1 AND status = 'open'",
        params![id.to_string(), resolved_by, notes, resolved_at],
    )?;
    Ok(rows == 1)
}

pub fn count_open_punchlist(conn: &Connection, document_id: &Uuid) -> Result<u32, DatabaseError> {
    let count: u32 = conn.query_row(
        "SELECT COUNT(*) FROM atp_punchlist_items WHERE document_id = ?1 AND status = 'open'",
        params![document_id.to_string()],
        |row| row.get(0),
    )?;
    Ok(count)
}

/// Total punchlist items ever raised on a document (drives `punchlist_number`).
pub fn count_punchlist_for_document(conn: &Connection, document_id: &Uuid) -> Result<u32, DatabaseError> {
    let count: u32 = conn.query_row(
        "SELECT COUNT(*) FROM atp_punchlist_items WHERE document_id = ?1",
        params![document_id.to_string()],
        |row| row.get(0),
    )?;
    Ok(count)
}

// Internal row type for PunchlistItem mapping
struct PunchlistRow {
    id: String,
    punchlist_number: String,
    document_id: String,
    review_stage_id: String,
    description: String,
    category: String,
    severity: String,
    status: String,
    assigned_team: Option<String>,
    identified_by: Option<String>,
    identified_at: DateTime<Utc>,
    resolved_at: Option<DateTime<Utc>>,
    resolved_by: Option<String>,
    resolution_notes: Option<String>,
}

fn punchlist_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<PunchlistRow> {
    Ok(PunchlistRow {
        id: row.get(0)?,
        punchlist_number: row.get(1)?,
        document_id: row.get(2)?,
        review_stage_id: row.get(3)?,
        description: row.get(4)?,
        category: row.get(5)?,
        severity: row.get(6)?,
        status: row.get(7)?,
        assigned_team: row.get(8)?,
        identified_by: row.get(9)?,
        identified_at: row.get(10)?,
        resolved_at: row.get(11)?,
        resolved_by: row.get(12)?,
        resolution_notes: row.get(13)?,
    })
}

fn punchlist_from_row(row: PunchlistRow) -> Result<PunchlistItem, DatabaseError> {
    Ok(PunchlistItem {
        id: parse_uuid(&row.id)?,
        punchlist_number: row.punchlist_number,
        document_id: parse_uuid(&row.document_id)?,
        review_stage_id: parse_uuid(&row.review_stage_id)?,
        description: row.description,
        category: row.category,
        severity: PunchlistSeverity::from_str(&row.severity)?,
        status: PunchlistStatus::from_str(&row.status)?,
        assigned_team: row.assigned_team,
        identified_by: row.identified_by,
        identified_at: row.identified_at,
        resolved_at: row.resolved_at,
        resolved_by: row.resolved_by,
        resolution_notes: row.resolution_notes,
    })
}
