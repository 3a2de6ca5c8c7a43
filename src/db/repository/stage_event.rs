use std::str::FromStr;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use uuid::Uuid;

use super::parse_uuid;
use crate::db::DatabaseError;
use crate::models::enums::*;
use crate::models::*;

/// Append one event to the stage audit log. Events are never updated or deleted.
pub fn append_stage_event(
    conn: &Connection,
    document_id: &Uuid,
    kind: StageEventKind,
    event: &NewStageEvent,
    created_at: DateTime<Utc>,
) -> Result<i64, DatabaseError> {
    conn.execute(
        "INSERT INTO atp_stage_events (document_id, stage_number, kind, decision, actor_role,
         actor_id, severity, detail, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            document_id.to_string(),
            event.stage_number,
            kind.as_str(),
            event.decision,
            event.actor_role,
            event.actor_id,
            event.severity.map(|s| s.as_str()),
            event.detail,
            created_at,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Full event history of a document, oldest first.
pub fn list_stage_events(conn: &Connection, document_id: &Uuid) -> Result<Vec<StageEvent>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, document_id, stage_number, kind, decision, actor_role, actor_id, severity,
         detail, created_at
         FROM atp_stage_events WHERE document_id = ?1 ORDER BY id ASC",
    )?;
    let rows = stmt.query_map(params![document_id.to_string()], |row| {
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, Option<u32>>(2)?,
            row.get::<_, String>(3)?,
            row.get::<_, Option<String>>(4)?,
            row.get::<_, Option<String>>(5)?,
            row.get::<_, Option<String>>(6)?,
            row.get::<_, Option<String>>(7)?,
            row.get::<_, Option<String>>(8)?,
            row.get::<_, DateTime<Utc>>(9)?,
        ))
    })?;

    let mut events = Vec::new();
    for row in rows {
        let (id, doc_id, stage_number, kind, decision, actor_role, actor_id, severity, detail, created_at) =
            row?;
        events.push(StageEvent {
            id,
            document_id: parse_uuid(&doc_id)?,
            stage_number,
            kind: StageEventKind::from_str(&kind)?,
            decision,
            actor_role,
            actor_id,
            severity: severity
                .as_deref()
                .map(PunchlistSeverity::from_str)
                .transpose()?,
            detail,
            created_at,
        });
    }
    Ok(events)
}
