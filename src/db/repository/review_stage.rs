use std::str::FromStr;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::parse_uuid;
use crate::db::DatabaseError;
use crate::models::enums::*;
use crate::models::*;

const STAGE_COLUMNS: &str = "id, document_id, stage_number, stage_code, stage_name,
     required_role, status, decision, reviewer_id, comments, sla_deadline, completed_at";

pub fn insert_stage(conn: &Connection, stage: &ReviewStage) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO atp_review_stages (id, document_id, stage_number, stage_code, stage_name,
         required_role, status, decision, reviewer_id, comments, sla_deadline, completed_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        params![
            stage.id.to_string(),
            stage.document_id.to_string(),
            stage.stage_number,
            stage.stage_code.as_str(),
            stage.stage_name,
            stage.required_role.as_str(),
            stage.status.as_str(),
            stage.decision,
            stage.reviewer_id,
            stage.comments,
            stage.sla_deadline,
            stage.completed_at,
        ],
    )?;
    Ok(())
}

pub fn get_stage(conn: &Connection, id: &Uuid) -> Result<Option<ReviewStage>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {STAGE_COLUMNS} FROM atp_review_stages WHERE id = ?1"
    ))?;
    let row = stmt.query_row(params![id.to_string()], stage_row).optional()?;
    row.map(stage_from_row).transpose()
}

/// All stages of a document in path order.
pub fn list_stages(conn: &Connection, document_id: &Uuid) -> Result<Vec<ReviewStage>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {STAGE_COLUMNS} FROM atp_review_stages
         WHERE document_id = ?1 ORDER BY stage_number ASC"
    ))?;
    let rows = stmt.query_map(params![document_id.to_string()], stage_row)?;

    let mut stages = Vec::new();
    for row in rows {
        stages.push(stage_from_row(row?)?);
    }
    Ok(stages)
}

/// Pending stages assigned to a role, with the owning document's ATP code.
pub fn list_pending_for_role(
    conn: &Connection,
    role: &Role,
) -> Result<Vec<(ReviewStage, String)>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT s.id, s.document_id, s.stage_number, s.stage_code, s.stage_name,
         s.required_role, s.status, s.decision, s.reviewer_id, s.comments, s.sla_deadline,
         s.completed_at, d.atp_code
         FROM atp_review_stages s
         JOIN atp_documents d ON d.id = s.document_id
         WHERE s.required_role = ?1 AND s.status = 'pending'",
    )?;
    let rows = stmt.query_map(params![role.as_str()], |row| {
        Ok((stage_row(row)?, row.get::<_, String>(12)?))
    })?;

    let mut stages = Vec::new();
    for row in rows {
        let (stage, atp_code) = row?;
        stages.push((stage_from_row(stage)?, atp_code));
    }
    Ok(stages)
}

/// Every pending stage across all documents.
pub fn list_all_pending(conn: &Connection) -> Result<Vec<ReviewStage>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {STAGE_COLUMNS} FROM atp_review_stages WHERE status = 'pending'"
    ))?;
    let rows = stmt.query_map([], stage_row)?;

    let mut stages = Vec::new();
    for row in rows {
        stages.push(stage_from_row(row?)?);
    }
    Ok(stages)
}

/// Close a pending stage with its decision.
///
/// Guarded on `status = 'pending'`; returns `false` when the stage was not pending,
/// so a concurrent or replayed decision never overwrites a completed stage.
pub fn complete_stage(
    conn: &Connection,
    id: &Uuid,
    decision: &str,
    reviewer_id: Option<&str>,
    comments: Option<&str>,
    completed_at: DateTime<Utc>,
) -> Result<bool, DatabaseError> {
    let rows = conn.execute(
        "UPDATE atp_review_stages
         SET status = 'completed', decision = ?2, reviewer_id = ?3, comments = ?4, completed_at = ?5
         WHERE id = ?1 AND status = 'pending'",
        params![id.to_string(), decision, reviewer_id, comments, completed_at],
    )?;
    Ok(rows == 1)
}

/// Move a waiting stage to pending and stamp its SLA deadline.
pub fn activate_stage(
    conn: &Connection,
    id: &Uuid,
    sla_deadline: DateTime<Utc>,
) -> Result<bool, DatabaseError> {
    let rows = conn.execute(
        "UPDATE atp_review_stages SET status = 'pending', sla_deadline = ?2
         WHERE id = ?1 AND status = 'waiting'",
        params![id.to_string(), sla_deadline],
    )?;
    Ok(rows == 1)
}

/// Reopen a completed stage after rectification. The previous decision stays
/// recorded in the stage event log.
pub fn reopen_stage(
    conn: &Connection,
    id: &Uuid,
    sla_deadline: DateTime<Utc>,
) -> Result<bool, DatabaseError> {
    let rows = conn.execute(
        "UPDATE atp_review_stages
         SET status = 'pending', decision = NULL, reviewer_id = NULL, comments = NULL,
             completed_at = NULL, sla_deadline = ?2
         WHERE id = ?1 AND status = 'completed'",
        params![id.to_string(), sla_deadline],
    )?;
    Ok(rows == 1)
}

/// Close every stage of a document that is not yet completed. Returns the
/// number of stages closed.
pub fn complete_open_stages(
    conn: &Connection,
    document_id: &Uuid,
    decision: &str,
    reviewer_id: Option<&str>,
    comments: Option<&str>,
    completed_at: DateTime<Utc>,
) -> Result<usize, DatabaseError> {
    let rows = conn.execute(
        "UPDATE atp_review_stages
         SET status = 'completed', decision = ?2, reviewer_id = ?3, comments = ?4, completed_at = ?5
         WHERE document_id = ?1 AND status != 'completed'",
        params![document_id.to_string(), decision, reviewer_id, comments, completed_at],
    )?;
    Ok(rows)
}

/// Stage counters over an optional role and reviewer scope.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StageActivity {
    pub completed: u32,
    pub pending: u32,
    pub completed_since_day: u32,
    pub approved_since_week: u32,
    pub rejected_since_week: u32,
    pub overdue: u32,
}

/// Count stage activity in one pass.
///
/// The reviewer filter only narrows completed stages; pending stages have no
/// reviewer yet and are scoped by role alone.
pub fn count_stage_activity(
    conn: &Connection,
    role: Option<&Role>,
    reviewer_id: Option<&str>,
    day_start: DateTime<Utc>,
    week_start: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<StageActivity, DatabaseError> {
    let activity = conn.query_row(
        "SELECT
           COALESCE(SUM(status = 'completed' AND (?2 IS NULL OR reviewer_id = ?2)), 0),
           COALESCE(SUM(status = 'pending'), 0),
           COALESCE(SUM(status = 'completed' AND (?2 IS NULL OR reviewer_id = ?2)
                        AND completed_at >= ?3), 0),
           COALESCE(SUM(status = 'completed' AND (?2 IS NULL OR reviewer_id = ?2)
                        AND decision IN ('approve', 'approve_with_punchlist')
                        AND completed_at >= ?4), 0),
           COALESCE(SUM(status = 'completed' AND (?2 IS NULL OR reviewer_id = ?2)
                        AND decision = 'reject' AND completed_at >= ?4), 0),
           COALESCE(SUM(status = 'pending' AND sla_deadline < ?5), 0)
         FROM atp_review_stages
         WHERE ?1 IS NULL OR required_role = ?1",
        params![role.map(Role::as_str), reviewer_id, day_start, week_start, now],
        |row| {
            Ok(StageActivity {
                completed: row.get(0)?,
                pending: row.get(1)?,
                completed_since_day: row.get(2)?,
                approved_since_week: row.get(3)?,
                rejected_since_week: row.get(4)?,
                overdue: row.get(5)?,
            })
        },
    )?;
    Ok(activity)
}

// Internal row type for ReviewStage mapping
struct StageRow {
    id: String,
    document_id: String,
    stage_number: u32,
    stage_code: String,
    stage_name: String,
    required_role: String,
    status: String,
    decision: Option<String>,
    reviewer_id: Option<String>,
    comments: Option<String>,
    sla_deadline: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
}

fn stage_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<StageRow> {
    Ok(StageRow {
        id: row.get(0)?,
        document_id: row.get(1)?,
        stage_number: row.get(2)?,
        stage_code: row.get(3)?,
        stage_name: row.get(4)?,
        required_role: row.get(5)?,
        status: row.get(6)?,
        decision: row.get(7)?,
        reviewer_id: row.get(8)?,
        comments: row.get(9)?,
        sla_deadline: row.get(10)?,
        completed_at: row.get(11)?,
    })
}

fn stage_from_row(row: StageRow) -> Result<ReviewStage, DatabaseError> {
    Ok(ReviewStage {
        id: parse_uuid(&row.id)?,
        document_id: parse_uuid(&row.document_id)?,
        stage_number: row.stage_number,
        stage_code: StageCode::from_str(&row.stage_code)?,
        stage_name: row.stage_name,
        required_role: Role::from_str(&row.required_role)?,
        status: StageStatus::from_str(&row.status)?,
        decision: row.decision,
        reviewer_id: row.reviewer_id,
        comments: row.comments,
        sla_deadline: row.sla_deadline,
        completed_at: row.completed_at,
    })
}
