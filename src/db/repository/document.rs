use std::str::FromStr;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::parse_uuid;
use crate::db::DatabaseError;
use crate::models::enums::*;
use crate::models::*;

const DOCUMENT_COLUMNS: &str = "id, atp_code, site_id, file_name, file_path, category,
     classification_confidence, classification_method, workflow_path, current_stage,
     current_status, rectification_stage, submitted_at, approval_date, final_approver,
     completion_percentage";

pub fn insert_document(conn: &Connection, doc: &Document) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO atp_documents (id, atp_code, site_id, file_name, file_path, category,
         classification_confidence, classification_method, workflow_path, current_stage,
         current_status, rectification_stage, submitted_at, approval_date, final_approver,
         completion_percentage)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
        params![
            doc.id.to_string(),
            doc.atp_code,
            doc.site_id,
            doc.file_name,
            doc.file_path,
            doc.category.as_str(),
            doc.classification_confidence,
            doc.classification_method,
            doc.workflow_path.as_str(),
            doc.current_stage,
            doc.current_status.as_str(),
            doc.rectification_stage,
            doc.submitted_at,
            doc.approval_date,
            doc.final_approver,
            doc.completion_percentage,
        ],
    )?;
    Ok(())
}

pub fn get_document(conn: &Connection, id: &Uuid) -> Result<Option<Document>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {DOCUMENT_COLUMNS} FROM atp_documents WHERE id = ?1"
    ))?;

    let row = stmt
        .query_row(params![id.to_string()], document_row)
        .optional()?;

    row.map(document_from_row).transpose()
}

/// Persist the workflow-owned fields of a document.
pub fn update_document_progress(conn: &Connection, doc: &Document) -> Result<(), DatabaseError> {
    let rows = conn.execute(
        "UPDATE atp_documents SET current_stage = ?2, current_status = ?3,
         rectification_stage = ?4, approval_date = ?5, final_approver = ?6,
         completion_percentage = ?7
         WHERE id = ?1",
        params![
            doc.id.to_string(),
            doc.current_stage,
            doc.current_status.as_str(),
            doc.rectification_stage,
            doc.approval_date,
            doc.final_approver,
            doc.completion_percentage,
        ],
    )?;
    if rows == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "Document".into(),
            id: doc.id.to_string(),
        });
    }
    Ok(())
}

/// Number of ATP documents already registered for a site (drives `atp_code`).
pub fn count_documents_for_site(conn: &Connection, site_id: &str) -> Result<u32, DatabaseError> {
    let count: u32 = conn.query_row(
        "SELECT COUNT(*) FROM atp_documents WHERE site_id = ?1",
        params![site_id],
        |row| row.get(0),
    )?;
    Ok(count)
}

// Internal row type for Document mapping
struct DocumentRow {
    id: String,
    atp_code: String,
    site_id: String,
    file_name: String,
    file_path: String,
    category: String,
    classification_confidence: f64,
    classification_method: String,
    workflow_path: String,
    current_stage: String,
    current_status: String,
    rectification_stage: Option<u32>,
    submitted_at: DateTime<Utc>,
    approval_date: Option<DateTime<Utc>>,
    final_approver: Option<String>,
    completion_percentage: u8,
}

fn document_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<DocumentRow> {
    Ok(DocumentRow {
        id: row.get(0)?,
        atp_code: row.get(1)?,
        site_id: row.get(2)?,
        file_name: row.get(3)?,
        file_path: row.get(4)?,
        category: row.get(5)?,
        classification_confidence: row.get(6)?,
        classification_method: row.get(7)?,
        workflow_path: row.get(8)?,
        current_stage: row.get(9)?,
        current_status: row.get(10)?,
        rectification_stage: row.get(11)?,
        submitted_at: row.get(12)?,
        approval_date: row.get(13)?,
        final_approver: row.get(14)?,
        completion_percentage: row.get(15)?,
    })
}

fn document_from_row(row: DocumentRow) -> Result<Document, DatabaseError> {
    Ok(Document {
        id: parse_uuid(&row.id)?,
        atp_code: row.atp_code,
        site_id: row.site_id,
        file_name: row.file_name,
        file_path: row.file_path,
        category: Category::from_str(&row.category)?,
        classification_confidence: row.classification_confidence,
        classification_method: row.classification_method,
        workflow_path: Category::from_str(&row.workflow_path)?,
        current_stage: row.current_stage,
        current_status: DocumentStatus::from_str(&row.current_status)?,
        rectification_stage: row.rectification_stage,
        submitted_at: row.submitted_at,
        approval_date: row.approval_date,
        final_approver: row.final_approver,
        completion_percentage: row.completion_percentage,
    })
}
