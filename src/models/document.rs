use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::enums::{
    Category, DocumentStatus, PunchlistSeverity, PunchlistStatus, Role, StageCode,
    StageEventKind, StageStatus,
};

/// Sentinel stored in `current_stage` once a document is approved.
pub const APPROVED_SENTINEL: &str = "APPROVED";
/// Sentinel stored in `current_stage` while a document awaits rectification.
pub const RECTIFICATION_SENTINEL: &str = "PUNCHLIST_RECTIFICATION";

#[derive(Debug, Clone, Serialize)]
pub struct Document {
    pub id: Uuid,
    pub atp_code: String,
    pub site_id: String,
    pub file_name: String,
    pub file_path: String,
    pub category: Category,
    pub classification_confidence: f64,
    pub classification_method: String,
    pub workflow_path: Category,
    pub current_stage: String,
    pub current_status: DocumentStatus,
    /// Stage number that raised the open rectification, if any.
    pub rectification_stage: Option<u32>,
    pub submitted_at: DateTime<Utc>,
    pub approval_date: Option<DateTime<Utc>>,
    pub final_approver: Option<String>,
    pub completion_percentage: u8,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReviewStage {
    pub id: Uuid,
    pub document_id: Uuid,
    pub stage_number: u32,
    pub stage_code: StageCode,
    pub stage_name: String,
    pub required_role: Role,
    pub status: StageStatus,
    pub decision: Option<String>,
    pub reviewer_id: Option<String>,
    pub comments: Option<String>,
    pub sla_deadline: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PunchlistItem {
    pub id: Uuid,
    pub punchlist_number: String,
    pub document_id: Uuid,
    pub review_stage_id: Uuid,
    pub description: String,
    pub category: String,
    pub severity: PunchlistSeverity,
    pub status: PunchlistStatus,
    pub assigned_team: Option<String>,
    pub identified_by: Option<String>,
    pub identified_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolved_by: Option<String>,
    pub resolution_notes: Option<String>,
}

/// Append-only audit record of a stage mutation.
#[derive(Debug, Clone, Serialize)]
pub struct StageEvent {
    pub id: i64,
    pub document_id: Uuid,
    pub stage_number: Option<u32>,
    pub kind: StageEventKind,
    pub decision: Option<String>,
    pub actor_role: Option<String>,
    pub actor_id: Option<String>,
    pub severity: Option<PunchlistSeverity>,
    pub detail: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Event payload before it is assigned a row id.
#[derive(Debug, Clone, Default)]
pub struct NewStageEvent {
    pub stage_number: Option<u32>,
    pub decision: Option<String>,
    pub actor_role: Option<String>,
    pub actor_id: Option<String>,
    pub severity: Option<PunchlistSeverity>,
    pub detail: Option<String>,
}
