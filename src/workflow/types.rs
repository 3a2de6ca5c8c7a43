use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::classify::CategoryScore;
use super::error::WorkflowError;
use super::sla::SlaStatus;
use super::transition::Transition;
use crate::models::enums::{Category, Decision, DocumentStatus, PunchlistSeverity, Role, StageCode};
use crate::models::{Document, ReviewStage};

// ---------------------------------------------------------------------------
// Actor
// ---------------------------------------------------------------------------

/// Who is acting, as reported by the role resolver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub role: Role,
    pub id: Option<String>,
}

impl Actor {
    pub fn new(role: Role, id: Option<String>) -> Self {
        Self { role, id }
    }

    /// Resolve a raw role string. An unknown or missing role is unauthorized.
    pub fn resolve(raw_role: Option<&str>, id: Option<&str>) -> Result<Self, WorkflowError> {
        let raw = raw_role.unwrap_or_default();
        let role = Role::parse_acting(raw).ok_or_else(|| WorkflowError::Unauthorized {
            role: if raw.is_empty() { "<none>".into() } else { raw.to_string() },
            required: "a known reviewer role".into(),
        })?;
        let id = id.map(str::trim).filter(|s| !s.is_empty()).map(String::from);
        Ok(Self { role, id })
    }

    /// Identity recorded as reviewer / approver: the actor id, or the role.
    pub fn label(&self) -> String {
        self.id.clone().unwrap_or_else(|| self.role.as_str().to_string())
    }
}

// ---------------------------------------------------------------------------
// Submit
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubmitRequest {
    #[serde(default)]
    pub site_id: String,
    #[serde(default)]
    pub file_name: String,
    /// Storage reference; defaults to the file name.
    #[serde(default)]
    pub file_path: Option<String>,
    #[serde(default)]
    pub category_hint: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubmitOutcome {
    pub document_id: Uuid,
    pub atp_code: String,
    pub category: Category,
    pub confidence: f64,
    pub method: &'static str,
    pub scores: Vec<CategoryScore>,
    pub initial_stage: StageCode,
    pub initial_role: Role,
    pub sla_deadline: DateTime<Utc>,
    pub total_stages: usize,
}

// ---------------------------------------------------------------------------
// Review
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct PunchlistInput {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub severity: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub assigned_team: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReviewRequest {
    pub stage_id: Uuid,
    #[serde(default)]
    pub decision: String,
    #[serde(default)]
    pub comments: Option<String>,
    #[serde(default)]
    pub punchlist_items: Vec<PunchlistInput>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReviewOutcome {
    pub document_id: Uuid,
    pub stage_number: u32,
    pub decision: Decision,
    pub severity: PunchlistSeverity,
    pub transition: Transition,
    /// Code of the newly pending stage, or a terminal sentinel.
    pub next_stage: String,
    pub document_status: DocumentStatus,
    pub workflow_status: String,
    pub punchlist_created_count: usize,
    pub completion_percentage: u8,
    pub next_sla_deadline: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Status / listings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct StageView {
    #[serde(flatten)]
    pub stage: ReviewStage,
    pub sla_status: Option<SlaStatus>,
    pub hours_remaining: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DocumentStatusView {
    pub document: Document,
    pub workflow_status: String,
    pub stages: Vec<StageView>,
    pub progress_percentage: u8,
    pub open_punchlist_count: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct PendingReview {
    pub stage_id: Uuid,
    pub document_id: Uuid,
    pub atp_code: Option<String>,
    pub stage_number: u32,
    pub stage_code: StageCode,
    pub stage_name: String,
    pub required_role: Role,
    pub sla_deadline: Option<DateTime<Utc>>,
    pub sla_status: SlaStatus,
    pub hours_remaining: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PendingReviews {
    pub role: Role,
    pub reviews: Vec<PendingReview>,
    pub overdue_count: usize,
    pub urgent_count: usize,
}

/// Reviewer dashboard counters. Week windows are the trailing seven days.
#[derive(Debug, Clone, Serialize)]
pub struct ReviewStats {
    pub role: Option<Role>,
    pub reviewer_id: Option<String>,
    pub total_reviews: u32,
    pub pending_reviews: u32,
    pub completed_today: u32,
    pub approved_this_week: u32,
    pub rejected_this_week: u32,
    pub overdue_reviews: u32,
    /// Approved share of this week's decisions, in whole percent.
    pub approval_rate: u8,
}

// ---------------------------------------------------------------------------
// Rectification loop / override
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct PunchlistResolution {
    pub item_id: Uuid,
    pub document_id: Uuid,
    pub open_remaining: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResubmitOutcome {
    pub document_id: Uuid,
    pub stage_number: u32,
    pub stage_code: StageCode,
    pub sla_deadline: DateTime<Utc>,
    pub workflow_status: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct QuickApproveOutcome {
    pub document_id: Uuid,
    pub stages_bypassed: usize,
    pub approval_date: DateTime<Utc>,
    pub final_approver: String,
    pub workflow_status: String,
}
