//! Workflow service: the operations that move ATP documents through review.
//!
//! Every mutating operation validates and authorizes first, then applies all
//! of its writes in one SQLite transaction.

use chrono::{DateTime, Duration, NaiveTime, Utc};
use rusqlite::Connection;
use uuid::Uuid;

use super::catalog::WorkflowCatalog;
use super::classify::classify;
use super::error::WorkflowError;
use super::path::resolve_path;
use super::severity;
use super::sla::{self, SlaStatus};
use super::transition::{next_transition, workflow_status_label, Transition};
use super::types::*;
use crate::db::repository;
use crate::models::enums::*;
use crate::models::*;

const DEFAULT_PUNCHLIST_CATEGORY: &str = "General";
const OVERRIDE_DECISION: &str = "approve";
const OVERRIDE_COMMENT: &str = "Administrative override";

pub struct WorkflowService<'a> {
    conn: &'a Connection,
    catalog: &'a WorkflowCatalog,
    clock: Option<DateTime<Utc>>,
}

impl<'a> WorkflowService<'a> {
    pub fn new(conn: &'a Connection, catalog: &'a WorkflowCatalog) -> Self {
        Self {
            conn,
            catalog,
            clock: None,
        }
    }

    /// Pin the service clock (used for SLA computations in tests and replays).
    pub fn at(mut self, now: DateTime<Utc>) -> Self {
        self.clock = Some(now);
        self
    }

    fn now(&self) -> DateTime<Utc> {
        self.clock.unwrap_or_else(Utc::now)
    }

    // -----------------------------------------------------------------------
    // Submit
    // -----------------------------------------------------------------------

    pub fn submit(&self, req: &SubmitRequest) -> Result<SubmitOutcome, WorkflowError> {
        let site_id = req.site_id.trim();
        let file_name = req.file_name.trim();
        if site_id.is_empty() {
            return Err(WorkflowError::Validation("site_id is required".into()));
        }
        if file_name.is_empty() {
            return Err(WorkflowError::Validation("file_name is required".into()));
        }
        let file_path = req
            .file_path
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .unwrap_or(file_name);

        let classification = classify(file_name).with_hint(
            req.category_hint.as_deref(),
            self.catalog.hint_override_threshold(),
        )?;
        let path = resolve_path(classification.category);
        let first = *path
            .first()
            .ok_or_else(|| WorkflowError::Conflict("workflow path has no stages".into()))?;

        let now = self.now();
        let first_deadline = sla::deadline(self.catalog, first.required_role, now);

        let tx = self.conn.unchecked_transaction()?;
        let sequence = repository::count_documents_for_site(&tx, site_id)? + 1;
        let document = Document {
            id: Uuid::new_v4(),
            atp_code: format!("ATP-{site_id}-{sequence:03}"),
            site_id: site_id.to_string(),
            file_name: file_name.to_string(),
            file_path: file_path.to_string(),
            category: classification.category,
            classification_confidence: classification.confidence,
            classification_method: classification.method.to_string(),
            workflow_path: classification.category,
            current_stage: first.stage_code.as_str().to_string(),
            current_status: DocumentStatus::InReview,
            rectification_stage: None,
            submitted_at: now,
            approval_date: None,
            final_approver: None,
            completion_percentage: 0,
        };
        repository::insert_document(&tx, &document)?;

        for spec in &path {
            let is_first = spec.stage_number == first.stage_number;
            repository::insert_stage(
                &tx,
                &ReviewStage {
                    id: Uuid::new_v4(),
                    document_id: document.id,
                    stage_number: spec.stage_number,
                    stage_code: spec.stage_code,
                    stage_name: spec.stage_code.display_name().to_string(),
                    required_role: spec.required_role,
                    status: if is_first { StageStatus::Pending } else { StageStatus::Waiting },
                    decision: None,
                    reviewer_id: None,
                    comments: None,
                    sla_deadline: is_first.then_some(first_deadline),
                    completed_at: None,
                },
            )?;
        }

        repository::append_stage_event(
            &tx,
            &document.id,
            StageEventKind::Submitted,
            &NewStageEvent {
                detail: Some(format!(
                    "category={} method={} confidence={:.3}",
                    classification.category, classification.method, classification.confidence
                )),
                ..Default::default()
            },
            now,
        )?;
        repository::append_stage_event(
            &tx,
            &document.id,
            StageEventKind::StageActivated,
            &NewStageEvent {
                stage_number: Some(first.stage_number),
                ..Default::default()
            },
            now,
        )?;
        tx.commit()?;

        tracing::info!(
            document_id = %document.id,
            atp_code = %document.atp_code,
            category = %classification.category,
            confidence = classification.confidence,
            "ATP document submitted"
        );

        Ok(SubmitOutcome {
            document_id: document.id,
            atp_code: document.atp_code,
            category: classification.category,
            confidence: classification.confidence,
            method: classification.method,
            scores: classification.scores,
            initial_stage: first.stage_code,
            initial_role: first.required_role,
            sla_deadline: first_deadline,
            total_stages: path.len(),
        })
    }

    // -----------------------------------------------------------------------
    // Review
    // -----------------------------------------------------------------------

    pub fn review(
        &self,
        document_id: &Uuid,
        req: &ReviewRequest,
        reviewer: &Actor,
    ) -> Result<ReviewOutcome, WorkflowError> {
        let decision = Decision::parse(&req.decision)
            .ok_or_else(|| WorkflowError::Validation("decision is required".into()))?;
        let items = validate_punchlist(&req.punchlist_items)?;

        let mut document = self.load_document(document_id)?;
        let stage = repository::get_stage(self.conn, &req.stage_id)?
            .filter(|s| s.document_id == document.id)
            .ok_or_else(|| WorkflowError::not_found("ReviewStage", req.stage_id))?;

        if reviewer.role != stage.required_role {
            return Err(WorkflowError::Unauthorized {
                role: reviewer.role.to_string(),
                required: stage.required_role.to_string(),
            });
        }
        if document.current_status.is_terminal() {
            return Err(WorkflowError::Conflict(format!(
                "document {} is {}",
                document.atp_code, document.current_status
            )));
        }
        match stage.status {
            StageStatus::Completed => {
                return Err(WorkflowError::Conflict(format!(
                    "stage {} already has a decision",
                    stage.stage_number
                )))
            }
            StageStatus::Waiting => {
                return Err(WorkflowError::Conflict(format!(
                    "stage {} is not active yet",
                    stage.stage_number
                )))
            }
            StageStatus::Pending => {}
        }

        if let Decision::Unrecognized(raw) = &decision {
            tracing::warn!(
                document_id = %document.id,
                stage = stage.stage_number,
                decision = %raw,
                "Unrecognized review decision, routing to rectification"
            );
        }

        let severity = severity::evaluate(items.iter().map(|(_, s)| *s));
        let stages = repository::list_stages(self.conn, &document.id)?;
        let next_stage = stages
            .iter()
            .find(|s| s.stage_number > stage.stage_number)
            .cloned();
        let transition = next_transition(&decision, severity, next_stage.is_some());

        let now = self.now();
        let reviewer_label = reviewer.label();
        let tx = self.conn.unchecked_transaction()?;

        if !repository::complete_stage(
            &tx,
            &stage.id,
            decision.as_str(),
            reviewer.id.as_deref(),
            req.comments.as_deref(),
            now,
        )? {
            return Err(WorkflowError::Conflict(format!(
                "stage {} was decided concurrently",
                stage.stage_number
            )));
        }

        let mut sequence = repository::count_punchlist_for_document(&tx, &document.id)?;
        for (input, item_severity) in &items {
            sequence += 1;
            repository::insert_punchlist_item(
                &tx,
                &PunchlistItem {
                    id: Uuid::new_v4(),
                    punchlist_number: format!("PL-{}-{sequence:02}", document.atp_code),
                    document_id: document.id,
                    review_stage_id: stage.id,
                    description: input.description.trim().to_string(),
                    category: input
                        .category
                        .clone()
                        .filter(|c| !c.trim().is_empty())
                        .unwrap_or_else(|| DEFAULT_PUNCHLIST_CATEGORY.to_string()),
                    severity: *item_severity,
                    status: PunchlistStatus::Open,
                    assigned_team: input.assigned_team.clone(),
                    identified_by: Some(reviewer_label.clone()),
                    identified_at: now,
                    resolved_at: None,
                    resolved_by: None,
                    resolution_notes: None,
                },
            )?;
        }

        repository::append_stage_event(
            &tx,
            &document.id,
            StageEventKind::StageCompleted,
            &NewStageEvent {
                stage_number: Some(stage.stage_number),
                decision: Some(decision.as_str().to_string()),
                actor_role: Some(reviewer.role.to_string()),
                actor_id: reviewer.id.clone(),
                severity: Some(severity),
                detail: req.comments.clone(),
            },
            now,
        )?;

        let completed = completed_count(&stages) + 1;
        let mut next_sla_deadline = None;
        let mut pending_role = None;

        match (transition, &next_stage) {
            (Transition::Advance, Some(next)) => {
                let deadline = sla::deadline(self.catalog, next.required_role, now);
                if !repository::activate_stage(&tx, &next.id, deadline)? {
                    return Err(WorkflowError::Conflict(format!(
                        "stage {} is no longer waiting",
                        next.stage_number
                    )));
                }
                repository::append_stage_event(
                    &tx,
                    &document.id,
                    StageEventKind::StageActivated,
                    &NewStageEvent {
                        stage_number: Some(next.stage_number),
                        ..Default::default()
                    },
                    now,
                )?;
                document.current_stage = next.stage_code.as_str().to_string();
                document.completion_percentage = progress(completed, stages.len());
                next_sla_deadline = Some(deadline);
                pending_role = Some(next.required_role);
            }
            (Transition::Approved, _) | (Transition::Advance, None) => {
                document.current_stage = APPROVED_SENTINEL.to_string();
                document.current_status = DocumentStatus::Approved;
                document.completion_percentage = 100;
                document.approval_date = Some(now);
                document.final_approver = Some(reviewer_label.clone());
                repository::append_stage_event(
                    &tx,
                    &document.id,
                    StageEventKind::Approved,
                    &NewStageEvent {
                        stage_number: Some(stage.stage_number),
                        actor_role: Some(reviewer.role.to_string()),
                        actor_id: reviewer.id.clone(),
                        ..Default::default()
                    },
                    now,
                )?;
            }
            (Transition::Rectification, _) => {
                document.current_stage = RECTIFICATION_SENTINEL.to_string();
                document.current_status = DocumentStatus::PunchlistRectification;
                document.rectification_stage = Some(stage.stage_number);
                document.completion_percentage = progress(completed, stages.len());
                repository::append_stage_event(
                    &tx,
                    &document.id,
                    StageEventKind::RectificationRequired,
                    &NewStageEvent {
                        stage_number: Some(stage.stage_number),
                        decision: Some(decision.as_str().to_string()),
                        actor_role: Some(reviewer.role.to_string()),
                        actor_id: reviewer.id.clone(),
                        severity: Some(severity),
                        ..Default::default()
                    },
                    now,
                )?;
            }
        }

        repository::update_document_progress(&tx, &document)?;
        let has_punchlist = repository::count_punchlist_for_document(&tx, &document.id)? > 0;
        tx.commit()?;

        tracing::info!(
            document_id = %document.id,
            stage = stage.stage_number,
            decision = decision.as_str(),
            severity = %severity,
            next_stage = %document.current_stage,
            "Review decision applied"
        );

        Ok(ReviewOutcome {
            document_id: document.id,
            stage_number: stage.stage_number,
            decision,
            severity,
            transition,
            next_stage: document.current_stage.clone(),
            document_status: document.current_status,
            workflow_status: workflow_status_label(document.current_status, pending_role, has_punchlist),
            punchlist_created_count: items.len(),
            completion_percentage: document.completion_percentage,
            next_sla_deadline,
        })
    }

    // -----------------------------------------------------------------------
    // Status
    // -----------------------------------------------------------------------

    pub fn get_status(&self, document_id: &Uuid) -> Result<DocumentStatusView, WorkflowError> {
        let document = self.load_document(document_id)?;
        let stages = repository::list_stages(self.conn, &document.id)?;
        let open_punchlist_count = repository::count_open_punchlist(self.conn, &document.id)?;
        let has_punchlist = repository::count_punchlist_for_document(self.conn, &document.id)? > 0;

        let now = self.now();
        let pending_role = stages
            .iter()
            .find(|s| s.status == StageStatus::Pending)
            .map(|s| s.required_role);
        let progress_percentage = if document.current_status == DocumentStatus::Approved {
            100
        } else {
            progress(completed_count(&stages), stages.len())
        };

        let stages = stages
            .into_iter()
            .map(|stage| {
                let live_deadline = stage
                    .sla_deadline
                    .filter(|_| stage.status == StageStatus::Pending);
                StageView {
                    sla_status: live_deadline
                        .map(|d| sla::sla_status(d, now, self.catalog.urgent_window())),
                    hours_remaining: live_deadline.map(|d| sla::hours_remaining(d, now)),
                    stage,
                }
            })
            .collect();

        Ok(DocumentStatusView {
            workflow_status: workflow_status_label(document.current_status, pending_role, has_punchlist),
            document,
            stages,
            progress_percentage,
            open_punchlist_count,
        })
    }

    // -----------------------------------------------------------------------
    // Administrative override
    // -----------------------------------------------------------------------

    pub fn quick_approve(
        &self,
        document_id: &Uuid,
        actor: &Actor,
    ) -> Result<QuickApproveOutcome, WorkflowError> {
        if !self.catalog.is_admin(actor.role) {
            return Err(WorkflowError::Unauthorized {
                role: actor.role.to_string(),
                required: Role::Admin.to_string(),
            });
        }
        let mut document = self.load_document(document_id)?;
        if document.current_status == DocumentStatus::Approved {
            return Err(WorkflowError::Conflict(format!(
                "document {} is already approved",
                document.atp_code
            )));
        }

        let now = self.now();
        let approver = actor.label();
        let tx = self.conn.unchecked_transaction()?;
        let bypassed = repository::complete_open_stages(
            &tx,
            &document.id,
            OVERRIDE_DECISION,
            actor.id.as_deref(),
            Some(OVERRIDE_COMMENT),
            now,
        )?;

        let previous_stage = std::mem::replace(&mut document.current_stage, APPROVED_SENTINEL.to_string());
        document.current_status = DocumentStatus::Approved;
        document.rectification_stage = None;
        document.completion_percentage = 100;
        document.approval_date = Some(now);
        document.final_approver = Some(approver.clone());
        repository::update_document_progress(&tx, &document)?;

        repository::append_stage_event(
            &tx,
            &document.id,
            StageEventKind::AdministrativeOverride,
            &NewStageEvent {
                actor_role: Some(actor.role.to_string()),
                actor_id: actor.id.clone(),
                detail: Some(format!("bypassed {bypassed} stage(s) from {previous_stage}")),
                ..Default::default()
            },
            now,
        )?;
        let has_punchlist = repository::count_punchlist_for_document(&tx, &document.id)? > 0;
        tx.commit()?;

        tracing::warn!(
            document_id = %document.id,
            atp_code = %document.atp_code,
            actor = %approver,
            stages_bypassed = bypassed,
            "Administrative override: document approved without remaining reviews"
        );

        Ok(QuickApproveOutcome {
            document_id: document.id,
            stages_bypassed: bypassed,
            approval_date: now,
            final_approver: approver,
            workflow_status: workflow_status_label(DocumentStatus::Approved, None, has_punchlist),
        })
    }

    // -----------------------------------------------------------------------
    // Rectification loop
    // -----------------------------------------------------------------------

    pub fn complete_punchlist(
        &self,
        item_id: &Uuid,
        notes: Option<&str>,
        actor: &Actor,
    ) -> Result<PunchlistResolution, WorkflowError> {
        let item = repository::get_punchlist_item(self.conn, item_id)?
            .ok_or_else(|| WorkflowError::not_found("PunchlistItem", item_id))?;
        if item.status == PunchlistStatus::Resolved {
            return Err(WorkflowError::Conflict(format!(
                "punchlist item {} is already resolved",
                item.punchlist_number
            )));
        }

        let now = self.now();
        let resolver = actor.label();
        let tx = self.conn.unchecked_transaction()?;
        if !repository::resolve_punchlist_item(&tx, &item.id, Some(&resolver), notes, now)? {
            return Err(WorkflowError::Conflict(format!(
                "punchlist item {} was resolved concurrently",
                item.punchlist_number
            )));
        }
        repository::append_stage_event(
            &tx,
            &item.document_id,
            StageEventKind::PunchlistResolved,
            &NewStageEvent {
                actor_role: Some(actor.role.to_string()),
                actor_id: actor.id.clone(),
                severity: Some(item.severity),
                detail: Some(item.punchlist_number.clone()),
                ..Default::default()
            },
            now,
        )?;
        let open_remaining = repository::count_open_punchlist(&tx, &item.document_id)?;
        tx.commit()?;

        tracing::info!(
            document_id = %item.document_id,
            item = %item.punchlist_number,
            open_remaining,
            "Punchlist item resolved"
        );

        Ok(PunchlistResolution {
            item_id: item.id,
            document_id: item.document_id,
            open_remaining,
        })
    }

    /// Return a rectified document to the stage that blocked it.
    pub fn resubmit(&self, document_id: &Uuid, actor: &Actor) -> Result<ResubmitOutcome, WorkflowError> {
        let mut document = self.load_document(document_id)?;
        if document.current_status != DocumentStatus::PunchlistRectification {
            return Err(WorkflowError::Conflict(format!(
                "document {} is not awaiting rectification",
                document.atp_code
            )));
        }
        let open = repository::count_open_punchlist(self.conn, &document.id)?;
        if open > 0 {
            return Err(WorkflowError::Conflict(format!(
                "{open} punchlist item(s) still open"
            )));
        }
        let stage_number = document.rectification_stage.ok_or_else(|| {
            WorkflowError::Conflict("rectification stage is not recorded".into())
        })?;
        let stages = repository::list_stages(self.conn, &document.id)?;
        let stage = stages
            .iter()
            .find(|s| s.stage_number == stage_number)
            .ok_or_else(|| WorkflowError::not_found("ReviewStage", stage_number))?;

        let now = self.now();
        let deadline = sla::deadline(self.catalog, stage.required_role, now);
        let tx = self.conn.unchecked_transaction()?;
        if !repository::reopen_stage(&tx, &stage.id, deadline)? {
            return Err(WorkflowError::Conflict(format!(
                "stage {stage_number} cannot be reopened"
            )));
        }

        document.current_status = DocumentStatus::InReview;
        document.current_stage = stage.stage_code.as_str().to_string();
        document.rectification_stage = None;
        document.completion_percentage = progress(completed_count(&stages).saturating_sub(1), stages.len());
        repository::update_document_progress(&tx, &document)?;
        repository::append_stage_event(
            &tx,
            &document.id,
            StageEventKind::Resubmitted,
            &NewStageEvent {
                stage_number: Some(stage_number),
                actor_role: Some(actor.role.to_string()),
                actor_id: actor.id.clone(),
                ..Default::default()
            },
            now,
        )?;
        tx.commit()?;

        tracing::info!(
            document_id = %document.id,
            stage = stage_number,
            "Document resubmitted after rectification"
        );

        Ok(ResubmitOutcome {
            document_id: document.id,
            stage_number,
            stage_code: stage.stage_code,
            sla_deadline: deadline,
            workflow_status: workflow_status_label(DocumentStatus::InReview, Some(stage.required_role), true),
        })
    }

    pub fn list_punchlist(&self, document_id: &Uuid) -> Result<Vec<PunchlistItem>, WorkflowError> {
        let document = self.load_document(document_id)?;
        Ok(repository::list_punchlist_for_document(self.conn, &document.id)?)
    }

    // -----------------------------------------------------------------------
    // SLA views
    // -----------------------------------------------------------------------

    /// Pending stages for a role, most urgent first.
    pub fn pending_reviews(&self, role: Role) -> Result<PendingReviews, WorkflowError> {
        let now = self.now();
        let mut reviews: Vec<PendingReview> = repository::list_pending_for_role(self.conn, &role)?
            .into_iter()
            .map(|(stage, atp_code)| self.pending_view(stage, Some(atp_code), now))
            .collect();
        sort_by_deadline(&mut reviews);

        let overdue_count = reviews.iter().filter(|r| r.sla_status == SlaStatus::Overdue).count();
        let urgent_count = reviews.iter().filter(|r| r.sla_status == SlaStatus::Urgent).count();
        Ok(PendingReviews {
            role,
            reviews,
            overdue_count,
            urgent_count,
        })
    }

    /// Every pending stage whose deadline has passed.
    pub fn overdue_stages(&self) -> Result<Vec<PendingReview>, WorkflowError> {
        let now = self.now();
        let mut overdue: Vec<PendingReview> = repository::list_all_pending(self.conn)?
            .into_iter()
            .map(|stage| self.pending_view(stage, None, now))
            .filter(|r| r.sla_status == SlaStatus::Overdue)
            .collect();
        sort_by_deadline(&mut overdue);
        Ok(overdue)
    }

    /// Dashboard counters, optionally scoped to one role or one reviewer.
    pub fn review_stats(&self, role: Option<Role>, reviewer_id: Option<&str>) -> Result<ReviewStats, WorkflowError> {
        let now = self.now();
        let day_start = now.date_naive().and_time(NaiveTime::MIN).and_utc();
        let week_start = now - Duration::days(7);
        let reviewer_id = reviewer_id.map(str::trim).filter(|r| !r.is_empty());

        let activity =
            repository::count_stage_activity(self.conn, role.as_ref(), reviewer_id, day_start, week_start, now)?;
        Ok(ReviewStats {
            role,
            reviewer_id: reviewer_id.map(String::from),
            total_reviews: activity.completed,
            pending_reviews: activity.pending,
            completed_today: activity.completed_since_day,
            approved_this_week: activity.approved_since_week,
            rejected_this_week: activity.rejected_since_week,
            overdue_reviews: activity.overdue,
            approval_rate: approval_rate(activity.approved_since_week, activity.rejected_since_week),
        })
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn load_document(&self, id: &Uuid) -> Result<Document, WorkflowError> {
        repository::get_document(self.conn, id)?.ok_or_else(|| WorkflowError::not_found("Document", id))
    }

    fn pending_view(&self, stage: ReviewStage, atp_code: Option<String>, now: DateTime<Utc>) -> PendingReview {
        let sla_status = stage
            .sla_deadline
            .map_or(SlaStatus::Normal, |d| sla::sla_status(d, now, self.catalog.urgent_window()));
        PendingReview {
            stage_id: stage.id,
            document_id: stage.document_id,
            atp_code,
            stage_number: stage.stage_number,
            stage_code: stage.stage_code,
            stage_name: stage.stage_name,
            required_role: stage.required_role,
            sla_deadline: stage.sla_deadline,
            sla_status,
            hours_remaining: stage.sla_deadline.map(|d| sla::hours_remaining(d, now)),
        }
    }
}

fn validate_punchlist(
    inputs: &[PunchlistInput],
) -> Result<Vec<(&PunchlistInput, PunchlistSeverity)>, WorkflowError> {
    inputs
        .iter()
        .enumerate()
        .map(|(i, input)| {
            if input.description.trim().is_empty() {
                return Err(WorkflowError::Validation(format!(
                    "punchlist item {} needs a description",
                    i + 1
                )));
            }
            let severity = PunchlistSeverity::parse_item(&input.severity).ok_or_else(|| {
                WorkflowError::Validation(format!(
                    "punchlist item {} has invalid severity '{}'",
                    i + 1,
                    input.severity
                ))
            })?;
            Ok((input, severity))
        })
        .collect()
}

fn completed_count(stages: &[ReviewStage]) -> usize {
    stages
        .iter()
        .filter(|s| s.status == StageStatus::Completed)
        .count()
}

fn progress(completed: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    ((completed.min(total) * 100) / total) as u8
}

fn approval_rate(approved: u32, rejected: u32) -> u8 {
    let decided = approved + rejected;
    if decided == 0 {
        return 0;
    }
    (f64::from(approved) * 100.0 / f64::from(decided)).round() as u8
}

fn sort_by_deadline(reviews: &mut [PendingReview]) {
    // Stages without a deadline sort last.
    reviews.sort_by_key(|r| (r.sla_deadline.is_none(), r.sla_deadline));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::sqlite::open_memory_database;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 8, 0, 0).unwrap()
    }

    fn actor(role: Role) -> Actor {
        Actor::new(role, Some(format!("user-{}", role.as_str().to_lowercase())))
    }

    fn submit(svc: &WorkflowService<'_>, file_name: &str) -> SubmitOutcome {
        svc.submit(&SubmitRequest {
            site_id: "JKT001".into(),
            file_name: file_name.into(),
            ..Default::default()
        })
        .unwrap()
    }

    fn stage_id(conn: &Connection, document_id: &Uuid, number: u32) -> Uuid {
        repository::list_stages(conn, document_id)
            .unwrap()
            .into_iter()
            .find(|s| s.stage_number == number)
            .map(|s| s.id)
            .unwrap()
    }

    fn decide(decision: &str, stage_id: Uuid, items: Vec<(&str, &str)>) -> ReviewRequest {
        ReviewRequest {
            stage_id,
            decision: decision.into(),
            comments: None,
            punchlist_items: items
                .into_iter()
                .map(|(description, severity)| PunchlistInput {
                    description: description.into(),
                    severity: severity.into(),
                    category: None,
                    assigned_team: None,
                })
                .collect(),
        }
    }

    /// Exactly one pending stage unless terminal; completed before it, waiting after.
    fn assert_stage_invariant(conn: &Connection, document_id: &Uuid) {
        let doc = repository::get_document(conn, document_id).unwrap().unwrap();
        let stages = repository::list_stages(conn, document_id).unwrap();
        let pending: Vec<&ReviewStage> = stages.iter().filter(|s| s.status == StageStatus::Pending).collect();
        if doc.current_status.is_terminal() {
            assert!(pending.is_empty());
            return;
        }
        assert_eq!(pending.len(), 1);
        let p = pending[0];
        assert_eq!(doc.current_stage, p.stage_code.as_str());
        for s in &stages {
            if s.stage_number < p.stage_number {
                assert_eq!(s.status, StageStatus::Completed);
            } else if s.stage_number > p.stage_number {
                assert_eq!(s.status, StageStatus::Waiting);
            }
        }
    }

    #[test]
    fn submit_creates_path_with_first_stage_pending() {
        let conn = open_memory_database().unwrap();
        let catalog = WorkflowCatalog::default();
        let svc = WorkflowService::new(&conn, &catalog).at(t0());

        let out = submit(&svc, "XLSmart MW ATP (SW License UG BW)");
        assert_eq!(out.atp_code, "ATP-JKT001-001");
        assert_eq!(out.category, Category::SoftwareLicense);
        assert_eq!(out.initial_stage, StageCode::BoReview);
        assert_eq!(out.sla_deadline, t0() + Duration::hours(48));
        assert_eq!(out.total_stages, 3);
        assert_stage_invariant(&conn, &out.document_id);

        let second = submit(&svc, "Microwave upgrade");
        assert_eq!(second.atp_code, "ATP-JKT001-002");

        let events = repository::list_stage_events(&conn, &out.document_id).unwrap();
        assert_eq!(events[0].kind, StageEventKind::Submitted);
        assert_eq!(events[1].kind, StageEventKind::StageActivated);
    }

    #[test]
    fn submit_validates_input() {
        let conn = open_memory_database().unwrap();
        let catalog = WorkflowCatalog::default();
        let svc = WorkflowService::new(&conn, &catalog);

        let missing_site = svc.submit(&SubmitRequest {
            file_name: "mw.pdf".into(),
            ..Default::default()
        });
        assert!(matches!(missing_site, Err(WorkflowError::Validation(_))));

        let bad_hint = svc.submit(&SubmitRequest {
            site_id: "JKT001".into(),
            file_name: "scan.pdf".into(),
            category_hint: Some("satellite".into()),
            ..Default::default()
        });
        assert!(matches!(bad_hint, Err(WorkflowError::Validation(_))));
        assert_eq!(repository::count_documents_for_site(&conn, "JKT001").unwrap(), 0);
    }

    #[test]
    fn full_approval_path() {
        let conn = open_memory_database().unwrap();
        let catalog = WorkflowCatalog::default();
        let svc = WorkflowService::new(&conn, &catalog).at(t0());
        let doc = submit(&svc, "Microwave reroute");

        let first = svc
            .review(&doc.document_id, &decide("approve", stage_id(&conn, &doc.document_id, 1), vec![]), &actor(Role::FopRts))
            .unwrap();
        assert_eq!(first.transition, Transition::Advance);
        assert_eq!(first.next_stage, "REGION_REVIEW");
        assert_eq!(first.workflow_status, "Pending REGION_TEAM Review");
        assert_eq!(first.completion_percentage, 33);
        assert_eq!(first.next_sla_deadline, Some(t0() + Duration::hours(48)));
        assert_stage_invariant(&conn, &doc.document_id);

        svc.review(&doc.document_id, &decide("approve", stage_id(&conn, &doc.document_id, 2), vec![]), &actor(Role::RegionTeam))
            .unwrap();
        let last = svc
            .review(&doc.document_id, &decide("APPROVE", stage_id(&conn, &doc.document_id, 3), vec![]), &actor(Role::Rth))
            .unwrap();
        assert_eq!(last.transition, Transition::Approved);
        assert_eq!(last.next_stage, APPROVED_SENTINEL);
        assert_eq!(last.completion_percentage, 100);
        assert_eq!(last.workflow_status, "ATP Document Full Signed");

        let stored = repository::get_document(&conn, &doc.document_id).unwrap().unwrap();
        assert_eq!(stored.current_status, DocumentStatus::Approved);
        assert_eq!(stored.approval_date, Some(t0()));
        assert_eq!(stored.final_approver.as_deref(), Some("user-rth"));
        assert_stage_invariant(&conn, &doc.document_id);
    }

    #[test]
    fn rth_stage_gets_24_hour_deadline() {
        let conn = open_memory_database().unwrap();
        let catalog = WorkflowCatalog::default();
        let svc = WorkflowService::new(&conn, &catalog).at(t0());
        let doc = submit(&svc, "PLN power upgrade");

        let out = svc
            .review(&doc.document_id, &decide("approve", stage_id(&conn, &doc.document_id, 1), vec![]), &actor(Role::Roh))
            .unwrap();
        assert_eq!(out.next_stage, "RTH_REVIEW");
        assert_eq!(out.next_sla_deadline, Some(t0() + Duration::hours(24)));
    }

    #[test]
    fn critical_punchlist_blocks_on_first_stage() {
        let conn = open_memory_database().unwrap();
        let catalog = WorkflowCatalog::default();
        let svc = WorkflowService::new(&conn, &catalog).at(t0());
        let doc = submit(&svc, "Microwave reroute");

        let out = svc
            .review(
                &doc.document_id,
                &decide(
                    "approve_with_punchlist",
                    stage_id(&conn, &doc.document_id, 1),
                    vec![("Antenna misaligned", "critical"), ("Label missing", "minor")],
                ),
                &actor(Role::FopRts),
            )
            .unwrap();
        assert_eq!(out.transition, Transition::Rectification);
        assert_eq!(out.severity, PunchlistSeverity::Critical);
        assert_eq!(out.next_stage, RECTIFICATION_SENTINEL);
        assert_eq!(out.punchlist_created_count, 2);
        assert_eq!(
            out.workflow_status,
            "Returns to Clear Punchlist (Mandatory Site Rectification)"
        );

        let stored = repository::get_document(&conn, &doc.document_id).unwrap().unwrap();
        assert_eq!(stored.rectification_stage, Some(1));
        assert_stage_invariant(&conn, &doc.document_id);

        let items = svc.list_punchlist(&doc.document_id).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].severity, PunchlistSeverity::Critical);
        assert_eq!(items[0].identified_by.as_deref(), Some("user-fop_rts"));
    }

    #[test]
    fn non_critical_punchlist_still_advances() {
        let conn = open_memory_database().unwrap();
        let catalog = WorkflowCatalog::default();
        let svc = WorkflowService::new(&conn, &catalog).at(t0());
        let doc = submit(&svc, "PLN power upgrade");

        svc.review(
            &doc.document_id,
            &decide("approve_with_punchlist", stage_id(&conn, &doc.document_id, 1), vec![("Cable tray dusty", "major")]),
            &actor(Role::Roh),
        )
        .unwrap();
        let last = svc
            .review(&doc.document_id, &decide("approve", stage_id(&conn, &doc.document_id, 2), vec![]), &actor(Role::Rth))
            .unwrap();
        assert_eq!(last.transition, Transition::Approved);
        assert_eq!(last.workflow_status, "ATP Document Full Signed (with Punchlist)");
    }

    #[test]
    fn reject_routes_to_rectification() {
        let conn = open_memory_database().unwrap();
        let catalog = WorkflowCatalog::default();
        let svc = WorkflowService::new(&conn, &catalog).at(t0());
        let doc = submit(&svc, "Microwave reroute");

        let out = svc
            .review(&doc.document_id, &decide("reject", stage_id(&conn, &doc.document_id, 1), vec![]), &actor(Role::FopRts))
            .unwrap();
        assert_eq!(out.transition, Transition::Rectification);
        assert_eq!(out.document_status, DocumentStatus::PunchlistRectification);
    }

    #[test]
    fn unrecognized_decision_routes_to_rectification() {
        let conn = open_memory_database().unwrap();
        let catalog = WorkflowCatalog::default();
        let svc = WorkflowService::new(&conn, &catalog).at(t0());
        let doc = submit(&svc, "Microwave reroute");

        let out = svc
            .review(&doc.document_id, &decide("escalate", stage_id(&conn, &doc.document_id, 1), vec![]), &actor(Role::FopRts))
            .unwrap();
        assert_eq!(out.decision, Decision::Unrecognized("escalate".into()));
        assert_eq!(out.transition, Transition::Rectification);
    }

    #[test]
    fn wrong_role_is_unauthorized_and_mutates_nothing() {
        let conn = open_memory_database().unwrap();
        let catalog = WorkflowCatalog::default();
        let svc = WorkflowService::new(&conn, &catalog).at(t0());
        let doc = submit(&svc, "Microwave reroute");
        let stage1 = stage_id(&conn, &doc.document_id, 1);

        let err = svc
            .review(&doc.document_id, &decide("approve", stage1, vec![("x", "critical")]), &actor(Role::Rth))
            .unwrap_err();
        assert!(matches!(err, WorkflowError::Unauthorized { .. }));

        let stage = repository::get_stage(&conn, &stage1).unwrap().unwrap();
        assert_eq!(stage.status, StageStatus::Pending);
        assert_eq!(repository::count_punchlist_for_document(&conn, &doc.document_id).unwrap(), 0);
        assert_eq!(repository::list_stage_events(&conn, &doc.document_id).unwrap().len(), 2);
    }

    #[test]
    fn out_of_order_review_is_rejected() {
        let conn = open_memory_database().unwrap();
        let catalog = WorkflowCatalog::default();
        let svc = WorkflowService::new(&conn, &catalog).at(t0());
        let doc = submit(&svc, "Microwave reroute");
        let stage2 = stage_id(&conn, &doc.document_id, 2);

        let err = svc
            .review(&doc.document_id, &decide("approve", stage2, vec![]), &actor(Role::RegionTeam))
            .unwrap_err();
        assert!(matches!(err, WorkflowError::Conflict(_)));
        let stage = repository::get_stage(&conn, &stage2).unwrap().unwrap();
        assert_eq!(stage.status, StageStatus::Waiting);
        assert_stage_invariant(&conn, &doc.document_id);
    }

    #[test]
    fn replayed_decision_on_completed_stage_conflicts() {
        let conn = open_memory_database().unwrap();
        let catalog = WorkflowCatalog::default();
        let svc = WorkflowService::new(&conn, &catalog).at(t0());
        let doc = submit(&svc, "Microwave reroute");
        let req = decide("approve", stage_id(&conn, &doc.document_id, 1), vec![]);

        svc.review(&doc.document_id, &req, &actor(Role::FopRts)).unwrap();
        let err = svc.review(&doc.document_id, &req, &actor(Role::FopRts)).unwrap_err();
        assert!(matches!(err, WorkflowError::Conflict(_)));
    }

    #[test]
    fn review_validation_errors() {
        let conn = open_memory_database().unwrap();
        let catalog = WorkflowCatalog::default();
        let svc = WorkflowService::new(&conn, &catalog).at(t0());
        let doc = submit(&svc, "Microwave reroute");
        let stage1 = stage_id(&conn, &doc.document_id, 1);

        let empty = svc.review(&doc.document_id, &decide("", stage1, vec![]), &actor(Role::FopRts));
        assert!(matches!(empty, Err(WorkflowError::Validation(_))));

        let bad_severity = svc.review(&doc.document_id, &decide("approve", stage1, vec![("x", "urgent")]), &actor(Role::FopRts));
        assert!(matches!(bad_severity, Err(WorkflowError::Validation(_))));

        let missing_doc = svc.review(&Uuid::new_v4(), &decide("approve", stage1, vec![]), &actor(Role::FopRts));
        assert!(matches!(missing_doc, Err(WorkflowError::NotFound { entity: "Document", .. })));

        let missing_stage = svc.review(&doc.document_id, &decide("approve", Uuid::new_v4(), vec![]), &actor(Role::FopRts));
        assert!(matches!(missing_stage, Err(WorkflowError::NotFound { entity: "ReviewStage", .. })));
    }

    #[test]
    fn rectification_loop_returns_to_same_stage() {
        let conn = open_memory_database().unwrap();
        let catalog = WorkflowCatalog::default();
        let svc = WorkflowService::new(&conn, &catalog).at(t0());
        let doc = submit(&svc, "Microwave reroute");

        svc.review(&doc.document_id, &decide("approve", stage_id(&conn, &doc.document_id, 1), vec![]), &actor(Role::FopRts))
            .unwrap();
        svc.review(
            &doc.document_id,
            &decide("approve_with_punchlist", stage_id(&conn, &doc.document_id, 2), vec![("Grounding failed", "critical")]),
            &actor(Role::RegionTeam),
        )
        .unwrap();

        // Resubmitting with open items is refused.
        let blocked = svc.resubmit(&doc.document_id, &actor(Role::FopRts)).unwrap_err();
        assert!(matches!(blocked, WorkflowError::Conflict(_)));

        let item = svc.list_punchlist(&doc.document_id).unwrap().remove(0);
        let resolution = svc
            .complete_punchlist(&item.id, Some("Re-grounded"), &actor(Role::FopRts))
            .unwrap();
        assert_eq!(resolution.open_remaining, 0);
        let again = svc.complete_punchlist(&item.id, None, &actor(Role::FopRts)).unwrap_err();
        assert!(matches!(again, WorkflowError::Conflict(_)));

        let later = t0() + Duration::hours(72);
        let svc = WorkflowService::new(&conn, &catalog).at(later);
        let out = svc.resubmit(&doc.document_id, &actor(Role::FopRts)).unwrap();
        assert_eq!(out.stage_number, 2);
        assert_eq!(out.stage_code, StageCode::RegionReview);
        assert_eq!(out.sla_deadline, later + Duration::hours(48));
        assert_stage_invariant(&conn, &doc.document_id);

        let status = svc.get_status(&doc.document_id).unwrap();
        assert_eq!(status.document.current_status, DocumentStatus::InReview);
        assert_eq!(status.progress_percentage, 33);
        assert_eq!(status.stages[0].stage.status, StageStatus::Completed);
        assert_eq!(status.stages[1].stage.status, StageStatus::Pending);

        // The reopened stage can be decided again.
        let final_region = svc
            .review(&doc.document_id, &decide("approve", stage_id(&conn, &doc.document_id, 2), vec![]), &actor(Role::RegionTeam))
            .unwrap();
        assert_eq!(final_region.next_stage, "RTH_REVIEW");

        let kinds: Vec<StageEventKind> = repository::list_stage_events(&conn, &doc.document_id)
            .unwrap()
            .into_iter()
            .map(|e| e.kind)
            .collect();
        assert!(kinds.contains(&StageEventKind::RectificationRequired));
        assert!(kinds.contains(&StageEventKind::PunchlistResolved));
        assert!(kinds.contains(&StageEventKind::Resubmitted));
    }

    #[test]
    fn resubmit_requires_rectification_state() {
        let conn = open_memory_database().unwrap();
        let catalog = WorkflowCatalog::default();
        let svc = WorkflowService::new(&conn, &catalog).at(t0());
        let doc = submit(&svc, "Microwave reroute");

        let err = svc.resubmit(&doc.document_id, &actor(Role::FopRts)).unwrap_err();
        assert!(matches!(err, WorkflowError::Conflict(_)));
    }

    #[test]
    fn quick_approve_requires_admin() {
        let conn = open_memory_database().unwrap();
        let catalog = WorkflowCatalog::default();
        let svc = WorkflowService::new(&conn, &catalog).at(t0());
        let doc = submit(&svc, "Microwave reroute");

        let err = svc.quick_approve(&doc.document_id, &actor(Role::Rth)).unwrap_err();
        assert!(matches!(err, WorkflowError::Unauthorized { .. }));

        let out = svc.quick_approve(&doc.document_id, &actor(Role::Admin)).unwrap();
        assert_eq!(out.stages_bypassed, 3);
        assert_eq!(out.final_approver, "user-admin");

        let status = svc.get_status(&doc.document_id).unwrap();
        assert_eq!(status.progress_percentage, 100);
        assert!(status.stages.iter().all(|s| s.stage.status == StageStatus::Completed));
        assert_stage_invariant(&conn, &doc.document_id);

        let events = repository::list_stage_events(&conn, &doc.document_id).unwrap();
        assert_eq!(events.last().map(|e| e.kind), Some(StageEventKind::AdministrativeOverride));

        let twice = svc.quick_approve(&doc.document_id, &actor(Role::Admin)).unwrap_err();
        assert!(matches!(twice, WorkflowError::Conflict(_)));
    }

    #[test]
    fn terminal_document_rejects_reviews() {
        let conn = open_memory_database().unwrap();
        let catalog = WorkflowCatalog::default();
        let svc = WorkflowService::new(&conn, &catalog).at(t0());
        let doc = submit(&svc, "Microwave reroute");
        svc.quick_approve(&doc.document_id, &actor(Role::Admin)).unwrap();

        let err = svc
            .review(&doc.document_id, &decide("approve", stage_id(&conn, &doc.document_id, 1), vec![]), &actor(Role::FopRts))
            .unwrap_err();
        assert!(matches!(err, WorkflowError::Conflict(_)));
    }

    #[test]
    fn pending_reviews_and_overdue_sweep() {
        let conn = open_memory_database().unwrap();
        let catalog = WorkflowCatalog::default();
        let early = WorkflowService::new(&conn, &catalog).at(t0());
        let old = submit(&early, "Microwave reroute");
        let late = WorkflowService::new(&conn, &catalog).at(t0() + Duration::hours(10));
        let fresh = submit(&late, "Microwave new link");

        // 45h after t0: the first document has 3h left, the second 13h.
        let svc = WorkflowService::new(&conn, &catalog).at(t0() + Duration::hours(45));
        let pending = svc.pending_reviews(Role::FopRts).unwrap();
        assert_eq!(pending.reviews.len(), 2);
        assert_eq!(pending.reviews[0].document_id, old.document_id);
        assert_eq!(pending.reviews[0].sla_status, SlaStatus::Urgent);
        assert_eq!(pending.reviews[0].hours_remaining, Some(3));
        assert_eq!(pending.reviews[1].document_id, fresh.document_id);
        assert_eq!(pending.reviews[1].sla_status, SlaStatus::Normal);
        assert_eq!(pending.urgent_count, 1);
        assert_eq!(pending.overdue_count, 0);
        assert!(svc.pending_reviews(Role::Rth).unwrap().reviews.is_empty());

        let svc = WorkflowService::new(&conn, &catalog).at(t0() + Duration::hours(50));
        let overdue = svc.overdue_stages().unwrap();
        assert_eq!(overdue.len(), 1);
        assert_eq!(overdue[0].document_id, old.document_id);
        assert_eq!(overdue[0].hours_remaining, Some(0));
    }

    #[test]
    fn advancing_into_a_non_waiting_stage_conflicts_and_rolls_back() {
        let conn = open_memory_database().unwrap();
        let catalog = WorkflowCatalog::default();
        let svc = WorkflowService::new(&conn, &catalog).at(t0());
        let doc = submit(&svc, "Microwave reroute");
        let stage1 = stage_id(&conn, &doc.document_id, 1);
        let stage2 = stage_id(&conn, &doc.document_id, 2);
        assert!(repository::activate_stage(&conn, &stage2, t0() + Duration::hours(48)).unwrap());

        let err = svc
            .review(&doc.document_id, &decide("approve", stage1, vec![("x", "minor")]), &actor(Role::FopRts))
            .unwrap_err();
        assert!(matches!(err, WorkflowError::Conflict(_)));

        let stage = repository::get_stage(&conn, &stage1).unwrap().unwrap();
        assert_eq!(stage.status, StageStatus::Pending);
        assert!(stage.decision.is_none());
        assert_eq!(repository::count_punchlist_for_document(&conn, &doc.document_id).unwrap(), 0);
        assert_eq!(repository::list_stage_events(&conn, &doc.document_id).unwrap().len(), 2);
    }

    #[test]
    fn review_stats_count_decisions_by_window() {
        let conn = open_memory_database().unwrap();
        let catalog = WorkflowCatalog::default();
        let svc = WorkflowService::new(&conn, &catalog).at(t0());
        let approved = submit(&svc, "Microwave reroute");
        let rejected = submit(&svc, "Microwave new link");

        let later = WorkflowService::new(&conn, &catalog).at(t0() + Duration::hours(1));
        later
            .review(&approved.document_id, &decide("approve", stage_id(&conn, &approved.document_id, 1), vec![]), &actor(Role::FopRts))
            .unwrap();
        later
            .review(&rejected.document_id, &decide("reject", stage_id(&conn, &rejected.document_id, 1), vec![]), &actor(Role::FopRts))
            .unwrap();

        let svc = WorkflowService::new(&conn, &catalog).at(t0() + Duration::hours(2));
        let stats = svc.review_stats(None, None).unwrap();
        assert_eq!(stats.total_reviews, 2);
        assert_eq!(stats.pending_reviews, 1);
        assert_eq!(stats.completed_today, 2);
        assert_eq!(stats.approved_this_week, 1);
        assert_eq!(stats.rejected_this_week, 1);
        assert_eq!(stats.overdue_reviews, 0);
        assert_eq!(stats.approval_rate, 50);

        let fop = svc.review_stats(Some(Role::FopRts), None).unwrap();
        assert_eq!(fop.total_reviews, 2);
        assert_eq!(fop.pending_reviews, 0);

        let stranger = svc.review_stats(None, Some("nobody")).unwrap();
        assert_eq!(stranger.total_reviews, 0);
        assert_eq!(stranger.approval_rate, 0);
        assert_eq!(stranger.reviewer_id.as_deref(), Some("nobody"));

        // Three days on: nothing decided today and the open stage is past its deadline.
        let svc = WorkflowService::new(&conn, &catalog).at(t0() + Duration::hours(72));
        let stats = svc.review_stats(None, None).unwrap();
        assert_eq!(stats.completed_today, 0);
        assert_eq!(stats.approved_this_week, 1);
        assert_eq!(stats.overdue_reviews, 1);

        let svc = WorkflowService::new(&conn, &catalog).at(t0() + Duration::days(8));
        let stats = svc.review_stats(None, None).unwrap();
        assert_eq!(stats.total_reviews, 2);
        assert_eq!(stats.approved_this_week + stats.rejected_this_week, 0);
        assert_eq!(stats.approval_rate, 0);
    }

    #[test]
    fn approval_rate_rounds_to_whole_percent() {
        assert_eq!(approval_rate(0, 0), 0);
        assert_eq!(approval_rate(2, 1), 67);
        assert_eq!(approval_rate(1, 2), 33);
        assert_eq!(approval_rate(3, 0), 100);
    }

    #[test]
    fn status_reports_sla_for_pending_stage_only() {
        let conn = open_memory_database().unwrap();
        let catalog = WorkflowCatalog::default();
        let svc = WorkflowService::new(&conn, &catalog).at(t0());
        let doc = submit(&svc, "Microwave reroute");

        let status = svc.get_status(&doc.document_id).unwrap();
        assert_eq!(status.stages.len(), 3);
        assert_eq!(status.stages[0].sla_status, Some(SlaStatus::Normal));
        assert_eq!(status.stages[0].hours_remaining, Some(48));
        assert!(status.stages[1].sla_status.is_none());
        assert_eq!(status.open_punchlist_count, 0);
        assert_eq!(status.workflow_status, "Pending FOP_RTS Review");

        assert!(matches!(
            svc.get_status(&Uuid::new_v4()),
            Err(WorkflowError::NotFound { .. })
        ));
    }
}
