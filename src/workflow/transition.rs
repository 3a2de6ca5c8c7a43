//! Pure stage transition rules.

use serde::Serialize;

use crate::models::enums::{Decision, DocumentStatus, PunchlistSeverity, Role};

pub const LABEL_FULL_SIGNED: &str = "ATP Document Full Signed";
pub const LABEL_FULL_SIGNED_WITH_PUNCHLIST: &str = "ATP Document Full Signed (with Punchlist)";
pub const LABEL_RECTIFICATION: &str = "Returns to Clear Punchlist (Mandatory Site Rectification)";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Transition {
    /// Activate the next stage in path order.
    Advance,
    Approved,
    Rectification,
}

/// Decide what follows a completed stage.
///
/// Critical severity blocks regardless of the decision. Otherwise an approval
/// advances (or approves on the last stage) and anything else blocks.
pub fn next_transition(
    decision: &Decision,
    severity: PunchlistSeverity,
    has_next_stage: bool,
) -> Transition {
    if severity == PunchlistSeverity::Critical {
        return Transition::Rectification;
    }
    match (decision.is_approval(), has_next_stage) {
        (true, true) => Transition::Advance,
        (true, false) => Transition::Approved,
        (false, _) => Transition::Rectification,
    }
}

/// Human-readable workflow status.
pub fn workflow_status_label(
    status: DocumentStatus,
    pending_role: Option<Role>,
    has_punchlist: bool,
) -> String {
    match status {
        DocumentStatus::Approved if has_punchlist => LABEL_FULL_SIGNED_WITH_PUNCHLIST.to_string(),
        DocumentStatus::Approved => LABEL_FULL_SIGNED.to_string(),
        DocumentStatus::PunchlistRectification => LABEL_RECTIFICATION.to_string(),
        DocumentStatus::InReview => match pending_role {
            Some(role) => format!("Pending {role} Review"),
            None => "Pending Review".to_string(),
        },
    }
}
