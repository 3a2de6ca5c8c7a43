//! SLA deadline computation.
//!
//! Deadlines are advisory: they are stamped when a stage becomes pending and
//! read by whoever sweeps for overdue work. Nothing here enforces them.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use super::catalog::WorkflowCatalog;
use crate::models::enums::Role;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SlaStatus {
    Normal,
    Urgent,
    Overdue,
}

pub fn deadline(catalog: &WorkflowCatalog, role: Role, activated_at: DateTime<Utc>) -> DateTime<Utc> {
    activated_at + Duration::hours(catalog.sla_hours(role))
}

pub fn sla_status(deadline: DateTime<Utc>, now: DateTime<Utc>, urgent_window: Duration) -> SlaStatus {
    if now > deadline {
        SlaStatus::Overdue
    } else if deadline - now < urgent_window {
        SlaStatus::Urgent
    } else {
        SlaStatus::Normal
    }
}

/// Whole hours left before the deadline, never negative.
pub fn hours_remaining(deadline: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (deadline - now).num_hours().max(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 8, 0, 0).unwrap()
    }

    #[test]
    fn deadline_uses_role_hours() {
        let catalog = WorkflowCatalog::default();
        assert_eq!(deadline(&catalog, Role::HeadNoc, t0()), t0() + Duration::hours(24));
        assert_eq!(deadline(&catalog, Role::FopRts, t0()), t0() + Duration::hours(48));
        assert_eq!(deadline(&catalog, Role::Admin, t0()), t0() + Duration::hours(48));
    }

    #[test]
    fn status_thresholds() {
        let window = Duration::hours(6);
        let due = t0() + Duration::hours(24);
        assert_eq!(sla_status(due, t0(), window), SlaStatus::Normal);
        assert_eq!(sla_status(due, due - Duration::hours(5), window), SlaStatus::Urgent);
        assert_eq!(sla_status(due, due, window), SlaStatus::Urgent);
        assert_eq!(sla_status(due, due + Duration::minutes(1), window), SlaStatus::Overdue);
    }

    #[test]
    fn hours_remaining_floors_at_zero() {
        let due = t0() + Duration::hours(10);
        assert_eq!(hours_remaining(due, t0()), 10);
        assert_eq!(hours_remaining(due, due + Duration::hours(3)), 0);
    }
}
