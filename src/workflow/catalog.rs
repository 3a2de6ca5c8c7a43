//! Immutable workflow configuration snapshot.
//!
//! Built once at startup and shared behind an `Arc`. A new snapshot replaces
//! the old one as a whole; nothing mutates a published catalog.

use std::collections::HashMap;

use chrono::Duration;

use crate::models::enums::Role;

/// SLA hours for roles missing from the table.
pub const DEFAULT_SLA_HOURS: i64 = 48;
/// Caller hints only override classifications below this confidence.
pub const DEFAULT_HINT_OVERRIDE_THRESHOLD: f64 = 0.6;
/// Pending stages with less time than this left are reported as urgent.
pub const DEFAULT_URGENT_WINDOW_HOURS: i64 = 6;

#[derive(Debug, Clone)]
pub struct WorkflowCatalog {
    sla_hours: HashMap<Role, i64>,
    default_sla_hours: i64,
    hint_override_threshold: f64,
    admin_roles: Vec<Role>,
    urgent_window_hours: i64,
}

impl Default for WorkflowCatalog {
    fn default() -> Self {
        let sla_hours = HashMap::from([
            (Role::Bo, 48),
            (Role::Sme, 48),
            (Role::HeadNoc, 24),
            (Role::FopRts, 48),
            (Role::RegionTeam, 48),
            (Role::Rth, 24),
            (Role::Roh, 48),
            (Role::Pmo, 48),
        ]);
        Self {
            sla_hours,
            default_sla_hours: DEFAULT_SLA_HOURS,
            hint_override_threshold: DEFAULT_HINT_OVERRIDE_THRESHOLD,
            admin_roles: vec![Role::Admin],
            urgent_window_hours: DEFAULT_URGENT_WINDOW_HOURS,
        }
    }
}

impl WorkflowCatalog {
    pub fn with_sla_hours(mut self, role: Role, hours: i64) -> Self {
        self.sla_hours.insert(role, hours);
        self
    }

    pub fn with_hint_override_threshold(mut self, threshold: f64) -> Self {
        self.hint_override_threshold = threshold;
        self
    }

    pub fn with_urgent_window_hours(mut self, hours: i64) -> Self {
        self.urgent_window_hours = hours;
        self
    }

    pub fn sla_hours(&self, role: Role) -> i64 {
        self.sla_hours
            .get(&role)
            .copied()
            .unwrap_or(self.default_sla_hours)
    }

    pub fn hint_override_threshold(&self) -> f64 {
        self.hint_override_threshold
    }

    pub fn is_admin(&self, role: Role) -> bool {
        self.admin_roles.contains(&role)
    }

    pub fn urgent_window(&self) -> Duration {
        Duration::hours(self.urgent_window_hours)
    }
}
