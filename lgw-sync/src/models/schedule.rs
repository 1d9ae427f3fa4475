//! Recurring schedule definitions
//!
//! Created and edited by an operator (rows in the `schedules` table); the
//! engine only reads them and writes back run-linkage timestamps.

use super::SyncComponent;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lookback window bounds in days
pub const MIN_LOOKBACK_DAYS: u32 = 1;
pub const MAX_LOOKBACK_DAYS: u32 = 90;

/// A recurring synchronization schedule
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleDefinition {
    pub schedule_id: Uuid,
    pub name: String,
    /// Standard 5-field cron expression, local to the service host
    pub cron: String,
    pub lookback_days: u32,
    /// Components this schedule synchronizes; empty means all
    pub components: Vec<SyncComponent>,
    pub active: bool,
    pub deployed: bool,
    pub last_run_at: Option<DateTime<Utc>>,
    pub next_run_at: Option<DateTime<Utc>>,
    pub last_run_id: Option<Uuid>,
}

impl ScheduleDefinition {
    /// Effective component filter (empty list means all components)
    pub fn effective_components(&self) -> Vec<SyncComponent> {
        if self.components.is_empty() {
            SyncComponent::all()
        } else {
            self.components.clone()
        }
    }

    /// Clamp a stored lookback window into the supported bounds
    pub fn clamped_lookback_days(&self) -> u32 {
        self.lookback_days.clamp(MIN_LOOKBACK_DAYS, MAX_LOOKBACK_DAYS)
    }

    /// Whether the scheduler adapter should register this schedule
    pub fn is_runnable(&self) -> bool {
        self.active && self.deployed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schedule(lookback: u32) -> ScheduleDefinition {
        ScheduleDefinition {
            schedule_id: Uuid::new_v4(),
            name: "nightly".to_string(),
            cron: "0 6 * * *".to_string(),
            lookback_days: lookback,
            components: vec![],
            active: true,
            deployed: true,
            last_run_at: None,
            next_run_at: None,
            last_run_id: None,
        }
    }

    #[test]
    fn empty_component_filter_means_all() {
        assert_eq!(schedule(7).effective_components(), SyncComponent::all());
    }

    #[test]
    fn lookback_is_clamped_to_bounds() {
        assert_eq!(schedule(0).clamped_lookback_days(), MIN_LOOKBACK_DAYS);
        assert_eq!(schedule(365).clamped_lookback_days(), MAX_LOOKBACK_DAYS);
        assert_eq!(schedule(14).clamped_lookback_days(), 14);
    }

    #[test]
    fn inactive_or_undeployed_schedules_do_not_run() {
        let mut s = schedule(7);
        s.active = false;
        assert!(!s.is_runnable());
        s.active = true;
        s.deployed = false;
        assert!(!s.is_runnable());
    }
}
