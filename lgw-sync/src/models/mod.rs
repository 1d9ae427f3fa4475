//! Data model for the synchronization engine

pub mod change;
pub mod component;
pub mod record;
pub mod run;
pub mod schedule;
pub mod validation;

pub use change::{Change, ChangeKind};
pub use component::SyncComponent;
pub use record::{CanonicalRecord, CommitteeRecord, DocumentRecord, HearingRecord, WitnessRecord};
pub use run::{RunMetrics, RunStatus, SyncRun, TriggerSource};
pub use schedule::ScheduleDefinition;
pub use validation::{Severity, ValidationIssue, ValidationReport};
