//! Entity components the engine can synchronize

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A synchronizable entity type
///
/// Each component has its own Fetcher/Parser pair; a run's component filter
/// selects which pairs participate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncComponent {
    Hearings,
    Committees,
}

impl SyncComponent {
    /// All components, in apply order
    ///
    /// Committees sync before hearings so hearing-to-committee links resolve
    /// against fresh committee rows where possible.
    pub fn all() -> Vec<SyncComponent> {
        vec![SyncComponent::Committees, SyncComponent::Hearings]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SyncComponent::Hearings => "hearings",
            SyncComponent::Committees => "committees",
        }
    }
}

impl fmt::Display for SyncComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncComponent {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "hearings" => Ok(SyncComponent::Hearings),
            "committees" => Ok(SyncComponent::Committees),
            other => Err(format!("unknown sync component: {}", other)),
        }
    }
}
