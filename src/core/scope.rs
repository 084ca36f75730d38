//! Visibility scope for data nodes and tasks.

use serde::{Deserialize, Serialize};

/// How widely an entity is shared between scenario instances.
///
/// The ordering matters: a broader scope compares greater, so
/// `Scope::Scenario < Scope::Cycle < Scope::Global`. A task inherits the
/// broadest scope compatible with its data nodes, which is the *minimum*
/// of their scopes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    /// One instance per scenario.
    Scenario,
    /// Shared by every scenario of the same cycle.
    Cycle,
    /// Shared by all scenarios of all cycles.
    Global,
}

impl Default for Scope {
    fn default() -> Self {
        Self::Scenario
    }
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Scope::Scenario => write!(f, "scenario"),
            Scope::Cycle => write!(f, "cycle"),
            Scope::Global => write!(f, "global"),
        }
    }
}
