//! Records served by the scenario/agent lookup service.

use serde::{Deserialize, Serialize};

/// A scenario (environment profile) a simulation can run in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scenario {
    /// Short human-readable key.
    pub codename: String,
    /// Primary key sent as `env_id` in `START_SIM`.
    pub pk: String,
    /// Full scenario text.
    pub scenario: String,
}

impl Scenario {
    /// First sentence of the scenario text, for compact listings.
    pub fn summary(&self) -> &str {
        let text = self.scenario.trim();
        match text.find(". ") {
            Some(end) => &text[..=end],
            None => text,
        }
    }
}

/// An agent profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentProfile {
    pub first_name: String,
    pub last_name: String,
    pub pk: String,
}

impl AgentProfile {
    /// Display name, also used as the agent's role in conversation history.
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}
