use std::path::PathBuf;
use std::time::Duration;

use super::schema::{AppConfig, PartialConfig};
use crate::engine::{DEFAULT_BUFFER_CAPACITY, default_launch_specs};

impl PartialConfig {
    /// Merge self with a lower-priority fallback.
    /// Self's non-None values take precedence.
    /// For agents: merged per kind (a layer overriding `agents.claude`
    /// still inherits `agents.gemini` from lower layers).
    pub fn with_fallback(self, fallback: PartialConfig) -> PartialConfig {
        let agents = match (self.agents, fallback.agents) {
            (Some(mut high), Some(low)) => {
                for (kind, spec) in low {
                    high.entry(kind).or_insert(spec);
                }
                Some(high)
            }
            (high, low) => high.or(low),
        };

        PartialConfig {
            tier: self.tier.or(fallback.tier),
            workspace: self.workspace.or(fallback.workspace),
            buffer_capacity: self.buffer_capacity.or(fallback.buffer_capacity),
            kill_grace_ms: self.kill_grace_ms.or(fallback.kill_grace_ms),
            drain_grace_ms: self.drain_grace_ms.or(fallback.drain_grace_ms),
            agents,
        }
    }

    /// Convert to AppConfig, filling any remaining gaps with defaults.
    pub fn finalize(self) -> AppConfig {
        let mut agents = default_launch_specs();
        if let Some(overrides) = self.agents {
            for (kind, spec) in overrides {
                agents.insert(kind, spec);
            }
        }

        AppConfig {
            tier: self.tier.unwrap_or(crate::engine::Tier::Free),
            workspace: self.workspace.unwrap_or_else(|| PathBuf::from(".")),
            buffer_capacity: self.buffer_capacity.unwrap_or(DEFAULT_BUFFER_CAPACITY),
            kill_grace: Duration::from_millis(self.kill_grace_ms.unwrap_or(2_000)),
            drain_grace: Duration::from_millis(self.drain_grace_ms.unwrap_or(1_500)),
            agents,
        }
    }
}
