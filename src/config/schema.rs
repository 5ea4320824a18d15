use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::engine::{AgentKind, LaunchSpec, Tier};

/// The TOML file structure for conductor.toml.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFile {
    pub general: Option<GeneralConfig>,
    pub engine: Option<EngineConfig>,
    /// Per-kind launch overrides, keyed by kind name ("claude", "gemini").
    pub agents: Option<HashMap<String, AgentEntry>>,
}

#[derive(Debug, Deserialize)]
pub struct GeneralConfig {
    /// Subscription tier: "free" (2 agents), "pro" (5), "unlimited".
    pub tier: Option<String>,
    /// Working directory the wrapped CLIs are launched in.
    pub workspace: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct EngineConfig {
    /// Retained output lines per agent.
    pub buffer_capacity: Option<usize>,
    /// How long kill waits after SIGTERM before escalating to SIGKILL.
    pub kill_grace_ms: Option<u64>,
    /// How long a killed agent may keep draining output before its roster
    /// entry is removed.
    pub drain_grace_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AgentEntry {
    pub binary: Option<String>,
    pub args: Option<Vec<String>>,
    /// Env vars forwarded to the wrapped CLI (its auth state lives there).
    /// Empty/omitted means the child inherits the full environment.
    pub env_passthrough: Option<Vec<String>>,
}

/// Fully-resolved runtime configuration. All fields have values.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub tier: Tier,
    pub workspace: PathBuf,
    pub buffer_capacity: usize,
    pub kill_grace: Duration,
    pub drain_grace: Duration,
    pub agents: HashMap<AgentKind, LaunchSpec>,
}

/// Partial config used during merge. All fields are Option so that
/// missing fields don't override lower-priority values.
#[derive(Debug, Clone, Default)]
pub struct PartialConfig {
    pub tier: Option<Tier>,
    pub workspace: Option<PathBuf>,
    pub buffer_capacity: Option<usize>,
    pub kill_grace_ms: Option<u64>,
    pub drain_grace_ms: Option<u64>,
    pub agents: Option<HashMap<AgentKind, LaunchSpec>>,
}
