//! Type definitions for the agent orchestration engine.
//!
//! These types form the shared vocabulary between the [`super::Engine`],
//! the per-agent handles, the session recorder, and the strategy router.
//! Record and outcome types derive [`serde::Serialize`] for session exports.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, EngineError};

/// Unique identifier for a managed agent.
///
/// Uses UUID v4 strings for collision-free IDs that are readable in logs and
/// exported sessions. Never reused: a killed agent's ID stays retired.
pub type AgentId = String;

/// Which wrapped CLI an agent runs. Fixed at spawn, immutable thereafter.
///
/// The kind resolves to a [`LaunchSpec`] via configuration; it also carries a
/// display color band for the presentation layer (orchestration ignores it).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentKind {
    Claude,
    Gemini,
}

impl AgentKind {
    /// ANSI color band used by the presentation layer to tag this kind's
    /// output stream. Not consulted anywhere in the engine.
    pub fn color_band(&self) -> &'static str {
        match self {
            AgentKind::Claude => "magenta",
            AgentKind::Gemini => "cyan",
        }
    }
}

impl fmt::Display for AgentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgentKind::Claude => write!(f, "claude"),
            AgentKind::Gemini => write!(f, "gemini"),
        }
    }
}

impl FromStr for AgentKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "claude" => Ok(AgentKind::Claude),
            "gemini" => Ok(AgentKind::Gemini),
            other => Err(ConfigError::UnknownAgentKind(other.to_string())),
        }
    }
}

/// Lifecycle status of a managed agent.
///
/// Transitions are monotonic: `Starting -> Running -> {Exited|Killed|Failed}`.
/// The three terminal states absorb; no transition ever departs from them.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "detail")]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    /// Process launch requested, liveness not yet confirmed.
    Starting,
    /// Process confirmed alive and accepting input.
    Running,
    /// Process exited on its own with the given exit code.
    Exited(i32),
    /// Explicitly terminated via kill_agent/kill_all.
    Killed,
    /// Abnormal termination (signal, crash, broken PTY).
    Failed(String),
}

impl AgentStatus {
    /// Terminal states absorb; nothing transitions out of them.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AgentStatus::Exited(_) | AgentStatus::Killed | AgentStatus::Failed(_)
        )
    }

    /// Active states count against the subscription tier cap.
    pub fn is_active(&self) -> bool {
        matches!(self, AgentStatus::Starting | AgentStatus::Running)
    }
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgentStatus::Starting => write!(f, "starting"),
            AgentStatus::Running => write!(f, "running"),
            AgentStatus::Exited(code) => write!(f, "exited({code})"),
            AgentStatus::Killed => write!(f, "killed"),
            AgentStatus::Failed(reason) => write!(f, "failed: {reason}"),
        }
    }
}

/// Read-only view of one roster entry, returned by status queries and
/// embedded in session snapshots.
///
/// This is a snapshot -- the live entry may change after this clone is
/// returned. Cheap to clone since all fields are small strings/enums.
#[derive(Clone, Debug, Serialize)]
pub struct AgentRecord {
    /// Unique identifier (UUID v4 string).
    pub id: AgentId,
    /// Which wrapped CLI this agent runs.
    pub kind: AgentKind,
    /// Current lifecycle status.
    pub status: AgentStatus,
    /// When the agent process was spawned.
    pub spawned_at: DateTime<Utc>,
    /// Last time the agent produced output or accepted a command.
    pub last_activity: DateTime<Utc>,
    /// Commands delivered to this agent (targeted sends + broadcasts).
    pub commands_sent: u64,
}

/// Subscription tier, enforced as the engine-level concurrency cap.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Free,
    Pro,
    Unlimited,
}

impl Tier {
    /// Maximum number of agents in {Starting, Running} this tier permits.
    /// `None` means unbounded.
    pub fn cap(&self) -> Option<usize> {
        match self {
            Tier::Free => Some(2),
            Tier::Pro => Some(5),
            Tier::Unlimited => None,
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tier::Free => write!(f, "free"),
            Tier::Pro => write!(f, "pro"),
            Tier::Unlimited => write!(f, "unlimited"),
        }
    }
}

impl FromStr for Tier {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "free" => Ok(Tier::Free),
            "pro" => Ok(Tier::Pro),
            "unlimited" | "max" => Ok(Tier::Unlimited),
            other => Err(ConfigError::UnknownTier(other.to_string())),
        }
    }
}

/// How to launch one agent kind: the external binary, its arguments, and
/// which environment variables pass through to it.
///
/// Resolution of a kind to an executable is configuration, not hardcoded.
/// The wrapped CLIs manage their own credential state; the passthrough list
/// only controls which variables they inherit.
#[derive(Clone, Debug)]
pub struct LaunchSpec {
    /// Binary name (resolved against PATH) or absolute path.
    pub binary: String,
    /// Arguments passed on launch.
    pub args: Vec<String>,
    /// Environment variables forwarded to the child. Empty means "inherit
    /// the full parent environment"; non-empty means only these names (plus
    /// PATH/HOME/TERM, which a PTY child always needs) are forwarded.
    pub env_passthrough: Vec<String>,
}

/// Default kind -> launch-spec table. Overridable per kind in config.
pub fn default_launch_specs() -> HashMap<AgentKind, LaunchSpec> {
    let mut specs = HashMap::new();
    specs.insert(
        AgentKind::Claude,
        LaunchSpec {
            binary: "claude".to_string(),
            args: Vec::new(),
            env_passthrough: Vec::new(),
        },
    );
    specs.insert(
        AgentKind::Gemini,
        LaunchSpec {
            binary: "gemini".to_string(),
            args: Vec::new(),
            env_passthrough: Vec::new(),
        },
    );
    specs
}

/// Per-target delivery outcome of a broadcast fan-out.
///
/// Broadcast is best-effort: one dead agent never aborts the fan-out, it
/// just shows up here with an error.
#[derive(Debug)]
pub struct BroadcastOutcome {
    pub agent_id: AgentId,
    pub result: Result<(), EngineError>,
}

impl BroadcastOutcome {
    pub fn ok(&self) -> bool {
        self.result.is_ok()
    }
}
