//! Session recorder: point-in-time snapshots of engine state for export.
//!
//! The recorder is a passive observer. `snapshot` copies the roster and the
//! command counter under the engine's brief internal locks and releases
//! them immediately -- it holds no exclusive resources of its own. Export
//! is the serialization of one snapshot to pretty JSON; there is no retry
//! logic here beyond surfacing [`ExportError::SnapshotUnavailable`] when
//! the engine is mid-teardown.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::engine::{AgentRecord, Engine};
use crate::error::ExportError;

/// A point-in-time, read-only copy of engine state. Never mutated after
/// creation; consumed only for export.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    /// Stable id of the orchestration session.
    pub session_id: String,
    /// When the engine was constructed.
    pub started_at: DateTime<Utc>,
    /// When this snapshot was taken.
    pub sampled_at: DateTime<Utc>,
    /// Seconds between `started_at` and `sampled_at`.
    pub duration_secs: f64,
    /// Every agent on the roster at sampling time. Each id here belonged to
    /// an agent that existed during the observation window.
    pub roster: Vec<AgentRecord>,
    /// Commands delivered across the session (sends + broadcast deliveries).
    pub total_commands: u64,
}

/// Passive observer that samples engine state on demand.
pub struct SessionRecorder {
    engine: Engine,
}

impl SessionRecorder {
    pub fn new(engine: Engine) -> Self {
        Self { engine }
    }

    /// Take a consistent snapshot of the current engine state.
    ///
    /// Transiently unavailable while the engine is tearing down; callers
    /// may retry.
    pub fn snapshot(&self) -> Result<SessionSnapshot, ExportError> {
        if self.engine.is_shutting_down() {
            return Err(ExportError::SnapshotUnavailable);
        }

        let started_at = self.engine.started_at();
        let sampled_at = Utc::now();
        Ok(SessionSnapshot {
            session_id: self.engine.session_id().to_string(),
            started_at,
            sampled_at,
            duration_secs: (sampled_at - started_at).num_milliseconds() as f64 / 1_000.0,
            roster: self.engine.roster(),
            total_commands: self.engine.total_commands(),
        })
    }

    /// Serialize a fresh snapshot as a pretty JSON document.
    pub fn export_json(&self) -> Result<String, ExportError> {
        Ok(serde_json::to_string_pretty(&self.snapshot()?)?)
    }

    /// Write a fresh snapshot to `path` as JSON.
    pub async fn export_to_file(&self, path: &Path) -> Result<(), ExportError> {
        let json = self.export_json()?;
        tokio::fs::write(path, json).await?;
        tracing::info!("Session snapshot exported to {}", path.display());
        Ok(())
    }
}
