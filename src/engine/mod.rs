//! Agent orchestration engine: roster, routing, tier policy.
//!
//! [`Engine`] is the single source of truth for all spawned agents. It owns
//! the roster (agent id -> handle, plus insertion order) behind one mutex
//! whose critical sections are brief map operations only -- slow work such
//! as process launch and kill/teardown waits always happens outside the
//! lock, so operations on different agents never block each other.
//!
//! **Concurrency model:** `Mutex<HashMap>` with an insertion-order index is
//! chosen over `DashMap` to avoid an extra dependency. Contention is
//! negligible -- the roster is touched briefly (lookup, insert, remove) by a
//! handful of callers, while all per-agent I/O runs on the agents' own tasks.
//!
//! **Cancellation model:** Each agent's token is a child of the engine's
//! root token. Cancelling the root cascades shutdown to every agent.

pub mod buffer;
mod handle;
pub mod types;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

pub use buffer::{OutputBuffer, DEFAULT_BUFFER_CAPACITY};
pub use types::{
    AgentId, AgentKind, AgentRecord, AgentStatus, BroadcastOutcome, LaunchSpec, Tier,
    default_launch_specs,
};

use crate::config::AppConfig;
use crate::error::{EngineError, SpawnError};
use handle::{AgentHandle, SpawnContext};

/// Per-agent wait bound during full engine shutdown.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Roster state: id -> handle plus deterministic insertion order.
///
/// `reserved` counts spawn slots claimed while a process launch is in
/// flight outside the lock, so concurrent spawns cannot overshoot the tier
/// cap.
struct Roster {
    entries: HashMap<AgentId, Arc<AgentHandle>>,
    order: Vec<AgentId>,
    reserved: usize,
}

impl Roster {
    fn new() -> Self {
        Self {
            entries: HashMap::new(),
            order: Vec::new(),
            reserved: 0,
        }
    }

    /// Agents currently counting against the tier cap (Starting/Running).
    fn active_count(&self) -> usize {
        self.entries
            .values()
            .filter(|h| h.status().is_active())
            .count()
    }

    fn insert(&mut self, handle: Arc<AgentHandle>) {
        let id = handle.id().clone();
        self.order.push(id.clone());
        self.entries.insert(id, handle);
    }

    fn remove(&mut self, id: &str) {
        if self.entries.remove(id).is_some() {
            self.order.retain(|entry| entry != id);
        }
    }

    /// Handles in insertion order (first spawned, first listed). This is
    /// the deterministic fan-out order for broadcast and roster views.
    fn handles_in_order(&self) -> Vec<Arc<AgentHandle>> {
        self.order
            .iter()
            .filter_map(|id| self.entries.get(id).cloned())
            .collect()
    }
}

struct EngineInner {
    roster: Mutex<Roster>,
    tier: Tier,
    launch_specs: HashMap<AgentKind, LaunchSpec>,
    workspace: PathBuf,
    buffer_capacity: usize,
    kill_grace: Duration,
    drain_grace: Duration,
    total_commands: AtomicU64,
    session_id: String,
    started_at: DateTime<Utc>,
    root_cancel: CancellationToken,
}

impl Drop for EngineInner {
    fn drop(&mut self) {
        // Cascades to every agent's I/O task, which terminates its process
        // group. No wrapped process outlives the engine.
        self.root_cancel.cancel();
    }
}

/// The agent orchestration engine.
///
/// Cheap to clone (all state behind one `Arc`); pass clones to the strategy
/// router, the session recorder, and the presentation layer.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

impl Engine {
    /// Build an engine from the resolved application configuration.
    pub fn new(config: &AppConfig) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                roster: Mutex::new(Roster::new()),
                tier: config.tier,
                launch_specs: config.agents.clone(),
                workspace: config.workspace.clone(),
                buffer_capacity: config.buffer_capacity,
                kill_grace: config.kill_grace,
                drain_grace: config.drain_grace,
                total_commands: AtomicU64::new(0),
                session_id: Uuid::new_v4().to_string(),
                started_at: Utc::now(),
                root_cancel: CancellationToken::new(),
            }),
        }
    }

    /// Spawn a new agent of the given kind.
    ///
    /// Rejects with [`SpawnError::TierLimitExceeded`] when the number of
    /// agents in {Starting, Running} has reached the subscription tier's
    /// cap. A failed launch leaves no trace in the roster.
    pub async fn spawn_agent(&self, kind: AgentKind) -> Result<AgentId, SpawnError> {
        if self.inner.root_cancel.is_cancelled() {
            return Err(SpawnError::ResourceExhausted(
                "engine is shutting down".to_string(),
            ));
        }

        let spec = self
            .inner
            .launch_specs
            .get(&kind)
            .cloned()
            .ok_or_else(|| SpawnError::BinaryNotFound {
                binary: kind.to_string(),
            })?;

        // Reserve a slot under the lock; the slow process launch happens
        // outside it so spawning never blocks operations on other agents.
        {
            let mut roster = self.inner.roster.lock().unwrap();
            if let Some(cap) = self.inner.tier.cap() {
                if roster.active_count() + roster.reserved >= cap {
                    tracing::warn!("Spawn of {kind} rejected: tier cap {cap} reached");
                    return Err(SpawnError::TierLimitExceeded { cap });
                }
            }
            roster.reserved += 1;
        }

        let ctx = SpawnContext {
            workspace: self.inner.workspace.clone(),
            buffer_capacity: self.inner.buffer_capacity,
            kill_grace: self.inner.kill_grace,
            cancel: self.inner.root_cancel.child_token(),
        };
        let result = AgentHandle::spawn(kind, &spec, ctx).await;

        let mut roster = self.inner.roster.lock().unwrap();
        roster.reserved -= 1;
        match result {
            Ok(handle) => {
                let id = handle.id().clone();
                roster.insert(handle);
                tracing::info!("Agent {id} registered ({kind}, tier {})", self.inner.tier);
                Ok(id)
            }
            Err(e) => Err(e),
        }
    }

    /// Deliver raw command bytes to one agent's input.
    pub async fn send(&self, id: &str, payload: &[u8]) -> Result<(), EngineError> {
        let handle = self.lookup(id)?;
        handle.write(payload).await?;
        self.inner.total_commands.fetch_add(1, Ordering::Relaxed);
        tracing::debug!("Sent {} bytes to agent {id}", payload.len());
        Ok(())
    }

    /// Best-effort fan-out of one payload to every agent, in insertion
    /// order. One dead agent never aborts the broadcast; its failure is
    /// reported in the outcome list instead.
    pub async fn broadcast(&self, payload: &[u8]) -> Vec<BroadcastOutcome> {
        let handles = {
            let roster = self.inner.roster.lock().unwrap();
            roster.handles_in_order()
        };

        let mut outcomes = Vec::with_capacity(handles.len());
        for handle in handles {
            let result = handle.write(payload).await;
            match &result {
                Ok(()) => {
                    self.inner.total_commands.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => {
                    tracing::warn!("Broadcast to agent {} failed: {e}", handle.id());
                }
            }
            outcomes.push(BroadcastOutcome {
                agent_id: handle.id().clone(),
                result,
            });
        }
        outcomes
    }

    /// Most recent `max_lines` of an agent's buffered output, oldest first.
    ///
    /// Never blocks and never waits for new data: an agent that produced
    /// nothing yields an empty vec, not an error.
    pub fn read_output(&self, id: &str, max_lines: usize) -> Result<Vec<String>, EngineError> {
        Ok(self.lookup(id)?.snapshot_output(max_lines))
    }

    /// Point-in-time record for one agent.
    pub fn agent_status(&self, id: &str) -> Result<AgentRecord, EngineError> {
        Ok(self.lookup(id)?.record())
    }

    /// Non-blocking liveness probe: the agent's terminal status if its
    /// process has terminated, `None` while it is still starting/running.
    pub fn poll_exit(&self, id: &str) -> Result<Option<AgentStatus>, EngineError> {
        Ok(self.lookup(id)?.poll_exit())
    }

    /// Request termination of one agent. Always succeeds at the engine
    /// level: unknown ids and already-terminal agents are no-ops.
    ///
    /// The roster entry is removed in the background once the agent's I/O
    /// task has drained final output, bounded by the drain grace period.
    pub fn kill_agent(&self, id: &str) {
        let handle = {
            let roster = self.inner.roster.lock().unwrap();
            roster.entries.get(id).cloned()
        };
        if let Some(handle) = handle {
            tracing::info!("Killing agent {id}");
            handle.kill();
            self.schedule_removal(handle);
        }
    }

    /// Terminate every agent on the roster. Idempotent.
    pub fn kill_all(&self) {
        let handles = {
            let roster = self.inner.roster.lock().unwrap();
            roster.handles_in_order()
        };
        tracing::info!("Killing all agents ({})", handles.len());
        for handle in handles {
            handle.kill();
            self.schedule_removal(handle);
        }
    }

    /// Consistent point-in-time view of all roster entries, insertion
    /// order. Every status shown is a real state of the machine -- nothing
    /// mid-transition leaks out.
    pub fn roster(&self) -> Vec<AgentRecord> {
        let roster = self.inner.roster.lock().unwrap();
        roster
            .order
            .iter()
            .filter_map(|id| roster.entries.get(id))
            .map(|handle| handle.record())
            .collect()
    }

    /// Commands delivered so far (targeted sends + per-agent broadcast
    /// deliveries).
    pub fn total_commands(&self) -> u64 {
        self.inner.total_commands.load(Ordering::Relaxed)
    }

    pub fn session_id(&self) -> &str {
        &self.inner.session_id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.inner.started_at
    }

    /// True once [`Engine::shutdown`] has begun; snapshots taken after this
    /// point are refused.
    pub fn is_shutting_down(&self) -> bool {
        self.inner.root_cancel.is_cancelled()
    }

    /// Full teardown: cancel the root token (cascades to every agent),
    /// then wait -- bounded per agent -- for I/O tasks to finish draining.
    pub async fn shutdown(&self) {
        tracing::info!("Shutting down orchestration engine");
        self.inner.root_cancel.cancel();

        let handles = {
            let roster = self.inner.roster.lock().unwrap();
            roster.handles_in_order()
        };
        for handle in handles {
            handle.wait_terminated(SHUTDOWN_GRACE).await;
        }

        let mut roster = self.inner.roster.lock().unwrap();
        roster.entries.clear();
        roster.order.clear();
    }

    fn lookup(&self, id: &str) -> Result<Arc<AgentHandle>, EngineError> {
        let roster = self.inner.roster.lock().unwrap();
        roster
            .entries
            .get(id)
            .cloned()
            .ok_or_else(|| EngineError::AgentNotFound { id: id.to_string() })
    }

    /// Remove the roster entry once the agent has reached a terminal state,
    /// plus the drain grace period during which observers can still read
    /// its final output.
    fn schedule_removal(&self, handle: Arc<AgentHandle>) {
        let inner = self.inner.clone();
        tokio::spawn(async move {
            handle.wait_terminated(SHUTDOWN_GRACE).await;
            tokio::time::sleep(inner.drain_grace).await;
            let mut roster = inner.roster.lock().unwrap();
            roster.remove(handle.id());
            tracing::debug!("Agent {} removed from roster", handle.id());
        });
    }
}
