//! Per-agent process handle: PTY lifecycle, I/O task, kill escalation.
//!
//! Each spawned agent is one external CLI process attached to the subordinate
//! side of a pseudo-terminal pair, plus a single tokio task that owns the
//! controlling side. That task is the only code touching the PTY: it decodes
//! output lines into the agent's [`OutputBuffer`], applies queued writes from
//! the bounded writer channel, watches for child exit, and honors the
//! cancellation token.
//!
//! The spawned process:
//! - Becomes a session leader on the PTY (pid == pgid), so signals address
//!   the whole process group
//! - Is terminated with SIGTERM first, escalating to SIGKILL after a bounded
//!   grace period if it ignores the request
//! - Reports its terminal status back through the handle's state cell

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Child;
use tokio::sync::mpsc;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::buffer::OutputBuffer;
use super::types::{AgentId, AgentKind, AgentRecord, AgentStatus, LaunchSpec};
use crate::error::{EngineError, SpawnError};

/// Queued writes the handle accepts before `write` applies backpressure.
const WRITE_QUEUE_DEPTH: usize = 64;

/// Upper bound on one PTY write; a child that stops draining its input must
/// not wedge the I/O task and make kill unreachable.
const WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// Per-read timeout while draining final output after child exit.
const DRAIN_READ_TIMEOUT: Duration = Duration::from_millis(200);

/// A run of output longer than this without a newline is flushed as a line
/// so the pending-line accumulator stays bounded.
const MAX_PENDING_LINE: usize = 64 * 1024;

/// Engine-provided context for a spawn: where to run, how much output to
/// retain, how patient kill should be, and the cancellation token (a child
/// of the engine's root token).
pub(crate) struct SpawnContext {
    pub workspace: PathBuf,
    pub buffer_capacity: usize,
    pub kill_grace: Duration,
    pub cancel: CancellationToken,
}

/// Mutable agent state, guarded by one short-lived mutex.
struct StateCell {
    status: AgentStatus,
    last_activity: DateTime<Utc>,
    commands_sent: u64,
}

/// One spawned agent process plus its PTY endpoints and output buffer.
///
/// Shared as `Arc<AgentHandle>` between the engine's roster and the agent's
/// I/O task. All methods take `&self`; per-agent state is serialized through
/// the internal state cell and the writer channel.
pub struct AgentHandle {
    id: AgentId,
    kind: AgentKind,
    spawned_at: DateTime<Utc>,
    pid: u32,
    kill_grace: Duration,
    state: Mutex<StateCell>,
    buffer: OutputBuffer,
    writer_tx: mpsc::Sender<Vec<u8>>,
    cancel: CancellationToken,
    done: Notify,
}

impl AgentHandle {
    /// Allocate a PTY pair, launch the kind-resolved binary attached to its
    /// subordinate side, and start the I/O task.
    ///
    /// Fails with [`SpawnError::BinaryNotFound`] or
    /// [`SpawnError::ResourceExhausted`] without leaving anything behind:
    /// no roster entry, no task, no live process.
    pub(crate) async fn spawn(
        kind: AgentKind,
        spec: &LaunchSpec,
        ctx: SpawnContext,
    ) -> Result<Arc<Self>, SpawnError> {
        let id: AgentId = Uuid::new_v4().to_string();

        tracing::info!("Spawning {kind} agent (ID: {id})");

        // Resolve the binary up front so a bad config fails as
        // BinaryNotFound instead of an opaque spawn error.
        let program = which::which(&spec.binary).map_err(|_| SpawnError::BinaryNotFound {
            binary: spec.binary.clone(),
        })?;

        let (pty, pts) = pty_process::open()
            .map_err(|e| SpawnError::ResourceExhausted(format!("pty allocation failed: {e}")))?;

        let mut cmd = pty_process::Command::new(&program);
        cmd = cmd.args(&spec.args);
        if !spec.env_passthrough.is_empty() {
            // Narrow the environment to the configured passthrough set. A
            // PTY child always needs PATH/HOME/TERM on top of it.
            cmd = cmd.env_clear();
            for key in ["PATH", "HOME", "TERM"] {
                if let Ok(value) = std::env::var(key) {
                    cmd = cmd.env(key, value);
                }
            }
            for key in &spec.env_passthrough {
                if let Ok(value) = std::env::var(key) {
                    cmd = cmd.env(key, value);
                }
            }
        }
        cmd = cmd.env("TERM", "xterm-256color");
        cmd = cmd.current_dir(&ctx.workspace);

        let mut child = cmd
            .spawn(pts)
            .map_err(|e| SpawnError::ResourceExhausted(format!("spawn failed: {e}")))?;

        // Liveness probe: a pid means fork/exec went through. This is the
        // Starting -> Running transition point.
        let Some(pid) = child.id() else {
            let _ = child.wait().await;
            return Err(SpawnError::ResourceExhausted(
                "process terminated before liveness probe".to_string(),
            ));
        };

        let (writer_tx, writer_rx) = mpsc::channel::<Vec<u8>>(WRITE_QUEUE_DEPTH);
        let now = Utc::now();

        let handle = Arc::new(AgentHandle {
            id: id.clone(),
            kind,
            spawned_at: now,
            pid,
            kill_grace: ctx.kill_grace,
            state: Mutex::new(StateCell {
                status: AgentStatus::Running,
                last_activity: now,
                commands_sent: 0,
            }),
            buffer: OutputBuffer::new(ctx.buffer_capacity),
            writer_tx,
            cancel: ctx.cancel,
            done: Notify::new(),
        });

        let task_handle = handle.clone();
        tokio::spawn(async move {
            task_handle.io_loop(pty, child, writer_rx).await;
        });

        tracing::debug!("Agent {id} running (pid {pid})");
        Ok(handle)
    }

    pub fn id(&self) -> &AgentId {
        &self.id
    }

    pub fn status(&self) -> AgentStatus {
        self.state.lock().unwrap().status.clone()
    }

    /// Snapshot of this agent as an [`AgentRecord`].
    pub fn record(&self) -> AgentRecord {
        let state = self.state.lock().unwrap();
        AgentRecord {
            id: self.id.clone(),
            kind: self.kind,
            status: state.status.clone(),
            spawned_at: self.spawned_at,
            last_activity: state.last_activity,
            commands_sent: state.commands_sent,
        }
    }

    /// Forward raw bytes (including control bytes -- 0x03 becomes SIGINT via
    /// the PTY line discipline) to the agent's input.
    ///
    /// Decoupled from the PTY through a bounded channel into the I/O task:
    /// the caller never blocks on agent output, and a write racing teardown
    /// either lands before the task exits or fails with `AgentNotRunning`.
    pub async fn write(&self, bytes: &[u8]) -> Result<(), EngineError> {
        if self.status() != AgentStatus::Running {
            return Err(EngineError::AgentNotRunning {
                id: self.id.clone(),
            });
        }
        self.writer_tx
            .send(bytes.to_vec())
            .await
            .map_err(|_| EngineError::AgentNotRunning {
                id: self.id.clone(),
            })?;

        let mut state = self.state.lock().unwrap();
        state.commands_sent += 1;
        state.last_activity = Utc::now();
        Ok(())
    }

    /// Non-blocking liveness check: the terminal status if the process has
    /// terminated, `None` while it is still starting/running.
    ///
    /// The actual transition is performed by the I/O task the moment it
    /// observes exit; this surfaces it without waiting.
    pub fn poll_exit(&self) -> Option<AgentStatus> {
        let status = self.status();
        status.is_terminal().then_some(status)
    }

    /// Request termination. Idempotent: killing an agent that already
    /// reached a terminal state is a no-op, not an error.
    pub fn kill(&self) {
        self.cancel.cancel();
    }

    /// Most recent `max_lines` of buffered output, oldest first.
    pub fn snapshot_output(&self, max_lines: usize) -> Vec<String> {
        self.buffer.snapshot(max_lines)
    }

    /// Wait (bounded by `grace`) until the I/O task has finished draining
    /// and published a terminal status.
    pub(crate) async fn wait_terminated(&self, grace: Duration) {
        let deadline = tokio::time::Instant::now() + grace;
        while !self.status().is_terminal() {
            let notified = self.done.notified();
            if self.status().is_terminal() {
                return;
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return;
            }
        }
    }

    /// The single owner of the PTY controlling side. Runs until the child
    /// exits, the PTY closes, or the cancellation token trips.
    async fn io_loop(&self, mut pty: pty_process::Pty, mut child: Child, mut writer_rx: mpsc::Receiver<Vec<u8>>) {
        let mut read_buf = [0u8; 4096];
        let mut pending: Vec<u8> = Vec::new();

        let outcome = loop {
            tokio::select! {
                read = pty.read(&mut read_buf) => {
                    match read {
                        // EOF/EIO on the controlling side means the child
                        // closed the subordinate end: an implicit exit
                        // signal, not an error to surface to callers.
                        Ok(0) | Err(_) => {
                            let status = child.wait().await;
                            break exit_outcome(status);
                        }
                        Ok(n) => self.ingest(&read_buf[..n], &mut pending),
                    }
                }
                Some(bytes) = writer_rx.recv() => {
                    match tokio::time::timeout(WRITE_TIMEOUT, pty.write_all(&bytes)).await {
                        Ok(Ok(())) => {
                            let _ = pty.flush().await;
                        }
                        Ok(Err(e)) => {
                            tracing::warn!("Agent {}: pty write failed: {e}", self.id);
                        }
                        Err(_) => {
                            tracing::warn!(
                                "Agent {}: pty write timed out, dropped {} bytes",
                                self.id,
                                bytes.len()
                            );
                        }
                    }
                }
                status = child.wait() => {
                    self.drain(&mut pty, &mut pending).await;
                    break exit_outcome(status);
                }
                _ = self.cancel.cancelled() => {
                    self.terminate(&mut child).await;
                    self.drain(&mut pty, &mut pending).await;
                    break AgentStatus::Killed;
                }
            }
        };

        if !pending.is_empty() {
            let tail: Vec<u8> = std::mem::take(&mut pending);
            self.buffer.append(String::from_utf8_lossy(&tail).into_owned());
        }

        tracing::info!("Agent {} reached terminal state: {outcome}", self.id);
        self.transition(outcome);
        self.done.notify_waiters();
    }

    /// Split raw PTY bytes into complete lines (CRLF-aware) and append them
    /// to the ring buffer. Partial trailing data stays in `pending`.
    fn ingest(&self, bytes: &[u8], pending: &mut Vec<u8>) {
        pending.extend_from_slice(bytes);
        while let Some(pos) = pending.iter().position(|&b| b == b'\n') {
            let mut line: Vec<u8> = pending.drain(..=pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            self.buffer.append(String::from_utf8_lossy(&line).into_owned());
        }
        if pending.len() > MAX_PENDING_LINE {
            let chunk: Vec<u8> = std::mem::take(pending);
            self.buffer.append(String::from_utf8_lossy(&chunk).into_owned());
        }
        self.state.lock().unwrap().last_activity = Utc::now();
    }

    /// Read whatever final output is still queued on the PTY after exit.
    async fn drain(&self, pty: &mut pty_process::Pty, pending: &mut Vec<u8>) {
        let mut buf = [0u8; 4096];
        loop {
            match tokio::time::timeout(DRAIN_READ_TIMEOUT, pty.read(&mut buf)).await {
                Ok(Ok(n)) if n > 0 => self.ingest(&buf[..n], pending),
                _ => break,
            }
        }
    }

    /// SIGTERM the process group, escalating to SIGKILL after the grace
    /// period. Kill must always reach a terminal state, even if the process
    /// ignores termination signals.
    async fn terminate(&self, child: &mut Child) {
        // The PTY child is a session leader, so pid == pgid.
        let pgid = Pid::from_raw(self.pid as i32);
        let _ = signal::killpg(pgid, Signal::SIGTERM);
        if tokio::time::timeout(self.kill_grace, child.wait())
            .await
            .is_err()
        {
            tracing::warn!("Agent {} ignored SIGTERM, escalating to SIGKILL", self.id);
            let _ = signal::killpg(pgid, Signal::SIGKILL);
            let _ = child.wait().await;
        }
    }

    /// Publish a terminal status. Terminal states absorb: a late transition
    /// against an already-terminal agent is dropped.
    fn transition(&self, status: AgentStatus) {
        let mut state = self.state.lock().unwrap();
        if state.status.is_terminal() {
            return;
        }
        state.status = status;
        state.last_activity = Utc::now();
    }
}

/// Map a child's wait result onto the status machine: clean exits carry the
/// code, signal deaths and wait failures are abnormal terminations.
fn exit_outcome(status: std::io::Result<std::process::ExitStatus>) -> AgentStatus {
    match status {
        Ok(status) => match status.code() {
            Some(code) => AgentStatus::Exited(code),
            None => {
                use std::os::unix::process::ExitStatusExt;
                match status.signal() {
                    Some(sig) => AgentStatus::Failed(format!("terminated by signal {sig}")),
                    None => AgentStatus::Failed("terminated abnormally".to_string()),
                }
            }
        },
        Err(e) => AgentStatus::Failed(format!("process wait failed: {e}")),
    }
}
