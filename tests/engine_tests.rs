use std::collections::HashMap;
use std::time::Duration;

use conductor::config::AppConfig;
use conductor::engine::{AgentKind, AgentStatus, Engine, LaunchSpec, Tier};
use conductor::error::{EngineError, SpawnError};
use conductor::session::SessionRecorder;

// ─── Helpers ──────────────────────────────────────────────────────────

/// `cat` on a PTY makes a convenient stand-in agent: long-lived,
/// interactive, and it echoes whatever it is sent.
fn cat_spec() -> LaunchSpec {
    LaunchSpec {
        binary: "/bin/cat".to_string(),
        args: Vec::new(),
        env_passthrough: Vec::new(),
    }
}

fn config_with(tier: Tier, drain_grace: Duration) -> AppConfig {
    let mut agents = HashMap::new();
    agents.insert(AgentKind::Claude, cat_spec());
    agents.insert(AgentKind::Gemini, cat_spec());
    AppConfig {
        tier,
        workspace: std::env::temp_dir(),
        buffer_capacity: 100,
        kill_grace: Duration::from_millis(500),
        drain_grace,
        agents,
    }
}

fn test_config(tier: Tier) -> AppConfig {
    config_with(tier, Duration::from_millis(300))
}

/// Poll `cond` until it holds or the timeout elapses.
async fn eventually<F: Fn() -> bool>(cond: F, timeout: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    cond()
}

fn is_terminal(engine: &Engine, id: &str) -> bool {
    engine
        .agent_status(id)
        .map(|r| r.status.is_terminal())
        .unwrap_or(true)
}

// ============================================================
// Tier cap enforcement
// ============================================================

#[tokio::test]
async fn test_spawn_respects_tier_cap() {
    let engine = Engine::new(&test_config(Tier::Free));

    let first = engine.spawn_agent(AgentKind::Claude).await.unwrap();
    let _second = engine.spawn_agent(AgentKind::Gemini).await.unwrap();

    let third = engine.spawn_agent(AgentKind::Claude).await;
    assert!(matches!(third, Err(SpawnError::TierLimitExceeded { cap: 2 })));

    // Killing one agent frees its slot.
    engine.kill_agent(&first);
    assert!(eventually(|| is_terminal(&engine, &first), Duration::from_secs(5)).await);

    let replacement = engine.spawn_agent(AgentKind::Claude).await;
    assert!(replacement.is_ok());

    engine.shutdown().await;
}

#[tokio::test]
async fn test_failed_spawn_does_not_consume_a_slot() {
    let mut config = test_config(Tier::Free);
    config.agents.insert(
        AgentKind::Gemini,
        LaunchSpec {
            binary: "definitely-not-a-real-binary-zzz".to_string(),
            args: Vec::new(),
            env_passthrough: Vec::new(),
        },
    );
    let engine = Engine::new(&config);

    let failed = engine.spawn_agent(AgentKind::Gemini).await;
    assert!(matches!(failed, Err(SpawnError::BinaryNotFound { .. })));
    assert!(engine.roster().is_empty());

    // Both tier slots are still available.
    engine.spawn_agent(AgentKind::Claude).await.unwrap();
    engine.spawn_agent(AgentKind::Claude).await.unwrap();

    engine.shutdown().await;
}

// ============================================================
// Status machine
// ============================================================

#[tokio::test]
async fn test_agent_runs_then_exits_cleanly() {
    let mut config = test_config(Tier::Free);
    config.agents.insert(
        AgentKind::Claude,
        LaunchSpec {
            binary: "/bin/echo".to_string(),
            args: vec!["startup banner".to_string()],
            env_passthrough: Vec::new(),
        },
    );
    let engine = Engine::new(&config);

    let id = engine.spawn_agent(AgentKind::Claude).await.unwrap();

    assert!(
        eventually(
            || matches!(
                engine.poll_exit(&id),
                Ok(Some(AgentStatus::Exited(0)))
            ),
            Duration::from_secs(5)
        )
        .await
    );

    // Final output was drained into the buffer before the transition.
    let lines = engine.read_output(&id, 10).unwrap();
    assert!(
        lines.iter().any(|l| l.contains("startup banner")),
        "expected banner in {lines:?}"
    );

    // Writes to an exited agent are rejected.
    let send = engine.send(&id, b"anyone home?\n").await;
    assert!(matches!(send, Err(EngineError::AgentNotRunning { .. })));

    engine.shutdown().await;
}

#[tokio::test]
async fn test_terminal_status_is_absorbing() {
    let engine = Engine::new(&config_with(Tier::Free, Duration::from_secs(10)));

    let id = engine.spawn_agent(AgentKind::Claude).await.unwrap();
    engine.kill_agent(&id);
    assert!(eventually(|| is_terminal(&engine, &id), Duration::from_secs(5)).await);

    let first = engine.agent_status(&id).unwrap().status;
    assert_eq!(first, AgentStatus::Killed);

    // A second kill neither errors nor moves the status.
    engine.kill_agent(&id);
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(engine.agent_status(&id).unwrap().status, first);

    engine.shutdown().await;
}

#[tokio::test]
async fn test_kill_unknown_agent_is_a_noop() {
    let engine = Engine::new(&test_config(Tier::Free));
    engine.kill_agent("no-such-agent");
    engine.kill_all();
    assert!(engine.roster().is_empty());
}

// ============================================================
// Output plumbing
// ============================================================

#[tokio::test]
async fn test_read_output_is_empty_before_any_output() {
    let engine = Engine::new(&test_config(Tier::Free));

    let id = engine.spawn_agent(AgentKind::Claude).await.unwrap();
    // cat produces nothing unprompted: empty vec, not an error.
    assert_eq!(engine.read_output(&id, 10).unwrap(), Vec::<String>::new());
    assert!(matches!(engine.poll_exit(&id), Ok(None)));

    let missing = engine.read_output("no-such-agent", 10);
    assert!(matches!(missing, Err(EngineError::AgentNotFound { .. })));

    engine.shutdown().await;
}

#[tokio::test]
async fn test_send_then_read_reflects_delivered_command() {
    let engine = Engine::new(&test_config(Tier::Free));

    let id = engine.spawn_agent(AgentKind::Claude).await.unwrap();
    engine.send(&id, b"hello conductor\n").await.unwrap();

    // cat echoes the line back through the PTY.
    assert!(
        eventually(
            || engine
                .read_output(&id, 10)
                .map(|lines| lines.iter().any(|l| l.contains("hello conductor")))
                .unwrap_or(false),
            Duration::from_secs(5)
        )
        .await,
        "expected echoed command in agent output"
    );

    assert_eq!(engine.total_commands(), 1);

    engine.shutdown().await;
}

#[tokio::test]
async fn test_read_output_respects_max_lines() {
    let engine = Engine::new(&test_config(Tier::Free));

    let id = engine.spawn_agent(AgentKind::Claude).await.unwrap();
    for i in 0..5 {
        engine
            .send(&id, format!("line number {i}\n").as_bytes())
            .await
            .unwrap();
    }

    assert!(
        eventually(
            || engine.read_output(&id, 100).map(|l| l.len() >= 5).unwrap_or(false),
            Duration::from_secs(5)
        )
        .await
    );

    let bounded = engine.read_output(&id, 2).unwrap();
    assert_eq!(bounded.len(), 2);

    engine.shutdown().await;
}

// ============================================================
// Broadcast fan-out
// ============================================================

#[tokio::test]
async fn test_broadcast_reports_per_agent_outcomes() {
    // Long drain grace keeps the killed agent on the roster for the
    // duration of the test.
    let engine = Engine::new(&config_with(Tier::Pro, Duration::from_secs(10)));

    let a = engine.spawn_agent(AgentKind::Claude).await.unwrap();
    let b = engine.spawn_agent(AgentKind::Gemini).await.unwrap();
    let c = engine.spawn_agent(AgentKind::Claude).await.unwrap();

    engine.kill_agent(&b);
    assert!(eventually(|| is_terminal(&engine, &b), Duration::from_secs(5)).await);

    let outcomes = engine.broadcast(b"status report\n").await;
    assert_eq!(outcomes.len(), 3);

    // Fan-out order is insertion order.
    assert_eq!(outcomes[0].agent_id, a);
    assert_eq!(outcomes[1].agent_id, b);
    assert_eq!(outcomes[2].agent_id, c);

    assert!(outcomes[0].ok());
    assert!(!outcomes[1].ok());
    assert!(outcomes[2].ok());
    assert!(matches!(
        outcomes[1].result,
        Err(EngineError::AgentNotRunning { .. })
    ));

    // Only successful deliveries count.
    assert_eq!(engine.total_commands(), 2);

    engine.shutdown().await;
}

// ============================================================
// Roster views
// ============================================================

#[tokio::test]
async fn test_roster_lists_agents_in_spawn_order() {
    let engine = Engine::new(&test_config(Tier::Pro));

    let a = engine.spawn_agent(AgentKind::Claude).await.unwrap();
    let b = engine.spawn_agent(AgentKind::Gemini).await.unwrap();
    let c = engine.spawn_agent(AgentKind::Claude).await.unwrap();

    let roster = engine.roster();
    let ids: Vec<&str> = roster.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec![a.as_str(), b.as_str(), c.as_str()]);
    assert!(roster.iter().all(|r| r.status == AgentStatus::Running));
    assert_eq!(roster[1].kind, AgentKind::Gemini);

    engine.shutdown().await;
}

#[tokio::test]
async fn test_kill_all_empties_the_roster_after_drain() {
    let engine = Engine::new(&config_with(Tier::Free, Duration::from_millis(200)));

    engine.spawn_agent(AgentKind::Claude).await.unwrap();
    engine.spawn_agent(AgentKind::Gemini).await.unwrap();
    assert_eq!(engine.roster().len(), 2);

    engine.kill_all();
    assert!(
        eventually(|| engine.roster().is_empty(), Duration::from_secs(10)).await,
        "roster should empty once agents terminate and drain"
    );

    engine.shutdown().await;
}

// ============================================================
// Session recorder
// ============================================================

#[tokio::test]
async fn test_session_snapshot_covers_roster_and_commands() {
    let engine = Engine::new(&test_config(Tier::Pro));
    let recorder = SessionRecorder::new(engine.clone());

    let id = engine.spawn_agent(AgentKind::Claude).await.unwrap();
    engine.send(&id, b"first\n").await.unwrap();
    engine.send(&id, b"second\n").await.unwrap();

    let snapshot = recorder.snapshot().unwrap();
    assert_eq!(snapshot.roster.len(), 1);
    assert_eq!(snapshot.roster[0].id, id);
    assert_eq!(snapshot.roster[0].commands_sent, 2);
    assert_eq!(snapshot.total_commands, 2);
    assert!(snapshot.sampled_at >= snapshot.started_at);

    engine.shutdown().await;
}

#[tokio::test]
async fn test_session_export_writes_json_file() {
    let engine = Engine::new(&test_config(Tier::Free));
    let recorder = SessionRecorder::new(engine.clone());

    engine.spawn_agent(AgentKind::Gemini).await.unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("session.json");
    recorder.export_to_file(&path).await.unwrap();

    let exported: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(exported["roster"].as_array().unwrap().len(), 1);
    assert_eq!(exported["roster"][0]["kind"], "gemini");

    engine.shutdown().await;
}

// ============================================================
// Full scenario
// ============================================================

#[tokio::test]
async fn test_tier_two_lifecycle_scenario() {
    let engine = Engine::new(&test_config(Tier::Free));

    let claude = engine.spawn_agent(AgentKind::Claude).await.unwrap();
    let gemini = engine.spawn_agent(AgentKind::Gemini).await.unwrap();
    assert_ne!(claude, gemini);

    let rejected = engine.spawn_agent(AgentKind::Claude).await;
    assert!(matches!(rejected, Err(SpawnError::TierLimitExceeded { .. })));

    engine.send(&claude, b"hello\n").await.unwrap();
    assert!(
        eventually(
            || engine
                .read_output(&claude, 10)
                .map(|lines| lines.iter().any(|l| l.contains("hello")))
                .unwrap_or(false),
            Duration::from_secs(5)
        )
        .await
    );

    engine.kill_agent(&claude);
    assert!(eventually(|| is_terminal(&engine, &claude), Duration::from_secs(5)).await);

    let replacement = engine.spawn_agent(AgentKind::Claude).await.unwrap();
    assert_ne!(replacement, claude);

    engine.shutdown().await;
}
