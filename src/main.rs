use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};

use conductor::cli::{Cli, Commands};
use conductor::config;
use conductor::engine::Engine;
use conductor::session::SessionRecorder;
use conductor::strategy::{Directive, DirectiveParser};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();
    tracing::info!("Conductor starting");

    let config = config::load_config(&cli)?;
    tracing::info!(
        tier = %config.tier,
        workspace = %config.workspace.display(),
        buffer_capacity = config.buffer_capacity,
        "Config loaded"
    );

    let Commands::Run { export_session, .. } = cli.command;

    let engine = Engine::new(&config);
    let recorder = SessionRecorder::new(engine.clone());
    let parser = DirectiveParser::new();

    println!(
        "Conductor ready (tier: {}). Directives: spawn <kind>, send <id> <cmd>, broadcast: <cmd>, output <id> [n], kill <id>, kill all, roster, export, quit.",
        config.tier
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line {
                    Ok(Some(line)) => match parser.classify(&line) {
                        Some(Directive::Quit) => break,
                        Some(directive) => run_directive(&engine, &recorder, directive).await,
                        None if line.trim().is_empty() => {}
                        None => println!("Unrecognized directive: {line}"),
                    },
                    // stdin closed
                    Ok(None) => break,
                    Err(e) => {
                        tracing::warn!("stdin read error: {e}");
                        break;
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                println!();
                tracing::info!("Interrupt received");
                break;
            }
        }
    }

    // Export before teardown: snapshots are refused once shutdown begins.
    if let Some(path) = &export_session {
        if let Err(e) = recorder.export_to_file(path).await {
            tracing::warn!("Session export failed: {e}");
        }
    }

    engine.shutdown().await;
    tracing::info!("Conductor stopped");
    Ok(())
}

/// Route one classified directive to the engine and print the outcome.
async fn run_directive(engine: &Engine, recorder: &SessionRecorder, directive: Directive) {
    match directive {
        Directive::Spawn(kind) => match engine.spawn_agent(kind).await {
            Ok(id) => println!("Spawned {kind} agent: {id}"),
            Err(e) => println!("Spawn failed: {e}"),
        },
        Directive::Send { target, command } => {
            match engine.send(&target, format!("{command}\n").as_bytes()).await {
                Ok(()) => println!("Sent to {target}"),
                Err(e) => println!("Send failed: {e}"),
            }
        }
        Directive::Broadcast(command) => {
            let outcomes = engine.broadcast(format!("{command}\n").as_bytes()).await;
            let delivered = outcomes.iter().filter(|o| o.ok()).count();
            println!("Broadcast delivered to {delivered}/{} agents", outcomes.len());
            for outcome in &outcomes {
                if let Err(e) = &outcome.result {
                    println!("  {}: {e}", outcome.agent_id);
                }
            }
        }
        Directive::Output { target, max_lines } => match engine.read_output(&target, max_lines) {
            Ok(lines) if lines.is_empty() => println!("(no output)"),
            Ok(lines) => {
                for line in lines {
                    println!("{line}");
                }
            }
            Err(e) => println!("{e}"),
        },
        Directive::Kill(target) => {
            engine.kill_agent(&target);
            println!("Kill requested for {target}");
        }
        Directive::KillAll => {
            engine.kill_all();
            println!("Kill requested for all agents");
        }
        Directive::Roster => {
            let roster = engine.roster();
            if roster.is_empty() {
                println!("(no agents)");
            }
            for record in roster {
                println!(
                    "{}  {}  {}  commands: {}  last activity: {}",
                    record.id,
                    record.kind,
                    record.status,
                    record.commands_sent,
                    record.last_activity.format("%H:%M:%S"),
                );
            }
        }
        Directive::Export => match recorder.export_json() {
            Ok(json) => println!("{json}"),
            Err(e) => println!("{e}"),
        },
        // Handled by the input loop before dispatch.
        Directive::Quit => {}
    }
}
