pub mod merge;
pub mod schema;

pub use schema::*;

use std::path::Path;
use std::str::FromStr;

use anyhow::Context;

use crate::cli::{Cli, Commands};
use crate::engine::{AgentKind, LaunchSpec, Tier};

/// Load configuration by merging global, workspace, and CLI sources.
/// Precedence: CLI > workspace config > global config > defaults.
///
/// Missing config files are handled gracefully (defaults apply).
pub fn load_config(cli: &Cli) -> anyhow::Result<AppConfig> {
    // Layer 1: Global config (~/.config/conductor/conductor.toml or platform equivalent)
    let global = load_global_config();

    // Determine workspace path from CLI or global config, for loading workspace config.
    let workspace_path = cli_workspace(cli)
        .or_else(|| global.workspace.clone())
        .unwrap_or_else(|| std::path::PathBuf::from("."));

    // Layer 2: Workspace config (workspace/conductor.toml, or an explicit --config path)
    let workspace = match cli_config_path(cli) {
        Some(path) => load_toml_file(&path).unwrap_or_default(),
        None => load_workspace_config(&workspace_path),
    };

    // Layer 3: CLI args (converted to PartialConfig)
    let cli_partial = cli_to_partial(cli);

    // Merge: CLI > workspace > global > defaults
    let config = cli_partial
        .with_fallback(workspace)
        .with_fallback(global)
        .finalize();

    Ok(config)
}

impl ConfigFile {
    /// Lower the parsed TOML into a PartialConfig, dropping (with a warning)
    /// entries that don't name a known tier or agent kind.
    pub fn to_partial(self) -> PartialConfig {
        let tier = self.general.as_ref().and_then(|g| {
            g.tier.as_deref().and_then(|raw| match Tier::from_str(raw) {
                Ok(tier) => Some(tier),
                Err(e) => {
                    tracing::warn!("Ignoring config tier: {e}");
                    None
                }
            })
        });

        let agents = self.agents.map(|entries| {
            let mut specs = std::collections::HashMap::new();
            for (name, entry) in entries {
                match AgentKind::from_str(&name) {
                    Ok(kind) => {
                        specs.insert(
                            kind,
                            LaunchSpec {
                                binary: entry.binary.unwrap_or_else(|| kind.to_string()),
                                args: entry.args.unwrap_or_default(),
                                env_passthrough: entry.env_passthrough.unwrap_or_default(),
                            },
                        );
                    }
                    Err(e) => tracing::warn!("Ignoring config agent entry: {e}"),
                }
            }
            specs
        });

        PartialConfig {
            tier,
            workspace: self
                .general
                .and_then(|g| g.workspace.map(std::path::PathBuf::from)),
            buffer_capacity: self.engine.as_ref().and_then(|e| e.buffer_capacity),
            kill_grace_ms: self.engine.as_ref().and_then(|e| e.kill_grace_ms),
            drain_grace_ms: self.engine.as_ref().and_then(|e| e.drain_grace_ms),
            agents,
        }
    }
}

/// Load global config from the platform-specific config directory.
/// Returns empty PartialConfig if file not found.
fn load_global_config() -> PartialConfig {
    let path = global_config_path();
    match path {
        Some(p) => load_toml_file(&p).unwrap_or_default(),
        None => {
            tracing::debug!("Could not determine global config directory");
            PartialConfig::default()
        }
    }
}

/// Load workspace config from workspace/conductor.toml.
/// Returns empty PartialConfig if file not found.
fn load_workspace_config(workspace_path: &Path) -> PartialConfig {
    let config_path = workspace_path.join("conductor.toml");
    load_toml_file(&config_path).unwrap_or_default()
}

/// Load and parse a TOML config file into a PartialConfig.
/// Returns None-equivalent PartialConfig on file-not-found; propagates parse errors to log.
fn load_toml_file(path: &Path) -> Option<PartialConfig> {
    match std::fs::read_to_string(path) {
        Ok(contents) => {
            match toml::from_str::<ConfigFile>(&contents)
                .context(format!("Failed to parse {}", path.display()))
            {
                Ok(config_file) => {
                    tracing::info!("Loaded config from {}", path.display());
                    Some(config_file.to_partial())
                }
                Err(e) => {
                    tracing::warn!("Config parse error: {:#}", e);
                    None
                }
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No config file at {}, using defaults", path.display());
            None
        }
        Err(e) => {
            tracing::warn!("Failed to read config at {}: {}", path.display(), e);
            None
        }
    }
}

/// Resolve the platform-specific global config path.
/// Linux: ~/.config/conductor/conductor.toml
/// macOS: ~/Library/Application Support/conductor/conductor.toml
fn global_config_path() -> Option<std::path::PathBuf> {
    directories::ProjectDirs::from("", "", "conductor")
        .map(|dirs| dirs.config_dir().join("conductor.toml"))
}

/// Extract workspace path from CLI args.
fn cli_workspace(cli: &Cli) -> Option<std::path::PathBuf> {
    match &cli.command {
        Commands::Run { workspace, .. } => workspace.clone(),
    }
}

/// Extract an explicit config file path from CLI args.
fn cli_config_path(cli: &Cli) -> Option<std::path::PathBuf> {
    match &cli.command {
        Commands::Run { config, .. } => config.clone(),
    }
}

/// Convert CLI arguments to a PartialConfig for merging.
fn cli_to_partial(cli: &Cli) -> PartialConfig {
    match &cli.command {
        Commands::Run {
            tier,
            workspace,
            buffer_capacity,
            ..
        } => PartialConfig {
            tier: tier.as_deref().and_then(|raw| match Tier::from_str(raw) {
                Ok(tier) => Some(tier),
                Err(e) => {
                    tracing::warn!("Ignoring --tier: {e}");
                    None
                }
            }),
            workspace: workspace.clone(),
            buffer_capacity: *buffer_capacity,
            ..Default::default()
        },
    }
}
