use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "conductor", version, about = "Multi-agent CLI orchestration engine")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the orchestration session
    Run {
        /// Subscription tier: free (2 agents), pro (5), unlimited
        #[arg(short, long)]
        tier: Option<String>,

        /// Working directory agents are launched in
        #[arg(short, long)]
        workspace: Option<PathBuf>,

        /// Retained output lines per agent
        #[arg(long)]
        buffer_capacity: Option<usize>,

        /// Path to config file (overrides workspace config search)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Write the session snapshot to this file on exit
        #[arg(long)]
        export_session: Option<PathBuf>,
    },
}
