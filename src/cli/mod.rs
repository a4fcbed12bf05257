pub mod commands;
pub mod config;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "skymood")]
#[command(about = "Sample the Bluesky firehose, score its mood, and serve the meters")]
#[command(version)]
pub struct Cli {
    /// Config file (defaults to ./skymood.toml when present)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// API key for the chat-completions classifier
    #[arg(long, env = "OPENAI_API_KEY", global = true, hide_env_values = true)]
    pub api_key: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write a default skymood.toml
    Init(InitArgs),
    /// Collect, classify and store one batch, then print the run report
    Run(RunArgs),
    /// Serve the meters API
    Serve(ServeArgs),
}

#[derive(clap::Args)]
pub struct InitArgs {
    /// Overwrite an existing file
    #[arg(long)]
    pub force: bool,
}

#[derive(clap::Args)]
pub struct RunArgs {
    /// Stop after this many posts (overrides [stream] event_limit)
    #[arg(long)]
    pub events: Option<usize>,

    /// Stop after this many seconds (overrides [stream] collect_seconds)
    #[arg(long)]
    pub seconds: Option<u64>,
}

#[derive(clap::Args)]
pub struct ServeArgs {
    /// Address to bind (overrides [server] listen)
    #[arg(long)]
    pub listen: Option<String>,

    /// Also run a sampling batch every N seconds into the served store
    #[arg(long, value_name = "SECONDS")]
    pub sample_every: Option<u64>,
}
