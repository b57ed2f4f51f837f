use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand};

#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Full comprehensive context.
    Context,
    /// Digest plus tool recommendations.
    Summary,
}

#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Toml,
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "ckstate", version, about = "State engine and context aggregation driver")]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    /// Read configuration from this file instead of the default lookup.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Drive a scripted build/deploy session and print the resulting context.
    Simulate(SimulateArgs),
    /// Print the effective configuration.
    Config(ConfigArgs),
}

#[derive(ClapArgs, Debug, Clone)]
pub struct SimulateArgs {
    #[arg(long, default_value = "demo")]
    pub session_id: String,

    #[arg(long, default_value = "registry.local/demo:latest")]
    pub image: String,

    /// Critical findings reported by the scan step.
    #[arg(long, default_value_t = 0)]
    pub critical: u32,

    /// High findings reported by the scan step.
    #[arg(long, default_value_t = 0)]
    pub high: u32,

    /// Also run the deploy step (writes a manifest and a k8s_deploy record).
    #[arg(long)]
    pub deploy: bool,

    /// Mark the build step as failed.
    #[arg(long)]
    pub fail_build: bool,

    /// Workspace usage as a fraction of its quota.
    #[arg(long, default_value_t = 0.4)]
    pub disk_ratio: f64,

    #[arg(long)]
    pub cpu: Option<f64>,

    #[arg(long)]
    pub memory: Option<f64>,

    #[arg(long)]
    pub error_rate: Option<f64>,

    #[arg(long, value_enum, default_value_t = OutputFormat::Context)]
    pub output: OutputFormat,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct ConfigArgs {
    #[arg(long, value_enum, default_value_t = ConfigFormat::Toml)]
    pub format: ConfigFormat,
}
