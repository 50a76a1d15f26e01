//! # CLI Interface
//!
//! Defines the command-line argument structure for `nova-vault` using
//! `clap` derive. Subcommands: `run`, `inspect`, and `version`.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// NOVA vault transaction runner.
///
/// Deploys a vault over a certificate registry, executes a script of vault
/// operations through the coordinator, and persists the resulting state.
#[derive(Parser, Debug)]
#[command(
    name = "nova-vault",
    about = "NOVA vault transaction runner",
    version,
    propagate_version = true
)]
pub struct NovaVaultCli {
    /// Log output format: "pretty" or "json".
    #[arg(long, global = true, env = "NOVA_LOG_FORMAT", default_value = "pretty")]
    pub log_format: String,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level subcommands for the `nova-vault` binary.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Deploy a vault and run a script of operations against it.
    Run(RunArgs),
    /// Summarize a persisted vault state file.
    Inspect(InspectArgs),
    /// Print version information and exit.
    Version,
}

/// Arguments for the `run` subcommand.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Deployment file (JSON): vault configuration and initial certificates.
    #[arg(long, short = 'c', env = "NOVA_VAULT_CONFIG")]
    pub config: PathBuf,

    /// Script file (JSON array of steps).
    #[arg(long, short = 's')]
    pub script: PathBuf,

    /// Where to write the resulting vault state.
    #[arg(long, env = "NOVA_VAULT_STATE")]
    pub state: Option<PathBuf>,

    /// Run the whole script as one transaction. The first failing step
    /// rolls back every step.
    #[arg(long)]
    pub atomic: bool,
}

/// Arguments for the `inspect` subcommand.
#[derive(Parser, Debug)]
pub struct InspectArgs {
    /// Vault state file written by `run`.
    #[arg(long, env = "NOVA_VAULT_STATE")]
    pub state: PathBuf,

    /// Also value the vault's assets in this unit of account (1:1).
    #[arg(long)]
    pub quote: Option<String>,
}
