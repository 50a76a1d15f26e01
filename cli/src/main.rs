// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # NOVA Vault Runner
//!
//! Entry point for the `nova-vault` binary. Parses CLI arguments, initializes
//! logging, and dispatches to a subcommand:
//!
//! - `run`     — deploy a vault, execute a script, persist the resulting state
//! - `inspect` — summarize a persisted state file
//! - `version` — print build version information
//!
//! Reports and summaries are JSON lines on stdout; logs go to stderr.

mod cli;
mod logging;
mod script;

use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use clap::Parser;
use serde::de::DeserializeOwned;

use nova_contracts::FixedRateOracle;
use nova_vault::config::STATE_FORMAT_VERSION;
use nova_vault::storage;
use nova_vault::{AggregateCustody, CustodyKind, CustodyPolicy, PerClassCustody};

use cli::{Commands, NovaVaultCli};
use logging::LogFormat;
use script::{Deployed, Deployment, Step, Summary};

fn main() -> Result<()> {
    let cli = NovaVaultCli::parse();
    logging::init_logging(
        logging::DEFAULT_FILTER,
        LogFormat::from_str_lossy(&cli.log_format),
    );

    match cli.command {
        Commands::Run(args) => run(args),
        Commands::Inspect(args) => inspect(args),
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

/// Deploys the vault described by `--config`, runs `--script`, prints one
/// report line per step and a final summary, and writes `--state`.
fn run(args: cli::RunArgs) -> Result<()> {
    let deployment: Deployment = read_json(&args.config)?;
    let steps: Vec<Step> = read_json(&args.script)?;

    tracing::info!(
        vault = %deployment.vault.address,
        policy = %deployment.vault.policy,
        steps = steps.len(),
        atomic = args.atomic,
        "running script"
    );

    match deployment.vault.policy {
        CustodyKind::Aggregate => run_with::<AggregateCustody>(&args, &deployment, &steps),
        CustodyKind::PerClass => run_with::<PerClassCustody>(&args, &deployment, &steps),
    }
}

fn run_with<P: CustodyPolicy>(
    args: &cli::RunArgs,
    deployment: &Deployment,
    steps: &[Step],
) -> Result<()> {
    let deployed = Deployed::<P>::new(deployment)?;
    tracing::debug!(
        certificates = deployed.registry().certificate_count(),
        asset = deployed.vault().asset_reference(),
        "vault deployed"
    );

    let reports = if args.atomic {
        match deployed.run_atomic(steps) {
            Ok(reports) => reports,
            Err((step, err)) => {
                bail!("script rolled back: step {step} failed: {err}");
            }
        }
    } else {
        deployed.run_each(steps)
    };

    for report in &reports {
        println!("{}", serde_json::to_string(report)?);
    }
    let failed = reports.iter().filter(|r| r.error.is_some()).count();

    let record = deployed.record();
    println!("{}", serde_json::to_string(&Summary::of(&record)?)?);

    if let Some(path) = &args.state {
        storage::save_json(path, &record)
            .with_context(|| format!("failed to write state to {}", path.display()))?;
        tracing::info!(path = %path.display(), "state written");
    }

    tracing::info!(steps = reports.len(), failed, "script finished");
    Ok(())
}

/// Prints the summary of a persisted state file.
fn inspect(args: cli::InspectArgs) -> Result<()> {
    let record = storage::load_json(&args.state)
        .with_context(|| format!("failed to read state from {}", args.state.display()))?;
    if record.version != STATE_FORMAT_VERSION {
        bail!(
            "state format version {} is not supported (expected {})",
            record.version,
            STATE_FORMAT_VERSION
        );
    }

    let mut summary = Summary::of(&record)?;
    if let Some(unit) = &args.quote {
        let oracle = FixedRateOracle::new().with_pair(record.asset.clone(), unit.clone());
        summary = summary.with_valuation(&oracle, unit)?;
    }
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let bytes =
        fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_slice(&bytes).with_context(|| format!("failed to parse {}", path.display()))
}

/// Prints detailed version information.
fn print_version() {
    println!("nova-vault {}", env!("CARGO_PKG_VERSION"));
    println!("state format: v{}", STATE_FORMAT_VERSION);
    println!("rust edition: 2021");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn write(dir: &Path, name: &str, contents: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn run_then_inspect_round_trips_through_a_state_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = write(
            dir.path(),
            "vault.json",
            r#"{
                "asset": "nova:certificates",
                "vault": { "name": "V", "symbol": "vV", "address": "vault",
                           "owner": "admin", "policy": "aggregate", "supply_cap": 5000 },
                "certificates": [
                    { "issuer": "registrar", "reference": "lot 1", "amount": 800, "holder": "alice" }
                ]
            }"#,
        );
        let script = write(
            dir.path(),
            "ops.json",
            r#"[
                { "caller": "alice", "op": "approve_vault" },
                { "caller": "alice", "op": "deposit", "class": 1, "assets": 800 },
                { "caller": "alice", "op": "transfer", "to": "bob", "amount": 300 }
            ]"#,
        );
        let state = dir.path().join("state.json");

        run(cli::RunArgs {
            config,
            script,
            state: Some(state.clone()),
            atomic: true,
        })
        .unwrap();

        let record = storage::load_json(&state).unwrap();
        assert_eq!(record.total_supply(), 800);
        assert_eq!(record.supply_cap, 5_000);
        assert_eq!(record.ledger.balance_of(&"bob".into()), 300);

        inspect(cli::InspectArgs {
            state,
            quote: Some("EUR".into()),
        })
        .unwrap();
    }

    #[test]
    fn failed_atomic_run_writes_nothing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = write(
            dir.path(),
            "vault.json",
            r#"{
                "asset": "nova:certificates",
                "vault": { "name": "V", "symbol": "vV", "address": "vault",
                           "owner": "admin", "policy": "per_class" }
            }"#,
        );
        let script = write(
            dir.path(),
            "ops.json",
            r#"[ { "caller": "alice", "op": "deposit", "class": 1, "assets": 5 } ]"#,
        );
        let state = dir.path().join("state.json");

        let err = run(cli::RunArgs {
            config,
            script,
            state: Some(state.clone()),
            atomic: true,
        })
        .unwrap_err();
        assert!(err.to_string().contains("step 0"));
        assert!(!state.exists());
    }

    #[test]
    fn missing_config_is_reported_with_its_path() {
        let err = read_json::<Deployment>(Path::new("/nonexistent/vault.json")).unwrap_err();
        assert!(format!("{err:#}").contains("/nonexistent/vault.json"));
    }
}
