//! # Scripts
//!
//! A deployment file describes one vault over a fresh certificate registry:
//!
//! ```json
//! {
//!   "asset": "nova:certificates",
//!   "vault": { "name": "Certificate Vault", "symbol": "vCERT",
//!              "address": "vault", "owner": "admin", "policy": "per_class" },
//!   "certificates": [
//!     { "issuer": "registrar", "reference": "ISIN XS01", "amount": 1000, "holder": "alice" }
//!   ]
//! }
//! ```
//!
//! Certificates are created in order, so the first one is class `1`.
//!
//! A script is a JSON array of steps. Every step names its `caller` and an
//! `op`; `on_behalf_of` turns the step into an operator meta-call:
//!
//! ```json
//! [
//!   { "caller": "alice", "op": "approve_vault" },
//!   { "caller": "alice", "op": "deposit", "class": 1, "assets": 1000 },
//!   { "caller": "bob", "on_behalf_of": "alice", "op": "redeem", "class": 1, "shares": 10 }
//! ]
//! ```
//!
//! Steps run one transaction each. In atomic mode the whole script is one
//! transaction submitted by the first step's caller; steps with a different
//! caller need that submitter approved as their operator.

use std::cell::Cell;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use nova_contracts::{CertificateRegistry, PriceOracle};
use nova_vault::storage::{self, VaultRecord};
use nova_vault::{
    AccountId, CallContext, ClassId, Coordinator, CustodyPolicy, Vault, VaultConfig, VaultError,
};

// ---------------------------------------------------------------------------
// Deployment
// ---------------------------------------------------------------------------

/// A certificate created before the script runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CertificateSpec {
    pub issuer: AccountId,
    pub reference: String,
    pub amount: u64,
    pub holder: AccountId,
}

/// Contents of a deployment file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Deployment {
    /// Reference of the certificate registry asset.
    pub asset: String,
    pub vault: VaultConfig,
    #[serde(default)]
    pub certificates: Vec<CertificateSpec>,
}

// ---------------------------------------------------------------------------
// Steps
// ---------------------------------------------------------------------------

/// One vault operation. Omitted receivers and owners default to the
/// effective caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Operation {
    /// Approve the vault to pull the caller's certificates.
    ApproveVault,
    SetOperator {
        operator: AccountId,
        #[serde(default = "approved_by_default")]
        approved: bool,
    },
    Deposit {
        class: ClassId,
        assets: u64,
        #[serde(default)]
        receiver: Option<AccountId>,
    },
    Mint {
        class: ClassId,
        shares: u64,
        #[serde(default)]
        receiver: Option<AccountId>,
    },
    Withdraw {
        class: ClassId,
        assets: u64,
        #[serde(default)]
        receiver: Option<AccountId>,
        #[serde(default)]
        owner: Option<AccountId>,
    },
    Redeem {
        class: ClassId,
        shares: u64,
        #[serde(default)]
        receiver: Option<AccountId>,
        #[serde(default)]
        owner: Option<AccountId>,
    },
    Transfer {
        to: AccountId,
        amount: u64,
    },
    TransferFrom {
        from: AccountId,
        to: AccountId,
        amount: u64,
    },
    Approve {
        spender: AccountId,
        amount: u64,
    },
    SetSupplyCap {
        cap: u64,
    },
    DisableController,
}

fn approved_by_default() -> bool {
    true
}

impl Operation {
    /// Snake-case name, as written in scripts.
    pub fn name(&self) -> &'static str {
        match self {
            Operation::ApproveVault => "approve_vault",
            Operation::SetOperator { .. } => "set_operator",
            Operation::Deposit { .. } => "deposit",
            Operation::Mint { .. } => "mint",
            Operation::Withdraw { .. } => "withdraw",
            Operation::Redeem { .. } => "redeem",
            Operation::Transfer { .. } => "transfer",
            Operation::TransferFrom { .. } => "transfer_from",
            Operation::Approve { .. } => "approve",
            Operation::SetSupplyCap { .. } => "set_supply_cap",
            Operation::DisableController => "disable_controller",
        }
    }
}

/// One script entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    pub caller: AccountId,
    #[serde(default)]
    pub on_behalf_of: Option<AccountId>,
    #[serde(flatten)]
    pub op: Operation,
}

/// What happened to one step.
#[derive(Debug, Clone, Serialize)]
pub struct StepReport {
    pub step: usize,
    pub op: &'static str,
    pub caller: AccountId,
    /// Shares or assets returned by the operation, when it returns one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// ---------------------------------------------------------------------------
// Deployed vault
// ---------------------------------------------------------------------------

/// A vault, its registry, and the coordinator driving them.
pub struct Deployed<P: CustodyPolicy> {
    coordinator: Coordinator,
    registry: Arc<CertificateRegistry>,
    vault: Arc<Vault<P>>,
}

impl<P: CustodyPolicy> Deployed<P> {
    /// Builds the registry and vault, wires them to a coordinator, and
    /// creates the deployment's certificates.
    pub fn new(deployment: &Deployment) -> Result<Self> {
        let registry = Arc::new(CertificateRegistry::new(deployment.asset.clone()));
        let vault = Arc::new(
            Vault::<P>::new(deployment.vault.clone(), registry.clone())
                .context("failed to build vault")?,
        );

        let coordinator = Coordinator::new();
        registry.register_receiver(vault.id(), &vault);
        coordinator.register_vault(vault.clone());
        coordinator.register_resource(registry.clone());

        for cert in &deployment.certificates {
            let class = registry
                .create(&cert.issuer, &cert.reference, cert.amount, &cert.holder)
                .with_context(|| format!("failed to create certificate {:?}", cert.reference))?;
            info!(class, reference = %cert.reference, holder = %cert.holder, "certificate issued");
        }

        Ok(Self {
            coordinator,
            registry,
            vault,
        })
    }

    pub fn vault(&self) -> &Vault<P> {
        &self.vault
    }

    pub fn registry(&self) -> &CertificateRegistry {
        &self.registry
    }

    /// Runs every step as its own transaction. Failed steps are reported
    /// and skipped.
    pub fn run_each(&self, steps: &[Step]) -> Vec<StepReport> {
        steps
            .iter()
            .enumerate()
            .map(|(i, step)| {
                let result = self
                    .coordinator
                    .call(step.caller.clone(), |ctx| self.run_step(ctx, step));
                if let Err(err) = &result {
                    warn!(step = i, op = step.op.name(), error = %err, "step failed");
                }
                report(i, step, result)
            })
            .collect()
    }

    /// Runs the whole script as one transaction.
    ///
    /// # Errors
    ///
    /// Returns the index of the first failing step and its error. No step is
    /// applied in that case.
    pub fn run_atomic(&self, steps: &[Step]) -> Result<Vec<StepReport>, (usize, VaultError)> {
        let Some(first) = steps.first() else {
            return Ok(Vec::new());
        };
        let current = Cell::new(0);
        let submitter = first.caller.clone();

        self.coordinator
            .call(submitter, |ctx| {
                let mut reports = Vec::with_capacity(steps.len());
                for (i, step) in steps.iter().enumerate() {
                    current.set(i);
                    let value =
                        ctx.call_as(step.caller.clone(), |ctx| self.run_step(ctx, step))?;
                    reports.push(report(i, step, Ok(value)));
                }
                Ok(reports)
            })
            .map_err(|err| (current.get(), err))
    }

    /// Exports the vault's current state.
    pub fn record(&self) -> VaultRecord {
        self.vault.to_record()
    }

    fn run_step(&self, ctx: &CallContext<'_>, step: &Step) -> Result<Option<u64>, VaultError> {
        match &step.on_behalf_of {
            Some(account) => ctx.call_as(account.clone(), |ctx| self.apply(ctx, &step.op)),
            None => self.apply(ctx, &step.op),
        }
    }

    fn apply(&self, ctx: &CallContext<'_>, op: &Operation) -> Result<Option<u64>, VaultError> {
        let me = ctx.caller().clone();
        let or_me = |account: &Option<AccountId>| account.clone().unwrap_or_else(|| me.clone());
        let vault = &self.vault;

        match op {
            Operation::ApproveVault => {
                self.registry.set_approval_for_all(ctx, vault.id(), true);
                Ok(None)
            }
            Operation::SetOperator { operator, approved } => {
                ctx.set_operator(operator, *approved);
                Ok(None)
            }
            Operation::Deposit {
                class,
                assets,
                receiver,
            } => vault.deposit(ctx, *class, *assets, &or_me(receiver)).map(Some),
            Operation::Mint {
                class,
                shares,
                receiver,
            } => vault.mint(ctx, *class, *shares, &or_me(receiver)).map(Some),
            Operation::Withdraw {
                class,
                assets,
                receiver,
                owner,
            } => vault
                .withdraw(ctx, *class, *assets, &or_me(receiver), &or_me(owner))
                .map(Some),
            Operation::Redeem {
                class,
                shares,
                receiver,
                owner,
            } => vault
                .redeem(ctx, *class, *shares, &or_me(receiver), &or_me(owner))
                .map(Some),
            Operation::Transfer { to, amount } => vault.transfer(ctx, to, *amount).map(|()| None),
            Operation::TransferFrom { from, to, amount } => {
                vault.transfer_from(ctx, from, to, *amount).map(|()| None)
            }
            Operation::Approve { spender, amount } => {
                vault.approve(ctx, spender, *amount).map(|()| None)
            }
            Operation::SetSupplyCap { cap } => vault.set_supply_cap(ctx, *cap).map(|()| None),
            Operation::DisableController => vault.disable_controller(ctx).map(|()| None),
        }
    }
}

fn report(i: usize, step: &Step, result: Result<Option<u64>, VaultError>) -> StepReport {
    let (value, error) = match result {
        Ok(value) => (value, None),
        Err(err) => (None, Some(err.to_string())),
    };
    StepReport {
        step: i,
        op: step.op.name(),
        caller: step.caller.clone(),
        value,
        error,
    }
}

// ---------------------------------------------------------------------------
// Summaries
// ---------------------------------------------------------------------------

/// Headline numbers of a persisted vault, plus its state digest.
#[derive(Debug, Clone, Serialize)]
pub struct Summary {
    pub name: String,
    pub symbol: String,
    pub asset: String,
    pub policy: String,
    pub supply_cap: u64,
    pub total_supply: u64,
    pub total_assets: u64,
    pub holders: usize,
    pub digest: String,
    /// `(unit, value)` of the assets under a quote, when requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub valuation: Option<(String, u64)>,
}

impl Summary {
    pub fn of(record: &VaultRecord) -> Result<Self> {
        Ok(Self {
            name: record.name.clone(),
            symbol: record.symbol.clone(),
            asset: record.asset.clone(),
            policy: record.custody.kind().to_string(),
            supply_cap: record.supply_cap,
            total_supply: record.total_supply(),
            total_assets: record.custody.total_assets(),
            holders: record.ledger.balances().count(),
            digest: storage::digest_hex(record).context("failed to digest vault state")?,
            valuation: None,
        })
    }

    /// Values the vault's assets in `unit` through `oracle`.
    pub fn with_valuation(mut self, oracle: &dyn PriceOracle, unit: &str) -> Result<Self> {
        let value = oracle
            .quote(self.total_assets, &self.asset, unit)
            .with_context(|| format!("cannot value {} in {unit}", self.asset))?;
        self.valuation = Some((unit.to_string(), value));
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nova_contracts::FixedRateOracle;
    use nova_vault::{AggregateCustody, PerClassCustody};

    const DEPLOYMENT: &str = r#"{
        "asset": "nova:certificates",
        "vault": {
            "name": "Certificate Vault",
            "symbol": "vCERT",
            "address": "vault",
            "owner": "admin",
            "policy": "per_class"
        },
        "certificates": [
            { "issuer": "registrar", "reference": "ISIN XS01", "amount": 1000, "holder": "alice" },
            { "issuer": "registrar", "reference": "ISIN XS02", "amount": 500, "holder": "bob" }
        ]
    }"#;

    fn deployment() -> Deployment {
        serde_json::from_str(DEPLOYMENT).unwrap()
    }

    fn steps(json: &str) -> Vec<Step> {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn step_parsing_fills_defaults() {
        let parsed = steps(
            r#"[
                { "caller": "alice", "op": "deposit", "class": 1, "assets": 10 },
                { "caller": "bob", "on_behalf_of": "alice", "op": "set_operator", "operator": "carol" }
            ]"#,
        );
        assert_eq!(
            parsed[0].op,
            Operation::Deposit {
                class: 1,
                assets: 10,
                receiver: None
            }
        );
        assert_eq!(parsed[1].on_behalf_of, Some(AccountId::from("alice")));
        assert!(matches!(parsed[1].op, Operation::SetOperator { approved: true, .. }));
    }

    #[test]
    fn each_step_is_its_own_transaction() {
        let deployed = Deployed::<PerClassCustody>::new(&deployment()).unwrap();
        let reports = deployed.run_each(&steps(
            r#"[
                { "caller": "alice", "op": "approve_vault" },
                { "caller": "alice", "op": "deposit", "class": 1, "assets": 1000 },
                { "caller": "bob", "op": "deposit", "class": 2, "assets": 100 },
                { "caller": "alice", "op": "withdraw", "class": 1, "assets": 250 }
            ]"#,
        ));

        assert_eq!(reports.len(), 4);
        assert_eq!(reports[1].value, Some(1_000));
        // bob never approved the vault.
        assert!(reports[2].error.is_some());
        assert_eq!(reports[3].value, Some(250));

        let vault = deployed.vault();
        assert_eq!(vault.total_assets().unwrap(), 750);
        assert_eq!(vault.balance_of(&AccountId::from("alice")).unwrap(), 750);
    }

    #[test]
    fn atomic_script_is_all_or_nothing() {
        let deployed = Deployed::<PerClassCustody>::new(&deployment()).unwrap();
        let script = steps(
            r#"[
                { "caller": "alice", "op": "approve_vault" },
                { "caller": "alice", "op": "deposit", "class": 1, "assets": 1000 },
                { "caller": "alice", "op": "withdraw", "class": 2, "assets": 1 }
            ]"#,
        );

        let (failed_at, err) = deployed.run_atomic(&script).unwrap_err();
        assert_eq!(failed_at, 2);
        assert!(matches!(err, VaultError::InsufficientAssets { .. }));
        assert_eq!(deployed.vault().total_supply().unwrap(), 0);
        assert_eq!(
            deployed.registry().book(),
            Deployed::<PerClassCustody>::new(&deployment())
                .unwrap()
                .registry()
                .book()
        );
    }

    #[test]
    fn atomic_script_needs_operator_approval_for_other_callers() {
        let deployed = Deployed::<PerClassCustody>::new(&deployment()).unwrap();
        let script = steps(
            r#"[
                { "caller": "alice", "op": "approve_vault" },
                { "caller": "bob", "op": "approve_vault" }
            ]"#,
        );
        let (failed_at, err) = deployed.run_atomic(&script).unwrap_err();
        assert_eq!(failed_at, 1);
        assert!(matches!(err, VaultError::Unauthorized { .. }));
    }

    #[test]
    fn policy_must_match_the_vault_type() {
        assert!(Deployed::<AggregateCustody>::new(&deployment()).is_err());
    }

    #[test]
    fn summary_reports_totals_and_valuation() {
        let deployed = Deployed::<PerClassCustody>::new(&deployment()).unwrap();
        deployed.run_each(&steps(
            r#"[
                { "caller": "alice", "op": "approve_vault" },
                { "caller": "alice", "op": "deposit", "class": 1, "assets": 600 }
            ]"#,
        ));

        let oracle = FixedRateOracle::new().with_pair("nova:certificates", "EUR");
        let summary = Summary::of(&deployed.record())
            .unwrap()
            .with_valuation(&oracle, "EUR")
            .unwrap();
        assert_eq!(summary.policy, "per_class");
        assert_eq!(summary.total_supply, 600);
        assert_eq!(summary.holders, 1);
        assert_eq!(summary.digest.len(), 64);
        assert_eq!(summary.valuation, Some(("EUR".to_string(), 600)));

        assert!(Summary::of(&deployed.record())
            .unwrap()
            .with_valuation(&oracle, "USD")
            .is_err());
    }
}
