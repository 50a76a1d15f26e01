//! Integration tests for a per-class vault over the certificate registry.
//!
//! Certificates are created by the registry, deposited into the vault, and
//! valued through the 1:1 oracle. Failed transactions must roll back the
//! registry together with the vault.

use std::sync::Arc;

use nova_contracts::{CertificateRegistry, FixedRateOracle, PriceOracle};
use nova_vault::{
    AccountId, Asset, Coordinator, CustodyKind, PerClassVault, VaultConfig, VaultError,
};

fn acct(id: &str) -> AccountId {
    AccountId::from(id)
}

/// Registry, vault, and coordinator wired together, with alice and bob each
/// holding their own certificate and having approved the vault.
#[allow(clippy::type_complexity)]
fn setup() -> (Coordinator, Arc<CertificateRegistry>, Arc<PerClassVault>, u64, u64) {
    let registry = Arc::new(CertificateRegistry::new("nova:certificates"));
    let config = VaultConfig::new(
        "Certificate Vault",
        "vCERT",
        "vault",
        "admin",
        CustodyKind::PerClass,
    );
    let vault = Arc::new(PerClassVault::new(config, registry.clone()).expect("vault"));
    let coordinator = Coordinator::new();
    registry.register_receiver(vault.id(), &vault);
    coordinator.register_vault(vault.clone());
    coordinator.register_resource(registry.clone());

    let issuer = acct("registrar");
    let alice_class = registry
        .create(&issuer, "ISIN XS0000000001", 1_000, &acct("alice"))
        .unwrap();
    let bob_class = registry
        .create(&issuer, "ISIN XS0000000002", 1_000, &acct("bob"))
        .unwrap();

    for who in ["alice", "bob"] {
        let registry = registry.clone();
        let vault_id = vault.id().clone();
        coordinator
            .call(who, move |ctx| {
                registry.set_approval_for_all(ctx, &vault_id, true);
                Ok(())
            })
            .unwrap();
    }

    (coordinator, registry, vault, alice_class, bob_class)
}

#[test]
fn certificates_deposit_into_separate_classes() {
    let (coordinator, registry, vault, alice_class, bob_class) = setup();

    coordinator
        .call("alice", |ctx| vault.deposit(ctx, alice_class, 1_000, &acct("alice")))
        .unwrap();
    coordinator
        .call("bob", |ctx| vault.deposit(ctx, bob_class, 400, &acct("bob")))
        .unwrap();

    assert_eq!(vault.class_total(alice_class).unwrap(), Some(1_000));
    assert_eq!(vault.class_total(bob_class).unwrap(), Some(400));
    assert_eq!(vault.total_assets().unwrap(), 1_400);
    assert_eq!(registry.balance_of(vault.id(), alice_class), 1_000);
    assert_eq!(
        registry.reference_of(bob_class).as_deref(),
        Some("ISIN XS0000000002")
    );
}

#[test]
fn holders_cannot_take_each_others_certificates() {
    let (coordinator, registry, vault, alice_class, bob_class) = setup();
    coordinator
        .call("alice", |ctx| vault.deposit(ctx, alice_class, 1_000, &acct("alice")))
        .unwrap();
    coordinator
        .call("bob", |ctx| vault.deposit(ctx, bob_class, 1_000, &acct("bob")))
        .unwrap();

    let bob = acct("bob");
    let result = coordinator.call("bob", |ctx| vault.withdraw(ctx, alice_class, 1, &bob, &bob));
    assert!(matches!(result, Err(VaultError::InsufficientDeposits { .. })));
    assert_eq!(registry.balance_of(&bob, alice_class), 0);
    assert_eq!(vault.balance_of(&bob).unwrap(), 1_000);

    let burned = coordinator
        .call("bob", |ctx| vault.withdraw(ctx, bob_class, 600, &bob, &bob))
        .unwrap();
    assert_eq!(burned, 600);
    assert_eq!(registry.balance_of(&bob, bob_class), 600);
}

#[test]
fn failed_transaction_unwinds_certificate_creation() {
    let (coordinator, registry, vault, _, _) = setup();
    let before = registry.certificate_count();

    let result = coordinator.call("carol", |ctx| {
        let class = registry
            .create(ctx.caller(), "late issue", 50, ctx.caller())
            .expect("create");
        // carol never approved the vault.
        vault.deposit(ctx, class, 50, ctx.caller())
    });

    assert!(matches!(result, Err(VaultError::Unauthorized { .. })));
    assert_eq!(registry.certificate_count(), before);
    assert_eq!(vault.total_supply().unwrap(), 0);
}

#[test]
fn oracle_values_vault_holdings_one_to_one() {
    let (coordinator, registry, vault, alice_class, _) = setup();
    coordinator
        .call("alice", |ctx| vault.deposit(ctx, alice_class, 750, &acct("alice")))
        .unwrap();

    let oracle = FixedRateOracle::new().with_pair(registry.reference(), "EUR");
    let assets = vault.convert_to_assets(vault.balance_of(&acct("alice")).unwrap()).unwrap();
    assert_eq!(oracle.quote(assets, vault.asset_reference(), "EUR").unwrap(), 750);
    assert!(oracle.quote(assets, vault.asset_reference(), "USD").is_err());
}
