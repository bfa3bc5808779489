//! Bootstrap (well-known account) processing tests.

use super::*;
use flowdex_sync::{IndexStorage, ProcessState, BOOTSTRAP_BLOCK_ID};

#[tokio::test]
async fn creates_four_default_accounts_with_synthetic_block() {
    let harness = TestHarness::new().await;
    seed_well_known_accounts(&harness.gateway);
    seed_empty_block(&harness.gateway, 0);

    harness.engine.process_single_tick().await.unwrap();

    let stats = harness.stats().await;
    assert_eq!(stats.account_count, 4);
    // The bootstrap accounts are created outside normal block history; no
    // chain block is stored for them.
    assert_eq!(stats.block_count, 0);

    let storage = harness.engine.storage().read().await;
    for raw in [
        "0xf8d6e0586b0a20c7",
        "0xee82856bf20e2aa6",
        "0x0ae53cb6e3f42a79",
        "0xe5a8b7f23e8b548f",
    ] {
        let account = storage
            .find_account_by_address(&address(raw))
            .await
            .unwrap()
            .unwrap_or_else(|| panic!("missing well-known account {raw}"));
        assert!(account.is_default_account);
        assert_eq!(account.block_id, BOOTSTRAP_BLOCK_ID);
        let keys = storage.find_account_keys(&address(raw)).await.unwrap();
        assert!(!keys.is_empty());
    }
}

#[tokio::test]
async fn bootstrap_is_skipped_once_service_account_is_processed() {
    let harness = TestHarness::new().await;
    seed_well_known_accounts(&harness.gateway);
    seed_empty_block(&harness.gateway, 0);

    harness.engine.process_single_tick().await.unwrap();
    assert_eq!(harness.stats().await.account_count, 4);

    // Removing the gateway-side accounts would make a second bootstrap
    // attempt fail, so a clean second tick proves it was skipped.
    for raw in [
        "0xf8d6e0586b0a20c7",
        "0xee82856bf20e2aa6",
        "0x0ae53cb6e3f42a79",
        "0xe5a8b7f23e8b548f",
    ] {
        harness.gateway.remove_account(&address(raw));
    }
    harness.engine.process_single_tick().await.unwrap();
    assert_eq!(harness.stats().await.account_count, 4);
}

#[tokio::test]
async fn bootstrap_probes_monotonic_scheme_as_well() {
    let harness = TestHarness::new().await;
    // This chain uses monotonic addressing; only those accounts exist.
    for raw in [
        "0x0000000000000001",
        "0x0000000000000002",
        "0x0000000000000003",
        "0x0000000000000004",
    ] {
        harness.gateway.add_account(make_chain_account(raw, 1_000));
    }
    seed_empty_block(&harness.gateway, 0);

    harness.engine.process_single_tick().await.unwrap();

    let storage = harness.engine.storage().read().await;
    let account = storage
        .find_account_by_address(&address("0x0000000000000001"))
        .await
        .unwrap()
        .unwrap();
    assert!(account.is_default_account);
    assert_eq!(account.block_id, BOOTSTRAP_BLOCK_ID);
}

#[tokio::test]
async fn managed_emulator_bootstraps_configured_scheme_only() {
    let harness = TestHarness::new().await;
    harness
        .processes
        .set_process_state("emulator", ProcessState::Running);
    // Both address sets exist on chain, but the project says the managed
    // emulator uses non-monotonic addressing.
    seed_well_known_accounts(&harness.gateway);
    for raw in [
        "0x0000000000000001",
        "0x0000000000000002",
        "0x0000000000000003",
        "0x0000000000000004",
    ] {
        harness.gateway.add_account(make_chain_account(raw, 1_000));
    }
    seed_empty_block(&harness.gateway, 0);

    harness.engine.process_single_tick().await.unwrap();

    let stats = harness.stats().await;
    assert_eq!(stats.account_count, 4);
    let storage = harness.engine.storage().read().await;
    assert!(storage
        .find_account_by_address(&address("0xf8d6e0586b0a20c7"))
        .await
        .unwrap()
        .is_some());
    assert!(storage
        .find_account_by_address(&address("0x0000000000000001"))
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn bootstrap_is_all_or_nothing() {
    let harness = TestHarness::new().await;
    // Only the service account exists; the other three cannot be fetched.
    harness
        .gateway
        .add_account(make_chain_account("0xf8d6e0586b0a20c7", 1_000));
    seed_empty_block(&harness.gateway, 0);

    harness.engine.process_single_tick().await.unwrap();

    assert_eq!(harness.stats().await.account_count, 0);
}
