//! Lifecycle coordination tests: scheduler start/stop on project
//! enter/exit, reindex on emulator restart.

use super::*;
use flowdex_sync::{
    Account, CoordinatorState, IndexStorage, LifecycleCoordinator, ProcessState, ProjectLifecycle,
    SyncConfig,
};
use std::time::Duration;

fn slow_config() -> SyncConfig {
    SyncConfig {
        processing_interval: Duration::from_secs(60),
        ..SyncConfig::default()
    }
}

fn fast_config() -> SyncConfig {
    SyncConfig {
        processing_interval: Duration::from_millis(25),
        ..SyncConfig::default()
    }
}

#[tokio::test]
async fn emulator_restart_wipes_indexed_data() {
    let harness = TestHarness::with_config(test_project(1), slow_config()).await;
    seed_empty_block(&harness.gateway, 1);

    let coordinator = LifecycleCoordinator::new(
        harness.engine.clone(),
        harness.engine.processes().clone(),
    );
    coordinator
        .on_enter_project_context(test_project(1))
        .await
        .unwrap();
    assert_eq!(coordinator.state().await, CoordinatorState::Active);

    // The immediate first tick indexes the seeded block.
    assert!(
        wait_until(
            || async { harness.stats().await.block_count == 1 },
            Duration::from_secs(2),
        )
        .await
    );

    // Chain history starts over when the emulator (re)starts.
    harness
        .processes
        .set_process_state("emulator", ProcessState::Running);
    assert!(
        wait_until(
            || async { harness.stats().await.block_count == 0 },
            Duration::from_secs(2),
        )
        .await
    );

    coordinator.on_exit_project_context().await.unwrap();
    assert_eq!(coordinator.state().await, CoordinatorState::Inactive);
}

#[tokio::test]
async fn exit_detaches_process_listener() {
    let harness = TestHarness::with_config(test_project(1), slow_config()).await;
    let coordinator = LifecycleCoordinator::new(
        harness.engine.clone(),
        harness.engine.processes().clone(),
    );
    coordinator
        .on_enter_project_context(test_project(1))
        .await
        .unwrap();
    coordinator.on_exit_project_context().await.unwrap();

    // Plant a record, then fire a restart notification after exit: the
    // detached coordinator must not wipe anything.
    {
        let mut storage = harness.engine.storage().write().await;
        storage
            .upsert_account(Account::create_default(address("0x01")))
            .await
            .unwrap();
    }
    harness
        .processes
        .set_process_state("emulator", ProcessState::Stopped);
    harness
        .processes
        .set_process_state("emulator", ProcessState::Running);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(harness.stats().await.account_count, 1);
}

#[tokio::test]
async fn repeated_enter_exit_cycles_are_symmetric() {
    let harness = TestHarness::with_config(test_project(1), slow_config()).await;
    let coordinator = LifecycleCoordinator::new(
        harness.engine.clone(),
        harness.engine.processes().clone(),
    );

    // Exiting while inactive is a no-op.
    coordinator.on_exit_project_context().await.unwrap();
    assert_eq!(coordinator.state().await, CoordinatorState::Inactive);

    for _ in 0..3 {
        coordinator
            .on_enter_project_context(test_project(1))
            .await
            .unwrap();
        assert_eq!(coordinator.state().await, CoordinatorState::Active);
        coordinator.on_exit_project_context().await.unwrap();
        assert_eq!(coordinator.state().await, CoordinatorState::Inactive);
    }

    // Entering twice in a row implies an exit in between; after the final
    // exit a restart notification must find no listener.
    coordinator
        .on_enter_project_context(test_project(1))
        .await
        .unwrap();
    coordinator
        .on_enter_project_context(test_project(1))
        .await
        .unwrap();
    coordinator.on_exit_project_context().await.unwrap();

    {
        let mut storage = harness.engine.storage().write().await;
        storage
            .upsert_account(Account::create_default(address("0x02")))
            .await
            .unwrap();
    }
    harness
        .processes
        .set_process_state("emulator", ProcessState::Running);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(harness.stats().await.account_count, 1);
}

#[tokio::test]
async fn scheduler_keeps_indexing_new_blocks() {
    let harness = TestHarness::with_config(test_project(1), fast_config()).await;
    for height in 1..=3 {
        seed_empty_block(&harness.gateway, height);
    }

    let coordinator = LifecycleCoordinator::new(
        harness.engine.clone(),
        harness.engine.processes().clone(),
    );
    coordinator
        .on_enter_project_context(test_project(1))
        .await
        .unwrap();

    assert!(
        wait_until(
            || async { harness.stats().await.block_count == 3 },
            Duration::from_secs(2),
        )
        .await
    );

    // New blocks arriving later are picked up by subsequent ticks.
    for height in 4..=5 {
        seed_empty_block(&harness.gateway, height);
    }
    assert!(
        wait_until(
            || async { harness.stats().await.block_count == 5 },
            Duration::from_secs(2),
        )
        .await
    );

    coordinator.on_exit_project_context().await.unwrap();

    // Once stopped, newly seeded blocks are no longer indexed.
    seed_empty_block(&harness.gateway, 6);
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(harness.stats().await.block_count, 5);
}

#[tokio::test]
async fn activation_fails_for_unsupported_addressing_configuration() {
    let harness = TestHarness::with_config(test_project(1), slow_config()).await;
    let coordinator = LifecycleCoordinator::new(
        harness.engine.clone(),
        harness.engine.processes().clone(),
    );

    let mut project = test_project(1);
    project.chain = flowdex_sync::ChainId::Mainnet;
    let err = coordinator
        .on_enter_project_context(project)
        .await
        .unwrap_err();
    assert!(matches!(err, flowdex_sync::IndexerError::Config(_)));
    assert_eq!(coordinator.state().await, CoordinatorState::Inactive);
}
