//! Transaction sealing subscription tests.

use super::*;
use flowdex_sync::{ExecutionStage, IndexStorage};
use std::time::Duration;

async fn stored_stage(harness: &TestHarness, id: &str) -> Option<ExecutionStage> {
    let storage = harness.engine.storage().read().await;
    storage
        .find_transaction_by_id(id)
        .await
        .unwrap()
        .map(|tx| tx.status.execution)
}

#[tokio::test]
async fn sealing_subscription_updates_stored_status() {
    let harness = TestHarness::new().await;
    let tx = make_transaction("tx1", "0x01");
    let status = make_status(ExecutionStage::Pending, vec![]);
    seed_block_with_transactions(&harness.gateway, 1, vec![(tx, status)]);

    harness.engine.process_single_tick().await.unwrap();
    assert_eq!(
        stored_stage(&harness, "tx1").await,
        Some(ExecutionStage::Pending)
    );

    // The subscription task registers in the background.
    assert!(
        wait_until(
            || async { harness.gateway.subscription_count("tx1") == 1 },
            Duration::from_secs(2),
        )
        .await
    );

    harness
        .gateway
        .push_status_update("tx1", make_status(ExecutionStage::Executed, vec![]));
    assert!(
        wait_until(
            || async { stored_stage(&harness, "tx1").await == Some(ExecutionStage::Executed) },
            Duration::from_secs(2),
        )
        .await
    );

    harness
        .gateway
        .push_status_update("tx1", make_status(ExecutionStage::Sealed, vec![]));
    assert!(
        wait_until(
            || async { stored_stage(&harness, "tx1").await == Some(ExecutionStage::Sealed) },
            Duration::from_secs(2),
        )
        .await
    );
    // Terminal status closes the subscription.
    assert_eq!(harness.gateway.subscription_count("tx1"), 0);
}

#[tokio::test]
async fn stored_status_never_regresses() {
    let harness = TestHarness::new().await;
    let tx = make_transaction("tx1", "0x01");
    let status = make_status(ExecutionStage::Executed, vec![]);
    seed_block_with_transactions(&harness.gateway, 1, vec![(tx, status)]);

    harness.engine.process_single_tick().await.unwrap();
    assert!(
        wait_until(
            || async { harness.gateway.subscription_count("tx1") == 1 },
            Duration::from_secs(2),
        )
        .await
    );

    // A stale update must not move the stage backwards.
    harness
        .gateway
        .push_status_update("tx1", make_status(ExecutionStage::Pending, vec![]));
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(
        stored_stage(&harness, "tx1").await,
        Some(ExecutionStage::Executed)
    );

    harness
        .gateway
        .push_status_update("tx1", make_status(ExecutionStage::Sealed, vec![]));
    assert!(
        wait_until(
            || async { stored_stage(&harness, "tx1").await == Some(ExecutionStage::Sealed) },
            Duration::from_secs(2),
        )
        .await
    );
}

#[tokio::test]
async fn expired_transaction_terminates_subscription() {
    let harness = TestHarness::new().await;
    let tx = make_transaction("tx1", "0x01");
    let status = make_status(ExecutionStage::Pending, vec![]);
    seed_block_with_transactions(&harness.gateway, 1, vec![(tx, status)]);

    harness.engine.process_single_tick().await.unwrap();
    assert!(
        wait_until(
            || async { harness.gateway.subscription_count("tx1") == 1 },
            Duration::from_secs(2),
        )
        .await
    );

    harness
        .gateway
        .push_status_update("tx1", make_status(ExecutionStage::Expired, vec![]));
    assert!(
        wait_until(
            || async { stored_stage(&harness, "tx1").await == Some(ExecutionStage::Expired) },
            Duration::from_secs(2),
        )
        .await
    );
    assert_eq!(harness.gateway.subscription_count("tx1"), 0);
}
