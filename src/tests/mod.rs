//! Test suite for the flowdex processing pipeline.
//!
//! Each module drives the real engine (pipeline, interpreter, fetcher,
//! lifecycle coordinator) against a scripted [`MockGateway`], a
//! [`MockProcessManager`], and the in-memory store.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};

use flowdex_mem::MemoryIndexStorage;
use flowdex_sync::{
    Address, ChainAccount, ChainBlock, ChainCollection, ChainEvent, ChainId, ChainKey,
    ChainTransaction, ChainTransactionStatus, CollectionGuarantee, ExecutionStage, FlowdexSync,
    HashAlgorithm, IndexStats, MockGateway, MockProcessManager, ProjectContext, ProposalKey,
    SignatureAlgorithm, SyncConfig, SyncEngine,
};

pub mod bootstrap_test;
pub mod lifecycle_test;
pub mod status_test;

pub type TestEngine = FlowdexSync<MockGateway, MemoryIndexStorage, MockProcessManager>;

/// A fully wired engine over mock collaborators, plus direct handles to
/// the mocks for scripting.
pub struct TestHarness {
    pub gateway: MockGateway,
    pub processes: MockProcessManager,
    pub engine: Arc<TestEngine>,
}

impl TestHarness {
    pub async fn new() -> Self {
        Self::with_config(test_project(1), SyncConfig::default()).await
    }

    pub async fn with_start_height(start_block_height: u64) -> Self {
        Self::with_config(test_project(start_block_height), SyncConfig::default()).await
    }

    pub async fn with_config(project: ProjectContext, config: SyncConfig) -> Self {
        init_logging();
        let gateway = MockGateway::new();
        let processes = MockProcessManager::new();
        let engine = Arc::new(FlowdexSync::new(
            gateway.clone(),
            MemoryIndexStorage::new(),
            processes.clone(),
            config,
        ));
        engine.set_context(project).await;
        Self {
            gateway,
            processes,
            engine,
        }
    }

    pub async fn stats(&self) -> IndexStats {
        self.engine.get_index_stats().await.unwrap()
    }
}

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn test_project(start_block_height: u64) -> ProjectContext {
    ProjectContext {
        name: "test-project".to_string(),
        gateway_url: "mock://localhost".to_string(),
        chain: ChainId::Emulator,
        start_block_height,
        use_monotonic_addresses: false,
    }
}

pub fn address(raw: &str) -> Address {
    Address::parse(raw).unwrap()
}

pub fn make_block(height: u64, collection_ids: &[&str]) -> ChainBlock {
    ChainBlock {
        id: format!("block-{height}"),
        parent_id: format!("block-{}", height.saturating_sub(1)),
        height,
        timestamp: 1_700_000_000_000 + height * 1_000,
        collection_guarantees: collection_ids
            .iter()
            .map(|id| CollectionGuarantee {
                collection_id: id.to_string(),
            })
            .collect(),
        block_seals: vec![],
        signatures: vec![],
    }
}

pub fn make_transaction(id: &str, payer: &str) -> ChainTransaction {
    ChainTransaction {
        id: id.to_string(),
        script: "transaction { execute {} }".to_string(),
        args: vec![],
        reference_block_id: "block-0".to_string(),
        gas_limit: 9999,
        payer: address(payer),
        authorizers: vec![address(payer)],
        proposal_key: ProposalKey {
            address: address(payer),
            key_id: 0,
            sequence_number: 0,
        },
        envelope_signatures: vec![],
        payload_signatures: vec![],
    }
}

pub fn make_status(stage: ExecutionStage, events: Vec<ChainEvent>) -> ChainTransactionStatus {
    ChainTransactionStatus {
        execution: stage,
        grpc_status: 0,
        error_message: String::new(),
        events,
    }
}

pub fn make_event(event_type: &str, event_index: u32, data: Value) -> ChainEvent {
    ChainEvent {
        event_type: event_type.to_string(),
        transaction_index: 0,
        event_index,
        data,
    }
}

pub fn make_chain_account(raw_address: &str, balance: u64) -> ChainAccount {
    ChainAccount {
        address: address(raw_address),
        balance,
        code: String::new(),
        contracts: Default::default(),
        keys: vec![ChainKey {
            index: 0,
            public_key: format!("pub-{raw_address}"),
            sign_algo: SignatureAlgorithm::EcdsaP256,
            hash_algo: HashAlgorithm::Sha3_256,
            weight: 1000,
            sequence_number: 0,
            revoked: false,
        }],
    }
}

/// Seeds a block whose single collection holds the given transactions.
pub fn seed_block_with_transactions(
    gateway: &MockGateway,
    height: u64,
    transactions: Vec<(ChainTransaction, ChainTransactionStatus)>,
) {
    let collection_id = format!("col-{height}");
    gateway.add_collection(ChainCollection {
        id: collection_id.clone(),
        transaction_ids: transactions.iter().map(|(tx, _)| tx.id.clone()).collect(),
    });
    gateway.add_block(make_block(height, &[&collection_id]));
    for (transaction, status) in transactions {
        gateway.add_transaction(transaction, status);
    }
}

pub fn seed_empty_block(gateway: &MockGateway, height: u64) {
    gateway.add_block(make_block(height, &[]));
}

/// Seeds the four non-monotonic well-known accounts on the gateway, so
/// bootstrap processing can resolve them.
pub fn seed_well_known_accounts(gateway: &MockGateway) {
    for raw in [
        "0xf8d6e0586b0a20c7",
        "0xee82856bf20e2aa6",
        "0x0ae53cb6e3f42a79",
        "0xe5a8b7f23e8b548f",
    ] {
        gateway.add_account(make_chain_account(raw, 1_000_000));
    }
}

pub fn account_created_event(event_index: u32, raw_address: &str) -> ChainEvent {
    make_event(
        "flow.AccountCreated",
        event_index,
        json!({ "address": raw_address }),
    )
}

/// Polls a condition until it holds or the timeout elapses.
pub async fn wait_until<F, Fut>(mut condition: F, timeout: Duration) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
