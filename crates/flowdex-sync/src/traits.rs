//! # Core trait definitions for the indexing framework
//!
//! The framework uses the adapter pattern to abstract its external
//! collaborators, so every component can be exercised against mock
//! implementations:
//!
//! - [`GatewayAdapter`] abstracts the remote chain node's query API.
//! - [`IndexStorage`] abstracts the persistence layer holding the indexed
//!   entity graph. Any transactional store suffices; the in-memory
//!   implementation lives in the `flowdex-mem` crate.
//! - [`ProcessManager`] exposes the lifecycle of locally managed node
//!   processes (the emulator) as a broadcast event stream.
//! - [`ProjectLifecycle`] is implemented by components that hold per-project
//!   state and need symmetric setup/teardown on project switches.
//! - [`SyncEngine`] is the surface the pipeline exposes to callers (UI-facing
//!   controllers, tests).
//!
//! All traits are async-first via `async_trait`; every gateway call and
//! store access is a suspension point, so UI-facing read paths are never
//! blocked by in-progress indexing.

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc};

use crate::{
    Account, AccountKey, AccountStorageDomains, AccountStorageItem, Address, Block, ChainAccount,
    ChainBlock, ChainCollection, ChainTransaction, ChainTransactionStatus, Contract, Event,
    IndexStats, IndexerResult, ProcessEvent, ProcessInfo, ProjectContext, ServiceStatus,
    SyncStatus, Transaction, TransactionStatus,
};

/// Abstracts the remote chain node's query API.
///
/// All operations may fail due to transient network conditions; the
/// pipeline treats every gateway failure as retryable on the next tick,
/// never fatal.
#[async_trait]
pub trait GatewayAdapter: Send + Sync {
    /// Lightweight reachability probe, distinct from per-call errors.
    async fn get_api_status(&self) -> ServiceStatus;

    /// Latest sealed block on the chain. Fails with
    /// [`IndexerError::GatewayUnavailable`](crate::IndexerError::GatewayUnavailable)
    /// if the remote reports a non-online status.
    async fn get_latest_block(&self) -> IndexerResult<ChainBlock>;

    /// Block at the given height. Fails with
    /// [`IndexerError::NotFound`](crate::IndexerError::NotFound) if the
    /// height exceeds the chain head.
    async fn get_block_by_height(&self, height: u64) -> IndexerResult<ChainBlock>;

    async fn get_collection_by_id(&self, id: &str) -> IndexerResult<ChainCollection>;

    async fn get_transaction_by_id(&self, id: &str) -> IndexerResult<ChainTransaction>;

    async fn get_transaction_status_by_id(&self, id: &str)
        -> IndexerResult<ChainTransactionStatus>;

    /// Account state at the latest height. Fails with
    /// [`IndexerError::AccountNotFound`](crate::IndexerError::AccountNotFound)
    /// when the account is not yet created on chain, which callers use as a
    /// control-flow signal.
    async fn get_account(&self, address: &Address) -> IndexerResult<ChainAccount>;

    /// Per-domain storage listing from the chain's storage introspection
    /// endpoint.
    async fn get_account_storage(&self, address: &Address)
        -> IndexerResult<AccountStorageDomains>;

    /// Subscribe to status changes of a transaction. The sender side closes
    /// the channel after delivering a terminal ("sealed" or "expired")
    /// status; dropping the receiver cancels the subscription.
    async fn subscribe_transaction_status(
        &self,
        id: &str,
    ) -> IndexerResult<mpsc::Receiver<ChainTransactionStatus>>;
}

/// Persistence contract for the indexed entity graph.
///
/// Mutations take `&mut self`; the engine serializes writers by wrapping the
/// store in `Arc<RwLock<S>>`. The explicit transaction scope
/// (`begin`/`commit`/`rollback`) covers the atomic
/// block+transactions+events batch; everything else is a best-effort,
/// idempotent upsert that is acceptable to apply redundantly.
#[async_trait]
pub trait IndexStorage: Send + Sync {
    // Blocks
    async fn upsert_block(&mut self, block: Block) -> IndexerResult<()>;
    async fn find_block_by_height(&self, height: u64) -> IndexerResult<Option<Block>>;
    /// Highest stored block, the resume point for range discovery.
    async fn find_last_block(&self) -> IndexerResult<Option<Block>>;

    // Transactions
    async fn upsert_transaction(&mut self, transaction: Transaction) -> IndexerResult<()>;
    /// Applies a status update, enforcing that the execution stage never
    /// regresses. A regressing update is a silent no-op.
    async fn update_transaction_status(
        &mut self,
        id: &str,
        status: TransactionStatus,
    ) -> IndexerResult<()>;
    async fn find_transaction_by_id(&self, id: &str) -> IndexerResult<Option<Transaction>>;

    // Accounts
    async fn upsert_account(&mut self, account: Account) -> IndexerResult<()>;
    /// Updates only the balance, creating a minimal row if the account is
    /// not stored yet.
    async fn update_account_balance(
        &mut self,
        address: &Address,
        balance: u64,
    ) -> IndexerResult<()>;
    /// Touches the update timestamp without changing data, used when a
    /// refetch confirms no change but recency must be recorded.
    async fn mark_account_updated(&mut self, address: &Address) -> IndexerResult<()>;
    async fn find_account_by_address(&self, address: &Address) -> IndexerResult<Option<Account>>;
    async fn find_all_account_addresses(&self) -> IndexerResult<Vec<Address>>;

    // Keys
    async fn replace_account_keys(
        &mut self,
        address: &Address,
        keys: Vec<AccountKey>,
    ) -> IndexerResult<()>;
    async fn find_account_keys(&self, address: &Address) -> IndexerResult<Vec<AccountKey>>;

    // Contracts
    async fn replace_account_contracts(
        &mut self,
        address: &Address,
        contracts: Vec<Contract>,
    ) -> IndexerResult<()>;
    async fn find_account_contracts(&self, address: &Address) -> IndexerResult<Vec<Contract>>;

    // Events
    async fn upsert_event(&mut self, event: Event) -> IndexerResult<()>;
    async fn find_events_by_transaction(
        &self,
        transaction_id: &str,
    ) -> IndexerResult<Vec<Event>>;

    // Account storage
    async fn replace_account_storage(
        &mut self,
        address: &Address,
        items: Vec<AccountStorageItem>,
    ) -> IndexerResult<()>;
    async fn find_account_storage(
        &self,
        address: &Address,
    ) -> IndexerResult<Vec<AccountStorageItem>>;

    // Transactional scope
    async fn begin_transaction(&mut self) -> IndexerResult<()>;
    async fn commit_transaction(&mut self) -> IndexerResult<()>;
    async fn rollback_transaction(&mut self) -> IndexerResult<()>;

    // Administration
    /// Wipes the entire indexed graph. Used on project reset and when the
    /// managed node restarts (chain history starts over from genesis).
    async fn remove_all(&mut self) -> IndexerResult<()>;
    async fn get_stats(&self) -> IndexerResult<IndexStats>;
    async fn is_available(&self) -> bool;
}

/// Identifier of the managed emulator process within the process manager.
pub const EMULATOR_PROCESS_ID: &str = "emulator";

/// Exposes named managed node processes and their state transitions.
///
/// Subscriptions are handle-based: a subscriber owns a broadcast receiver
/// and detaches by dropping it, so attach/detach is idempotent and
/// symmetric across repeated project enter/exit cycles.
#[async_trait]
pub trait ProcessManager: Send + Sync {
    async fn find_process(&self, id: &str) -> Option<ProcessInfo>;

    fn subscribe(&self) -> broadcast::Receiver<ProcessEvent>;
}

/// Lifecycle hooks for components holding per-project state. Entering a
/// context while one is active implies an exit of the previous context.
#[async_trait]
pub trait ProjectLifecycle: Send + Sync {
    async fn on_enter_project_context(&self, project: ProjectContext) -> IndexerResult<()>;

    async fn on_exit_project_context(&self) -> IndexerResult<()>;
}

/// The pipeline surface exposed to collaborators (controllers, tests).
#[async_trait]
pub trait SyncEngine: Send + Sync {
    async fn get_status(&self) -> IndexerResult<SyncStatus>;

    /// Number of blocks between the last stored height and the chain head.
    async fn get_total_blocks_to_process(&self) -> IndexerResult<u64>;

    /// Runs one processing tick to completion.
    async fn process_single_tick(&self) -> IndexerResult<()>;

    async fn remove_all_indexed_data(&self) -> IndexerResult<()>;

    async fn get_index_stats(&self) -> IndexerResult<IndexStats>;
}
