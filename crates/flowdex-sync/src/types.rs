//! Common types for flowdex-sync

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{IndexerError, IndexerResult};

/// A chain-native account address, stored in canonical prefixed form
/// (`0x` + lowercase hex). No length normalization is applied: `0x01` and
/// `0x0000000000000001` are distinct addresses, matching how the chain
/// renders short-form and generator-form addresses.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(String);

impl Address {
    pub fn parse(raw: &str) -> IndexerResult<Self> {
        let stripped = raw.strip_prefix("0x").unwrap_or(raw).to_lowercase();
        if stripped.is_empty() {
            return Err(IndexerError::Serialization("empty address".to_string()));
        }
        hex::decode(&stripped)
            .map_err(|e| IndexerError::Serialization(format!("malformed address {raw:?}: {e}")))?;
        Ok(Self(format!("0x{stripped}")))
    }

    pub fn prefixed(&self) -> &str {
        &self.0
    }

    pub fn non_prefixed(&self) -> &str {
        &self.0[2..]
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Address {
    type Err = IndexerError;

    fn from_str(s: &str) -> IndexerResult<Self> {
        Self::parse(s)
    }
}

/// Gateway online/offline status, distinct from per-call errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceStatus {
    Online,
    Offline,
}

/// State of an externally managed node process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessState {
    Stopped,
    Starting,
    Running,
    Errored,
}

/// A managed process as reported by the process manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessInfo {
    pub id: String,
    pub state: ProcessState,
}

impl ProcessInfo {
    pub fn is_running(&self) -> bool {
        self.state == ProcessState::Running
    }
}

/// Process manager notification.
#[derive(Debug, Clone)]
pub enum ProcessEvent {
    Added(ProcessInfo),
    Updated(ProcessInfo),
}

impl ProcessEvent {
    pub fn info(&self) -> &ProcessInfo {
        match self {
            ProcessEvent::Added(info) | ProcessEvent::Updated(info) => info,
        }
    }
}

/// Chain identifier; seeds well-known address resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChainId {
    Emulator,
    Testnet,
    Mainnet,
}

/// Execution stage of a transaction. The stored stage only ever moves
/// forward through the ordered run, or jumps to `Expired`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStage {
    Unknown,
    Pending,
    Finalized,
    Executed,
    Sealed,
    Expired,
}

impl ExecutionStage {
    fn rank(self) -> u8 {
        match self {
            ExecutionStage::Unknown => 0,
            ExecutionStage::Pending => 1,
            ExecutionStage::Finalized => 2,
            ExecutionStage::Executed => 3,
            ExecutionStage::Sealed => 4,
            ExecutionStage::Expired => 5,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, ExecutionStage::Sealed | ExecutionStage::Expired)
    }

    /// Whether a stored stage may be replaced with `next`.
    pub fn can_advance_to(self, next: ExecutionStage) -> bool {
        if self.is_terminal() {
            return false;
        }
        next == ExecutionStage::Expired || next.rank() > self.rank()
    }
}

/// Stored status sub-record of a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionStatus {
    pub execution: ExecutionStage,
    pub grpc_status: i32,
    pub error_message: String,
}

/// A collection reference inside a block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionGuarantee {
    pub collection_id: String,
}

/// A block as returned by the gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainBlock {
    pub id: String,
    pub parent_id: String,
    pub height: u64,
    /// Unix timestamp in milliseconds.
    pub timestamp: u64,
    pub collection_guarantees: Vec<CollectionGuarantee>,
    pub block_seals: Vec<Value>,
    pub signatures: Vec<Value>,
}

/// A collection as returned by the gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainCollection {
    pub id: String,
    pub transaction_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposalKey {
    pub address: Address,
    pub key_id: u32,
    pub sequence_number: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignableObject {
    pub address: Address,
    pub key_id: u32,
    pub signature: String,
}

/// A transaction as returned by the gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainTransaction {
    pub id: String,
    pub script: String,
    pub args: Vec<Value>,
    pub reference_block_id: String,
    pub gas_limit: u64,
    pub payer: Address,
    pub authorizers: Vec<Address>,
    pub proposal_key: ProposalKey,
    pub envelope_signatures: Vec<SignableObject>,
    pub payload_signatures: Vec<SignableObject>,
}

/// Transaction status as returned by the gateway, including the events
/// emitted by the transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainTransactionStatus {
    pub execution: ExecutionStage,
    pub grpc_status: i32,
    pub error_message: String,
    pub events: Vec<ChainEvent>,
}

impl ChainTransactionStatus {
    pub fn to_status(&self) -> TransactionStatus {
        TransactionStatus {
            execution: self.execution,
            grpc_status: self.grpc_status,
            error_message: self.error_message.clone(),
        }
    }
}

/// An event as returned by the gateway, scoped to its transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainEvent {
    pub event_type: String,
    pub transaction_index: u32,
    pub event_index: u32,
    pub data: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignatureAlgorithm {
    Unknown,
    EcdsaP256,
    EcdsaSecp256k1,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HashAlgorithm {
    Unknown,
    Sha2_256,
    Sha3_256,
}

/// An account key as returned by the gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainKey {
    pub index: u32,
    pub public_key: String,
    pub sign_algo: SignatureAlgorithm,
    pub hash_algo: HashAlgorithm,
    pub weight: u32,
    pub sequence_number: u64,
    pub revoked: bool,
}

/// An account as returned by the gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainAccount {
    pub address: Address,
    pub balance: u64,
    pub code: String,
    pub contracts: HashMap<String, String>,
    pub keys: Vec<ChainKey>,
}

/// Domain of an account storage path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageDomain {
    Private,
    Public,
    Storage,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountStorageItem {
    pub account_address: Address,
    pub path_identifier: String,
    pub domain: StorageDomain,
    pub data: Value,
}

/// Per-domain storage listing as returned by the gateway's storage
/// introspection endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccountStorageDomains {
    pub private_items: Vec<AccountStorageItem>,
    pub public_items: Vec<AccountStorageItem>,
    pub storage_items: Vec<AccountStorageItem>,
}

impl AccountStorageDomains {
    /// Flattened merge of all domains, the form the store keeps.
    pub fn into_flattened(self) -> Vec<AccountStorageItem> {
        let mut items = self.private_items;
        items.extend(self.public_items);
        items.extend(self.storage_items);
        items
    }
}

/// Stored block entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    pub id: String,
    pub parent_id: String,
    pub height: u64,
    pub timestamp: u64,
    pub collection_guarantees: Vec<CollectionGuarantee>,
    pub block_seals: Vec<Value>,
    pub signatures: Vec<Value>,
    pub created_at: SystemTime,
    pub updated_at: SystemTime,
}

impl Block {
    pub fn from_chain(block: &ChainBlock) -> Self {
        let now = SystemTime::now();
        Self {
            id: block.id.clone(),
            parent_id: block.parent_id.clone(),
            height: block.height,
            timestamp: block.timestamp,
            collection_guarantees: block.collection_guarantees.clone(),
            block_seals: block.block_seals.clone(),
            signatures: block.signatures.clone(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Stored transaction entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: String,
    pub block_id: String,
    pub reference_block_id: String,
    pub script: String,
    pub args: Vec<Value>,
    pub gas_limit: u64,
    pub payer: Address,
    pub authorizers: Vec<Address>,
    pub proposal_key: ProposalKey,
    pub envelope_signatures: Vec<SignableObject>,
    pub payload_signatures: Vec<SignableObject>,
    pub status: TransactionStatus,
    pub created_at: SystemTime,
    pub updated_at: SystemTime,
}

impl Transaction {
    pub fn from_chain(
        block: &ChainBlock,
        transaction: &ChainTransaction,
        status: &ChainTransactionStatus,
    ) -> Self {
        let now = SystemTime::now();
        Self {
            id: transaction.id.clone(),
            block_id: block.id.clone(),
            reference_block_id: transaction.reference_block_id.clone(),
            script: transaction.script.clone(),
            args: transaction.args.clone(),
            gas_limit: transaction.gas_limit,
            payer: transaction.payer.clone(),
            authorizers: transaction.authorizers.clone(),
            proposal_key: transaction.proposal_key.clone(),
            envelope_signatures: transaction.envelope_signatures.clone(),
            payload_signatures: transaction.payload_signatures.clone(),
            status: status.to_status(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Stored account entity. Keys and contracts live in their own stores.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub address: Address,
    pub balance: u64,
    pub code: String,
    pub is_default_account: bool,
    pub block_id: String,
    pub created_at: SystemTime,
    pub updated_at: SystemTime,
}

impl Account {
    /// A minimal account row, used when only part of the account state is
    /// known (e.g. a balance update arriving before the full account fetch).
    pub fn create_default(address: Address) -> Self {
        let now = SystemTime::now();
        Self {
            address,
            balance: 0,
            code: String::new(),
            is_default_account: false,
            block_id: String::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn from_chain(account: &ChainAccount, block_id: &str, is_default_account: bool) -> Self {
        let now = SystemTime::now();
        Self {
            address: account.address.clone(),
            balance: account.balance,
            code: account.code.clone(),
            is_default_account,
            block_id: block_id.to_string(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Stored account key, composite-keyed by (account address, key index).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountKey {
    pub account_address: Address,
    pub index: u32,
    pub public_key: String,
    pub sign_algo: SignatureAlgorithm,
    pub hash_algo: HashAlgorithm,
    pub weight: u32,
    pub sequence_number: u64,
    pub revoked: bool,
    /// Only set for keys this tool generated and manages itself.
    pub private_key: Option<String>,
    pub block_id: String,
}

impl AccountKey {
    pub fn from_chain(address: &Address, key: &ChainKey, block_id: &str) -> Self {
        Self {
            account_address: address.clone(),
            index: key.index,
            public_key: key.public_key.clone(),
            sign_algo: key.sign_algo,
            hash_algo: key.hash_algo,
            weight: key.weight,
            sequence_number: key.sequence_number,
            revoked: key.revoked,
            private_key: None,
            block_id: block_id.to_string(),
        }
    }
}

/// Stored contract, composite-keyed by (account address, name).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contract {
    pub account_address: Address,
    pub name: String,
    pub code: String,
    pub block_id: String,
}

/// Stored event, identified by (transaction id, event index). The block id
/// and transaction id are denormalized onto each event when block data is
/// fetched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub transaction_id: String,
    pub event_index: u32,
    pub event_type: String,
    pub block_id: String,
    pub transaction_index: u32,
    pub data: Value,
    pub created_at: SystemTime,
}

impl Event {
    pub fn from_chain(event: &ChainEvent, transaction_id: &str, block_id: &str) -> Self {
        Self {
            transaction_id: transaction_id.to_string(),
            event_index: event.event_index,
            event_type: event.event_type.clone(),
            block_id: block_id.to_string(),
            transaction_index: event.transaction_index,
            data: event.data.clone(),
            created_at: SystemTime::now(),
        }
    }
}

/// A gateway transaction zipped with its status.
#[derive(Debug, Clone)]
pub struct TransactionWithStatus {
    pub transaction: ChainTransaction,
    pub status: ChainTransactionStatus,
}

/// Everything fetched for one block height.
#[derive(Debug, Clone)]
pub struct BlockData {
    pub block: ChainBlock,
    pub collections: Vec<ChainCollection>,
    pub transactions: Vec<TransactionWithStatus>,
    pub events: Vec<Event>,
}

/// Which accounts get their storage snapshot reprocessed after a block
/// commit. `AllAccounts` is the safe default: contract execution can mutate
/// storage of accounts that emit no core events. `TouchedAccounts` limits
/// the pass to addresses referenced by the block's events, trading
/// completeness for cost as the account count grows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageScope {
    AllAccounts,
    TouchedAccounts,
}

/// Configuration for the processing pipeline.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Interval between processing ticks.
    pub processing_interval: Duration,
    pub storage_scope: StorageScope,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            processing_interval: Duration::from_millis(500),
            storage_scope: StorageScope::AllAccounts,
        }
    }
}

/// The active project: which chain to index and where to start.
#[derive(Debug, Clone)]
pub struct ProjectContext {
    pub name: String,
    pub gateway_url: String,
    pub chain: ChainId,
    pub start_block_height: u64,
    /// Addressing-scheme hint, honored when the node is self-managed.
    /// For externally operated nodes the scheme cannot be introspected and
    /// bootstrap runs under both schemes.
    pub use_monotonic_addresses: bool,
}

/// Snapshot of the engine's progress.
#[derive(Debug, Clone)]
pub struct SyncStatus {
    pub is_active: bool,
    pub last_indexed_height: Option<u64>,
    pub tip_height: u64,
    pub blocks_behind: u64,
    pub last_block_time: Option<SystemTime>,
}

/// Per-entity record counts, exposed to UI-facing read paths.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexStats {
    pub block_count: usize,
    pub transaction_count: usize,
    pub event_count: usize,
    pub account_count: usize,
    pub key_count: usize,
    pub contract_count: usize,
}
