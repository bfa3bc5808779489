//! Mock implementations for testing

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc};

use crate::{
    AccountStorageDomains, Address, ChainAccount, ChainBlock, ChainCollection, ChainTransaction,
    ChainTransactionStatus, GatewayAdapter, IndexerError, IndexerResult, ProcessEvent,
    ProcessInfo, ProcessManager, ProcessState, ServiceStatus,
};

/// Mock chain gateway for testing. Blocks, collections, transactions and
/// accounts are scripted by the test; status subscriptions are push-driven
/// through [`MockGateway::push_status_update`].
#[derive(Clone)]
pub struct MockGateway {
    online: Arc<RwLock<bool>>,
    blocks: Arc<RwLock<HashMap<u64, ChainBlock>>>,
    tip_height: Arc<RwLock<Option<u64>>>,
    collections: Arc<RwLock<HashMap<String, ChainCollection>>>,
    transactions: Arc<RwLock<HashMap<String, ChainTransaction>>>,
    statuses: Arc<RwLock<HashMap<String, ChainTransactionStatus>>>,
    accounts: Arc<RwLock<HashMap<Address, ChainAccount>>>,
    storages: Arc<RwLock<HashMap<Address, AccountStorageDomains>>>,
    subscriptions: Arc<RwLock<HashMap<String, Vec<mpsc::Sender<ChainTransactionStatus>>>>>,
}

impl MockGateway {
    pub fn new() -> Self {
        Self {
            online: Arc::new(RwLock::new(true)),
            blocks: Arc::new(RwLock::new(HashMap::new())),
            tip_height: Arc::new(RwLock::new(None)),
            collections: Arc::new(RwLock::new(HashMap::new())),
            transactions: Arc::new(RwLock::new(HashMap::new())),
            statuses: Arc::new(RwLock::new(HashMap::new())),
            accounts: Arc::new(RwLock::new(HashMap::new())),
            storages: Arc::new(RwLock::new(HashMap::new())),
            subscriptions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn set_online(&self, online: bool) {
        *self.online.write().unwrap() = online;
    }

    pub fn add_block(&self, block: ChainBlock) {
        let mut tip = self.tip_height.write().unwrap();
        if tip.map(|t| block.height > t).unwrap_or(true) {
            *tip = Some(block.height);
        }
        self.blocks.write().unwrap().insert(block.height, block);
    }

    pub fn add_collection(&self, collection: ChainCollection) {
        self.collections
            .write()
            .unwrap()
            .insert(collection.id.clone(), collection);
    }

    pub fn add_transaction(
        &self,
        transaction: ChainTransaction,
        status: ChainTransactionStatus,
    ) {
        self.statuses
            .write()
            .unwrap()
            .insert(transaction.id.clone(), status);
        self.transactions
            .write()
            .unwrap()
            .insert(transaction.id.clone(), transaction);
    }

    pub fn add_account(&self, account: ChainAccount) {
        self.accounts
            .write()
            .unwrap()
            .insert(account.address.clone(), account);
    }

    pub fn remove_account(&self, address: &Address) {
        self.accounts.write().unwrap().remove(address);
    }

    pub fn set_account_storage(&self, address: Address, domains: AccountStorageDomains) {
        self.storages.write().unwrap().insert(address, domains);
    }

    /// Pushes a status update to all live subscriptions of a transaction
    /// and records it as the transaction's current status. After a
    /// terminal status the subscription channels are closed.
    pub fn push_status_update(&self, transaction_id: &str, status: ChainTransactionStatus) {
        let terminal = status.execution.is_terminal();
        self.statuses
            .write()
            .unwrap()
            .insert(transaction_id.to_string(), status.clone());
        let mut subscriptions = self.subscriptions.write().unwrap();
        if let Some(senders) = subscriptions.get_mut(transaction_id) {
            senders.retain(|sender| sender.try_send(status.clone()).is_ok());
            if terminal {
                subscriptions.remove(transaction_id);
            }
        }
    }

    pub fn subscription_count(&self, transaction_id: &str) -> usize {
        self.subscriptions
            .read()
            .unwrap()
            .get(transaction_id)
            .map(|senders| senders.len())
            .unwrap_or(0)
    }

    fn check_online(&self) -> IndexerResult<()> {
        if !*self.online.read().unwrap() {
            return Err(IndexerError::GatewayUnavailable(
                "gateway reports offline status".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for MockGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GatewayAdapter for MockGateway {
    async fn get_api_status(&self) -> ServiceStatus {
        if *self.online.read().unwrap() {
            ServiceStatus::Online
        } else {
            ServiceStatus::Offline
        }
    }

    async fn get_latest_block(&self) -> IndexerResult<ChainBlock> {
        self.check_online()?;
        let tip = self
            .tip_height
            .read()
            .unwrap()
            .ok_or_else(|| IndexerError::Gateway("chain has no blocks".to_string()))?;
        let blocks = self.blocks.read().unwrap();
        blocks
            .get(&tip)
            .cloned()
            .ok_or_else(|| IndexerError::Gateway("tip block not found".to_string()))
    }

    async fn get_block_by_height(&self, height: u64) -> IndexerResult<ChainBlock> {
        self.check_online()?;
        let blocks = self.blocks.read().unwrap();
        blocks
            .get(&height)
            .cloned()
            .ok_or_else(|| IndexerError::NotFound(format!("block at height {height}")))
    }

    async fn get_collection_by_id(&self, id: &str) -> IndexerResult<ChainCollection> {
        self.check_online()?;
        let collections = self.collections.read().unwrap();
        collections
            .get(id)
            .cloned()
            .ok_or_else(|| IndexerError::NotFound(format!("collection {id}")))
    }

    async fn get_transaction_by_id(&self, id: &str) -> IndexerResult<ChainTransaction> {
        self.check_online()?;
        let transactions = self.transactions.read().unwrap();
        transactions
            .get(id)
            .cloned()
            .ok_or_else(|| IndexerError::NotFound(format!("transaction {id}")))
    }

    async fn get_transaction_status_by_id(
        &self,
        id: &str,
    ) -> IndexerResult<ChainTransactionStatus> {
        self.check_online()?;
        let statuses = self.statuses.read().unwrap();
        statuses
            .get(id)
            .cloned()
            .ok_or_else(|| IndexerError::NotFound(format!("transaction status {id}")))
    }

    async fn get_account(&self, address: &Address) -> IndexerResult<ChainAccount> {
        self.check_online()?;
        let accounts = self.accounts.read().unwrap();
        accounts
            .get(address)
            .cloned()
            .ok_or_else(|| IndexerError::AccountNotFound(address.to_string()))
    }

    async fn get_account_storage(
        &self,
        address: &Address,
    ) -> IndexerResult<AccountStorageDomains> {
        self.check_online()?;
        let storages = self.storages.read().unwrap();
        Ok(storages.get(address).cloned().unwrap_or_default())
    }

    async fn subscribe_transaction_status(
        &self,
        id: &str,
    ) -> IndexerResult<mpsc::Receiver<ChainTransactionStatus>> {
        self.check_online()?;
        let (sender, receiver) = mpsc::channel(16);
        self.subscriptions
            .write()
            .unwrap()
            .entry(id.to_string())
            .or_default()
            .push(sender);
        Ok(receiver)
    }
}

/// Mock process manager for testing. Process states are set by the test;
/// every change is published on the broadcast stream.
#[derive(Clone)]
pub struct MockProcessManager {
    processes: Arc<RwLock<HashMap<String, ProcessState>>>,
    events: broadcast::Sender<ProcessEvent>,
}

impl MockProcessManager {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            processes: Arc::new(RwLock::new(HashMap::new())),
            events,
        }
    }

    pub fn set_process_state(&self, id: &str, state: ProcessState) {
        let info = ProcessInfo {
            id: id.to_string(),
            state,
        };
        let added = self
            .processes
            .write()
            .unwrap()
            .insert(id.to_string(), state)
            .is_none();
        let event = if added {
            ProcessEvent::Added(info)
        } else {
            ProcessEvent::Updated(info)
        };
        // Send fails when nobody is subscribed, which is fine.
        let _ = self.events.send(event);
    }
}

impl Default for MockProcessManager {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProcessManager for MockProcessManager {
    async fn find_process(&self, id: &str) -> Option<ProcessInfo> {
        let processes = self.processes.read().unwrap();
        processes.get(id).map(|state| ProcessInfo {
            id: id.to_string(),
            state: *state,
        })
    }

    fn subscribe(&self) -> broadcast::Receiver<ProcessEvent> {
        self.events.subscribe()
    }
}
