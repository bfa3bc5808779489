//! In-memory index storage.
//!
//! A complete [`IndexStorage`] implementation backed by plain maps, used by
//! the integration test suite and by embedders that want a zero-setup
//! store. The transactional scope is snapshot-based: `begin_transaction`
//! clones the current state, `rollback_transaction` restores it, and
//! `commit_transaction` discards the snapshot.

use std::collections::{BTreeMap, HashMap};
use std::time::SystemTime;

use async_trait::async_trait;

use flowdex_sync::{
    Account, AccountKey, AccountStorageItem, Address, Block, Contract, Event, IndexStats,
    IndexStorage, IndexerError, IndexerResult, Transaction, TransactionStatus,
};

#[derive(Debug, Clone, Default)]
struct State {
    blocks: BTreeMap<u64, Block>,
    transactions: HashMap<String, Transaction>,
    accounts: BTreeMap<Address, Account>,
    keys: HashMap<Address, Vec<AccountKey>>,
    contracts: HashMap<Address, Vec<Contract>>,
    events: HashMap<(String, u32), Event>,
    storage_items: HashMap<Address, Vec<AccountStorageItem>>,
}

pub struct MemoryIndexStorage {
    state: State,
    snapshot: Option<State>,
    available: bool,
}

impl MemoryIndexStorage {
    pub fn new() -> Self {
        Self {
            state: State::default(),
            snapshot: None,
            available: true,
        }
    }

    pub fn set_available(&mut self, available: bool) {
        self.available = available;
    }

    fn check_available(&self) -> IndexerResult<()> {
        if !self.available {
            return Err(IndexerError::Storage("storage not available".to_string()));
        }
        Ok(())
    }
}

impl Default for MemoryIndexStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IndexStorage for MemoryIndexStorage {
    async fn upsert_block(&mut self, mut block: Block) -> IndexerResult<()> {
        self.check_available()?;
        if let Some(existing) = self.state.blocks.get(&block.height) {
            block.created_at = existing.created_at;
        }
        block.updated_at = SystemTime::now();
        self.state.blocks.insert(block.height, block);
        Ok(())
    }

    async fn find_block_by_height(&self, height: u64) -> IndexerResult<Option<Block>> {
        self.check_available()?;
        Ok(self.state.blocks.get(&height).cloned())
    }

    async fn find_last_block(&self) -> IndexerResult<Option<Block>> {
        self.check_available()?;
        Ok(self.state.blocks.values().next_back().cloned())
    }

    async fn upsert_transaction(&mut self, mut transaction: Transaction) -> IndexerResult<()> {
        self.check_available()?;
        if let Some(existing) = self.state.transactions.get(&transaction.id) {
            transaction.created_at = existing.created_at;
            // The stored execution stage never regresses, even when the
            // whole record is rewritten.
            if !existing
                .status
                .execution
                .can_advance_to(transaction.status.execution)
            {
                transaction.status = existing.status.clone();
            }
        }
        transaction.updated_at = SystemTime::now();
        self.state
            .transactions
            .insert(transaction.id.clone(), transaction);
        Ok(())
    }

    async fn update_transaction_status(
        &mut self,
        id: &str,
        status: TransactionStatus,
    ) -> IndexerResult<()> {
        self.check_available()?;
        let transaction = self
            .state
            .transactions
            .get_mut(id)
            .ok_or_else(|| IndexerError::NotFound(format!("transaction {id}")))?;
        if transaction.status.execution.can_advance_to(status.execution) {
            transaction.status = status;
            transaction.updated_at = SystemTime::now();
        }
        Ok(())
    }

    async fn find_transaction_by_id(&self, id: &str) -> IndexerResult<Option<Transaction>> {
        self.check_available()?;
        Ok(self.state.transactions.get(id).cloned())
    }

    async fn upsert_account(&mut self, mut account: Account) -> IndexerResult<()> {
        self.check_available()?;
        if let Some(existing) = self.state.accounts.get(&account.address) {
            account.created_at = existing.created_at;
        }
        account.updated_at = SystemTime::now();
        self.state.accounts.insert(account.address.clone(), account);
        Ok(())
    }

    async fn update_account_balance(
        &mut self,
        address: &Address,
        balance: u64,
    ) -> IndexerResult<()> {
        self.check_available()?;
        let account = self
            .state
            .accounts
            .entry(address.clone())
            .or_insert_with(|| Account::create_default(address.clone()));
        account.balance = balance;
        account.updated_at = SystemTime::now();
        Ok(())
    }

    async fn mark_account_updated(&mut self, address: &Address) -> IndexerResult<()> {
        self.check_available()?;
        let account = self
            .state
            .accounts
            .get_mut(address)
            .ok_or_else(|| IndexerError::NotFound(format!("account {address}")))?;
        account.updated_at = SystemTime::now();
        Ok(())
    }

    async fn find_account_by_address(&self, address: &Address) -> IndexerResult<Option<Account>> {
        self.check_available()?;
        Ok(self.state.accounts.get(address).cloned())
    }

    async fn find_all_account_addresses(&self) -> IndexerResult<Vec<Address>> {
        self.check_available()?;
        Ok(self.state.accounts.keys().cloned().collect())
    }

    async fn replace_account_keys(
        &mut self,
        address: &Address,
        mut keys: Vec<AccountKey>,
    ) -> IndexerResult<()> {
        self.check_available()?;
        if let Some(existing) = self.state.keys.get(address) {
            for key in &mut keys {
                let Some(old) = existing.iter().find(|old| old.index == key.index) else {
                    continue;
                };
                // Keys the tool generated itself keep their private halves
                // across chain refetches, and observed sequence numbers
                // never move backwards.
                if key.private_key.is_none() {
                    key.private_key = old.private_key.clone();
                }
                key.sequence_number = key.sequence_number.max(old.sequence_number);
            }
        }
        self.state.keys.insert(address.clone(), keys);
        Ok(())
    }

    async fn find_account_keys(&self, address: &Address) -> IndexerResult<Vec<AccountKey>> {
        self.check_available()?;
        Ok(self.state.keys.get(address).cloned().unwrap_or_default())
    }

    async fn replace_account_contracts(
        &mut self,
        address: &Address,
        contracts: Vec<Contract>,
    ) -> IndexerResult<()> {
        self.check_available()?;
        self.state.contracts.insert(address.clone(), contracts);
        Ok(())
    }

    async fn find_account_contracts(&self, address: &Address) -> IndexerResult<Vec<Contract>> {
        self.check_available()?;
        Ok(self
            .state
            .contracts
            .get(address)
            .cloned()
            .unwrap_or_default())
    }

    async fn upsert_event(&mut self, event: Event) -> IndexerResult<()> {
        self.check_available()?;
        self.state
            .events
            .insert((event.transaction_id.clone(), event.event_index), event);
        Ok(())
    }

    async fn find_events_by_transaction(
        &self,
        transaction_id: &str,
    ) -> IndexerResult<Vec<Event>> {
        self.check_available()?;
        let mut events: Vec<Event> = self
            .state
            .events
            .values()
            .filter(|event| event.transaction_id == transaction_id)
            .cloned()
            .collect();
        events.sort_by_key(|event| event.event_index);
        Ok(events)
    }

    async fn replace_account_storage(
        &mut self,
        address: &Address,
        items: Vec<AccountStorageItem>,
    ) -> IndexerResult<()> {
        self.check_available()?;
        self.state.storage_items.insert(address.clone(), items);
        Ok(())
    }

    async fn find_account_storage(
        &self,
        address: &Address,
    ) -> IndexerResult<Vec<AccountStorageItem>> {
        self.check_available()?;
        Ok(self
            .state
            .storage_items
            .get(address)
            .cloned()
            .unwrap_or_default())
    }

    async fn begin_transaction(&mut self) -> IndexerResult<()> {
        self.check_available()?;
        if self.snapshot.is_some() {
            return Err(IndexerError::Storage(
                "transaction already in progress".to_string(),
            ));
        }
        self.snapshot = Some(self.state.clone());
        Ok(())
    }

    async fn commit_transaction(&mut self) -> IndexerResult<()> {
        self.check_available()?;
        self.snapshot
            .take()
            .ok_or_else(|| IndexerError::Storage("no transaction in progress".to_string()))?;
        Ok(())
    }

    async fn rollback_transaction(&mut self) -> IndexerResult<()> {
        self.check_available()?;
        self.state = self
            .snapshot
            .take()
            .ok_or_else(|| IndexerError::Storage("no transaction in progress".to_string()))?;
        Ok(())
    }

    async fn remove_all(&mut self) -> IndexerResult<()> {
        self.check_available()?;
        self.state = State::default();
        self.snapshot = None;
        Ok(())
    }

    async fn get_stats(&self) -> IndexerResult<IndexStats> {
        self.check_available()?;
        Ok(IndexStats {
            block_count: self.state.blocks.len(),
            transaction_count: self.state.transactions.len(),
            event_count: self.state.events.len(),
            account_count: self.state.accounts.len(),
            key_count: self.state.keys.values().map(Vec::len).sum(),
            contract_count: self.state.contracts.values().map(Vec::len).sum(),
        })
    }

    async fn is_available(&self) -> bool {
        self.available
    }
}
