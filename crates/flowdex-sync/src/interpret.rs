//! Chain-core event interpretation.
//!
//! Classifies events and dispatches the side-effecting store updates:
//! account creation, key rotation, contract changes, balance changes.
//! Custom (non-core) events are indexed but carry no side effects.

use std::sync::Arc;

use futures::future::join_all;
use log::{debug, error};
use serde_json::Value;
use tokio::sync::RwLock;

use crate::{
    Account, AccountKey, Address, Contract, Event, GatewayAdapter, IndexStorage, IndexerError,
    IndexerResult, WellKnownCandidates,
};

pub const ACCOUNT_CREATED_EVENT: &str = "flow.AccountCreated";
pub const ACCOUNT_KEY_ADDED_EVENT: &str = "flow.AccountKeyAdded";
pub const ACCOUNT_KEY_REMOVED_EVENT: &str = "flow.AccountKeyRemoved";
pub const ACCOUNT_CONTRACT_ADDED_EVENT: &str = "flow.AccountContractAdded";
pub const ACCOUNT_CONTRACT_UPDATED_EVENT: &str = "flow.AccountContractUpdated";
pub const ACCOUNT_CONTRACT_REMOVED_EVENT: &str = "flow.AccountContractRemoved";

const TOKENS_WITHDRAWN_EVENT: &str = "TokensWithdrawn";
const TOKENS_DEPOSITED_EVENT: &str = "TokensDeposited";
const FLOW_TOKEN_CONTRACT: &str = "FlowToken";

/// A chain event classified into the closed set of core kinds the
/// interpreter reacts to. Anything else lands in `Custom`, which carries
/// the raw type string and is a no-op.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoreEvent {
    AccountCreated { address: Address },
    AccountKeyAdded { address: Address },
    AccountKeyRemoved { address: Address },
    AccountContractAdded { address: Address },
    AccountContractUpdated { address: Address },
    AccountContractRemoved { address: Address },
    TokensWithdrawn { token: Address, from: Option<Address> },
    TokensDeposited { token: Address, to: Option<Address> },
    Custom { event_type: String },
}

fn required_address(data: &Value, field: &str) -> IndexerResult<Address> {
    let raw = data
        .get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| IndexerError::Serialization(format!("event payload has no {field:?}")))?;
    Address::parse(raw)
}

fn optional_address(data: &Value, field: &str) -> IndexerResult<Option<Address>> {
    match data.get(field).and_then(Value::as_str) {
        Some(raw) => Ok(Some(Address::parse(raw)?)),
        None => Ok(None),
    }
}

impl CoreEvent {
    pub fn parse(event_type: &str, data: &Value) -> IndexerResult<CoreEvent> {
        match event_type {
            ACCOUNT_CREATED_EVENT => Ok(CoreEvent::AccountCreated {
                address: required_address(data, "address")?,
            }),
            ACCOUNT_KEY_ADDED_EVENT => Ok(CoreEvent::AccountKeyAdded {
                address: required_address(data, "address")?,
            }),
            ACCOUNT_KEY_REMOVED_EVENT => Ok(CoreEvent::AccountKeyRemoved {
                address: required_address(data, "address")?,
            }),
            ACCOUNT_CONTRACT_ADDED_EVENT => Ok(CoreEvent::AccountContractAdded {
                address: required_address(data, "address")?,
            }),
            ACCOUNT_CONTRACT_UPDATED_EVENT => Ok(CoreEvent::AccountContractUpdated {
                address: required_address(data, "address")?,
            }),
            ACCOUNT_CONTRACT_REMOVED_EVENT => Ok(CoreEvent::AccountContractRemoved {
                address: required_address(data, "address")?,
            }),
            other => Self::parse_token_event(other, data),
        }
    }

    /// Token events are typed `A.<address>.FlowToken.TokensWithdrawn` /
    /// `...TokensDeposited`, with the emitting contract's account address
    /// embedded in the type string.
    fn parse_token_event(event_type: &str, data: &Value) -> IndexerResult<CoreEvent> {
        let custom = || CoreEvent::Custom {
            event_type: event_type.to_string(),
        };
        let Some(rest) = event_type.strip_prefix("A.") else {
            return Ok(custom());
        };
        let parts: Vec<&str> = rest.split('.').collect();
        let [address, contract, name] = parts.as_slice() else {
            return Ok(custom());
        };
        if *contract != FLOW_TOKEN_CONTRACT {
            return Ok(custom());
        }
        match *name {
            TOKENS_WITHDRAWN_EVENT => Ok(CoreEvent::TokensWithdrawn {
                token: Address::parse(address)?,
                from: optional_address(data, "from")?,
            }),
            TOKENS_DEPOSITED_EVENT => Ok(CoreEvent::TokensDeposited {
                token: Address::parse(address)?,
                to: optional_address(data, "to")?,
            }),
            _ => Ok(custom()),
        }
    }

    /// Account addresses this event refers to, used for touched-account
    /// storage reprocessing.
    pub fn touched_addresses(&self) -> Vec<Address> {
        match self {
            CoreEvent::AccountCreated { address }
            | CoreEvent::AccountKeyAdded { address }
            | CoreEvent::AccountKeyRemoved { address }
            | CoreEvent::AccountContractAdded { address }
            | CoreEvent::AccountContractUpdated { address }
            | CoreEvent::AccountContractRemoved { address } => vec![address.clone()],
            CoreEvent::TokensWithdrawn { from, .. } => from.iter().cloned().collect(),
            CoreEvent::TokensDeposited { to, .. } => to.iter().cloned().collect(),
            CoreEvent::Custom { .. } => Vec::new(),
        }
    }
}

/// Full account state fetched from the gateway, shaped as store entities.
#[derive(Debug, Clone)]
pub struct AccountBundle {
    pub account: Account,
    pub keys: Vec<AccountKey>,
    pub contracts: Vec<Contract>,
}

pub struct EventInterpreter<G, S> {
    gateway: Arc<G>,
    storage: Arc<RwLock<S>>,
}

impl<G, S> EventInterpreter<G, S>
where
    G: GatewayAdapter,
    S: IndexStorage,
{
    pub fn new(gateway: Arc<G>, storage: Arc<RwLock<S>>) -> Self {
        Self { gateway, storage }
    }

    /// Interprets all events of one block.
    ///
    /// Account-creation events are processed to completion (in parallel
    /// with each other) before any other event type, because later events
    /// may reference accounts only just created in the same block. Each
    /// event's side-effect failure is caught and logged without aborting
    /// siblings; partial application self-heals on a later block.
    ///
    /// Returns the addresses the block's events referred to.
    pub async fn process_block_events(
        &self,
        events: &[Event],
        candidates: &WellKnownCandidates,
    ) -> Vec<Address> {
        let (creations, rest): (Vec<&Event>, Vec<&Event>) = events
            .iter()
            .partition(|event| event.event_type == ACCOUNT_CREATED_EVENT);

        join_all(
            creations
                .iter()
                .map(|event| self.interpret_logged(event, candidates)),
        )
        .await;
        join_all(
            rest.iter()
                .map(|event| self.interpret_logged(event, candidates)),
        )
        .await;

        let mut touched: Vec<Address> = events
            .iter()
            .filter_map(|event| CoreEvent::parse(&event.event_type, &event.data).ok())
            .flat_map(|core| core.touched_addresses())
            .collect();
        touched.sort();
        touched.dedup();
        touched
    }

    async fn interpret_logged(&self, event: &Event, candidates: &WellKnownCandidates) {
        if let Err(e) = self.interpret(event, candidates).await {
            error!(
                "{} event handling error: {e} ({})",
                event.event_type, event.data
            );
        }
    }

    /// Dispatches one event's side effect. Unrecognized events and token
    /// events of contracts other than the resolved flow-token account are
    /// no-ops.
    pub async fn interpret(
        &self,
        event: &Event,
        candidates: &WellKnownCandidates,
    ) -> IndexerResult<()> {
        debug!("handling event: {} {}", event.event_type, event.data);
        match CoreEvent::parse(&event.event_type, &event.data)? {
            CoreEvent::AccountCreated { address } => {
                self.store_new_account(&address, &event.block_id, candidates)
                    .await
            }
            CoreEvent::AccountKeyAdded { address } | CoreEvent::AccountKeyRemoved { address } => {
                self.update_stored_account_keys(&address, &event.block_id)
                    .await
            }
            CoreEvent::AccountContractAdded { address }
            | CoreEvent::AccountContractUpdated { address }
            | CoreEvent::AccountContractRemoved { address } => {
                self.update_stored_account_contracts(&address, &event.block_id)
                    .await
            }
            CoreEvent::TokensWithdrawn { token, from } if candidates.is_flow_token(&token) => {
                match from {
                    Some(from) => self.reprocess_account_balance(&from).await,
                    None => Ok(()),
                }
            }
            CoreEvent::TokensDeposited { token, to } if candidates.is_flow_token(&token) => {
                match to {
                    Some(to) => self.reprocess_account_balance(&to).await,
                    None => Ok(()),
                }
            }
            _ => Ok(()),
        }
    }

    /// Fetches the full account state (keys and contracts included) and
    /// shapes it into store entities. Accounts matching a well-known
    /// address under either scheme are flagged as default accounts.
    pub async fn fetch_account_bundle(
        &self,
        address: &Address,
        block_id: &str,
        candidates: &WellKnownCandidates,
    ) -> IndexerResult<AccountBundle> {
        let chain_account = self.gateway.get_account(address).await?;
        let is_default = candidates.is_well_known(&chain_account.address);
        let account = Account::from_chain(&chain_account, block_id, is_default);
        let keys = chain_account
            .keys
            .iter()
            .map(|key| AccountKey::from_chain(&chain_account.address, key, block_id))
            .collect();
        let contracts = chain_account
            .contracts
            .iter()
            .map(|(name, code)| Contract {
                account_address: chain_account.address.clone(),
                name: name.clone(),
                code: code.clone(),
                block_id: block_id.to_string(),
            })
            .collect();
        Ok(AccountBundle {
            account,
            keys,
            contracts,
        })
    }

    /// Writes an account bundle through an already-held store handle, so
    /// bootstrap processing can batch all four well-known accounts inside
    /// one transaction.
    pub async fn store_account_bundle(storage: &mut S, bundle: AccountBundle) -> IndexerResult<()> {
        let address = bundle.account.address.clone();
        storage.upsert_account(bundle.account).await?;
        storage.replace_account_keys(&address, bundle.keys).await?;
        storage
            .replace_account_contracts(&address, bundle.contracts)
            .await?;
        Ok(())
    }

    async fn store_new_account(
        &self,
        address: &Address,
        block_id: &str,
        candidates: &WellKnownCandidates,
    ) -> IndexerResult<()> {
        let bundle = self
            .fetch_account_bundle(address, block_id, candidates)
            .await?;
        let mut storage = self.storage.write().await;
        Self::store_account_bundle(&mut storage, bundle).await
    }

    /// Refetches the account and replaces its full key list. The account
    /// row itself is only touched, not rewritten.
    async fn update_stored_account_keys(
        &self,
        address: &Address,
        block_id: &str,
    ) -> IndexerResult<()> {
        let chain_account = self.gateway.get_account(address).await?;
        let keys = chain_account
            .keys
            .iter()
            .map(|key| AccountKey::from_chain(&chain_account.address, key, block_id))
            .collect();
        let mut storage = self.storage.write().await;
        storage.mark_account_updated(address).await?;
        storage.replace_account_keys(address, keys).await
    }

    /// Refetches the account and replaces its full contract set; no diffing
    /// is attempted.
    async fn update_stored_account_contracts(
        &self,
        address: &Address,
        block_id: &str,
    ) -> IndexerResult<()> {
        let chain_account = self.gateway.get_account(address).await?;
        let contracts = chain_account
            .contracts
            .iter()
            .map(|(name, code)| Contract {
                account_address: chain_account.address.clone(),
                name: name.clone(),
                code: code.clone(),
                block_id: block_id.to_string(),
            })
            .collect();
        let mut storage = self.storage.write().await;
        storage.mark_account_updated(address).await?;
        storage.replace_account_contracts(address, contracts).await
    }

    async fn reprocess_account_balance(&self, address: &Address) -> IndexerResult<()> {
        let chain_account = self.gateway.get_account(address).await?;
        let mut storage = self.storage.write().await;
        storage
            .update_account_balance(&chain_account.address, chain_account.balance)
            .await
    }
}
