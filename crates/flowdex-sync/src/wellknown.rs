//! Well-known bootstrap account resolution.
//!
//! The four protocol-level accounts (service, fungible-token, flow-token,
//! flow-fees) are created in a bootstrap meta-transaction that never appears
//! in normal block data, so the indexer has to derive their addresses
//! instead of discovering them. A node may assign addresses monotonically
//! (sequential indices) or through the chain's address generator, and an
//! externally operated node cannot be asked which scheme it uses — callers
//! resolve under both schemes and reconcile against the store.

use crate::{Address, ChainId, IndexerError, IndexerResult};

/// Address-assignment scheme of the node being indexed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressingScheme {
    Monotonic,
    NonMonotonic,
}

impl AddressingScheme {
    /// Both schemes, in the order bootstrap probing attempts them.
    pub const ALL: [AddressingScheme; 2] =
        [AddressingScheme::Monotonic, AddressingScheme::NonMonotonic];
}

/// Canonical addresses of the bootstrap accounts under one scheme.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WellKnownAddresses {
    pub service_account: Address,
    pub fungible_token: Address,
    pub flow_token: Address,
    pub flow_fees: Address,
}

impl WellKnownAddresses {
    /// All four addresses, in bootstrap creation order.
    pub fn all(&self) -> [&Address; 4] {
        [
            &self.service_account,
            &self.fungible_token,
            &self.flow_token,
            &self.flow_fees,
        ]
    }
}

/// Generator-form addresses of the emulator chain's bootstrap accounts.
const EMULATOR_SERVICE_ACCOUNT: &str = "0xf8d6e0586b0a20c7";
const EMULATOR_FUNGIBLE_TOKEN: &str = "0xee82856bf20e2aa6";
const EMULATOR_FLOW_TOKEN: &str = "0x0ae53cb6e3f42a79";
const EMULATOR_FLOW_FEES: &str = "0xe5a8b7f23e8b548f";

fn monotonic_address(index: u64) -> Address {
    Address::parse(&format!("0x{index:016x}")).expect("monotonic address is valid hex")
}

/// Resolves the bootstrap account addresses for a chain under the given
/// addressing scheme. Pure function of the chain id and the scheme flag;
/// performs no I/O.
///
/// Under the monotonic scheme the bootstrap accounts occupy the first four
/// account indices. Under the non-monotonic scheme the addresses come from
/// the chain's address generator; they are only defined for the emulator
/// chain, and requesting them for another chain is a configuration error
/// surfaced to the initiating caller.
pub fn resolve_well_known_addresses(
    chain: ChainId,
    scheme: AddressingScheme,
) -> IndexerResult<WellKnownAddresses> {
    match scheme {
        AddressingScheme::Monotonic => Ok(WellKnownAddresses {
            service_account: monotonic_address(1),
            fungible_token: monotonic_address(2),
            flow_token: monotonic_address(3),
            flow_fees: monotonic_address(4),
        }),
        AddressingScheme::NonMonotonic => match chain {
            ChainId::Emulator => Ok(WellKnownAddresses {
                service_account: Address::parse(EMULATOR_SERVICE_ACCOUNT)?,
                fungible_token: Address::parse(EMULATOR_FUNGIBLE_TOKEN)?,
                flow_token: Address::parse(EMULATOR_FLOW_TOKEN)?,
                flow_fees: Address::parse(EMULATOR_FLOW_FEES)?,
            }),
            other => Err(IndexerError::Config(format!(
                "non-monotonic well-known addresses are not defined for chain {other:?}"
            ))),
        },
    }
}

/// Bootstrap addresses resolved under both schemes, used for event matching
/// and default-account flagging where the node's scheme is unknown.
#[derive(Debug, Clone)]
pub struct WellKnownCandidates {
    monotonic: WellKnownAddresses,
    non_monotonic: WellKnownAddresses,
}

impl WellKnownCandidates {
    pub fn resolve(chain: ChainId) -> IndexerResult<Self> {
        Ok(Self {
            monotonic: resolve_well_known_addresses(chain, AddressingScheme::Monotonic)?,
            non_monotonic: resolve_well_known_addresses(chain, AddressingScheme::NonMonotonic)?,
        })
    }

    pub fn for_scheme(&self, scheme: AddressingScheme) -> &WellKnownAddresses {
        match scheme {
            AddressingScheme::Monotonic => &self.monotonic,
            AddressingScheme::NonMonotonic => &self.non_monotonic,
        }
    }

    /// Whether the address is a bootstrap account under either scheme.
    pub fn is_well_known(&self, address: &Address) -> bool {
        self.monotonic.all().contains(&address) || self.non_monotonic.all().contains(&address)
    }

    /// Whether the address is the flow-token contract account under either
    /// scheme. Token withdraw/deposit events are matched against both
    /// candidates because the scheme in use cannot be introspected.
    pub fn is_flow_token(&self, address: &Address) -> bool {
        address == &self.monotonic.flow_token || address == &self.non_monotonic.flow_token
    }
}
