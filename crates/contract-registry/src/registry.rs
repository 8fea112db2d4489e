//! The storage contract every registry backend implements.

use crate::common::{
    AccountInstance, Contract, ContractId,
    error::RegistryResult,
};
use alloy::primitives::{B256, Bytes, Selector};
use async_trait::async_trait;

/// Result of a selector lookup.
///
/// Exactly one of the two fields is populated: `method` when the queried
/// instance resolved to a known codehash with an unambiguous entry,
/// `default_methods` with the system-wide candidate set otherwise. The
/// caller disambiguates candidates itself, typically by attempting to
/// decode against each.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MethodLookup {
    pub method: Option<Bytes>,
    pub default_methods: Vec<Bytes>,
}

impl MethodLookup {
    pub fn exact(fragment: Bytes) -> Self {
        Self {
            method: Some(fragment),
            default_methods: Vec::new(),
        }
    }

    pub fn candidates(fragments: Vec<Bytes>) -> Self {
        Self {
            method: None,
            default_methods: fragments,
        }
    }
}

/// Result of an event lookup, mirroring [`MethodLookup`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventLookup {
    pub event: Option<Bytes>,
    pub default_events: Vec<Bytes>,
}

impl EventLookup {
    pub fn exact(fragment: Bytes) -> Self {
        Self {
            event: Some(fragment),
            default_events: Vec::new(),
        }
    }

    pub fn candidates(fragments: Vec<Bytes>) -> Self {
        Self {
            event: None,
            default_events: fragments,
        }
    }
}

/// Contract metadata registry.
///
/// Three backends implement this trait (in-memory, Redis, relational). The
/// binding contract between them is behavioral equivalence of every
/// operation, not storage layout; the shared consistency suite in
/// `tests.rs` runs verbatim against each implementation.
#[async_trait]
pub trait ContractRegistry: Send + Sync {
    /// Store an artifact under its content address and bind the contract's
    /// name+tag (and `latest`) to it. Registers every method and event of
    /// the ABI in the resolution indices. Idempotent.
    async fn register_contract(&self, contract: &Contract) -> RegistryResult<()>;

    /// Remove the name+tag binding to an artifact. The artifact itself is
    /// immutable and survives. Backends may not support this.
    async fn deregister_contract(&self, id: &ContractId) -> RegistryResult<()>;

    /// Remove an artifact record by its bytecode hash. Bindings and index
    /// entries are untouched. Backends may not support this.
    async fn delete_artifact(&self, bytecode_hash: B256) -> RegistryResult<()>;

    /// Load the full contract bound to the identifier.
    async fn get_contract(&self, id: &ContractId) -> RegistryResult<Contract>;

    /// Load only the ABI bytes, exactly as registered.
    async fn get_contract_abi(&self, id: &ContractId) -> RegistryResult<Bytes> {
        Ok(self.get_contract(id).await?.abi)
    }

    /// Load only the creation bytecode.
    async fn get_contract_bytecode(&self, id: &ContractId) -> RegistryResult<Bytes> {
        Ok(self.get_contract(id).await?.bytecode)
    }

    /// Load only the runtime bytecode.
    async fn get_contract_deployed_bytecode(&self, id: &ContractId) -> RegistryResult<Bytes> {
        Ok(self.get_contract(id).await?.deployed_bytecode)
    }

    /// Resolve a 4-byte selector for a contract instance. Falls back to the
    /// default bucket when the instance's codehash is unknown or has no
    /// unambiguous entry; `NotFound` only when the default bucket is empty
    /// too.
    async fn get_methods_by_selector(
        &self,
        selector: Selector,
        instance: AccountInstance,
    ) -> RegistryResult<MethodLookup>;

    /// Resolve an event by topic hash and indexed-input count for a
    /// contract instance, with the same fallback semantics as
    /// [`Self::get_methods_by_selector`].
    async fn get_events_by_sig_hash(
        &self,
        sig_hash: B256,
        instance: AccountInstance,
        indexed_input_count: usize,
    ) -> RegistryResult<EventLookup>;

    /// All registered contract names, sorted.
    async fn get_catalog(&self) -> RegistryResult<Vec<String>>;

    /// All tags registered for a name, sorted. `NotFound` for an unknown
    /// name.
    async fn get_tags(&self, name: &str) -> RegistryResult<Vec<String>>;

    /// Bind a deployed instance to its runtime codehash. First write wins:
    /// re-binding an already bound instance is a silent no-op.
    async fn set_account_code_hash(
        &self,
        instance: AccountInstance,
        code_hash: B256,
    ) -> RegistryResult<()>;
}
