//! In-memory registry backend.
//!
//! All state lives in plain maps behind one reader/writer lock:
//! registrations and resolutions run concurrently from many decoder tasks,
//! so even this zero-latency backend needs the same synchronization
//! guarantees as the networked ones. Guards are never held across an await
//! point.

use crate::{
    common::{
        AccountInstance, Artifact, Contract, ContractId, prepare_registration,
        error::{RegistryError, RegistryResult},
    },
    registry::{ContractRegistry, EventLookup, MethodLookup},
};
use alloy::primitives::{B256, Bytes, Selector};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet, HashMap};

const COMPONENT: &str = "memory-registry";

/// Specific-codehash method index key. A codehash deterministically implies
/// one ABI per selector, so the value side is a single fragment, not a
/// list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct MethodKey {
    code_hash: B256,
    selector: Selector,
}

/// Specific-codehash event index key. The indexed-input count is part of
/// the key: one signature can be declared with different indexed layouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct EventKey {
    code_hash: B256,
    sig_hash: B256,
    indexed_input_count: usize,
}

/// Default-bucket event key, shared system-wide across codehashes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct DefaultEventKey {
    sig_hash: B256,
    indexed_input_count: usize,
}

#[derive(Debug, Default)]
struct Indexes {
    /// name -> set of tags; names and tags only ever accumulate.
    catalog: BTreeMap<String, BTreeSet<String>>,
    /// (name, tag) -> bytecode hash of the bound artifact.
    contract_hashes: HashMap<(String, String), B256>,
    /// bytecode hash -> immutable artifact record.
    artifacts: HashMap<B256, Artifact>,
    /// (chain id, address) -> codehash, first write wins.
    code_hashes: HashMap<(u64, alloy::primitives::Address), B256>,
    methods: HashMap<MethodKey, Bytes>,
    default_methods: HashMap<Selector, Vec<Bytes>>,
    events: HashMap<EventKey, Bytes>,
    default_events: HashMap<DefaultEventKey, Vec<Bytes>>,
}

impl Indexes {
    fn artifact_for(&self, id: &ContractId) -> Option<&Artifact> {
        let hash = self
            .contract_hashes
            .get(&(id.name.clone(), id.tag.clone()))?;
        self.artifacts.get(hash)
    }
}

/// Registry backend holding everything in process memory.
#[derive(Debug, Default)]
pub struct InMemoryRegistry {
    state: RwLock<Indexes>,
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ContractRegistry for InMemoryRegistry {
    async fn register_contract(&self, contract: &Contract) -> RegistryResult<()> {
        let reg = prepare_registration(contract)?;

        let mut state = self.state.write();

        state.artifacts.insert(reg.bytecode_hash, reg.artifact);

        let tags = state.catalog.entry(reg.id.name.clone()).or_default();
        tags.insert(reg.id.tag.clone());
        tags.insert(crate::common::DEFAULT_TAG.to_string());
        state
            .contract_hashes
            .insert((reg.id.name.clone(), reg.id.tag.clone()), reg.bytecode_hash);
        state.contract_hashes.insert(
            (reg.id.name.clone(), crate::common::DEFAULT_TAG.to_string()),
            reg.bytecode_hash,
        );

        for method in &reg.fragments.methods {
            if let Some(code_hash) = reg.code_hash {
                state.methods.insert(
                    MethodKey {
                        code_hash,
                        selector: method.selector,
                    },
                    method.abi.clone(),
                );
            }
            let bucket = state.default_methods.entry(method.selector).or_default();
            if !bucket.contains(&method.abi) {
                bucket.push(method.abi.clone());
            }
        }

        for event in &reg.fragments.events {
            if let Some(code_hash) = reg.code_hash {
                state.events.insert(
                    EventKey {
                        code_hash,
                        sig_hash: event.sig_hash,
                        indexed_input_count: event.indexed_input_count,
                    },
                    event.abi.clone(),
                );
            }
            let bucket = state
                .default_events
                .entry(DefaultEventKey {
                    sig_hash: event.sig_hash,
                    indexed_input_count: event.indexed_input_count,
                })
                .or_default();
            if !bucket.contains(&event.abi) {
                bucket.push(event.abi.clone());
            }
        }

        tracing::debug!(
            id = %reg.id,
            methods = reg.fragments.methods.len(),
            events = reg.fragments.events.len(),
            "registered contract"
        );
        Ok(())
    }

    async fn deregister_contract(&self, id: &ContractId) -> RegistryResult<()> {
        let id = id.normalized()?;
        let mut state = self.state.write();

        state
            .contract_hashes
            .remove(&(id.name.clone(), id.tag.clone()))
            .ok_or_else(|| RegistryError::not_found(COMPONENT, format!("contract {id}")))?;
        if let Some(tags) = state.catalog.get_mut(&id.name) {
            tags.remove(&id.tag);
        }
        Ok(())
    }

    async fn delete_artifact(&self, bytecode_hash: B256) -> RegistryResult<()> {
        self.state.write().artifacts.remove(&bytecode_hash);
        Ok(())
    }

    async fn get_contract(&self, id: &ContractId) -> RegistryResult<Contract> {
        let id = id.normalized()?;
        let state = self.state.read();
        let artifact = state
            .artifact_for(&id)
            .ok_or_else(|| RegistryError::not_found(COMPONENT, format!("contract {id}")))?;
        Ok(Contract::from_artifact(id.clone(), artifact.clone()))
    }

    async fn get_methods_by_selector(
        &self,
        selector: Selector,
        instance: AccountInstance,
    ) -> RegistryResult<MethodLookup> {
        let state = self.state.read();

        if let Some(code_hash) = state
            .code_hashes
            .get(&(instance.chain_id, instance.address))
        {
            let key = MethodKey {
                code_hash: *code_hash,
                selector,
            };
            if let Some(fragment) = state.methods.get(&key) {
                return Ok(MethodLookup::exact(fragment.clone()));
            }
        }

        match state.default_methods.get(&selector) {
            Some(bucket) if !bucket.is_empty() => Ok(MethodLookup::candidates(bucket.clone())),
            _ => Err(RegistryError::not_found(
                COMPONENT,
                format!("method with selector {selector}"),
            )),
        }
    }

    async fn get_events_by_sig_hash(
        &self,
        sig_hash: B256,
        instance: AccountInstance,
        indexed_input_count: usize,
    ) -> RegistryResult<EventLookup> {
        let state = self.state.read();

        if let Some(code_hash) = state
            .code_hashes
            .get(&(instance.chain_id, instance.address))
        {
            let key = EventKey {
                code_hash: *code_hash,
                sig_hash,
                indexed_input_count,
            };
            if let Some(fragment) = state.events.get(&key) {
                return Ok(EventLookup::exact(fragment.clone()));
            }
        }

        let key = DefaultEventKey {
            sig_hash,
            indexed_input_count,
        };
        match state.default_events.get(&key) {
            Some(bucket) if !bucket.is_empty() => Ok(EventLookup::candidates(bucket.clone())),
            _ => Err(RegistryError::not_found(
                COMPONENT,
                format!("event with topic {sig_hash}"),
            )),
        }
    }

    async fn get_catalog(&self) -> RegistryResult<Vec<String>> {
        Ok(self.state.read().catalog.keys().cloned().collect())
    }

    async fn get_tags(&self, name: &str) -> RegistryResult<Vec<String>> {
        let state = self.state.read();
        let tags = state
            .catalog
            .get(name)
            .ok_or_else(|| RegistryError::not_found(COMPONENT, format!("tags for {name}")))?;
        Ok(tags.iter().cloned().collect())
    }

    async fn set_account_code_hash(
        &self,
        instance: AccountInstance,
        code_hash: B256,
    ) -> RegistryResult<()> {
        self.state
            .write()
            .code_hashes
            .entry((instance.chain_id, instance.address))
            .or_insert(code_hash);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{Address, keccak256};

    fn sample_contract() -> Contract {
        Contract::new(
            ContractId::new("Token", "v1"),
            Bytes::from_static(b"[]"),
            Bytes::from_static(&[0x60, 0x80, 0x60, 0x40]),
            Bytes::from_static(&[0x60, 0x40]),
        )
    }

    #[tokio::test]
    async fn test_code_hash_binding_is_first_write_wins() {
        let registry = InMemoryRegistry::new();
        let instance = AccountInstance::new(1, Address::repeat_byte(0x11));

        let first = keccak256(b"first");
        let second = keccak256(b"second");
        registry.set_account_code_hash(instance, first).await.unwrap();
        registry.set_account_code_hash(instance, second).await.unwrap();

        let state = registry.state.read();
        assert_eq!(
            state.code_hashes.get(&(instance.chain_id, instance.address)),
            Some(&first)
        );
    }

    #[tokio::test]
    async fn test_deregister_keeps_artifact_and_name() {
        let registry = InMemoryRegistry::new();
        let contract = sample_contract();
        registry.register_contract(&contract).await.unwrap();

        registry
            .deregister_contract(&ContractId::new("Token", "v1"))
            .await
            .unwrap();

        // The binding is gone but the artifact and the catalog entry stay.
        let err = registry
            .get_contract(&ContractId::new("Token", "v1"))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(registry.get_catalog().await.unwrap(), vec!["Token"]);
        assert!(
            registry
                .state
                .read()
                .artifacts
                .contains_key(&keccak256([0x60, 0x80, 0x60, 0x40]))
        );

        // Deregistering twice reports the missing binding.
        let err = registry
            .deregister_contract(&ContractId::new("Token", "v1"))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_delete_artifact_leaves_bindings() {
        let registry = InMemoryRegistry::new();
        let contract = sample_contract();
        registry.register_contract(&contract).await.unwrap();

        let bytecode_hash = keccak256([0x60, 0x80, 0x60, 0x40]);
        registry.delete_artifact(bytecode_hash).await.unwrap();

        // Binding still exists but now dangles; lookups miss.
        let err = registry
            .get_contract(&ContractId::new("Token", "v1"))
            .await
            .unwrap_err();
        assert!(err.is_not_found());

        // Deleting an unknown artifact is a no-op, as in the original.
        registry.delete_artifact(keccak256(b"unknown")).await.unwrap();
    }
}
