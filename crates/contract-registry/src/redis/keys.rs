//! Key namespacing for the Redis backend.
//!
//! All entities share one flat keyspace, so every key starts with a stable
//! per-entity prefix followed by hex-encoded binary key material. The
//! prefixes are part of the stored-data contract and must not change
//! between releases.

use crate::common::AccountInstance;
use alloy::primitives::{B256, Selector};

/// Separator between key components.
pub const SEPARATOR: &str = ":";

/// Stable per-entity key prefixes.
pub mod prefix {
    /// Artifact record keyed by bytecode hash.
    pub const ARTIFACT: &str = "artifact";

    /// name+tag -> bytecode hash binding.
    pub const BYTECODE_HASH: &str = "bytecode_hash";

    /// chain+address -> deployed bytecode hash binding.
    pub const DEPLOYED_BYTECODE_HASH: &str = "deployed_bytecode_hash";

    /// Method fragment lists keyed by codehash+selector.
    pub const METHODS: &str = "methods";

    /// Event fragment lists keyed by codehash+sighash+indexed count.
    pub const EVENTS: &str = "events";

    /// List of all registered contract names.
    pub const CATALOG: &str = "catalog";

    /// Per-name list of registered tags.
    pub const TAGS: &str = "tags";
}

/// Key of the artifact record for a bytecode hash.
pub fn artifact_key(namespace: &str, bytecode_hash: B256) -> String {
    format!(
        "{namespace}{SEPARATOR}{}{SEPARATOR}{}",
        prefix::ARTIFACT,
        hex::encode(bytecode_hash)
    )
}

/// Key of the name+tag -> bytecode hash binding.
pub fn bytecode_hash_key(namespace: &str, name: &str, tag: &str) -> String {
    format!(
        "{namespace}{SEPARATOR}{}{SEPARATOR}{name}{SEPARATOR}{tag}",
        prefix::BYTECODE_HASH
    )
}

/// Key of the codehash binding for a deployed contract instance.
pub fn account_code_hash_key(namespace: &str, instance: AccountInstance) -> String {
    format!(
        "{namespace}{SEPARATOR}{}{SEPARATOR}{}{SEPARATOR}{}",
        prefix::DEPLOYED_BYTECODE_HASH,
        instance.chain_id,
        hex::encode(instance.address)
    )
}

/// Key of the method fragment list for a codehash+selector pair. The
/// default bucket uses the reserved zero codehash.
pub fn methods_key(namespace: &str, code_hash: B256, selector: Selector) -> String {
    format!(
        "{namespace}{SEPARATOR}{}{SEPARATOR}{}{SEPARATOR}{}",
        prefix::METHODS,
        hex::encode(code_hash),
        hex::encode(selector)
    )
}

/// Key of the event fragment list for a codehash+sighash+indexed-count
/// triple.
pub fn events_key(
    namespace: &str,
    code_hash: B256,
    sig_hash: B256,
    indexed_input_count: usize,
) -> String {
    format!(
        "{namespace}{SEPARATOR}{}{SEPARATOR}{}{SEPARATOR}{}{SEPARATOR}{indexed_input_count}",
        prefix::EVENTS,
        hex::encode(code_hash),
        hex::encode(sig_hash)
    )
}

/// Key of the catalog list.
pub fn catalog_key(namespace: &str) -> String {
    format!("{namespace}{SEPARATOR}{}", prefix::CATALOG)
}

/// Key of the tag list for a contract name.
pub fn tags_key(namespace: &str, name: &str) -> String {
    format!("{namespace}{SEPARATOR}{}{SEPARATOR}{name}", prefix::TAGS)
}
