//! Contract metadata registry: a lookup service for compiled smart-contract
//! artifacts and the reverse indices needed to decode calls and logs.
//!
//! # Overview
//!
//! Artifacts (ABI, bytecode, deployed bytecode) are stored content-addressed
//! by `keccak256(bytecode)` and bound to a human `name[tag]` identifier.
//! On top of the artifact store sit two resolution indices answering the
//! questions transaction crafters and log decoders ask:
//!
//! - which method does this 4-byte selector mean for this deployed
//!   instance?
//! - which event does this topic-hash / indexed-count pair mean?
//!
//! # Ambiguous resolution
//!
//! Nobody tells a log decoder which ABI version is deployed at an address,
//! so resolution degrades gracefully. Every registered fragment is also
//! appended (de-duplicated) to a **default bucket** under a reserved zero
//! codehash. A query for an instance whose codehash is bound and indexed
//! returns the exact fragment; anything else returns the default-bucket
//! candidate set for the caller to disambiguate, and only an empty bucket
//! is a miss.
//!
//! # Backends
//!
//! One trait, three interchangeable implementations:
//!
//! - [`memory::InMemoryRegistry`]: maps behind a reader/writer lock.
//! - [`redis::RedisRegistry`]: flat namespaced keyspace, bounded
//!   connection pool, explicitly pipelined (and explicitly non-atomic)
//!   registration.
//! - [`sql::SqlRegistry`]: normalized schema, one transaction per
//!   registration, fallback resolution as a codehash-less query.
//!
//! The binding contract between them is behavioral: the consistency suite
//! in `tests.rs` runs the same scenarios against all three.

#![allow(clippy::missing_errors_doc)]
#![deny(clippy::panic)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod common;
pub mod config;
pub mod memory;
pub mod redis;
pub mod registry;
pub mod sql;


pub use common::{
    AccountInstance, Artifact, Contract, ContractId, DEFAULT_CODE_HASH, DEFAULT_TAG,
    error::{RegistryError, RegistryResult},
};
pub use config::{RedisStoreConfig, SqlStoreConfig, StoreConfig, build_registry};
pub use memory::InMemoryRegistry;
pub use registry::{ContractRegistry, EventLookup, MethodLookup};
pub use self::redis::RedisRegistry;
pub use sql::SqlRegistry;
