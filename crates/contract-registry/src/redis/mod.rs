//! Redis registry backend.
//!
//! The upstream `redis` crate is synchronous, so every operation borrows a
//! connection from a bounded r2d2 pool inside `spawn_blocking`; the
//! connection is released on all exit paths when the guard drops.
//!
//! Registration batches its commands through explicit pipelines: a read
//! phase observes the current catalog, tag and fragment lists in one
//! round trip, then a write phase pushes only what is missing. Replies are
//! drained in strict FIFO send order. The two phases are **not** atomic: a
//! crash in between can leave the specific-codehash write applied without
//! the default-bucket write or vice versa. Every write is conditional on
//! observed state, so an idempotent re-registration converges to the same
//! end state on retry; switching to `MULTI`/`EXEC` would change those
//! retry semantics and is deliberately not done here.

pub mod keys;

use crate::{
    common::{
        AccountInstance, Artifact, Contract, ContractId, DEFAULT_CODE_HASH, Registration,
        prepare_registration,
        error::{RegistryError, RegistryResult},
    },
    config::RedisStoreConfig,
    registry::{ContractRegistry, EventLookup, MethodLookup},
};
use alloy::primitives::{B256, Bytes, Selector};
use async_trait::async_trait;
use std::{sync::Arc, time::Duration};

const COMPONENT: &str = "redis-registry";

/// Registry backend storing all entities in one flat Redis keyspace under
/// the prefixes defined in [`keys`].
#[derive(Clone)]
pub struct RedisRegistry {
    pool: Arc<r2d2::Pool<redis::Client>>,
    namespace: Arc<str>,
    wait: bool,
}

impl std::fmt::Debug for RedisRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisRegistry")
            .field("namespace", &self.namespace)
            .finish_non_exhaustive()
    }
}

impl RedisRegistry {
    /// Build a registry on a bounded connection pool. Connections are
    /// established lazily; a bad URL fails here, an unreachable server
    /// fails on first use.
    pub fn connect(config: &RedisStoreConfig) -> RegistryResult<Self> {
        let client = redis::Client::open(config.url.as_str())
            .map_err(|e| RegistryError::connection(COMPONENT, e))?;

        let pool = r2d2::Pool::builder()
            .max_size(config.max_active)
            .min_idle(Some(config.max_idle))
            .max_lifetime(non_zero(config.max_conn_lifetime))
            .idle_timeout(non_zero(config.idle_timeout))
            .connection_timeout(config.acquire_timeout)
            .build_unchecked(client);

        Ok(Self {
            pool: Arc::new(pool),
            namespace: Arc::from(config.namespace.as_str()),
            wait: config.wait,
        })
    }

    /// Run a synchronous Redis operation on a pooled connection from a
    /// blocking thread, keeping the async runtime responsive.
    async fn with_connection<T, F>(&self, func: F) -> RegistryResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut redis::Connection) -> RegistryResult<T> + Send + 'static,
    {
        let pool = Arc::clone(&self.pool);
        let wait = self.wait;

        tokio::task::spawn_blocking(move || {
            let mut conn = if wait {
                pool.get()
                    .map_err(|e| RegistryError::connection(COMPONENT, e))?
            } else {
                pool.try_get()
                    .ok_or_else(|| RegistryError::connection(COMPONENT, PoolExhausted))?
            };
            func(&mut conn)
        })
        .await
        .map_err(|e| RegistryError::connection(COMPONENT, e))?
    }
}

/// Map a zero duration (meaning "no limit") to `None` for the pool
/// builder.
fn non_zero(duration: Duration) -> Option<Duration> {
    if duration.is_zero() {
        None
    } else {
        Some(duration)
    }
}

#[async_trait]
impl ContractRegistry for RedisRegistry {
    async fn register_contract(&self, contract: &Contract) -> RegistryResult<()> {
        let reg = prepare_registration(contract)?;
        let namespace = Arc::clone(&self.namespace);

        let (method_count, event_count) =
            (reg.fragments.methods.len(), reg.fragments.events.len());
        self.with_connection(move |conn| register_with_conn(conn, &namespace, &reg))
            .await?;

        tracing::debug!(
            id = %contract.id,
            methods = method_count,
            events = event_count,
            "registered contract"
        );
        Ok(())
    }

    async fn deregister_contract(&self, _id: &ContractId) -> RegistryResult<()> {
        Err(RegistryError::feature_not_supported(
            COMPONENT,
            "deregister_contract",
        ))
    }

    async fn delete_artifact(&self, bytecode_hash: B256) -> RegistryResult<()> {
        let namespace = Arc::clone(&self.namespace);
        self.with_connection(move |conn| {
            redis::cmd("DEL")
                .arg(keys::artifact_key(&namespace, bytecode_hash))
                .query::<()>(conn)
                .map_err(|e| RegistryError::connection(COMPONENT, e))
        })
        .await
    }

    async fn get_contract(&self, id: &ContractId) -> RegistryResult<Contract> {
        let id = id.normalized()?;
        let namespace = Arc::clone(&self.namespace);

        let artifact = {
            let id = id.clone();
            self.with_connection(move |conn| artifact_with_conn(conn, &namespace, &id))
                .await?
        };
        Ok(Contract::from_artifact(id, artifact))
    }

    async fn get_methods_by_selector(
        &self,
        selector: Selector,
        instance: AccountInstance,
    ) -> RegistryResult<MethodLookup> {
        let namespace = Arc::clone(&self.namespace);
        self.with_connection(move |conn| {
            if let Some(code_hash) = read_code_hash(conn, &namespace, instance)? {
                let mut entries =
                    read_list(conn, &keys::methods_key(&namespace, code_hash, selector))?;
                if entries.len() == 1 {
                    if let Some(fragment) = entries.pop() {
                        return Ok(MethodLookup::exact(Bytes::from(fragment)));
                    }
                }
            }

            let defaults = read_list(
                conn,
                &keys::methods_key(&namespace, DEFAULT_CODE_HASH, selector),
            )?;
            if defaults.is_empty() {
                return Err(RegistryError::not_found(
                    COMPONENT,
                    format!("method with selector {selector}"),
                ));
            }
            Ok(MethodLookup::candidates(
                defaults.into_iter().map(Bytes::from).collect(),
            ))
        })
        .await
    }

    async fn get_events_by_sig_hash(
        &self,
        sig_hash: B256,
        instance: AccountInstance,
        indexed_input_count: usize,
    ) -> RegistryResult<EventLookup> {
        let namespace = Arc::clone(&self.namespace);
        self.with_connection(move |conn| {
            if let Some(code_hash) = read_code_hash(conn, &namespace, instance)? {
                let mut entries = read_list(
                    conn,
                    &keys::events_key(&namespace, code_hash, sig_hash, indexed_input_count),
                )?;
                if entries.len() == 1 {
                    if let Some(fragment) = entries.pop() {
                        return Ok(EventLookup::exact(Bytes::from(fragment)));
                    }
                }
            }

            let defaults = read_list(
                conn,
                &keys::events_key(&namespace, DEFAULT_CODE_HASH, sig_hash, indexed_input_count),
            )?;
            if defaults.is_empty() {
                return Err(RegistryError::not_found(
                    COMPONENT,
                    format!("event with topic {sig_hash}"),
                ));
            }
            Ok(EventLookup::candidates(
                defaults.into_iter().map(Bytes::from).collect(),
            ))
        })
        .await
    }

    async fn get_catalog(&self) -> RegistryResult<Vec<String>> {
        let namespace = Arc::clone(&self.namespace);
        self.with_connection(move |conn| {
            // By convention the catalog always exists; an empty registry
            // answers with an empty list, not a miss.
            let entries = read_list(conn, &keys::catalog_key(&namespace))?;
            let mut names = decode_strings(entries, "catalog entry")?;
            names.sort();
            Ok(names)
        })
        .await
    }

    async fn get_tags(&self, name: &str) -> RegistryResult<Vec<String>> {
        let namespace = Arc::clone(&self.namespace);
        let name = name.to_string();
        self.with_connection(move |conn| {
            let entries = read_list(conn, &keys::tags_key(&namespace, &name))?;
            if entries.is_empty() {
                return Err(RegistryError::not_found(
                    COMPONENT,
                    format!("tags for {name}"),
                ));
            }
            let mut tags = decode_strings(entries, "tag entry")?;
            tags.sort();
            Ok(tags)
        })
        .await
    }

    async fn set_account_code_hash(
        &self,
        instance: AccountInstance,
        code_hash: B256,
    ) -> RegistryResult<()> {
        let namespace = Arc::clone(&self.namespace);
        self.with_connection(move |conn| {
            // NX keeps the first observed codehash authoritative; later
            // bindings for the same instance are silent no-ops.
            let _: Option<String> = redis::cmd("SET")
                .arg(keys::account_code_hash_key(&namespace, instance))
                .arg(code_hash.as_slice())
                .arg("NX")
                .query(conn)
                .map_err(|e| RegistryError::connection(COMPONENT, e))?;
            Ok(())
        })
        .await
    }
}

/// Registration against one connection: read phase, then conditional
/// write phase. See the module docs for the atomicity caveat.
fn register_with_conn<C>(conn: &mut C, namespace: &str, reg: &Registration) -> RegistryResult<()>
where
    C: redis::ConnectionLike,
{
    let artifact_bytes = serde_json::to_vec(&reg.artifact)
        .map_err(|e| RegistryError::data_corrupted(COMPONENT, "artifact", e))?;

    // Read phase: queue every list we need to inspect, flush once, drain
    // replies in send order.
    let mut reads = redis::pipe();
    reads.lrange(keys::catalog_key(namespace), 0, -1);
    reads.lrange(keys::tags_key(namespace, &reg.id.name), 0, -1);
    for method in &reg.fragments.methods {
        reads.lrange(
            keys::methods_key(namespace, DEFAULT_CODE_HASH, method.selector),
            0,
            -1,
        );
        if let Some(code_hash) = reg.code_hash {
            reads.lrange(keys::methods_key(namespace, code_hash, method.selector), 0, -1);
        }
    }
    for event in &reg.fragments.events {
        reads.lrange(
            keys::events_key(
                namespace,
                DEFAULT_CODE_HASH,
                event.sig_hash,
                event.indexed_input_count,
            ),
            0,
            -1,
        );
        if let Some(code_hash) = reg.code_hash {
            reads.lrange(
                keys::events_key(namespace, code_hash, event.sig_hash, event.indexed_input_count),
                0,
                -1,
            );
        }
    }

    let replies: Vec<Vec<Vec<u8>>> = reads
        .query(conn)
        .map_err(|e| RegistryError::connection(COMPONENT, e))?;
    let mut replies = replies.into_iter();
    let mut next_reply = move || {
        replies
            .next()
            .ok_or_else(|| RegistryError::connection(COMPONENT, ReplyMismatch))
    };

    let catalog = next_reply()?;
    let tags = next_reply()?;

    // Write phase: unconditional sets are idempotent by construction
    // (content-addressed artifact, name+tag binding repointed on purpose);
    // list pushes are gated on the observed state so replays cannot
    // duplicate entries.
    let mut writes = redis::pipe();

    writes.set(
        keys::bytecode_hash_key(namespace, &reg.id.name, &reg.id.tag),
        reg.bytecode_hash.as_slice(),
    );
    writes.set(
        keys::bytecode_hash_key(namespace, &reg.id.name, crate::common::DEFAULT_TAG),
        reg.bytecode_hash.as_slice(),
    );
    writes.set(
        keys::artifact_key(namespace, reg.bytecode_hash),
        artifact_bytes,
    );

    if !contains(&catalog, reg.id.name.as_bytes()) {
        writes.rpush(keys::catalog_key(namespace), reg.id.name.as_str());
    }
    if !contains(&tags, reg.id.tag.as_bytes()) {
        writes.rpush(keys::tags_key(namespace, &reg.id.name), reg.id.tag.as_str());
    }
    if reg.id.tag != crate::common::DEFAULT_TAG
        && !contains(&tags, crate::common::DEFAULT_TAG.as_bytes())
    {
        writes.rpush(
            keys::tags_key(namespace, &reg.id.name),
            crate::common::DEFAULT_TAG,
        );
    }

    for method in &reg.fragments.methods {
        let default_list = next_reply()?;
        if !contains(&default_list, &method.abi) {
            writes.rpush(
                keys::methods_key(namespace, DEFAULT_CODE_HASH, method.selector),
                method.abi.as_ref(),
            );
        }
        if let Some(code_hash) = reg.code_hash {
            let specific_list = next_reply()?;
            if !contains(&specific_list, &method.abi) {
                writes.rpush(
                    keys::methods_key(namespace, code_hash, method.selector),
                    method.abi.as_ref(),
                );
            }
        }
    }

    for event in &reg.fragments.events {
        let default_list = next_reply()?;
        if !contains(&default_list, &event.abi) {
            writes.rpush(
                keys::events_key(
                    namespace,
                    DEFAULT_CODE_HASH,
                    event.sig_hash,
                    event.indexed_input_count,
                ),
                event.abi.as_ref(),
            );
        }
        if let Some(code_hash) = reg.code_hash {
            let specific_list = next_reply()?;
            if !contains(&specific_list, &event.abi) {
                writes.rpush(
                    keys::events_key(
                        namespace,
                        code_hash,
                        event.sig_hash,
                        event.indexed_input_count,
                    ),
                    event.abi.as_ref(),
                );
            }
        }
    }

    writes
        .query::<()>(conn)
        .map_err(|e| RegistryError::connection(COMPONENT, e))
}

/// Load and decode the artifact bound to a contract id.
fn artifact_with_conn<C>(conn: &mut C, namespace: &str, id: &ContractId) -> RegistryResult<Artifact>
where
    C: redis::ConnectionLike,
{
    let hash: Option<Vec<u8>> = redis::cmd("GET")
        .arg(keys::bytecode_hash_key(namespace, &id.name, &id.tag))
        .query(conn)
        .map_err(|e| RegistryError::connection(COMPONENT, e))?;
    let hash = hash
        .filter(|bytes| !bytes.is_empty())
        .ok_or_else(|| RegistryError::not_found(COMPONENT, format!("contract {id}")))?;
    let bytecode_hash = B256::try_from(hash.as_slice())
        .map_err(|e| RegistryError::data_corrupted(COMPONENT, "bytecode hash", e))?;

    let artifact: Option<Vec<u8>> = redis::cmd("GET")
        .arg(keys::artifact_key(namespace, bytecode_hash))
        .query(conn)
        .map_err(|e| RegistryError::connection(COMPONENT, e))?;
    let artifact = artifact.filter(|bytes| !bytes.is_empty()).ok_or_else(|| {
        // A dangling binding means a registration was torn or the artifact
        // was deleted; surfaced as a miss, the caller cannot repair it.
        RegistryError::not_found(COMPONENT, format!("artifact for {id}"))
    })?;

    serde_json::from_slice(&artifact)
        .map_err(|e| RegistryError::data_corrupted(COMPONENT, "artifact", e))
}

/// Read the bound codehash of an instance, `None` when unbound.
fn read_code_hash<C>(
    conn: &mut C,
    namespace: &str,
    instance: AccountInstance,
) -> RegistryResult<Option<B256>>
where
    C: redis::ConnectionLike,
{
    let raw: Option<Vec<u8>> = redis::cmd("GET")
        .arg(keys::account_code_hash_key(namespace, instance))
        .query(conn)
        .map_err(|e| RegistryError::connection(COMPONENT, e))?;

    raw.filter(|bytes| !bytes.is_empty())
        .map(|bytes| {
            B256::try_from(bytes.as_slice())
                .map_err(|e| RegistryError::data_corrupted(COMPONENT, "codehash", e))
        })
        .transpose()
}

/// LRANGE an entire list.
fn read_list<C>(conn: &mut C, key: &str) -> RegistryResult<Vec<Vec<u8>>>
where
    C: redis::ConnectionLike,
{
    redis::cmd("LRANGE")
        .arg(key)
        .arg(0)
        .arg(-1)
        .query(conn)
        .map_err(|e| RegistryError::connection(COMPONENT, e))
}

fn contains(list: &[Vec<u8>], needle: &[u8]) -> bool {
    list.iter().any(|entry| entry.as_slice() == needle)
}

fn decode_strings(entries: Vec<Vec<u8>>, what: &'static str) -> RegistryResult<Vec<String>> {
    entries
        .into_iter()
        .map(|entry| {
            String::from_utf8(entry)
                .map_err(|e| RegistryError::data_corrupted(COMPONENT, what, e))
        })
        .collect()
}

/// Fail-fast pool acquisition found no idle connection.
#[derive(Debug, thiserror::Error)]
#[error("connection pool exhausted")]
struct PoolExhausted;

/// A pipeline returned fewer replies than commands sent.
#[derive(Debug, thiserror::Error)]
#[error("pipeline reply count does not match sent commands")]
struct ReplyMismatch;
