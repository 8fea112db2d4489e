//! Relational registry backend on sqlx.
//!
//! Registration runs inside a single transaction of `ON CONFLICT` upserts,
//! so concurrent registrations of the same artifact resolve through the
//! unique constraints instead of duplicate-key failures. Unlike the KV
//! backends there is no separate default bucket: method and event rows are
//! stored once per codehash (the reserved zero codehash standing in when a
//! contract has no deployed bytecode) and the fallback candidate set is a
//! plain query with no codehash filter.

use crate::{
    common::{
        AccountInstance, Contract, ContractId, DEFAULT_CODE_HASH, DEFAULT_TAG,
        prepare_registration,
        error::{RegistryError, RegistryResult},
    },
    config::SqlStoreConfig,
    registry::{ContractRegistry, EventLookup, MethodLookup},
};
use alloy::primitives::{B256, Bytes, Selector};
use async_trait::async_trait;
use sqlx::{
    Row, SqlitePool,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};
use std::str::FromStr;

const COMPONENT: &str = "sql-registry";

/// Registry backend persisting to a SQL database.
#[derive(Debug, Clone)]
pub struct SqlRegistry {
    pool: SqlitePool,
}

impl SqlRegistry {
    /// Connect to the database, creating the file if it does not exist.
    pub async fn connect(config: &SqlStoreConfig) -> RegistryResult<Self> {
        let options = SqliteConnectOptions::from_str(&config.database_url)
            .map_err(|e| RegistryError::invalid_argument(format!("bad database url: {e}")))?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await
            .map_err(|e| RegistryError::connection(COMPONENT, e))?;

        tracing::debug!(url = %config.database_url, "connected to registry database");
        Ok(Self { pool })
    }

    /// Apply pending schema migrations.
    pub async fn run_migrations(&self) -> RegistryResult<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| RegistryError::connection(COMPONENT, e))?;
        tracing::debug!("registry migrations applied");
        Ok(())
    }

    /// Close the connection pool gracefully.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn artifact_column(&self, id: &ContractId, column: &str) -> RegistryResult<Bytes> {
        let id = id.normalized()?;
        let sql = format!(
            "SELECT a.{column} AS value FROM artifacts a \
             JOIN tags t ON t.artifact_id = a.id \
             JOIN repositories r ON r.id = t.repository_id \
             WHERE r.name = ?1 AND t.name = ?2"
        );
        let row = sqlx::query(&sql)
            .bind(&id.name)
            .bind(&id.tag)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| RegistryError::connection(COMPONENT, e))?
            .ok_or_else(|| RegistryError::not_found(COMPONENT, format!("contract {id}")))?;
        Ok(Bytes::from(row.get::<Vec<u8>, _>("value")))
    }
}

#[async_trait]
impl ContractRegistry for SqlRegistry {
    async fn register_contract(&self, contract: &Contract) -> RegistryResult<()> {
        let reg = prepare_registration(contract)?;
        let code_hash = reg.code_hash.unwrap_or(DEFAULT_CODE_HASH);

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| RegistryError::connection(COMPONENT, e))?;

        sqlx::query("INSERT INTO repositories (name) VALUES (?1) ON CONFLICT (name) DO NOTHING")
            .bind(&reg.id.name)
            .execute(&mut *tx)
            .await
            .map_err(|e| RegistryError::connection(COMPONENT, e))?;
        let repository_id: i64 = sqlx::query_scalar("SELECT id FROM repositories WHERE name = ?1")
            .bind(&reg.id.name)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| RegistryError::connection(COMPONENT, e))?;

        sqlx::query(
            "INSERT INTO artifacts (abi, bytecode, deployed_bytecode, codehash) \
             VALUES (?1, ?2, ?3, ?4) ON CONFLICT (abi, codehash) DO NOTHING",
        )
        .bind(reg.artifact.abi.to_vec())
        .bind(reg.artifact.bytecode.to_vec())
        .bind(reg.artifact.deployed_bytecode.to_vec())
        .bind(code_hash.as_slice().to_vec())
        .execute(&mut *tx)
        .await
        .map_err(|e| RegistryError::connection(COMPONENT, e))?;
        let artifact_id: i64 =
            sqlx::query_scalar("SELECT id FROM artifacts WHERE abi = ?1 AND codehash = ?2")
                .bind(reg.artifact.abi.to_vec())
                .bind(code_hash.as_slice().to_vec())
                .fetch_one(&mut *tx)
                .await
                .map_err(|e| RegistryError::connection(COMPONENT, e))?;

        // The tag binding is the one mutable edge in the model: conflicting
        // rows are repointed at the new artifact.
        for tag in [reg.id.tag.as_str(), DEFAULT_TAG] {
            sqlx::query(
                "INSERT INTO tags (name, repository_id, artifact_id) VALUES (?1, ?2, ?3) \
                 ON CONFLICT (name, repository_id) DO UPDATE SET artifact_id = excluded.artifact_id",
            )
            .bind(tag)
            .bind(repository_id)
            .bind(artifact_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| RegistryError::connection(COMPONENT, e))?;
        }

        for method in &reg.fragments.methods {
            sqlx::query(
                "INSERT INTO methods (codehash, selector, abi) VALUES (?1, ?2, ?3) \
                 ON CONFLICT DO NOTHING",
            )
            .bind(code_hash.as_slice().to_vec())
            .bind(method.selector.as_slice().to_vec())
            .bind(method.abi.to_vec())
            .execute(&mut *tx)
            .await
            .map_err(|e| RegistryError::connection(COMPONENT, e))?;
        }

        for event in &reg.fragments.events {
            sqlx::query(
                "INSERT INTO events (codehash, sig_hash, indexed_input_count, abi) \
                 VALUES (?1, ?2, ?3, ?4) ON CONFLICT DO NOTHING",
            )
            .bind(code_hash.as_slice().to_vec())
            .bind(event.sig_hash.as_slice().to_vec())
            .bind(event.indexed_input_count as i64)
            .bind(event.abi.to_vec())
            .execute(&mut *tx)
            .await
            .map_err(|e| RegistryError::connection(COMPONENT, e))?;
        }

        tx.commit()
            .await
            .map_err(|e| RegistryError::connection(COMPONENT, e))?;

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
        let deleted = sqlx::query(
            "DELETE FROM tags WHERE name = ?1 AND repository_id IN \
             (SELECT id FROM repositories WHERE name = ?2)",
        )
        .bind(&id.tag)
        .bind(&id.name)
        .execute(&self.pool)
        .await
        .map_err(|e| RegistryError::connection(COMPONENT, e))?;

        if deleted.rows_affected() == 0 {
            return Err(RegistryError::not_found(
                COMPONENT,
                format!("contract {id}"),
            ));
        }
        Ok(())
    }

    async fn delete_artifact(&self, _bytecode_hash: B256) -> RegistryResult<()> {
        // The schema addresses artifacts by (abi, codehash); there is no
        // bytecode-hash column to match a deletion request against.
        Err(RegistryError::feature_not_supported(
            COMPONENT,
            "delete_artifact",
        ))
    }

    async fn get_contract(&self, id: &ContractId) -> RegistryResult<Contract> {
        let id = id.normalized()?;
        let row = sqlx::query(
            "SELECT a.abi, a.bytecode, a.deployed_bytecode FROM artifacts a \
             JOIN tags t ON t.artifact_id = a.id \
             JOIN repositories r ON r.id = t.repository_id \
             WHERE r.name = ?1 AND t.name = ?2",
        )
        .bind(&id.name)
        .bind(&id.tag)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RegistryError::connection(COMPONENT, e))?
        .ok_or_else(|| RegistryError::not_found(COMPONENT, format!("contract {id}")))?;

        Ok(Contract::new(
            id,
            Bytes::from(row.get::<Vec<u8>, _>("abi")),
            Bytes::from(row.get::<Vec<u8>, _>("bytecode")),
            Bytes::from(row.get::<Vec<u8>, _>("deployed_bytecode")),
        ))
    }

    async fn get_contract_abi(&self, id: &ContractId) -> RegistryResult<Bytes> {
        self.artifact_column(id, "abi").await
    }

    async fn get_contract_bytecode(&self, id: &ContractId) -> RegistryResult<Bytes> {
        self.artifact_column(id, "bytecode").await
    }

    async fn get_contract_deployed_bytecode(&self, id: &ContractId) -> RegistryResult<Bytes> {
        self.artifact_column(id, "deployed_bytecode").await
    }

    async fn get_methods_by_selector(
        &self,
        selector: Selector,
        instance: AccountInstance,
    ) -> RegistryResult<MethodLookup> {
        let exact = sqlx::query(
            "SELECT m.abi FROM methods m \
             JOIN codehashes c ON c.codehash = m.codehash \
             WHERE c.chain_id = ?1 AND c.address = ?2 AND m.selector = ?3",
        )
        .bind(instance.chain_id.to_string())
        .bind(instance.address.as_slice().to_vec())
        .bind(selector.as_slice().to_vec())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RegistryError::connection(COMPONENT, e))?;

        if let Some(row) = exact {
            return Ok(MethodLookup::exact(Bytes::from(
                row.get::<Vec<u8>, _>("abi"),
            )));
        }

        // Fallback: one distinct fragment per ABI content across every
        // codehash, in first-registration order.
        let defaults: Vec<Vec<u8>> = sqlx::query_scalar(
            "SELECT abi FROM methods WHERE selector = ?1 GROUP BY abi ORDER BY MIN(id)",
        )
        .bind(selector.as_slice().to_vec())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RegistryError::connection(COMPONENT, e))?;

        if defaults.is_empty() {
            return Err(RegistryError::not_found(
                COMPONENT,
                format!("method with selector {selector}"),
            ));
        }
        Ok(MethodLookup::candidates(
            defaults.into_iter().map(Bytes::from).collect(),
        ))
    }

    async fn get_events_by_sig_hash(
        &self,
        sig_hash: B256,
        instance: AccountInstance,
        indexed_input_count: usize,
    ) -> RegistryResult<EventLookup> {
        let exact = sqlx::query(
            "SELECT e.abi FROM events e \
             JOIN codehashes c ON c.codehash = e.codehash \
             WHERE c.chain_id = ?1 AND c.address = ?2 \
             AND e.sig_hash = ?3 AND e.indexed_input_count = ?4",
        )
        .bind(instance.chain_id.to_string())
        .bind(instance.address.as_slice().to_vec())
        .bind(sig_hash.as_slice().to_vec())
        .bind(indexed_input_count as i64)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RegistryError::connection(COMPONENT, e))?;

        if let Some(row) = exact {
            return Ok(EventLookup::exact(Bytes::from(
                row.get::<Vec<u8>, _>("abi"),
            )));
        }

        let defaults: Vec<Vec<u8>> = sqlx::query_scalar(
            "SELECT abi FROM events WHERE sig_hash = ?1 AND indexed_input_count = ?2 \
             GROUP BY abi ORDER BY MIN(id)",
        )
        .bind(sig_hash.as_slice().to_vec())
        .bind(indexed_input_count as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RegistryError::connection(COMPONENT, e))?;

        if defaults.is_empty() {
            return Err(RegistryError::not_found(
                COMPONENT,
                format!("event with topic {sig_hash}"),
            ));
        }
        Ok(EventLookup::candidates(
            defaults.into_iter().map(Bytes::from).collect(),
        ))
    }

    async fn get_catalog(&self) -> RegistryResult<Vec<String>> {
        sqlx::query_scalar("SELECT name FROM repositories ORDER BY name")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| RegistryError::connection(COMPONENT, e))
    }

    async fn get_tags(&self, name: &str) -> RegistryResult<Vec<String>> {
        let repository: Option<i64> = sqlx::query_scalar("SELECT id FROM repositories WHERE name = ?1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| RegistryError::connection(COMPONENT, e))?;
        let repository_id = repository
            .ok_or_else(|| RegistryError::not_found(COMPONENT, format!("tags for {name}")))?;

        sqlx::query_scalar("SELECT name FROM tags WHERE repository_id = ?1 ORDER BY name")
            .bind(repository_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| RegistryError::connection(COMPONENT, e))
    }

    async fn set_account_code_hash(
        &self,
        instance: AccountInstance,
        code_hash: B256,
    ) -> RegistryResult<()> {
        // DO NOTHING keeps the first observed codehash authoritative,
        // matching the KV backends.
        sqlx::query(
            "INSERT INTO codehashes (chain_id, address, codehash) VALUES (?1, ?2, ?3) \
             ON CONFLICT (chain_id, address) DO NOTHING",
        )
        .bind(instance.chain_id.to_string())
        .bind(instance.address.as_slice().to_vec())
        .bind(code_hash.as_slice().to_vec())
        .execute(&self.pool)
        .await
        .map_err(|e| RegistryError::connection(COMPONENT, e))?;
        Ok(())
    }
}
