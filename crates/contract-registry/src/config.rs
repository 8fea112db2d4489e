//! Backend configuration and explicit registry construction.
//!
//! There is no process-wide registry singleton: the owning service builds
//! exactly the backend it wants and injects the trait object wherever
//! resolution is needed.

use crate::{
    common::error::RegistryResult,
    memory::InMemoryRegistry,
    redis::RedisRegistry,
    registry::ContractRegistry,
    sql::SqlRegistry,
};
use std::{sync::Arc, time::Duration};

/// Redis backend settings, including the bounded connection pool.
#[derive(Debug, Clone)]
pub struct RedisStoreConfig {
    pub url: String,
    /// Prefix prepended to every key, isolating registries sharing one
    /// Redis instance.
    pub namespace: String,
    /// Idle connections kept alive in the pool.
    pub max_idle: u32,
    /// Upper bound on open connections.
    pub max_active: u32,
    /// Recycle connections older than this; zero means no limit.
    pub max_conn_lifetime: Duration,
    /// Close connections idle longer than this; zero means no limit.
    pub idle_timeout: Duration,
    /// How long a caller may wait for a free connection.
    pub acquire_timeout: Duration,
    /// Block for a free connection when the pool is exhausted instead of
    /// failing fast.
    pub wait: bool,
}

impl Default for RedisStoreConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379".to_string(),
            namespace: "contract-registry".to_string(),
            max_idle: 4,
            max_active: 16,
            max_conn_lifetime: Duration::ZERO,
            idle_timeout: Duration::from_secs(60),
            acquire_timeout: Duration::from_secs(30),
            wait: true,
        }
    }
}

/// Relational backend settings.
#[derive(Debug, Clone)]
pub struct SqlStoreConfig {
    pub database_url: String,
    pub max_connections: u32,
}

impl SqlStoreConfig {
    /// Ephemeral in-memory database, used by tests. A single connection is
    /// required: every new in-memory SQLite connection starts empty.
    pub fn in_memory() -> Self {
        Self {
            database_url: "sqlite::memory:".to_string(),
            max_connections: 1,
        }
    }
}

impl Default for SqlStoreConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite://contract-registry.db".to_string(),
            max_connections: 5,
        }
    }
}

/// Which backend to run the registry on.
#[derive(Debug, Clone)]
pub enum StoreConfig {
    InMemory,
    Redis(RedisStoreConfig),
    Sql(SqlStoreConfig),
}

/// Build the configured backend, running any required setup (relational
/// migrations).
pub async fn build_registry(config: &StoreConfig) -> RegistryResult<Arc<dyn ContractRegistry>> {
    match config {
        StoreConfig::InMemory => {
            tracing::info!("using in-memory contract registry");
            Ok(Arc::new(InMemoryRegistry::new()))
        }
        StoreConfig::Redis(redis) => {
            tracing::info!(url = %redis.url, namespace = %redis.namespace, "using redis contract registry");
            Ok(Arc::new(RedisRegistry::connect(redis)?))
        }
        StoreConfig::Sql(sql) => {
            tracing::info!(url = %sql.database_url, "using sql contract registry");
            let registry = SqlRegistry::connect(sql).await?;
            registry.run_migrations().await?;
            Ok(Arc::new(registry))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_build_in_memory_registry() {
        let registry = build_registry(&StoreConfig::InMemory).await.unwrap();
        assert!(registry.get_catalog().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_build_sql_registry_runs_migrations() {
        let registry = build_registry(&StoreConfig::Sql(SqlStoreConfig::in_memory()))
            .await
            .unwrap();
        assert!(registry.get_catalog().await.unwrap().is_empty());
    }
}
