//! Named pools sharing one slab store
//!
//! Create a single [`PoolRegistry`] at startup and pass it (or the pools it
//! hands out) by `Arc`. It holds no external resources, so dropping it is the
//! only teardown needed.

use super::{AdaptivePool, PoolStats};
use crate::config::{BufpoolConfig, PoolConfig};
use crate::slab::SlabStore;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::info;

/// Name of the pool returned by [`PoolRegistry::default_pool`]
pub const DEFAULT_POOL: &str = "default";

/// Registry of adaptive pools
pub struct PoolRegistry {
    store: Arc<SlabStore>,
    pool_config: PoolConfig,
    default_pool: Arc<AdaptivePool>,
    pools: DashMap<String, Arc<AdaptivePool>>,
}

impl Default for PoolRegistry {
    fn default() -> Self {
        Self::new(&BufpoolConfig::default())
    }
}

impl PoolRegistry {
    pub fn new(config: &BufpoolConfig) -> Self {
        let store = Arc::new(SlabStore::with_config(config.store.clone()));
        let default_pool = Arc::new(AdaptivePool::named(
            DEFAULT_POOL,
            store.clone(),
            config.pool.clone(),
        ));
        info!("Pool registry ready");

        Self {
            store,
            pool_config: config.pool.clone(),
            default_pool,
            pools: DashMap::new(),
        }
    }

    /// Pool for callers without a dedicated usage pattern
    pub fn default_pool(&self) -> &Arc<AdaptivePool> {
        &self.default_pool
    }

    /// Get a named pool, creating it with the registry's tuning if needed
    pub fn pool(&self, name: &str) -> Arc<AdaptivePool> {
        self.pool_with_config(name, self.pool_config.clone())
    }

    /// Get a named pool, creating it with `config` if needed.
    ///
    /// An existing pool keeps the tuning it was created with.
    pub fn pool_with_config(&self, name: &str, config: PoolConfig) -> Arc<AdaptivePool> {
        if name == DEFAULT_POOL {
            return self.default_pool.clone();
        }
        if let Some(pool) = self.pools.get(name) {
            return pool.value().clone();
        }

        self.pools
            .entry(name.to_string())
            .or_insert_with(|| {
                Arc::new(AdaptivePool::named(name, self.store.clone(), config))
            })
            .value()
            .clone()
    }

    /// Look up a pool without creating it
    pub fn get(&self, name: &str) -> Option<Arc<AdaptivePool>> {
        if name == DEFAULT_POOL {
            return Some(self.default_pool.clone());
        }
        self.pools.get(name).map(|pool| pool.value().clone())
    }

    /// Forget a named pool; buffers already handed out stay valid
    pub fn remove(&self, name: &str) -> Option<Arc<AdaptivePool>> {
        let removed = self.pools.remove(name).map(|(_, pool)| pool);
        if removed.is_some() {
            info!(pool = name, "Removed pool");
        }
        removed
    }

    /// Names of all pools, default first
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.pools.iter().map(|entry| entry.key().clone()).collect();
        names.sort();
        names.insert(0, DEFAULT_POOL.to_string());
        names
    }

    /// Store shared by every pool
    pub fn store(&self) -> &Arc<SlabStore> {
        &self.store
    }

    /// Statistics for every pool, default first
    pub fn stats(&self) -> Vec<PoolStats> {
        self.names()
            .iter()
            .filter_map(|name| self.get(name))
            .map(|pool| pool.stats())
            .collect()
    }
}
