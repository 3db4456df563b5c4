//! 并发注册表
//!
//! 维护模型名称到许可池的映射。查找走读锁，首次创建时升级为写锁并二次检查，
//! 保证同一模型只会创建一个许可池。

use crate::config::{resolve_concurrency, LlmConfig};
use crate::error::GateError;
use crate::pool::PermitPool;
use ahash::AHashMap as HashMap;
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// 单个许可池的统计信息
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    pub key: String,
    pub capacity: usize,
    pub in_flight: usize,
    pub available: usize,
}

/// `initialize` 的执行结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InitSummary {
    /// 新创建的许可池
    pub created: Vec<String>,
    /// 已存在且容量一致、保持不变的许可池
    pub preserved: Vec<String>,
    /// 已存在但配置容量不同的许可池（保持不变，需要显式 `reset`）
    pub mismatched: Vec<String>,
}

struct RegistryInner {
    pools: HashMap<String, Arc<PermitPool>>,
    overrides: HashMap<String, i64>,
    default_concurrency: usize,
    closed: bool,
}

impl RegistryInner {
    fn capacity_for(&self, key: &str) -> usize {
        resolve_concurrency(self.overrides.get(key).copied(), self.default_concurrency)
    }
}

/// 并发注册表
///
/// 通过 `Arc<ConcurrencyRegistry>` 注入到各个 [`Dispatcher`](crate::dispatcher::Dispatcher)，
/// 不使用全局单例。
pub struct ConcurrencyRegistry {
    inner: RwLock<RegistryInner>,
}

impl ConcurrencyRegistry {
    /// 创建只有默认并发度的注册表
    pub fn new(default_concurrency: usize) -> Self {
        Self {
            inner: RwLock::new(RegistryInner {
                pools: HashMap::new(),
                overrides: HashMap::new(),
                default_concurrency: default_concurrency.max(1),
                closed: false,
            }),
        }
    }

    /// 根据配置创建注册表，并为配置中的每个模型预先创建许可池
    pub fn from_config(config: &LlmConfig) -> Self {
        let registry = Self::new(config.default_concurrency);
        registry.initialize(config);
        registry
    }

    /// 获取模型对应的许可池，不存在时创建
    pub fn get_pool(&self, key: &str) -> Result<Arc<PermitPool>, GateError> {
        {
            let inner = self.inner.read();
            if inner.closed {
                return Err(GateError::RegistryClosed);
            }
            if let Some(pool) = inner.pools.get(key) {
                return Ok(Arc::clone(pool));
            }
        }

        let mut inner = self.inner.write();

        // 双重检查
        if inner.closed {
            return Err(GateError::RegistryClosed);
        }
        if let Some(pool) = inner.pools.get(key) {
            return Ok(Arc::clone(pool));
        }

        let capacity = inner.capacity_for(key);
        let pool = Arc::new(PermitPool::new(key, capacity));
        inner.pools.insert(key.to_string(), Arc::clone(&pool));
        debug!(model = %key, capacity, "创建许可池");
        Ok(pool)
    }

    /// 按配置初始化
    ///
    /// 更新默认并发度和每个模型的并发配置，并为尚无许可池的模型创建许可池。
    /// 已存在的许可池一律保留，不会丢失正在使用的许可；容量与配置不一致的
    /// 会记录告警，需要时调用 [`reset`](Self::reset) 替换。
    pub fn initialize(&self, config: &LlmConfig) -> InitSummary {
        let mut inner = self.inner.write();
        let mut summary = InitSummary::default();

        if inner.closed {
            warn!("注册表已关闭，忽略初始化");
            return summary;
        }

        inner.default_concurrency = config.default_concurrency.max(1);
        inner.overrides = config.model_concurrency.clone();

        let mut keys: Vec<String> = config.model_concurrency.keys().cloned().collect();
        keys.sort();

        for key in keys {
            let capacity = inner.capacity_for(&key);
            match inner.pools.get(&key) {
                Some(existing) if existing.capacity() == capacity => {
                    summary.preserved.push(key);
                }
                Some(existing) => {
                    warn!(
                        model = %key,
                        current = existing.capacity(),
                        configured = capacity,
                        in_flight = existing.in_flight(),
                        "许可池容量与配置不一致，保留现有许可池"
                    );
                    summary.mismatched.push(key);
                }
                None => {
                    inner
                        .pools
                        .insert(key.clone(), Arc::new(PermitPool::new(key.as_str(), capacity)));
                    summary.created.push(key);
                }
            }
        }

        info!(
            created = summary.created.len(),
            preserved = summary.preserved.len(),
            mismatched = summary.mismatched.len(),
            default_concurrency = inner.default_concurrency,
            "并发注册表初始化完成"
        );
        summary
    }

    /// 用指定容量替换模型的许可池
    ///
    /// 旧许可池会被关闭并返回。旧池上已发出的许可不计入新池，
    /// 替换期间该模型的实际并发可能超过新容量。
    pub fn reset(
        &self,
        key: &str,
        capacity: usize,
    ) -> Result<Option<Arc<PermitPool>>, GateError> {
        if key.trim().is_empty() {
            return Err(GateError::ValidationError("模型名称不能为空".to_string()));
        }

        let mut inner = self.inner.write();
        if inner.closed {
            return Err(GateError::RegistryClosed);
        }

        let pool = Arc::new(PermitPool::new(key, capacity));
        let old = inner.pools.insert(key.to_string(), pool);

        if let Some(old) = &old {
            warn!(
                model = %key,
                old_capacity = old.capacity(),
                new_capacity = capacity.max(1),
                orphaned = old.in_flight(),
                "许可池已替换"
            );
            old.close();
        }

        Ok(old)
    }

    /// 新建许可池时模型会得到的容量
    pub fn capacity_for(&self, key: &str) -> usize {
        self.inner.read().capacity_for(key)
    }

    /// 所有许可池的统计信息，按模型名称排序
    pub fn stats(&self) -> Vec<PoolStats> {
        let inner = self.inner.read();
        let mut stats: Vec<PoolStats> = inner
            .pools
            .values()
            .map(|pool| PoolStats {
                key: pool.key().to_string(),
                capacity: pool.capacity(),
                in_flight: pool.in_flight(),
                available: pool.available(),
            })
            .collect();
        stats.sort_by(|a, b| a.key.cmp(&b.key));
        stats
    }

    /// 是否已存在该模型的许可池
    pub fn contains(&self, key: &str) -> bool {
        self.inner.read().pools.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.inner.read().pools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_closed(&self) -> bool {
        self.inner.read().closed
    }

    /// 停止服务：关闭所有许可池并清空注册表
    pub fn shutdown(&self) {
        let mut inner = self.inner.write();
        if inner.closed {
            return;
        }

        inner.closed = true;
        for pool in inner.pools.values() {
            pool.close();
        }
        let count = inner.pools.len();
        inner.pools.clear();
        info!(pools = count, "并发注册表已关闭");
    }
}

impl Default for ConcurrencyRegistry {
    fn default() -> Self {
        Self::new(crate::constants::DEFAULT_CONCURRENCY)
    }
}

impl std::fmt::Debug for ConcurrencyRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.read();
        f.debug_struct("ConcurrencyRegistry")
            .field("pools", &inner.pools.len())
            .field("default_concurrency", &inner.default_concurrency)
            .field("closed", &inner.closed)
            .finish()
    }
}
