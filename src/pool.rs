//! 许可池模块
//!
//! 每个模型对应一个有界计数信号量，限制同时进行的调用数量。

use crate::error::GateError;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// 并发许可池
///
/// 使用 `tokio::sync::Semaphore` 实现，容量在创建时确定，之后不可调整。
///
/// # 特性
/// - 支持超时等待
/// - 等待中的 future 被丢弃即取消，不会泄露许可
/// - 关闭后唤醒所有等待者
///
/// # 示例
/// ```rust
/// use modelgate::pool::PermitPool;
///
/// #[tokio::main]
/// async fn main() {
///     let pool = PermitPool::new("model-a", 2);
///
///     let permit = pool.acquire(None).await.unwrap();
///     assert_eq!(pool.in_flight(), 1);
///     drop(permit); // 释放许可
///     assert_eq!(pool.in_flight(), 0);
/// }
/// ```
#[derive(Debug)]
pub struct PermitPool {
    key: String,
    capacity: usize,
    semaphore: Arc<Semaphore>,
}

/// 已获取的许可，离开作用域时自动归还
#[derive(Debug)]
pub struct Permit {
    key: String,
    _inner: OwnedSemaphorePermit,
}

impl Permit {
    /// 许可所属的模型
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl PermitPool {
    /// 创建新的许可池
    ///
    /// 容量为 0 时按 1 处理，保证池子永远可用。
    pub fn new(key: impl Into<String>, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            key: key.into(),
            capacity,
            semaphore: Arc::new(Semaphore::new(capacity)),
        }
    }

    /// 获取一个许可
    ///
    /// # 参数
    /// - `timeout`: 最长等待时间，`None` 表示一直等待
    ///
    /// # 返回
    /// - `Ok(permit)`: 成功获取许可
    /// - `Err(AcquireTimeout)`: 等待超时
    /// - `Err(PoolClosed)`: 许可池已关闭
    pub async fn acquire(&self, timeout: Option<Duration>) -> Result<Permit, GateError> {
        let started = Instant::now();
        let acquire = Arc::clone(&self.semaphore).acquire_owned();

        let permit = match timeout {
            Some(timeout) => tokio::time::timeout(timeout, acquire).await.map_err(|_| {
                GateError::AcquireTimeout {
                    model: self.key.clone(),
                    waited_ms: started.elapsed().as_millis() as u64,
                }
            })?,
            None => acquire.await,
        }
        .map_err(|_| GateError::PoolClosed(self.key.clone()))?;

        Ok(Permit {
            key: self.key.clone(),
            _inner: permit,
        })
    }

    /// 尝试获取许可（非阻塞）
    pub fn try_acquire(&self) -> Option<Permit> {
        Arc::clone(&self.semaphore)
            .try_acquire_owned()
            .ok()
            .map(|permit| Permit {
                key: self.key.clone(),
                _inner: permit,
            })
    }

    /// 模型名称
    pub fn key(&self) -> &str {
        &self.key
    }

    /// 容量
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// 当前可用许可数
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// 当前正在使用的许可数
    pub fn in_flight(&self) -> usize {
        self.capacity.saturating_sub(self.available())
    }

    /// 是否已关闭
    pub fn is_closed(&self) -> bool {
        self.semaphore.is_closed()
    }

    /// 关闭许可池，所有等待者收到 `PoolClosed`
    ///
    /// 已发出的许可仍然有效，归还时不会报错。
    pub fn close(&self) {
        self.semaphore.close();
    }
}
