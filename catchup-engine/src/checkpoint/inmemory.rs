//! 内存版检查点存储（InMemoryCheckpointStore）
//!
//! 基于 `DashMap` 的线程安全实现，另提供不可用与加载失败的故障注入，便于测试重试路径。

use async_trait::async_trait;
use catchup_domain::checkpoint::{Checkpoint, CheckpointStore};
use catchup_domain::error::{DomainError, DomainResult as Result};
use catchup_domain::position::Position;
use catchup_domain::subscription::SubscriptionId;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

pub struct InMemoryCheckpointStore {
    checkpoints: DashMap<SubscriptionId, Checkpoint>,
    available: AtomicBool,
    failing_loads: AtomicU32,
}

impl Default for InMemoryCheckpointStore {
    fn default() -> Self {
        Self {
            checkpoints: DashMap::new(),
            available: AtomicBool::new(true),
            failing_loads: AtomicU32::new(0),
        }
    }
}

impl InMemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 读取完整的检查点记录
    pub fn get(&self, subscription_id: &str) -> Option<Checkpoint> {
        self.checkpoints.get(subscription_id).map(|c| c.clone())
    }

    /// 标记存储是否可达；不可达时 `load`/`store` 均返回 `StoreUnavailable`
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::Release);
    }

    /// 令接下来的 `n` 次 `load` 失败
    pub fn fail_next_loads(&self, n: u32) {
        self.failing_loads.store(n, Ordering::Release);
    }

    fn ensure_available(&self) -> Result<()> {
        if self.available.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(DomainError::store_unavailable("in-memory store marked unavailable"))
        }
    }
}

#[async_trait]
impl CheckpointStore for InMemoryCheckpointStore {
    async fn load(&self, subscription_id: &SubscriptionId) -> Result<Option<Position>> {
        self.ensure_available()?;

        let injected = self
            .failing_loads
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(DomainError::store_unavailable("injected load failure"));
        }

        Ok(self
            .checkpoints
            .get(subscription_id.as_str())
            .map(|c| c.position()))
    }

    async fn store(&self, subscription_id: &SubscriptionId, position: Position) -> Result<()> {
        self.ensure_available()?;

        let checkpoint = Checkpoint::builder()
            .subscription_id(subscription_id.clone())
            .position(position)
            .build();
        self.checkpoints.insert(subscription_id.clone(), checkpoint);
        Ok(())
    }
}
