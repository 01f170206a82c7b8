//! 订阅注册表（SubscriptionRegistry）
//!
//! 协调器启动时构建，之后结构不可变：`id → SubscriptionRuntime`。
//! 每个运行时持有不可变配置，以及两个可观察单元：状态与内存中的最新检查点。
//!
use catchup_domain::error::{DomainError, DomainResult};
use catchup_domain::position::Position;
use catchup_domain::subscription::{SubscriptionConfig, SubscriptionId, SubscriptionStatus};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, warn};

/// 单个订阅的运行时单元
pub struct SubscriptionRuntime {
    config: Arc<SubscriptionConfig>,
    status: watch::Sender<SubscriptionStatus>,
    checkpoint: watch::Sender<Option<Position>>,
}

impl SubscriptionRuntime {
    pub fn new(config: SubscriptionConfig) -> Self {
        Self {
            config: Arc::new(config),
            status: watch::Sender::new(SubscriptionStatus::NotStarted),
            checkpoint: watch::Sender::new(None),
        }
    }

    pub fn id(&self) -> &SubscriptionId {
        self.config.id()
    }

    pub fn config(&self) -> &Arc<SubscriptionConfig> {
        &self.config
    }

    pub fn status(&self) -> SubscriptionStatus {
        *self.status.borrow()
    }

    pub fn watch_status(&self) -> watch::Receiver<SubscriptionStatus> {
        self.status.subscribe()
    }

    /// 切换状态；非法迁移被忽略并返回 `false`，终态之后的迁移静默忽略
    pub fn transition(&self, next: SubscriptionStatus) -> bool {
        let mut from = None;
        let changed = self.status.send_if_modified(|current| {
            if *current == next || !current.can_transition_to(next) {
                from = Some(*current);
                return false;
            }
            from = Some(*current);
            *current = next;
            true
        });

        match from {
            Some(from) if changed => {
                debug!(subscription = %self.id(), %from, to = %next, "status changed");
            }
            Some(from) if from != next && !from.is_terminal() => {
                warn!(subscription = %self.id(), %from, to = %next, "illegal status transition ignored");
            }
            _ => {}
        }
        changed
    }

    /// 内存中的最新检查点（批次成功提交后更新）
    pub fn last_checkpoint(&self) -> Option<Position> {
        *self.checkpoint.borrow()
    }

    pub fn watch_checkpoint(&self) -> watch::Receiver<Option<Position>> {
        self.checkpoint.subscribe()
    }

    pub fn set_checkpoint(&self, position: Option<Position>) {
        self.checkpoint.send_replace(position);
    }
}

/// 订阅注册表
#[derive(Clone)]
pub struct SubscriptionRegistry {
    subscriptions: Arc<HashMap<SubscriptionId, Arc<SubscriptionRuntime>>>,
    order: Arc<[SubscriptionId]>,
}

impl SubscriptionRegistry {
    /// 校验每个配置并拒绝重复的订阅名
    pub fn new(configs: Vec<SubscriptionConfig>) -> DomainResult<Self> {
        let mut subscriptions = HashMap::with_capacity(configs.len());
        let mut order = Vec::with_capacity(configs.len());

        for config in configs {
            config.validate()?;
            let id = config.id().clone();
            if subscriptions.contains_key(&id) {
                return Err(DomainError::invalid_config(format!(
                    "duplicate subscription id: {id}"
                )));
            }
            subscriptions.insert(id.clone(), Arc::new(SubscriptionRuntime::new(config)));
            order.push(id);
        }

        Ok(Self {
            subscriptions: Arc::new(subscriptions),
            order: order.into(),
        })
    }

    pub fn get(&self, id: &str) -> Option<&Arc<SubscriptionRuntime>> {
        self.subscriptions.get(id)
    }

    pub fn require(&self, id: &str) -> DomainResult<&Arc<SubscriptionRuntime>> {
        self.get(id)
            .ok_or_else(|| DomainError::UnknownSubscription(id.to_string()))
    }

    /// 按注册顺序遍历
    pub fn iter(&self) -> impl Iterator<Item = &Arc<SubscriptionRuntime>> + '_ {
        self.order.iter().filter_map(|id| self.subscriptions.get(id))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
