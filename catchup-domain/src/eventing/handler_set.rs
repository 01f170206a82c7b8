//! 处理器集合（HandlerSet）与按订阅解析的工厂（HandlerFactory）
//!
//! 引擎在每个批次开始时调用工厂解析一次处理器集合，
//! 工厂可借此为每个批次创建独立作用域的资源（连接、事务等）。
//!
use super::{EventHandler, HandledEventType};
use crate::error::DomainResult as Result;
use crate::subscription::SubscriptionId;
use async_trait::async_trait;
use std::{collections::HashMap, sync::Arc};

#[derive(Clone, Default)]
pub struct HandlerSet {
    by_type: HashMap<String, Vec<Arc<dyn EventHandler>>>,
    all: Vec<Arc<dyn EventHandler>>,
}

impl HandlerSet {
    pub fn new(handlers: Vec<Arc<dyn EventHandler>>) -> Self {
        let mut by_type: HashMap<String, Vec<Arc<dyn EventHandler>>> = HashMap::new();
        let mut all: Vec<Arc<dyn EventHandler>> = Vec::new();

        for h in handlers {
            match h.handled_event_type() {
                HandledEventType::All => all.push(h),
                HandledEventType::One(t) => {
                    by_type.entry(t).or_default().push(h);
                }
                HandledEventType::Many(ts) => {
                    for t in ts {
                        by_type.entry(t).or_default().push(h.clone());
                    }
                }
            }
        }

        Self { by_type, all }
    }

    /// 返回处理该事件类型的全部处理器（特定类型在前，通配在后）
    pub fn matching(&self, event_type: &str) -> Vec<Arc<dyn EventHandler>> {
        let mut merged: Vec<Arc<dyn EventHandler>> = Vec::new();
        if let Some(list) = self.by_type.get(event_type) {
            merged.extend(list.iter().cloned());
        }
        merged.extend(self.all.iter().cloned());
        merged
    }

    pub fn is_empty(&self) -> bool {
        self.by_type.is_empty() && self.all.is_empty()
    }
}

impl FromIterator<Arc<dyn EventHandler>> for HandlerSet {
    fn from_iter<I: IntoIterator<Item = Arc<dyn EventHandler>>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

/// 按订阅解析处理器集合
#[async_trait]
pub trait HandlerFactory: Send + Sync {
    async fn resolve(&self, subscription_id: &SubscriptionId) -> Result<HandlerSet>;
}

/// 固定的处理器集合：每个批次返回同一组处理器
#[async_trait]
impl HandlerFactory for HandlerSet {
    async fn resolve(&self, _subscription_id: &SubscriptionId) -> Result<HandlerSet> {
        Ok(self.clone())
    }
}

#[async_trait]
impl<F> HandlerFactory for F
where
    F: Fn(&SubscriptionId) -> Result<HandlerSet> + Send + Sync,
{
    async fn resolve(&self, subscription_id: &SubscriptionId) -> Result<HandlerSet> {
        (self)(subscription_id)
    }
}
