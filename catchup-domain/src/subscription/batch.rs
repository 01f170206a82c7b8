use super::SubscriptionId;
use crate::log::LogRecord;
use crate::position::Position;
use std::sync::Arc;

/// 事件批次：同一订阅按日志顺序排列的一组记录
///
/// 只能通过 [`EventBatch::new`] 构造，保证非空；克隆只增加引用计数。
#[derive(Debug, Clone)]
pub struct EventBatch {
    subscription_id: SubscriptionId,
    events: Arc<[LogRecord]>,
    last_position: Position,
}

impl EventBatch {
    /// 事件为空时返回 `None`
    pub fn new(subscription_id: SubscriptionId, events: Vec<LogRecord>) -> Option<Self> {
        let last_position = events.last()?.position();
        Some(Self {
            subscription_id,
            events: events.into(),
            last_position,
        })
    }

    pub fn subscription_id(&self) -> &SubscriptionId {
        &self.subscription_id
    }

    pub fn events(&self) -> &[LogRecord] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// 批次按构造非空，恒为 `false`
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn first_position(&self) -> Position {
        self.events[0].position()
    }

    pub fn last_position(&self) -> Position {
        self.last_position
    }
}
