//! 检查点（checkpoint）
//!
//! 每个订阅最后一次被完整确认的位点，以及其存储协议。
//! 检查点只在整批事件全部处理成功后推进。
//!
use crate::error::DomainResult as Result;
use crate::position::Position;
use crate::subscription::SubscriptionId;
use async_trait::async_trait;
use bon::Builder;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// 检查点子流名前缀
pub const CHECKPOINT_STREAM_PREFIX: &str = "checkpoint_";

/// 检查点记录的事件类型
pub const CHECKPOINT_EVENT_TYPE: &str = "CheckpointStored";

/// 订阅对应的检查点子流名，如 `checkpoint_orders`
pub fn checkpoint_stream_name(subscription_id: &SubscriptionId) -> String {
    format!("{CHECKPOINT_STREAM_PREFIX}{subscription_id}")
}

#[derive(Debug, Clone, PartialEq, Eq, Builder, Serialize, Deserialize)]
pub struct Checkpoint {
    #[builder(into)]
    subscription_id: SubscriptionId,
    position: Position,
    #[builder(default = Utc::now())]
    checkpointed_at: DateTime<Utc>,
}

impl Checkpoint {
    pub fn subscription_id(&self) -> &SubscriptionId {
        &self.subscription_id
    }

    pub fn position(&self) -> Position {
        self.position
    }

    pub fn checkpointed_at(&self) -> DateTime<Utc> {
        self.checkpointed_at
    }
}

/// 检查点存储
///
/// `store` 为幂等的“最后写入者胜”，不取最大值；不同订阅之间可并发调用。
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// 读取订阅的检查点，无记录时返回 `None`；不可达时返回 `StoreUnavailable`
    async fn load(&self, subscription_id: &SubscriptionId) -> Result<Option<Position>>;

    /// 覆盖写入订阅的检查点
    async fn store(&self, subscription_id: &SubscriptionId, position: Position) -> Result<()>;
}

#[async_trait]
impl<T> CheckpointStore for Arc<T>
where
    T: CheckpointStore + ?Sized,
{
    async fn load(&self, subscription_id: &SubscriptionId) -> Result<Option<Position>> {
        (**self).load(subscription_id).await
    }

    async fn store(&self, subscription_id: &SubscriptionId, position: Position) -> Result<()> {
        (**self).store(subscription_id, position).await
    }
}
