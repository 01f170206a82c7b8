//! 基于日志子流的持久化检查点存储（EventLogCheckpointStore）
//!
//! 每个订阅对应一条名为 `checkpoint_<subscriptionId>` 的子流，最多保留 1 条记录，
//! 记录内容为 JSON 形式的 `Checkpoint`：
//! - 读取：取子流最后一条记录；子流不存在即无检查点；
//! - 写入：期望子流已存在地追加；子流不存在时先设置保留 1 条，再期望“无流”地追加。

use async_trait::async_trait;
use catchup_domain::checkpoint::{
    CHECKPOINT_EVENT_TYPE, Checkpoint, CheckpointStore, checkpoint_stream_name,
};
use catchup_domain::error::{DomainError, DomainResult as Result};
use catchup_domain::log::{EventLog, ExpectedRevision, NewRecord};
use catchup_domain::position::Position;
use catchup_domain::subscription::SubscriptionId;
use tracing::debug;

pub struct EventLogCheckpointStore<L> {
    log: L,
}

impl<L> EventLogCheckpointStore<L>
where
    L: EventLog,
{
    pub fn new(log: L) -> Self {
        Self { log }
    }

    /// 首次写入：设置保留 1 条后期望“无流”追加；若与并发的首次写入竞争失败，再按“已存在”追加一次
    async fn bootstrap(&self, stream: &str, record: NewRecord) -> Result<()> {
        debug!(stream, "creating checkpoint stream");
        self.log.set_max_count(stream, 1).await.map_err(as_store_error)?;

        match self
            .log
            .append(stream, ExpectedRevision::NoStream, vec![record.clone()])
            .await
        {
            Ok(_) => Ok(()),
            Err(DomainError::WrongExpectedVersion { .. }) => self
                .log
                .append(stream, ExpectedRevision::StreamExists, vec![record])
                .await
                .map(|_| ())
                .map_err(as_store_error),
            Err(err) => Err(as_store_error(err)),
        }
    }
}

/// 日志不可达统一转换为 `StoreUnavailable`
fn as_store_error(err: DomainError) -> DomainError {
    if err.is_unreachable() {
        DomainError::store_unavailable(err.to_string())
    } else {
        err
    }
}

#[async_trait]
impl<L> CheckpointStore for EventLogCheckpointStore<L>
where
    L: EventLog,
{
    async fn load(&self, subscription_id: &SubscriptionId) -> Result<Option<Position>> {
        let stream = checkpoint_stream_name(subscription_id);

        match self.log.read_last(&stream).await {
            Ok(record) => {
                let checkpoint: Checkpoint = serde_json::from_slice(record.payload())?;
                Ok(Some(checkpoint.position()))
            }
            Err(DomainError::StreamNotFound { .. }) => Ok(None),
            Err(err) => Err(as_store_error(err)),
        }
    }

    async fn store(&self, subscription_id: &SubscriptionId, position: Position) -> Result<()> {
        let stream = checkpoint_stream_name(subscription_id);
        let checkpoint = Checkpoint::builder()
            .subscription_id(subscription_id.clone())
            .position(position)
            .build();
        let record = NewRecord::json(CHECKPOINT_EVENT_TYPE, &checkpoint)?;

        match self
            .log
            .append(&stream, ExpectedRevision::StreamExists, vec![record.clone()])
            .await
        {
            Ok(_) => Ok(()),
            Err(DomainError::StreamNotFound { .. } | DomainError::WrongExpectedVersion { .. }) => {
                self.bootstrap(&stream, record).await
            }
            Err(err) => Err(as_store_error(err)),
        }
    }
}
