//! 批次处理（BatchProcessor）
//!
//! 处理器调用约定：`process(批次, 上一个检查点, 选项)`，成功返回新的检查点位点，
//! 失败则整批由调用方原样重试。
//!
use super::{DecodedEvent, HandlerSet};
use crate::error::{DomainError, DomainResult as Result};
use crate::log::LogRecord;
use crate::position::Position;
use crate::subscription::{DeserializeErrorPolicy, EventBatch, SubscriptionId};
use async_trait::async_trait;
use futures_util::{StreamExt, stream};
use serde_json::Value;
use tracing::{trace, warn};

/// 单次批处理的选项
#[derive(Clone, Copy)]
pub struct ProcessOptions<'a> {
    pub subscription_id: &'a SubscriptionId,
    pub on_deserialize_error: DeserializeErrorPolicy,
    pub handlers: &'a HandlerSet,
    /// 同一事件广播给多个处理器时的并发度
    pub handler_concurrency: usize,
}

#[async_trait]
pub trait BatchProcessor: Send + Sync {
    async fn process(
        &self,
        batch: &EventBatch,
        previous: Option<Position>,
        options: ProcessOptions<'_>,
    ) -> Result<Position>;
}

/// 默认批处理：按日志顺序逐条处理，同一事件的多个处理器并发执行
///
/// - 跳过位于 `previous` 及之前的事件（重连后的重复投递）；
/// - 负载按 JSON 解码，解码失败或处理器报告 `serde_json::Error` 时按策略跳过或整批失败；
/// - 其余处理器错误使整批失败。
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultBatchProcessor;

impl DefaultBatchProcessor {
    fn decode(record: &LogRecord) -> std::result::Result<Value, serde_json::Error> {
        if record.payload().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_slice(record.payload())
    }

    fn on_deserialize_error(
        record: &LogRecord,
        reason: String,
        options: &ProcessOptions<'_>,
    ) -> Result<()> {
        match options.on_deserialize_error {
            DeserializeErrorPolicy::Skip => {
                warn!(
                    subscription = %options.subscription_id,
                    position = %record.position(),
                    event_type = record.event_type(),
                    error = %reason,
                    "skipping event that failed to deserialize"
                );
                Ok(())
            }
            DeserializeErrorPolicy::Fail => Err(DomainError::Deserialize {
                position: record.position(),
                event_type: record.event_type().to_string(),
                reason,
            }),
        }
    }
}

#[async_trait]
impl BatchProcessor for DefaultBatchProcessor {
    async fn process(
        &self,
        batch: &EventBatch,
        previous: Option<Position>,
        options: ProcessOptions<'_>,
    ) -> Result<Position> {
        let concurrency = options.handler_concurrency.max(1);

        for record in batch.events() {
            if !record.position().is_after(previous) {
                trace!(
                    subscription = %options.subscription_id,
                    position = %record.position(),
                    "skipping already checkpointed event"
                );
                continue;
            }

            let data = match Self::decode(record) {
                Ok(data) => data,
                Err(err) => {
                    Self::on_deserialize_error(record, err.to_string(), &options)?;
                    continue;
                }
            };

            let handlers = options.handlers.matching(record.event_type());
            if handlers.is_empty() {
                continue;
            }

            let event = DecodedEvent::new(record, data);
            let event = &event;
            let pending: Vec<_> = handlers
                .into_iter()
                .map(|h| async move {
                    let outcome = h.handle(event).await;
                    (h, outcome)
                })
                .collect();
            let outcomes: Vec<_> = stream::iter(pending)
                .buffer_unordered(concurrency)
                .collect()
                .await;

            for (h, outcome) in outcomes {
                let Err(err) = outcome else { continue };

                if err.chain().any(|cause| cause.is::<serde_json::Error>()) {
                    Self::on_deserialize_error(record, format!("{err:#}"), &options)?;
                    continue;
                }

                return Err(DomainError::EventHandler {
                    handler: h.handler_name().to_string(),
                    reason: format!("{err:#}"),
                });
            }
        }

        let last = batch.last_position();
        Ok(previous.map_or(last, |p| p.max(last)))
    }
}
