//! 批次消费者与检查点提交（BatchConsumer）
//!
//! 全局唯一的消费循环：
//! 1. 等待并查看队首批次；
//! 2. 通过 `HandlerFactory` 为该批次解析处理器；
//! 3. 调用 `BatchProcessor` 处理，得到新的检查点；
//! 4. 持久化检查点并更新内存单元，最后确认（弹出）队首。
//!
//! 任一步失败时队首保留，同一批次在退避后原样重试；不设重试上限，不丢弃批次。
//!
use crate::backoff::retry_delay;
use crate::queue::BatchQueue;
use crate::registry::SubscriptionRegistry;
use bon::Builder;
use catchup_domain::checkpoint::CheckpointStore;
use catchup_domain::error::DomainResult as Result;
use catchup_domain::eventing::{BatchProcessor, HandlerFactory, ProcessOptions};
use catchup_domain::position::Position;
use catchup_domain::subscription::EventBatch;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Builder)]
pub struct BatchConsumer {
    queue: Arc<BatchQueue>,
    registry: SubscriptionRegistry,
    checkpoint_store: Arc<dyn CheckpointStore>,
    handler_factory: Arc<dyn HandlerFactory>,
    processor: Arc<dyn BatchProcessor>,
    /// 首次重试的等待，零表示立即重试
    #[builder(default = Duration::ZERO)]
    retry_delay: Duration,
    #[builder(default = Duration::from_secs(30))]
    retry_max_delay: Duration,
    #[builder(default = 8)]
    handler_concurrency: usize,
}

impl BatchConsumer {
    /// 运行直到取消；未确认的批次在取消时被放弃
    pub async fn run(self, token: CancellationToken) -> Result<()> {
        let mut attempt: u32 = 0;

        loop {
            let head = tokio::select! {
                biased;
                _ = token.cancelled() => break,
                head = self.queue.peek() => head,
            };

            let outcome = tokio::select! {
                biased;
                _ = token.cancelled() => break,
                outcome = self.commit(head.batch()) => outcome,
            };

            match outcome {
                Ok(position) => {
                    let batch = head.ack();
                    attempt = 0;
                    debug!(
                        subscription = %batch.subscription_id(),
                        events = batch.len(),
                        %position,
                        "batch committed"
                    );
                }
                Err(err) => {
                    let subscription = head.batch().subscription_id().clone();
                    head.abandon();
                    attempt = attempt.saturating_add(1);
                    let delay = retry_delay(self.retry_delay, self.retry_max_delay, attempt);
                    warn!(
                        %subscription,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "batch processing failed, retrying"
                    );

                    if delay.is_zero() {
                        tokio::task::yield_now().await;
                    } else {
                        tokio::select! {
                            biased;
                            _ = token.cancelled() => break,
                            _ = tokio::time::sleep(delay) => {}
                        }
                    }
                }
            }
        }

        info!("consumer stopped");
        Ok(())
    }

    /// 处理批次并提交检查点，返回提交后的检查点位点
    async fn commit(&self, batch: &EventBatch) -> Result<Position> {
        let runtime = self.registry.require(batch.subscription_id().as_str())?;
        let config = runtime.config();
        let previous = runtime.last_checkpoint();

        let handlers = self.handler_factory.resolve(config.id()).await?;
        let options = ProcessOptions {
            subscription_id: config.id(),
            on_deserialize_error: config.on_deserialize_error(),
            handlers: &handlers,
            handler_concurrency: self.handler_concurrency,
        };
        let position = self.processor.process(batch, previous, options).await?;

        // 检查点只前进：重复投递的旧批次不回写
        match previous {
            Some(committed) if !position.is_after(previous) => Ok(committed),
            _ => {
                self.checkpoint_store.store(config.id(), position).await?;
                runtime.set_checkpoint(Some(position));
                Ok(position)
            }
        }
    }
}
