//! 订阅工作者（SubscriptionWorker）
//!
//! 每个订阅一个长驻任务：
//! 1. 从检查点之后（或日志起点）打开实时读取；
//! 2. 记录经批次组装后推入共享队列，队列已满时阻塞（状态 `Paused`）；
//! 3. 瞬时故障后随机退避并重新打开读取，无限重试；
//! 4. 取消时干净退出（状态 `Stopped`，不输出告警/错误日志）。
//!
use crate::backoff::ReconnectBackoff;
use crate::batcher::assemble;
use crate::queue::BatchQueue;
use crate::registry::SubscriptionRuntime;
use bon::Builder;
use catchup_domain::error::{DisconnectCause, DomainError, DomainResult as Result};
use catchup_domain::log::EventLog;
use catchup_domain::position::Position;
use catchup_domain::subscription::{EventBatch, SubscriptionStatus};
use futures_util::StreamExt;
use std::pin::pin;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

/// 重连时从哪个检查点重新读取
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ReconnectFrom {
    /// 始终使用启动时加载的检查点（重连后可能重复投递，由批处理跳过）
    #[default]
    InitialCheckpoint,
    /// 使用内存中最新提交的检查点
    LatestCheckpoint,
}

#[derive(Builder)]
pub struct SubscriptionWorker {
    runtime: Arc<SubscriptionRuntime>,
    event_log: Arc<dyn EventLog>,
    #[builder(default)]
    backoff: ReconnectBackoff,
    #[builder(default)]
    reconnect_from: ReconnectFrom,
}

impl SubscriptionWorker {
    /// 运行直到取消；瞬时故障不会使其返回
    pub async fn run(
        self,
        checkpoint: Option<Position>,
        queue: Arc<BatchQueue>,
        token: CancellationToken,
    ) -> Result<()> {
        let mut attempt: u32 = 0;

        loop {
            self.runtime.transition(SubscriptionStatus::Starting);
            let from = self.resume_from(checkpoint);

            let err = match self.run_once(from, &queue, &token, &mut attempt).await {
                Ok(()) => break,
                Err(err) => err,
            };
            if token.is_cancelled() || err.is_user_cancelled() {
                break;
            }

            attempt = attempt.saturating_add(1);
            let delay = self.backoff.next_delay();
            warn!(
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "subscription dropped, reconnecting"
            );
            self.runtime.transition(SubscriptionStatus::Starting);

            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        self.runtime.transition(SubscriptionStatus::Stopped);
        info!("subscription stopped");
        Ok(())
    }

    fn resume_from(&self, initial: Option<Position>) -> Option<Position> {
        match self.reconnect_from {
            ReconnectFrom::InitialCheckpoint => initial,
            ReconnectFrom::LatestCheckpoint => initial.max(self.runtime.last_checkpoint()),
        }
    }

    /// 一次完整的读取会话；`Ok` 仅表示被取消
    async fn run_once(
        &self,
        from: Option<Position>,
        queue: &BatchQueue,
        token: &CancellationToken,
        attempt: &mut u32,
    ) -> Result<()> {
        let config = self.runtime.config();
        let options = config.read_options();

        let live = tokio::select! {
            biased;
            _ = token.cancelled() => return Ok(()),
            live = self.event_log.read_live(from, &options) => live?,
        };

        self.runtime.transition(SubscriptionStatus::Started);
        if *attempt > 0 {
            info!(attempt = *attempt, from = ?from, "subscription reconnected");
        } else {
            info!(from = ?from, "subscription started");
        }
        *attempt = 0;

        let mut batches = pin!(assemble(
            live,
            config.batch_size(),
            config.batch_deadline()
        ));

        loop {
            let next = tokio::select! {
                biased;
                _ = token.cancelled() => return Ok(()),
                next = batches.next() => next,
            };

            let records = match next {
                Some(Ok(records)) => records,
                Some(Err(err)) => return Err(err),
                None => return Err(DomainError::disconnected(DisconnectCause::ServerClosed)),
            };
            let Some(batch) = EventBatch::new(self.runtime.id().clone(), records) else {
                continue;
            };
            trace!(
                events = batch.len(),
                last = %batch.last_position(),
                "batch assembled"
            );

            if !self.push(batch, queue, token).await {
                return Ok(());
            }
        }
    }

    /// 推入共享队列；被取消时返回 `false`
    async fn push(&self, batch: EventBatch, queue: &BatchQueue, token: &CancellationToken) -> bool {
        let batch = match queue.try_push(batch) {
            Ok(()) => return true,
            Err(batch) => batch,
        };

        self.runtime.transition(SubscriptionStatus::Paused);
        debug!("queue full, waiting for consumer");

        let pushed = tokio::select! {
            biased;
            _ = token.cancelled() => false,
            _ = queue.push(batch) => true,
        };
        if pushed {
            self.runtime.transition(SubscriptionStatus::Started);
        }
        pushed
    }
}
