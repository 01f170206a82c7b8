//! 订阅协调器（Coordinator）
//!
//! 编排全部长驻任务：
//! - 构建订阅注册表与唯一的共享批次队列；
//! - 并发启动每个订阅：加载检查点（有限次重试），随后运行其工作者；
//! - 运行唯一的批次消费者；
//! - 返回可用于关闭、等待与观察状态的 `CoordinatorHandle`。
//!
use crate::backoff::ReconnectBackoff;
use crate::consumer::BatchConsumer;
use crate::queue::BatchQueue;
use crate::registry::{SubscriptionRegistry, SubscriptionRuntime};
use crate::worker::{ReconnectFrom, SubscriptionWorker};
use bon::Builder;
use catchup_domain::checkpoint::CheckpointStore;
use catchup_domain::error::{DomainError, DomainResult as Result};
use catchup_domain::eventing::{
    BatchProcessor, DefaultBatchProcessor, EventHandler, HandlerFactory, HandlerSet,
};
use catchup_domain::log::EventLog;
use catchup_domain::position::Position;
use catchup_domain::subscription::{SubscriptionConfig, SubscriptionStatus};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, warn};

// 导入由 bon::Builder 生成的 typestate 模块与状态转换别名
use self::coordinator_builder::{IsUnset, SetHandlerFactory, State as BuilderState};

/// 协调器配置
#[derive(Clone, Copy, Debug)]
pub struct CoordinatorConfig {
    /// 启动时加载检查点的最大尝试次数
    pub checkpoint_load_attempts: u32,
    pub checkpoint_load_retry_delay: Duration,
    /// 断线重连的随机退避区间
    pub reconnect_backoff: ReconnectBackoff,
    pub reconnect_from: ReconnectFrom,
    /// 批处理失败后首次重试的等待，零表示立即重试
    pub processing_retry_delay: Duration,
    pub processing_retry_max_delay: Duration,
    /// 单事件的处理并发（同一事件广播给多个 handler）
    pub handler_concurrency: usize,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            checkpoint_load_attempts: 3,
            checkpoint_load_retry_delay: Duration::from_millis(200),
            reconnect_backoff: ReconnectBackoff::default(),
            reconnect_from: ReconnectFrom::default(),
            processing_retry_delay: Duration::ZERO,
            processing_retry_max_delay: Duration::from_secs(30),
            handler_concurrency: 8,
        }
    }
}

#[derive(Builder)]
pub struct Coordinator {
    event_log: Arc<dyn EventLog>,
    checkpoint_store: Arc<dyn CheckpointStore>,
    handler_factory: Arc<dyn HandlerFactory>,
    #[builder(default = Arc::new(DefaultBatchProcessor) as Arc<dyn BatchProcessor>)]
    processor: Arc<dyn BatchProcessor>,
    subscriptions: Vec<SubscriptionConfig>,
    #[builder(default)]
    config: CoordinatorConfig,
}

impl<S: BuilderState> CoordinatorBuilder<S> {
    /// 使用固定的处理器集合，所有订阅、所有批次共用
    pub fn handlers(
        self,
        handlers: Vec<Arc<dyn EventHandler>>,
    ) -> CoordinatorBuilder<SetHandlerFactory<S>>
    where
        <S as BuilderState>::HandlerFactory: IsUnset,
    {
        self.handler_factory(Arc::new(HandlerSet::new(handlers)))
    }
}

impl Coordinator {
    /// 启动全部任务；须在 tokio 运行时内调用
    pub fn start(self) -> Result<CoordinatorHandle> {
        self.start_with_token(&CancellationToken::new())
    }

    /// 以外部令牌的子令牌启动，外部取消会关闭协调器
    pub fn start_with_token(self, parent: &CancellationToken) -> Result<CoordinatorHandle> {
        let registry = SubscriptionRegistry::new(self.subscriptions)?;
        let token = parent.child_token();
        let queue = Arc::new(BatchQueue::new());
        let mut tasks: Vec<JoinHandle<Result<()>>> = Vec::with_capacity(registry.len() + 1);

        // consumer（唯一）
        {
            let consumer = BatchConsumer::builder()
                .queue(queue.clone())
                .registry(registry.clone())
                .checkpoint_store(self.checkpoint_store.clone())
                .handler_factory(self.handler_factory.clone())
                .processor(self.processor.clone())
                .retry_delay(self.config.processing_retry_delay)
                .retry_max_delay(self.config.processing_retry_max_delay)
                .handler_concurrency(self.config.handler_concurrency)
                .build();

            tasks.push(tokio::spawn(
                consumer
                    .run(token.child_token())
                    .instrument(info_span!("consumer")),
            ));
        }

        // subscription workers（每个订阅一个）
        for runtime in registry.iter() {
            let startup = Startup {
                runtime: runtime.clone(),
                checkpoint_store: self.checkpoint_store.clone(),
                load_attempts: self.config.checkpoint_load_attempts,
                load_retry_delay: self.config.checkpoint_load_retry_delay,
            };
            let worker = SubscriptionWorker::builder()
                .runtime(runtime.clone())
                .event_log(self.event_log.clone())
                .backoff(self.config.reconnect_backoff)
                .reconnect_from(self.config.reconnect_from)
                .build();
            let span = info_span!("subscription", subscription = %runtime.id());

            tasks.push(tokio::spawn(
                startup
                    .run(worker, queue.clone(), token.child_token())
                    .instrument(span),
            ));
        }

        info!(subscriptions = registry.len(), "coordinator started");
        Ok(CoordinatorHandle {
            token,
            tasks,
            registry,
        })
    }

    /// 运行直到 `token` 被取消且全部任务退出
    pub async fn run(self, token: CancellationToken) -> Result<()> {
        self.start_with_token(&token)?.join().await
    }
}

/// 单个订阅的启动流程：加载检查点后交给工作者
struct Startup {
    runtime: Arc<SubscriptionRuntime>,
    checkpoint_store: Arc<dyn CheckpointStore>,
    load_attempts: u32,
    load_retry_delay: Duration,
}

impl Startup {
    async fn run(
        self,
        worker: SubscriptionWorker,
        queue: Arc<BatchQueue>,
        token: CancellationToken,
    ) -> Result<()> {
        self.runtime.transition(SubscriptionStatus::Starting);

        let checkpoint = match self.load_checkpoint(&token).await {
            Ok(checkpoint) => checkpoint,
            Err(DomainError::Cancelled) => {
                self.runtime.transition(SubscriptionStatus::Stopped);
                return Ok(());
            }
            Err(err) => {
                self.runtime.transition(SubscriptionStatus::Errored);
                error!(error = %err, "subscription failed to start");
                return Err(err);
            }
        };
        self.runtime.set_checkpoint(checkpoint);

        worker.run(checkpoint, queue, token).await
    }

    async fn load_checkpoint(&self, token: &CancellationToken) -> Result<Option<Position>> {
        let attempts = self.load_attempts.max(1);
        let id = self.runtime.id();
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            let loaded = tokio::select! {
                biased;
                _ = token.cancelled() => return Err(DomainError::Cancelled),
                loaded = self.checkpoint_store.load(id) => loaded,
            };

            match loaded {
                Ok(checkpoint) => {
                    debug!(checkpoint = ?checkpoint, attempt, "checkpoint loaded");
                    return Ok(checkpoint);
                }
                Err(err) if attempt >= attempts => {
                    return Err(DomainError::StartupFailed {
                        subscription: id.to_string(),
                        attempts,
                        source: Box::new(err),
                    });
                }
                Err(err) => {
                    warn!(attempt, error = %err, "checkpoint load failed, retrying");
                }
            }

            tokio::select! {
                biased;
                _ = token.cancelled() => return Err(DomainError::Cancelled),
                _ = tokio::time::sleep(self.load_retry_delay) => {}
            }
        }
    }
}

/// 协调器运行句柄：用于优雅关闭、等待任务结束与观察订阅状态
pub struct CoordinatorHandle {
    token: CancellationToken,
    tasks: Vec<JoinHandle<Result<()>>>,
    registry: SubscriptionRegistry,
}

impl CoordinatorHandle {
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    pub fn status(&self, id: &str) -> Result<SubscriptionStatus> {
        Ok(self.registry.require(id)?.status())
    }

    pub fn watch_status(&self, id: &str) -> Result<watch::Receiver<SubscriptionStatus>> {
        Ok(self.registry.require(id)?.watch_status())
    }

    /// 内存中的最新检查点
    pub fn checkpoint(&self, id: &str) -> Result<Option<Position>> {
        Ok(self.registry.require(id)?.last_checkpoint())
    }

    pub fn watch_checkpoint(&self, id: &str) -> Result<watch::Receiver<Option<Position>>> {
        Ok(self.registry.require(id)?.watch_checkpoint())
    }

    /// 等待全部任务退出，返回遇到的第一个错误
    ///
    /// 消费者在取消前不会退出，因此本方法在 `shutdown` 之前不会返回，
    /// 启动失败（`StartupFailed`）也要到关闭后才经由这里返回。
    /// 需要提前得知启动失败时，用 `watch_status` 等待订阅进入 `Errored`。
    pub async fn join(mut self) -> Result<()> {
        let tasks = std::mem::take(&mut self.tasks);
        let mut first_error = None;

        for t in tasks {
            let outcome = match t.await {
                Ok(outcome) => outcome,
                Err(join_err) if join_err.is_panic() => Err(DomainError::TaskPanicked {
                    reason: join_err.to_string(),
                }),
                Err(_) => Ok(()),
            };
            if let Err(err) = outcome {
                first_error.get_or_insert(err);
            }
        }

        info!("coordinator stopped");
        first_error.map_or(Ok(()), Err)
    }
}

impl Drop for CoordinatorHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::InMemoryCheckpointStore;
    use crate::log::InMemoryEventLog;
    use catchup_domain::log::{EventFilter, ExpectedRevision, NewRecord};

    fn orders() -> SubscriptionConfig {
        SubscriptionConfig::builder()
            .id("orders")
            .filter(EventFilter::all())
            .batch_size(2)
            .batch_deadline(Duration::from_millis(20))
            .build()
    }

    fn coordinator(
        log: &Arc<InMemoryEventLog>,
        store: &Arc<InMemoryCheckpointStore>,
        subscriptions: Vec<SubscriptionConfig>,
    ) -> Coordinator {
        Coordinator::builder()
            .event_log(log.clone() as Arc<dyn EventLog>)
            .checkpoint_store(store.clone() as Arc<dyn CheckpointStore>)
            .handlers(vec![])
            .subscriptions(subscriptions)
            .build()
    }

    #[tokio::test]
    async fn duplicate_subscriptions_fail_to_start() {
        let log = Arc::new(InMemoryEventLog::default());
        let store = Arc::new(InMemoryCheckpointStore::new());
        let result = coordinator(&log, &store, vec![orders(), orders()]).start();
        assert!(matches!(result, Err(DomainError::InvalidConfig { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn resumes_from_stored_checkpoint() {
        let log = Arc::new(InMemoryEventLog::default());
        for n in 0..4 {
            let record = NewRecord::json("OrderPlaced", &serde_json::json!({ "n": n })).unwrap();
            log.append("order-1", ExpectedRevision::Any, vec![record])
                .await
                .unwrap();
        }
        let store = Arc::new(InMemoryCheckpointStore::new());
        store.store(&"orders".into(), Position::new(1)).await.unwrap();

        let handle = coordinator(&log, &store, vec![orders()]).start().unwrap();
        let mut checkpoint = handle.watch_checkpoint("orders").unwrap();
        checkpoint
            .wait_for(|c| *c == Some(Position::new(3)))
            .await
            .unwrap();
        assert_eq!(handle.status("orders").unwrap(), SubscriptionStatus::Started);
        assert!(matches!(
            handle.status("users"),
            Err(DomainError::UnknownSubscription(_))
        ));

        handle.shutdown();
        let registry = handle.registry.clone();
        handle.join().await.unwrap();
        assert_eq!(
            registry.get("orders").unwrap().status(),
            SubscriptionStatus::Stopped
        );
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_checkpoint_load_errors_the_subscription() {
        let log = Arc::new(InMemoryEventLog::default());
        let store = Arc::new(InMemoryCheckpointStore::new());
        store.fail_next_loads(3);

        let handle = coordinator(&log, &store, vec![orders()]).start().unwrap();
        let mut status = handle.watch_status("orders").unwrap();
        status
            .wait_for(|s| *s == SubscriptionStatus::Errored)
            .await
            .unwrap();

        // 其余任务仍在运行，join 须等到关闭
        let token = handle.token.clone();
        let join = tokio::spawn(handle.join());
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(!join.is_finished());

        token.cancel();
        let err = join.await.unwrap().unwrap_err();
        assert!(matches!(
            err,
            DomainError::StartupFailed { attempts: 3, .. }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn transient_load_failure_is_retried() {
        let log = Arc::new(InMemoryEventLog::default());
        let store = Arc::new(InMemoryCheckpointStore::new());
        store.fail_next_loads(2);

        let handle = coordinator(&log, &store, vec![orders()]).start().unwrap();
        let mut status = handle.watch_status("orders").unwrap();
        status
            .wait_for(|s| *s == SubscriptionStatus::Started)
            .await
            .unwrap();

        handle.shutdown();
        handle.join().await.unwrap();
    }
}
