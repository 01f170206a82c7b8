use anyhow::Result as AnyResult;
use async_trait::async_trait;
use catchup_domain::eventing::{DecodedEvent, EventHandler, HandledEventType};
use catchup_domain::log::{EventFilter, EventLog, ExpectedRevision, NewRecord};
use catchup_domain::position::Position;
use catchup_domain::subscription::{SubscriptionConfig, SubscriptionStatus};
use catchup_engine::checkpoint::InMemoryCheckpointStore;
use catchup_engine::log::InMemoryEventLog;
use catchup_engine::{Coordinator, CoordinatorConfig, ReconnectBackoff};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

/// 按级别计数的日志层
#[derive(Clone, Default)]
struct LevelCounter {
    warns: Arc<AtomicUsize>,
    errors: Arc<AtomicUsize>,
}

impl LevelCounter {
    fn warns(&self) -> usize {
        self.warns.load(Ordering::SeqCst)
    }

    fn errors(&self) -> usize {
        self.errors.load(Ordering::SeqCst)
    }
}

impl<S: Subscriber> Layer<S> for LevelCounter {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        match *event.metadata().level() {
            Level::WARN => {
                self.warns.fetch_add(1, Ordering::SeqCst);
            }
            Level::ERROR => {
                self.errors.fetch_add(1, Ordering::SeqCst);
            }
            _ => {}
        }
    }
}

struct AlwaysFails;

#[async_trait]
impl EventHandler for AlwaysFails {
    fn handler_name(&self) -> &str {
        "always-fails"
    }

    fn handled_event_type(&self) -> HandledEventType {
        HandledEventType::All
    }

    async fn handle(&self, _event: &DecodedEvent<'_>) -> anyhow::Result<()> {
        anyhow::bail!("read model offline")
    }
}

fn orders() -> SubscriptionConfig {
    SubscriptionConfig::builder()
        .id("orders")
        .filter(EventFilter::default().with_stream_prefix("order-"))
        .batch_size(1)
        .build()
}

#[tokio::test(start_paused = true)]
async fn cancelling_during_backoff_is_not_an_error() -> AnyResult<()> {
    let counter = LevelCounter::default();
    let _guard =
        tracing::subscriber::set_default(tracing_subscriber::registry().with(counter.clone()));

    let log = Arc::new(InMemoryEventLog::default());
    let record = NewRecord::json("OrderPlaced", &serde_json::json!({ "id": 1 }))?;
    log.append("order-1", ExpectedRevision::NoStream, vec![record]).await?;

    let handle = Coordinator::builder()
        .event_log(log.clone())
        .checkpoint_store(Arc::new(InMemoryCheckpointStore::new()))
        .handlers(vec![Arc::new(AlwaysFails)])
        .subscriptions(vec![orders()])
        .config(CoordinatorConfig {
            reconnect_backoff: ReconnectBackoff::fixed(Duration::from_secs(5)),
            processing_retry_delay: Duration::from_secs(10),
            processing_retry_max_delay: Duration::from_secs(60),
            ..Default::default()
        })
        .build()
        .start()?;
    let status = handle.watch_status("orders")?;

    // 消费者进入处理失败后的退避
    tokio::time::sleep(Duration::from_millis(600)).await;
    assert_eq!(counter.warns(), 1);

    // 工作者进入断线重连的退避
    log.disconnect_all();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(counter.warns(), 2);
    assert_eq!(*status.borrow(), SubscriptionStatus::Starting);

    let warns_before_cancel = counter.warns();
    handle.shutdown();
    handle.join().await?;

    assert_eq!(*status.borrow(), SubscriptionStatus::Stopped);
    assert_eq!(counter.warns(), warns_before_cancel);
    assert_eq!(counter.errors(), 0);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn cancelling_during_startup_retries_stops_cleanly() -> AnyResult<()> {
    let counter = LevelCounter::default();
    let _guard =
        tracing::subscriber::set_default(tracing_subscriber::registry().with(counter.clone()));

    let store = Arc::new(InMemoryCheckpointStore::new());
    store.fail_next_loads(10);

    let handle = Coordinator::builder()
        .event_log(Arc::new(InMemoryEventLog::default()))
        .checkpoint_store(store.clone())
        .handlers(vec![])
        .subscriptions(vec![orders()])
        .config(CoordinatorConfig {
            checkpoint_load_attempts: 10,
            checkpoint_load_retry_delay: Duration::from_secs(1),
            ..Default::default()
        })
        .build()
        .start()?;
    let status = handle.watch_status("orders")?;

    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert_eq!(*status.borrow(), SubscriptionStatus::Starting);
    let warns_before_cancel = counter.warns();
    assert_eq!(warns_before_cancel, 2);

    handle.shutdown();
    handle.join().await?;

    assert_eq!(*status.borrow(), SubscriptionStatus::Stopped);
    assert_eq!(counter.warns(), warns_before_cancel);
    assert_eq!(counter.errors(), 0);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn external_token_stops_the_run() -> AnyResult<()> {
    let log = Arc::new(InMemoryEventLog::default());
    let store = Arc::new(InMemoryCheckpointStore::new());
    let token = CancellationToken::new();

    let coordinator = Coordinator::builder()
        .event_log(log.clone())
        .checkpoint_store(store.clone())
        .handlers(vec![])
        .subscriptions(vec![orders()])
        .build();
    let run = tokio::spawn(coordinator.run(token.clone()));

    let record = NewRecord::json("OrderPlaced", &serde_json::json!({ "id": 1 }))?;
    log.append("order-1", ExpectedRevision::NoStream, vec![record]).await?;
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(
        store.get("orders").map(|c| c.position()),
        Some(Position::new(0))
    );

    token.cancel();
    run.await??;
    Ok(())
}
