/// 订单投影示例（内存版）
/// 展示：持久化检查点、按条数/时间组装批次、处理失败后原样重试、断线重连与优雅关闭
use anyhow::Result as AnyResult;
use async_trait::async_trait;
use catchup_domain::eventing::{DecodedEvent, EventHandler, HandledEventType};
use catchup_domain::log::{EventFilter, EventLog, ExpectedRevision, NewRecord};
use catchup_domain::subscription::SubscriptionConfig;
use catchup_engine::checkpoint::EventLogCheckpointStore;
use catchup_engine::log::InMemoryEventLog;
use catchup_engine::{Coordinator, CoordinatorConfig, ReconnectBackoff};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Debug, Serialize, Deserialize)]
struct OrderPlaced {
    order_id: String,
    amount: u64,
}

// ============================================================================
// 投影：累计订单金额；第一次遇到大额订单时模拟一次下游故障
// 同一位点只计入一次，重试与重连带来的重复投递不会重复累计
// ============================================================================

#[derive(Default)]
struct RevenueProjection {
    total: AtomicU64,
    tripped: AtomicBool,
    applied: Mutex<HashSet<u64>>,
}

#[async_trait]
impl EventHandler for RevenueProjection {
    fn handler_name(&self) -> &str {
        "revenue"
    }

    fn handled_event_type(&self) -> HandledEventType {
        HandledEventType::One("OrderPlaced".into())
    }

    async fn handle(&self, event: &DecodedEvent<'_>) -> anyhow::Result<()> {
        let order: OrderPlaced = event.deserialize()?;
        if order.amount >= 1000 && !self.tripped.swap(true, Ordering::AcqRel) {
            anyhow::bail!("downstream timeout while projecting {}", order.order_id);
        }
        let position = event.record().position();
        if !self.applied.lock().unwrap().insert(position.value()) {
            println!("↩️  {} @{} 已计入，跳过", order.order_id, position);
            return Ok(());
        }
        let total = self.total.fetch_add(order.amount, Ordering::AcqRel) + order.amount;
        println!(
            "📦 {} @{} amount={} total={}",
            order.order_id,
            position,
            order.amount,
            total
        );
        Ok(())
    }
}

async fn place(log: &InMemoryEventLog, order_id: &str, amount: u64) -> AnyResult<()> {
    let record = NewRecord::json(
        "OrderPlaced",
        &OrderPlaced {
            order_id: order_id.to_string(),
            amount,
        },
    )?;
    log.append(
        &format!("order-{order_id}"),
        ExpectedRevision::NoStream,
        vec![record],
    )
    .await?;
    Ok(())
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> AnyResult<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer())
        .init();

    println!("=== 订单投影示例（内存版） ===\n");

    let log = Arc::new(InMemoryEventLog::default());
    let checkpoints = Arc::new(EventLogCheckpointStore::new(log.clone()));
    let projection = Arc::new(RevenueProjection::default());

    for (id, amount) in [("A-1", 120), ("A-2", 80), ("A-3", 1500)] {
        place(&log, id, amount).await?;
    }
    println!("✅ 预置 3 个订单");

    let orders = SubscriptionConfig::builder()
        .id("orders")
        .filter(EventFilter::default().with_stream_prefix("order-"))
        .batch_size(3)
        .batch_deadline(Duration::from_millis(50))
        .build();

    let handle = Coordinator::builder()
        .event_log(log.clone())
        .checkpoint_store(checkpoints.clone())
        .handlers(vec![projection.clone()])
        .subscriptions(vec![orders])
        .config(CoordinatorConfig {
            reconnect_backoff: ReconnectBackoff {
                min: Duration::from_millis(100),
                max: Duration::from_millis(200),
            },
            processing_retry_delay: Duration::from_millis(100),
            ..Default::default()
        })
        .build()
        .start()?;
    println!("✅ 协调器已启动");

    tokio::time::sleep(Duration::from_millis(500)).await;
    place(&log, "B-1", 42).await?;
    println!("✅ 追加订单 B-1");

    tokio::time::sleep(Duration::from_millis(300)).await;
    log.disconnect_all();
    println!("⚡ 模拟断线");
    place(&log, "B-2", 7).await?;

    tokio::time::sleep(Duration::from_secs(1)).await;
    println!(
        "\n📊 orders 检查点: {:?}，累计金额: {}",
        handle.checkpoint("orders")?,
        projection.total.load(Ordering::Acquire)
    );

    handle.shutdown();
    handle.join().await?;
    println!("✅ 优雅关闭完成");
    Ok(())
}
