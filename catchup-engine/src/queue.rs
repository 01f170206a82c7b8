//! 两阶段批次队列（BatchQueue）
//!
//! 容量恰为 1 的单槽邮箱：多个订阅工作者写入，唯一的消费者读取。
//! - `push`：槽位已满时阻塞（背压），等待者按先来后到取得槽位；
//! - `try_push`：仅在槽位空闲且无人等待时成功；
//! - `peek`：查看队首但不移除，返回 [`InFlight`]；
//! - [`InFlight::ack`]：确认并弹出队首，槽位交给等待最久的写入者；
//! - [`InFlight::abandon`]（或直接丢弃）：保留队首，下一次 `peek` 得到同一批次。
//!
//! 因此所有订阅合计同时至多只有一个批次在途。
//!
use catchup_domain::subscription::EventBatch;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::{Notify, Semaphore};

pub struct BatchQueue {
    slot: Mutex<Option<EventBatch>>,
    filled: Notify,
    /// 空槽许可：至多 1 个；释放时优先交给排队的写入者
    vacancy: Semaphore,
}

impl Default for BatchQueue {
    fn default() -> Self {
        Self {
            slot: Mutex::new(None),
            filled: Notify::new(),
            vacancy: Semaphore::new(1),
        }
    }
}

impl BatchQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self) -> MutexGuard<'_, Option<EventBatch>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn fill(&self, batch: EventBatch) {
        *self.slot() = Some(batch);
        self.filled.notify_one();
    }

    /// 槽位空闲且无等待者时立即放入，否则原样退回
    pub fn try_push(&self, batch: EventBatch) -> Result<(), EventBatch> {
        match self.vacancy.try_acquire() {
            Ok(permit) => {
                permit.forget();
                self.fill(batch);
                Ok(())
            }
            Err(_) => Err(batch),
        }
    }

    /// 放入批次，槽位已满时排队等待消费者确认
    pub async fn push(&self, batch: EventBatch) {
        // 信号量从不关闭
        let Ok(permit) = self.vacancy.acquire().await else {
            return;
        };
        permit.forget();
        self.fill(batch);
    }

    /// 等待并查看队首批次（不移除）
    pub async fn peek(&self) -> InFlight<'_> {
        loop {
            let filled = self.filled.notified();
            tokio::pin!(filled);
            filled.as_mut().enable();

            if let Some(batch) = self.slot().clone() {
                return InFlight { queue: self, batch };
            }
            filled.await;
        }
    }

    pub fn is_empty(&self) -> bool {
        self.slot().is_none()
    }

    fn commit(&self) -> Option<EventBatch> {
        let taken = self.slot().take();
        if taken.is_some() {
            self.vacancy.add_permits(1);
        }
        taken
    }
}

/// 已查看、尚未确认的队首批次
#[must_use = "an in-flight batch must be acked or abandoned"]
pub struct InFlight<'a> {
    queue: &'a BatchQueue,
    batch: EventBatch,
}

impl InFlight<'_> {
    pub fn batch(&self) -> &EventBatch {
        &self.batch
    }

    /// 确认：弹出队首，唤醒一个等待中的写入者
    pub fn ack(self) -> EventBatch {
        self.queue.commit();
        self.batch
    }

    /// 放弃：队首保留，下一次 `peek` 重新得到该批次
    pub fn abandon(self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use catchup_domain::log::LogRecord;
    use catchup_domain::position::Position;
    use chrono::Utc;
    use std::sync::Arc;
    use std::time::Duration;
    use uuid::Uuid;

    fn batch(sub: &str, pos: u64) -> EventBatch {
        let record = LogRecord::builder()
            .event_id(Uuid::new_v4())
            .stream_id("order-1")
            .stream_revision(pos)
            .event_type("OrderPlaced")
            .position(Position::new(pos))
            .recorded_at(Utc::now())
            .build();
        EventBatch::new(sub.into(), vec![record]).unwrap()
    }

    #[tokio::test]
    async fn abandoned_head_is_seen_again() {
        let queue = BatchQueue::new();
        queue.push(batch("orders", 1)).await;

        let head = queue.peek().await;
        assert_eq!(head.batch().last_position(), Position::new(1));
        head.abandon();

        let head = queue.peek().await;
        assert_eq!(head.batch().last_position(), Position::new(1));
        head.ack();
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn try_push_rejects_when_full() {
        let queue = BatchQueue::new();
        assert!(queue.try_push(batch("orders", 1)).is_ok());
        let rejected = queue.try_push(batch("users", 2)).unwrap_err();
        assert_eq!(rejected.subscription_id().as_str(), "users");
    }

    #[tokio::test(start_paused = true)]
    async fn ack_releases_exactly_one_blocked_producer() {
        let queue = Arc::new(BatchQueue::new());
        queue.push(batch("orders", 1)).await;

        let mut producers = Vec::new();
        for (sub, pos) in [("users", 2), ("carts", 3)] {
            let queue = queue.clone();
            producers.push(tokio::spawn(async move {
                queue.push(batch(sub, pos)).await;
            }));
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(producers.iter().all(|p| !p.is_finished()));

        queue.peek().await.ack();
        tokio::time::sleep(Duration::from_millis(10)).await;
        let finished = producers.iter().filter(|p| p.is_finished()).count();
        assert_eq!(finished, 1);

        queue.peek().await.ack();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(producers.iter().all(|p| p.is_finished()));
        assert!(!queue.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn waiting_producer_is_not_overtaken_by_try_push() {
        let queue = Arc::new(BatchQueue::new());
        queue.push(batch("orders", 1)).await;

        let waiting = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.push(batch("users", 2)).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!waiting.is_finished());

        queue.peek().await.ack();
        let rejected = queue.try_push(batch("orders", 3)).unwrap_err();
        assert_eq!(rejected.subscription_id().as_str(), "orders");

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(waiting.is_finished());
        let head = queue.peek().await;
        assert_eq!(head.batch().subscription_id().as_str(), "users");
        head.ack();
        assert!(queue.try_push(rejected).is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_push_gives_up_its_turn() {
        let queue = Arc::new(BatchQueue::new());
        queue.push(batch("orders", 1)).await;

        let cancelled = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.push(batch("users", 2)).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        cancelled.abort();
        let _ = cancelled.await;

        queue.peek().await.ack();
        assert!(queue.is_empty());
        assert!(queue.try_push(batch("carts", 3)).is_ok());
    }
}
