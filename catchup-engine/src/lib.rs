//! 订阅引擎运行时（catchup-engine）
//!
//! 在 `catchup-domain` 定义的协议之上实现“检查点 + 批处理”的追赶订阅：
//! - 每个订阅一个工作者：从检查点之后实时读取，按条数/时间组装批次，断线后随机退避重连；
//! - 全部订阅共享一个容量为 1 的两阶段批次队列，作为唯一的背压手段；
//! - 唯一的消费者：解析处理器、处理批次、持久化检查点后才确认队首，失败则原样重试；
//! - 协调器负责启动、关闭与状态观察。
//!
//! 投递语义为“至少一次”：处理器应当幂等。
//!
//! 另提供内存版日志与检查点存储，便于测试与演示。
//!
pub mod backoff;
pub mod batcher;
pub mod checkpoint;
pub mod consumer;
pub mod coordinator;
pub mod log;
pub mod queue;
pub mod registry;
pub mod worker;

pub use backoff::ReconnectBackoff;
pub use coordinator::{Coordinator, CoordinatorConfig, CoordinatorHandle};
pub use queue::{BatchQueue, InFlight};
pub use worker::{ReconnectFrom, SubscriptionWorker};
