//! 检查点存储实现
//!
//! - `InMemoryCheckpointStore`：线程安全的内存映射，用于测试；
//! - `EventLogCheckpointStore`：在上游日志中为每个订阅维护一条只保留最新记录的子流。
//!
mod event_log;
mod inmemory;

pub use event_log::EventLogCheckpointStore;
pub use inmemory::InMemoryCheckpointStore;
