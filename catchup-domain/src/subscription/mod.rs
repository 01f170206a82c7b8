//! 订阅（subscription）
//!
//! 订阅是一个具名、独立维护检查点的日志读取者：
//! - `SubscriptionId`：订阅名称；
//! - `SubscriptionConfig`：过滤、批次阈值、链接解析、反序列化失败策略与凭证；
//! - `SubscriptionStatus`：运行时状态机；
//! - `EventBatch`：投递给处理器的非空有序批次。
//!
mod batch;
mod config;
mod id;
mod status;

pub use batch::EventBatch;
pub use config::{DeserializeErrorPolicy, SubscriptionConfig};
pub use id::SubscriptionId;
pub use status::SubscriptionStatus;
