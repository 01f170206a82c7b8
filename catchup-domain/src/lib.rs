//! 订阅领域层（catchup-domain）
//!
//! 提供“检查点 + 批处理”订阅引擎所需的值类型与协议：
//! - 日志位点（`position`）与上游只追加日志的访问协议（`log`）
//! - 检查点与检查点存储（`checkpoint`）
//! - 订阅配置、运行时状态与事件批次（`subscription`）
//! - 事件处理器与批处理约定（`eventing`）
//!
//! 本 crate 与存储、传输实现解耦，只定义接口与最小必要的错误类型；
//! 运行时（工作者、消费者、协调器）位于 `catchup-engine`。
//!
//! 典型用法：
//! 1. 为每个订阅构建 `SubscriptionConfig`；
//! 2. 实现 `EventHandler`，并通过 `HandlerFactory` 按订阅返回 `HandlerSet`；
//! 3. 选择 `CheckpointStore` 与 `EventLog` 实现，交给引擎的协调器运行。
//!
pub mod checkpoint;
pub mod error;
pub mod eventing;
pub mod log;
pub mod position;
pub mod subscription;
