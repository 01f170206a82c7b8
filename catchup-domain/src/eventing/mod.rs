//! 事件处理约定（eventing）
//!
//! 引擎与业务处理器之间的协议：
//! - `EventHandler`：对单个事件进行处理，声明其关心的事件类型；
//! - `HandlerSet` / `HandlerFactory`：按订阅、按批次解析出的处理器集合；
//! - `BatchProcessor`：处理一整个批次并给出新的检查点。
//!
//! 该模块仅定义协议与默认实现，不负责调度；调度由引擎完成。
//!
mod handler;
mod handler_set;
mod processor;

pub use handler::{DecodedEvent, EventHandler, HandledEventType};
pub use handler_set::{HandlerFactory, HandlerSet};
pub use processor::{BatchProcessor, DefaultBatchProcessor, ProcessOptions};
