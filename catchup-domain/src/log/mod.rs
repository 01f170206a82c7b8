//! 上游只追加日志（log）
//!
//! 定义日志记录、服务端过滤与日志访问协议；具体实现（内存版或远端服务客户端）
//! 由上层提供并注入。
//!
mod event_log;
mod filter;
mod record;

pub use event_log::{
    AppendResult, Credentials, EventLog, ExpectedRevision, LiveStream, ReadOptions,
};
pub use filter::EventFilter;
pub use record::{LINK_EVENT_TYPE, LinkInfo, LogRecord, NewRecord};
