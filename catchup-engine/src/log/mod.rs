//! 上游日志实现
//!
mod inmemory;

pub use inmemory::InMemoryEventLog;
