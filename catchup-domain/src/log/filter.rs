//! 服务端过滤（EventFilter）
//!
//! 描述实时读取时由上游执行的过滤条件。包含条件为空表示不限制。
//!
use crate::checkpoint::CHECKPOINT_STREAM_PREFIX;
use crate::log::LogRecord;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventFilter {
    stream_prefixes: Vec<String>,
    event_type_prefixes: Vec<String>,
    excluded_stream_prefixes: Vec<String>,
    exclude_system_events: bool,
}

impl Default for EventFilter {
    /// 排除系统事件与检查点子流
    fn default() -> Self {
        Self::all()
            .excluding_system_events()
            .excluding_stream_prefix(CHECKPOINT_STREAM_PREFIX)
    }
}

impl EventFilter {
    /// 不做任何过滤
    pub fn all() -> Self {
        Self {
            stream_prefixes: Vec::new(),
            event_type_prefixes: Vec::new(),
            excluded_stream_prefixes: Vec::new(),
            exclude_system_events: false,
        }
    }

    pub fn with_stream_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.stream_prefixes.push(prefix.into());
        self
    }

    pub fn with_event_type_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.event_type_prefixes.push(prefix.into());
        self
    }

    pub fn excluding_stream_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.excluded_stream_prefixes.push(prefix.into());
        self
    }

    pub fn excluding_system_events(mut self) -> Self {
        self.exclude_system_events = true;
        self
    }

    pub fn matches(&self, record: &LogRecord) -> bool {
        if self.exclude_system_events && record.is_system_event() {
            return false;
        }

        let stream = record.stream_id();
        if self
            .excluded_stream_prefixes
            .iter()
            .any(|p| stream.starts_with(p.as_str()))
        {
            return false;
        }

        let stream_ok = self.stream_prefixes.is_empty()
            || self
                .stream_prefixes
                .iter()
                .any(|p| stream.starts_with(p.as_str()));
        let type_ok = self.event_type_prefixes.is_empty()
            || self
                .event_type_prefixes
                .iter()
                .any(|p| record.event_type().starts_with(p.as_str()));

        stream_ok && type_ok
    }
}
