//! 事件处理器（EventHandler）
//!
//! 定义消费某类/多类/全部事件的处理逻辑与元信息（名称、订阅类型）。
//! 处理器应当幂等：故障或重启后同一事件可能被再次投递。
//!
use crate::log::LogRecord;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;

#[derive(Clone, Debug)]
pub enum HandledEventType {
    One(String),
    Many(Vec<String>),
    All,
}

/// 已解码的事件：原始记录 + JSON 负载
#[derive(Debug)]
pub struct DecodedEvent<'a> {
    record: &'a LogRecord,
    data: Value,
}

impl<'a> DecodedEvent<'a> {
    pub fn new(record: &'a LogRecord, data: Value) -> Self {
        Self { record, data }
    }

    pub fn record(&self) -> &LogRecord {
        self.record
    }

    pub fn event_type(&self) -> &str {
        self.record.event_type()
    }

    pub fn data(&self) -> &Value {
        &self.data
    }

    /// 反序列化为具体事件类型。
    ///
    /// 处理器直接以 `?` 传播该错误时，引擎会按订阅的反序列化失败策略处理，
    /// 而不是视为一般的处理失败。
    pub fn deserialize<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        T::deserialize(&self.data)
    }
}

/// 事件处理器：处理某一类型的事件
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// 处理器名称（用于日志与错误定位）
    fn handler_name(&self) -> &str;
    /// 返回该处理器支持的事件类型
    fn handled_event_type(&self) -> HandledEventType;
    /// 处理事件
    async fn handle(&self, event: &DecodedEvent<'_>) -> anyhow::Result<()>;
}
