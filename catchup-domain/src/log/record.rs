//! 日志记录（LogRecord）
//!
//! 上游只追加日志中的原始单元，以及追加时使用的 `NewRecord`。
//!
use crate::position::Position;
use bon::Builder;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 链接事件的事件类型（负载为目标记录的位点）
pub const LINK_EVENT_TYPE: &str = "$>";

/// 链接信息：记录经由链接事件解析得到时，保留链接本身的来源
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkInfo {
    /// 链接事件所在的流
    pub stream_id: String,
    /// 链接事件在其流中的版本
    pub stream_revision: u64,
    /// 被链接记录的原始位点
    pub target_position: Position,
}

#[derive(Debug, Clone, Builder, Serialize, Deserialize)]
pub struct LogRecord {
    /// 事件唯一标识符
    event_id: Uuid,
    /// 所属流
    #[builder(into)]
    stream_id: String,
    /// 在所属流内的版本（从 0 开始）
    stream_revision: u64,
    /// 事件类型
    #[builder(into)]
    event_type: String,
    /// 事件负载（原始字节，通常为 JSON）
    #[builder(default)]
    payload: Vec<u8>,
    /// 事件元数据（原始字节）
    #[builder(default)]
    metadata: Vec<u8>,
    /// 全局日志位点；经链接解析的记录取链接事件的位点
    position: Position,
    /// 写入时间
    recorded_at: DateTime<Utc>,
    /// 链接来源（仅当记录由链接解析而来）
    link: Option<LinkInfo>,
}

impl LogRecord {
    pub fn event_id(&self) -> Uuid {
        self.event_id
    }

    pub fn stream_id(&self) -> &str {
        &self.stream_id
    }

    pub fn stream_revision(&self) -> u64 {
        self.stream_revision
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn metadata(&self) -> &[u8] {
        &self.metadata
    }

    pub fn position(&self) -> Position {
        self.position
    }

    pub fn recorded_at(&self) -> DateTime<Utc> {
        self.recorded_at
    }

    pub fn link(&self) -> Option<&LinkInfo> {
        self.link.as_ref()
    }

    /// 系统事件：类型以 `$` 开头
    pub fn is_system_event(&self) -> bool {
        self.event_type.starts_with('$')
    }

    pub fn is_link(&self) -> bool {
        self.event_type == LINK_EVENT_TYPE
    }

    /// 以链接事件 `link` 的位置与来源，重新定位本记录
    pub fn resolved_through(&self, link: &LogRecord) -> LogRecord {
        LogRecord {
            position: link.position,
            link: Some(LinkInfo {
                stream_id: link.stream_id.clone(),
                stream_revision: link.stream_revision,
                target_position: self.position,
            }),
            ..self.clone()
        }
    }
}

/// 待追加的记录
#[derive(Debug, Clone, Builder)]
pub struct NewRecord {
    #[builder(default = Uuid::new_v4())]
    event_id: Uuid,
    #[builder(into)]
    event_type: String,
    #[builder(default)]
    payload: Vec<u8>,
    #[builder(default)]
    metadata: Vec<u8>,
}

impl NewRecord {
    /// 以 JSON 序列化负载
    pub fn json<T: Serialize>(
        event_type: impl Into<String>,
        payload: &T,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self::builder()
            .event_type(event_type)
            .payload(serde_json::to_vec(payload)?)
            .build())
    }

    /// 指向 `target` 位点的链接事件
    pub fn link_to(target: Position) -> Self {
        Self::builder()
            .event_type(LINK_EVENT_TYPE)
            .payload(target.to_string().into_bytes())
            .build()
    }

    pub fn event_id(&self) -> Uuid {
        self.event_id
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn metadata(&self) -> &[u8] {
        &self.metadata
    }
}
