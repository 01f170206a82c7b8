//! 上游日志（EventLog）协议
//!
//! 引擎只依赖以下能力：按位点的实时读取（含服务端过滤与链接解析）、
//! 带期望版本的追加、读取流的最后一条记录，以及设置流的保留条数。
//! 实时流以 `Err(DomainError::Disconnected { .. })` 通知断开，
//! 断开原因区分瞬时故障与客户端主动取消。
//!
use crate::error::DomainResult as Result;
use crate::log::{EventFilter, LogRecord, NewRecord};
use crate::position::Position;
use async_trait::async_trait;
use bon::Builder;
use futures_core::stream::BoxStream;
use std::{fmt, sync::Arc};

/// 实时记录流，'static 生命周期，便于在 tokio::spawn 中消费
pub type LiveStream = BoxStream<'static, Result<LogRecord>>;

/// 访问上游所用的凭证
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// 实时读取选项
#[derive(Debug, Clone, Default, Builder)]
pub struct ReadOptions {
    #[builder(default)]
    pub filter: EventFilter,
    #[builder(default)]
    pub resolve_links: bool,
    pub credentials: Option<Credentials>,
}

/// 追加时对流当前状态的期望
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpectedRevision {
    Any,
    NoStream,
    StreamExists,
    Exact(u64),
}

impl fmt::Display for ExpectedRevision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => write!(f, "any"),
            Self::NoStream => write!(f, "no stream"),
            Self::StreamExists => write!(f, "stream exists"),
            Self::Exact(rev) => write!(f, "{rev}"),
        }
    }
}

/// 追加结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppendResult {
    /// 追加后流的最新版本
    pub next_expected_revision: u64,
    /// 最后一条记录的全局位点
    pub position: Position,
}

#[async_trait]
pub trait EventLog: Send + Sync {
    /// 打开严格位于 `from` 之后的实时读取（`None` 表示从日志起点开始）
    async fn read_live(&self, from: Option<Position>, options: &ReadOptions) -> Result<LiveStream>;

    /// 向流追加记录；流不满足 `expected` 时返回 `WrongExpectedVersion`，
    /// 期望 `StreamExists` 而流不存在时返回 `StreamNotFound`
    async fn append(
        &self,
        stream_id: &str,
        expected: ExpectedRevision,
        records: Vec<NewRecord>,
    ) -> Result<AppendResult>;

    /// 读取流的最后一条记录；流不存在时返回 `StreamNotFound`
    async fn read_last(&self, stream_id: &str) -> Result<LogRecord>;

    /// 设置流最多保留的记录条数
    async fn set_max_count(&self, stream_id: &str, max_count: u64) -> Result<()>;
}

#[async_trait]
impl<T> EventLog for Arc<T>
where
    T: EventLog + ?Sized,
{
    async fn read_live(&self, from: Option<Position>, options: &ReadOptions) -> Result<LiveStream> {
        (**self).read_live(from, options).await
    }

    async fn append(
        &self,
        stream_id: &str,
        expected: ExpectedRevision,
        records: Vec<NewRecord>,
    ) -> Result<AppendResult> {
        (**self).append(stream_id, expected, records).await
    }

    async fn read_last(&self, stream_id: &str) -> Result<LogRecord> {
        (**self).read_last(stream_id).await
    }

    async fn set_max_count(&self, stream_id: &str, max_count: u64) -> Result<()> {
        (**self).set_max_count(stream_id, max_count).await
    }
}
