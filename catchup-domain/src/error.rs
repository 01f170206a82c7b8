//! 统一错误定义
//!
//! 覆盖日志读取/追加、检查点存储、批处理与订阅生命周期等最小必要集合，
//! 便于引擎与各实现层统一转换为 `DomainError`，并据此区分“瞬时故障”与“用户取消”。
//!
use crate::position::Position;
use std::fmt;
use thiserror::Error;

/// 订阅连接断开的原因
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectCause {
    /// 客户端主动关闭（本地拆除连接）
    ClientCancelled,
    /// 服务端关闭了实时读取
    ServerClosed,
    /// 订阅者消费过慢，被上游丢弃
    SubscriberLagged,
    /// 网络/传输层故障
    Transport(String),
}

impl fmt::Display for DisconnectCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ClientCancelled => write!(f, "client cancelled"),
            Self::ServerClosed => write!(f, "server closed"),
            Self::SubscriberLagged => write!(f, "subscriber lagged"),
            Self::Transport(reason) => write!(f, "transport: {reason}"),
        }
    }
}

/// 统一错误类型
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum DomainError {
    // --- 序列化 ---
    #[error("serialization error: {source}")]
    Serde {
        #[from]
        source: serde_json::Error,
    },
    #[error("parse error: {reason}")]
    Parse { reason: String },
    #[error("deserialize failed: position={position}, event_type={event_type}, reason={reason}")]
    Deserialize {
        position: Position,
        event_type: String,
        reason: String,
    },

    // --- 上游日志 ---
    #[error("event log unavailable: {reason}")]
    Unavailable { reason: String },
    #[error("subscription disconnected: {cause}")]
    Disconnected { cause: DisconnectCause },
    #[error("stream not found: {stream}")]
    StreamNotFound { stream: String },
    #[error("wrong expected version: stream={stream}, expected={expected}, actual={actual}")]
    WrongExpectedVersion {
        stream: String,
        expected: String,
        actual: String,
    },

    // --- 检查点 ---
    #[error("checkpoint store unavailable: {reason}")]
    StoreUnavailable { reason: String },

    // --- 处理器 ---
    #[error("event handler error: handler={handler}, reason={reason}")]
    EventHandler { handler: String, reason: String },
    #[error("handler resolution failed: subscription={subscription}, reason={reason}")]
    HandlerResolution {
        subscription: String,
        reason: String,
    },

    // --- 生命周期 ---
    #[error("operation cancelled")]
    Cancelled,
    #[error("subscription {subscription} failed to start after {attempts} attempts: {source}")]
    StartupFailed {
        subscription: String,
        attempts: u32,
        #[source]
        source: Box<DomainError>,
    },
    #[error("invalid config: {reason}")]
    InvalidConfig { reason: String },
    #[error("unknown subscription: {0}")]
    UnknownSubscription(String),
    #[error("task panicked: {reason}")]
    TaskPanicked { reason: String },
}

impl DomainError {
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable {
            reason: reason.into(),
        }
    }

    pub fn store_unavailable(reason: impl Into<String>) -> Self {
        Self::StoreUnavailable {
            reason: reason.into(),
        }
    }

    pub fn disconnected(cause: DisconnectCause) -> Self {
        Self::Disconnected { cause }
    }

    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// 是否为用户主动取消：协作式取消，或由本地拆除引起的传输断开。
    ///
    /// 其余错误（网络分区、服务端断开、日志服务不可用等）均视为瞬时故障。
    pub fn is_user_cancelled(&self) -> bool {
        matches!(
            self,
            Self::Cancelled
                | Self::Disconnected {
                    cause: DisconnectCause::ClientCancelled
                }
        )
    }

    /// 日志服务层面的不可达（可重试）
    pub fn is_unreachable(&self) -> bool {
        matches!(
            self,
            Self::Unavailable { .. } | Self::Disconnected { .. } | Self::StoreUnavailable { .. }
        )
    }
}

/// 统一 Result 类型别名
pub type DomainResult<T> = Result<T, DomainError>;

impl From<std::num::ParseIntError> for DomainError {
    fn from(err: std::num::ParseIntError) -> Self {
        DomainError::Parse {
            reason: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancellation_classification() {
        assert!(DomainError::Cancelled.is_user_cancelled());
        assert!(DomainError::disconnected(DisconnectCause::ClientCancelled).is_user_cancelled());

        for cause in [
            DisconnectCause::ServerClosed,
            DisconnectCause::SubscriberLagged,
            DisconnectCause::Transport("connection reset".into()),
        ] {
            assert!(!DomainError::disconnected(cause).is_user_cancelled());
        }
        assert!(!DomainError::unavailable("down").is_user_cancelled());
    }

    #[test]
    fn startup_failure_keeps_source() {
        let err = DomainError::StartupFailed {
            subscription: "orders".into(),
            attempts: 3,
            source: Box::new(DomainError::store_unavailable("timeout")),
        };
        let source = std::error::Error::source(&err).map(|s| s.to_string());
        assert_eq!(
            source.as_deref(),
            Some("checkpoint store unavailable: timeout")
        );
    }
}
