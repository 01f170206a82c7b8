//! 订阅配置（SubscriptionConfig）
//!
use super::SubscriptionId;
use crate::error::{DomainError, DomainResult};
use crate::log::{Credentials, EventFilter, ReadOptions};
use bon::Builder;
use std::time::Duration;

/// 单个事件反序列化失败时的处理策略
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DeserializeErrorPolicy {
    /// 记录告警并跳过该事件
    #[default]
    Skip,
    /// 整批失败（批次会被原样重试）
    Fail,
}

/// 订阅配置：构建后不可变
#[derive(Debug, Clone, Builder)]
pub struct SubscriptionConfig {
    #[builder(into)]
    id: SubscriptionId,
    /// 服务端过滤条件
    #[builder(default)]
    filter: EventFilter,
    /// 批次条数阈值
    #[builder(default = 100)]
    batch_size: usize,
    /// 批次时间阈值（自最早一条未刷出的记录起算）
    #[builder(default = Duration::from_millis(500))]
    batch_deadline: Duration,
    /// 是否解析链接事件
    #[builder(default)]
    resolve_links: bool,
    #[builder(default)]
    on_deserialize_error: DeserializeErrorPolicy,
    credentials: Option<Credentials>,
}

impl SubscriptionConfig {
    pub fn id(&self) -> &SubscriptionId {
        &self.id
    }

    pub fn filter(&self) -> &EventFilter {
        &self.filter
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn batch_deadline(&self) -> Duration {
        self.batch_deadline
    }

    pub fn resolve_links(&self) -> bool {
        self.resolve_links
    }

    pub fn on_deserialize_error(&self) -> DeserializeErrorPolicy {
        self.on_deserialize_error
    }

    pub fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref()
    }

    /// 实时读取所用的选项
    pub fn read_options(&self) -> ReadOptions {
        ReadOptions {
            filter: self.filter.clone(),
            resolve_links: self.resolve_links,
            credentials: self.credentials.clone(),
        }
    }

    pub fn validate(&self) -> DomainResult<()> {
        if self.id.as_str().is_empty() {
            return Err(DomainError::invalid_config("subscription id must not be empty"));
        }
        if self.batch_size == 0 {
            return Err(DomainError::invalid_config(format!(
                "subscription {}: batch_size must be at least 1",
                self.id
            )));
        }
        if self.batch_deadline.is_zero() {
            return Err(DomainError::invalid_config(format!(
                "subscription {}: batch_deadline must be positive",
                self.id
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_defaults() {
        let cfg = SubscriptionConfig::builder().id("orders").build();
        assert_eq!(cfg.id().as_str(), "orders");
        assert_eq!(cfg.batch_size(), 100);
        assert_eq!(cfg.batch_deadline(), Duration::from_millis(500));
        assert!(!cfg.resolve_links());
        assert_eq!(cfg.on_deserialize_error(), DeserializeErrorPolicy::Skip);
        assert!(cfg.credentials().is_none());
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        let cfg = SubscriptionConfig::builder()
            .id("orders")
            .batch_size(0)
            .build();
        assert!(matches!(
            cfg.validate(),
            Err(DomainError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn credentials_are_not_printed() {
        let cfg = SubscriptionConfig::builder()
            .id("orders")
            .credentials(Credentials::new("admin", "changeit"))
            .build();
        let printed = format!("{cfg:?}");
        assert!(printed.contains("admin"));
        assert!(!printed.contains("changeit"));
    }
}
