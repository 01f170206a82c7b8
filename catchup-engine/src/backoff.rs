//! 退避策略
//!
//! - `ReconnectBackoff`：订阅断线重连前的随机等待（均匀分布于 `[min, max]`）；
//! - `retry_delay`：批处理失败后的指数退避。
//!
use std::time::Duration;

/// 断线重连的随机退避区间
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReconnectBackoff {
    pub min: Duration,
    pub max: Duration,
}

impl Default for ReconnectBackoff {
    fn default() -> Self {
        Self {
            min: Duration::from_secs(1),
            max: Duration::from_secs(2),
        }
    }
}

impl ReconnectBackoff {
    pub fn fixed(delay: Duration) -> Self {
        Self {
            min: delay,
            max: delay,
        }
    }

    /// 本次等待时长，毫秒粒度
    pub fn next_delay(&self) -> Duration {
        let min = self.min.as_millis() as u64;
        let max = (self.max.as_millis() as u64).max(min);
        Duration::from_millis(fastrand::u64(min..=max))
    }
}

/// 第 `attempt` 次（从 1 起）失败后的等待：`base * 2^(attempt-1)`，不超过 `max`
///
/// `base` 为零时恒为零，即立即重试。
pub fn retry_delay(base: Duration, max: Duration, attempt: u32) -> Duration {
    if base.is_zero() {
        return Duration::ZERO;
    }
    let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
    base.saturating_mul(factor).min(max)
}
