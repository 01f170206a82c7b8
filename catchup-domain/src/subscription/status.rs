use std::fmt;

/// 订阅运行时状态
///
/// ```text
/// NotStarted → Starting → Started → { Errored | Stopped }
///                 ↑          │ ↕
///                 └──────────┘ Paused（推送被背压阻塞）
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum SubscriptionStatus {
    #[default]
    NotStarted,
    Starting,
    Started,
    Paused,
    Errored,
    Stopped,
}

impl SubscriptionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Errored | Self::Stopped)
    }

    pub fn can_transition_to(&self, next: SubscriptionStatus) -> bool {
        use SubscriptionStatus::*;

        matches!(
            (self, next),
            (NotStarted, Starting)
                | (NotStarted, Stopped)
                | (Starting, Started)
                | (Starting, Errored)
                | (Starting, Stopped)
                | (Started, Starting)
                | (Started, Paused)
                | (Started, Errored)
                | (Started, Stopped)
                | (Paused, Started)
                | (Paused, Stopped)
        )
    }
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NotStarted => "not_started",
            Self::Starting => "starting",
            Self::Started => "started",
            Self::Paused => "paused",
            Self::Errored => "errored",
            Self::Stopped => "stopped",
        };
        f.write_str(s)
    }
}
