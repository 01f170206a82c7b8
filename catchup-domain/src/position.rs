//! 日志位点（Position）
//!
//! 全局日志中全序的游标。`Option<Position>` 的 `None` 表示“日志起点/尚无检查点”。
//!

use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// 全局日志位点
///
/// 仅保证全序与可比较，不暴露任何存储层含义。
///
/// # 示例
///
/// ```
/// use catchup_domain::position::Position;
///
/// let a = Position::new(3);
/// let b = a.next();
/// assert!(b > a);
/// assert_eq!(b.value(), 4);
/// assert_eq!("4".parse::<Position>().unwrap(), b);
/// ```
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Position(u64);

impl Position {
    /// 日志中第一条记录的位点
    pub const FIRST: Position = Position(0);

    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    pub const fn value(&self) -> u64 {
        self.0
    }

    pub const fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    /// 判断位点是否严格位于检查点之后（`None` 表示从头开始，任意位点均在其后）
    ///
    /// ```
    /// use catchup_domain::position::Position;
    ///
    /// assert!(Position::new(0).is_after(None));
    /// assert!(Position::new(5).is_after(Some(Position::new(4))));
    /// assert!(!Position::new(4).is_after(Some(Position::new(4))));
    /// ```
    pub fn is_after(&self, checkpoint: Option<Position>) -> bool {
        checkpoint.is_none_or(|cp| *self > cp)
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Position {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse::<u64>().map(Self)
    }
}

impl From<u64> for Position {
    fn from(value: u64) -> Self {
        Self(value)
    }
}
