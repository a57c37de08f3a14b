//! 时间源抽象
//!
//! 记忆的年龄、TTL、过期判定都依赖"当前时间"，通过注入 [`Clock`] 让这些逻辑在测试中可复现。
//! 测试用的可手动推进时钟见 [`crate::testing::ManualClock`]。

use chrono::{DateTime, Utc};

/// 可注入的时间源
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// 系统时钟（生产环境默认）
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
