//! 可手动推进的时钟，用于复现年龄、TTL、陈旧度相关逻辑。
//!
//! # 示例
//!
//! ```rust
//! use echo_checkpoint::clock::Clock;
//! use echo_checkpoint::testing::ManualClock;
//! use chrono::Duration;
//!
//! let clock = ManualClock::fixed();
//! let t0 = clock.now();
//! clock.advance(Duration::days(30));
//! assert_eq!(clock.now() - t0, Duration::days(30));
//! ```

use crate::clock::Clock;
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::sync::{Arc, Mutex};

/// 只在显式调用 [`advance`](ManualClock::advance) / [`set`](ManualClock::set) 时前进
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    pub fn new(at: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(at)),
        }
    }

    /// 固定起点 2025-01-01T00:00:00Z
    pub fn fixed() -> Self {
        Self::new(
            Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0)
                .single()
                .unwrap_or_default(),
        )
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap();
        *now += by;
    }

    pub fn set(&self, at: DateTime<Utc>) {
        *self.now.lock().unwrap() = at;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::fixed()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}
