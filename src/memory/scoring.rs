//! 记忆评分
//!
//! ```text
//! recency      = exp(-ln(2) * age_days / half_life)                        // 锚定 created_at
//! access       = exp(-ln(2) * days_since_access / half_life)               // 仅在有访问记录时
//! recency'     = recency + access_boost_max * access * (1 - recency)       // 访问只做有限上调
//!
//! score = w_crit * task_criticality + w_sem * semantic_similarity
//!       + w_imp * importance       + w_rec * recency'
//! ```
//!
//! 评分对权重是线性的，不做归一化。

use crate::config::{RankingConfig, RankingWeights};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::f64::consts::LN_2;

const SECONDS_PER_DAY: f64 = 86_400.0;

/// 各评分分量（用于可解释性）
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreComponents {
    pub task_criticality: f64,
    pub semantic_similarity: f64,
    pub importance: f64,
    pub recency: f64,
}

impl ScoreComponents {
    /// 加权求和
    pub fn weighted(&self, weights: &RankingWeights) -> f64 {
        weights.task_criticality * self.task_criticality
            + weights.semantic_similarity * self.semantic_similarity
            + weights.importance * self.importance
            + weights.recency_decay * self.recency
    }
}

/// 陈旧度提示
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Staleness {
    pub age_days: f64,
    pub is_stale: bool,
    pub stale_reason: Option<String>,
}

fn days_between(earlier: DateTime<Utc>, later: DateTime<Utc>) -> f64 {
    ((later - earlier).num_seconds() as f64 / SECONDS_PER_DAY).max(0.0)
}

fn decay(days: f64, half_life_days: f64) -> f64 {
    (-LN_2 * days / half_life_days).exp()
}

/// 使用默认参数（7 天半衰期、0.1 访问上调）计算近因分
pub fn calculate_recency_score(
    created_at: DateTime<Utc>,
    last_accessed_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> f64 {
    calculate_recency_score_with(created_at, last_accessed_at, now, &RankingConfig::default())
}

/// 近因分：以创建时间为主做指数衰减，最近访问只带来有界的上调，不会掩盖真实年龄
pub fn calculate_recency_score_with(
    created_at: DateTime<Utc>,
    last_accessed_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    config: &RankingConfig,
) -> f64 {
    let half_life = config.recency_half_life_days;
    let base = decay(days_between(created_at, now), half_life);
    let boosted = match last_accessed_at {
        Some(accessed) => {
            let access = decay(days_between(accessed, now), half_life);
            base + config.access_boost_max * access * (1.0 - base)
        }
        None => base,
    };
    boosted.clamp(0.0, 1.0)
}

/// 陈旧度：从最近一次触达（访问或创建）起算
pub fn assess_staleness(
    created_at: DateTime<Utc>,
    last_accessed_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    stale_after_days: f64,
) -> Staleness {
    let anchor = last_accessed_at.map_or(created_at, |a| a.max(created_at));
    let age_days = days_between(anchor, now);
    let is_stale = age_days > stale_after_days;
    let stale_reason = is_stale.then(|| {
        format!(
            "not created or accessed for {} days (threshold {} days)",
            age_days.floor(),
            stale_after_days
        )
    });
    Staleness {
        age_days,
        is_stale,
        stale_reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_fresh_memory_scores_one() {
        let now = Utc::now();
        let score = calculate_recency_score(now, None, now);
        assert!((score - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_half_life_is_seven_days() {
        let now = Utc::now();
        let score = calculate_recency_score(now - Duration::days(7), None, now);
        assert!((score - 0.5).abs() < 1e-3, "got {score}");
    }

    #[test]
    fn test_access_boost_is_bounded() {
        let now = Utc::now();
        let created = now - Duration::days(30);
        let untouched = calculate_recency_score(created, None, now);
        let accessed = calculate_recency_score(created, Some(now), now);
        assert!(accessed > untouched);
        assert!(accessed < 0.6, "got {accessed}");
    }

    #[test]
    fn test_future_timestamps_do_not_exceed_one() {
        let now = Utc::now();
        let score = calculate_recency_score(now + Duration::days(1), Some(now), now);
        assert!(score <= 1.0);
    }

    #[test]
    fn test_weights_are_linear() {
        let components = ScoreComponents {
            task_criticality: 0.37,
            semantic_similarity: 0.9,
            importance: 0.1,
            recency: 0.4,
        };
        let only_crit = RankingWeights::new(1.0, 0.0, 0.0, 0.0);
        assert_eq!(components.weighted(&only_crit), 0.37);

        let defaults = RankingWeights::default();
        let expected = 0.45 * 0.37 + 0.25 * 0.9 + 0.20 * 0.1 + 0.10 * 0.4;
        assert!((components.weighted(&defaults) - expected).abs() < 1e-12);
    }

    #[test]
    fn test_staleness_threshold() {
        let now = Utc::now();
        let old = now - Duration::days(120);

        let stale = assess_staleness(old, None, now, 90.0);
        assert!(stale.is_stale);
        assert!(stale.stale_reason.is_some());
        assert!(stale.age_days >= 119.0);

        let refreshed = assess_staleness(old, Some(now - Duration::days(3)), now, 90.0);
        assert!(!refreshed.is_stale, "近期访问刷新陈旧度");
        assert!(refreshed.stale_reason.is_none());
    }
}
