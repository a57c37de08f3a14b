//! Mock 相似度提供方，按内容中的关键片段返回预设分数，并记录每次调用。
//!
//! # 示例
//!
//! ```rust
//! use echo_checkpoint::memory::TextSimilarity;
//! use echo_checkpoint::testing::MockSimilarity;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let sim = MockSimilarity::new(0.2).with_score("rollback", 0.9);
//!
//! assert_eq!(sim.similarity("q", "how to rollback").await.unwrap(), 0.9);
//! assert_eq!(sim.similarity("q", "unrelated").await.unwrap(), 0.2);
//! assert_eq!(sim.call_count(), 2);
//! # }
//! ```

use crate::error::{Result, StorageError};
use crate::memory::TextSimilarity;
use async_trait::async_trait;
use std::sync::{Arc, Mutex};

/// 可脚本化的相似度提供方
///
/// 按注册顺序匹配：第一个被 `content` 包含的片段决定分数，都不匹配时返回默认分数。
pub struct MockSimilarity {
    default_score: f64,
    scores: Vec<(String, f64)>,
    fail: bool,
    /// 每次调用的 (query, content)
    calls: Arc<Mutex<Vec<(String, String)>>>,
}

impl MockSimilarity {
    pub fn new(default_score: f64) -> Self {
        Self {
            default_score,
            scores: Vec::new(),
            fail: false,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// 内容包含 `needle` 时返回 `score`
    pub fn with_score(mut self, needle: impl Into<String>, score: f64) -> Self {
        self.scores.push((needle.into(), score));
        self
    }

    /// 所有调用都返回错误（模拟外部嵌入服务不可用）
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new(0.0)
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl TextSimilarity for MockSimilarity {
    async fn similarity(&self, query: &str, content: &str) -> Result<f64> {
        self.calls
            .lock()
            .unwrap()
            .push((query.to_string(), content.to_string()));
        if self.fail {
            return Err(StorageError::Backend("similarity provider unavailable".to_string()).into());
        }
        Ok(self
            .scores
            .iter()
            .find(|(needle, _)| content.contains(needle.as_str()))
            .map(|(_, score)| *score)
            .unwrap_or(self.default_score))
    }
}
