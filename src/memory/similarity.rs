//! 文本相似度提供方
//!
//! 检索带 `query` 时由 [`TextSimilarity`] 给出 `[0, 1]` 的语义相似度；
//! 实现方可以是嵌入模型、外部检索服务等。内置 [`KeywordSimilarity`] 按关键词命中比例打分。

use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashSet;

#[async_trait]
pub trait TextSimilarity: Send + Sync {
    /// 返回 `query` 与 `content` 的相似度，范围 `[0, 1]`
    async fn similarity(&self, query: &str, content: &str) -> Result<f64>;
}

/// 关键词命中率：匹配的关键词数 / 总关键词数
#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordSimilarity;

#[async_trait]
impl TextSimilarity for KeywordSimilarity {
    async fn similarity(&self, query: &str, content: &str) -> Result<f64> {
        Ok(keyword_overlap(query, content))
    }
}

pub(crate) fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| c.is_whitespace() || "，。！？、；：,.!?;: ".contains(c))
        .filter(|s| s.chars().count() > 1)
        .map(|s| s.to_lowercase())
        .collect::<HashSet<_>>()
        .into_iter()
        .collect()
}

pub(crate) fn keyword_overlap(query: &str, content: &str) -> f64 {
    let keywords = tokenize(query);
    if keywords.is_empty() {
        return 1.0;
    }
    let text = content.to_lowercase();
    let matched = keywords
        .iter()
        .filter(|kw| text.contains(kw.as_str()))
        .count();
    matched as f64 / keywords.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_dedups_and_lowercases() {
        let mut tokens = tokenize("Deploy, deploy! a Rollback");
        tokens.sort();
        assert_eq!(tokens, vec!["deploy", "rollback"]);
    }

    #[test]
    fn test_tokenize_counts_chars_not_bytes() {
        let mut tokens = tokenize("部 署 部署 x");
        tokens.sort();
        assert_eq!(tokens, vec!["部署"], "单个汉字与单个字母一样不算关键词");
    }

    #[tokio::test]
    async fn test_keyword_similarity() {
        let sim = KeywordSimilarity;
        let full = sim
            .similarity("deploy rollback", "Rollback the deploy on failure")
            .await
            .unwrap();
        assert_eq!(full, 1.0);

        let half = sim
            .similarity("deploy billing", "deploy via blue/green")
            .await
            .unwrap();
        assert_eq!(half, 0.5);

        let none = sim.similarity("kafka", "deploy via blue/green").await.unwrap();
        assert_eq!(none, 0.0);
    }

    #[tokio::test]
    async fn test_empty_query_assumes_relevance() {
        let sim = KeywordSimilarity;
        assert_eq!(sim.similarity("  ", "anything").await.unwrap(), 1.0);
    }
}
