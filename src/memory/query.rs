//! 排序检索的请求与结果

use crate::config::RankingWeights;
use crate::memory::scoring::ScoreComponents;
use crate::memory::types::{MemoryObject, SourceType};
use crate::namespace::Namespace;
use serde::{Deserialize, Serialize};

/// 检索请求；除命名空间外全部可选
#[derive(Debug, Clone)]
pub struct MemoryQuery {
    pub namespace: Namespace,
    /// 有值时调用相似度提供方，否则相似度视为 1.0
    pub query: Option<String>,
    /// 必须全部包含（AND）
    pub tags: Vec<String>,
    pub source_types: Vec<SourceType>,
    pub min_importance: Option<f64>,
    pub min_similarity: Option<f64>,
    pub max_age_days: Option<f64>,
    /// 为空时取配置默认值，并受上限约束
    pub limit: Option<usize>,
    /// 覆盖默认权重
    pub weights: Option<RankingWeights>,
    pub include_expired: bool,
    pub include_deleted: bool,
}

impl MemoryQuery {
    pub fn new(namespace: Namespace) -> Self {
        Self {
            namespace,
            query: None,
            tags: Vec::new(),
            source_types: Vec::new(),
            min_importance: None,
            min_similarity: None,
            max_age_days: None,
            limit: None,
            weights: None,
            include_expired: false,
            include_deleted: false,
        }
    }

    pub fn query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn source_types(mut self, types: Vec<SourceType>) -> Self {
        self.source_types = types;
        self
    }

    pub fn min_importance(mut self, min: f64) -> Self {
        self.min_importance = Some(min);
        self
    }

    pub fn min_similarity(mut self, min: f64) -> Self {
        self.min_similarity = Some(min);
        self
    }

    pub fn max_age_days(mut self, days: f64) -> Self {
        self.max_age_days = Some(days);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn weights(mut self, weights: RankingWeights) -> Self {
        self.weights = Some(weights);
        self
    }

    pub fn include_expired(mut self, include: bool) -> Self {
        self.include_expired = include;
        self
    }

    pub fn include_deleted(mut self, include: bool) -> Self {
        self.include_deleted = include;
        self
    }
}

/// 一条排序结果，附带评分分量与陈旧度提示
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryResult {
    pub memory: MemoryObject,
    pub score: f64,
    pub score_components: ScoreComponents,
    pub is_stale: bool,
    pub age_days: f64,
    pub stale_reason: Option<String>,
}

/// `expire_memories` 的选项
#[derive(Debug, Clone, Copy, Default)]
pub struct ExpireOptions {
    /// 只列出候选，不修改状态
    pub dry_run: bool,
}

impl ExpireOptions {
    pub fn dry_run() -> Self {
        Self { dry_run: true }
    }
}

/// 过期扫描结果
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExpireReport {
    pub count: usize,
    pub ids: Vec<String>,
    pub dry_run: bool,
}
