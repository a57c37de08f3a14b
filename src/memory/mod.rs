//! Knowledge Lane：长期记忆
//!
//! | 类型 | 作用 |
//! |------|------|
//! | [`MemoryObject`] | 带版本、溯源、TTL 的记忆条目 |
//! | [`KnowledgeLane`] | 存储、排序检索与生命周期变更 |
//! | [`TextSimilarity`] / [`ContentValidator`] | 可替换的相似度与入库校验 |
//!
//! 排序公式：`score = w_c·task_criticality + w_s·similarity + w_i·importance + w_r·recency`，
//! 默认权重 `0.45 / 0.25 / 0.20 / 0.10`。
//!
//! ## 快速上手
//!
//! ```rust,no_run
//! use echo_checkpoint::memory::{KnowledgeLane, MemoryQuery, MemorySource, SourceType, StoreMemoryInput};
//! use echo_checkpoint::namespace::Namespace;
//! use echo_checkpoint::storage::InMemoryBackend;
//! use std::sync::Arc;
//!
//! # async fn example() -> echo_checkpoint::error::Result<()> {
//! let lane = KnowledgeLane::new(Arc::new(InMemoryBackend::new()));
//! let ns = Namespace::new("acme", "support", "triage");
//!
//! lane.store_memory(
//!     StoreMemoryInput::new(ns.clone(), "部署需要二次审批", MemorySource::new(SourceType::Document, "runbook.md"))
//!         .task_criticality(0.9)
//!         .tags(["deployment"]),
//! )
//! .await?;
//!
//! let hits = lane
//!     .search_memories(&MemoryQuery::new(ns).query("部署 审批").limit(5))
//!     .await?;
//! # Ok(())
//! # }
//! ```

mod lane;
mod query;
pub mod scoring;
pub mod similarity;
mod types;
pub mod validator;

pub use lane::KnowledgeLane;
pub use query::{ExpireOptions, ExpireReport, MemoryQuery, MemoryResult};
pub use scoring::{ScoreComponents, Staleness, assess_staleness, calculate_recency_score};
pub use similarity::{KeywordSimilarity, TextSimilarity};
pub use types::{
    IngestionMetadata, MemoryEdit, MemoryObject, MemorySource, MemoryVersion, ProvenanceAction,
    ProvenanceEntry, SourceType, StoreMemoryInput,
};
pub use validator::{AcceptAllValidator, ContentValidator};
