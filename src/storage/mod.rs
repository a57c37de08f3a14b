//! 存储后端
//!
//! 所有 checkpoint、记忆（含隔离区）和审计日志都经由 [`StorageBackend`] 持久化，
//! 调用方只依赖 trait，实现可以替换为嵌入式库、关系数据库或对象存储。
//!
//! ## 内置实现
//!
//! | 类型 | 说明 |
//! |------|------|
//! | [`InMemoryBackend`] | 进程内存，重启即清空，适合测试 |
//! | [`FileBackend`] | JSON 文件持久化，适合本地单机场景 |
//!
//! ## 快速上手
//!
//! ```rust,no_run
//! use echo_checkpoint::config::StorageConfig;
//! use echo_checkpoint::storage::open_backend;
//!
//! # fn example() -> echo_checkpoint::error::Result<()> {
//! let backend = open_backend(&StorageConfig::default())?;
//! # Ok(())
//! # }
//! ```

mod file;
mod memory;
pub(crate) mod tables;

pub use file::FileBackend;
pub use memory::InMemoryBackend;

use crate::checkpoint::Checkpoint;
use crate::config::{BackendKind, StorageConfig};
use crate::error::{ConfigError, Result};
use crate::memory::{MemoryObject, ProvenanceEntry, SourceType};
use crate::namespace::Namespace;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

// ── Query types ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

/// checkpoint 分页参数，按 `(step_index, created_at)` 排序
#[derive(Debug, Clone, Default)]
pub struct ListOptions {
    pub limit: Option<usize>,
    pub offset: usize,
    pub order: SortOrder,
    /// 仅列出某个 run
    pub run_id: Option<String>,
}

impl ListOptions {
    pub fn run(run_id: impl Into<String>) -> Self {
        Self {
            run_id: Some(run_id.into()),
            ..Self::default()
        }
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    pub fn order(mut self, order: SortOrder) -> Self {
        self.order = order;
        self
    }
}

/// 存储层的候选过滤条件；排序与语义相似度由上层完成
#[derive(Debug, Clone)]
pub struct MemoryFilter {
    /// 必须全部包含（AND）
    pub tags: Vec<String>,
    /// 为空表示不限
    pub source_types: Vec<SourceType>,
    pub min_importance: Option<f64>,
    /// 只保留此时间之后创建的记忆
    pub created_after: Option<DateTime<Utc>>,
    pub include_deleted: bool,
    pub include_expired: bool,
    /// 判断 TTL 的参考时间
    pub now: DateTime<Utc>,
}

impl MemoryFilter {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            tags: Vec::new(),
            source_types: Vec::new(),
            min_importance: None,
            created_after: None,
            include_deleted: false,
            include_expired: false,
            now,
        }
    }

    pub fn matches(&self, memory: &MemoryObject) -> bool {
        if memory.ingestion.quarantined {
            return false;
        }
        if memory.deleted && !self.include_deleted {
            return false;
        }
        if !self.include_expired && memory.is_expired(self.now) {
            return false;
        }
        if !self.tags.iter().all(|t| memory.tags.contains(t)) {
            return false;
        }
        if !self.source_types.is_empty()
            && !self.source_types.contains(&memory.source.source_type)
        {
            return false;
        }
        if let Some(min) = self.min_importance
            && memory.importance < min
        {
            return false;
        }
        if let Some(after) = self.created_after
            && memory.created_at < after
        {
            return false;
        }
        true
    }
}

// ── Audit ─────────────────────────────────────────────────────────────────────

/// 存储级审计记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub audit_id: String,
    pub namespace: Namespace,
    /// 如 `restore`、`memory.edit`
    pub action: String,
    pub entity_id: String,
    pub actor_id: String,
    #[serde(default)]
    pub detail: Value,
    pub timestamp: DateTime<Utc>,
}

impl AuditEntry {
    pub fn new(
        namespace: &Namespace,
        action: impl Into<String>,
        entity_id: impl Into<String>,
        actor_id: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            audit_id: uuid::Uuid::new_v4().to_string(),
            namespace: namespace.clone(),
            action: action.into(),
            entity_id: entity_id.into(),
            actor_id: actor_id.into(),
            detail: Value::Null,
            timestamp,
        }
    }

    pub fn with_detail(mut self, detail: Value) -> Self {
        self.detail = detail;
        self
    }
}

// ── StorageBackend trait ──────────────────────────────────────────────────────

/// 持久化接口；每个方法都以命名空间为作用域
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// 写入 checkpoint（以 `checkpoint.namespace` 分区）
    async fn save_checkpoint(&self, checkpoint: &Checkpoint) -> Result<()>;

    async fn get_checkpoint(&self, namespace: &Namespace, id: &str) -> Result<Option<Checkpoint>>;

    /// 最大 `step_index` 的 checkpoint，相同时取 `created_at` 较新者
    async fn get_latest_checkpoint(
        &self,
        namespace: &Namespace,
        run_id: Option<&str>,
    ) -> Result<Option<Checkpoint>>;

    async fn list_checkpoints(
        &self,
        namespace: &Namespace,
        options: &ListOptions,
    ) -> Result<Vec<Checkpoint>>;

    /// 写入或覆盖记忆
    async fn save_memory(&self, memory: &MemoryObject) -> Result<()>;

    async fn save_quarantined_memory(&self, memory: &MemoryObject) -> Result<()>;

    async fn get_memory(&self, namespace: &Namespace, id: &str) -> Result<Option<MemoryObject>>;

    async fn get_quarantined_memory(
        &self,
        namespace: &Namespace,
        id: &str,
    ) -> Result<Option<MemoryObject>>;

    async fn list_quarantined_memories(&self, namespace: &Namespace) -> Result<Vec<MemoryObject>>;

    /// 返回是否存在并删除
    async fn delete_quarantined_memory(&self, namespace: &Namespace, id: &str) -> Result<bool>;

    async fn search_memories(
        &self,
        namespace: &Namespace,
        filter: &MemoryFilter,
    ) -> Result<Vec<MemoryObject>>;

    /// 命名空间下的全部记忆（不含隔离区）
    async fn list_memories(&self, namespace: &Namespace) -> Result<Vec<MemoryObject>>;

    /// 原子地更新访问时间、追加 checkpoint 引用与溯源记录，返回更新后的对象
    async fn update_memory_access(
        &self,
        namespace: &Namespace,
        id: &str,
        accessed_at: DateTime<Utc>,
        checkpoint_id: Option<&str>,
        entry: ProvenanceEntry,
    ) -> Result<Option<MemoryObject>>;

    async fn log_audit(&self, entry: &AuditEntry) -> Result<()>;

    /// 按时间顺序返回审计日志，可按实体过滤
    async fn get_audit_log(
        &self,
        namespace: &Namespace,
        entity_id: Option<&str>,
    ) -> Result<Vec<AuditEntry>>;
}

/// 按配置打开存储后端
pub fn open_backend(config: &StorageConfig) -> Result<Arc<dyn StorageBackend>> {
    match config.backend {
        BackendKind::Memory => Ok(Arc::new(InMemoryBackend::new())),
        BackendKind::File => {
            let path = config.path.as_ref().ok_or_else(|| ConfigError::InvalidValue {
                field: "storage.path".to_string(),
                message: "required for the file backend".to_string(),
            })?;
            Ok(Arc::new(FileBackend::new(path)?))
        }
    }
}
