//! 记忆对象与溯源记录

use crate::namespace::Namespace;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

// ── Provenance ────────────────────────────────────────────────────────────────

/// 溯源动作
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProvenanceAction {
    Created,
    Accessed,
    Modified,
    Cited,
    Invalidated,
    Edited,
    Deleted,
    Merged,
    Quarantined,
    RolledBack,
    Expired,
}

impl ProvenanceAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Accessed => "accessed",
            Self::Modified => "modified",
            Self::Cited => "cited",
            Self::Invalidated => "invalidated",
            Self::Edited => "edited",
            Self::Deleted => "deleted",
            Self::Merged => "merged",
            Self::Quarantined => "quarantined",
            Self::RolledBack => "rolled_back",
            Self::Expired => "expired",
        }
    }
}

/// 一条只追加的溯源记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProvenanceEntry {
    pub action: ProvenanceAction,
    pub actor_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checkpoint_id: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// 回滚时指向的目标版本
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_version: Option<u32>,
}

impl ProvenanceEntry {
    pub fn new(action: ProvenanceAction, actor_id: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            action,
            actor_id: actor_id.into(),
            checkpoint_id: None,
            timestamp: at,
            reason: None,
            target_version: None,
        }
    }

    pub fn with_checkpoint(mut self, checkpoint_id: Option<&str>) -> Self {
        self.checkpoint_id = checkpoint_id.map(String::from);
        self
    }

    pub fn with_reason(mut self, reason: Option<&str>) -> Self {
        self.reason = reason.map(String::from);
        self
    }

    pub fn with_target_version(mut self, version: u32) -> Self {
        self.target_version = Some(version);
        self
    }
}

// ── Source / Ingestion ────────────────────────────────────────────────────────

/// 记忆来源类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    Conversation,
    ToolOutput,
    Document,
    User,
    System,
    Import,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemorySource {
    pub source_type: SourceType,
    /// 来源标识（会话 ID、工具名、文件路径等）
    pub identifier: String,
    pub timestamp: DateTime<Utc>,
}

impl MemorySource {
    pub fn new(source_type: SourceType, identifier: impl Into<String>) -> Self {
        Self {
            source_type,
            identifier: identifier.into(),
            timestamp: Utc::now(),
        }
    }
}

/// 外部内容校验器给出的入库元数据
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestionMetadata {
    pub confidence_score: f64,
    pub detected_format: String,
    #[serde(default)]
    pub anomaly_flags: Vec<String>,
    #[serde(default)]
    pub quarantined: bool,
    #[serde(default)]
    pub validation_notes: Vec<String>,
}

impl IngestionMetadata {
    pub fn accepted(detected_format: impl Into<String>) -> Self {
        Self {
            confidence_score: 1.0,
            detected_format: detected_format.into(),
            anomaly_flags: Vec::new(),
            quarantined: false,
            validation_notes: Vec::new(),
        }
    }
}

// ── MemoryVersion ─────────────────────────────────────────────────────────────

/// 某一版本的内容快照，回滚从这里读取
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryVersion {
    pub version: u32,
    pub content: String,
    pub tags: Vec<String>,
    pub importance: f64,
    pub task_criticality: f64,
    pub recorded_at: DateTime<Utc>,
}

// ── MemoryObject ──────────────────────────────────────────────────────────────

/// 一条可检索的记忆
///
/// 当前内容只是投影：每个版本的内容都记录在 `versions` 中，每次变更都记录在 `provenance` 中。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryObject {
    pub memory_id: String,
    pub namespace: Namespace,
    pub content: String,
    pub content_type: String,
    pub source: MemorySource,
    pub ingestion: IngestionMetadata,
    pub provenance: Vec<ProvenanceEntry>,
    pub tags: Vec<String>,
    /// [0, 1]
    pub importance: f64,
    /// [0, 1]
    pub task_criticality: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub last_accessed_at: Option<DateTime<Utc>>,
    /// 0 = 已过期；`None` = 永久
    #[serde(default)]
    pub ttl_seconds: Option<u64>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    /// 引用过该记忆的 checkpoint（集合语义，保持首次引用顺序）
    #[serde(default)]
    pub checkpoint_refs: Vec<String>,
    pub version: u32,
    #[serde(default)]
    pub versions: Vec<MemoryVersion>,
    #[serde(default)]
    pub deleted: bool,
    #[serde(default)]
    pub deleted_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub expired: bool,
}

impl MemoryObject {
    /// TTL 或显式过期时间是否已到
    pub fn is_ttl_elapsed(&self, now: DateTime<Utc>) -> bool {
        if let Some(expires_at) = self.expires_at
            && expires_at <= now
        {
            return true;
        }
        match self.ttl_seconds {
            Some(0) => true,
            Some(ttl) => {
                let ttl = i64::try_from(ttl).unwrap_or(i64::MAX);
                Duration::try_seconds(ttl)
                    .and_then(|d| self.created_at.checked_add_signed(d))
                    .is_some_and(|deadline| deadline <= now)
            }
            None => false,
        }
    }

    /// 已过期（被标记或 TTL 已到）
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expired || self.is_ttl_elapsed(now)
    }

    pub fn version_snapshot(&self, version: u32) -> Option<&MemoryVersion> {
        self.versions.iter().find(|v| v.version == version)
    }

    /// 以当前内容记录一个版本快照
    pub(crate) fn record_version(&mut self, at: DateTime<Utc>) {
        self.versions.push(MemoryVersion {
            version: self.version,
            content: self.content.clone(),
            tags: self.tags.clone(),
            importance: self.importance,
            task_criticality: self.task_criticality,
            recorded_at: at,
        });
    }
}

// ── Inputs ────────────────────────────────────────────────────────────────────

/// `store_memory` 的输入；未设置的字段按默认值归一化
#[derive(Debug, Clone)]
pub struct StoreMemoryInput {
    pub namespace: Namespace,
    pub content: String,
    pub content_type: Option<String>,
    pub source: MemorySource,
    pub tags: Option<Vec<String>>,
    pub importance: Option<f64>,
    pub task_criticality: Option<f64>,
    pub embedding: Option<Vec<f32>>,
    pub ttl_seconds: Option<u64>,
    pub expires_at: Option<DateTime<Utc>>,
    /// 已由外部校验器给出的元数据；为空时由 lane 调用注入的校验器
    pub ingestion: Option<IngestionMetadata>,
    pub actor_id: Option<String>,
    pub checkpoint_id: Option<String>,
}

impl StoreMemoryInput {
    pub fn new(namespace: Namespace, content: impl Into<String>, source: MemorySource) -> Self {
        Self {
            namespace,
            content: content.into(),
            content_type: None,
            source,
            tags: None,
            importance: None,
            task_criticality: None,
            embedding: None,
            ttl_seconds: None,
            expires_at: None,
            ingestion: None,
            actor_id: None,
            checkpoint_id: None,
        }
    }

    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = Some(tags.into_iter().map(Into::into).collect());
        self
    }

    pub fn importance(mut self, importance: f64) -> Self {
        self.importance = Some(importance);
        self
    }

    pub fn task_criticality(mut self, task_criticality: f64) -> Self {
        self.task_criticality = Some(task_criticality);
        self
    }

    pub fn embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    pub fn ttl_seconds(mut self, ttl: u64) -> Self {
        self.ttl_seconds = Some(ttl);
        self
    }

    pub fn expires_at(mut self, at: DateTime<Utc>) -> Self {
        self.expires_at = Some(at);
        self
    }

    pub fn ingestion(mut self, ingestion: IngestionMetadata) -> Self {
        self.ingestion = Some(ingestion);
        self
    }

    pub fn actor(mut self, actor_id: impl Into<String>) -> Self {
        self.actor_id = Some(actor_id.into());
        self
    }

    pub fn checkpoint(mut self, checkpoint_id: impl Into<String>) -> Self {
        self.checkpoint_id = Some(checkpoint_id.into());
        self
    }
}

/// `edit_memory` 的改动集；至少需要一个字段
#[derive(Debug, Clone, Default)]
pub struct MemoryEdit {
    pub content: Option<String>,
    pub tags: Option<Vec<String>>,
    pub importance: Option<f64>,
}

impl MemoryEdit {
    pub fn content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = Some(tags.into_iter().map(Into::into).collect());
        self
    }

    pub fn importance(mut self, importance: f64) -> Self {
        self.importance = Some(importance);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_none() && self.tags.is_none() && self.importance.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory(created_at: DateTime<Utc>) -> MemoryObject {
        MemoryObject {
            memory_id: "m1".to_string(),
            namespace: Namespace::new("acme", "support", "triage"),
            content: "deploy with blue/green".to_string(),
            content_type: "text".to_string(),
            source: MemorySource::new(SourceType::User, "alice"),
            ingestion: IngestionMetadata::accepted("text"),
            provenance: Vec::new(),
            tags: Vec::new(),
            importance: 0.5,
            task_criticality: 0.5,
            embedding: None,
            created_at,
            updated_at: created_at,
            last_accessed_at: None,
            ttl_seconds: None,
            expires_at: None,
            checkpoint_refs: Vec::new(),
            version: 1,
            versions: Vec::new(),
            deleted: false,
            deleted_at: None,
            expired: false,
        }
    }

    #[test]
    fn test_ttl_semantics() {
        let now = Utc::now();
        let mut m = memory(now - Duration::hours(2));
        assert!(!m.is_ttl_elapsed(now), "无 TTL 视为永久");

        m.ttl_seconds = Some(0);
        assert!(m.is_ttl_elapsed(now), "TTL 为 0 立即过期");

        m.ttl_seconds = Some(3600);
        assert!(m.is_ttl_elapsed(now));

        m.ttl_seconds = Some(3 * 3600);
        assert!(!m.is_ttl_elapsed(now));

        m.expires_at = Some(now - Duration::seconds(1));
        assert!(m.is_ttl_elapsed(now), "显式过期时间优先");
    }

    #[test]
    fn test_provenance_action_serializes_snake_case() {
        let raw = serde_json::to_string(&ProvenanceAction::RolledBack).unwrap();
        assert_eq!(raw, "\"rolled_back\"");
        assert_eq!(ProvenanceAction::RolledBack.as_str(), "rolled_back");
    }
}
