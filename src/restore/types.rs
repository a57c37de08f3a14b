use crate::checkpoint::{Checkpoint, Task};
use crate::memory::MemoryResult;
use crate::namespace::Namespace;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 恢复请求
///
/// checkpoint 选择优先级：`checkpoint_id` > `run_id` 内最新 > 命名空间内最新。
#[derive(Debug, Clone)]
pub struct RestoreRequest {
    pub namespace: Namespace,
    pub checkpoint_id: Option<String>,
    pub run_id: Option<String>,
    /// 额外检索的查询文本
    pub memory_query: Option<String>,
    /// 额外检索的标签过滤（AND）
    pub memory_tags: Vec<String>,
    /// 为空时取 `RestoreConfig::max_memories`
    pub max_memories: Option<usize>,
    pub actor_id: Option<String>,
}

impl RestoreRequest {
    pub fn new(namespace: Namespace) -> Self {
        Self {
            namespace,
            checkpoint_id: None,
            run_id: None,
            memory_query: None,
            memory_tags: Vec::new(),
            max_memories: None,
            actor_id: None,
        }
    }

    pub fn checkpoint(mut self, checkpoint_id: impl Into<String>) -> Self {
        self.checkpoint_id = Some(checkpoint_id.into());
        self
    }

    pub fn run(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = Some(run_id.into());
        self
    }

    pub fn memory_query(mut self, query: impl Into<String>) -> Self {
        self.memory_query = Some(query.into());
        self
    }

    pub fn memory_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.memory_tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn max_memories(mut self, max: usize) -> Self {
        self.max_memories = Some(max);
        self
    }

    pub fn actor(mut self, actor_id: impl Into<String>) -> Self {
        self.actor_id = Some(actor_id.into());
        self
    }

    /// 是否需要在引用记忆之外额外检索
    pub(crate) fn wants_query(&self) -> bool {
        self.memory_query
            .as_deref()
            .is_some_and(|q| !q.trim().is_empty())
            || !self.memory_tags.is_empty()
    }
}

/// 触发的 checkpoint 选择规则
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionRule {
    Explicit,
    LatestInRun,
    LatestInNamespace,
    /// 选中的 checkpoint 校验失败，按配置回退到祖先
    FallbackToParent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InclusionSource {
    /// checkpoint 的 `memory_refs` 直接引用
    Referenced,
    /// 额外检索命中
    Queried,
}

/// 单条记忆被纳入的理由
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryInclusion {
    pub memory_id: String,
    pub reason: String,
    pub score: f64,
    pub source: InclusionSource,
}

/// 机器可校验的恢复理由
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RestoreRationale {
    pub selection_rule: SelectionRule,
    pub selection_reason: String,
    pub inclusions: Vec<MemoryInclusion>,
    pub warnings: Vec<String>,
    /// `checkpoint:<id>` / `memory:<id>`
    pub evidence: Vec<String>,
}

/// 恢复结果：派生视图，不持久化
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResumePack {
    pub checkpoint: Checkpoint,
    pub unresolved_tasks: Vec<Task>,
    /// 引用记忆在前（分数 1.0），检索结果按排名在后
    pub memories: Vec<MemoryResult>,
    pub rationale: RestoreRationale,
    pub restored_at: DateTime<Utc>,
}

impl ResumePack {
    pub fn memory_ids(&self) -> Vec<&str> {
        self.memories
            .iter()
            .map(|r| r.memory.memory_id.as_str())
            .collect()
    }
}

/// 某一步 checkpoint 对某条记忆的引用
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryCitation {
    pub memory_id: String,
    pub checkpoint_id: String,
    pub step_index: u64,
    pub reason: String,
}

/// `explain_restore` 的输出：按 step 升序的 checkpoint 与全部记忆引用
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestoreExplanation {
    pub run_id: String,
    pub checkpoints: Vec<Checkpoint>,
    pub citations: Vec<MemoryCitation>,
}
