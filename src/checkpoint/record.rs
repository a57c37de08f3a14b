//! Checkpoint 记录与内容哈希
//!
//! checkpoint 一经封存即不可变：`state_hash` 是除自身外全部字段的规范化序列化的 SHA-256，
//! 任何字段被改动都会使哈希失效。规范化规则：
//!
//! - 先序列化为 JSON，去掉顶层 `state_hash` 字段
//! - 对象键按字典序排序（递归），输出无空白的紧凑 JSON
//! - 对 UTF-8 字节取 SHA-256，十六进制小写输出
//!
//! 任何语言按相同规则都能逐字节复现该哈希。

use crate::checkpoint::state::{Action, Goal, Task};
use crate::error::{IntegrityError, Result, ValidationError};
use crate::namespace::Namespace;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// 当前 checkpoint 结构版本
pub const CHECKPOINT_SCHEMA_VERSION: u32 = 1;

const HASH_FIELD: &str = "state_hash";

/// 某次运行中某一步结束时的 Agent 状态快照
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// 快照唯一 ID（UUID v4）
    pub checkpoint_id: String,
    /// 父快照；仅 run 的创世快照为 `None`
    pub parent_checkpoint_id: Option<String>,
    pub namespace: Namespace,
    pub run_id: String,
    /// run 内单调递增
    pub step_index: u64,
    pub goal_stack: Vec<Goal>,
    pub pending_actions: Vec<Action>,
    /// 工具状态（不透明）
    pub tool_state: BTreeMap<String, Value>,
    pub policy_flags: BTreeMap<String, Value>,
    pub unresolved_tasks: Vec<Task>,
    /// 引用的 memory id
    pub memory_refs: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub writer_id: String,
    pub schema_version: u32,
    pub state_hash: String,
}

impl Checkpoint {
    pub fn is_genesis(&self) -> bool {
        self.parent_checkpoint_id.is_none()
    }

    /// 处于阻塞状态的未解决任务
    pub fn blocked_tasks(&self) -> impl Iterator<Item = &Task> {
        self.unresolved_tasks.iter().filter(|t| t.is_blocked())
    }

    /// 短 ID（前 8 个字符），用于日志与说明文本
    pub fn short_id(&self) -> &str {
        match self.checkpoint_id.char_indices().nth(8) {
            Some((end, _)) => &self.checkpoint_id[..end],
            None => &self.checkpoint_id,
        }
    }
}

/// 计算 checkpoint 的内容哈希（忽略 `state_hash` 字段本身）
pub fn compute_checkpoint_hash(checkpoint: &Checkpoint) -> Result<String> {
    let mut value = serde_json::to_value(checkpoint)?;
    if let Value::Object(map) = &mut value {
        map.remove(HASH_FIELD);
    }
    let mut canonical = String::new();
    write_canonical(&value, &mut canonical)?;

    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}

/// 重新计算哈希并与记录值比较
pub fn verify_checkpoint_integrity(checkpoint: &Checkpoint) -> bool {
    matches!(compute_checkpoint_hash(checkpoint), Ok(hash) if hash == checkpoint.state_hash)
}

/// 与 [`verify_checkpoint_integrity`] 相同，但失败时返回带详情的错误
pub fn ensure_checkpoint_integrity(checkpoint: &Checkpoint) -> Result<()> {
    let computed = compute_checkpoint_hash(checkpoint)?;
    if computed != checkpoint.state_hash {
        return Err(IntegrityError::HashMismatch {
            checkpoint_id: checkpoint.checkpoint_id.clone(),
            stored: checkpoint.state_hash.clone(),
            computed,
        }
        .into());
    }
    Ok(())
}

fn write_canonical(value: &Value, out: &mut String) -> Result<()> {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&serde_json::to_string(key)?);
                out.push(':');
                write_canonical(&map[key], out)?;
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out)?;
            }
            out.push(']');
        }
        scalar => out.push_str(&serde_json::to_string(scalar)?),
    }
    Ok(())
}

// ── CheckpointDraft ───────────────────────────────────────────────────────────

/// 待封存的 checkpoint 内容
///
/// 调用方填好状态后调用 [`seal`](CheckpointDraft::seal)，由其分配 ID、写入时间戳并盖上哈希。
#[derive(Debug, Clone)]
pub struct CheckpointDraft {
    pub parent_checkpoint_id: Option<String>,
    pub namespace: Namespace,
    pub run_id: String,
    pub step_index: u64,
    pub goal_stack: Vec<Goal>,
    pub pending_actions: Vec<Action>,
    pub tool_state: BTreeMap<String, Value>,
    pub policy_flags: BTreeMap<String, Value>,
    pub unresolved_tasks: Vec<Task>,
    pub memory_refs: Vec<String>,
    pub writer_id: String,
}

impl CheckpointDraft {
    /// run 的第一个快照（step 0，无父节点）
    pub fn genesis(
        namespace: Namespace,
        run_id: impl Into<String>,
        writer_id: impl Into<String>,
    ) -> Self {
        Self {
            parent_checkpoint_id: None,
            namespace,
            run_id: run_id.into(),
            step_index: 0,
            goal_stack: Vec::new(),
            pending_actions: Vec::new(),
            tool_state: BTreeMap::new(),
            policy_flags: BTreeMap::new(),
            unresolved_tasks: Vec::new(),
            memory_refs: Vec::new(),
            writer_id: writer_id.into(),
        }
    }

    /// 紧接 `parent` 的下一步：同命名空间、同 run，step + 1，并继承父节点的状态作为起点
    pub fn next_from(parent: &Checkpoint, writer_id: impl Into<String>) -> Self {
        Self {
            parent_checkpoint_id: Some(parent.checkpoint_id.clone()),
            namespace: parent.namespace.clone(),
            run_id: parent.run_id.clone(),
            step_index: parent.step_index + 1,
            goal_stack: parent.goal_stack.clone(),
            pending_actions: parent.pending_actions.clone(),
            tool_state: parent.tool_state.clone(),
            policy_flags: parent.policy_flags.clone(),
            unresolved_tasks: parent.unresolved_tasks.clone(),
            memory_refs: Vec::new(),
            writer_id: writer_id.into(),
        }
    }

    pub fn goals(mut self, goals: Vec<Goal>) -> Self {
        self.goal_stack = goals;
        self
    }

    pub fn pending_actions(mut self, actions: Vec<Action>) -> Self {
        self.pending_actions = actions;
        self
    }

    pub fn unresolved_tasks(mut self, tasks: Vec<Task>) -> Self {
        self.unresolved_tasks = tasks;
        self
    }

    pub fn memory_refs(mut self, refs: Vec<String>) -> Self {
        self.memory_refs = refs;
        self
    }

    pub fn tool_state(mut self, key: impl Into<String>, value: Value) -> Self {
        self.tool_state.insert(key.into(), value);
        self
    }

    pub fn policy_flag(mut self, key: impl Into<String>, value: Value) -> Self {
        self.policy_flags.insert(key.into(), value);
        self
    }

    /// 以当前时间封存
    pub fn seal(self) -> Result<Checkpoint> {
        self.seal_at(Utc::now())
    }

    /// 以指定时间封存：分配 UUID v4、写入 schema 版本并计算 `state_hash`
    pub fn seal_at(self, created_at: DateTime<Utc>) -> Result<Checkpoint> {
        self.namespace.validate()?;
        if self.run_id.trim().is_empty() {
            return Err(ValidationError::MissingField("run_id".to_string()).into());
        }
        if self.writer_id.trim().is_empty() {
            return Err(ValidationError::MissingField("writer_id".to_string()).into());
        }
        let mut checkpoint = Checkpoint {
            checkpoint_id: uuid::Uuid::new_v4().to_string(),
            parent_checkpoint_id: self.parent_checkpoint_id,
            namespace: self.namespace,
            run_id: self.run_id,
            step_index: self.step_index,
            goal_stack: self.goal_stack,
            pending_actions: self.pending_actions,
            tool_state: self.tool_state,
            policy_flags: self.policy_flags,
            unresolved_tasks: self.unresolved_tasks,
            memory_refs: self.memory_refs,
            created_at,
            writer_id: self.writer_id,
            schema_version: CHECKPOINT_SCHEMA_VERSION,
            state_hash: String::new(),
        };
        checkpoint.state_hash = compute_checkpoint_hash(&checkpoint)?;
        Ok(checkpoint)
    }
}
