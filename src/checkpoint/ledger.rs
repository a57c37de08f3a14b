//! Checkpoint 账本
//!
//! 只追加、以哈希链接的 checkpoint 序列。账本不会替调用方重算哈希：
//! `save` 只接受哈希与内容一致的 checkpoint，链完整性由 [`CheckpointLedger::verify_chain_integrity`]
//! 事后逐节点检查，违规以列表形式返回以便定位损坏位置，从不自动修复。

use crate::checkpoint::record::{Checkpoint, ensure_checkpoint_integrity, verify_checkpoint_integrity};
use crate::error::{IntegrityError, NotFoundError, Result, ValidationError};
use crate::namespace::Namespace;
use crate::storage::{ListOptions, SortOrder, StorageBackend};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

// ── Chain report ──────────────────────────────────────────────────────────────

/// 链完整性违规
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChainViolation {
    /// 内容哈希与记录不一致
    HashMismatch { checkpoint_id: String },
    /// 父节点不存在
    MissingParent {
        checkpoint_id: String,
        parent_id: String,
    },
    /// 同一 run 出现多个创世节点
    DuplicateGenesis { checkpoint_id: String, run_id: String },
    /// 父节点的 step_index 不小于子节点
    NonMonotonicStep {
        checkpoint_id: String,
        parent_id: String,
        parent_step: u64,
        step: u64,
    },
    /// 同一 run 的同一 step 被写入多次
    DuplicateStep {
        checkpoint_id: String,
        run_id: String,
        step: u64,
    },
}

impl ChainViolation {
    pub fn checkpoint_id(&self) -> &str {
        match self {
            Self::HashMismatch { checkpoint_id }
            | Self::MissingParent { checkpoint_id, .. }
            | Self::DuplicateGenesis { checkpoint_id, .. }
            | Self::NonMonotonicStep { checkpoint_id, .. }
            | Self::DuplicateStep { checkpoint_id, .. } => checkpoint_id,
        }
    }
}

impl fmt::Display for ChainViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HashMismatch { checkpoint_id } => {
                write!(f, "checkpoint {checkpoint_id}: state hash mismatch")
            }
            Self::MissingParent {
                checkpoint_id,
                parent_id,
            } => write!(f, "checkpoint {checkpoint_id}: parent {parent_id} does not exist"),
            Self::DuplicateGenesis {
                checkpoint_id,
                run_id,
            } => write!(f, "checkpoint {checkpoint_id}: second genesis in run {run_id}"),
            Self::NonMonotonicStep {
                checkpoint_id,
                parent_id,
                parent_step,
                step,
            } => write!(
                f,
                "checkpoint {checkpoint_id}: step {step} is not after parent {parent_id} step {parent_step}"
            ),
            Self::DuplicateStep {
                checkpoint_id,
                run_id,
                step,
            } => write!(f, "checkpoint {checkpoint_id}: step {step} of run {run_id} written twice"),
        }
    }
}

/// 链校验结果
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChainReport {
    /// 检查过的 checkpoint 数
    pub checked: usize,
    pub violations: Vec<ChainViolation>,
}

impl ChainReport {
    pub fn is_valid(&self) -> bool {
        self.violations.is_empty()
    }
}

// ── CheckpointLedger ──────────────────────────────────────────────────────────

pub struct CheckpointLedger {
    storage: Arc<dyn StorageBackend>,
}

impl CheckpointLedger {
    pub fn new(storage: Arc<dyn StorageBackend>) -> Self {
        Self { storage }
    }

    pub fn storage(&self) -> &Arc<dyn StorageBackend> {
        &self.storage
    }

    /// 持久化一个已封存的 checkpoint
    ///
    /// 哈希与内容不一致时拒绝写入；同一 ID 只能写一次。
    pub async fn save(&self, checkpoint: &Checkpoint) -> Result<()> {
        checkpoint.namespace.validate()?;
        ensure_checkpoint_integrity(checkpoint)?;
        if self
            .storage
            .get_checkpoint(&checkpoint.namespace, &checkpoint.checkpoint_id)
            .await?
            .is_some()
        {
            return Err(ValidationError::AlreadyExists(checkpoint.checkpoint_id.clone()).into());
        }
        self.storage.save_checkpoint(checkpoint).await?;
        info!(
            namespace = %checkpoint.namespace,
            run_id = %checkpoint.run_id,
            step = checkpoint.step_index,
            checkpoint_id = %checkpoint.checkpoint_id,
            "🔖 保存 Checkpoint"
        );
        Ok(())
    }

    pub async fn get(&self, namespace: &Namespace, id: &str) -> Result<Option<Checkpoint>> {
        namespace.validate()?;
        match self.storage.get_checkpoint(namespace, id).await? {
            Some(checkpoint) if checkpoint.namespace != *namespace => {
                Err(ValidationError::NamespaceMismatch {
                    expected: namespace.key(),
                    actual: checkpoint.namespace.key(),
                }
                .into())
            }
            found => Ok(found),
        }
    }

    /// 与 [`get`](Self::get) 相同，但不存在时返回 not-found 错误
    pub async fn get_required(&self, namespace: &Namespace, id: &str) -> Result<Checkpoint> {
        self.get(namespace, id)
            .await?
            .ok_or_else(|| NotFoundError::Checkpoint(id.to_string()).into())
    }

    /// run 内（或整个命名空间内）step_index 最大的 checkpoint
    pub async fn get_latest(
        &self,
        namespace: &Namespace,
        run_id: Option<&str>,
    ) -> Result<Option<Checkpoint>> {
        namespace.validate()?;
        self.storage.get_latest_checkpoint(namespace, run_id).await
    }

    pub async fn list(&self, namespace: &Namespace, options: &ListOptions) -> Result<Vec<Checkpoint>> {
        namespace.validate()?;
        self.storage.list_checkpoints(namespace, options).await
    }

    /// 某个 run 的全部 checkpoint，按 step 升序
    pub async fn list_run(&self, namespace: &Namespace, run_id: &str) -> Result<Vec<Checkpoint>> {
        self.list(namespace, &ListOptions::run(run_id).order(SortOrder::Asc))
            .await
    }

    /// 从给定 checkpoint 沿父链回溯到创世节点（含自身，由新到旧）
    ///
    /// 父节点缺失时返回 integrity 错误；链上出现环时停止。
    pub async fn history(&self, namespace: &Namespace, id: &str) -> Result<Vec<Checkpoint>> {
        let mut chain = Vec::new();
        let mut seen = HashSet::new();
        let mut current = Some(self.get_required(namespace, id).await?);
        while let Some(checkpoint) = current.take() {
            if !seen.insert(checkpoint.checkpoint_id.clone()) {
                warn!(checkpoint_id = %checkpoint.checkpoint_id, "⚠️ 父链出现环，停止回溯");
                break;
            }
            if let Some(parent_id) = &checkpoint.parent_checkpoint_id {
                let parent = self.get(namespace, parent_id).await?.ok_or_else(|| {
                    IntegrityError::MissingParent {
                        checkpoint_id: checkpoint.checkpoint_id.clone(),
                        parent_id: parent_id.clone(),
                    }
                })?;
                current = Some(parent);
            }
            chain.push(checkpoint);
        }
        Ok(chain)
    }

    /// 单节点完整性：重算哈希并比较
    pub fn verify_checkpoint_integrity(&self, checkpoint: &Checkpoint) -> bool {
        verify_checkpoint_integrity(checkpoint)
    }

    /// 全命名空间链完整性校验
    pub async fn verify_chain_integrity(&self, namespace: &Namespace) -> Result<ChainReport> {
        let checkpoints = self.list(namespace, &ListOptions::default()).await?;
        let by_id: HashMap<&str, &Checkpoint> = checkpoints
            .iter()
            .map(|c| (c.checkpoint_id.as_str(), c))
            .collect();

        let mut violations = Vec::new();
        let mut genesis_runs: HashSet<&str> = HashSet::new();
        let mut steps: HashSet<(&str, u64)> = HashSet::new();

        // 已按 (step_index, created_at) 升序，重复项报告在后写入的那个上
        for checkpoint in &checkpoints {
            let id = checkpoint.checkpoint_id.clone();
            if !verify_checkpoint_integrity(checkpoint) {
                violations.push(ChainViolation::HashMismatch {
                    checkpoint_id: id.clone(),
                });
            }
            if !steps.insert((checkpoint.run_id.as_str(), checkpoint.step_index)) {
                violations.push(ChainViolation::DuplicateStep {
                    checkpoint_id: id.clone(),
                    run_id: checkpoint.run_id.clone(),
                    step: checkpoint.step_index,
                });
            }
            match &checkpoint.parent_checkpoint_id {
                None => {
                    if !genesis_runs.insert(checkpoint.run_id.as_str()) {
                        violations.push(ChainViolation::DuplicateGenesis {
                            checkpoint_id: id,
                            run_id: checkpoint.run_id.clone(),
                        });
                    }
                }
                Some(parent_id) => match by_id.get(parent_id.as_str()) {
                    None => violations.push(ChainViolation::MissingParent {
                        checkpoint_id: id,
                        parent_id: parent_id.clone(),
                    }),
                    Some(parent) if parent.step_index >= checkpoint.step_index => {
                        violations.push(ChainViolation::NonMonotonicStep {
                            checkpoint_id: id,
                            parent_id: parent_id.clone(),
                            parent_step: parent.step_index,
                            step: checkpoint.step_index,
                        })
                    }
                    Some(_) => {}
                },
            }
        }

        if violations.is_empty() {
            debug!(namespace = %namespace, checked = checkpoints.len(), "✅ 链校验通过");
        } else {
            for v in &violations {
                warn!(namespace = %namespace, "⚠️ 链完整性违规: {v}");
            }
        }
        Ok(ChainReport {
            checked: checkpoints.len(),
            violations,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::record::{CheckpointDraft, compute_checkpoint_hash};
    use crate::storage::InMemoryBackend;
    use chrono::{Duration, Utc};

    fn ns() -> Namespace {
        Namespace::new("acme", "support", "triage")
    }

    fn ledger() -> CheckpointLedger {
        CheckpointLedger::new(Arc::new(InMemoryBackend::new()))
    }

    /// 构建一条 run 内 `len` 个节点的正确链
    async fn build_chain(ledger: &CheckpointLedger, run: &str, len: usize) -> Vec<Checkpoint> {
        let base = Utc::now();
        let mut chain: Vec<Checkpoint> = Vec::new();
        for i in 0..len {
            let draft = match chain.last() {
                None => CheckpointDraft::genesis(ns(), run, "agent"),
                Some(parent) => CheckpointDraft::next_from(parent, "agent"),
            };
            let cp = draft.seal_at(base + Duration::seconds(i as i64)).unwrap();
            ledger.save(&cp).await.unwrap();
            chain.push(cp);
        }
        chain
    }

    /// 绕过账本校验直接写入存储（模拟损坏或并发写入）
    async fn force_write(ledger: &CheckpointLedger, cp: &Checkpoint) {
        ledger.storage().save_checkpoint(cp).await.unwrap();
    }

    #[tokio::test]
    async fn test_sequential_chain_is_valid() {
        let ledger = ledger();
        let chain = build_chain(&ledger, "run-1", 4).await;
        build_chain(&ledger, "run-2", 2).await;

        for cp in &chain {
            let stored = ledger.get_required(&ns(), &cp.checkpoint_id).await.unwrap();
            assert!(ledger.verify_checkpoint_integrity(&stored));
        }

        let report = ledger.verify_chain_integrity(&ns()).await.unwrap();
        assert_eq!(report.checked, 6);
        assert!(report.is_valid(), "{:?}", report.violations);
    }

    #[tokio::test]
    async fn test_save_rejects_forged_hash() {
        let ledger = ledger();
        let mut cp = CheckpointDraft::genesis(ns(), "run-1", "agent").seal().unwrap();
        cp.step_index = 3;
        let err = ledger.save(&cp).await.unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Integrity);
    }

    #[tokio::test]
    async fn test_save_is_write_once() {
        let ledger = ledger();
        let cp = CheckpointDraft::genesis(ns(), "run-1", "agent").seal().unwrap();
        ledger.save(&cp).await.unwrap();
        let err = ledger.save(&cp).await.unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Validation);
    }

    #[tokio::test]
    async fn test_rewritten_parent_link_is_reported() {
        let ledger = ledger();
        let chain = build_chain(&ledger, "run-1", 2).await;

        // 父链接指向不存在的 ID，并重新盖章让哈希本身保持一致
        let mut orphan = CheckpointDraft::next_from(&chain[1], "agent").seal().unwrap();
        orphan.parent_checkpoint_id = Some("does-not-exist".to_string());
        orphan.state_hash = compute_checkpoint_hash(&orphan).unwrap();
        ledger.save(&orphan).await.unwrap();

        let report = ledger.verify_chain_integrity(&ns()).await.unwrap();
        assert!(!report.is_valid());
        assert!(report.violations.iter().any(|v| matches!(
            v,
            ChainViolation::MissingParent { parent_id, .. } if parent_id == "does-not-exist"
        )));
    }

    #[tokio::test]
    async fn test_tampered_checkpoint_is_reported() {
        let ledger = ledger();
        let chain = build_chain(&ledger, "run-1", 1).await;

        let mut tampered = CheckpointDraft::next_from(&chain[0], "agent").seal().unwrap();
        tampered.writer_id = "mallory".to_string();
        force_write(&ledger, &tampered).await;

        let report = ledger.verify_chain_integrity(&ns()).await.unwrap();
        assert_eq!(
            report.violations,
            vec![ChainViolation::HashMismatch {
                checkpoint_id: tampered.checkpoint_id.clone()
            }]
        );
    }

    #[tokio::test]
    async fn test_duplicate_genesis_and_step() {
        let ledger = ledger();
        build_chain(&ledger, "run-1", 2).await;
        let second_genesis = CheckpointDraft::genesis(ns(), "run-1", "agent")
            .seal_at(Utc::now() + Duration::seconds(30))
            .unwrap();
        ledger.save(&second_genesis).await.unwrap();

        let report = ledger.verify_chain_integrity(&ns()).await.unwrap();
        assert!(report.violations.iter().any(|v| matches!(
            v,
            ChainViolation::DuplicateGenesis { checkpoint_id, .. } if checkpoint_id == &second_genesis.checkpoint_id
        )));
        assert!(report.violations.iter().any(|v| matches!(
            v,
            ChainViolation::DuplicateStep { step: 0, .. }
        )));
    }

    #[tokio::test]
    async fn test_non_monotonic_step() {
        let ledger = ledger();
        let chain = build_chain(&ledger, "run-1", 3).await;
        let mut backwards = CheckpointDraft::next_from(&chain[2], "agent");
        backwards.step_index = 1;
        let backwards = backwards.seal().unwrap();
        ledger.save(&backwards).await.unwrap();

        let report = ledger.verify_chain_integrity(&ns()).await.unwrap();
        assert!(report.violations.iter().any(|v| matches!(
            v,
            ChainViolation::NonMonotonicStep { parent_step: 2, step: 1, .. }
        )));
    }

    #[tokio::test]
    async fn test_latest_and_history() {
        let ledger = ledger();
        let chain = build_chain(&ledger, "run-1", 3).await;

        let latest = ledger.get_latest(&ns(), Some("run-1")).await.unwrap().unwrap();
        assert_eq!(latest.checkpoint_id, chain[2].checkpoint_id);

        let history = ledger.history(&ns(), &chain[2].checkpoint_id).await.unwrap();
        let steps: Vec<u64> = history.iter().map(|c| c.step_index).collect();
        assert_eq!(steps, vec![2, 1, 0]);

        let run = ledger.list_run(&ns(), "run-1").await.unwrap();
        assert_eq!(run.len(), 3);
        assert_eq!(run[0].step_index, 0);

        assert!(ledger.get(&ns(), "missing").await.unwrap().is_none());
        assert!(ledger.get_required(&ns(), "missing").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_history_fails_on_missing_parent() {
        let ledger = ledger();
        let chain = build_chain(&ledger, "run-1", 2).await;
        let mut orphan = CheckpointDraft::next_from(&chain[1], "agent").seal().unwrap();
        orphan.parent_checkpoint_id = Some("gone".to_string());
        orphan.state_hash = compute_checkpoint_hash(&orphan).unwrap();
        ledger.save(&orphan).await.unwrap();

        let err = ledger.history(&ns(), &orphan.checkpoint_id).await.unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Integrity);
        assert!(err.to_string().contains("gone"));
    }

    #[tokio::test]
    async fn test_reads_reject_separator_in_namespace() {
        let ledger = ledger();
        let bob = ns().with_user("bob");
        let cp = CheckpointDraft::genesis(bob.clone(), "run-1", "agent").seal().unwrap();
        ledger.save(&cp).await.unwrap();

        let forged = Namespace::new("acme:support", "triage", "bob");
        assert_eq!(forged.key(), bob.key());
        assert!(ledger.get(&forged, &cp.checkpoint_id).await.is_err());
        assert!(ledger.get_latest(&forged, None).await.is_err());
        assert!(ledger.list_run(&forged, "run-1").await.is_err());
        assert!(ledger.verify_chain_integrity(&forged).await.is_err());
        assert!(ledger.get(&bob, &cp.checkpoint_id).await.unwrap().is_some());
    }
}
