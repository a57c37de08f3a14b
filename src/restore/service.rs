use crate::checkpoint::{Checkpoint, CheckpointLedger, TaskStatus, ensure_checkpoint_integrity};
use crate::clock::{Clock, SystemClock};
use crate::config::{IntegrityPolicy, RestoreConfig};
use crate::error::{CheckpointError, IntegrityError, NotFoundError, Result};
use crate::memory::{
    KnowledgeLane, MemoryObject, MemoryQuery, MemoryResult, ScoreComponents, assess_staleness,
    scoring::calculate_recency_score_with,
};
use crate::namespace::Namespace;
use crate::restore::types::{
    InclusionSource, MemoryCitation, MemoryInclusion, RestoreExplanation, RestoreRationale,
    RestoreRequest, ResumePack, SelectionRule,
};
use crate::storage::AuditEntry;
use chrono::{DateTime, Utc};
use futures::future::try_join_all;
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

const SYSTEM_ACTOR: &str = "system";
const REFERENCED_SCORE: f64 = 1.0;

/// 组合 Ledger 与 Knowledge Lane，回答"agent 现在应该知道什么"
pub struct RestoreService {
    ledger: Arc<CheckpointLedger>,
    lane: Arc<KnowledgeLane>,
    config: RestoreConfig,
    clock: Arc<dyn Clock>,
}

impl RestoreService {
    pub fn new(ledger: Arc<CheckpointLedger>, lane: Arc<KnowledgeLane>) -> Self {
        Self {
            ledger,
            lane,
            config: RestoreConfig::default(),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_config(mut self, config: RestoreConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &RestoreConfig {
        &self.config
    }

    /// 单次确定性流程：选择 → 校验 → 引用记忆 → 额外检索 → 警告 → 审计
    pub async fn restore(&self, request: RestoreRequest) -> Result<ResumePack> {
        let ns = &request.namespace;
        ns.validate()?;
        let now = self.clock.now();
        let actor = request.actor_id.as_deref().unwrap_or(SYSTEM_ACTOR);
        let mut warnings = Vec::new();

        // ── 1-3. 选择并校验 checkpoint ──
        let (selected, mut rule, mut reason) = self.select(&request).await?;
        let checkpoint = match ensure_checkpoint_integrity(&selected) {
            Ok(()) => selected,
            Err(err) => match self.config.integrity_policy {
                IntegrityPolicy::Fail => {
                    warn!(
                        namespace = %ns,
                        checkpoint_id = %selected.checkpoint_id,
                        "⚠️ Checkpoint 完整性校验失败，恢复中止"
                    );
                    return Err(err);
                }
                IntegrityPolicy::FallbackToParent => {
                    let ancestor = self.nearest_valid_ancestor(ns, &selected, err).await?;
                    warnings.push(format!(
                        "Checkpoint {} failed integrity verification; fell back to ancestor {} (step {})",
                        selected.checkpoint_id, ancestor.checkpoint_id, ancestor.step_index
                    ));
                    reason = format!(
                        "{reason}; replaced by verified ancestor {} at step {}",
                        ancestor.checkpoint_id, ancestor.step_index
                    );
                    rule = SelectionRule::FallbackToParent;
                    ancestor
                }
            },
        };
        let checkpoint_id = checkpoint.checkpoint_id.as_str();

        let max_memories = request.max_memories.unwrap_or(self.config.max_memories);
        let mut memories: Vec<MemoryResult> = Vec::new();
        let mut inclusions = Vec::new();
        let mut seen = HashSet::new();

        // ── 4. 直接引用的记忆：并发读取，按引用顺序处理 ──
        let referenced: Vec<&String> = checkpoint
            .memory_refs
            .iter()
            .filter(|id| seen.insert((*id).clone()))
            .collect();
        let fetched =
            try_join_all(referenced.iter().map(|id| self.lane.get_memory(ns, id))).await?;
        for (memory_id, memory) in referenced.into_iter().zip(fetched) {
            let Some(memory) = memory else {
                warn!(namespace = %ns, memory_id = %memory_id, "⚠️ 引用的记忆不存在，跳过");
                warnings.push(format!("Referenced memory {memory_id} not found; skipped"));
                continue;
            };
            if memory.deleted {
                warnings.push(format!("Referenced memory {memory_id} was deleted; skipped"));
                continue;
            }
            if memory.is_expired(now) {
                warnings.push(format!("Referenced memory {memory_id} has expired; skipped"));
                continue;
            }
            let accessed = self
                .lane
                .record_access(ns, memory_id, Some(checkpoint_id), Some(actor))
                .await?;
            let mut result = self.referenced_result(memory, now);
            result.memory = accessed;
            inclusions.push(MemoryInclusion {
                memory_id: memory_id.clone(),
                reason: format!(
                    "Directly referenced by checkpoint {} (step {})",
                    checkpoint.short_id(),
                    checkpoint.step_index
                ),
                score: REFERENCED_SCORE,
                source: InclusionSource::Referenced,
            });
            memories.push(result);
        }

        // ── 5. 额外检索，与引用去重 ──
        let remaining = max_memories.saturating_sub(memories.len());
        if request.wants_query() && remaining > 0 {
            let mut query = MemoryQuery::new(ns.clone())
                .tags(request.memory_tags.clone())
                .limit(remaining + seen.len());
            if let Some(text) = &request.memory_query {
                query = query.query(text.clone());
            }
            let fresh: Vec<MemoryResult> = self
                .lane
                .search_memories(&query)
                .await?
                .into_iter()
                .filter(|h| !seen.contains(&h.memory.memory_id))
                .take(remaining)
                .collect();
            for mut hit in fresh {
                let memory_id = hit.memory.memory_id.clone();
                seen.insert(memory_id.clone());
                hit.memory = self
                    .lane
                    .record_access(ns, &memory_id, Some(checkpoint_id), Some(actor))
                    .await?;
                inclusions.push(MemoryInclusion {
                    memory_id,
                    reason: query_reason(&request, hit.score),
                    score: hit.score,
                    source: InclusionSource::Queried,
                });
                memories.push(hit);
            }
        }

        // ── 6. 警告 ──
        if !checkpoint.pending_actions.is_empty() {
            warnings.push(format!(
                "{} pending action(s) may need review before execution",
                checkpoint.pending_actions.len()
            ));
        }
        for task in checkpoint
            .unresolved_tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Blocked)
        {
            warnings.push(format!("Task {} is blocked: {}", task.id, task.description));
        }
        for result in memories.iter().filter(|r| r.is_stale) {
            warnings.push(format!(
                "Memory {} is stale: {}",
                result.memory.memory_id,
                result
                    .stale_reason
                    .as_deref()
                    .unwrap_or("not accessed recently")
            ));
        }

        let mut evidence = vec![format!("checkpoint:{checkpoint_id}")];
        evidence.extend(memories.iter().map(|r| format!("memory:{}", r.memory.memory_id)));

        // ── 7. 审计 ──
        let audit = AuditEntry::new(ns, "restore", checkpoint_id, actor, now).with_detail(json!({
            "run_id": checkpoint.run_id,
            "step_index": checkpoint.step_index,
            "selection_rule": rule,
            "memory_ids": memories.iter().map(|r| r.memory.memory_id.as_str()).collect::<Vec<_>>(),
            "warnings": warnings.len(),
        }));
        self.ledger.storage().log_audit(&audit).await?;

        info!(
            namespace = %ns,
            checkpoint_id = %checkpoint_id,
            rule = ?rule,
            memories = memories.len(),
            warnings = warnings.len(),
            "♻️ 恢复完成"
        );

        Ok(ResumePack {
            unresolved_tasks: checkpoint.unresolved_tasks.clone(),
            memories,
            rationale: RestoreRationale {
                selection_rule: rule,
                selection_reason: reason,
                inclusions,
                warnings,
                evidence,
            },
            restored_at: now,
            checkpoint,
        })
    }

    /// 回放一个 run 的全部 checkpoint，列出每一次记忆引用
    pub async fn explain_restore(&self, namespace: &Namespace, run_id: &str) -> Result<RestoreExplanation> {
        namespace.validate()?;
        let checkpoints = self.ledger.list_run(namespace, run_id).await?;
        if checkpoints.is_empty() {
            return Err(NotFoundError::NoCheckpoint(format!("run '{run_id}' of {namespace}")).into());
        }

        let mut citations = Vec::new();
        let mut first_seen: HashSet<&str> = HashSet::new();
        for checkpoint in &checkpoints {
            for memory_id in &checkpoint.memory_refs {
                let memory = self.lane.get_memory(namespace, memory_id).await?;
                let status = match &memory {
                    None => "memory no longer exists".to_string(),
                    Some(m) if m.deleted => format!("deleted: {}", preview(&m.content)),
                    Some(m) => preview(&m.content),
                };
                let verb = if first_seen.insert(memory_id.as_str()) {
                    "First cited"
                } else {
                    "Cited again"
                };
                citations.push(MemoryCitation {
                    memory_id: memory_id.clone(),
                    checkpoint_id: checkpoint.checkpoint_id.clone(),
                    step_index: checkpoint.step_index,
                    reason: format!("{verb} at step {} ({status})", checkpoint.step_index),
                });
            }
        }
        debug!(
            namespace = %namespace,
            run_id = %run_id,
            checkpoints = checkpoints.len(),
            citations = citations.len(),
            "🧭 回放 run"
        );
        Ok(RestoreExplanation {
            run_id: run_id.to_string(),
            checkpoints,
            citations,
        })
    }

    async fn select(&self, request: &RestoreRequest) -> Result<(Checkpoint, SelectionRule, String)> {
        let ns = &request.namespace;
        if let Some(id) = &request.checkpoint_id {
            let checkpoint = self.ledger.get_required(ns, id).await?;
            let reason = format!(
                "Explicit checkpoint {id} requested (run {}, step {})",
                checkpoint.run_id, checkpoint.step_index
            );
            return Ok((checkpoint, SelectionRule::Explicit, reason));
        }
        if let Some(run_id) = &request.run_id {
            let checkpoint = self
                .ledger
                .get_latest(ns, Some(run_id))
                .await?
                .ok_or_else(|| NotFoundError::NoCheckpoint(format!("run '{run_id}' of {ns}")))?;
            let reason = format!(
                "Latest checkpoint from run {run_id} (step {})",
                checkpoint.step_index
            );
            return Ok((checkpoint, SelectionRule::LatestInRun, reason));
        }
        let checkpoint = self
            .ledger
            .get_latest(ns, None)
            .await?
            .ok_or_else(|| NotFoundError::NoCheckpoint(ns.to_string()))?;
        let reason = format!(
            "Latest checkpoint in namespace {ns} (run {}, step {})",
            checkpoint.run_id, checkpoint.step_index
        );
        Ok((checkpoint, SelectionRule::LatestInNamespace, reason))
    }

    /// 沿父链找最近一个哈希校验通过的祖先；链断开时返回 integrity 错误
    async fn nearest_valid_ancestor(
        &self,
        namespace: &Namespace,
        broken: &Checkpoint,
        original: CheckpointError,
    ) -> Result<Checkpoint> {
        let mut current = broken.clone();
        let mut visited = HashSet::new();
        while visited.insert(current.checkpoint_id.clone()) {
            let Some(parent_id) = current.parent_checkpoint_id.clone() else {
                break;
            };
            let parent = self.ledger.get(namespace, &parent_id).await?.ok_or_else(|| {
                IntegrityError::MissingParent {
                    checkpoint_id: current.checkpoint_id.clone(),
                    parent_id: parent_id.clone(),
                }
            })?;
            if self.ledger.verify_checkpoint_integrity(&parent) {
                warn!(
                    namespace = %namespace,
                    broken = %broken.checkpoint_id,
                    ancestor = %parent.checkpoint_id,
                    "⚠️ 回退到校验通过的祖先 Checkpoint"
                );
                return Ok(parent);
            }
            current = parent;
        }
        Err(original)
    }

    /// 引用记忆的结果：分数固定为 1.0，陈旧度按本次访问之前的状态计算
    fn referenced_result(&self, memory: MemoryObject, now: DateTime<Utc>) -> MemoryResult {
        let ranking = self.lane.config();
        let staleness = assess_staleness(
            memory.created_at,
            memory.last_accessed_at,
            now,
            ranking.stale_after_days,
        );
        MemoryResult {
            score: REFERENCED_SCORE,
            score_components: ScoreComponents {
                task_criticality: memory.task_criticality,
                semantic_similarity: 1.0,
                importance: memory.importance,
                recency: calculate_recency_score_with(
                    memory.created_at,
                    memory.last_accessed_at,
                    now,
                    ranking,
                ),
            },
            is_stale: staleness.is_stale,
            age_days: staleness.age_days,
            stale_reason: staleness.stale_reason,
            memory,
        }
    }
}

fn query_reason(request: &RestoreRequest, score: f64) -> String {
    match (&request.memory_query, request.memory_tags.is_empty()) {
        (Some(q), true) => format!("Matched query '{q}' (score {score:.3})"),
        (Some(q), false) => format!(
            "Matched query '{q}' with tags [{}] (score {score:.3})",
            request.memory_tags.join(", ")
        ),
        (None, _) => format!(
            "Matched tags [{}] (score {score:.3})",
            request.memory_tags.join(", ")
        ),
    }
}

fn preview(content: &str) -> String {
    const MAX_CHARS: usize = 60;
    if content.chars().count() <= MAX_CHARS {
        content.to_string()
    } else {
        let cut: String = content.chars().take(MAX_CHARS).collect();
        format!("{cut}...")
    }
}
