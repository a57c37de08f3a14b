//! resume_demo - 断点续跑演示
//!
//! ## 演示内容
//!
//! 1. **写入记忆**：客服 agent 在一次 run 中记下两条事实，其中一条带 `deployment` 标签
//! 2. **逐步保存 checkpoint**：step 0 → step 1，step 1 引用了部署审批这条记忆，并留下一个被阻塞的任务
//! 3. **校验链完整性**：整条链哈希一致、父链连续
//! 4. **恢复**：按 run 选出最新 checkpoint，组装引用记忆与检索结果，打印理由与警告
//! 5. **回放**：`explain_restore` 列出每一步引用过的记忆
//!
//! 运行：`cargo run --example resume_demo`（`RUST_LOG=debug` 查看更多日志）

use echo_checkpoint::checkpoint::{Action, CheckpointDraft, Goal, Task, TaskStatus};
use echo_checkpoint::config::EngineConfig;
use echo_checkpoint::engine::Engine;
use echo_checkpoint::memory::{MemorySource, SourceType, StoreMemoryInput};
use echo_checkpoint::namespace::Namespace;
use echo_checkpoint::restore::RestoreRequest;
use echo_checkpoint::telemetry::init_tracing;
use serde_json::json;

const RUN_ID: &str = "run-2025-01-demo";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing("info");

    let engine = Engine::from_config(EngineConfig::from_env()?)?;
    let ns = Namespace::parse("acme:support:triage")?;

    // ── 1. 写入记忆 ──
    let approval = engine
        .lane()
        .store_memory(
            StoreMemoryInput::new(
                ns.clone(),
                "生产环境部署需要第二位审批人",
                MemorySource::new(SourceType::Document, "runbook/deploy.md"),
            )
            .importance(0.7)
            .task_criticality(0.9)
            .tags(["deployment"]),
        )
        .await?;
    engine
        .lane()
        .store_memory(
            StoreMemoryInput::new(
                ns.clone(),
                "账单导出每天 02:00 运行",
                MemorySource::new(SourceType::ToolOutput, "scheduler"),
            )
            .importance(0.9)
            .task_criticality(0.3)
            .tags(["billing"]),
        )
        .await?;

    // ── 2. 逐步保存 checkpoint ──
    let genesis = CheckpointDraft::genesis(ns.clone(), RUN_ID, "triage-agent")
        .goals(vec![Goal::new("g1", "完成工单 #4411 的热修复发布")])
        .tool_state("ticket", json!({ "id": 4411, "priority": "high" }))
        .seal()?;
    engine.ledger().save(&genesis).await?;

    let step1 = CheckpointDraft::next_from(&genesis, "triage-agent")
        .memory_refs(vec![approval.memory_id.clone()])
        .pending_actions(vec![
            Action::new("a1", "deploy", "发布 hotfix-4411 到生产").with_params(json!({ "tag": "hotfix-4411" })),
        ])
        .unresolved_tasks(vec![
            Task::new("t1", "等待第二位审批人")
                .with_status(TaskStatus::Blocked)
                .with_goal("g1"),
        ])
        .policy_flag("require_approval", json!(true))
        .seal()?;
    engine.ledger().save(&step1).await?;

    // ── 3. 校验链完整性 ──
    let report = engine.ledger().verify_chain_integrity(&ns).await?;
    println!("链校验: 检查 {} 个 checkpoint，违规 {} 条", report.checked, report.violations.len());

    // ── 4. 恢复 ──
    let pack = engine
        .restore()
        .restore(
            RestoreRequest::new(ns.clone())
                .run(RUN_ID)
                .memory_query("部署 审批")
                .actor("oncall-bob"),
        )
        .await?;

    println!();
    println!("选择: {}", pack.rationale.selection_reason);
    for inclusion in &pack.rationale.inclusions {
        println!(
            "  💡 {} [{:?}] score={:.3} - {}",
            inclusion.memory_id, inclusion.source, inclusion.score, inclusion.reason
        );
    }
    for warning in &pack.rationale.warnings {
        println!("  ⚠️ {warning}");
    }
    println!("证据: {}", pack.rationale.evidence.join(", "));

    // ── 5. 回放 ──
    let explanation = engine.restore().explain_restore(&ns, RUN_ID).await?;
    println!();
    println!("回放 {}：{} 个 checkpoint", explanation.run_id, explanation.checkpoints.len());
    for citation in &explanation.citations {
        println!("  step {} → {}: {}", citation.step_index, citation.memory_id, citation.reason);
    }

    Ok(())
}
