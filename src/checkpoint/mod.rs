//! Checkpoint 账本
//!
//! | 类型 | 作用 |
//! |------|------|
//! | [`Checkpoint`] / [`CheckpointDraft`] | 不可变的状态快照及其封存流程 |
//! | [`compute_checkpoint_hash`] | 规范化内容哈希（纯函数） |
//! | [`CheckpointLedger`] | 追加、查询与链完整性校验 |
//!
//! ## 快速上手
//!
//! ```rust,no_run
//! use echo_checkpoint::checkpoint::{CheckpointDraft, CheckpointLedger};
//! use echo_checkpoint::checkpoint::state::{Task, TaskStatus};
//! use echo_checkpoint::namespace::Namespace;
//! use echo_checkpoint::storage::InMemoryBackend;
//! use std::sync::Arc;
//!
//! # async fn example() -> echo_checkpoint::error::Result<()> {
//! let ledger = CheckpointLedger::new(Arc::new(InMemoryBackend::new()));
//! let ns = Namespace::new("acme", "support", "triage");
//!
//! let genesis = CheckpointDraft::genesis(ns.clone(), "run-42", "triage-agent").seal()?;
//! ledger.save(&genesis).await?;
//!
//! let step1 = CheckpointDraft::next_from(&genesis, "triage-agent")
//!     .unresolved_tasks(vec![Task::new("t1", "回复客户").with_status(TaskStatus::Blocked)])
//!     .seal()?;
//! ledger.save(&step1).await?;
//!
//! let report = ledger.verify_chain_integrity(&ns).await?;
//! assert!(report.is_valid());
//! # Ok(())
//! # }
//! ```

mod ledger;
mod record;
pub mod state;

pub use ledger::{ChainReport, ChainViolation, CheckpointLedger};
pub use record::{
    CHECKPOINT_SCHEMA_VERSION, Checkpoint, CheckpointDraft, compute_checkpoint_hash,
    ensure_checkpoint_integrity, verify_checkpoint_integrity,
};
pub use state::{Action, ActionStatus, Goal, GoalStatus, Task, TaskStatus};
