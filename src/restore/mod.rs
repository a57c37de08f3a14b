//! 恢复服务
//!
//! 在一次确定性流程中选出 checkpoint、校验其哈希、组装引用与检索到的记忆，
//! 并给出每条纳入决定的理由。
//!
//! ## 快速上手
//!
//! ```rust,no_run
//! use echo_checkpoint::checkpoint::CheckpointLedger;
//! use echo_checkpoint::memory::KnowledgeLane;
//! use echo_checkpoint::namespace::Namespace;
//! use echo_checkpoint::restore::{RestoreRequest, RestoreService};
//! use echo_checkpoint::storage::{InMemoryBackend, StorageBackend};
//! use std::sync::Arc;
//!
//! # async fn example() -> echo_checkpoint::error::Result<()> {
//! let storage: Arc<dyn StorageBackend> = Arc::new(InMemoryBackend::new());
//! let ledger = Arc::new(CheckpointLedger::new(storage.clone()));
//! let lane = Arc::new(KnowledgeLane::new(storage));
//! let service = RestoreService::new(ledger, lane);
//!
//! let ns = Namespace::new("acme", "support", "triage");
//! let pack = service
//!     .restore(RestoreRequest::new(ns).run("run-42").memory_query("客户 偏好"))
//!     .await?;
//! println!("{}", pack.rationale.selection_reason);
//! for warning in &pack.rationale.warnings {
//!     println!("⚠️ {warning}");
//! }
//! # Ok(())
//! # }
//! ```

mod service;
mod types;

pub use service::RestoreService;
pub use types::{
    InclusionSource, MemoryCitation, MemoryInclusion, RestoreExplanation, RestoreRationale,
    RestoreRequest, ResumePack, SelectionRule,
};
