//! 测试基础设施
//!
//! 在不依赖真实时间、嵌入服务或外部存储的情况下测试 checkpoint 账本、Knowledge Lane 与恢复服务。
//!
//! | 类型 | 用途 |
//! |------|------|
//! | [`ManualClock`] | 手动推进的时钟，复现 TTL / 陈旧度 / 年龄过滤 |
//! | [`MockSimilarity`] | 按内容片段返回预设相似度，记录调用 |
//! | [`MockValidator`] | 命中模式时建议隔离，用于测试隔离区流程 |
//! | [`FailingBackend`] | 所有存储操作都失败，用于测试错误传播 |
//!
//! # 设计原则
//!
//! - **零 I/O**：所有 Mock 都完全在内存中运行
//! - **可观测**：通过 `call_count()` / `calls()` 检查调用情况
//! - **线程安全**：内部使用 `Arc<Mutex<_>>`，可在多任务测试中共享
//!
//! # 使用示例
//!
//! ```rust
//! use echo_checkpoint::clock::Clock;
//! use echo_checkpoint::memory::{KnowledgeLane, MemorySource, SourceType, StoreMemoryInput};
//! use echo_checkpoint::namespace::Namespace;
//! use echo_checkpoint::storage::InMemoryBackend;
//! use echo_checkpoint::testing::{ManualClock, MockSimilarity};
//! use std::sync::Arc;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let clock = Arc::new(ManualClock::fixed());
//! let lane = KnowledgeLane::new(Arc::new(InMemoryBackend::new()))
//!     .with_clock(clock.clone())
//!     .with_similarity(Arc::new(MockSimilarity::new(0.5)));
//!
//! let ns = Namespace::new("acme", "support", "triage");
//! let m = lane
//!     .store_memory(StoreMemoryInput::new(ns, "x", MemorySource::new(SourceType::User, "u1")))
//!     .await
//!     .unwrap();
//! assert_eq!(m.created_at, clock.now());
//! # }
//! ```

mod failing_backend;
mod mock_clock;
mod mock_similarity;
mod mock_validator;

pub use failing_backend::FailingBackend;
pub use mock_clock::ManualClock;
pub use mock_similarity::MockSimilarity;
pub use mock_validator::MockValidator;
