pub mod checkpoint;
pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod memory;
pub mod namespace;
pub mod restore;
pub mod storage;
pub mod telemetry;
pub mod testing;

pub mod prelude {
    pub use crate::checkpoint::{Checkpoint, CheckpointDraft, CheckpointLedger};
    pub use crate::config::EngineConfig;
    pub use crate::engine::Engine;
    pub use crate::error::{CheckpointError, Result};
    pub use crate::memory::{KnowledgeLane, MemoryQuery, MemorySource, SourceType, StoreMemoryInput};
    pub use crate::namespace::Namespace;
    pub use crate::restore::{RestoreRequest, RestoreService, ResumePack};
}
