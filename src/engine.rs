//! 按配置装配三大组件
//!
//! ```rust,no_run
//! use echo_checkpoint::config::EngineConfig;
//! use echo_checkpoint::engine::Engine;
//!
//! # fn example() -> echo_checkpoint::error::Result<()> {
//! let engine = Engine::from_config(EngineConfig::from_env()?)?;
//! let _ledger = engine.ledger();
//! # Ok(())
//! # }
//! ```

use crate::checkpoint::CheckpointLedger;
use crate::clock::{Clock, SystemClock};
use crate::config::EngineConfig;
use crate::error::Result;
use crate::memory::{ContentValidator, KnowledgeLane, TextSimilarity};
use crate::restore::RestoreService;
use crate::storage::{StorageBackend, open_backend};
use std::sync::Arc;
use tracing::info;

/// 共享同一存储后端的 Ledger、Knowledge Lane 与恢复服务
pub struct Engine {
    config: EngineConfig,
    storage: Arc<dyn StorageBackend>,
    ledger: Arc<CheckpointLedger>,
    lane: Arc<KnowledgeLane>,
    restore: RestoreService,
}

impl Engine {
    /// 校验配置、打开存储后端并装配组件（系统时钟、内置相似度与校验器）
    pub fn from_config(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let storage = open_backend(&config.storage)?;
        Ok(Self::assemble(config, storage, EngineParts::default()))
    }

    /// 使用现成的存储后端，并可替换时钟、相似度与校验器
    pub fn with_storage(
        config: EngineConfig,
        storage: Arc<dyn StorageBackend>,
        parts: EngineParts,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self::assemble(config, storage, parts))
    }

    fn assemble(config: EngineConfig, storage: Arc<dyn StorageBackend>, parts: EngineParts) -> Self {
        let clock = parts.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let ledger = Arc::new(CheckpointLedger::new(storage.clone()));

        let mut lane = KnowledgeLane::new(storage.clone())
            .with_config(config.ranking.clone())
            .with_clock(clock.clone());
        if let Some(similarity) = parts.similarity {
            lane = lane.with_similarity(similarity);
        }
        if let Some(validator) = parts.validator {
            lane = lane.with_validator(validator);
        }
        let lane = Arc::new(lane);

        let restore = RestoreService::new(ledger.clone(), lane.clone())
            .with_config(config.restore.clone())
            .with_clock(clock);

        info!(
            backend = ?config.storage.backend,
            integrity_policy = ?config.restore.integrity_policy,
            max_memories = config.restore.max_memories,
            "⚙️ Engine 初始化完成"
        );
        Self {
            config,
            storage,
            ledger,
            lane,
            restore,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn storage(&self) -> &Arc<dyn StorageBackend> {
        &self.storage
    }

    pub fn ledger(&self) -> &Arc<CheckpointLedger> {
        &self.ledger
    }

    pub fn lane(&self) -> &Arc<KnowledgeLane> {
        &self.lane
    }

    pub fn restore(&self) -> &RestoreService {
        &self.restore
    }
}

/// 可替换的协作者；未设置的使用默认实现
#[derive(Default)]
pub struct EngineParts {
    pub clock: Option<Arc<dyn Clock>>,
    pub similarity: Option<Arc<dyn TextSimilarity>>,
    pub validator: Option<Arc<dyn ContentValidator>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::CheckpointDraft;
    use crate::config::{BackendKind, StorageConfig};
    use crate::error::ErrorKind;
    use crate::namespace::Namespace;
    use crate::restore::RestoreRequest;
    use crate::storage::InMemoryBackend;
    use crate::testing::ManualClock;

    #[tokio::test]
    async fn test_components_share_storage() {
        let engine = Engine::from_config(EngineConfig::default()).unwrap();
        let ns = Namespace::new("acme", "support", "triage");
        let cp = CheckpointDraft::genesis(ns.clone(), "run-1", "agent").seal().unwrap();
        engine.ledger().save(&cp).await.unwrap();

        let pack = engine
            .restore()
            .restore(RestoreRequest::new(ns.clone()).run("run-1"))
            .await
            .unwrap();
        assert_eq!(pack.checkpoint.checkpoint_id, cp.checkpoint_id);
        let audit = engine.storage().get_audit_log(&ns, None).await.unwrap();
        assert_eq!(audit.len(), 1);
    }

    #[test]
    fn test_file_backend_requires_path() {
        let config = EngineConfig {
            storage: StorageConfig {
                backend: BackendKind::File,
                path: None,
            },
            ..EngineConfig::default()
        };
        let err = Engine::from_config(config).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::Config);
    }

    #[tokio::test]
    async fn test_injected_clock_reaches_lane() {
        let clock = Arc::new(ManualClock::fixed());
        let engine = Engine::with_storage(
            EngineConfig::default(),
            Arc::new(InMemoryBackend::new()),
            EngineParts {
                clock: Some(clock.clone()),
                ..EngineParts::default()
            },
        )
        .unwrap();
        assert_eq!(engine.lane().now(), clock.now());
    }
}
