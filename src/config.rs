//! 引擎配置
//!
//! 支持两种来源：
//! - YAML 文件：[`EngineConfig::load`]
//! - 环境变量（自动加载 `.env`）：[`EngineConfig::from_env`]
//!
//! ```text
//! ECHO_CHECKPOINT_STORAGE_BACKEND=file
//! ECHO_CHECKPOINT_STORAGE_PATH=~/.echo-agent/checkpoint-store.json
//! ECHO_CHECKPOINT_RESTORE_MAX_MEMORIES=20
//! ECHO_CHECKPOINT_INTEGRITY_POLICY=fail
//! ECHO_CHECKPOINT_STALE_AFTER_DAYS=90
//! ```

use crate::error::{ConfigError, Result};
use dotenv::dotenv;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

const ENV_PREFIX: &str = "ECHO_CHECKPOINT_";
/// 访问加成上限：默认半衰期下，30 天前创建、刚被访问的记忆仍低于 0.6
const MAX_ACCESS_BOOST: f64 = 0.5;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub ranking: RankingConfig,
    pub restore: RestoreConfig,
    pub storage: StorageConfig,
}

// ── Ranking ──────────────────────────────────────────────────────────────────

/// 综合评分权重，引擎不会重新归一化
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RankingWeights {
    pub task_criticality: f64,
    pub semantic_similarity: f64,
    pub importance: f64,
    pub recency_decay: f64,
}

impl Default for RankingWeights {
    fn default() -> Self {
        Self {
            task_criticality: 0.45,
            semantic_similarity: 0.25,
            importance: 0.20,
            recency_decay: 0.10,
        }
    }
}

impl RankingWeights {
    pub fn new(
        task_criticality: f64,
        semantic_similarity: f64,
        importance: f64,
        recency_decay: f64,
    ) -> Self {
        Self {
            task_criticality,
            semantic_similarity,
            importance,
            recency_decay,
        }
    }

    /// 权重必须是非负有限数
    pub fn validate(&self) -> Result<()> {
        let fields = [
            ("task_criticality", self.task_criticality),
            ("semantic_similarity", self.semantic_similarity),
            ("importance", self.importance),
            ("recency_decay", self.recency_decay),
        ];
        for (name, value) in fields {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::InvalidValue {
                    field: format!("ranking.weights.{name}"),
                    message: format!("must be a non-negative finite number, got {value}"),
                }
                .into());
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RankingConfig {
    pub weights: RankingWeights,
    /// 近因衰减半衰期（天）
    pub recency_half_life_days: f64,
    /// 最近访问带来的最大上调幅度
    pub access_boost_max: f64,
    /// 超过该天数未触达即视为陈旧
    pub stale_after_days: f64,
    /// 检索未指定 limit 时的默认条数
    pub default_limit: usize,
    /// 单次检索条数上限
    pub max_limit: usize,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            weights: RankingWeights::default(),
            recency_half_life_days: 7.0,
            access_boost_max: 0.1,
            stale_after_days: 90.0,
            default_limit: 10,
            max_limit: 100,
        }
    }
}

// ── Restore ──────────────────────────────────────────────────────────────────

/// 选中的 checkpoint 完整性校验失败时的处理方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntegrityPolicy {
    /// 直接失败
    #[default]
    Fail,
    /// 沿父链回退到最近一个校验通过的祖先
    FallbackToParent,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RestoreConfig {
    pub max_memories: usize,
    pub integrity_policy: IntegrityPolicy,
}

impl Default for RestoreConfig {
    fn default() -> Self {
        Self {
            max_memories: 20,
            integrity_policy: IntegrityPolicy::Fail,
        }
    }
}

// ── Storage ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    #[default]
    Memory,
    File,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: BackendKind,
    /// file 后端的 JSON 文件路径，支持 `~/`
    pub path: Option<PathBuf>,
}

// ── Loading ──────────────────────────────────────────────────────────────────

impl EngineConfig {
    pub fn load(path: &str) -> Result<Self> {
        let file =
            std::fs::File::open(path).map_err(|_| ConfigError::FileNotFound(path.to_string()))?;
        let config: EngineConfig = serde_yaml::from_reader(file)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_str(raw: &str) -> Result<Self> {
        let config: EngineConfig = serde_yaml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// 默认配置叠加 `ECHO_CHECKPOINT_*` 环境变量
    pub fn from_env() -> Result<Self> {
        dotenv().ok();
        Self::from_vars(std::env::vars())
    }

    /// 从给定的键值对应用覆盖，便于测试时不触碰进程环境
    pub fn from_vars(vars: impl IntoIterator<Item = (String, String)>) -> Result<Self> {
        let mut config = EngineConfig::default();
        for (key, value) in vars {
            let Some(suffix) = key.strip_prefix(ENV_PREFIX) else {
                continue;
            };
            match suffix {
                "STORAGE_BACKEND" => {
                    config.storage.backend = match value.to_lowercase().as_str() {
                        "memory" => BackendKind::Memory,
                        "file" => BackendKind::File,
                        _ => return Err(invalid(&key, &value, "expected 'memory' or 'file'")),
                    }
                }
                "STORAGE_PATH" => config.storage.path = Some(PathBuf::from(value)),
                "RESTORE_MAX_MEMORIES" => {
                    config.restore.max_memories = value
                        .parse()
                        .map_err(|_| invalid(&key, &value, "expected a non-negative integer"))?;
                }
                "INTEGRITY_POLICY" => {
                    config.restore.integrity_policy = match value.to_lowercase().as_str() {
                        "fail" => IntegrityPolicy::Fail,
                        "fallback_to_parent" => IntegrityPolicy::FallbackToParent,
                        _ => {
                            return Err(invalid(
                                &key,
                                &value,
                                "expected 'fail' or 'fallback_to_parent'",
                            ));
                        }
                    }
                }
                "STALE_AFTER_DAYS" => {
                    config.ranking.stale_after_days = value
                        .parse()
                        .map_err(|_| invalid(&key, &value, "expected a number of days"))?;
                }
                _ => {}
            }
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.ranking.weights.validate()?;
        if !(self.ranking.recency_half_life_days.is_finite()
            && self.ranking.recency_half_life_days > 0.0)
        {
            return Err(ConfigError::InvalidValue {
                field: "ranking.recency_half_life_days".to_string(),
                message: "must be positive".to_string(),
            }
            .into());
        }
        if !(self.ranking.access_boost_max.is_finite()
            && (0.0..=MAX_ACCESS_BOOST).contains(&self.ranking.access_boost_max))
        {
            return Err(ConfigError::InvalidValue {
                field: "ranking.access_boost_max".to_string(),
                message: format!("must be within [0, {MAX_ACCESS_BOOST}]"),
            }
            .into());
        }
        if !(self.ranking.stale_after_days.is_finite() && self.ranking.stale_after_days > 0.0) {
            return Err(ConfigError::InvalidValue {
                field: "ranking.stale_after_days".to_string(),
                message: "must be a positive number of days".to_string(),
            }
            .into());
        }
        if self.ranking.max_limit == 0 {
            return Err(ConfigError::InvalidValue {
                field: "ranking.max_limit".to_string(),
                message: "must be at least 1".to_string(),
            }
            .into());
        }
        if self.storage.backend == BackendKind::File && self.storage.path.is_none() {
            return Err(ConfigError::InvalidValue {
                field: "storage.path".to_string(),
                message: "required for the file backend".to_string(),
            }
            .into());
        }
        Ok(())
    }
}

fn invalid(key: &str, value: &str, message: &str) -> crate::error::CheckpointError {
    ConfigError::InvalidValue {
        field: key.to_string(),
        message: format!("{message}, got '{value}'"),
    }
    .into()
}
