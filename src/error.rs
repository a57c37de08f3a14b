use thiserror::Error;

/// echo-checkpoint 的统一错误类型
#[derive(Debug, Error)]
pub enum CheckpointError {
    /// 实体未找到
    #[error("Not Found: {0}")]
    NotFound(#[from] NotFoundError),
    /// 输入校验失败
    #[error("Validation Error: {0}")]
    Validation(#[from] ValidationError),
    /// 完整性校验失败（哈希不一致、链断裂）
    #[error("Integrity Error: {0}")]
    Integrity(#[from] IntegrityError),
    /// 存储后端错误
    #[error("Storage Error: {0}")]
    Storage(#[from] StorageError),
    /// 配置错误
    #[error("Config Error: {0}")]
    Config(#[from] ConfigError),
}

/// 实体未找到
#[derive(Debug, Error)]
pub enum NotFoundError {
    #[error("checkpoint '{0}' not found")]
    Checkpoint(String),
    #[error("memory '{0}' not found")]
    Memory(String),
    #[error("quarantined memory '{0}' not found")]
    QuarantinedMemory(String),
    /// 命名空间（或 run）下没有任何 checkpoint
    #[error("no checkpoint found in {0}")]
    NoCheckpoint(String),
}

/// 输入校验错误
#[derive(Debug, Error)]
pub enum ValidationError {
    /// 命名空间字符串格式不合法
    #[error("invalid namespace '{input}': {message}")]
    InvalidNamespace { input: String, message: String },
    /// 缺少必需字段
    #[error("missing required field: {0}")]
    MissingField(String),
    /// 字段值不合法
    #[error("invalid value for '{field}': {message}")]
    InvalidValue { field: String, message: String },
    /// 回滚目标版本从未记录过
    #[error("memory '{memory_id}' has no recorded version {version}")]
    UnknownVersion { memory_id: String, version: u32 },
    /// 实体已存在（checkpoint 只写一次）
    #[error("'{0}' already exists")]
    AlreadyExists(String),
    /// 对已删除的 memory 做不允许的操作
    #[error("memory '{0}' is deleted")]
    MemoryDeleted(String),
    /// 实体所属命名空间与调用不一致
    #[error("namespace mismatch: expected '{expected}', got '{actual}'")]
    NamespaceMismatch { expected: String, actual: String },
}

/// 完整性错误
#[derive(Debug, Error)]
pub enum IntegrityError {
    /// 重新计算的哈希与记录的不一致
    #[error("checkpoint '{checkpoint_id}' hash mismatch (stored {stored}, computed {computed})")]
    HashMismatch {
        checkpoint_id: String,
        stored: String,
        computed: String,
    },
    /// 父 checkpoint 不存在
    #[error("checkpoint '{checkpoint_id}' references missing parent '{parent_id}'")]
    MissingParent {
        checkpoint_id: String,
        parent_id: String,
    },
}

/// 存储后端错误
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("io error: {0}")]
    Io(String),
    #[error("serialization error: {0}")]
    Serialization(String),
    /// 后端不可用或拒绝请求
    #[error("backend error: {0}")]
    Backend(String),
}

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 配置文件未找到
    #[error("config file not found: {0}")]
    FileNotFound(String),
    /// 配置解析失败
    #[error("failed to parse config: {0}")]
    ParseFailed(String),
    /// 配置值无效
    #[error("invalid config value for '{field}': {message}")]
    InvalidValue { field: String, message: String },
}

/// 错误分类，便于调用方不展开嵌套枚举即可决定处理策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Validation,
    Integrity,
    Storage,
    Config,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::Validation => "validation",
            Self::Integrity => "integrity",
            Self::Storage => "storage",
            Self::Config => "config",
        }
    }
}

impl CheckpointError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CheckpointError::NotFound(_) => ErrorKind::NotFound,
            CheckpointError::Validation(_) => ErrorKind::Validation,
            CheckpointError::Integrity(_) => ErrorKind::Integrity,
            CheckpointError::Storage(_) => ErrorKind::Storage,
            CheckpointError::Config(_) => ErrorKind::Config,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }
}

// From 转换实现
impl From<std::io::Error> for CheckpointError {
    fn from(err: std::io::Error) -> Self {
        CheckpointError::Storage(StorageError::Io(err.to_string()))
    }
}

impl From<serde_json::Error> for CheckpointError {
    fn from(err: serde_json::Error) -> Self {
        CheckpointError::Storage(StorageError::Serialization(err.to_string()))
    }
}

impl From<serde_yaml::Error> for CheckpointError {
    fn from(err: serde_yaml::Error) -> Self {
        CheckpointError::Config(ConfigError::ParseFailed(err.to_string()))
    }
}

// 便捷的 Result 类型别名
pub type Result<T> = std::result::Result<T, CheckpointError>;
