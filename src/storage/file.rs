use crate::checkpoint::Checkpoint;
use crate::error::{Result, StorageError};
use crate::memory::{MemoryObject, ProvenanceEntry};
use crate::namespace::Namespace;
use crate::storage::tables::Tables;
use crate::storage::{AuditEntry, ListOptions, MemoryFilter, StorageBackend};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// 基于 JSON 文件的持久化后端
///
/// 写时立即落盘，读时从内存缓存返回（无需反复解析文件）。
/// 每次写入先在表的副本上修改，写临时文件再 rename 覆盖，成功后才替换内存状态；
/// 落盘失败时磁盘与内存都保持原样。
///
/// 存储格式（第一级 key 为 `Namespace::key()`）：
/// ```json
/// {
///   "checkpoints": { "acme:support:triage": { "<checkpoint_id>": { ... } } },
///   "memories":    { "acme:support:triage": { "<memory_id>": { ... } } },
///   "quarantine":  { ... },
///   "audit":       { "acme:support:triage": [ { "action": "restore", ... } ] }
/// }
/// ```
pub struct FileBackend {
    path: PathBuf,
    tables: RwLock<Tables>,
}

impl FileBackend {
    /// 打开或创建存储文件，自动建父目录
    ///
    /// 无法解析的文件改名为 `<name>.corrupt` 保留，然后从空状态开始。
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = expand_tilde(path.as_ref());
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StorageError::Io(format!("创建目录失败: {e}")))?;
        }
        let tables: Tables = if path.exists() {
            let raw = std::fs::read_to_string(&path)
                .map_err(|e| StorageError::Io(format!("读取存储文件失败: {e}")))?;
            match serde_json::from_str(&raw) {
                Ok(tables) => tables,
                Err(e) => {
                    let backup = sibling(&path, ".corrupt");
                    std::fs::rename(&path, &backup)
                        .map_err(|e| StorageError::Io(format!("备份损坏文件失败: {e}")))?;
                    warn!(
                        backup = %backup.display(),
                        "⚠️ 存储文件解析失败，已备份并从空状态开始: {e}"
                    );
                    Tables::default()
                }
            }
        } else {
            Tables::default()
        };
        info!(
            path = %path.display(),
            namespaces = tables.namespace_count(),
            checkpoints = tables.checkpoint_count(),
            memories = tables.memory_count(),
            "🗄️ FileBackend 初始化"
        );
        Ok(Self {
            path,
            tables: RwLock::new(tables),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 持有写锁完成 修改副本 → 落盘 → 替换；`apply` 返回 `None` 表示没有改动，不落盘
    async fn commit<R, F>(&self, apply: F) -> Result<Option<R>>
    where
        F: FnOnce(&mut Tables) -> Result<Option<R>> + Send,
        R: Send,
    {
        let mut tables = self.tables.write().await;
        let mut next = tables.clone();
        let Some(out) = apply(&mut next)? else {
            return Ok(None);
        };
        self.persist(&next).await?;
        *tables = next;
        Ok(Some(out))
    }

    async fn persist(&self, tables: &Tables) -> Result<()> {
        let json = serde_json::to_string_pretty(tables)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        let tmp = sibling(&self.path, ".tmp");
        tokio::fs::write(&tmp, json)
            .await
            .map_err(|e| StorageError::Io(format!("写入临时文件失败: {e}")))?;
        if let Err(e) = tokio::fs::rename(&tmp, &self.path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(StorageError::Io(format!("替换存储文件失败: {e}")).into());
        }
        debug!(path = %self.path.display(), "💾 存储已持久化");
        Ok(())
    }
}

#[async_trait]
impl StorageBackend for FileBackend {
    async fn save_checkpoint(&self, checkpoint: &Checkpoint) -> Result<()> {
        self.commit(|t| t.insert_checkpoint(checkpoint).map(Some))
            .await
            .map(|_| ())
    }

    async fn get_checkpoint(&self, namespace: &Namespace, id: &str) -> Result<Option<Checkpoint>> {
        Ok(self.tables.read().await.checkpoint(namespace, id))
    }

    async fn get_latest_checkpoint(
        &self,
        namespace: &Namespace,
        run_id: Option<&str>,
    ) -> Result<Option<Checkpoint>> {
        Ok(self.tables.read().await.latest_checkpoint(namespace, run_id))
    }

    async fn list_checkpoints(
        &self,
        namespace: &Namespace,
        options: &ListOptions,
    ) -> Result<Vec<Checkpoint>> {
        Ok(self.tables.read().await.list_checkpoints(namespace, options))
    }

    async fn save_memory(&self, memory: &MemoryObject) -> Result<()> {
        self.commit(|t| {
            t.upsert_memory(memory);
            Ok(Some(()))
        })
        .await
        .map(|_| ())
    }

    async fn save_quarantined_memory(&self, memory: &MemoryObject) -> Result<()> {
        self.commit(|t| {
            t.upsert_quarantined(memory);
            Ok(Some(()))
        })
        .await
        .map(|_| ())
    }

    async fn get_memory(&self, namespace: &Namespace, id: &str) -> Result<Option<MemoryObject>> {
        Ok(self.tables.read().await.memory(namespace, id))
    }

    async fn get_quarantined_memory(
        &self,
        namespace: &Namespace,
        id: &str,
    ) -> Result<Option<MemoryObject>> {
        Ok(self.tables.read().await.quarantined(namespace, id))
    }

    async fn list_quarantined_memories(&self, namespace: &Namespace) -> Result<Vec<MemoryObject>> {
        Ok(self.tables.read().await.list_quarantined(namespace))
    }

    async fn delete_quarantined_memory(&self, namespace: &Namespace, id: &str) -> Result<bool> {
        let removed = self
            .commit(|t| Ok(t.remove_quarantined(namespace, id).then_some(())))
            .await?;
        Ok(removed.is_some())
    }

    async fn search_memories(
        &self,
        namespace: &Namespace,
        filter: &MemoryFilter,
    ) -> Result<Vec<MemoryObject>> {
        let items = self.tables.read().await.search_memories(namespace, filter);
        debug!(namespace = %namespace, hits = items.len(), "🔍 记忆候选检索");
        Ok(items)
    }

    async fn list_memories(&self, namespace: &Namespace) -> Result<Vec<MemoryObject>> {
        Ok(self.tables.read().await.list_memories(namespace))
    }

    async fn update_memory_access(
        &self,
        namespace: &Namespace,
        id: &str,
        accessed_at: DateTime<Utc>,
        checkpoint_id: Option<&str>,
        entry: ProvenanceEntry,
    ) -> Result<Option<MemoryObject>> {
        self.commit(|t| Ok(t.touch_memory(namespace, id, accessed_at, checkpoint_id, entry)))
            .await
    }

    async fn log_audit(&self, entry: &AuditEntry) -> Result<()> {
        self.commit(|t| {
            t.append_audit(entry);
            Ok(Some(()))
        })
        .await
        .map(|_| ())
    }

    async fn get_audit_log(
        &self,
        namespace: &Namespace,
        entity_id: Option<&str>,
    ) -> Result<Vec<AuditEntry>> {
        Ok(self.tables.read().await.audit_log(namespace, entity_id))
    }
}

/// 同目录下、文件名追加后缀的路径
fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(suffix);
    path.with_file_name(name)
}

fn expand_tilde(path: &Path) -> PathBuf {
    let s = path.to_string_lossy();
    if s.starts_with("~/")
        && let Some(home) = std::env::var("HOME")
            .ok()
            .or_else(|| std::env::var("USERPROFILE").ok())
    {
        return PathBuf::from(home).join(&s[2..]);
    }
    path.to_path_buf()
}
