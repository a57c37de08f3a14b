use crate::checkpoint::Checkpoint;
use crate::error::Result;
use crate::memory::{MemoryObject, ProvenanceEntry};
use crate::namespace::Namespace;
use crate::storage::tables::Tables;
use crate::storage::{AuditEntry, ListOptions, MemoryFilter, StorageBackend};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

/// 进程内存后端，不持久化，适合测试和短生命周期使用
///
/// # 示例
///
/// ```rust,no_run
/// use echo_checkpoint::storage::{InMemoryBackend, StorageBackend};
/// use std::sync::Arc;
///
/// let backend: Arc<dyn StorageBackend> = Arc::new(InMemoryBackend::new());
/// ```
pub struct InMemoryBackend {
    tables: RwLock<Tables>,
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
        }
    }
}

#[async_trait]
impl StorageBackend for InMemoryBackend {
    async fn save_checkpoint(&self, checkpoint: &Checkpoint) -> Result<()> {
        self.tables.write().await.insert_checkpoint(checkpoint)
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
        self.tables.write().await.upsert_memory(memory);
        Ok(())
    }

    async fn save_quarantined_memory(&self, memory: &MemoryObject) -> Result<()> {
        self.tables.write().await.upsert_quarantined(memory);
        Ok(())
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
        Ok(self.tables.write().await.remove_quarantined(namespace, id))
    }

    async fn search_memories(
        &self,
        namespace: &Namespace,
        filter: &MemoryFilter,
    ) -> Result<Vec<MemoryObject>> {
        Ok(self.tables.read().await.search_memories(namespace, filter))
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
        Ok(self
            .tables
            .write()
            .await
            .touch_memory(namespace, id, accessed_at, checkpoint_id, entry))
    }

    async fn log_audit(&self, entry: &AuditEntry) -> Result<()> {
        self.tables.write().await.append_audit(entry);
        Ok(())
    }

    async fn get_audit_log(
        &self,
        namespace: &Namespace,
        entity_id: Option<&str>,
    ) -> Result<Vec<AuditEntry>> {
        Ok(self.tables.read().await.audit_log(namespace, entity_id))
    }
}
