//! 所有操作都失败的存储后端，用于测试错误传播路径。

use crate::checkpoint::Checkpoint;
use crate::error::{Result, StorageError};
use crate::memory::{MemoryObject, ProvenanceEntry};
use crate::namespace::Namespace;
use crate::storage::{AuditEntry, ListOptions, MemoryFilter, StorageBackend};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Copy, Default)]
pub struct FailingBackend;

fn unavailable<T>() -> Result<T> {
    Err(StorageError::Backend("storage unavailable".to_string()).into())
}

#[async_trait]
impl StorageBackend for FailingBackend {
    async fn save_checkpoint(&self, _checkpoint: &Checkpoint) -> Result<()> {
        unavailable()
    }

    async fn get_checkpoint(&self, _namespace: &Namespace, _id: &str) -> Result<Option<Checkpoint>> {
        unavailable()
    }

    async fn get_latest_checkpoint(
        &self,
        _namespace: &Namespace,
        _run_id: Option<&str>,
    ) -> Result<Option<Checkpoint>> {
        unavailable()
    }

    async fn list_checkpoints(
        &self,
        _namespace: &Namespace,
        _options: &ListOptions,
    ) -> Result<Vec<Checkpoint>> {
        unavailable()
    }

    async fn save_memory(&self, _memory: &MemoryObject) -> Result<()> {
        unavailable()
    }

    async fn save_quarantined_memory(&self, _memory: &MemoryObject) -> Result<()> {
        unavailable()
    }

    async fn get_memory(&self, _namespace: &Namespace, _id: &str) -> Result<Option<MemoryObject>> {
        unavailable()
    }

    async fn get_quarantined_memory(
        &self,
        _namespace: &Namespace,
        _id: &str,
    ) -> Result<Option<MemoryObject>> {
        unavailable()
    }

    async fn list_quarantined_memories(&self, _namespace: &Namespace) -> Result<Vec<MemoryObject>> {
        unavailable()
    }

    async fn delete_quarantined_memory(&self, _namespace: &Namespace, _id: &str) -> Result<bool> {
        unavailable()
    }

    async fn search_memories(
        &self,
        _namespace: &Namespace,
        _filter: &MemoryFilter,
    ) -> Result<Vec<MemoryObject>> {
        unavailable()
    }

    async fn list_memories(&self, _namespace: &Namespace) -> Result<Vec<MemoryObject>> {
        unavailable()
    }

    async fn update_memory_access(
        &self,
        _namespace: &Namespace,
        _id: &str,
        _accessed_at: DateTime<Utc>,
        _checkpoint_id: Option<&str>,
        _entry: ProvenanceEntry,
    ) -> Result<Option<MemoryObject>> {
        unavailable()
    }

    async fn log_audit(&self, _entry: &AuditEntry) -> Result<()> {
        unavailable()
    }

    async fn get_audit_log(
        &self,
        _namespace: &Namespace,
        _entity_id: Option<&str>,
    ) -> Result<Vec<AuditEntry>> {
        unavailable()
    }
}
