//! 两个内置后端共享的表结构与查询逻辑
//!
//! 所有表都以 `Namespace::key()` 为第一级分区键。

use crate::checkpoint::Checkpoint;
use crate::error::{Result, ValidationError};
use crate::memory::{MemoryObject, ProvenanceEntry};
use crate::namespace::Namespace;
use crate::storage::{AuditEntry, ListOptions, MemoryFilter, SortOrder};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;

type Partitioned<T> = HashMap<String, HashMap<String, T>>;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct Tables {
    #[serde(default)]
    checkpoints: Partitioned<Checkpoint>,
    #[serde(default)]
    memories: Partitioned<MemoryObject>,
    #[serde(default)]
    quarantine: Partitioned<MemoryObject>,
    #[serde(default)]
    audit: HashMap<String, Vec<AuditEntry>>,
}

fn step_order(a: &Checkpoint, b: &Checkpoint) -> Ordering {
    a.step_index
        .cmp(&b.step_index)
        .then_with(|| a.created_at.cmp(&b.created_at))
        .then_with(|| a.checkpoint_id.cmp(&b.checkpoint_id))
}

impl Tables {
    pub(crate) fn namespace_count(&self) -> usize {
        self.checkpoints
            .keys()
            .chain(self.memories.keys())
            .collect::<std::collections::HashSet<_>>()
            .len()
    }

    pub(crate) fn checkpoint_count(&self) -> usize {
        self.checkpoints.values().map(HashMap::len).sum()
    }

    pub(crate) fn memory_count(&self) -> usize {
        self.memories.values().map(HashMap::len).sum()
    }

    pub(crate) fn insert_checkpoint(&mut self, checkpoint: &Checkpoint) -> Result<()> {
        let bucket = self
            .checkpoints
            .entry(checkpoint.namespace.key())
            .or_default();
        if bucket.contains_key(&checkpoint.checkpoint_id) {
            return Err(ValidationError::AlreadyExists(checkpoint.checkpoint_id.clone()).into());
        }
        bucket.insert(checkpoint.checkpoint_id.clone(), checkpoint.clone());
        Ok(())
    }

    pub(crate) fn checkpoint(&self, ns: &Namespace, id: &str) -> Option<Checkpoint> {
        self.checkpoints
            .get(&ns.key())
            .and_then(|b| b.get(id))
            .cloned()
    }

    pub(crate) fn latest_checkpoint(
        &self,
        ns: &Namespace,
        run_id: Option<&str>,
    ) -> Option<Checkpoint> {
        self.checkpoints
            .get(&ns.key())?
            .values()
            .filter(|c| run_id.is_none_or(|r| c.run_id == r))
            .max_by(|a, b| step_order(a, b))
            .cloned()
    }

    pub(crate) fn list_checkpoints(&self, ns: &Namespace, options: &ListOptions) -> Vec<Checkpoint> {
        let Some(bucket) = self.checkpoints.get(&ns.key()) else {
            return vec![];
        };
        let mut items: Vec<&Checkpoint> = bucket
            .values()
            .filter(|c| options.run_id.as_deref().is_none_or(|r| c.run_id == r))
            .collect();
        items.sort_by(|a, b| step_order(a, b));
        if options.order == SortOrder::Desc {
            items.reverse();
        }
        items
            .into_iter()
            .skip(options.offset)
            .take(options.limit.unwrap_or(usize::MAX))
            .cloned()
            .collect()
    }

    pub(crate) fn upsert_memory(&mut self, memory: &MemoryObject) {
        self.memories
            .entry(memory.namespace.key())
            .or_default()
            .insert(memory.memory_id.clone(), memory.clone());
    }

    pub(crate) fn upsert_quarantined(&mut self, memory: &MemoryObject) {
        self.quarantine
            .entry(memory.namespace.key())
            .or_default()
            .insert(memory.memory_id.clone(), memory.clone());
    }

    pub(crate) fn memory(&self, ns: &Namespace, id: &str) -> Option<MemoryObject> {
        self.memories.get(&ns.key()).and_then(|b| b.get(id)).cloned()
    }

    pub(crate) fn quarantined(&self, ns: &Namespace, id: &str) -> Option<MemoryObject> {
        self.quarantine
            .get(&ns.key())
            .and_then(|b| b.get(id))
            .cloned()
    }

    pub(crate) fn list_quarantined(&self, ns: &Namespace) -> Vec<MemoryObject> {
        let mut items: Vec<MemoryObject> = self
            .quarantine
            .get(&ns.key())
            .map(|b| b.values().cloned().collect())
            .unwrap_or_default();
        items.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        items
    }

    pub(crate) fn remove_quarantined(&mut self, ns: &Namespace, id: &str) -> bool {
        self.quarantine
            .get_mut(&ns.key())
            .map(|b| b.remove(id).is_some())
            .unwrap_or(false)
    }

    pub(crate) fn search_memories(&self, ns: &Namespace, filter: &MemoryFilter) -> Vec<MemoryObject> {
        let mut items: Vec<MemoryObject> = self
            .memories
            .get(&ns.key())
            .map(|b| b.values().filter(|m| filter.matches(m)).cloned().collect())
            .unwrap_or_default();
        items.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        items
    }

    pub(crate) fn list_memories(&self, ns: &Namespace) -> Vec<MemoryObject> {
        let mut items: Vec<MemoryObject> = self
            .memories
            .get(&ns.key())
            .map(|b| b.values().cloned().collect())
            .unwrap_or_default();
        items.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        items
    }

    pub(crate) fn touch_memory(
        &mut self,
        ns: &Namespace,
        id: &str,
        accessed_at: DateTime<Utc>,
        checkpoint_id: Option<&str>,
        entry: ProvenanceEntry,
    ) -> Option<MemoryObject> {
        let memory = self.memories.get_mut(&ns.key())?.get_mut(id)?;
        memory.last_accessed_at = Some(accessed_at);
        if let Some(cp) = checkpoint_id
            && !memory.checkpoint_refs.iter().any(|r| r == cp)
        {
            memory.checkpoint_refs.push(cp.to_string());
        }
        memory.provenance.push(entry);
        Some(memory.clone())
    }

    pub(crate) fn append_audit(&mut self, entry: &AuditEntry) {
        self.audit
            .entry(entry.namespace.key())
            .or_default()
            .push(entry.clone());
    }

    pub(crate) fn audit_log(&self, ns: &Namespace, entity_id: Option<&str>) -> Vec<AuditEntry> {
        let mut items: Vec<AuditEntry> = self
            .audit
            .get(&ns.key())
            .map(|log| {
                log.iter()
                    .filter(|e| entity_id.is_none_or(|id| e.entity_id == id))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        // 稳定排序，同一时间戳保持写入顺序
        items.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
        items
    }
}
