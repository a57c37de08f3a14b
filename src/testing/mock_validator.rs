//! Mock 入库校验器：内容命中预设模式时建议隔离。

use crate::error::Result;
use crate::memory::{ContentValidator, IngestionMetadata};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};

#[derive(Default)]
pub struct MockValidator {
    patterns: Vec<String>,
    calls: Arc<Mutex<usize>>,
}

impl MockValidator {
    pub fn new() -> Self {
        Self::default()
    }

    /// 内容包含 `pattern` 时标记 `suspicious_pattern` 并隔离
    pub fn quarantine_when(mut self, pattern: impl Into<String>) -> Self {
        self.patterns.push(pattern.into());
        self
    }

    pub fn call_count(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl ContentValidator for MockValidator {
    async fn validate(&self, content: &str, content_type: &str) -> Result<IngestionMetadata> {
        *self.calls.lock().unwrap() += 1;
        let mut metadata = IngestionMetadata::accepted(content_type);
        let lowered = content.to_lowercase();
        if let Some(hit) = self
            .patterns
            .iter()
            .find(|p| lowered.contains(&p.to_lowercase()))
        {
            metadata.confidence_score = 0.1;
            metadata.anomaly_flags.push("suspicious_pattern".to_string());
            metadata.validation_notes.push(format!("matched pattern: {hit}"));
            metadata.quarantined = true;
        }
        Ok(metadata)
    }
}
