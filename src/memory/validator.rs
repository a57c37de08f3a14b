//! 入库内容校验
//!
//! 外部校验器在记忆进入 [`KnowledgeLane`](crate::memory::KnowledgeLane) 之前给出置信度、格式、
//! 异常标记和隔离建议。被标记隔离的记忆写入隔离区，不参与检索。

use crate::error::Result;
use crate::memory::types::IngestionMetadata;
use async_trait::async_trait;

#[async_trait]
pub trait ContentValidator: Send + Sync {
    async fn validate(&self, content: &str, content_type: &str) -> Result<IngestionMetadata>;
}

/// 全部放行：置信度 1.0，格式沿用 `content_type`
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAllValidator;

#[async_trait]
impl ContentValidator for AcceptAllValidator {
    async fn validate(&self, _content: &str, content_type: &str) -> Result<IngestionMetadata> {
        Ok(IngestionMetadata::accepted(content_type))
    }
}
