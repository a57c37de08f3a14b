//! 命名空间：所有读写的分区键
//!
//! 四段式 `org:app:agent[:user]`，序列化后的字符串同时用于存储分区和审计日志关联。
//! 任何存储操作都必须携带命名空间，跨命名空间读取永远不会隐式发生。

use crate::error::{Result, ValidationError};
use serde::{Deserialize, Serialize};
use std::fmt;

const SEPARATOR: char = ':';

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Namespace {
    pub org_id: String,
    pub app_id: String,
    pub agent_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

impl Namespace {
    pub fn new(
        org_id: impl Into<String>,
        app_id: impl Into<String>,
        agent_id: impl Into<String>,
    ) -> Self {
        Self {
            org_id: org_id.into(),
            app_id: app_id.into(),
            agent_id: agent_id.into(),
            user_id: None,
        }
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// 确定性的分区键：`org:app:agent[:user]`
    pub fn key(&self) -> String {
        match &self.user_id {
            Some(user) => format!(
                "{}:{}:{}:{}",
                self.org_id, self.app_id, self.agent_id, user
            ),
            None => format!("{}:{}:{}", self.org_id, self.app_id, self.agent_id),
        }
    }

    /// 从 `org:app:agent[:user]` 解析
    pub fn parse(input: &str) -> Result<Self> {
        let invalid = |message: &str| ValidationError::InvalidNamespace {
            input: input.to_string(),
            message: message.to_string(),
        };
        let parts: Vec<&str> = input.split(SEPARATOR).collect();
        if !(3..=4).contains(&parts.len()) {
            return Err(invalid("expected 3 or 4 ':'-separated parts").into());
        }
        if parts.iter().any(|p| p.trim().is_empty()) {
            return Err(invalid("parts must not be empty").into());
        }
        Ok(Self {
            org_id: parts[0].to_string(),
            app_id: parts[1].to_string(),
            agent_id: parts[2].to_string(),
            user_id: parts.get(3).map(|s| s.to_string()),
        })
    }

    /// 校验各段非空且不含分隔符，保证 `key()` 可逆
    pub fn validate(&self) -> Result<()> {
        let key = self.key();
        let mut parts = vec![&self.org_id, &self.app_id, &self.agent_id];
        if let Some(user) = &self.user_id {
            parts.push(user);
        }
        for part in parts {
            if part.trim().is_empty() || part.contains(SEPARATOR) {
                return Err(ValidationError::InvalidNamespace {
                    input: key,
                    message: format!("invalid part '{part}'"),
                }
                .into());
            }
        }
        Ok(())
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}
