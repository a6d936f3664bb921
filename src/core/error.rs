//! 推理运行错误与工具错误
//!
//! 只有 ReasonError 会穿过 `Orchestrator::run` 边界；ToolError 永远作为 Observation 记录在 Scratchpad 中，
//! 不会抛出 Step Solver 之外。

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::llm::LlmError;
use crate::react::Scratchpad;

/// 运行级错误：规划调用失败、取消、配置错误
#[derive(Error, Debug)]
pub enum ReasonError {
    /// Model Gateway 重试耗尽（或遇到不可重试错误）
    #[error("Model unavailable after {attempts} attempt(s): {last_error}")]
    ModelUnavailable { attempts: u32, last_error: LlmError },

    /// 在两步之间被取消；附带已完成部分的 Scratchpad
    #[error("Cancelled after {completed_steps} step(s)")]
    Cancelled {
        completed_steps: usize,
        scratchpad: Scratchpad,
    },

    #[error("Config error: {0}")]
    ConfigError(String),
}

impl ReasonError {
    pub fn is_model_unavailable(&self) -> bool {
        matches!(self, ReasonError::ModelUnavailable { .. })
    }
}

/// 工具错误类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolErrorKind {
    UnknownTool,
    InvalidExpression,
    EvaluationError,
    RetrievalUnavailable,
    Timeout,
}

impl std::fmt::Display for ToolErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ToolErrorKind::UnknownTool => "UnknownTool",
            ToolErrorKind::InvalidExpression => "InvalidExpression",
            ToolErrorKind::EvaluationError => "EvaluationError",
            ToolErrorKind::RetrievalUnavailable => "RetrievalUnavailable",
            ToolErrorKind::Timeout => "Timeout",
        };
        f.write_str(s)
    }
}

/// 工具调用失败：类别 + 说明
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[error("{kind}: {message}")]
pub struct ToolError {
    pub kind: ToolErrorKind,
    pub message: String,
}

impl ToolError {
    pub fn new(kind: ToolErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn unknown_tool(name: &str) -> Self {
        Self::new(ToolErrorKind::UnknownTool, format!("Unknown tool: {name}"))
    }

    pub fn invalid_expression(message: impl Into<String>) -> Self {
        Self::new(ToolErrorKind::InvalidExpression, message)
    }

    pub fn evaluation(message: impl Into<String>) -> Self {
        Self::new(ToolErrorKind::EvaluationError, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_error_display() {
        let err = ToolError::unknown_tool("shell");
        assert_eq!(err.kind, ToolErrorKind::UnknownTool);
        assert_eq!(err.to_string(), "UnknownTool: Unknown tool: shell");
    }

    #[test]
    fn test_tool_error_kind_serializes_snake_case() {
        let json = serde_json::to_string(&ToolErrorKind::RetrievalUnavailable).unwrap();
        assert_eq!(json, "\"retrieval_unavailable\"");
    }

    #[test]
    fn test_model_unavailable_message() {
        let err = ReasonError::ModelUnavailable {
            attempts: 3,
            last_error: LlmError::Timeout,
        };
        assert!(err.is_model_unavailable());
        assert!(err.to_string().contains("3 attempt"));
    }
}
