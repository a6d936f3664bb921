//! 工具执行器
//!
//! 持有 ToolRegistry 与全局超时，execute(tool_name, argument) 在超时内调用 registry.invoke，
//! 超时转为 ToolError(Timeout) 的 Observation；每次调用输出结构化审计日志（JSON）。

use std::time::{Duration, Instant};

use tokio::time::timeout;

use crate::core::{ToolError, ToolErrorKind};
use crate::tools::{Observation, ToolRegistry};

/// 工具执行器：对每次调用施加超时，结果统一为 Observation
pub struct ToolExecutor {
    registry: ToolRegistry,
    timeout: Duration,
}

impl ToolExecutor {
    pub fn new(registry: ToolRegistry, timeout_secs: u64) -> Self {
        Self {
            registry,
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    pub async fn execute(&self, tool_name: &str, argument: &str) -> Observation {
        let start = Instant::now();
        let observation = match timeout(self.timeout, self.registry.invoke(tool_name, argument)).await {
            Ok(obs) => obs,
            Err(_) => Observation::failure(
                tool_name,
                argument,
                ToolError::new(
                    ToolErrorKind::Timeout,
                    format!("{} timed out after {}s", tool_name, self.timeout.as_secs()),
                ),
            ),
        };

        let outcome = match observation.error() {
            None => "ok".to_string(),
            Some(e) => e.kind.to_string(),
        };
        let audit = serde_json::json!({
            "event": "tool_audit",
            "tool": tool_name,
            "ok": !observation.is_error(),
            "outcome": outcome,
            "duration_ms": start.elapsed().as_millis() as u64,
            "args_preview": preview(argument, 200),
        });
        tracing::info!(audit = %audit.to_string(), "tool");

        observation
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.registry.tool_names()
    }
}

/// 截断到 max 个字符，超出时追加 `...`
pub(crate) fn preview(s: &str, max: usize) -> String {
    if s.chars().count() > max {
        format!("{}...", s.chars().take(max).collect::<String>())
    } else {
        s.to_string()
    }
}
