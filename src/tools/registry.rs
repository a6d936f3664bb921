//! 工具注册表
//!
//! 所有工具实现 Tool trait（name / description / execute），由 ToolRegistry 按名注册与查找；
//! invoke 永远返回 Observation，未知工具与执行失败都作为 ToolError 记录在 Observation 中。
//! 注册表不做缓存，每次调用都重新执行。

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::ToolError;

/// 工具 trait：名称、描述（供 LLM 理解）、异步执行（参数为单个文本）
#[async_trait]
pub trait Tool: Send + Sync {
    /// 工具名称（即动作行前缀，如 `calculator: 1+2`）
    fn name(&self) -> &str;

    /// 工具描述（供 LLM 理解功能）
    fn description(&self) -> &str;

    async fn execute(&self, argument: &str) -> Result<String, ToolError>;
}

/// 一次工具调用的结果；成功为 output_text，失败为 ToolError
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub tool_name: String,
    pub argument: String,
    pub output: Result<String, ToolError>,
}

impl Observation {
    pub fn success(tool_name: &str, argument: &str, output_text: impl Into<String>) -> Self {
        Self {
            tool_name: tool_name.to_string(),
            argument: argument.to_string(),
            output: Ok(output_text.into()),
        }
    }

    pub fn failure(tool_name: &str, argument: &str, error: ToolError) -> Self {
        Self {
            tool_name: tool_name.to_string(),
            argument: argument.to_string(),
            output: Err(error),
        }
    }

    pub fn is_error(&self) -> bool {
        self.output.is_err()
    }

    pub fn error(&self) -> Option<&ToolError> {
        self.output.as_ref().err()
    }

    /// 写回 prompt 的文本：成功为输出，失败为 `Error: ...`
    pub fn as_context(&self) -> String {
        match &self.output {
            Ok(text) => text.clone(),
            Err(e) => format!("Error: {}", e),
        }
    }
}

/// 工具注册表：按名称存储 Arc<dyn Tool>（有序，便于生成稳定的 prompt）
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: impl Tool + 'static) {
        self.register_arc(Arc::new(tool));
    }

    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        self.tools.insert(name, tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub async fn invoke(&self, name: &str, argument: &str) -> Observation {
        let Some(tool) = self.tools.get(name) else {
            return Observation::failure(name, argument, ToolError::unknown_tool(name));
        };
        match tool.execute(argument).await {
            Ok(output) => Observation::success(name, argument, output),
            Err(e) => Observation::failure(name, argument, e),
        }
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }

    /// 返回 (name, description) 列表，用于生成 prompt 中的 Available tools 段落
    pub fn tool_descriptions(&self) -> Vec<(String, String)> {
        self.tools
            .iter()
            .map(|(name, tool)| (name.clone(), tool.description().to_string()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ToolErrorKind;
    use crate::tools::CalculatorTool;

    #[tokio::test]
    async fn test_unknown_tool_is_recorded_not_thrown() {
        let registry = ToolRegistry::new();
        let obs = registry.invoke("shell", "rm -rf /").await;
        assert_eq!(obs.tool_name, "shell");
        assert_eq!(obs.argument, "rm -rf /");
        assert_eq!(obs.error().map(|e| e.kind), Some(ToolErrorKind::UnknownTool));
    }

    #[tokio::test]
    async fn test_invoke_calculator() {
        let mut registry = ToolRegistry::new();
        registry.register(CalculatorTool);
        let obs = registry.invoke("calculator", "123*47").await;
        assert_eq!(obs.output, Ok("5781".to_string()));
        assert_eq!(obs.as_context(), "5781");
        assert_eq!(registry.tool_names(), vec!["calculator".to_string()]);
    }

    #[test]
    fn test_failure_context() {
        let obs = Observation::failure(
            "calculator",
            "1/0",
            ToolError::evaluation("division by zero"),
        );
        assert!(obs.is_error());
        assert_eq!(obs.as_context(), "Error: EvaluationError: division by zero");
    }
}
