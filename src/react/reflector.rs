//! Reflector：校验失败后的修复
//!
//! 用失败原因与上一次的 thought / action / observation / result 构造修复 prompt，
//! 再以该 prompt 重新进入 Step Solver 状态机。每步最多修复 max_retries 次，预算由 Orchestrator 执行。

use std::sync::Arc;

use crate::react::prompts::render;
use crate::react::solver::{StepContext, StepResult, StepSolver};
use crate::react::Action;
use crate::tools::executor::preview;

/// Reflector：持有 Step Solver 与每步重试预算
pub struct Reflector {
    solver: Arc<StepSolver>,
    max_retries: usize,
}

impl Reflector {
    pub fn new(solver: Arc<StepSolver>, max_retries: usize) -> Self {
        Self {
            solver,
            max_retries,
        }
    }

    /// 每步修复次数上限（每步最多 1 + max_retries 条记录）
    pub fn max_retries(&self) -> usize {
        self.max_retries
    }

    /// 是否还能对第 attempt 次尝试（从 0 开始）之后再修复一次
    pub fn has_budget(&self, attempt_index: usize) -> bool {
        attempt_index < self.max_retries
    }

    pub fn repair_prompt(&self, ctx: &StepContext<'_>, previous: &StepResult, reason: &str) -> String {
        let chars = self.solver.preview_chars();
        let action = match &previous.action {
            Action::Final { text } => format!("final answer: {}", preview(text, chars)),
            Action::ToolCall { tool_name, argument } => format!("{}: {}", tool_name, argument),
            Action::Malformed { raw_text } if raw_text.trim().is_empty() => "(no output)".to_string(),
            Action::Malformed { raw_text } => format!("unparseable output: {}", preview(raw_text, chars)),
        };
        let observation = previous
            .observation()
            .map(|o| format!("{}({}) -> {}", o.tool_name, o.argument, preview(&o.as_context(), chars)))
            .unwrap_or_else(|| "(none)".to_string());
        let thought = if previous.thought.is_empty() {
            "(none)".to_string()
        } else {
            preview(&previous.thought, chars)
        };
        let result = if previous.result_text.trim().is_empty() {
            "(empty)".to_string()
        } else {
            preview(&previous.result_text, chars)
        };

        let mut vars = self.solver.common_vars(ctx);
        vars.push(("reason", reason.to_string()));
        vars.push(("thought", thought));
        vars.push(("action", action));
        vars.push(("observation", observation));
        vars.push(("result", result));
        let refs: Vec<(&str, &str)> = vars.iter().map(|(k, v)| (*k, v.as_str())).collect();
        render(&self.solver.templates().repair, &refs)
    }

    /// 生成修正后的 StepResult（不检查预算）
    pub async fn reflect(&self, ctx: &StepContext<'_>, previous: &StepResult, reason: &str) -> StepResult {
        tracing::info!(step = ctx.step_index, %reason, "reflecting on failed step");
        let prompt = self.repair_prompt(ctx, previous, reason);
        self.solver.solve_with_prompt(ctx.step_index, prompt).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{HashEmbedder, ModelGateway, ScriptedLlmClient};
    use crate::react::Scratchpad;
    use crate::tools::{CalculatorTool, Observation, ToolExecutor, ToolRegistry};

    fn reflector(client: Arc<ScriptedLlmClient>, retries: usize) -> Reflector {
        let gateway = Arc::new(ModelGateway::new(client, Arc::new(HashEmbedder::default())));
        let mut registry = ToolRegistry::new();
        registry.register(CalculatorTool);
        let solver = StepSolver::new(gateway, Arc::new(ToolExecutor::new(registry, 5)));
        Reflector::new(Arc::new(solver), retries)
    }

    #[test]
    fn test_budget() {
        let r = reflector(Arc::new(ScriptedLlmClient::new(Vec::<String>::new())), 2);
        assert!(r.has_budget(0));
        assert!(r.has_budget(1));
        assert!(!r.has_budget(2));
        let r = reflector(Arc::new(ScriptedLlmClient::new(Vec::<String>::new())), 0);
        assert!(!r.has_budget(0));
    }

    #[tokio::test]
    async fn test_reflect_includes_reason_and_previous_attempt() {
        let client = Arc::new(ScriptedLlmClient::new([r#"{"final_answer": "5781"}"#]));
        let r = reflector(client.clone(), 2);
        let pad = Scratchpad::new();
        let ctx = StepContext {
            query: "Calcule 123 * 47",
            step_index: 0,
            step: "Multiply",
            scratchpad: &pad,
        };
        let previous = StepResult {
            step_index: 0,
            thought: "try the tool".to_string(),
            action: Action::ToolCall {
                tool_name: "calculator".into(),
                argument: "123x47".into(),
            },
            observations: vec![Observation::failure(
                "calculator",
                "123x47",
                crate::core::ToolError::invalid_expression("disallowed character 'x'"),
            )],
            result_text: String::new(),
            error: None,
        };

        let fixed = r.reflect(&ctx, &previous, "tool calculator failed").await;
        assert_eq!(fixed.result_text, "5781");

        let prompt = &client.prompts()[0];
        assert!(prompt.contains("Failure reason: tool calculator failed"));
        assert!(prompt.contains("Previous thought: try the tool"));
        assert!(prompt.contains("Previous action: calculator: 123x47"));
        assert!(prompt.contains("disallowed character"));
        assert!(prompt.contains("Previous result: (empty)"));
        assert!(prompt.trim_end().ends_with("Step 1: Multiply"));
    }
}
