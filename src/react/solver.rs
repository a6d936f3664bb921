//! Step Solver：单步 ReAct 状态机
//!
//! THINK（拼 prompt 调用模型）-> ACT（解析动作）-> OBSERVE（执行工具并把观察追加到 prompt）-> THINK ... -> DONE。
//! - Final：结果为最终文本
//! - Malformed：原文即结果（尽力而为，不阻塞流水线）
//! - ToolCall：执行工具；工具轮数达到 max_tool_rounds 后再次请求工具时强制结束
//! - 模型不可用：结果为空并记录 error，由 Verifier 判为 FAIL，运行继续

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::llm::ModelGateway;
use crate::react::prompts::{render, tools_section};
use crate::react::{final_answer_schema_json, Action, ActionParser, PromptTemplates, Scratchpad};
use crate::tools::{Observation, ToolExecutor};

/// 单步求解结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    pub step_index: usize,
    pub thought: String,
    /// 决定本步结果的动作
    pub action: Action,
    /// 本步全部工具观察（按时间顺序）
    pub observations: Vec<Observation>,
    pub result_text: String,
    /// 模型调用失败时的错误信息
    pub error: Option<String>,
}

impl StepResult {
    /// 最后一次工具观察
    pub fn observation(&self) -> Option<&Observation> {
        self.observations.last()
    }

    pub fn used_tools(&self) -> bool {
        !self.observations.is_empty()
    }
}

/// 求解一步所需的上下文（Scratchpad 只读）
#[derive(Debug, Clone, Copy)]
pub struct StepContext<'a> {
    pub query: &'a str,
    pub step_index: usize,
    pub step: &'a str,
    pub scratchpad: &'a Scratchpad,
}

enum SolverState {
    Think {
        prompt: String,
    },
    Act {
        prompt: String,
        raw: String,
    },
    Observe {
        prompt: String,
        raw: String,
        tool_name: String,
        argument: String,
    },
}

/// Step Solver：持有网关、工具执行器与动作解析器
pub struct StepSolver {
    gateway: Arc<ModelGateway>,
    executor: Arc<ToolExecutor>,
    parser: ActionParser,
    templates: PromptTemplates,
    max_tool_rounds: usize,
    preview_chars: usize,
    schema: String,
}

impl StepSolver {
    pub fn new(gateway: Arc<ModelGateway>, executor: Arc<ToolExecutor>) -> Self {
        let parser = ActionParser::new(executor.tool_names());
        Self {
            gateway,
            executor,
            parser,
            templates: PromptTemplates::default(),
            max_tool_rounds: 2,
            preview_chars: 400,
            schema: final_answer_schema_json(),
        }
    }

    pub fn with_templates(mut self, templates: PromptTemplates) -> Self {
        self.templates = templates;
        self
    }

    pub fn with_max_tool_rounds(mut self, rounds: usize) -> Self {
        self.max_tool_rounds = rounds;
        self
    }

    pub fn with_preview_chars(mut self, chars: usize) -> Self {
        self.preview_chars = chars;
        self
    }

    pub fn templates(&self) -> &PromptTemplates {
        &self.templates
    }

    pub fn max_tool_rounds(&self) -> usize {
        self.max_tool_rounds
    }

    /// 所有步骤 prompt 共享的占位变量
    pub(crate) fn common_vars(&self, ctx: &StepContext<'_>) -> Vec<(&'static str, String)> {
        vec![
            ("query", ctx.query.to_string()),
            ("tools", tools_section(&self.executor.registry().tool_descriptions())),
            ("schema", self.schema.clone()),
            ("scratchpad", ctx.scratchpad.render(self.preview_chars)),
            ("step_index", (ctx.step_index + 1).to_string()),
            ("step", ctx.step.to_string()),
        ]
    }

    pub(crate) fn preview_chars(&self) -> usize {
        self.preview_chars
    }

    pub fn step_prompt(&self, ctx: &StepContext<'_>) -> String {
        let vars = self.common_vars(ctx);
        let refs: Vec<(&str, &str)> = vars.iter().map(|(k, v)| (*k, v.as_str())).collect();
        render(&self.templates.step, &refs)
    }

    pub async fn solve(&self, ctx: &StepContext<'_>) -> StepResult {
        let prompt = self.step_prompt(ctx);
        self.solve_with_prompt(ctx.step_index, prompt).await
    }

    /// 以给定的初始 prompt 运行状态机（Reflector 用修复 prompt 重新进入）
    pub async fn solve_with_prompt(&self, step_index: usize, prompt: String) -> StepResult {
        let mut state = SolverState::Think { prompt };
        let mut observations: Vec<Observation> = Vec::new();
        let mut thought = String::new();
        let mut tool_rounds = 0;

        loop {
            state = match state {
                SolverState::Think { prompt } => match self.gateway.generate_default(&prompt).await {
                    Ok(raw) => SolverState::Act { prompt, raw },
                    Err(e) => {
                        tracing::warn!(step = step_index, error = %e, "step model call failed");
                        return StepResult {
                            step_index,
                            thought,
                            action: Action::Malformed {
                                raw_text: String::new(),
                            },
                            observations,
                            result_text: String::new(),
                            error: Some(e.to_string()),
                        };
                    }
                },
                SolverState::Act { prompt, raw } => {
                    let parsed = self.parser.parse_output(&raw);
                    if !parsed.thought.is_empty() {
                        thought = parsed.thought;
                    }
                    match parsed.action {
                        Action::Final { text } => {
                            return StepResult {
                                step_index,
                                thought,
                                action: Action::Final { text: text.clone() },
                                observations,
                                result_text: text.trim().to_string(),
                                error: None,
                            };
                        }
                        Action::Malformed { raw_text } => {
                            tracing::debug!(step = step_index, "malformed action, using raw text as result");
                            let result_text = raw_text.trim().to_string();
                            return StepResult {
                                step_index,
                                thought,
                                action: Action::Malformed { raw_text },
                                observations,
                                result_text,
                                error: None,
                            };
                        }
                        Action::ToolCall { tool_name, argument } => {
                            if tool_rounds >= self.max_tool_rounds {
                                tracing::info!(
                                    step = step_index,
                                    rounds = tool_rounds,
                                    "tool round limit reached, forcing termination"
                                );
                                let result_text = observations
                                    .last()
                                    .map(Observation::as_context)
                                    .unwrap_or_else(|| raw.trim().to_string());
                                return StepResult {
                                    step_index,
                                    thought,
                                    action: Action::ToolCall { tool_name, argument },
                                    observations,
                                    result_text,
                                    error: None,
                                };
                            }
                            SolverState::Observe {
                                prompt,
                                raw,
                                tool_name,
                                argument,
                            }
                        }
                    }
                }
                SolverState::Observe {
                    prompt,
                    raw,
                    tool_name,
                    argument,
                } => {
                    tool_rounds += 1;
                    let obs = self.executor.execute(&tool_name, &argument).await;
                    let observation_text = obs.as_context();
                    let next = render(
                        &self.templates.observation,
                        &[
                            ("tool", tool_name.as_str()),
                            ("observation", observation_text.as_str()),
                            ("output", raw.trim()),
                            ("prompt", prompt.as_str()),
                        ],
                    );
                    observations.push(obs);
                    SolverState::Think { prompt: next }
                }
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ToolErrorKind;
    use crate::llm::{FailingLlmClient, HashEmbedder, LlmClient, LlmError, RetryPolicy, ScriptedLlmClient};
    use crate::tools::{CalculatorTool, ToolRegistry};

    fn solver(client: Arc<dyn LlmClient>) -> StepSolver {
        let gateway = Arc::new(
            ModelGateway::new(client, Arc::new(HashEmbedder::default()))
                .with_retry_policy(RetryPolicy::immediate(1)),
        );
        let mut registry = ToolRegistry::new();
        registry.register(CalculatorTool);
        StepSolver::new(gateway, Arc::new(ToolExecutor::new(registry, 5)))
    }

    fn ctx<'a>(pad: &'a Scratchpad) -> StepContext<'a> {
        StepContext {
            query: "Calcule 123 * 47",
            step_index: 0,
            step: "Multiply 123 by 47",
            scratchpad: pad,
        }
    }

    #[tokio::test]
    async fn test_final_answer_directly() {
        let client = Arc::new(ScriptedLlmClient::new([r#"{"final_answer": "42"}"#]));
        let pad = Scratchpad::new();
        let r = solver(client).solve(&ctx(&pad)).await;
        assert_eq!(r.result_text, "42");
        assert!(r.action.is_final());
        assert!(!r.used_tools());
    }

    #[tokio::test]
    async fn test_tool_round_then_final() {
        let client = Arc::new(ScriptedLlmClient::new([
            "Thought: multiply\ncalculator: 123*47",
            r#"{"final_answer": "123 * 47 = 5781"}"#,
        ]));
        let pad = Scratchpad::new();
        let r = solver(client.clone()).solve(&ctx(&pad)).await;
        assert_eq!(r.thought, "multiply");
        assert_eq!(r.observation().map(|o| o.output.clone()), Some(Ok("5781".to_string())));
        assert_eq!(r.result_text, "123 * 47 = 5781");
        let prompts = client.prompts();
        assert_eq!(prompts.len(), 2);
        assert!(prompts[1].contains("Observation from calculator: 5781"));
        assert!(prompts[0].contains("Step 1: Multiply 123 by 47"));
    }

    #[tokio::test]
    async fn test_tool_rounds_are_bounded() {
        let client = Arc::new(
            ScriptedLlmClient::new(["calculator: 1+1"]).with_fallback(Ok("calculator: 2+2".to_string())),
        );
        let pad = Scratchpad::new();
        let r = solver(client.clone()).solve(&ctx(&pad)).await;
        assert_eq!(r.observations.len(), 2);
        assert_eq!(client.call_count(), 3);
        assert!(r.action.is_tool_call());
        assert_eq!(r.result_text, "4");
    }

    #[tokio::test]
    async fn test_braces_in_query_and_output_reach_the_model_verbatim() {
        let client = Arc::new(ScriptedLlmClient::new([
            "Thought: about {step}\ncalculator: 2+2",
            r#"{"final_answer": "4"}"#,
        ]));
        let pad = Scratchpad::new();
        let ctx = StepContext {
            query: "What does {step} and {scratchpad} mean?",
            step_index: 0,
            step: "Multiply",
            scratchpad: &pad,
        };
        solver(client.clone()).solve(&ctx).await;
        let prompts = client.prompts();
        assert!(prompts[0].contains("Overall request: What does {step} and {scratchpad} mean?"));
        assert!(prompts[1].contains("Thought: about {step}"));
        assert!(prompts[1].contains("Overall request: What does {step} and {scratchpad} mean?"));
    }

    #[tokio::test]
    async fn test_malformed_output_becomes_result() {
        let client = Arc::new(ScriptedLlmClient::new(["La photosynthèse convertit la lumière."]));
        let pad = Scratchpad::new();
        let r = solver(client).solve(&ctx(&pad)).await;
        assert!(r.action.is_malformed());
        assert_eq!(r.result_text, "La photosynthèse convertit la lumière.");
    }

    #[tokio::test]
    async fn test_tool_error_is_recorded() {
        let client = Arc::new(ScriptedLlmClient::new([
            "calculator: __import__('os')",
            r#"{"final_answer": "could not compute"}"#,
        ]));
        let pad = Scratchpad::new();
        let r = solver(client).solve(&ctx(&pad)).await;
        assert_eq!(
            r.observation().and_then(|o| o.error()).map(|e| e.kind),
            Some(ToolErrorKind::InvalidExpression)
        );
    }

    #[tokio::test]
    async fn test_model_unavailable_yields_empty_result_with_error() {
        let client = Arc::new(FailingLlmClient::new(LlmError::Timeout));
        let pad = Scratchpad::new();
        let r = solver(client).solve(&ctx(&pad)).await;
        assert!(r.result_text.is_empty());
        assert!(r.error.is_some());
        assert!(r.action.is_malformed());
    }
}
