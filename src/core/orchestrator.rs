//! 推理编排器：主控循环
//!
//! plan -> 对每一步：solve -> verify -> (FAIL 且预算未尽) reflect -> verify ... -> aggregate。
//! Scratchpad 由编排器独占写入；每次尝试在校验完成后整条追加。
//! 只有规划调用的 ModelUnavailable 与步骤间取消会终止运行，其余失败都作为 FAIL 记录在轨迹中。

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::AppConfig;
use crate::core::ReasonError;
use crate::llm::ModelGateway;
use crate::react::prompts::tools_section;
use crate::react::{
    Aggregator, Plan, Planner, PromptTemplates, ReasoningEvent, ReasoningResult, Reflector,
    RunTokenUsage, Scratchpad, ScratchpadEntry, StepContext, StepResult, StepSolver, Verifier,
};
use crate::retrieval::RetrievalAdapter;
use crate::tools::executor::preview;
use crate::tools::{CalculatorTool, SearchTool, ToolExecutor, ToolRegistry};

/// 编排器：持有一次运行所需的全部组件，可跨并发运行共享（每次运行独占自己的 Plan 与 Scratchpad）
pub struct Orchestrator {
    gateway: Arc<ModelGateway>,
    planner: Planner,
    solver: Arc<StepSolver>,
    verifier: Verifier,
    reflector: Reflector,
    aggregator: Aggregator,
    preview_chars: usize,
    event_tx: Option<mpsc::UnboundedSender<ReasoningEvent>>,
}

impl Orchestrator {
    pub fn builder(gateway: Arc<ModelGateway>) -> OrchestratorBuilder {
        OrchestratorBuilder::new(gateway)
    }

    /// 按配置构建：注册 calculator，有检索适配器时再注册 search
    pub fn from_config(cfg: &AppConfig, retrieval: Option<Arc<RetrievalAdapter>>) -> Self {
        let gateway = Arc::new(ModelGateway::from_config(cfg));
        let mut builder = OrchestratorBuilder::new(gateway).with_config(cfg);
        if let Some(adapter) = retrieval {
            builder = builder.with_retrieval(adapter);
        }
        builder.build()
    }

    /// 过程事件发送端；发送失败（接收端已关闭）被忽略
    pub fn with_event_tx(mut self, tx: mpsc::UnboundedSender<ReasoningEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    pub fn gateway(&self) -> &Arc<ModelGateway> {
        &self.gateway
    }

    fn send_event(&self, ev: ReasoningEvent) {
        if let Some(tx) = &self.event_tx {
            let _ = tx.send(ev);
        }
    }

    pub async fn run(&self, query: &str) -> Result<ReasoningResult, ReasonError> {
        self.run_with_cancel(query, CancellationToken::new()).await
    }

    /// 运行一次查询；取消在每一步开始前检查
    pub async fn run_with_cancel(
        &self,
        query: &str,
        cancel_token: CancellationToken,
    ) -> Result<ReasoningResult, ReasonError> {
        let usage_before = self.gateway.token_usage();
        tracing::info!(query = %preview(query, 120), "reasoning run started");

        let plan = match self.planner.plan(query).await {
            Ok(plan) => plan,
            Err(e) => {
                tracing::error!(error = %e, "planning failed, aborting run");
                self.send_event(ReasoningEvent::Error { text: e.to_string() });
                return Err(e);
            }
        };
        self.send_event(ReasoningEvent::PlanReady {
            steps: plan.steps().to_vec(),
            fallback: plan.fallback,
        });

        let mut scratchpad = Scratchpad::new();
        for (step_index, step) in plan.steps().iter().enumerate() {
            if cancel_token.is_cancelled() {
                tracing::info!(completed_steps = step_index, "run cancelled");
                self.send_event(ReasoningEvent::Error {
                    text: "Cancelled".to_string(),
                });
                return Err(ReasonError::Cancelled {
                    completed_steps: step_index,
                    scratchpad,
                });
            }
            self.run_step(query, step_index, step, &mut scratchpad).await;
        }

        let mut result = self.aggregator.aggregate(&plan, scratchpad).await;
        result.token_usage = RunTokenUsage::delta(usage_before, self.gateway.token_usage());
        self.send_event(ReasoningEvent::Aggregated {
            final_answer: result.final_answer.clone(),
        });
        tracing::info!(
            run_id = %result.run_id,
            steps = result.plan.len(),
            entries = result.scratchpad.len(),
            all_passed = result.all_passed(),
            "reasoning run finished"
        );
        Ok(result)
    }

    /// 执行一步：首次求解 + 至多 max_retries 次修复；每次尝试追加一条记录
    async fn run_step(&self, query: &str, step_index: usize, step: &str, scratchpad: &mut Scratchpad) {
        let mut attempt_index = 0;
        self.send_event(ReasoningEvent::StepStarted {
            step_index,
            attempt_index,
            step: step.to_string(),
        });
        let mut result = {
            let ctx = StepContext {
                query,
                step_index,
                step,
                scratchpad: &*scratchpad,
            };
            self.solver.solve(&ctx).await
        };

        loop {
            self.report_attempt(&result);
            let outcome = self.verifier.verify(&result).await;
            self.send_event(ReasoningEvent::Verified {
                step_index,
                attempt_index,
                status: outcome.status,
                reason: outcome.reason.clone(),
            });
            scratchpad.push(ScratchpadEntry::new(step, attempt_index, &result, &outcome));

            let passed = outcome.is_pass();
            let reason = match outcome.reason {
                Some(reason) if !passed && self.reflector.has_budget(attempt_index) => reason,
                _ => {
                    if !passed {
                        tracing::warn!(
                            step = step_index,
                            attempts = attempt_index + 1,
                            "retry budget exhausted, keeping failed result"
                        );
                    }
                    self.send_event(ReasoningEvent::StepFinished {
                        step_index,
                        attempts: attempt_index + 1,
                        passed,
                    });
                    return;
                }
            };

            attempt_index += 1;
            self.send_event(ReasoningEvent::Repair {
                step_index,
                attempt_index,
                reason: reason.clone(),
            });
            let ctx = StepContext {
                query,
                step_index,
                step,
                scratchpad: &*scratchpad,
            };
            result = self.reflector.reflect(&ctx, &result, &reason).await;
        }
    }

    fn report_attempt(&self, result: &StepResult) {
        if self.event_tx.is_none() {
            return;
        }
        let step_index = result.step_index;
        if !result.thought.is_empty() {
            self.send_event(ReasoningEvent::Thinking {
                step_index,
                text: result.thought.clone(),
            });
        }
        for obs in &result.observations {
            self.send_event(ReasoningEvent::ToolCall {
                step_index,
                tool: obs.tool_name.clone(),
                argument: obs.argument.clone(),
            });
            self.send_event(ReasoningEvent::Observation {
                step_index,
                tool: obs.tool_name.clone(),
                preview: preview(&obs.as_context(), self.preview_chars),
                is_error: obs.is_error(),
            });
        }
    }
}

/// 编排器构建器：统一工具注册与各组件参数
pub struct OrchestratorBuilder {
    gateway: Arc<ModelGateway>,
    registry: ToolRegistry,
    templates: PromptTemplates,
    verifier: Verifier,
    aggregator: Option<Aggregator>,
    max_retries: usize,
    max_tool_rounds: usize,
    max_plan_steps: usize,
    preview_chars: usize,
    tool_timeout_secs: u64,
}

impl OrchestratorBuilder {
    /// 默认只注册 calculator
    pub fn new(gateway: Arc<ModelGateway>) -> Self {
        let mut registry = ToolRegistry::new();
        registry.register(CalculatorTool);
        Self {
            gateway,
            registry,
            templates: PromptTemplates::default(),
            verifier: Verifier::default(),
            aggregator: None,
            max_retries: 2,
            max_tool_rounds: 2,
            max_plan_steps: 8,
            preview_chars: 400,
            tool_timeout_secs: 30,
        }
    }

    /// 套用 [reasoning] / [tools] / [prompts] 配置
    pub fn with_config(mut self, cfg: &AppConfig) -> Self {
        self.max_retries = cfg.reasoning.max_retries;
        self.max_tool_rounds = cfg.reasoning.max_tool_rounds;
        self.max_plan_steps = cfg.reasoning.max_plan_steps;
        self.preview_chars = cfg.reasoning.scratchpad_preview_chars;
        self.tool_timeout_secs = cfg.tools.tool_timeout_secs;
        self.templates = cfg.prompts.clone();
        self.aggregator = Some(
            Aggregator::new(cfg.reasoning.aggregation, self.gateway.clone())
                .with_template(cfg.prompts.summarize.clone()),
        );
        self
    }

    /// 注册检索工具 search
    pub fn with_retrieval(mut self, adapter: Arc<RetrievalAdapter>) -> Self {
        self.registry.register(SearchTool::new(adapter));
        self
    }

    pub fn with_tool(mut self, tool: impl crate::tools::Tool + 'static) -> Self {
        self.registry.register(tool);
        self
    }

    pub fn with_templates(mut self, templates: PromptTemplates) -> Self {
        self.templates = templates;
        self
    }

    pub fn with_verifier(mut self, verifier: Verifier) -> Self {
        self.verifier = verifier;
        self
    }

    pub fn with_aggregator(mut self, aggregator: Aggregator) -> Self {
        self.aggregator = Some(aggregator);
        self
    }

    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_max_tool_rounds(mut self, rounds: usize) -> Self {
        self.max_tool_rounds = rounds;
        self
    }

    pub fn with_max_plan_steps(mut self, steps: usize) -> Self {
        self.max_plan_steps = steps;
        self
    }

    pub fn with_tool_timeout_secs(mut self, secs: u64) -> Self {
        self.tool_timeout_secs = secs;
        self
    }

    pub fn build(self) -> Orchestrator {
        let tools = tools_section(&self.registry.tool_descriptions());
        let executor = Arc::new(ToolExecutor::new(self.registry, self.tool_timeout_secs));
        tracing::debug!(tools = ?executor.tool_names(), "tools registered");

        let planner = Planner::new(self.gateway.clone())
            .with_template(self.templates.plan.clone())
            .with_tools_section(tools)
            .with_max_steps(self.max_plan_steps);
        let solver = Arc::new(
            StepSolver::new(self.gateway.clone(), executor)
                .with_templates(self.templates)
                .with_max_tool_rounds(self.max_tool_rounds)
                .with_preview_chars(self.preview_chars),
        );
        let reflector = Reflector::new(solver.clone(), self.max_retries);
        let aggregator = self.aggregator.unwrap_or_else(Aggregator::concat);

        Orchestrator {
            gateway: self.gateway,
            planner,
            solver,
            verifier: self.verifier,
            reflector,
            aggregator,
            preview_chars: self.preview_chars,
            event_tx: None,
        }
    }
}

/// 计划摘要，便于日志与 CLI 输出
pub fn describe_plan(plan: &Plan) -> String {
    plan.steps()
        .iter()
        .enumerate()
        .map(|(i, s)| format!("{}. {}", i + 1, s))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{HashEmbedder, ScriptedLlmClient};

    fn gateway(responses: &[&str]) -> (Arc<ScriptedLlmClient>, Arc<ModelGateway>) {
        let client = Arc::new(ScriptedLlmClient::new(responses.iter().copied()));
        let gateway = Arc::new(ModelGateway::new(client.clone(), Arc::new(HashEmbedder::default())));
        (client, gateway)
    }

    #[tokio::test]
    async fn test_events_follow_run_order() {
        let (_, gw) = gateway(&[r#"{"steps": ["Multiply"]}"#, "calculator: 123*47", r#"{"final_answer": "5781"}"#]);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let orch = Orchestrator::builder(gw).build().with_event_tx(tx);
        let result = orch.run("Calcule 123 * 47").await.unwrap();
        assert_eq!(result.final_answer, "5781");
        drop(orch);

        let mut kinds = Vec::new();
        while let Some(ev) = rx.recv().await {
            let v = serde_json::to_value(&ev).unwrap();
            kinds.push(v["type"].as_str().unwrap_or_default().to_string());
        }
        assert_eq!(
            kinds,
            vec!["plan_ready", "step_started", "tool_call", "observation", "verified", "step_finished", "aggregated"]
        );
    }

    #[tokio::test]
    async fn test_prompt_sees_previous_steps() {
        let (client, gw) = gateway(&[
            r#"{"steps": ["first", "second"]}"#,
            r#"{"final_answer": "alpha"}"#,
            r#"{"final_answer": "beta"}"#,
        ]);
        let result = Orchestrator::builder(gw).build().run("q").await.unwrap();
        assert_eq!(result.scratchpad.len(), 2);
        let prompts = client.prompts();
        assert!(prompts[1].contains("Previous steps:\n(none)"));
        assert!(prompts[2].contains("Result: alpha"));
        assert!(result.final_answer.contains("[Step 2] second\nbeta"));
    }

    #[test]
    fn test_describe_plan() {
        let plan = Plan::from_steps("q", vec!["a".into(), "b".into()]);
        assert_eq!(describe_plan(&plan), "1. a\n2. b");
    }
}
