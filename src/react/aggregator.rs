//! Aggregator：把每一步最后一次尝试的结果合并为最终答案
//!
//! 按步骤顺序包含所有步骤的结果，不论 PASS / FAIL。
//! - concat：单步且 PASS 时直接返回该步结果；否则逐步拼接，FAIL 的步骤附带原因
//! - summarize：请模型总结，模型不可用或返回空白时退化为 concat

use std::sync::Arc;

use serde::Serialize;
use uuid::Uuid;

use crate::config::AggregationMode;
use crate::llm::ModelGateway;
use crate::react::prompts::render;
use crate::react::{Plan, PromptTemplates, Scratchpad};

/// 本次运行的 token 增量
///
/// 由网关累计计数在运行前后的两次读数求差；多个运行并发共享同一网关时，
/// 这段时间内其它运行消耗的 token 也会计入，只能视为近似值。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunTokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

impl RunTokenUsage {
    /// 由运行前后两次累计值求差
    pub fn delta(before: (u64, u64, u64), after: (u64, u64, u64)) -> Self {
        Self {
            prompt_tokens: after.0.saturating_sub(before.0),
            completion_tokens: after.1.saturating_sub(before.1),
            total_tokens: after.2.saturating_sub(before.2),
        }
    }
}

/// 一次运行的最终输出
#[derive(Debug, Clone, Serialize)]
pub struct ReasoningResult {
    pub run_id: Uuid,
    pub plan: Plan,
    pub scratchpad: Scratchpad,
    pub final_answer: String,
    /// 共享网关的并发运行下为近似值
    pub token_usage: RunTokenUsage,
}

impl ReasoningResult {
    /// 是否所有步骤的最后一次尝试都通过校验
    pub fn all_passed(&self) -> bool {
        (0..self.plan.len()).all(|i| {
            self.scratchpad
                .last_attempt(i)
                .map(|e| e.passed())
                .unwrap_or(false)
        })
    }
}

pub struct Aggregator {
    mode: AggregationMode,
    gateway: Option<Arc<ModelGateway>>,
    template: String,
}

impl Aggregator {
    /// 仅拼接，不调用模型
    pub fn concat() -> Self {
        Self {
            mode: AggregationMode::Concat,
            gateway: None,
            template: PromptTemplates::default().summarize,
        }
    }

    pub fn new(mode: AggregationMode, gateway: Arc<ModelGateway>) -> Self {
        Self {
            mode,
            gateway: Some(gateway),
            template: PromptTemplates::default().summarize,
        }
    }

    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.template = template.into();
        self
    }

    pub fn mode(&self) -> AggregationMode {
        self.mode
    }

    /// 单步结果正文；FAIL 时附带原因
    fn step_body(scratchpad: &Scratchpad, step_index: usize) -> String {
        let Some(e) = scratchpad.last_attempt(step_index) else {
            return "(not executed)".to_string();
        };
        let text = e.result.trim();
        let mut body = if text.is_empty() { "(no result)" } else { text }.to_string();
        if !e.passed() {
            let reason = e.reason.as_deref().unwrap_or("verification failed");
            body.push_str(&format!("\n(unverified: {})", reason));
        }
        body
    }

    /// 拼接各步最后一次尝试的结果
    pub fn concat_results(plan: &Plan, scratchpad: &Scratchpad) -> String {
        if plan.len() == 1 {
            return match scratchpad.last_attempt(0) {
                Some(e) if e.passed() => e.result.trim().to_string(),
                _ => Self::step_body(scratchpad, 0),
            };
        }
        plan.steps()
            .iter()
            .enumerate()
            .map(|(i, step)| format!("[Step {}] {}\n{}", i + 1, step, Self::step_body(scratchpad, i)))
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    async fn summarize(&self, plan: &Plan, concatenated: &str) -> Option<String> {
        let gateway = self.gateway.as_ref()?;
        let prompt = render(
            &self.template,
            &[("results", concatenated), ("query", plan.query.as_str())],
        );
        match gateway.generate_default(&prompt).await {
            Ok(text) if !text.trim().is_empty() => Some(text.trim().to_string()),
            Ok(_) => {
                tracing::warn!("summary was blank, falling back to concatenation");
                None
            }
            Err(e) => {
                tracing::warn!(error = %e, "summary failed, falling back to concatenation");
                None
            }
        }
    }

    pub async fn aggregate(&self, plan: &Plan, scratchpad: Scratchpad) -> ReasoningResult {
        let concatenated = Self::concat_results(plan, &scratchpad);
        let final_answer = match self.mode {
            AggregationMode::Concat => concatenated,
            AggregationMode::Summarize => self
                .summarize(plan, &concatenated)
                .await
                .unwrap_or(concatenated),
        };
        ReasoningResult {
            run_id: Uuid::new_v4(),
            plan: plan.clone(),
            scratchpad,
            final_answer,
            token_usage: RunTokenUsage::default(),
        }
    }
}
