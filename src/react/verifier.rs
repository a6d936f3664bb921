//! Verifier：按规则校验 StepResult
//!
//! 基线规则：模型调用失败、最后一次工具调用返回 ToolError、或结果为空白时 FAIL，否则 PASS。
//! 规则可插拔（VerificationCheck），按顺序执行，第一个失败的规则给出原因并短路。

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::react::StepResult;

/// 校验状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum VerificationStatus {
    Pass,
    Fail,
}

/// 校验结果；FAIL 时 reason 必有
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationOutcome {
    pub status: VerificationStatus,
    pub reason: Option<String>,
}

impl VerificationOutcome {
    pub fn pass() -> Self {
        Self {
            status: VerificationStatus::Pass,
            reason: None,
        }
    }

    pub fn fail(reason: impl Into<String>) -> Self {
        Self {
            status: VerificationStatus::Fail,
            reason: Some(reason.into()),
        }
    }

    pub fn is_pass(&self) -> bool {
        self.status == VerificationStatus::Pass
    }

    pub fn is_fail(&self) -> bool {
        self.status == VerificationStatus::Fail
    }
}

/// 单条校验规则：返回 Some(reason) 表示失败
#[async_trait]
pub trait VerificationCheck: Send + Sync {
    fn name(&self) -> &str;

    async fn check(&self, result: &StepResult) -> Option<String>;
}

/// 模型调用失败（重试耗尽）
pub struct NoModelError;

#[async_trait]
impl VerificationCheck for NoModelError {
    fn name(&self) -> &str {
        "no_model_error"
    }

    async fn check(&self, result: &StepResult) -> Option<String> {
        result
            .error
            .as_ref()
            .map(|e| format!("model call failed: {}", e))
    }
}

/// 步骤以 ToolError 结束
pub struct NoToolError;

#[async_trait]
impl VerificationCheck for NoToolError {
    fn name(&self) -> &str {
        "no_tool_error"
    }

    async fn check(&self, result: &StepResult) -> Option<String> {
        let obs = result.observations.last()?;
        obs.error()
            .map(|e| format!("tool {} failed: {}", obs.tool_name, e))
    }
}

/// 结果不能为空白
pub struct NonEmptyResult;

#[async_trait]
impl VerificationCheck for NonEmptyResult {
    fn name(&self) -> &str {
        "non_empty_result"
    }

    async fn check(&self, result: &StepResult) -> Option<String> {
        result
            .result_text
            .trim()
            .is_empty()
            .then(|| "result is empty".to_string())
    }
}

/// Verifier：持有有序的校验规则
#[derive(Clone)]
pub struct Verifier {
    checks: Vec<Arc<dyn VerificationCheck>>,
}

impl Default for Verifier {
    fn default() -> Self {
        Self {
            checks: vec![
                Arc::new(NoModelError),
                Arc::new(NoToolError),
                Arc::new(NonEmptyResult),
            ],
        }
    }
}

impl Verifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// 不含任何规则的 Verifier
    pub fn empty() -> Self {
        Self { checks: Vec::new() }
    }

    /// 在已有规则之后追加一条
    pub fn with_check(mut self, check: impl VerificationCheck + 'static) -> Self {
        self.checks.push(Arc::new(check));
        self
    }

    pub fn check_names(&self) -> Vec<String> {
        self.checks.iter().map(|c| c.name().to_string()).collect()
    }

    pub async fn verify(&self, result: &StepResult) -> VerificationOutcome {
        for check in &self.checks {
            if let Some(reason) = check.check(result).await {
                tracing::debug!(check = check.name(), step = result.step_index, %reason, "verification failed");
                return VerificationOutcome::fail(reason);
            }
        }
        VerificationOutcome::pass()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ToolError;
    use crate::react::Action;
    use crate::tools::Observation;

    fn result(text: &str) -> StepResult {
        StepResult {
            step_index: 0,
            thought: String::new(),
            action: Action::Final {
                text: text.to_string(),
            },
            observations: Vec::new(),
            result_text: text.to_string(),
            error: None,
        }
    }

    #[tokio::test]
    async fn test_empty_result_fails_with_reason() {
        let v = Verifier::new();
        for text in ["", "   ", "\n\t"] {
            let outcome = v.verify(&result(text)).await;
            assert!(outcome.is_fail());
            assert!(!outcome.reason.unwrap_or_default().is_empty());
        }
    }

    #[tokio::test]
    async fn test_non_empty_result_passes() {
        let outcome = Verifier::new().verify(&result("5781")).await;
        assert_eq!(outcome, VerificationOutcome::pass());
    }

    #[tokio::test]
    async fn test_tool_error_fails() {
        let mut r = result("some text");
        r.observations
            .push(Observation::failure("calculator", "1/0", ToolError::evaluation("division by zero")));
        let outcome = Verifier::new().verify(&r).await;
        assert!(outcome.is_fail());
        assert!(outcome.reason.unwrap().contains("calculator"));
    }

    #[tokio::test]
    async fn test_recovered_tool_error_passes() {
        let mut r = result("9");
        r.observations
            .push(Observation::failure("calculator", "x", ToolError::invalid_expression("bad")));
        r.observations.push(Observation::success("calculator", "4+5", "9"));
        assert!(Verifier::new().verify(&r).await.is_pass());
    }

    #[tokio::test]
    async fn test_custom_check_short_circuits_in_order() {
        struct MustMentionNumber;

        #[async_trait]
        impl VerificationCheck for MustMentionNumber {
            fn name(&self) -> &str {
                "must_mention_number"
            }

            async fn check(&self, result: &StepResult) -> Option<String> {
                (!result.result_text.chars().any(|c| c.is_ascii_digit()))
                    .then(|| "no number in result".to_string())
            }
        }

        let v = Verifier::new().with_check(MustMentionNumber);
        assert_eq!(
            v.check_names(),
            vec!["no_model_error", "no_tool_error", "non_empty_result", "must_mention_number"]
        );
        let outcome = v.verify(&result("")).await;
        assert_eq!(outcome.reason.as_deref(), Some("result is empty"));
        let outcome = v.verify(&result("photosynthesis")).await;
        assert_eq!(outcome.reason.as_deref(), Some("no number in result"));
        assert!(Verifier::empty().verify(&result("")).await.is_pass());
    }
}
