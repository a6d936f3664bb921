//! Planner：将查询拆解为有序步骤
//!
//! 一次模型调用，要求返回结构化步骤列表。解析顺序：
//! (a) 整段文本直接解析；(b) 在原文中查找嵌入的结构化片段并解析；(c) 退化为仅含原始查询的单步计划。
//! 模型输出格式错误永不报错；只有 Model Gateway 重试耗尽才向上返回 ModelUnavailable。

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::core::ReasonError;
use crate::llm::ModelGateway;
use crate::react::action::extract_json_fragment;
use crate::react::prompts::render;
use crate::react::PromptTemplates;

/// 有序步骤列表；永不为空
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    /// 生成计划的原始查询
    pub query: String,
    steps: Vec<String>,
    /// 是否为退化的单步计划
    pub fallback: bool,
}

impl Plan {
    /// 退化计划：原样包含查询
    pub fn fallback(query: &str) -> Self {
        Self {
            query: query.to_string(),
            steps: vec![query.to_string()],
            fallback: true,
        }
    }

    /// 由步骤构建；去除空白步骤，结果为空时退化为单步计划
    pub fn from_steps(query: &str, steps: Vec<String>) -> Self {
        let steps: Vec<String> = steps
            .into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        if steps.is_empty() {
            return Self::fallback(query);
        }
        Self {
            query: query.to_string(),
            steps,
            fallback: false,
        }
    }

    pub fn steps(&self) -> &[String] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// 计划永不为空，恒为 false
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// 单个步骤：字符串或 {"description": "..."}
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum StepItem {
    Text(String),
    Described { description: String },
}

impl StepItem {
    fn into_text(self) -> String {
        match self {
            StepItem::Text(s) => s,
            StepItem::Described { description } => description,
        }
    }
}

/// 计划记录：{"steps": [...]} 或裸数组
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PlanRecord {
    Object { steps: Vec<StepItem> },
    List(Vec<StepItem>),
}

fn parse_plan_record(text: &str) -> Option<Vec<String>> {
    let record: PlanRecord = serde_json::from_str(text.trim()).ok()?;
    let items = match record {
        PlanRecord::Object { steps } => steps,
        PlanRecord::List(items) => items,
    };
    let steps: Vec<String> = items
        .into_iter()
        .map(StepItem::into_text)
        .filter(|s| !s.trim().is_empty())
        .collect();
    (!steps.is_empty()).then_some(steps)
}

/// 在原文中查找结构化片段：```json 代码块、`{...}` 或 `[...]`
fn find_embedded_record(text: &str) -> Option<Vec<String>> {
    if let Some(steps) = extract_json_fragment(text).and_then(parse_plan_record) {
        return Some(steps);
    }
    let start = text.find('[')?;
    let end = text.rfind(']')?;
    if end <= start {
        return None;
    }
    parse_plan_record(&text[start..=end])
}

/// 解析模型输出为步骤；三级回退，永不失败
pub fn parse_plan(query: &str, output: &str, max_steps: usize) -> Plan {
    let steps = parse_plan_record(output).or_else(|| find_embedded_record(output));
    match steps {
        Some(mut steps) => {
            steps.truncate(max_steps.max(1));
            Plan::from_steps(query, steps)
        }
        None => {
            tracing::debug!("plan output unparseable, falling back to single-step plan");
            Plan::fallback(query)
        }
    }
}

/// Planner：持有网关与规划模板
pub struct Planner {
    gateway: Arc<ModelGateway>,
    template: String,
    tools: String,
    max_steps: usize,
}

impl Planner {
    pub fn new(gateway: Arc<ModelGateway>) -> Self {
        Self {
            gateway,
            template: PromptTemplates::default().plan,
            tools: "(none)".to_string(),
            max_steps: 8,
        }
    }

    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.template = template.into();
        self
    }

    /// Available tools 段落（规划时告知模型有哪些能力）
    pub fn with_tools_section(mut self, tools: impl Into<String>) -> Self {
        self.tools = tools.into();
        self
    }

    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps.max(1);
        self
    }

    pub async fn plan(&self, query: &str) -> Result<Plan, ReasonError> {
        let max_steps = self.max_steps.to_string();
        let prompt = render(
            &self.template,
            &[
                ("max_steps", max_steps.as_str()),
                ("tools", self.tools.as_str()),
                ("query", query),
            ],
        );
        let output = self.gateway.generate_default(&prompt).await?;
        let plan = parse_plan(query, &output, self.max_steps);
        tracing::info!(steps = plan.len(), fallback = plan.fallback, "plan ready");
        Ok(plan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{FailingLlmClient, HashEmbedder, LlmError, RetryPolicy, ScriptedLlmClient};

    #[test]
    fn test_direct_parse() {
        let plan = parse_plan("q", r#"{"steps": ["a", "b"]}"#, 8);
        assert_eq!(plan.steps(), &["a".to_string(), "b".to_string()]);
        assert!(!plan.fallback);

        let plan = parse_plan("q", r#"[{"description": "only"}]"#, 8);
        assert_eq!(plan.steps(), &["only".to_string()]);
    }

    #[test]
    fn test_embedded_fragment() {
        let out = "Voici le plan :\n```json\n{\"steps\": [\"Calculer 123*47\"]}\n```\nBonne chance";
        let plan = parse_plan("Calcule 123 * 47", out, 8);
        assert_eq!(plan.steps(), &["Calculer 123*47".to_string()]);

        let plan = parse_plan("q", "Steps: [\"x\", \"y\"] done", 8);
        assert_eq!(plan.len(), 2);
    }

    #[test]
    fn test_fallback_wraps_query_verbatim() {
        for out in ["", "no structure here", "{\"steps\": []}", "[\"  \"]", "{\"steps\": 3}", "[1, 2]"] {
            let plan = parse_plan("Explique la photosynthèse", out, 8);
            assert_eq!(plan.steps(), &["Explique la photosynthèse".to_string()]);
            assert!(plan.fallback);
            assert!(!plan.is_empty());
        }
    }

    #[test]
    fn test_truncates_to_max_steps() {
        let plan = parse_plan("q", r#"["a", "b", "c", "d"]"#, 2);
        assert_eq!(plan.len(), 2);
    }

    #[tokio::test]
    async fn test_plan_uses_gateway() {
        let client = Arc::new(ScriptedLlmClient::new([r#"{"steps": ["one"]}"#]));
        let gateway = Arc::new(ModelGateway::new(client.clone(), Arc::new(HashEmbedder::default())));
        let plan = Planner::new(gateway).plan("do one thing").await.unwrap();
        assert_eq!(plan.steps(), &["one".to_string()]);
        assert!(client.prompts()[0].contains("do one thing"));
    }

    #[tokio::test]
    async fn test_model_unavailable_propagates() {
        let gateway = Arc::new(
            ModelGateway::new(
                Arc::new(FailingLlmClient::new(LlmError::RateLimited)),
                Arc::new(HashEmbedder::default()),
            )
            .with_retry_policy(RetryPolicy::immediate(2)),
        );
        let err = Planner::new(gateway).plan("q").await.unwrap_err();
        assert!(err.is_model_unavailable());
    }
}
