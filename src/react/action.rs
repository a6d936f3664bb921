//! 动作文法与解析
//!
//! 模型输出按行扫描：以已声明的工具名开头、后跟 `:` 与参数的行是 ToolCall（可带 `Action:` 前缀）；
//! 否则若文本（或其中的 JSON 片段）是合法的结构化记录（含字符串类型的 `final_answer` 或 `result`），则为 Final；
//! 其余一律为 Malformed，保留原文。解析永不失败，看似结构化但未通过 schema 校验的文本同样是 Malformed。

use std::sync::OnceLock;

use regex::Regex;
use schemars::{schema_for, JsonSchema};
use serde::{Deserialize, Serialize};

/// 模型输出对应的指令
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    /// 最终答案
    Final { text: String },
    /// 调用工具
    ToolCall { tool_name: String, argument: String },
    /// 无法解析；保留原文用于诊断
    Malformed { raw_text: String },
}

impl Action {
    pub fn is_final(&self) -> bool {
        matches!(self, Action::Final { .. })
    }

    pub fn is_tool_call(&self) -> bool {
        matches!(self, Action::ToolCall { .. })
    }

    pub fn is_malformed(&self) -> bool {
        matches!(self, Action::Malformed { .. })
    }
}

/// 解析结果：思考内容 + 动作
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedOutput {
    pub thought: String,
    pub action: Action,
}

/// 最终答案记录（用于 schema 校验与注入 prompt）
#[derive(Debug, Deserialize, JsonSchema)]
pub struct FinalAnswerRecord {
    /// 推理过程（可选）
    pub thought: Option<String>,
    /// 本步骤的最终答案
    pub final_answer: Option<String>,
    /// final_answer 的别名
    pub result: Option<String>,
}

/// JSON 形式的工具调用：{"tool": "calculator", "argument": "1+2"}
#[derive(Debug, Deserialize, JsonSchema)]
pub struct ToolCallRecord {
    pub thought: Option<String>,
    /// 工具名
    pub tool: String,
    /// 单个文本参数
    pub argument: String,
}

/// 返回最终答案记录的 JSON Schema 字符串，可拼入 prompt
pub fn final_answer_schema_json() -> String {
    let schema = schema_for!(FinalAnswerRecord);
    serde_json::to_string_pretty(&schema).unwrap_or_default()
}

fn action_line_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\s*(?:[-*>]\s*)?(?:(?i:action)\s*:\s*)?([A-Za-z_][A-Za-z0-9_\-]*)\s*:\s*(.*)$")
            .expect("static regex")
    })
}

/// 从文本中提取 JSON 片段（```json ... ``` 或首个 `{` 到最后一个 `}`）
pub(crate) fn extract_json_fragment(text: &str) -> Option<&str> {
    let trimmed = text.trim();
    if let Some(start) = trimmed.find("```json") {
        let rest = &trimmed[start + 7..];
        return Some(rest.find("```").map(|end| rest[..end].trim()).unwrap_or(rest.trim()));
    }
    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    (end > start).then(|| &trimmed[start..=end])
}

fn clean_argument(arg: &str) -> String {
    let arg = arg.trim();
    let arg = arg.trim_matches('`');
    let arg = arg
        .strip_prefix('"')
        .and_then(|a| a.strip_suffix('"'))
        .unwrap_or(arg);
    arg.trim().to_string()
}

fn clean_thought(lines: &[&str]) -> String {
    let text = lines.join("\n");
    let text = text.trim();
    let text = text
        .strip_prefix("Thought:")
        .or_else(|| text.strip_prefix("thought:"))
        .unwrap_or(text);
    text.trim().to_string()
}

/// 动作解析器：持有已声明的工具名（行前缀）
#[derive(Debug, Clone, Default)]
pub struct ActionParser {
    tool_names: Vec<String>,
}

impl ActionParser {
    pub fn new<I, S>(tool_names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tool_names: tool_names.into_iter().map(Into::into).collect(),
        }
    }

    pub fn tool_names(&self) -> &[String] {
        &self.tool_names
    }

    fn declared(&self, name: &str) -> Option<&str> {
        self.tool_names
            .iter()
            .find(|t| t.eq_ignore_ascii_case(name))
            .map(String::as_str)
    }

    pub fn parse(&self, raw: &str) -> Action {
        self.parse_output(raw).action
    }

    pub fn parse_output(&self, raw: &str) -> ParsedOutput {
        if let Some(parsed) = self.parse_tool_line(raw) {
            return parsed;
        }
        if let Some(parsed) = parse_structured(raw) {
            return parsed;
        }
        ParsedOutput {
            thought: String::new(),
            action: Action::Malformed {
                raw_text: raw.to_string(),
            },
        }
    }

    fn parse_tool_line(&self, raw: &str) -> Option<ParsedOutput> {
        let lines: Vec<&str> = raw.lines().collect();
        for (idx, line) in lines.iter().enumerate() {
            let Some(caps) = action_line_regex().captures(line) else {
                continue;
            };
            let Some(tool) = self.declared(&caps[1]) else {
                continue;
            };
            let argument = clean_argument(&caps[2]);
            if argument.is_empty() {
                continue;
            }
            return Some(ParsedOutput {
                thought: clean_thought(&lines[..idx]),
                action: Action::ToolCall {
                    tool_name: tool.to_string(),
                    argument,
                },
            });
        }
        None
    }
}

fn parse_structured(raw: &str) -> Option<ParsedOutput> {
    let fragment = extract_json_fragment(raw)?;
    let value: serde_json::Value = serde_json::from_str(fragment).ok()?;
    let obj = value.as_object()?;
    let before = raw.find(fragment).map(|i| &raw[..i]).unwrap_or("");
    let before = before.trim().trim_end_matches("```json").trim();

    if obj.contains_key("tool") {
        let record: ToolCallRecord = serde_json::from_value(value).ok()?;
        if record.tool.trim().is_empty() || record.argument.trim().is_empty() {
            return None;
        }
        return Some(ParsedOutput {
            thought: record
                .thought
                .unwrap_or_else(|| clean_thought(&[before])),
            action: Action::ToolCall {
                tool_name: record.tool.trim().to_string(),
                argument: record.argument.trim().to_string(),
            },
        });
    }

    let record: FinalAnswerRecord = serde_json::from_value(value).ok()?;
    let text = record.final_answer.or(record.result)?;
    Some(ParsedOutput {
        thought: record.thought.unwrap_or_else(|| clean_thought(&[before])),
        action: Action::Final { text },
    })
}
