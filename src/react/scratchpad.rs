//! Scratchpad：一次运行的完整执行轨迹
//!
//! 每个步骤的每次尝试追加一条 ScratchpadEntry；条目追加后不再修改（修复是新条目，而不是编辑）。
//! 只有 Orchestrator 写入；其它组件通过 render 得到只读快照拼入 prompt。
//! 导出格式为 JSON Lines，每行一条记录。

use std::io::Write;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::react::{Action, StepResult, VerificationOutcome, VerificationStatus};
use crate::tools::executor::preview;
use crate::tools::Observation;

/// 一次步骤尝试的记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScratchpadEntry {
    /// 步骤序号（从 0 开始）
    pub step_index: usize,
    /// 尝试序号（0 为首次，之后为修复）
    pub attempt_index: usize,
    /// 步骤描述
    pub step: String,
    pub thought: String,
    pub action: Action,
    /// 本次尝试中的全部工具观察（按时间顺序）
    pub observations: Vec<Observation>,
    pub result: String,
    pub verification_status: VerificationStatus,
    /// FAIL 时的原因
    pub reason: Option<String>,
    /// 模型调用失败时的错误信息
    pub error: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

impl ScratchpadEntry {
    pub fn new(
        step: &str,
        attempt_index: usize,
        result: &StepResult,
        outcome: &VerificationOutcome,
    ) -> Self {
        Self {
            step_index: result.step_index,
            attempt_index,
            step: step.to_string(),
            thought: result.thought.clone(),
            action: result.action.clone(),
            observations: result.observations.clone(),
            result: result.result_text.clone(),
            verification_status: outcome.status,
            reason: outcome.reason.clone(),
            error: result.error.clone(),
            recorded_at: Utc::now(),
        }
    }

    pub fn passed(&self) -> bool {
        self.verification_status == VerificationStatus::Pass
    }

    /// 最后一次工具观察
    pub fn observation(&self) -> Option<&Observation> {
        self.observations.last()
    }
}

/// 有序、只追加的轨迹
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Scratchpad {
    entries: Vec<ScratchpadEntry>,
}

impl Scratchpad {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加一条完整记录；仅 Orchestrator 调用
    pub(crate) fn push(&mut self, entry: ScratchpadEntry) {
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[ScratchpadEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 某一步骤的全部尝试（按时间顺序）
    pub fn attempts_for(&self, step_index: usize) -> Vec<&ScratchpadEntry> {
        self.entries
            .iter()
            .filter(|e| e.step_index == step_index)
            .collect()
    }

    /// 某一步骤的最后一次尝试
    pub fn last_attempt(&self, step_index: usize) -> Option<&ScratchpadEntry> {
        self.entries.iter().rev().find(|e| e.step_index == step_index)
    }

    /// 拼入 prompt 的文本快照；每个字段截断到 preview_chars
    pub fn render(&self, preview_chars: usize) -> String {
        if self.entries.is_empty() {
            return "(none)".to_string();
        }
        let mut out = String::new();
        for e in &self.entries {
            let status = match e.verification_status {
                VerificationStatus::Pass => "PASS",
                VerificationStatus::Fail => "FAIL",
            };
            out.push_str(&format!(
                "Step {} (attempt {}) [{}]: {}\n",
                e.step_index + 1,
                e.attempt_index + 1,
                status,
                e.step
            ));
            for obs in &e.observations {
                out.push_str(&format!(
                    "  Tool {}({}) -> {}\n",
                    obs.tool_name,
                    preview(&obs.argument, preview_chars),
                    preview(&obs.as_context(), preview_chars)
                ));
            }
            out.push_str(&format!("  Result: {}\n", preview(&e.result, preview_chars)));
            if let Some(reason) = &e.reason {
                out.push_str(&format!("  Failure: {}\n", reason));
            }
        }
        out.trim_end().to_string()
    }

    /// 导出为 JSON Lines
    pub fn to_jsonl(&self) -> Result<String, serde_json::Error> {
        let mut out = String::new();
        for e in &self.entries {
            out.push_str(&serde_json::to_string(e)?);
            out.push('\n');
        }
        Ok(out)
    }

    pub fn write_jsonl<W: Write>(&self, mut writer: W) -> std::io::Result<()> {
        for e in &self.entries {
            serde_json::to_writer(&mut writer, e)?;
            writer.write_all(b"\n")?;
        }
        writer.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(step_index: usize, attempt_index: usize, result: &str, pass: bool) -> ScratchpadEntry {
        let step_result = StepResult {
            step_index,
            thought: String::new(),
            action: Action::Final {
                text: result.to_string(),
            },
            observations: vec![Observation::success("calculator", "123*47", "5781")],
            result_text: result.to_string(),
            error: None,
        };
        let outcome = if pass {
            VerificationOutcome::pass()
        } else {
            VerificationOutcome::fail("empty result")
        };
        ScratchpadEntry::new("multiply", attempt_index, &step_result, &outcome)
    }

    #[test]
    fn test_attempt_lookup() {
        let mut pad = Scratchpad::new();
        pad.push(entry(0, 0, "", false));
        pad.push(entry(0, 1, "5781", true));
        pad.push(entry(1, 0, "done", true));
        assert_eq!(pad.attempts_for(0).len(), 2);
        assert_eq!(pad.last_attempt(0).map(|e| e.result.as_str()), Some("5781"));
        assert!(pad.last_attempt(2).is_none());
    }

    #[test]
    fn test_render_truncates_and_marks_status() {
        let mut pad = Scratchpad::new();
        assert_eq!(pad.render(10), "(none)");
        pad.push(entry(0, 0, "a very long result text", false));
        let text = pad.render(6);
        assert!(text.contains("Step 1 (attempt 1) [FAIL]: multiply"));
        assert!(text.contains("Result: a very..."));
        assert!(text.contains("Failure: empty result"));
        assert!(text.contains("Tool calculator(123*47) -> 5781"));
    }

    #[test]
    fn test_jsonl_export_one_record_per_line() {
        let mut pad = Scratchpad::new();
        pad.push(entry(0, 0, "", false));
        pad.push(entry(0, 1, "5781", true));
        let jsonl = pad.to_jsonl().unwrap();
        let lines: Vec<&str> = jsonl.lines().collect();
        assert_eq!(lines.len(), 2);
        let second: ScratchpadEntry = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second.attempt_index, 1);
        assert_eq!(second.verification_status, VerificationStatus::Pass);

        let mut buf = Vec::new();
        pad.write_jsonl(&mut buf).unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), jsonl);
    }
}
