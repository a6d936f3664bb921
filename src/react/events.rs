//! 推理过程事件：用于流式展示规划、思考、工具调用、观察、校验与修复

use serde::Serialize;

use crate::react::VerificationStatus;

/// 单次运行的过程事件（可序列化为 JSON 供前端展示）
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReasoningEvent {
    /// 计划生成完毕
    PlanReady { steps: Vec<String>, fallback: bool },
    /// 开始某一步骤的某次尝试
    StepStarted {
        step_index: usize,
        attempt_index: usize,
        step: String,
    },
    /// 模型的思考内容
    Thinking { step_index: usize, text: String },
    /// 调用工具
    ToolCall {
        step_index: usize,
        tool: String,
        argument: String,
    },
    /// 工具返回（预览，避免过长）
    Observation {
        step_index: usize,
        tool: String,
        preview: String,
        is_error: bool,
    },
    /// 校验结果
    Verified {
        step_index: usize,
        attempt_index: usize,
        status: VerificationStatus,
        reason: Option<String>,
    },
    /// 进入修复
    Repair {
        step_index: usize,
        attempt_index: usize,
        reason: String,
    },
    /// 步骤结束（最后一次尝试的结果）
    StepFinished {
        step_index: usize,
        attempts: usize,
        passed: bool,
    },
    /// 聚合完成
    Aggregated { final_answer: String },
    /// 错误
    Error { text: String },
}
