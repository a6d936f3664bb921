//! 核心编排层：错误类型与 Orchestrator 主控循环

pub mod error;
pub mod orchestrator;

pub use error::{ReasonError, ToolError, ToolErrorKind};
pub use orchestrator::{describe_plan, Orchestrator, OrchestratorBuilder};
