//! Reasoner - Rust 多步推理编排引擎
//!
//! 模块划分：
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误类型与 Orchestrator 主控循环
//! - **llm**: LLM 客户端抽象、重试策略与 Model Gateway（OpenAI 兼容 / Mock）
//! - **observability**: tracing 初始化
//! - **react**: 动作解析、Planner、Step Solver、Verifier、Reflector、Aggregator、Scratchpad
//! - **retrieval**: 向量库、文档分块与 Retrieval Adapter
//! - **tools**: 工具箱（calculator、search）、注册表与执行器

pub mod config;
pub mod core;
pub mod llm;
pub mod observability;
pub mod react;
pub mod retrieval;
pub mod tools;

pub use crate::core::{Orchestrator, OrchestratorBuilder, ReasonError};
pub use crate::react::{Plan, ReasoningResult, Scratchpad};
