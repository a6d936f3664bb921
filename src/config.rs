//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `REASONER__*` 覆盖（双下划线表示嵌套，如 `REASONER__LLM__PROVIDER=openai`）。
//! 配置作为显式值传入 ModelGateway / Orchestrator 构造函数，不存在全局可变配置。

use std::path::PathBuf;

use serde::Deserialize;

use crate::core::ReasonError;
use crate::react::PromptTemplates;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub llm: LlmSection,
    pub embedding: EmbeddingSection,
    pub reasoning: ReasoningSection,
    pub retrieval: RetrievalSection,
    pub tools: ToolsSection,
    pub prompts: PromptTemplates,
}

impl AppConfig {
    /// 检查无法靠默认值兜底的配置错误
    pub fn validate(&self) -> Result<(), ReasonError> {
        let provider = self.llm.provider.to_lowercase();
        if provider != "openai" && provider != "mock" {
            return Err(ReasonError::ConfigError(format!(
                "unknown llm.provider '{}' (expected openai or mock)",
                self.llm.provider
            )));
        }
        if self.llm.retry.max_attempts == 0 {
            return Err(ReasonError::ConfigError(
                "llm.retry.max_attempts must be at least 1".to_string(),
            ));
        }
        let factor = self.llm.retry.backoff_factor;
        if factor.is_nan() || factor < 1.0 {
            return Err(ReasonError::ConfigError(
                "llm.retry.backoff_factor must be >= 1.0".to_string(),
            ));
        }
        if self.reasoning.max_plan_steps == 0 || self.retrieval.top_k == 0 {
            return Err(ReasonError::ConfigError(
                "reasoning.max_plan_steps and retrieval.top_k must be at least 1".to_string(),
            ));
        }
        if self.retrieval.chunk_overlap >= self.retrieval.chunk_size {
            return Err(ReasonError::ConfigError(
                "retrieval.chunk_overlap must be smaller than retrieval.chunk_size".to_string(),
            ));
        }
        Ok(())
    }
}

/// [llm] 段：后端选择、生成参数与超时
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    /// 后端：openai / mock
    pub provider: String,
    pub model: String,
    pub base_url: Option<String>,
    /// 未设置时读取 OPENAI_API_KEY
    pub api_key: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
    /// 单次请求超时（秒）
    pub request_timeout_secs: u64,
    pub retry: RetrySection,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "gpt-4o-mini".to_string(),
            base_url: None,
            api_key: None,
            temperature: 0.2,
            max_tokens: 1024,
            request_timeout_secs: 60,
            retry: RetrySection::default(),
        }
    }
}

/// [llm.retry] 段：最大尝试次数与指数退避参数
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetrySection {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_factor: f64,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 500,
            max_delay_ms: 8000,
            backoff_factor: 2.0,
        }
    }
}

/// [embedding] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EmbeddingSection {
    pub model: String,
}

impl Default for EmbeddingSection {
    fn default() -> Self {
        Self {
            model: "text-embedding-3-small".to_string(),
        }
    }
}

/// 聚合方式：拼接各步结果，或请模型总结
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AggregationMode {
    #[default]
    Concat,
    Summarize,
}

/// [reasoning] 段：重试预算、工具轮数、规划步数上限
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReasoningSection {
    /// 每步 Reflector 修复次数上限（每步最多 1 + max_retries 次尝试）
    pub max_retries: usize,
    /// 单步内最多执行的工具轮数
    pub max_tool_rounds: usize,
    pub max_plan_steps: usize,
    pub aggregation: AggregationMode,
    /// 拼入 prompt 的 Scratchpad 中单个字段的预览长度
    pub scratchpad_preview_chars: usize,
}

impl Default for ReasoningSection {
    fn default() -> Self {
        Self {
            max_retries: 2,
            max_tool_rounds: 2,
            max_plan_steps: 8,
            aggregation: AggregationMode::Concat,
            scratchpad_preview_chars: 400,
        }
    }
}

/// [retrieval] 段：检索条数、超时与分块
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetrievalSection {
    pub top_k: usize,
    pub timeout_secs: u64,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    /// 向量库最大条目数
    pub max_entries: usize,
}

impl Default for RetrievalSection {
    fn default() -> Self {
        Self {
            top_k: 3,
            timeout_secs: 10,
            chunk_size: 500,
            chunk_overlap: 50,
            max_entries: 10_000,
        }
    }
}

/// [tools] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolsSection {
    /// 单次工具调用超时（秒）
    pub tool_timeout_secs: u64,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            tool_timeout_secs: 30,
        }
    }
}

/// 从 config 目录加载配置，环境变量 REASONER__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 REASONER__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("REASONER")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.reasoning.max_retries, 2);
        assert_eq!(cfg.reasoning.max_tool_rounds, 2);
        assert_eq!(cfg.reasoning.aggregation, AggregationMode::Concat);
        assert_eq!(cfg.llm.retry.max_attempts, 3);
        assert_eq!(cfg.retrieval.top_k, 3);
    }

    #[test]
    fn test_validate() {
        assert!(AppConfig::default().validate().is_ok());

        let mut cfg = AppConfig::default();
        cfg.llm.provider = "deepseek".to_string();
        let err = cfg.validate().unwrap_err();
        assert!(matches!(err, ReasonError::ConfigError(ref m) if m.contains("deepseek")));

        let mut cfg = AppConfig::default();
        cfg.llm.retry.max_attempts = 0;
        assert!(matches!(cfg.validate(), Err(ReasonError::ConfigError(_))));

        let mut cfg = AppConfig::default();
        cfg.retrieval.chunk_overlap = cfg.retrieval.chunk_size;
        assert!(matches!(cfg.validate(), Err(ReasonError::ConfigError(_))));
    }

    #[test]
    fn test_load_from_file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[llm]
provider = "mock"
max_tokens = 256

[llm.retry]
max_attempts = 5

[reasoning]
max_retries = 1
aggregation = "summarize"
"#
        )
        .unwrap();

        let cfg = load_config(Some(file.path().to_path_buf())).unwrap();
        assert_eq!(cfg.llm.provider, "mock");
        assert_eq!(cfg.llm.max_tokens, 256);
        assert_eq!(cfg.llm.retry.max_attempts, 5);
        assert_eq!(cfg.llm.retry.backoff_factor, 2.0);
        assert_eq!(cfg.reasoning.max_retries, 1);
        assert_eq!(cfg.reasoning.aggregation, AggregationMode::Summarize);
        assert_eq!(cfg.reasoning.max_tool_rounds, 2);
    }
}
