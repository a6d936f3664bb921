//! Model Gateway：生成 / 嵌入服务的唯一入口
//!
//! 对每次调用施加请求超时与 RetryPolicy（指数退避，仅重试瞬时错误）；
//! 重试耗尽或遇到不可重试错误时返回 ReasonError::ModelUnavailable。
//! 其它组件只依赖 ModelGateway，不直接接触传输层。

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;

use crate::config::AppConfig;
use crate::core::ReasonError;
use crate::llm::{
    EmbeddingProvider, GenerateOptions, HashEmbedder, LlmClient, LlmError, MockLlmClient,
    OpenAiClient, OpenAiEmbedder, RetryPolicy,
};

/// 带重试与超时的模型网关；可在多个并发运行之间共享（无跨调用可变状态）
pub struct ModelGateway {
    client: Arc<dyn LlmClient>,
    embedder: Arc<dyn EmbeddingProvider>,
    policy: RetryPolicy,
    request_timeout: Duration,
    defaults: GenerateOptions,
}

impl ModelGateway {
    pub fn new(client: Arc<dyn LlmClient>, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            client,
            embedder,
            policy: RetryPolicy::default(),
            request_timeout: Duration::from_secs(60),
            defaults: GenerateOptions::default(),
        }
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_request_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self
    }

    pub fn with_default_options(mut self, defaults: GenerateOptions) -> Self {
        self.defaults = defaults;
        self
    }

    /// 按配置构建：provider = openai 且有 API Key 时使用 OpenAI 兼容端点，否则回退到 Mock
    pub fn from_config(cfg: &AppConfig) -> Self {
        let provider = cfg.llm.provider.to_lowercase();
        let api_key = cfg
            .llm
            .api_key
            .clone()
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .filter(|k| !k.trim().is_empty());

        let (client, embedder): (Arc<dyn LlmClient>, Arc<dyn EmbeddingProvider>) =
            match (provider.as_str(), api_key) {
                ("openai", Some(key)) => {
                    tracing::info!("Using OpenAI-compatible LLM ({})", cfg.llm.model);
                    let base = cfg.llm.base_url.as_deref();
                    (
                        Arc::new(OpenAiClient::new(base, &cfg.llm.model, Some(&key))),
                        Arc::new(OpenAiEmbedder::new(base, &cfg.embedding.model, Some(&key))),
                    )
                }
                ("mock", _) => (Arc::new(MockLlmClient), Arc::new(HashEmbedder::default())),
                _ => {
                    tracing::warn!("No API key set or provider unknown, using Mock LLM");
                    (Arc::new(MockLlmClient), Arc::new(HashEmbedder::default()))
                }
            };

        Self::new(client, embedder)
            .with_retry_policy(RetryPolicy::from_config(&cfg.llm.retry))
            .with_request_timeout(Duration::from_secs(cfg.llm.request_timeout_secs))
            .with_default_options(GenerateOptions {
                temperature: cfg.llm.temperature,
                max_tokens: cfg.llm.max_tokens,
            })
    }

    pub fn default_options(&self) -> GenerateOptions {
        self.defaults
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// 累计 token 统计（透传底层客户端）
    pub fn token_usage(&self) -> (u64, u64, u64) {
        self.client.token_usage()
    }

    /// 以默认参数生成
    pub async fn generate_default(&self, prompt: &str) -> Result<String, ReasonError> {
        let options = self.defaults;
        self.generate(prompt, &options).await
    }

    pub async fn generate(
        &self,
        prompt: &str,
        options: &GenerateOptions,
    ) -> Result<String, ReasonError> {
        let client = self.client.clone();
        self.call_with_retry("generate", || {
            let client = client.clone();
            async move { client.complete(prompt, options).await }
        })
        .await
    }

    pub async fn embed(&self, text: &str) -> Result<Vec<f32>, ReasonError> {
        let embedder = self.embedder.clone();
        self.call_with_retry("embed", || {
            let embedder = embedder.clone();
            async move { embedder.embed(text).await }
        })
        .await
    }

    async fn call_with_retry<T, F, Fut>(&self, op: &str, call: F) -> Result<T, ReasonError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, LlmError>>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let result = match timeout(self.request_timeout, call()).await {
                Ok(r) => r,
                Err(_) => Err(LlmError::Timeout),
            };
            let err = match result {
                Ok(v) => {
                    if attempt > 1 {
                        tracing::info!(op, attempt, "model call succeeded after retry");
                    }
                    return Ok(v);
                }
                Err(e) => e,
            };

            if !self.policy.should_retry(&err, attempt) {
                tracing::warn!(op, attempt, error = %err, "model call failed, giving up");
                return Err(ReasonError::ModelUnavailable {
                    attempts: attempt,
                    last_error: err,
                });
            }

            let delay = self.policy.delay_for(attempt);
            tracing::warn!(
                op,
                attempt,
                max_attempts = self.policy.max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "model call failed, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }
}
