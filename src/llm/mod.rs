//! LLM 层：客户端抽象、重试策略、Model Gateway 与实现（OpenAI 兼容 / Mock）

pub mod gateway;
pub mod mock;
pub mod openai;
pub mod retry;
pub mod traits;

pub use gateway::ModelGateway;
pub use mock::{FailingLlmClient, HashEmbedder, MockLlmClient, ScriptedLlmClient};
pub use openai::{classify_error, OpenAiClient, OpenAiEmbedder, TokenUsage};
pub use retry::RetryPolicy;
pub use traits::{EmbeddingProvider, GenerateOptions, LlmClient, LlmError};
