//! Mock LLM 客户端（用于测试与离线运行，无需 API）
//!
//! - MockLlmClient：取 prompt 最后一个非空行，回显为 final_answer JSON，便于本地跑通整条流水线。
//! - ScriptedLlmClient：按顺序返回预设结果，并记录收到的 prompt。
//! - FailingLlmClient：每次都返回同一个错误。
//! - HashEmbedder：确定性的词袋哈希向量。

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::llm::{EmbeddingProvider, GenerateOptions, LlmClient, LlmError};

/// Mock 客户端：回显 prompt 最后一行
#[derive(Debug, Default)]
pub struct MockLlmClient;

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, prompt: &str, _options: &GenerateOptions) -> Result<String, LlmError> {
        let last_line = prompt
            .lines()
            .rev()
            .map(str::trim)
            .find(|l| !l.is_empty())
            .unwrap_or("(no input)");
        Ok(serde_json::json!({ "final_answer": format!("Echo from Mock: {}", last_line) })
            .to_string())
    }
}

/// 按脚本依次返回结果；脚本耗尽后返回 fallback
pub struct ScriptedLlmClient {
    script: Mutex<VecDeque<Result<String, LlmError>>>,
    fallback: Result<String, LlmError>,
    prompts: Mutex<Vec<String>>,
    calls: AtomicUsize,
}

impl ScriptedLlmClient {
    pub fn new<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::from_results(responses.into_iter().map(|s| Ok(s.into())))
    }

    pub fn from_results<I>(results: I) -> Self
    where
        I: IntoIterator<Item = Result<String, LlmError>>,
    {
        Self {
            script: Mutex::new(results.into_iter().collect()),
            fallback: Err(LlmError::InvalidRequest("script exhausted".to_string())),
            prompts: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        }
    }

    /// 脚本耗尽后重复返回的结果
    pub fn with_fallback(mut self, fallback: Result<String, LlmError>) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// 已收到的全部 prompt（按调用顺序）
    pub fn prompts(&self) -> Vec<String> {
        self.prompts
            .lock()
            .map(|p| p.clone())
            .unwrap_or_else(|e| e.into_inner().clone())
    }
}

#[async_trait]
impl LlmClient for ScriptedLlmClient {
    async fn complete(&self, prompt: &str, _options: &GenerateOptions) -> Result<String, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.prompts.lock() {
            Ok(mut p) => p.push(prompt.to_string()),
            Err(e) => e.into_inner().push(prompt.to_string()),
        }
        let next = match self.script.lock() {
            Ok(mut s) => s.pop_front(),
            Err(e) => e.into_inner().pop_front(),
        };
        next.unwrap_or_else(|| self.fallback.clone())
    }
}

/// 每次调用都失败的客户端
#[derive(Debug)]
pub struct FailingLlmClient {
    error: LlmError,
    calls: AtomicUsize,
}

impl FailingLlmClient {
    pub fn new(error: LlmError) -> Self {
        Self {
            error,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LlmClient for FailingLlmClient {
    async fn complete(&self, _prompt: &str, _options: &GenerateOptions) -> Result<String, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(self.error.clone())
    }
}

/// 确定性词袋嵌入：每个小写词哈希到 dims 维中的一维并计数，最后归一化
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dims: usize,
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self { dims: 256 }
    }
}

impl HashEmbedder {
    pub fn new(dims: usize) -> Self {
        Self { dims: dims.max(1) }
    }

    fn bucket(&self, word: &str) -> usize {
        // FNV-1a
        let mut hash: u64 = 0xcbf29ce484222325;
        for b in word.as_bytes() {
            hash ^= u64::from(*b);
            hash = hash.wrapping_mul(0x100000001b3);
        }
        (hash % self.dims as u64) as usize
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        let mut v = vec![0.0f32; self.dims];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            v[self.bucket(&word.to_lowercase())] += 1.0;
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut v {
                *x /= norm;
            }
        }
        Ok(v)
    }
}
