//! 检索层：向量库边界、文档分块与 Retrieval Adapter
//!
//! RetrievalAdapter 通过 ModelGateway 嵌入查询，再在单次调用超时内查询向量库取 top-k 段落。
//! index_document 仅在启动阶段使用，运行过程中不写入向量库。

pub mod chunker;
pub mod store;

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::time::timeout;

use crate::config::RetrievalSection;
use crate::llm::ModelGateway;

pub use chunker::{Chunker, ChunkingConfig};
pub use store::{cosine_similarity, InMemoryVectorStore, ScoredDocument, VectorStore};

/// 检索失败
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RetrievalError {
    #[error("Embedding unavailable: {0}")]
    Embedding(String),

    #[error("Vector store error: {0}")]
    Store(String),

    #[error("Retrieval timed out")]
    Timeout,
}

/// 向量检索适配器
pub struct RetrievalAdapter {
    gateway: Arc<ModelGateway>,
    store: Arc<dyn VectorStore>,
    chunker: Chunker,
    top_k: usize,
    timeout: Duration,
}

impl RetrievalAdapter {
    pub fn new(gateway: Arc<ModelGateway>, store: Arc<dyn VectorStore>) -> Self {
        Self {
            gateway,
            store,
            chunker: Chunker::default(),
            top_k: 3,
            timeout: Duration::from_secs(10),
        }
    }

    pub fn from_config(
        gateway: Arc<ModelGateway>,
        store: Arc<dyn VectorStore>,
        cfg: &RetrievalSection,
    ) -> Self {
        Self::new(gateway, store)
            .with_top_k(cfg.top_k)
            .with_timeout(Duration::from_secs(cfg.timeout_secs))
            .with_chunking_config(ChunkingConfig {
                chunk_size: cfg.chunk_size,
                chunk_overlap: cfg.chunk_overlap,
                ..Default::default()
            })
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k.max(1);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_chunking_config(mut self, config: ChunkingConfig) -> Self {
        self.chunker = Chunker::new(config);
        self
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// 索引文档：分块、嵌入并写入向量库，返回写入的块数
    ///
    /// 先嵌入全部分块再写入；任一分块嵌入失败时向量库保持不变。
    pub async fn index_document(&self, text: &str) -> Result<usize, RetrievalError> {
        let mut embedded = Vec::new();
        for chunk in self.chunker.chunk(text) {
            let vector = self
                .gateway
                .embed(&chunk)
                .await
                .map_err(|e| RetrievalError::Embedding(e.to_string()))?;
            embedded.push((chunk, vector));
        }
        let added = embedded.len();
        for (chunk, vector) in embedded {
            self.store
                .index(chunk, vector)
                .await
                .map_err(RetrievalError::Store)?;
        }
        tracing::debug!(chunks = added, "document indexed");
        Ok(added)
    }

    /// 检索与查询最相关的 top-k 段落（分数降序）
    pub async fn search(&self, query: &str) -> Result<Vec<ScoredDocument>, RetrievalError> {
        let vector = self
            .gateway
            .embed(query)
            .await
            .map_err(|e| RetrievalError::Embedding(e.to_string()))?;
        match timeout(self.timeout, self.store.search(&vector, self.top_k)).await {
            Ok(Ok(docs)) => Ok(docs),
            Ok(Err(e)) => Err(RetrievalError::Store(e)),
            Err(_) => Err(RetrievalError::Timeout),
        }
    }
}
