//! Search 工具：基于 RetrievalAdapter 的段落检索
//!
//! 参数为自由文本查询，返回 top-k 段落的编号列表；检索失败（重试耗尽、向量库错误、超时）时返回 RetrievalUnavailable。

use std::sync::Arc;

use async_trait::async_trait;

use crate::core::{ToolError, ToolErrorKind};
use crate::retrieval::RetrievalAdapter;
use crate::tools::Tool;

pub struct SearchTool {
    adapter: Arc<RetrievalAdapter>,
}

impl SearchTool {
    pub fn new(adapter: Arc<RetrievalAdapter>) -> Self {
        Self { adapter }
    }
}

#[async_trait]
impl Tool for SearchTool {
    fn name(&self) -> &str {
        "search"
    }

    fn description(&self) -> &str {
        "Search the indexed knowledge base and return the most relevant passages. Example: search: how does photosynthesis work"
    }

    async fn execute(&self, argument: &str) -> Result<String, ToolError> {
        let query = argument.trim();
        if query.is_empty() {
            return Ok("No matching passages.".to_string());
        }
        tracing::info!(query = %query, "search tool query");
        let docs = self
            .adapter
            .search(query)
            .await
            .map_err(|e| ToolError::new(ToolErrorKind::RetrievalUnavailable, e.to_string()))?;
        if docs.is_empty() {
            return Ok("No matching passages.".to_string());
        }
        Ok(docs
            .iter()
            .enumerate()
            .map(|(i, d)| format!("[{}] (score {:.2}) {}", i + 1, d.score, d.text))
            .collect::<Vec<_>>()
            .join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{EmbeddingProvider, HashEmbedder, LlmError, MockLlmClient, ModelGateway, RetryPolicy};
    use crate::retrieval::InMemoryVectorStore;

    #[tokio::test]
    async fn test_search_returns_itemized_passages() {
        let gateway = Arc::new(ModelGateway::new(
            Arc::new(MockLlmClient),
            Arc::new(HashEmbedder::default()),
        ));
        let adapter = Arc::new(RetrievalAdapter::new(
            gateway,
            Arc::new(InMemoryVectorStore::default()),
        ));
        adapter
            .index_document("Chlorophyll absorbs light.")
            .await
            .unwrap();
        let tool = SearchTool::new(adapter);
        let out = tool.execute("chlorophyll light").await.unwrap();
        assert!(out.starts_with("[1]"));
        assert!(out.contains("Chlorophyll absorbs light."));
    }

    #[tokio::test]
    async fn test_unavailable_retrieval_maps_to_tool_error() {
        struct DownEmbedder;

        #[async_trait]
        impl EmbeddingProvider for DownEmbedder {
            async fn embed(&self, _text: &str) -> Result<Vec<f32>, LlmError> {
                Err(LlmError::Timeout)
            }
        }

        let gateway = Arc::new(
            ModelGateway::new(Arc::new(MockLlmClient), Arc::new(DownEmbedder))
                .with_retry_policy(RetryPolicy::immediate(2)),
        );
        let adapter = Arc::new(RetrievalAdapter::new(
            gateway,
            Arc::new(InMemoryVectorStore::default()),
        ));
        let err = SearchTool::new(adapter).execute("anything").await.unwrap_err();
        assert_eq!(err.kind, ToolErrorKind::RetrievalUnavailable);
    }
}
