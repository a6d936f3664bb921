//! 向量存储
//!
//! VectorStore 是外部向量库的边界：index(document, vector) 与 search(query_vector, k)。
//! InMemoryVectorStore 用余弦相似度实现，超出容量时淘汰最旧条目。

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

/// 检索结果：文档文本与相似度分数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredDocument {
    pub text: String,
    pub score: f32,
}

/// 向量库边界；search 结果按分数降序
#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn index(&self, document: String, vector: Vec<f32>) -> Result<(), String>;

    async fn search(&self, query: &[f32], k: usize) -> Result<Vec<ScoredDocument>, String>;

    async fn len(&self) -> usize;
}

/// 内存向量库
pub struct InMemoryVectorStore {
    entries: RwLock<Vec<(String, Vec<f32>)>>,
    max_entries: usize,
}

impl InMemoryVectorStore {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
            max_entries: max_entries.max(1),
        }
    }
}

impl Default for InMemoryVectorStore {
    fn default() -> Self {
        Self::new(10_000)
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn index(&self, document: String, vector: Vec<f32>) -> Result<(), String> {
        if vector.is_empty() {
            return Err("Empty embedding".to_string());
        }
        let mut entries = self.entries.write().await;
        entries.push((document, vector));
        // 超出限制时移除最旧的
        if entries.len() > self.max_entries {
            let overflow = entries.len() - self.max_entries;
            entries.drain(0..overflow);
        }
        Ok(())
    }

    async fn search(&self, query: &[f32], k: usize) -> Result<Vec<ScoredDocument>, String> {
        if query.is_empty() {
            return Err("Empty query embedding".to_string());
        }
        let entries = self.entries.read().await;
        let mut scored: Vec<ScoredDocument> = entries
            .iter()
            .map(|(text, emb)| ScoredDocument {
                text: text.clone(),
                score: cosine_similarity(query, emb),
            })
            .filter(|d| d.score > 0.0)
            .collect();
        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        Ok(scored)
    }

    async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

/// 余弦相似度
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_similarity() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 0.001);

        let c = vec![0.0, 1.0, 0.0];
        assert!((cosine_similarity(&a, &c)).abs() < 0.001);
        assert_eq!(cosine_similarity(&a, &[1.0]), 0.0);
    }

    #[tokio::test]
    async fn test_search_orders_by_score() {
        let store = InMemoryVectorStore::default();
        store.index("x axis".into(), vec![1.0, 0.0]).await.unwrap();
        store.index("diagonal".into(), vec![1.0, 1.0]).await.unwrap();
        store.index("y axis".into(), vec![0.0, 1.0]).await.unwrap();

        let hits = store.search(&[1.0, 0.1], 2).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].text, "x axis");
        assert_eq!(hits[1].text, "diagonal");
        assert!(hits[0].score >= hits[1].score);
    }

    #[tokio::test]
    async fn test_capacity_evicts_oldest() {
        let store = InMemoryVectorStore::new(2);
        store.index("a".into(), vec![1.0]).await.unwrap();
        store.index("b".into(), vec![1.0]).await.unwrap();
        store.index("c".into(), vec![1.0]).await.unwrap();
        assert_eq!(store.len().await, 2);
        let hits = store.search(&[1.0], 10).await.unwrap();
        assert!(hits.iter().all(|h| h.text != "a"));
    }

    #[tokio::test]
    async fn test_empty_vectors_rejected() {
        let store = InMemoryVectorStore::default();
        assert!(store.index("a".into(), vec![]).await.is_err());
        assert!(store.search(&[], 3).await.is_err());
    }
}
