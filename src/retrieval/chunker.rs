//! 文档分块：按分隔符优先级在目标长度附近断开，块之间保留重叠（UTF-8 安全）

/// 分块策略
#[derive(Debug, Clone)]
pub struct ChunkingConfig {
    /// 目标块大小（字符数）
    pub chunk_size: usize,
    /// 块之间的重叠（字符数）
    pub chunk_overlap: usize,
    /// 分隔符优先级（从高到低）
    pub separators: Vec<String>,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 500,
            chunk_overlap: 50,
            separators: ["\n\n", "\n", "。", ". ", "! ", "? ", " "]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

/// 文档分块器
#[derive(Debug, Clone, Default)]
pub struct Chunker {
    config: ChunkingConfig,
}

impl Chunker {
    pub fn new(config: ChunkingConfig) -> Self {
        Self { config }
    }

    pub fn chunk(&self, text: &str) -> Vec<String> {
        let chars: Vec<char> = text.chars().collect();
        let total = chars.len();
        let size = self.config.chunk_size.max(1);
        let mut chunks = Vec::new();
        let mut current = 0;

        while current < total {
            let target_end = (current + size).min(total);
            let mut end = target_end;

            // 如果不是文档末尾，尝试在分隔符处断开
            if target_end < total {
                let slice: String = chars[current..target_end].iter().collect();
                for sep in &self.config.separators {
                    if let Some(pos) = slice.rfind(sep.as_str()) {
                        let to_sep = slice[..pos].chars().count() + sep.chars().count();
                        if to_sep > 0 {
                            end = current + to_sep;
                            break;
                        }
                    }
                }
            }
            if end <= current {
                end = (current + 1).min(total);
            }

            let piece: String = chars[current..end].iter().collect();
            let piece = piece.trim();
            if !piece.is_empty() {
                chunks.push(piece.to_string());
            }
            if end >= total {
                break;
            }

            let overlap = self.config.chunk_overlap.min(end - current);
            let next = end.saturating_sub(overlap);
            current = if next > current { next } else { end };
        }

        chunks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunking_prefers_separators() {
        let chunker = Chunker::new(ChunkingConfig {
            chunk_size: 40,
            chunk_overlap: 0,
            ..Default::default()
        });
        let text = "Les plantes captent la lumière.\n\nElles produisent du glucose et de l'oxygène.";
        let chunks = chunker.chunk(text);
        assert!(chunks.len() >= 2);
        assert_eq!(chunks[0], "Les plantes captent la lumière.");
        assert!(chunks.iter().all(|c| !c.is_empty()));
    }

    #[test]
    fn test_short_text_is_single_chunk() {
        let chunks = Chunker::default().chunk("  chlorophylle  ");
        assert_eq!(chunks, vec!["chlorophylle".to_string()]);
        assert!(Chunker::default().chunk("").is_empty());
    }
}
