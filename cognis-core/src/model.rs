use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::Result;

/// A single chat turn handed to a [`LanguageModel`]. Deliberately plainer than
/// a full multi-part `Content`/`Part` tree — the engine only needs this shape
/// for consolidation prompts and fact extraction, not general agent turns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: "user".to_string(), content: content.into() }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self { role: "system".to_string(), content: content.into() }
    }
}

/// Token accounting returned alongside a completion, mirrored on the ADK's
/// `UsageMetadata` so cost/latency logging stays uniform across providers.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct UsageMetadata {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Completion {
    pub text: String,
    pub usage: UsageMetadata,
}

/// External collaborator contract for whatever LLM backend drives
/// consolidation (fast replay / deep reflection) and fact extraction. The
/// engine depends only on this trait; a concrete Gemini/OpenAI/local-model
/// client is provided by the caller, never implemented in this crate.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<Completion>;
}

/// External collaborator contract for whatever embedding backend produces
/// the vectors stored alongside memories and facts.
#[async_trait]
pub trait Embedder: Send + Sync {
    fn dimensions(&self) -> usize;

    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }
}

/// External collaborator contract for cross-encoder style rerankers used by
/// the L1 stage of hybrid search (spec §5, Reranker).
#[async_trait]
pub trait Reranker: Send + Sync {
    async fn rerank(&self, query: &str, candidates: &[String]) -> Result<Vec<f32>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoEmbedder;

    #[async_trait]
    impl Embedder for EchoEmbedder {
        fn dimensions(&self) -> usize {
            3
        }

        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            Ok(vec![text.len() as f32, 0.0, 0.0])
        }
    }

    #[tokio::test]
    async fn test_embed_batch_default_impl() {
        let embedder = EchoEmbedder;
        let out = embedder
            .embed_batch(&["ab".to_string(), "abcd".to_string()])
            .await
            .unwrap();
        assert_eq!(out, vec![vec![2.0, 0.0, 0.0], vec![4.0, 0.0, 0.0]]);
    }

    #[test]
    fn test_chat_message_constructors() {
        let m = ChatMessage::user("hi");
        assert_eq!(m.role, "user");
        assert_eq!(m.content, "hi");
    }
}
