use serde::{Deserialize, Serialize};
use std::fmt;

fn default_openai_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_chat_model() -> String {
    "gpt-4o".to_string()
}

fn default_reasoning_timeout_seconds() -> u64 {
    60
}

/// Chat-completion endpoint used for every reasoning invocation.
#[derive(Clone, Serialize, Deserialize)]
pub struct ReasoningConfig {
    #[serde(default = "default_openai_url")]
    pub base_url: String,
    #[serde(default = "default_chat_model")]
    pub model: String,
    #[serde(default, skip_serializing)]
    pub api_key: String,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default = "default_reasoning_timeout_seconds")]
    pub request_timeout_seconds: u64,
}

impl Default for ReasoningConfig {
    fn default() -> Self {
        Self {
            base_url: default_openai_url(),
            model: default_chat_model(),
            api_key: String::new(),
            temperature: None,
            request_timeout_seconds: default_reasoning_timeout_seconds(),
        }
    }
}

impl fmt::Debug for ReasoningConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReasoningConfig")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("api_key", &"[REDACTED]")
            .field("temperature", &self.temperature)
            .field("request_timeout_seconds", &self.request_timeout_seconds)
            .finish()
    }
}

fn default_qdrant_url() -> String {
    "http://localhost:6333".to_string()
}

fn default_collection() -> String {
    "docs3".to_string()
}

fn default_embedding_model() -> String {
    "text-embedding-3-large".to_string()
}

fn default_knowledge_timeout_seconds() -> u64 {
    30
}

fn default_vector_size() -> usize {
    3072
}

fn default_chunk_size() -> usize {
    1000
}

fn default_chunk_overlap() -> usize {
    200
}

/// Vector store and embedding endpoint behind the knowledge lookup.
#[derive(Clone, Serialize, Deserialize)]
pub struct KnowledgeConfig {
    #[serde(default = "default_qdrant_url")]
    pub qdrant_url: String,
    #[serde(default = "default_collection")]
    pub collection: String,
    /// Optional Qdrant API key, sent as the `api-key` header.
    #[serde(default, skip_serializing)]
    pub qdrant_api_key: Option<String>,
    #[serde(default = "default_openai_url")]
    pub embedding_base_url: String,
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
    #[serde(default, skip_serializing)]
    pub api_key: String,
    #[serde(default = "default_knowledge_timeout_seconds")]
    pub request_timeout_seconds: u64,
    /// Dimension of the embedding vectors; used when creating the collection.
    #[serde(default = "default_vector_size")]
    pub vector_size: usize,
    /// Upper bound, in characters, on one ingested chunk.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Characters of trailing text repeated at the start of the next chunk.
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

impl Default for KnowledgeConfig {
    fn default() -> Self {
        Self {
            qdrant_url: default_qdrant_url(),
            collection: default_collection(),
            qdrant_api_key: None,
            embedding_base_url: default_openai_url(),
            embedding_model: default_embedding_model(),
            api_key: String::new(),
            request_timeout_seconds: default_knowledge_timeout_seconds(),
            vector_size: default_vector_size(),
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
        }
    }
}

impl fmt::Debug for KnowledgeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KnowledgeConfig")
            .field("qdrant_url", &self.qdrant_url)
            .field("collection", &self.collection)
            .field("qdrant_api_key", &self.qdrant_api_key.as_ref().map(|_| "[REDACTED]"))
            .field("embedding_base_url", &self.embedding_base_url)
            .field("embedding_model", &self.embedding_model)
            .field("api_key", &"[REDACTED]")
            .field("request_timeout_seconds", &self.request_timeout_seconds)
            .field("vector_size", &self.vector_size)
            .field("chunk_size", &self.chunk_size)
            .field("chunk_overlap", &self.chunk_overlap)
            .finish()
    }
}

fn default_max_iterations() -> usize {
    4
}

fn default_top_k() -> usize {
    5
}

/// Limits applied by the turn controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnConfig {
    /// Upper bound on reasoning invocations within one turn.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
    /// Number of context passages requested per knowledge lookup.
    #[serde(default = "default_top_k")]
    pub knowledge_top_k: usize,
}

impl Default for TurnConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            knowledge_top_k: default_top_k(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn turn_defaults() {
        let config = TurnConfig::default();
        assert_eq!(config.max_iterations, 4);
        assert_eq!(config.knowledge_top_k, 5);
    }

    #[test]
    fn ingestion_defaults() {
        let config = KnowledgeConfig::default();
        assert_eq!(config.vector_size, 3072);
        assert_eq!(config.chunk_size, 1000);
        assert_eq!(config.chunk_overlap, 200);
    }

    #[test]
    fn secrets_are_redacted() {
        let reasoning = ReasoningConfig {
            api_key: "sk-one".to_string(),
            ..ReasoningConfig::default()
        };
        let knowledge = KnowledgeConfig {
            api_key: "sk-two".to_string(),
            qdrant_api_key: Some("qd-three".to_string()),
            ..KnowledgeConfig::default()
        };
        let rendered = format!("{:?} {:?}", reasoning, knowledge);
        assert!(!rendered.contains("sk-one"));
        assert!(!rendered.contains("sk-two"));
        assert!(!rendered.contains("qd-three"));
    }
}
