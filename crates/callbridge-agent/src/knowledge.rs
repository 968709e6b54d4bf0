//! Knowledge lookup against a Qdrant collection.
//!
//! The question is embedded through an OpenAI-compatible embeddings endpoint,
//! the nearest points are fetched with Qdrant's REST query API in the store's
//! native order, and their `text` payloads are folded into a context block
//! that the turn controller appends to the history as a user message.
//!
//! The same client also fills the collection: [`chunk_text`] splits a
//! document, and [`QdrantKnowledge::upsert`] embeds the chunks and writes them
//! under ids derived from the source name, so re-ingesting a source
//! overwrites its earlier points instead of duplicating them.

use crate::config::KnowledgeConfig;
use crate::error::AgentError;
use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response};
use serde::Deserialize;
use std::time::Duration;
use uuid::Uuid;

/// Chunks sent to the embeddings endpoint per request.
const EMBED_BATCH: usize = 64;

/// Fetches context for a question and renders it for the reasoning engine.
#[async_trait]
pub trait KnowledgeLookup: Send + Sync {
    async fn lookup(&self, question: &str, top_k: usize) -> Result<String, AgentError>;
}

/// Builds the user message that hands retrieved passages to the reasoning engine.
pub fn context_block(question: &str, contexts: &[String]) -> String {
    let bullets = if contexts.is_empty() {
        "- (no matching context found)".to_string()
    } else {
        contexts
            .iter()
            .map(|c| format!("- {}", c))
            .collect::<Vec<_>>()
            .join("\n\n")
    };
    format!(
        "Use the following context to answer the question.\n\n\
         Context:\n{}\n\n\
         Question: {}\n\
         Answer concisely using only the context above.",
        bullets, question
    )
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

/// Embedding vectors in input order.
fn ordered_embeddings(mut response: EmbeddingResponse) -> Vec<Vec<f32>> {
    response.data.sort_by_key(|d| d.index);
    response.data.into_iter().map(|d| d.embedding).collect()
}

#[derive(Deserialize)]
struct QueryResponse {
    result: QueryResult,
}

#[derive(Deserialize)]
struct QueryResult {
    #[serde(default)]
    points: Vec<ScoredPoint>,
}

#[derive(Deserialize)]
struct ScoredPoint {
    #[serde(default)]
    payload: Option<serde_json::Map<String, serde_json::Value>>,
}

/// Stable point id for chunk `index` of `source`.
pub fn point_id(source: &str, index: usize) -> Uuid {
    Uuid::new_v5(&Uuid::NAMESPACE_URL, format!("{}:{}", source, index).as_bytes())
}

/// Splits `text` on whitespace into chunks of at most `chunk_size` characters.
///
/// Each chunk after the first starts with up to `overlap` characters of the
/// previous chunk's trailing words. A single word longer than `chunk_size`
/// becomes a chunk of its own.
pub fn chunk_text(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    let words: Vec<&str> = text.split_whitespace().collect();
    let mut chunks = Vec::new();
    let mut start = 0;

    while start < words.len() {
        let mut end = start;
        let mut len = 0;
        while end < words.len() {
            let extra = words[end].chars().count() + usize::from(end > start);
            if end > start && len + extra > chunk_size {
                break;
            }
            len += extra;
            end += 1;
        }
        chunks.push(words[start..end].join(" "));
        if end == words.len() {
            break;
        }

        let mut next = end;
        let mut carried = 0;
        while next > start + 1 {
            let width = words[next - 1].chars().count() + 1;
            if carried + width > overlap {
                break;
            }
            carried += width;
            next -= 1;
        }
        start = next;
    }

    chunks
}

/// Request body for `PUT /collections/{name}/points`.
fn upsert_body(source: &str, chunks: &[String], vectors: Vec<Vec<f32>>) -> serde_json::Value {
    let points: Vec<serde_json::Value> = chunks
        .iter()
        .zip(vectors)
        .enumerate()
        .map(|(i, (text, vector))| {
            serde_json::json!({
                "id": point_id(source, i).to_string(),
                "vector": vector,
                "payload": { "source": source, "text": text },
            })
        })
        .collect();
    serde_json::json!({ "points": points })
}

/// Request body for `PUT /collections/{name}`.
fn collection_body(vector_size: usize) -> serde_json::Value {
    serde_json::json!({
        "vectors": { "size": vector_size, "distance": "Cosine" },
    })
}

/// Passage texts from query results, skipping points without a text payload.
fn passages(result: QueryResult) -> Vec<String> {
    result
        .points
        .into_iter()
        .filter_map(|p| {
            p.payload?
                .get("text")
                .and_then(|t| t.as_str())
                .filter(|t| !t.is_empty())
                .map(str::to_string)
        })
        .collect()
}

#[derive(Debug, Clone)]
pub struct QdrantKnowledge {
    config: KnowledgeConfig,
    client: reqwest::Client,
}

impl QdrantKnowledge {
    pub fn new(config: KnowledgeConfig) -> Result<Self, AgentError> {
        if config.api_key.is_empty() {
            return Err(AgentError::Config(
                "embedding API key is not configured. Set OPENAI_API_KEY.".to_string(),
            ));
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .build()
            .map_err(|e| AgentError::Config(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { config, client })
    }

    fn qdrant(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!(
            "{}/collections/{}{}",
            self.config.qdrant_url.trim_end_matches('/'),
            self.config.collection,
            path
        );
        let request = self.client.request(method, url);
        match &self.config.qdrant_api_key {
            Some(key) => request.header("api-key", key),
            None => request,
        }
    }

    async fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, String> {
        let url = format!(
            "{}/embeddings",
            self.config.embedding_base_url.trim_end_matches('/')
        );
        let res = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&serde_json::json!({
                "model": self.config.embedding_model,
                "input": texts,
            }))
            .send()
            .await
            .map_err(|e| format!("embedding request failed: {}", e))?;

        let res = check_status(res, "embedding API").await?;
        let parsed: EmbeddingResponse = res
            .json()
            .await
            .map_err(|e| format!("embedding parse failed: {}", e))?;
        let vectors = ordered_embeddings(parsed);
        if vectors.len() != texts.len() {
            return Err(format!(
                "embedding API returned {} vectors for {} inputs",
                vectors.len(),
                texts.len()
            ));
        }
        Ok(vectors)
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, AgentError> {
        self.embed_many(&[text.to_string()])
            .await
            .map_err(AgentError::Lookup)?
            .into_iter()
            .next()
            .ok_or_else(|| AgentError::Lookup("embedding response is empty".to_string()))
    }

    /// Creates the collection with cosine distance unless it already exists.
    ///
    /// Returns whether the collection was created.
    pub async fn ensure_collection(&self) -> Result<bool, AgentError> {
        let res = self
            .qdrant(Method::GET, "")
            .send()
            .await
            .map_err(|e| AgentError::Ingest(format!("collection check failed: {}", e)))?;
        if res.status().is_success() {
            return Ok(false);
        }
        if res.status() != reqwest::StatusCode::NOT_FOUND {
            check_status(res, "vector store")
                .await
                .map_err(AgentError::Ingest)?;
            return Ok(false);
        }

        let res = self
            .qdrant(Method::PUT, "")
            .json(&collection_body(self.config.vector_size))
            .send()
            .await
            .map_err(|e| AgentError::Ingest(format!("collection create failed: {}", e)))?;
        check_status(res, "vector store")
            .await
            .map_err(AgentError::Ingest)?;
        tracing::info!(
            collection = %self.config.collection,
            size = self.config.vector_size,
            "created vector collection"
        );
        Ok(true)
    }

    /// Embeds `chunks` and writes them as points tagged with `source`.
    ///
    /// Returns the number of points written.
    pub async fn upsert(&self, source: &str, chunks: &[String]) -> Result<usize, AgentError> {
        if chunks.is_empty() {
            return Ok(0);
        }

        let mut vectors = Vec::with_capacity(chunks.len());
        for batch in chunks.chunks(EMBED_BATCH) {
            vectors.extend(self.embed_many(batch).await.map_err(AgentError::Ingest)?);
            tracing::debug!(
                source,
                embedded = vectors.len(),
                total = chunks.len(),
                "embedded chunks"
            );
        }

        let res = self
            .qdrant(Method::PUT, "/points?wait=true")
            .json(&upsert_body(source, chunks, vectors))
            .send()
            .await
            .map_err(|e| AgentError::Ingest(format!("upsert request failed: {}", e)))?;
        check_status(res, "vector store")
            .await
            .map_err(AgentError::Ingest)?;

        tracing::info!(
            collection = %self.config.collection,
            source,
            points = chunks.len(),
            "upserted chunks"
        );
        Ok(chunks.len())
    }

    /// Returns the text of the `top_k` nearest passages.
    pub async fn search(&self, question: &str, top_k: usize) -> Result<Vec<String>, AgentError> {
        let vector = self.embed(question).await?;
        let res = self
            .qdrant(Method::POST, "/points/query")
            .json(&serde_json::json!({
                "query": vector,
                "limit": top_k,
                "with_payload": true,
            }))
            .send()
            .await
            .map_err(|e| AgentError::Lookup(format!("vector query failed: {}", e)))?;

        let res = check_status(res, "vector store")
            .await
            .map_err(AgentError::Lookup)?;
        let parsed: QueryResponse = res
            .json()
            .await
            .map_err(|e| AgentError::Lookup(format!("vector query parse failed: {}", e)))?;
        Ok(passages(parsed.result))
    }
}

/// Passes successful responses through and renders the rest as `"{what} error {status}: {body}"`.
async fn check_status(res: Response, what: &str) -> Result<Response, String> {
    if res.status().is_success() {
        return Ok(res);
    }
    let status = res.status();
    let body = res.text().await.unwrap_or_default();
    Err(format!("{} error {}: {}", what, status, body))
}

#[async_trait]
impl KnowledgeLookup for QdrantKnowledge {
    async fn lookup(&self, question: &str, top_k: usize) -> Result<String, AgentError> {
        let found = self.search(question, top_k).await?;
        tracing::info!(
            collection = %self.config.collection,
            passages = found.len(),
            "knowledge lookup finished"
        );
        Ok(context_block(question, &found))
    }
}
