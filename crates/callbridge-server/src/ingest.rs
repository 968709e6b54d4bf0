//! Loads text documents into the knowledge collection.
//!
//! Used by the `callbridge-ingest` binary: the document is chunked, the
//! collection is created if it does not exist yet, and every chunk is
//! embedded and upserted with its source name and text as payload.

use callbridge_agent::{chunk_text, AgentError, KnowledgeConfig, QdrantKnowledge};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::config::ConfigError;

pub const USAGE: &str = "usage: callbridge-ingest <file> [--source-id ID] [--collection NAME] \
                         [--qdrant-url URL] [--config PATH]";

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("{0}\n{usage}", usage = USAGE)]
    Usage(String),

    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("no text chunks produced from {0}")]
    Empty(PathBuf),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Agent(#[from] AgentError),
}

/// Command-line arguments of `callbridge-ingest`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestArgs {
    pub path: PathBuf,
    /// Stored with every chunk; defaults to the canonical file path.
    pub source_id: Option<String>,
    pub collection: Option<String>,
    pub qdrant_url: Option<String>,
    pub config_path: Option<String>,
}

impl IngestArgs {
    /// Parses arguments, excluding the program name.
    pub fn parse<I>(args: I) -> Result<Self, IngestError>
    where
        I: IntoIterator<Item = String>,
    {
        let mut parsed = Self::default();
        let mut path = None;
        let mut args = args.into_iter();

        while let Some(arg) = args.next() {
            let slot = match arg.as_str() {
                "--source-id" => &mut parsed.source_id,
                "--collection" => &mut parsed.collection,
                "--qdrant-url" => &mut parsed.qdrant_url,
                "--config" => &mut parsed.config_path,
                flag if flag.starts_with("--") => {
                    return Err(IngestError::Usage(format!("unknown option {}", flag)));
                }
                _ => {
                    if path.replace(PathBuf::from(&arg)).is_some() {
                        return Err(IngestError::Usage(format!("unexpected argument {}", arg)));
                    }
                    continue;
                }
            };
            match args.next().filter(|v| !v.trim().is_empty()) {
                Some(value) => *slot = Some(value),
                None => return Err(IngestError::Usage(format!("{} needs a value", arg))),
            }
        }

        parsed.path = path.ok_or_else(|| IngestError::Usage("missing file".to_string()))?;
        Ok(parsed)
    }

    /// Applies the `--collection` and `--qdrant-url` overrides.
    pub fn apply(&self, knowledge: &mut KnowledgeConfig) {
        if let Some(collection) = &self.collection {
            knowledge.collection = collection.clone();
        }
        if let Some(url) = &self.qdrant_url {
            knowledge.qdrant_url = url.clone();
        }
    }
}

/// Chunks, embeds and upserts one text file. Returns the number of chunks written.
pub async fn ingest_file(
    knowledge: &KnowledgeConfig,
    path: &Path,
    source_id: Option<&str>,
) -> Result<usize, IngestError> {
    let read_error = |source| IngestError::Read {
        path: path.to_path_buf(),
        source,
    };
    let path = tokio::fs::canonicalize(path).await.map_err(read_error)?;
    let text = tokio::fs::read_to_string(&path)
        .await
        .map_err(|source| IngestError::Read {
            path: path.clone(),
            source,
        })?;

    let source = source_id
        .map(str::to_string)
        .unwrap_or_else(|| path.display().to_string());
    let chunks = chunk_text(&text, knowledge.chunk_size, knowledge.chunk_overlap);
    if chunks.is_empty() {
        return Err(IngestError::Empty(path));
    }
    tracing::info!(path = %path.display(), chunks = chunks.len(), "chunked document");

    let store = QdrantKnowledge::new(knowledge.clone())?;
    store.ensure_collection().await?;
    Ok(store.upsert(&source, &chunks).await?)
}
