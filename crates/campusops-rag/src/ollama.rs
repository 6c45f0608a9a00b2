//! Local Ollama server as an embedding provider. Wraps ollama-rs; no API key.

use async_trait::async_trait;
use ollama_rs::generation::embeddings::request::{EmbeddingsInput, GenerateEmbeddingsRequest};
use ollama_rs::Ollama;

use crate::config::EmbeddingConfig;
use crate::embed::{EmbedError, Embedder};

pub const DEFAULT_EMBED_MODEL: &str = "nomic-embed-text";
pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";

#[derive(Debug, Clone)]
pub struct OllamaEmbedder {
    inner: Ollama,
    embed_model: String,
}

impl OllamaEmbedder {
    /// Create from URL string, e.g. `http://localhost:11434`.
    pub fn from_url(url: &str) -> Result<Self, EmbedError> {
        let inner = Ollama::try_new(url)?;
        Ok(Self {
            inner,
            embed_model: DEFAULT_EMBED_MODEL.to_string(),
        })
    }

    pub fn from_config(config: &EmbeddingConfig) -> Result<Self, EmbedError> {
        let url = config.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL);
        Ok(Self::from_url(url)?.with_embed_model(config.model.clone()))
    }

    /// Set the embedding model (e.g. `nomic-embed-text`, `all-minilm`).
    pub fn with_embed_model(mut self, model: impl Into<String>) -> Self {
        self.embed_model = model.into();
        self
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let input = match texts {
            [single] => EmbeddingsInput::Single(single.clone()),
            _ => EmbeddingsInput::Multiple(texts.to_vec()),
        };
        let req = GenerateEmbeddingsRequest::new(self.embed_model.clone(), input);
        let res = self.inner.generate_embeddings(req).await?;
        Ok(res.embeddings)
    }

    fn model_name(&self) -> &str {
        &self.embed_model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_bad_url() {
        assert!(matches!(OllamaEmbedder::from_url("not a url"), Err(EmbedError::Url(_))));
    }

    #[test]
    fn model_is_configurable() {
        let e = OllamaEmbedder::from_url(DEFAULT_BASE_URL)
            .unwrap()
            .with_embed_model("all-minilm");
        assert_eq!(e.model_name(), "all-minilm");
    }
}
