//! OpenAI-compatible embeddings endpoint (`POST {base}/embeddings`).
//! Groq is the default deployment; any server speaking the same schema works.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::config::EmbeddingConfig;
use crate::embed::{EmbedError, Embedder};

pub const DEFAULT_BASE_URL: &str = "https://api.groq.com/openai/v1";
pub const DEFAULT_EMBED_MODEL: &str = "nomic-embed-text-v1.5";
pub const DEFAULT_API_KEY_ENV: &str = "GROQ_API_KEY";

#[derive(Debug, Clone)]
pub struct OpenAiEmbedder {
    http: reqwest::Client,
    endpoint: Url,
    model: String,
    api_key: Option<String>,
    key_env: String,
}

#[derive(Serialize)]
struct EmbeddingsRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingItem>,
}

#[derive(Deserialize)]
struct EmbeddingItem {
    #[serde(default)]
    index: Option<usize>,
    embedding: Vec<f32>,
}

impl OpenAiEmbedder {
    /// `base_url` is the API root (e.g. `https://api.openai.com/v1`); the
    /// `embeddings` path is appended. A missing key is only reported when a
    /// call is made.
    pub fn new(base_url: &str, model: impl Into<String>, api_key: Option<String>) -> Result<Self, EmbedError> {
        let mut base = Url::parse(base_url)?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Ok(Self {
            http: reqwest::Client::new(),
            endpoint: base.join("embeddings")?,
            model: model.into(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            key_env: DEFAULT_API_KEY_ENV.to_string(),
        })
    }

    /// Reads the key from the environment variable named in the config.
    pub fn from_config(config: &EmbeddingConfig) -> Result<Self, EmbedError> {
        let base = config.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL);
        let key = std::env::var(&config.api_key_env).ok();
        let mut embedder = Self::new(base, config.model.clone(), key)?;
        embedder.key_env = config.api_key_env.clone();
        Ok(embedder)
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        let key = self
            .api_key
            .as_deref()
            .ok_or_else(|| EmbedError::MissingApiKey(self.key_env.clone()))?;
        let body = EmbeddingsRequest {
            model: &self.model,
            input: texts,
        };
        let response = self
            .http
            .post(self.endpoint.clone())
            .bearer_auth(key)
            .json(&body)
            .send()
            .await
            .map_err(|e| EmbedError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let code = status.as_u16();
            return Err(match code {
                401 | 403 => EmbedError::Unauthorized(code),
                429 => EmbedError::RateLimited,
                _ => EmbedError::Status {
                    status: code,
                    body: response.text().await.unwrap_or_default(),
                },
            });
        }

        let parsed: EmbeddingsResponse = response
            .json()
            .await
            .map_err(|e| EmbedError::Malformed(e.to_string()))?;
        order_by_index(parsed.data, texts.len())
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Puts items back in input order using their `index` field when present.
fn order_by_index(items: Vec<EmbeddingItem>, expected: usize) -> Result<Vec<Vec<f32>>, EmbedError> {
    if items.len() != expected {
        return Err(EmbedError::Malformed(format!(
            "expected {expected} embeddings, got {}",
            items.len()
        )));
    }
    if items.iter().all(|i| i.index.is_none()) {
        return Ok(items.into_iter().map(|i| i.embedding).collect());
    }
    let mut slots: Vec<Option<Vec<f32>>> = vec![None; expected];
    for item in items {
        let idx = item
            .index
            .filter(|&i| i < expected)
            .ok_or_else(|| EmbedError::Malformed("embedding index missing or out of range".into()))?;
        if slots[idx].replace(item.embedding).is_some() {
            return Err(EmbedError::Malformed(format!("duplicate embedding index {idx}")));
        }
    }
    slots
        .into_iter()
        .map(|s| s.ok_or_else(|| EmbedError::Malformed("embedding index missing".into())))
        .collect()
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn texts(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn endpoint_keeps_base_path() {
        let e = OpenAiEmbedder::new("https://api.groq.com/openai/v1", "m", None).unwrap();
        assert_eq!(e.endpoint().as_str(), "https://api.groq.com/openai/v1/embeddings");
        let e = OpenAiEmbedder::new("http://localhost:8080/", "m", None).unwrap();
        assert_eq!(e.endpoint().as_str(), "http://localhost:8080/embeddings");
    }

    #[tokio::test]
    async fn sends_batch_and_reorders_by_index() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/embeddings"))
            .and(header("authorization", "Bearer secret"))
            .and(body_json(serde_json::json!({"model": "m", "input": ["a", "b"]})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [
                    {"index": 1, "embedding": [0.0, 1.0]},
                    {"index": 0, "embedding": [1.0, 0.0]}
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let e = OpenAiEmbedder::new(&format!("{}/v1", server.uri()), "m", Some("secret".into())).unwrap();
        let out = e.embed(&texts(&["a", "b"])).await.unwrap();
        assert_eq!(out, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    }

    #[tokio::test]
    async fn maps_http_failures() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;
        let e = OpenAiEmbedder::new(&server.uri(), "m", Some("bad".into())).unwrap();
        let err = e.embed(&texts(&["a"])).await.unwrap_err();
        assert!(matches!(err, EmbedError::Unauthorized(401)));
        assert!(!err.is_retryable());

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;
        let e = OpenAiEmbedder::new(&server.uri(), "m", Some("k".into())).unwrap();
        let err = e.embed(&texts(&["a"])).await.unwrap_err();
        assert!(matches!(err, EmbedError::RateLimited));
        assert!(err.is_retryable());

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .mount(&server)
            .await;
        let e = OpenAiEmbedder::new(&server.uri(), "m", Some("k".into())).unwrap();
        let err = e.embed(&texts(&["a"])).await.unwrap_err();
        assert!(matches!(err, EmbedError::Status { status: 503, ref body } if body == "overloaded"));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn missing_key_fails_without_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;
        let e = OpenAiEmbedder::new(&server.uri(), "m", Some("  ".into())).unwrap();
        let err = e.embed(&texts(&["a"])).await.unwrap_err();
        assert!(matches!(err, EmbedError::MissingApiKey(_)));
    }

    #[tokio::test]
    async fn short_response_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [{"embedding": [1.0]}]
            })))
            .mount(&server)
            .await;
        let e = OpenAiEmbedder::new(&server.uri(), "m", Some("k".into())).unwrap();
        let err = e.embed(&texts(&["a", "b"])).await.unwrap_err();
        assert!(matches!(err, EmbedError::Malformed(_)));
    }
}
