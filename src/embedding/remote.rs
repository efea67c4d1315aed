//! HTTP embedding providers.
//!
//! One client covers the OpenAI-compatible family (`openai`, `local`, and
//! `aws` behind a gateway endpoint), Ollama's native API, and Gemini. API
//! keys come from the environment (`OPENAI_API_KEY`, `GEMINI_API_KEY`,
//! `AWS_API_KEY`); endpoints from `provider_endpoint` with per-provider
//! defaults where a public one exists.

use async_trait::async_trait;
use serde_json::json;

use super::{EmbedRequest, EmbeddingProvider};
use crate::config::EmbeddingConfig;
use crate::error::{EngineError, Result};
use crate::memory::l2_normalize;
use crate::memory::types::Sector;

/// Which wire protocol to speak.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Protocol {
    /// `POST {base}/embeddings` with `{model, input, dimensions}`.
    OpenAiCompatible,
    /// `POST {base}/api/embed` with `{model, input}`.
    Ollama,
    /// `POST {base}/v1beta/models/{model}:batchEmbedContents?key=…`.
    Gemini,
}

/// A remote embedding backend over HTTP.
pub struct RemoteProvider {
    name: &'static str,
    protocol: Protocol,
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

impl RemoteProvider {
    pub fn from_config(kind: &str, config: &EmbeddingConfig) -> Result<Self> {
        let endpoint = config.provider_endpoint.as_deref();
        let (name, protocol, base_url, default_model, key_var): (
            &'static str,
            Protocol,
            String,
            &str,
            Option<&str>,
        ) = match kind {
            "openai" => (
                "openai",
                Protocol::OpenAiCompatible,
                endpoint.unwrap_or("https://api.openai.com/v1").to_string(),
                "text-embedding-3-small",
                Some("OPENAI_API_KEY"),
            ),
            "gemini" => (
                "gemini",
                Protocol::Gemini,
                endpoint
                    .unwrap_or("https://generativelanguage.googleapis.com")
                    .to_string(),
                "text-embedding-004",
                Some("GEMINI_API_KEY"),
            ),
            "aws" => (
                "aws",
                Protocol::OpenAiCompatible,
                endpoint
                    .ok_or_else(|| {
                        EngineError::InvalidInput(
                            "provider_endpoint is required for the aws provider".into(),
                        )
                    })?
                    .to_string(),
                "amazon.titan-embed-text-v2:0",
                Some("AWS_API_KEY"),
            ),
            "ollama" => (
                "ollama",
                Protocol::Ollama,
                endpoint
                    .ok_or_else(|| {
                        EngineError::InvalidInput(
                            "provider_endpoint is required for the ollama provider".into(),
                        )
                    })?
                    .to_string(),
                "nomic-embed-text",
                None,
            ),
            "local" => (
                "local",
                Protocol::OpenAiCompatible,
                endpoint
                    .ok_or_else(|| {
                        EngineError::InvalidInput(
                            "provider_endpoint is required for the local provider".into(),
                        )
                    })?
                    .to_string(),
                "all-MiniLM-L6-v2",
                None,
            ),
            other => {
                return Err(EngineError::InvalidInput(format!(
                    "unknown remote provider: {other}"
                )))
            }
        };

        Ok(Self {
            name,
            protocol,
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: config.model.clone().unwrap_or_else(|| default_model.into()),
            api_key: key_var.and_then(|v| std::env::var(v).ok()),
        })
    }

    fn embed_failed(&self, sector: Sector, reason: impl Into<String>) -> EngineError {
        EngineError::EmbedFailed {
            sector,
            provider: self.name.to_string(),
            reason: reason.into(),
        }
    }

    async fn call_openai_compatible(
        &self,
        texts: &[&str],
        sector: Sector,
        dim: usize,
    ) -> Result<Vec<Vec<f32>>> {
        let endpoint = format!("{}/embeddings", self.base_url);
        let payload = json!({
            "model": self.model,
            "input": texts,
            "dimensions": dim,
        });

        let mut request = self.client.post(endpoint).json(&payload);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        let response = request
            .send()
            .await
            .map_err(|e| self.embed_failed(sector, format!("request failed: {e}")))?;

        let status = response.status();
        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| self.embed_failed(sector, format!("invalid response body: {e}")))?;
        if !status.is_success() {
            return Err(self.embed_failed(sector, format!("{} error ({status}): {body}", self.name)));
        }

        let data = body
            .get("data")
            .and_then(|d| d.as_array())
            .ok_or_else(|| self.embed_failed(sector, format!("response missing data: {body}")))?;
        data.iter()
            .map(|entry| parse_floats(entry.get("embedding")))
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| self.embed_failed(sector, "response missing embedding values"))
    }

    async fn call_ollama(&self, texts: &[&str], sector: Sector) -> Result<Vec<Vec<f32>>> {
        let endpoint = format!("{}/api/embed", self.base_url);
        let payload = json!({
            "model": self.model,
            "input": texts,
        });

        let response = self
            .client
            .post(endpoint)
            .json(&payload)
            .send()
            .await
            .map_err(|e| self.embed_failed(sector, format!("request failed: {e}")))?;

        let status = response.status();
        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| self.embed_failed(sector, format!("invalid response body: {e}")))?;
        if !status.is_success() {
            return Err(self.embed_failed(sector, format!("ollama error ({status}): {body}")));
        }

        body.get("embeddings")
            .and_then(|e| e.as_array())
            .and_then(|rows| {
                rows.iter()
                    .map(|row| parse_floats(Some(row)))
                    .collect::<Option<Vec<_>>>()
            })
            .ok_or_else(|| self.embed_failed(sector, format!("response missing embeddings: {body}")))
    }

    async fn call_gemini(&self, texts: &[&str], sector: Sector, dim: usize) -> Result<Vec<Vec<f32>>> {
        let key = self.api_key.as_deref().unwrap_or_default();
        let endpoint = format!(
            "{}/v1beta/models/{}:batchEmbedContents?key={key}",
            self.base_url, self.model
        );
        let requests: Vec<serde_json::Value> = texts
            .iter()
            .map(|t| {
                json!({
                    "model": format!("models/{}", self.model),
                    "content": { "parts": [{ "text": t }] },
                    "outputDimensionality": dim,
                })
            })
            .collect();

        let response = self
            .client
            .post(endpoint)
            .json(&json!({ "requests": requests }))
            .send()
            .await
            .map_err(|e| self.embed_failed(sector, format!("request failed: {e}")))?;

        let status = response.status();
        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| self.embed_failed(sector, format!("invalid response body: {e}")))?;
        if !status.is_success() {
            return Err(self.embed_failed(sector, format!("gemini error ({status}): {body}")));
        }

        body.get("embeddings")
            .and_then(|e| e.as_array())
            .and_then(|rows| {
                rows.iter()
                    .map(|row| parse_floats(row.get("values")))
                    .collect::<Option<Vec<_>>>()
            })
            .ok_or_else(|| self.embed_failed(sector, format!("response missing embeddings: {body}")))
    }
}

#[async_trait]
impl EmbeddingProvider for RemoteProvider {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn embed(&self, requests: &[EmbedRequest]) -> Result<Vec<Vec<f32>>> {
        if requests.is_empty() {
            return Ok(Vec::new());
        }
        let texts: Vec<&str> = requests.iter().map(|r| r.text.as_str()).collect();
        let sector = requests[0].sector;
        let dim = requests[0].dim;

        let raw = match self.protocol {
            Protocol::OpenAiCompatible => self.call_openai_compatible(&texts, sector, dim).await?,
            Protocol::Ollama => self.call_ollama(&texts, sector).await?,
            Protocol::Gemini => self.call_gemini(&texts, sector, dim).await?,
        };

        Ok(raw
            .into_iter()
            .zip(requests)
            .map(|(v, req)| fit_dim(v, req.dim))
            .collect())
    }
}

/// Truncate an over-long vector to the requested dim and renormalize.
/// Under-long vectors pass through and are rejected upstream.
fn fit_dim(mut v: Vec<f32>, dim: usize) -> Vec<f32> {
    if v.len() > dim {
        v.truncate(dim);
        l2_normalize(&mut v);
    }
    v
}

fn parse_floats(value: Option<&serde_json::Value>) -> Option<Vec<f32>> {
    value?
        .as_array()?
        .iter()
        .map(|x| x.as_f64().map(|f| f as f32))
        .collect()
}
