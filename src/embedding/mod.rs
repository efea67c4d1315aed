//! Text-to-vector embedding pipeline.
//!
//! The [`Embedder`] coordinates per-sector embedding across a pluggable
//! [`EmbeddingProvider`] backend, selected once at engine construction and
//! injected. Tier routing decides which sectors go to the provider and at
//! what dimensionality; everything else uses the deterministic synthetic
//! hasher. Every provider call is bounded by a timeout; a failed sector is
//! reported back to the caller rather than failing the whole batch.

pub mod remote;
pub mod synthetic;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::EmbeddingConfig;
use crate::db::now_ms;
use crate::error::{EngineError, Result};
use crate::memory::types::Sector;

/// Dimensions for the synthetic hasher (hybrid/fast tiers).
pub const FAST_DIM: usize = 256;
/// Provider dimensions on the smart tier.
pub const SMART_DIM: usize = 384;
/// Provider dimensions on the deep tier.
pub const DEEP_DIM: usize = 1536;

/// Performance tier controlling embedding dimensionality and provider usage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    /// Synthetic vectors plus a BM25 side channel in the ranker.
    Hybrid,
    /// Synthetic vectors only.
    Fast,
    /// Provider vectors for semantic-class sectors, synthetic for the rest.
    Smart,
    /// Provider vectors for every sector.
    Deep,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hybrid => "hybrid",
            Self::Fast => "fast",
            Self::Smart => "smart",
            Self::Deep => "deep",
        }
    }
}

impl std::str::FromStr for Tier {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "hybrid" => Ok(Self::Hybrid),
            "fast" => Ok(Self::Fast),
            "smart" => Ok(Self::Smart),
            "deep" => Ok(Self::Deep),
            _ => Err(format!("unknown tier: {s}")),
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Batching strategy for provider calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbedMode {
    /// One batched provider call for all sectors of one input.
    Simple,
    /// One provider call per sector.
    Advanced,
}

impl std::str::FromStr for EmbedMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "simple" => Ok(Self::Simple),
            "advanced" => Ok(Self::Advanced),
            _ => Err(format!("unknown embed mode: {s}")),
        }
    }
}

/// One unit of embedding work.
#[derive(Debug, Clone)]
pub struct EmbedRequest {
    pub text: String,
    pub sector: Sector,
    pub dim: usize,
}

/// Trait for embedding backends.
///
/// Implementations return one vector per request, in request order, each of
/// the requested dimension. Remote backends may ignore the sector; the
/// synthetic backend salts its hash with it.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Provider name for logging and the embed log.
    fn name(&self) -> &'static str;

    /// Embed a batch of requests.
    async fn embed(&self, requests: &[EmbedRequest]) -> Result<Vec<Vec<f32>>>;
}

/// One row destined for the append-only `embed_logs` table.
#[derive(Debug, Clone)]
pub struct EmbedLogEntry {
    pub ts: i64,
    pub provider: String,
    pub sector: Sector,
    pub input_tokens: i64,
    pub dim: usize,
    pub ok: bool,
}

/// Result of embedding one input across several sectors.
#[derive(Debug, Default)]
pub struct EmbedBatch {
    pub vectors: BTreeMap<Sector, Vec<f32>>,
    pub failures: Vec<(Sector, EngineError)>,
    pub log: Vec<EmbedLogEntry>,
}

/// The multi-sector embedding coordinator.
pub struct Embedder {
    tier: Tier,
    mode: EmbedMode,
    provider: Arc<dyn EmbeddingProvider>,
    synthetic: synthetic::SyntheticProvider,
    timeout: Duration,
}

impl Embedder {
    /// Build an embedder from configuration, constructing the provider once.
    pub fn from_config(config: &EmbeddingConfig) -> Result<Self> {
        let tier: Tier = config
            .tier
            .parse()
            .map_err(EngineError::InvalidInput)?;
        let mode: EmbedMode = config
            .embed_mode
            .parse()
            .map_err(EngineError::InvalidInput)?;
        let provider = create_provider(config)?;
        Ok(Self {
            tier,
            mode,
            provider,
            synthetic: synthetic::SyntheticProvider::new(),
            timeout: Duration::from_secs(config.timeout_secs),
        })
    }

    pub fn tier(&self) -> Tier {
        self.tier
    }

    /// Dimensionality produced for a sector under the active tier. All
    /// vectors within one (tier, sector) share this dim.
    pub fn dim_for_sector(&self, sector: Sector) -> usize {
        match self.tier {
            Tier::Hybrid | Tier::Fast => FAST_DIM,
            Tier::Smart => {
                if sector.is_semantic_class() {
                    SMART_DIM
                } else {
                    FAST_DIM
                }
            }
            Tier::Deep => DEEP_DIM,
        }
    }

    /// Whether the configured provider backend serves this sector, as
    /// opposed to the built-in synthetic fast path.
    fn uses_provider(&self, sector: Sector) -> bool {
        match self.tier {
            Tier::Hybrid | Tier::Fast => false,
            Tier::Smart => sector.is_semantic_class(),
            Tier::Deep => true,
        }
    }

    /// Embed a single text for a single sector.
    pub async fn embed_one(&self, text: &str, sector: Sector) -> Result<Vec<f32>> {
        let mut batch = self.embed_batch(text, &[sector]).await;
        if let Some(v) = batch.vectors.remove(&sector) {
            return Ok(v);
        }
        match batch.failures.pop() {
            Some((_, e)) => Err(e),
            None => Err(EngineError::EmbedFailed {
                sector,
                provider: self.provider.name().to_string(),
                reason: "no vector produced".into(),
            }),
        }
    }

    /// Embed one text for several sectors, honoring tier routing and the
    /// configured batching mode. Per-sector failures are collected, not
    /// propagated — the caller decides whether a missing sector is fatal.
    pub async fn embed_batch(&self, text: &str, sectors: &[Sector]) -> EmbedBatch {
        let mut batch = EmbedBatch::default();
        let tokens = (text.len() / 4) as i64;

        let mut provider_reqs: Vec<EmbedRequest> = Vec::new();
        for &sector in sectors {
            let dim = self.dim_for_sector(sector);
            if self.uses_provider(sector) {
                provider_reqs.push(EmbedRequest {
                    text: text.to_string(),
                    sector,
                    dim,
                });
            } else {
                // The synthetic fast path cannot fail.
                let v = self.synthetic.embed_sector(text, sector, dim);
                batch.log.push(EmbedLogEntry {
                    ts: now_ms(),
                    provider: "synthetic".into(),
                    sector,
                    input_tokens: tokens,
                    dim,
                    ok: true,
                });
                batch.vectors.insert(sector, v);
            }
        }

        if provider_reqs.is_empty() {
            return batch;
        }

        match self.mode {
            EmbedMode::Simple => {
                self.run_provider_call(&provider_reqs, tokens, &mut batch).await;
            }
            EmbedMode::Advanced => {
                for req in provider_reqs {
                    self.run_provider_call(std::slice::from_ref(&req), tokens, &mut batch)
                        .await;
                }
            }
        }

        batch
    }

    /// Issue one bounded provider call and fold its outcome into `batch`.
    async fn run_provider_call(
        &self,
        requests: &[EmbedRequest],
        tokens: i64,
        batch: &mut EmbedBatch,
    ) {
        let outcome = tokio::time::timeout(self.timeout, self.provider.embed(requests)).await;
        let result = match outcome {
            Ok(r) => r,
            Err(_) => Err(EngineError::Timeout {
                op: format!("embed via {}", self.provider.name()),
            }),
        };

        match result {
            Ok(vectors) => {
                for (req, v) in requests.iter().zip(vectors) {
                    batch.log.push(EmbedLogEntry {
                        ts: now_ms(),
                        provider: self.provider.name().into(),
                        sector: req.sector,
                        input_tokens: tokens,
                        dim: req.dim,
                        ok: v.len() == req.dim,
                    });
                    if v.len() == req.dim {
                        batch.vectors.insert(req.sector, v);
                    } else {
                        batch.failures.push((
                            req.sector,
                            EngineError::EmbedFailed {
                                sector: req.sector,
                                provider: self.provider.name().into(),
                                reason: format!("expected dim {}, got {}", req.dim, v.len()),
                            },
                        ));
                    }
                }
            }
            Err(e) => {
                let reason = match &e {
                    EngineError::EmbedFailed { reason, .. } => reason.clone(),
                    EngineError::Timeout { .. } => "timed out".to_string(),
                    other => other.to_string(),
                };
                for req in requests {
                    tracing::warn!(
                        sector = %req.sector,
                        provider = self.provider.name(),
                        %reason,
                        "sector embedding failed"
                    );
                    batch.log.push(EmbedLogEntry {
                        ts: now_ms(),
                        provider: self.provider.name().into(),
                        sector: req.sector,
                        input_tokens: tokens,
                        dim: req.dim,
                        ok: false,
                    });
                    batch.failures.push((
                        req.sector,
                        EngineError::EmbedFailed {
                            sector: req.sector,
                            provider: self.provider.name().into(),
                            reason: reason.clone(),
                        },
                    ));
                }
            }
        }
    }
}

/// Create an embedding provider from config.
pub fn create_provider(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    match config.provider.as_str() {
        "synthetic" => Ok(Arc::new(synthetic::SyntheticProvider::new())),
        "openai" | "gemini" | "aws" | "ollama" | "local" => Ok(Arc::new(
            remote::RemoteProvider::from_config(&config.provider, config)?,
        )),
        other => Err(EngineError::InvalidInput(format!(
            "unknown embedding provider: {other}. Supported: openai, gemini, aws, ollama, local, synthetic"
        ))),
    }
}
