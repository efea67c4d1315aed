//! The memory engine facade.
//!
//! [`MemoryEngine`] wires the classifier, embedder, and store together and
//! owns the background decay worker. The store (a single SQLite connection
//! behind a mutex) is the only shared mutable resource; embedding happens
//! before the lock is taken, so provider latency never blocks readers.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rusqlite::Connection;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::EngramConfig;
use crate::db;
use crate::embedding::Embedder;
use crate::error::{EngineError, Result};
use crate::memory::classify::Classifier;
use crate::memory::maintenance::{self, DecayOutcome};
use crate::memory::recall::{self, RecallConfig, RecallFilter, RecallHit};
use crate::memory::stats::{self, StatsResponse};
use crate::memory::store::{self, InsertResult, MemoryPage, NewMemory};
use crate::memory::types::{Memory, Sector, Waypoint};
use crate::memory::forget;

/// Options for [`MemoryEngine::add`].
#[derive(Debug, Default)]
pub struct AddOptions {
    /// Caller-supplied id; collisions are a [`EngineError::Conflict`].
    pub id: Option<String>,
    pub user_id: Option<String>,
    pub tags: Vec<String>,
    pub meta: Option<serde_json::Value>,
}

/// Options for [`MemoryEngine::query`].
#[derive(Debug, Default)]
pub struct QueryOptions {
    pub user_id: Option<String>,
    /// Pin the scan to one sector instead of classifying the query.
    pub sector: Option<Sector>,
    pub tag: Option<String>,
    /// Result count; falls back to the configured default.
    pub limit: Option<usize>,
    /// Composite score floor; falls back to the configured default.
    pub min_score: Option<f64>,
}

/// Outcome of a successful add.
#[derive(Debug, Serialize)]
pub struct AddOutcome {
    pub id: String,
    pub primary_sector: Sector,
    pub sectors: Vec<Sector>,
    pub waypoint: Option<Waypoint>,
    pub reciprocal: Option<Waypoint>,
}

/// The engine. Construct with [`MemoryEngine::open`], share via `Arc`.
pub struct MemoryEngine {
    db: Mutex<Connection>,
    db_path: Option<PathBuf>,
    embedder: Embedder,
    classifier: Classifier,
    config: EngramConfig,
    shutdown_tx: watch::Sender<bool>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl MemoryEngine {
    /// Open the engine against the configured on-disk database.
    pub fn open(config: EngramConfig) -> Result<Arc<Self>> {
        let path = config.resolved_db_path();
        let conn = db::open_database(&path)
            .map_err(|e| EngineError::StoreFailed(e.to_string()))?;
        Self::from_connection(conn, Some(path), config)
    }

    /// Open an engine over an in-memory database (tests, scratch use).
    pub fn open_in_memory(config: EngramConfig) -> Result<Arc<Self>> {
        let conn = db::open_memory_database()
            .map_err(|e| EngineError::StoreFailed(e.to_string()))?;
        Self::from_connection(conn, None, config)
    }

    fn from_connection(
        conn: Connection,
        db_path: Option<PathBuf>,
        config: EngramConfig,
    ) -> Result<Arc<Self>> {
        let embedder = Embedder::from_config(&config.embedding)?;
        db::migrations::set_embedding_tier(&conn, embedder.tier().as_str())?;
        let (shutdown_tx, _) = watch::channel(false);
        info!(tier = %embedder.tier(), provider = %config.embedding.provider, "engine ready");
        Ok(Arc::new(Self {
            db: Mutex::new(conn),
            db_path,
            embedder,
            classifier: Classifier::default(),
            config,
            shutdown_tx,
            worker: Mutex::new(None),
        }))
    }

    /// Classify, embed, and persist a new memory, linking it into the
    /// waypoint graph. Fails only if the primary-sector embedding or the
    /// store write fails; other sector failures are logged and dropped.
    pub async fn add(&self, content: &str, opts: AddOptions) -> Result<AddOutcome> {
        if content.trim().is_empty() {
            return Err(EngineError::InvalidInput("content must not be empty".into()));
        }

        let classification = self.classifier.classify(content);
        let primary = classification.primary;
        let sectors = classification.candidate_sectors();

        let batch = self.embedder.embed_batch(content, &sectors).await;

        let mut conn = self.lock_db();
        store::write_embed_logs(&conn, &batch.log)?;

        if !batch.vectors.contains_key(&primary) {
            // The primary failure is fatal for the whole add.
            return Err(batch
                .failures
                .into_iter()
                .find(|(s, _)| *s == primary)
                .map(|(_, e)| e)
                .unwrap_or(EngineError::EmbedFailed {
                    sector: primary,
                    provider: self.config.embedding.provider.clone(),
                    reason: "no vector produced".into(),
                }));
        }

        let result: InsertResult = store::insert_memory(
            &mut conn,
            &NewMemory {
                id: opts.id.as_deref(),
                user_id: opts.user_id.as_deref(),
                content,
                primary_sector: primary,
                tags: &opts.tags,
                meta: opts.meta.as_ref(),
            },
            &batch.vectors,
            self.config.embedding.mean_dim,
            self.config.engine.waypoint_threshold,
            db::now_ms(),
        )?;

        Ok(AddOutcome {
            id: result.id,
            primary_sector: primary,
            sectors: result.sectors,
            waypoint: result.waypoint,
            reciprocal: result.reciprocal,
        })
    }

    /// Similarity query with waypoint expansion, composite scoring, and
    /// implicit reinforcement of every returned memory.
    pub async fn query(&self, text: &str, opts: QueryOptions) -> Result<Vec<RecallHit>> {
        if text.trim().is_empty() {
            return Err(EngineError::InvalidInput("query must not be empty".into()));
        }

        let sectors = match opts.sector {
            Some(s) => vec![s],
            None => self.classifier.classify(text).candidate_sectors(),
        };

        let batch = self.embedder.embed_batch(text, &sectors).await;
        let query_vecs: Vec<(Sector, Vec<f32>)> = batch.vectors.clone().into_iter().collect();

        let conn = self.lock_db();
        store::write_embed_logs(&conn, &batch.log)?;

        if query_vecs.is_empty() {
            return Err(batch.failures.into_iter().next().map(|(_, e)| e).unwrap_or(
                EngineError::EmbedFailed {
                    sector: sectors[0],
                    provider: self.config.embedding.provider.clone(),
                    reason: "query embedding produced no vectors".into(),
                },
            ));
        }

        recall::recall_by_query(
            &conn,
            &query_vecs,
            text,
            &RecallFilter {
                user_id: opts.user_id.as_deref(),
                sector: opts.sector,
                tag: opts.tag.as_deref(),
                min_score: opts.min_score.unwrap_or(self.config.engine.min_score),
            },
            &RecallConfig {
                limit: opts.limit.unwrap_or(self.config.engine.default_limit),
                tier: self.embedder.tier(),
                salience_delta: self.config.engine.salience_reinforce_delta,
                waypoint_delta: self.config.engine.waypoint_reinforce_delta,
            },
            db::now_ms(),
        )
    }

    /// Fetch one memory by id.
    pub fn get(&self, id: &str) -> Result<Memory> {
        store::get_memory(&self.lock_db(), id)
    }

    /// Page through memories with optional filters.
    pub fn list(
        &self,
        user_id: Option<&str>,
        sector: Option<Sector>,
        tag: Option<&str>,
        cursor: Option<&str>,
        limit: usize,
    ) -> Result<MemoryPage> {
        store::list_memories(&self.lock_db(), user_id, sector, tag, cursor, limit)
    }

    /// Explicitly bump a memory's salience. Returns the new value.
    pub fn reinforce(&self, id: &str, delta: Option<f64>) -> Result<f64> {
        let delta = delta.unwrap_or(self.config.engine.salience_reinforce_delta);
        if delta <= 0.0 {
            return Err(EngineError::InvalidInput(
                "reinforce delta must be positive".into(),
            ));
        }
        store::reinforce_memory(&self.lock_db(), id, delta, db::now_ms())
    }

    /// Permanently delete a memory.
    pub fn delete(&self, id: &str) -> Result<forget::DeleteResult> {
        forget::delete_memory(&mut self.lock_db(), id)
    }

    /// Store-wide statistics.
    pub fn stats(&self, user_id: Option<&str>) -> Result<StatsResponse> {
        stats::memory_stats(&self.lock_db(), user_id, self.db_path.as_deref())
    }

    /// Run one decay cycle now, outside the periodic schedule.
    pub fn run_decay(&self) -> Result<DecayOutcome> {
        maintenance::run_decay_cycle(&mut self.lock_db(), &self.config.decay, db::now_ms())
    }

    /// Spawn the periodic decay worker. Idempotent per engine: a second
    /// call replaces nothing and the old worker keeps running.
    pub fn spawn_decay_worker(self: &Arc<Self>) {
        let mut slot = self.worker.lock().expect("worker slot poisoned");
        if slot.is_some() {
            return;
        }

        let engine = Arc::clone(self);
        let interval = Duration::from_secs(self.config.decay.decay_interval_minutes * 60);
        let mut rx = self.shutdown_tx.subscribe();
        let handle = tokio::spawn(async move {
            info!(interval_minutes = interval.as_secs() / 60, "decay worker started");
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {
                        match engine.run_decay() {
                            Ok(outcome) => info!(
                                scanned = outcome.scanned,
                                decayed = outcome.decayed,
                                compressed = outcome.compressed,
                                pruned = outcome.pruned_edges,
                                "decay cycle complete"
                            ),
                            // Back off to the next tick on a whole-cycle failure.
                            Err(err) => warn!(?err, "decay cycle failed"),
                        }
                    }
                    changed = rx.changed() => {
                        if changed.is_ok() && *rx.borrow() {
                            break;
                        }
                    }
                }
            }
            info!("decay worker stopped");
        });
        *slot = Some(handle);
    }

    /// Signal the decay worker and wait for it to finish. Safe to call
    /// multiple times; the store stays usable afterwards.
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
        let handle = self.worker.lock().expect("worker slot poisoned").take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }

    fn lock_db(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.db.lock().expect("store lock poisoned")
    }
}
