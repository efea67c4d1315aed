//! Lifecycle maintenance — salience decay, cold compression, and waypoint
//! pruning.
//!
//! [`run_decay_cycle`] is invoked periodically by the engine's background
//! worker and on demand. Memories are processed in shards by
//! `hash(id) mod shards`; every row updates in its own statement, so a crash
//! mid-cycle loses only in-flight rows. Per-memory failures are logged and
//! skipped.

use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use std::collections::HashMap;

use crate::config::DecayConfig;
use crate::embedding::synthetic::fnv1a64;
use crate::error::Result;
use crate::memory::store::{self, write_audit_log};
use crate::memory::waypoints;

/// Salience at or above this is hot.
pub const HOT_FLOOR: f64 = 0.5;
/// Salience at or above this (but below hot) is warm; below is cold.
pub const WARM_FLOOR: f64 = 0.25;

/// Number of Unicode scalar values kept in a fingerprint prefix.
const FINGERPRINT_PREFIX: usize = 64;

/// Salience-derived storage tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HeatTier {
    Hot,
    Warm,
    Cold,
}

impl HeatTier {
    pub fn for_salience(salience: f64) -> Self {
        if salience >= HOT_FLOOR {
            Self::Hot
        } else if salience >= WARM_FLOOR {
            Self::Warm
        } else {
            Self::Cold
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hot => "hot",
            Self::Warm => "warm",
            Self::Cold => "cold",
        }
    }
}

/// Summary of one decay cycle.
#[derive(Debug, Default, Serialize)]
pub struct DecayOutcome {
    pub scanned: usize,
    pub decayed: usize,
    pub compressed: usize,
    pub skipped_errors: usize,
    pub pruned_edges: usize,
}

struct DecayRow {
    id: String,
    content: String,
    salience: f64,
    last_seen_at: i64,
    decay_lambda: f64,
    cold: bool,
}

/// Run one full decay cycle over every memory, shard by shard, then prune
/// weak waypoints if the pruning cadence has elapsed.
pub fn run_decay_cycle(
    conn: &mut Connection,
    config: &DecayConfig,
    now: i64,
) -> Result<DecayOutcome> {
    let mut outcome = DecayOutcome::default();
    let shards = config.shards.max(1);

    for shard in 0..shards {
        let rows = fetch_shard(conn, shard, shards)?;
        let mut decayed = 0usize;
        let mut compressed = 0usize;

        for row in &rows {
            outcome.scanned += 1;
            match decay_one(conn, row, now) {
                Ok(DecayAction::Unchanged) => {}
                Ok(DecayAction::Decayed) => decayed += 1,
                Ok(DecayAction::Compressed) => {
                    decayed += 1;
                    compressed += 1;
                }
                Err(e) => {
                    outcome.skipped_errors += 1;
                    tracing::warn!(id = %row.id, error = %e, "decay skipped memory");
                }
            }
        }

        if decayed > 0 {
            write_audit_log(
                conn,
                "decay",
                &format!("batch:shard{shard}"),
                Some(&serde_json::json!({
                    "shard": shard,
                    "decayed": decayed,
                    "compressed": compressed,
                })),
            )?;
        }
        outcome.decayed += decayed;
        outcome.compressed += compressed;
    }

    outcome.pruned_edges = maybe_prune_waypoints(conn, config, now)?;
    set_meta(conn, "decay_last_run", &now.to_string())?;

    Ok(outcome)
}

enum DecayAction {
    Unchanged,
    Decayed,
    Compressed,
}

/// Apply exponential decay to one memory and compress it if it crossed
/// into the cold band.
fn decay_one(conn: &mut Connection, row: &DecayRow, now: i64) -> Result<DecayAction> {
    let days = (now - row.last_seen_at).max(0) as f64 / 86_400_000.0;
    let new_salience = row.salience * (-row.decay_lambda * days).exp();
    if (new_salience - row.salience).abs() < 1e-6 {
        return Ok(DecayAction::Unchanged);
    }

    store::update_salience(conn, &row.id, new_salience, row.last_seen_at)?;

    if !row.cold && HeatTier::for_salience(new_salience) == HeatTier::Cold {
        let fp = fingerprint(&row.content);
        store::replace_content(conn, &row.id, &fp, now)?;
        return Ok(DecayAction::Compressed);
    }
    Ok(DecayAction::Decayed)
}

/// Lossy compressed form of cold content: the first 64 Unicode scalar
/// values plus a stable hash of the full text. One-way by design.
pub fn fingerprint(content: &str) -> String {
    let prefix: String = content.chars().take(FINGERPRINT_PREFIX).collect();
    format!("{prefix}…#{:016x}", fnv1a64(content))
}

/// Prune weak waypoints when the cadence has elapsed. The first cycle on a
/// fresh store prunes immediately and starts the clock.
fn maybe_prune_waypoints(conn: &Connection, config: &DecayConfig, now: i64) -> Result<usize> {
    let cadence_ms = config.waypoint_prune_days as i64 * 86_400_000;
    if let Some(last) = get_meta(conn, "waypoints_pruned_at")? {
        if now - last < cadence_ms {
            return Ok(0);
        }
    }

    let pruned = waypoints::delete_below(conn, config.waypoint_prune_weight)?;
    set_meta(conn, "waypoints_pruned_at", &now.to_string())?;
    if pruned > 0 {
        write_audit_log(
            conn,
            "prune",
            "batch:waypoints",
            Some(&serde_json::json!({
                "pruned": pruned,
                "threshold": config.waypoint_prune_weight,
            })),
        )?;
        tracing::info!(pruned, threshold = config.waypoint_prune_weight, "waypoints pruned");
    }
    Ok(pruned)
}

/// Epoch-ms of the last completed decay cycle, if any.
pub fn decay_last_run(conn: &Connection) -> Result<Option<i64>> {
    get_meta(conn, "decay_last_run")
}

fn fetch_shard(conn: &Connection, shard: u32, shards: u32) -> Result<Vec<DecayRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, content, salience, last_seen_at, decay_lambda, cold FROM memories",
    )?;
    let rows = stmt
        .query_map([], |row| {
            Ok(DecayRow {
                id: row.get(0)?,
                content: row.get(1)?,
                salience: row.get(2)?,
                last_seen_at: row.get(3)?,
                decay_lambda: row.get(4)?,
                cold: row.get(5)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows
        .into_iter()
        .filter(|r| fnv1a64(&r.id) % shards as u64 == shard as u64)
        .collect())
}

fn get_meta(conn: &Connection, key: &str) -> Result<Option<i64>> {
    let value: Option<String> = conn
        .query_row(
            "SELECT value FROM schema_meta WHERE key = ?1",
            params![key],
            |row| row.get(0),
        )
        .optional()?;
    Ok(value.and_then(|v| v.parse().ok()))
}

fn set_meta(conn: &Connection, key: &str, value: &str) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO schema_meta (key, value) VALUES (?1, ?2)",
        params![key, value],
    )?;
    Ok(())
}

/// Counts of memories per heat tier, for stats.
pub fn counts_by_heat(conn: &Connection) -> Result<HashMap<&'static str, u64>> {
    let mut map = HashMap::new();
    for tier in [HeatTier::Hot, HeatTier::Warm, HeatTier::Cold] {
        map.insert(tier.as_str(), 0);
    }
    let mut stmt = conn.prepare("SELECT salience FROM memories")?;
    let saliences = stmt
        .query_map([], |row| row.get::<_, f64>(0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    for s in saliences {
        *map.entry(HeatTier::for_salience(s).as_str()).or_insert(0) += 1;
    }
    Ok(map)
}
