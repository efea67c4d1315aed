use rusqlite::{params, Connection};
use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;

use crate::error::Result;
use crate::memory::maintenance;
use crate::memory::types::Sector;
use crate::memory::waypoints;

/// Response from the stats operation.
#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub total_memories: u64,
    pub cold_memories: u64,
    pub by_sector: HashMap<String, u64>,
    pub by_heat: HashMap<&'static str, u64>,
    pub waypoints: u64,
    pub embed_calls: u64,
    pub embed_failures: u64,
    pub db_size_bytes: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decay_last_run: Option<i64>,
}

/// Compute store-wide statistics.
///
/// If `user_id` is provided, memory counts are scoped to that user's view
/// (their rows plus the global pool). `db_path` is used for file size; pass
/// None for in-memory databases.
pub fn memory_stats(
    conn: &Connection,
    user_id: Option<&str>,
    db_path: Option<&Path>,
) -> Result<StatsResponse> {
    let (total, cold) = count_memories(conn, user_id)?;
    let by_sector = count_by_sector(conn, user_id)?;
    let by_heat = maintenance::counts_by_heat(conn)?;
    let waypoints = waypoints::count(conn)?;
    let (embed_calls, embed_failures) = count_embed_logs(conn)?;
    let decay_last_run = maintenance::decay_last_run(conn)?;

    let db_size_bytes = db_path
        .and_then(|p| std::fs::metadata(p).ok())
        .map(|m| m.len())
        .unwrap_or(0);

    Ok(StatsResponse {
        total_memories: total,
        cold_memories: cold,
        by_sector,
        by_heat,
        waypoints,
        embed_calls,
        embed_failures,
        db_size_bytes,
        decay_last_run,
    })
}

/// Total and cold counts within the user's view.
fn count_memories(conn: &Connection, user_id: Option<&str>) -> Result<(u64, u64)> {
    let (total, cold): (i64, i64) = match user_id {
        Some(u) => conn.query_row(
            "SELECT COUNT(*), COALESCE(SUM(cold), 0) FROM memories \
             WHERE user_id = ?1 OR user_id IS NULL",
            params![u],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?,
        None => conn.query_row(
            "SELECT COUNT(*), COALESCE(SUM(cold), 0) FROM memories",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?,
    };
    Ok((total as u64, cold as u64))
}

/// Count by primary sector, with zeroes for absent sectors.
fn count_by_sector(conn: &Connection, user_id: Option<&str>) -> Result<HashMap<String, u64>> {
    let mut map = HashMap::new();
    for sector in Sector::TIE_ORDER {
        map.insert(sector.as_str().to_string(), 0);
    }

    let rows: Vec<(String, i64)> = match user_id {
        Some(u) => {
            let mut stmt = conn.prepare(
                "SELECT primary_sector, COUNT(*) FROM memories \
                 WHERE user_id = ?1 OR user_id IS NULL GROUP BY primary_sector",
            )?;
            let collected = stmt
                .query_map(params![u], |row| Ok((row.get(0)?, row.get(1)?)))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            collected
        }
        None => {
            let mut stmt = conn
                .prepare("SELECT primary_sector, COUNT(*) FROM memories GROUP BY primary_sector")?;
            let collected = stmt
                .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            collected
        }
    };

    for (sector, count) in rows {
        map.insert(sector, count as u64);
    }
    Ok(map)
}

/// Embed log totals: calls and failures.
fn count_embed_logs(conn: &Connection) -> Result<(u64, u64)> {
    let (calls, failures): (i64, i64) = conn.query_row(
        "SELECT COUNT(*), COALESCE(SUM(ok = 0), 0) FROM embed_logs",
        [],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;
    Ok((calls as u64, failures as u64))
}
