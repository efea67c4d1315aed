//! Associative waypoint graph.
//!
//! Edges live only in the `waypoints` table; the in-memory graph is derived
//! on demand. The PRIMARY KEY on `src_id` plus the conditional upsert below
//! enforce the single-outgoing-edge invariant at write time: a new edge
//! replaces the old one only when its weight is at least as high.

use rusqlite::{params, Connection, OptionalExtension};

use crate::error::Result;
use crate::memory::types::Waypoint;

/// Upsert the outgoing edge for `src`. Returns `true` when the edge was
/// written, `false` when a stronger edge was kept.
pub fn upsert(conn: &Connection, src: &str, dst: &str, weight: f64, now: i64) -> Result<bool> {
    let weight = weight.clamp(f64::MIN_POSITIVE, 1.0);
    let rows = conn.execute(
        "INSERT INTO waypoints (src_id, dst_id, weight, updated_at) VALUES (?1, ?2, ?3, ?4) \
         ON CONFLICT(src_id) DO UPDATE SET \
           dst_id = excluded.dst_id, weight = excluded.weight, updated_at = excluded.updated_at \
         WHERE excluded.weight >= waypoints.weight",
        params![src, dst, weight, now],
    )?;
    Ok(rows > 0)
}

/// The outgoing edge of `src`, if any.
pub fn outgoing(conn: &Connection, src: &str) -> Result<Option<Waypoint>> {
    let edge = conn
        .query_row(
            "SELECT src_id, dst_id, weight FROM waypoints WHERE src_id = ?1",
            params![src],
            |row| {
                Ok(Waypoint {
                    src_id: row.get(0)?,
                    dst_id: row.get(1)?,
                    weight: row.get(2)?,
                })
            },
        )
        .optional()?;
    Ok(edge)
}

/// Outgoing edges for a batch of sources.
pub fn outgoing_many(conn: &Connection, srcs: &[&str]) -> Result<Vec<Waypoint>> {
    if srcs.is_empty() {
        return Ok(Vec::new());
    }
    let placeholders: Vec<String> = (1..=srcs.len()).map(|i| format!("?{i}")).collect();
    let sql = format!(
        "SELECT src_id, dst_id, weight FROM waypoints WHERE src_id IN ({})",
        placeholders.join(", ")
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(rusqlite::params_from_iter(srcs.iter()), |row| {
            Ok(Waypoint {
                src_id: row.get(0)?,
                dst_id: row.get(1)?,
                weight: row.get(2)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Bump a traversed edge's weight by `delta`, capped at 1.0.
pub fn reinforce(conn: &Connection, src: &str, dst: &str, delta: f64, now: i64) -> Result<()> {
    conn.execute(
        "UPDATE waypoints SET weight = MIN(weight + ?1, 1.0), updated_at = ?2 \
         WHERE src_id = ?3 AND dst_id = ?4",
        params![delta, now, src, dst],
    )?;
    Ok(())
}

/// Delete every edge below `threshold`. Returns the number pruned.
pub fn delete_below(conn: &Connection, threshold: f64) -> Result<usize> {
    let pruned = conn.execute(
        "DELETE FROM waypoints WHERE weight < ?1",
        params![threshold],
    )?;
    Ok(pruned)
}

/// Total edge count.
pub fn count(conn: &Connection) -> Result<u64> {
    let n: i64 = conn.query_row("SELECT COUNT(*) FROM waypoints", [], |row| row.get(0))?;
    Ok(n as u64)
}
