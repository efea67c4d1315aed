#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Arc;

use engram::config::EngramConfig;
use engram::db;
use engram::memory::store::{insert_memory, NewMemory};
use engram::memory::types::Sector;
use engram::MemoryEngine;
use rusqlite::Connection;

/// Open a fresh in-memory database with schema and migrations applied.
pub fn test_conn() -> Connection {
    db::open_memory_database().unwrap()
}

/// An engine over an in-memory store, fast tier, synthetic provider.
pub fn fast_engine() -> Arc<MemoryEngine> {
    MemoryEngine::open_in_memory(EngramConfig::default()).unwrap()
}

/// An engine with a tweaked configuration.
pub fn engine_with(f: impl FnOnce(&mut EngramConfig)) -> Arc<MemoryEngine> {
    let mut config = EngramConfig::default();
    f(&mut config);
    MemoryEngine::open_in_memory(config).unwrap()
}

/// Deterministic 256-dim unit vector with a spike at position `i`.
/// Distinct seeds produce orthogonal vectors.
pub fn spike(i: usize) -> Vec<f32> {
    let mut v = vec![0.0f32; 256];
    v[i % 256] = 1.0;
    v
}

/// A unit vector at a controlled cosine to `spike(i)`:
/// `cos(angle(result, spike(i))) == c`.
pub fn at_cosine(i: usize, other: usize, c: f32) -> Vec<f32> {
    let mut v = vec![0.0f32; 256];
    v[i % 256] = c;
    v[other % 256] = (1.0 - c * c).sqrt();
    v
}

/// Insert a memory with explicit sector vectors. Returns the memory ID.
pub fn insert_with_vectors(
    conn: &mut Connection,
    content: &str,
    primary: Sector,
    user: Option<&str>,
    vectors: BTreeMap<Sector, Vec<f32>>,
    waypoint_threshold: f64,
) -> String {
    insert_memory(
        conn,
        &NewMemory {
            id: None,
            user_id: user,
            content,
            primary_sector: primary,
            tags: &[],
            meta: None,
        },
        &vectors,
        256,
        waypoint_threshold,
        db::now_ms(),
    )
    .unwrap()
    .id
}

/// Insert a single-sector memory. Returns the memory ID.
pub fn insert(
    conn: &mut Connection,
    content: &str,
    sector: Sector,
    user: Option<&str>,
    v: Vec<f32>,
) -> String {
    let mut vectors = BTreeMap::new();
    vectors.insert(sector, v);
    insert_with_vectors(conn, content, sector, user, vectors, 0.75)
}

/// Backdate a memory's last_seen_at/created_at and pin its salience.
pub fn age_memory(conn: &Connection, id: &str, salience: f64, days_ago: i64) {
    let then = db::now_ms() - days_ago * 86_400_000;
    conn.execute(
        "UPDATE memories SET salience = ?1, last_seen_at = ?2, created_at = ?2 WHERE id = ?3",
        rusqlite::params![salience, then, id],
    )
    .unwrap();
}
