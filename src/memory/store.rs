//! Write path and row access — atomic inserts, salience updates, cold
//! compression, and the candidate reads that feed recall.
//!
//! [`insert_memory`] is the single entry point for new memories. It runs the
//! full pipeline inside one transaction: conflict check, waypoint-target
//! scan over stored mean vectors, row insert, FTS5 sync, per-sector vector
//! inserts, waypoint upserts, and an audit log entry.

use std::collections::BTreeMap;

use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Transaction};
use serde::Serialize;

use crate::embedding::EmbedLogEntry;
use crate::error::{EngineError, Result};
use crate::memory::types::{Memory, Sector, Waypoint};
use crate::memory::waypoints;
use crate::memory::{cosine, decode_vector, encode_vector, mean_vector};

/// Salience assigned to every new memory.
pub const INITIAL_SALIENCE: f64 = 0.5;

/// A new memory awaiting insertion.
#[derive(Debug)]
pub struct NewMemory<'a> {
    /// Caller-supplied id; generated when absent.
    pub id: Option<&'a str>,
    pub user_id: Option<&'a str>,
    pub content: &'a str,
    pub primary_sector: Sector,
    pub tags: &'a [String],
    pub meta: Option<&'a serde_json::Value>,
}

/// Result returned from an insert.
#[derive(Debug, Serialize)]
pub struct InsertResult {
    pub id: String,
    /// Sectors that obtained vectors.
    pub sectors: Vec<Sector>,
    /// Edge from the new memory to its nearest neighbor, if one qualified.
    pub waypoint: Option<Waypoint>,
    /// Reciprocal edge back from the neighbor, if one was written.
    pub reciprocal: Option<Waypoint>,
}

/// A candidate row for similarity scanning.
#[derive(Debug)]
pub struct SectorCandidate {
    pub id: String,
    pub vec: Vec<f32>,
    pub salience: f64,
    pub last_seen_at: i64,
}

/// One page of a list query.
#[derive(Debug, Serialize)]
pub struct MemoryPage {
    pub memories: Vec<Memory>,
    pub next_cursor: Option<String>,
}

/// Full insert pipeline: conflict check → waypoint scan → insert row →
/// FTS sync → vector inserts → waypoint upserts → audit log.
///
/// All operations run inside a transaction for atomicity.
pub fn insert_memory(
    conn: &mut Connection,
    new: &NewMemory,
    vectors: &BTreeMap<Sector, Vec<f32>>,
    mean_dim: usize,
    waypoint_threshold: f64,
    now: i64,
) -> Result<InsertResult> {
    if new.content.trim().is_empty() {
        return Err(EngineError::InvalidInput("content must not be empty".into()));
    }
    if !vectors.contains_key(&new.primary_sector) {
        return Err(EngineError::InvalidInput(format!(
            "missing vector for primary sector {}",
            new.primary_sector
        )));
    }

    let tx = conn.transaction().map_err(EngineError::from)?;

    // 1. Resolve the id, rejecting collisions on caller-supplied ones.
    let id = match new.id {
        Some(supplied) => {
            let exists: bool = tx.query_row(
                "SELECT COUNT(*) > 0 FROM memories WHERE id = ?1",
                params![supplied],
                |row| row.get(0),
            )?;
            if exists {
                return Err(EngineError::Conflict(supplied.to_string()));
            }
            supplied.to_string()
        }
        None => uuid::Uuid::now_v7().to_string(),
    };

    // 2. Mean vector over the sector vectors present.
    let sector_vecs: Vec<Vec<f32>> = vectors.values().cloned().collect();
    let mean = mean_vector(&sector_vecs, mean_dim);

    // 3. Nearest-neighbor scan for a waypoint target.
    let best = best_waypoint_target(&tx, new.user_id, &mean)?;

    // 4. Insert the memory row.
    let tags_json = serde_json::to_string(new.tags)?;
    let meta_json = new.meta.map(serde_json::to_string).transpose()?;
    tx.execute(
        "INSERT INTO memories (id, user_id, content, primary_sector, tags, meta, \
         created_at, updated_at, last_seen_at, salience, decay_lambda, mean_vec, cold) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7, ?7, ?8, ?9, ?10, 0)",
        params![
            id,
            new.user_id,
            new.content,
            new.primary_sector.as_str(),
            tags_json,
            meta_json,
            now,
            INITIAL_SALIENCE,
            new.primary_sector.decay_lambda(),
            encode_vector(&mean),
        ],
    )?;
    let rowid = tx.last_insert_rowid();

    // 5. Sync the FTS5 index (BM25 channel for the hybrid tier).
    tx.execute(
        "INSERT INTO memories_fts (rowid, content, id) VALUES (?1, ?2, ?3)",
        params![rowid, new.content, id],
    )?;

    // 6. Per-sector vectors.
    for (sector, v) in vectors {
        tx.execute(
            "INSERT INTO vectors (memory_id, sector, dim, v) VALUES (?1, ?2, ?3, ?4)",
            params![id, sector.as_str(), v.len() as i64, encode_vector(v)],
        )?;
    }

    // 7. Waypoints: always link the new memory to its best neighbor; link
    // back only across sectors, and only if the neighbor's existing edge is
    // not stronger.
    let mut waypoint = None;
    let mut reciprocal = None;
    if let Some(target) = best {
        if target.cosine >= waypoint_threshold {
            waypoints::upsert(&tx, &id, &target.id, target.cosine, now)?;
            waypoint = Some(Waypoint {
                src_id: id.clone(),
                dst_id: target.id.clone(),
                weight: target.cosine,
            });
            if target.primary_sector != new.primary_sector
                && waypoints::upsert(&tx, &target.id, &id, target.cosine, now)?
            {
                reciprocal = Some(Waypoint {
                    src_id: target.id.clone(),
                    dst_id: id.clone(),
                    weight: target.cosine,
                });
            }
        }
    }

    // 8. Audit log.
    write_audit_log(
        &tx,
        "create",
        &id,
        Some(&serde_json::json!({
            "sectors": vectors.keys().map(|s| s.as_str()).collect::<Vec<_>>(),
            "linked": waypoint.as_ref().map(|w| w.dst_id.clone()),
        })),
    )?;

    tx.commit()?;

    Ok(InsertResult {
        id,
        sectors: vectors.keys().copied().collect(),
        waypoint,
        reciprocal,
    })
}

struct WaypointTarget {
    id: String,
    primary_sector: Sector,
    cosine: f64,
}

/// Linear scan of visible mean vectors for the strongest match.
fn best_waypoint_target(
    tx: &Transaction,
    user_id: Option<&str>,
    mean: &[f32],
) -> Result<Option<WaypointTarget>> {
    let (clause, values) = visibility_filter(user_id, 1);
    let sql = format!("SELECT id, primary_sector, mean_vec FROM memories WHERE {clause}");
    let mut stmt = tx.prepare(&sql)?;

    let mut best: Option<WaypointTarget> = None;
    let rows = stmt.query_map(params_from_iter(values), |row| {
        let sector: String = row.get(1)?;
        let blob: Option<Vec<u8>> = row.get(2)?;
        Ok((row.get::<_, String>(0)?, sector, blob))
    })?;
    for row in rows {
        let (id, sector, blob) = row?;
        let Some(blob) = blob else { continue };
        let candidate_mean = decode_vector(&blob);
        if candidate_mean.is_empty() {
            continue;
        }
        let c = cosine(mean, &candidate_mean);
        if best.as_ref().map_or(true, |b| c > b.cosine) {
            let primary_sector = sector
                .parse()
                .map_err(|e: String| EngineError::StoreFailed(e))?;
            best = Some(WaypointTarget {
                id,
                primary_sector,
                cosine: c,
            });
        }
    }
    Ok(best)
}

/// WHERE fragment scoping rows to one user's view: their own rows plus the
/// global (NULL user) pool. Queries without a user see only the global pool.
pub(crate) fn visibility_filter(user_id: Option<&str>, first_param: usize) -> (String, Vec<Value>) {
    match user_id {
        Some(u) => (
            format!("(user_id = ?{first_param} OR user_id IS NULL)"),
            vec![Value::Text(u.to_string())],
        ),
        None => ("user_id IS NULL".to_string(), Vec::new()),
    }
}

/// Fetch one memory by id.
pub fn get_memory(conn: &Connection, id: &str) -> Result<Memory> {
    conn.query_row(
        "SELECT id, user_id, content, primary_sector, tags, meta, created_at, \
         updated_at, last_seen_at, salience, decay_lambda, mean_vec, cold \
         FROM memories WHERE id = ?1",
        params![id],
        memory_from_row,
    )
    .optional()?
    .ok_or_else(|| EngineError::NotFound {
        kind: "memory",
        id: id.to_string(),
    })
}

/// List memories with optional filters and keyset pagination. UUID v7 ids
/// sort chronologically, so the cursor is simply the last id of the page.
pub fn list_memories(
    conn: &Connection,
    user_id: Option<&str>,
    sector: Option<Sector>,
    tag: Option<&str>,
    cursor: Option<&str>,
    limit: usize,
) -> Result<MemoryPage> {
    if limit == 0 {
        return Err(EngineError::InvalidInput("limit must be positive".into()));
    }

    let mut clauses: Vec<String> = Vec::new();
    let mut values: Vec<Value> = Vec::new();
    if let Some(u) = user_id {
        values.push(Value::Text(u.to_string()));
        clauses.push(format!("(user_id = ?{} OR user_id IS NULL)", values.len()));
    }
    if let Some(s) = sector {
        values.push(Value::Text(s.as_str().to_string()));
        clauses.push(format!("primary_sector = ?{}", values.len()));
    }
    if let Some(t) = tag {
        values.push(Value::Text(t.to_string()));
        clauses.push(format!(
            "EXISTS (SELECT 1 FROM json_each(memories.tags) WHERE json_each.value = ?{})",
            values.len()
        ));
    }
    if let Some(c) = cursor {
        values.push(Value::Text(c.to_string()));
        clauses.push(format!("id > ?{}", values.len()));
    }

    let where_clause = if clauses.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", clauses.join(" AND "))
    };
    values.push(Value::Integer(limit as i64 + 1));
    let sql = format!(
        "SELECT id, user_id, content, primary_sector, tags, meta, created_at, \
         updated_at, last_seen_at, salience, decay_lambda, mean_vec, cold \
         FROM memories {where_clause} ORDER BY id LIMIT ?{}",
        values.len()
    );

    let mut stmt = conn.prepare(&sql)?;
    let mut memories: Vec<Memory> = stmt
        .query_map(params_from_iter(values), memory_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let next_cursor = if memories.len() > limit {
        memories.truncate(limit);
        memories.last().map(|m| m.id.clone())
    } else {
        None
    };

    Ok(MemoryPage {
        memories,
        next_cursor,
    })
}

/// All stored vectors for one sector within a user's view.
pub fn candidates_by_sector(
    conn: &Connection,
    user_id: Option<&str>,
    sector: Sector,
) -> Result<Vec<SectorCandidate>> {
    let (clause, mut values) = visibility_filter(user_id, 2);
    let sql = format!(
        "SELECT v.memory_id, v.v, m.salience, m.last_seen_at \
         FROM vectors v JOIN memories m ON m.id = v.memory_id \
         WHERE v.sector = ?1 AND {clause}"
    );
    values.insert(0, Value::Text(sector.as_str().to_string()));

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(values), |row| {
            let blob: Vec<u8> = row.get(1)?;
            Ok(SectorCandidate {
                id: row.get(0)?,
                vec: decode_vector(&blob),
                salience: row.get(2)?,
                last_seen_at: row.get(3)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Overwrite salience and last_seen_at (decay worker path).
pub fn update_salience(conn: &Connection, id: &str, salience: f64, last_seen_at: i64) -> Result<()> {
    let rows = conn.execute(
        "UPDATE memories SET salience = ?1, last_seen_at = ?2, updated_at = ?3 WHERE id = ?4",
        params![
            salience.clamp(0.0, 1.0),
            last_seen_at,
            crate::db::now_ms(),
            id
        ],
    )?;
    if rows == 0 {
        return Err(EngineError::NotFound {
            kind: "memory",
            id: id.to_string(),
        });
    }
    Ok(())
}

/// Bump salience by `delta` (capped at 1.0) and advance last_seen_at,
/// strictly. Returns the new salience.
pub fn reinforce_memory(conn: &Connection, id: &str, delta: f64, now: i64) -> Result<f64> {
    let rows = conn.execute(
        "UPDATE memories SET salience = MIN(salience + ?1, 1.0), \
         last_seen_at = MAX(?2, last_seen_at + 1), updated_at = ?2 WHERE id = ?3",
        params![delta, now, id],
    )?;
    if rows == 0 {
        return Err(EngineError::NotFound {
            kind: "memory",
            id: id.to_string(),
        });
    }
    let salience: f64 = conn.query_row(
        "SELECT salience FROM memories WHERE id = ?1",
        params![id],
        |row| row.get(0),
    )?;
    write_audit_log(
        conn,
        "reinforce",
        id,
        Some(&serde_json::json!({ "delta": delta, "salience": salience })),
    )?;
    Ok(salience)
}

/// Replace a cold memory's content with its fingerprint. Vectors stay.
pub fn replace_content(conn: &mut Connection, id: &str, fingerprint: &str, now: i64) -> Result<()> {
    let tx = conn.transaction()?;
    let row: Option<(i64, String)> = tx
        .query_row(
            "SELECT rowid, content FROM memories WHERE id = ?1",
            params![id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;
    let Some((rowid, old_content)) = row else {
        return Err(EngineError::NotFound {
            kind: "memory",
            id: id.to_string(),
        });
    };

    // External-content FTS5 requires the old values on delete.
    tx.execute(
        "INSERT INTO memories_fts(memories_fts, rowid, content, id) VALUES('delete', ?1, ?2, ?3)",
        params![rowid, old_content, id],
    )?;
    tx.execute(
        "UPDATE memories SET content = ?1, cold = 1, updated_at = ?2 WHERE id = ?3",
        params![fingerprint, now, id],
    )?;
    tx.execute(
        "INSERT INTO memories_fts (rowid, content, id) VALUES (?1, ?2, ?3)",
        params![rowid, fingerprint, id],
    )?;
    write_audit_log(&tx, "compress", id, None)?;
    tx.commit()?;
    Ok(())
}

/// Write an entry to the memory_log audit table.
pub(crate) fn write_audit_log(
    conn: &Connection,
    operation: &str,
    memory_id: &str,
    details: Option<&serde_json::Value>,
) -> Result<()> {
    let details_json = details.map(|d| d.to_string());
    conn.execute(
        "INSERT INTO memory_log (operation, memory_id, details, created_at) VALUES (?1, ?2, ?3, ?4)",
        params![operation, memory_id, details_json, crate::db::now_ms()],
    )?;
    Ok(())
}

/// Append embedder outcomes to the embed_logs table.
pub fn write_embed_logs(conn: &Connection, entries: &[EmbedLogEntry]) -> Result<()> {
    let mut stmt = conn.prepare(
        "INSERT INTO embed_logs (ts, provider, sector, input_tokens, dim, ok) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
    )?;
    for e in entries {
        stmt.execute(params![
            e.ts,
            e.provider,
            e.sector.as_str(),
            e.input_tokens,
            e.dim as i64,
            e.ok
        ])?;
    }
    Ok(())
}

/// Map a full memories row (13 columns in schema order) into a [`Memory`].
fn memory_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Memory> {
    let sector_str: String = row.get(3)?;
    let tags_str: String = row.get(4)?;
    let meta_str: Option<String> = row.get(5)?;
    let mean_blob: Option<Vec<u8>> = row.get(11)?;
    Ok(Memory {
        id: row.get(0)?,
        user_id: row.get(1)?,
        content: row.get(2)?,
        primary_sector: sector_str.parse().unwrap_or(Sector::Semantic),
        tags: serde_json::from_str(&tags_str).unwrap_or_default(),
        meta: meta_str.and_then(|s| serde_json::from_str(&s).ok()),
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
        last_seen_at: row.get(8)?,
        salience: row.get(9)?,
        decay_lambda: row.get(10)?,
        mean_vec: mean_blob.map(|b| decode_vector(&b)).unwrap_or_default(),
        cold: row.get(12)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    fn test_db() -> Connection {
        db::open_memory_database().unwrap()
    }

    /// Unit vector along dimension `i`.
    fn spike(i: usize) -> Vec<f32> {
        let mut v = vec![0.0f32; 256];
        v[i % 256] = 1.0;
        v
    }

    fn one_sector(sector: Sector, v: Vec<f32>) -> BTreeMap<Sector, Vec<f32>> {
        let mut m = BTreeMap::new();
        m.insert(sector, v);
        m
    }

    fn insert(
        conn: &mut Connection,
        content: &str,
        sector: Sector,
        user: Option<&str>,
        v: Vec<f32>,
    ) -> InsertResult {
        insert_memory(
            conn,
            &NewMemory {
                id: None,
                user_id: user,
                content,
                primary_sector: sector,
                tags: &[],
                meta: None,
            },
            &one_sector(sector, v),
            256,
            0.75,
            db::now_ms(),
        )
        .unwrap()
    }

    #[test]
    fn insert_persists_memory_vector_and_fts() {
        let mut conn = test_db();
        let result = insert(
            &mut conn,
            "Rust is a systems language",
            Sector::Semantic,
            None,
            spike(0),
        );

        let memory = get_memory(&conn, &result.id).unwrap();
        assert_eq!(memory.content, "Rust is a systems language");
        assert_eq!(memory.primary_sector, Sector::Semantic);
        assert_eq!(memory.salience, INITIAL_SALIENCE);
        assert_eq!(memory.decay_lambda, 0.005);
        assert!(!memory.cold);
        assert_eq!(memory.created_at, memory.last_seen_at);

        let vec_count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM vectors WHERE memory_id = ?1",
                params![result.id],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(vec_count, 1);

        let fts_id: String = conn
            .query_row(
                "SELECT id FROM memories_fts WHERE memories_fts MATCH 'rust'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(fts_id, result.id);
    }

    #[test]
    fn mean_vec_is_unit_length() {
        let mut conn = test_db();
        let mut vectors = BTreeMap::new();
        vectors.insert(Sector::Semantic, spike(0));
        vectors.insert(Sector::Episodic, spike(10));
        let result = insert_memory(
            &mut conn,
            &NewMemory {
                id: None,
                user_id: None,
                content: "multi sector memory",
                primary_sector: Sector::Semantic,
                tags: &[],
                meta: None,
            },
            &vectors,
            256,
            0.75,
            db::now_ms(),
        )
        .unwrap();

        let memory = get_memory(&conn, &result.id).unwrap();
        let norm: f32 = memory.mean_vec.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-6);
    }

    #[test]
    fn empty_content_is_rejected() {
        let mut conn = test_db();
        let err = insert_memory(
            &mut conn,
            &NewMemory {
                id: None,
                user_id: None,
                content: "   ",
                primary_sector: Sector::Semantic,
                tags: &[],
                meta: None,
            },
            &one_sector(Sector::Semantic, spike(0)),
            256,
            0.75,
            db::now_ms(),
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::InvalidInput(_)));
    }

    #[test]
    fn missing_primary_vector_is_rejected() {
        let mut conn = test_db();
        let err = insert_memory(
            &mut conn,
            &NewMemory {
                id: None,
                user_id: None,
                content: "content",
                primary_sector: Sector::Emotional,
                tags: &[],
                meta: None,
            },
            &one_sector(Sector::Semantic, spike(0)),
            256,
            0.75,
            db::now_ms(),
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::InvalidInput(_)));
    }

    #[test]
    fn duplicate_supplied_id_conflicts() {
        let mut conn = test_db();
        let new = |id| NewMemory {
            id: Some(id),
            user_id: None,
            content: "pinned id",
            primary_sector: Sector::Semantic,
            tags: &[],
            meta: None,
        };
        insert_memory(
            &mut conn,
            &new("fixed-id"),
            &one_sector(Sector::Semantic, spike(0)),
            256,
            0.75,
            db::now_ms(),
        )
        .unwrap();

        let err = insert_memory(
            &mut conn,
            &new("fixed-id"),
            &one_sector(Sector::Semantic, spike(1)),
            256,
            0.75,
            db::now_ms(),
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::Conflict(_)));
    }

    #[test]
    fn near_duplicate_gets_waypoint_same_sector_no_reciprocal() {
        let mut conn = test_db();
        let first = insert(&mut conn, "alpha fact", Sector::Semantic, None, spike(0));

        // Same direction — cosine 1.0, well above threshold.
        let second = insert(&mut conn, "alpha fact again", Sector::Semantic, None, spike(0));

        let wp = second.waypoint.expect("edge should be created");
        assert_eq!(wp.dst_id, first.id);
        assert!(wp.weight > 0.99);
        // Same primary sector: no reciprocal edge.
        assert!(second.reciprocal.is_none());
        assert!(waypoints::outgoing(&conn, &first.id).unwrap().is_none());
    }

    #[test]
    fn cross_sector_link_gets_reciprocal() {
        let mut conn = test_db();
        let first = insert(&mut conn, "calm fact", Sector::Semantic, None, spike(0));
        let second = insert(&mut conn, "strong feeling", Sector::Emotional, None, spike(0));

        assert!(second.waypoint.is_some());
        let back = second.reciprocal.expect("cross-sector reciprocal");
        assert_eq!(back.src_id, first.id);
        assert_eq!(back.dst_id, second.id);
    }

    #[test]
    fn orthogonal_memories_stay_unlinked() {
        let mut conn = test_db();
        insert(&mut conn, "first topic", Sector::Semantic, None, spike(0));
        let second = insert(&mut conn, "other topic", Sector::Semantic, None, spike(100));
        assert!(second.waypoint.is_none());
    }

    #[test]
    fn waypoint_scan_respects_user_visibility() {
        let mut conn = test_db();
        insert(&mut conn, "user a memory", Sector::Semantic, Some("a"), spike(0));
        // Same direction but different user: must not link.
        let second = insert(&mut conn, "user b memory", Sector::Semantic, Some("b"), spike(0));
        assert!(second.waypoint.is_none());
    }

    #[test]
    fn candidates_by_sector_scopes_to_user_and_global() {
        let mut conn = test_db();
        insert(&mut conn, "global", Sector::Semantic, None, spike(0));
        insert(&mut conn, "mine", Sector::Semantic, Some("u1"), spike(1));
        insert(&mut conn, "theirs", Sector::Semantic, Some("u2"), spike(2));
        insert(&mut conn, "other sector", Sector::Episodic, Some("u1"), spike(3));

        let mine = candidates_by_sector(&conn, Some("u1"), Sector::Semantic).unwrap();
        assert_eq!(mine.len(), 2);

        let global_only = candidates_by_sector(&conn, None, Sector::Semantic).unwrap();
        assert_eq!(global_only.len(), 1);
    }

    #[test]
    fn reinforce_bumps_and_caps() {
        let mut conn = test_db();
        let result = insert(&mut conn, "reinforced", Sector::Semantic, None, spike(0));

        let before = get_memory(&conn, &result.id).unwrap();
        let s1 = reinforce_memory(&conn, &result.id, 0.1, db::now_ms()).unwrap();
        assert!((s1 - 0.6).abs() < 1e-9);

        let after = get_memory(&conn, &result.id).unwrap();
        assert!(after.last_seen_at > before.last_seen_at);

        for _ in 0..20 {
            reinforce_memory(&conn, &result.id, 0.1, db::now_ms()).unwrap();
        }
        let capped = get_memory(&conn, &result.id).unwrap();
        assert_eq!(capped.salience, 1.0);
    }

    #[test]
    fn reinforce_missing_memory_is_not_found() {
        let conn = test_db();
        let err = reinforce_memory(&conn, "missing", 0.1, db::now_ms()).unwrap_err();
        assert!(matches!(err, EngineError::NotFound { .. }));
    }

    #[test]
    fn replace_content_sets_cold_and_keeps_vectors() {
        let mut conn = test_db();
        let result = insert(
            &mut conn,
            "the original long form text",
            Sector::Semantic,
            None,
            spike(0),
        );

        replace_content(&mut conn, &result.id, "the original…#abcd", db::now_ms()).unwrap();

        let memory = get_memory(&conn, &result.id).unwrap();
        assert!(memory.cold);
        assert_eq!(memory.content, "the original…#abcd");

        let vec_count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM vectors WHERE memory_id = ?1",
                params![result.id],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(vec_count, 1);

        // FTS now indexes the fingerprint, not the original text.
        let stale: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM memories_fts WHERE memories_fts MATCH 'long'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(stale, 0);
    }

    #[test]
    fn list_paginates_with_cursor() {
        let mut conn = test_db();
        for i in 0..5 {
            insert(
                &mut conn,
                &format!("memory number {i}"),
                Sector::Semantic,
                None,
                spike(i),
            );
        }

        let page1 = list_memories(&conn, None, None, None, None, 2).unwrap();
        assert_eq!(page1.memories.len(), 2);
        let cursor = page1.next_cursor.expect("more pages");

        let page2 = list_memories(&conn, None, None, None, Some(&cursor), 2).unwrap();
        assert_eq!(page2.memories.len(), 2);
        assert!(page2.memories[0].id > cursor);

        let cursor2 = page2.next_cursor.expect("one more page");
        let page3 = list_memories(&conn, None, None, None, Some(&cursor2), 2).unwrap();
        assert_eq!(page3.memories.len(), 1);
        assert!(page3.next_cursor.is_none());
    }

    #[test]
    fn list_filters_by_sector_and_tag() {
        let mut conn = test_db();
        insert_memory(
            &mut conn,
            &NewMemory {
                id: None,
                user_id: None,
                content: "tagged rust memory",
                primary_sector: Sector::Semantic,
                tags: &["rust".to_string(), "lang".to_string()],
                meta: None,
            },
            &one_sector(Sector::Semantic, spike(0)),
            256,
            0.75,
            db::now_ms(),
        )
        .unwrap();
        insert(&mut conn, "untagged event", Sector::Episodic, None, spike(1));

        let by_sector = list_memories(&conn, None, Some(Sector::Episodic), None, None, 10).unwrap();
        assert_eq!(by_sector.memories.len(), 1);
        assert_eq!(by_sector.memories[0].content, "untagged event");

        let by_tag = list_memories(&conn, None, None, Some("rust"), None, 10).unwrap();
        assert_eq!(by_tag.memories.len(), 1);
        assert_eq!(by_tag.memories[0].content, "tagged rust memory");

        let no_match = list_memories(&conn, None, None, Some("python"), None, 10).unwrap();
        assert!(no_match.memories.is_empty());
    }

    #[test]
    fn get_missing_memory_is_not_found() {
        let conn = test_db();
        let err = get_memory(&conn, "nope").unwrap_err();
        assert!(matches!(
            err,
            EngineError::NotFound { kind: "memory", .. }
        ));
    }
}
