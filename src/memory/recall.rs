//! Read path — similarity scan, waypoint expansion, composite scoring, and
//! implicit reinforcement.
//!
//! [`recall_by_query`] takes pre-computed query vectors (the engine embeds
//! before taking the store lock), scans each candidate sector linearly,
//! expands one hop along outgoing waypoints, blends BM25 on the hybrid
//! tier, and composes the final score:
//!
//! `score = 0.6·sim + 0.2·salience + 0.1·recency + 0.1·waypoint`
//!
//! Every returned memory is reinforced: salience bumped, `last_seen_at`
//! advanced, and traversed edges strengthened.

use std::collections::{HashMap, HashSet};

use rusqlite::{params, params_from_iter, Connection};
use serde::Serialize;

use crate::embedding::Tier;
use crate::error::{EngineError, Result};
use crate::memory::store::{self, SectorCandidate};
use crate::memory::types::{Memory, Sector};
use crate::memory::waypoints;
use crate::memory::cosine;

/// Scan at least this many candidates per sector before truncation.
const MIN_CANDIDATE_POOL: usize = 20;
/// Discount applied to similarity inherited through a waypoint hop.
const EXPANSION_DISCOUNT: f64 = 0.9;

/// Caller-supplied filters for one query.
#[derive(Debug, Default)]
pub struct RecallFilter<'a> {
    pub user_id: Option<&'a str>,
    /// Pin the scan to one sector: query vectors for other sectors are
    /// ignored. Expansion may still surface other-sector neighbors.
    pub sector: Option<Sector>,
    pub tag: Option<&'a str>,
    pub min_score: f64,
}

/// Engine-level knobs threaded into recall.
#[derive(Debug)]
pub struct RecallConfig {
    pub limit: usize,
    pub tier: Tier,
    pub salience_delta: f64,
    pub waypoint_delta: f64,
}

/// Component sub-scores behind one hit.
#[derive(Debug, Clone, Serialize)]
pub struct ScoreBreakdown {
    pub similarity: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bm25: Option<f64>,
    pub salience: f64,
    pub recency: f64,
    pub waypoint: f64,
}

/// The waypoint a hit was reached through, when it entered the candidate
/// set by expansion rather than by direct similarity.
#[derive(Debug, Clone, Serialize)]
pub struct TraversedEdge {
    pub from: String,
    pub weight: f64,
}

/// The explainable recall path for one hit.
#[derive(Debug, Clone, Serialize)]
pub struct Explanation {
    pub components: ScoreBreakdown,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub via: Option<TraversedEdge>,
}

/// One scored recall result.
#[derive(Debug, Serialize)]
pub struct RecallHit {
    pub memory: Memory,
    pub score: f64,
    pub explanation: Explanation,
}

struct Candidate {
    sim: f64,
    salience: f64,
    last_seen_at: i64,
    via: Option<TraversedEdge>,
    bm25: Option<f64>,
}

/// Full query pipeline. `query_vecs` holds one query embedding per sector
/// to scan. Results are ordered by score desc, then `last_seen_at` desc,
/// then id asc, and truncated to `config.limit`.
pub fn recall_by_query(
    conn: &Connection,
    query_vecs: &[(Sector, Vec<f32>)],
    query_text: &str,
    filter: &RecallFilter,
    config: &RecallConfig,
    now: i64,
) -> Result<Vec<RecallHit>> {
    if config.limit == 0 {
        return Err(EngineError::InvalidInput("limit must be positive".into()));
    }
    let pool = config.limit.max(MIN_CANDIDATE_POOL);

    // 1. Per-sector linear scans, keeping the best similarity per memory.
    // A pinned sector restricts the scan even if the caller embedded more.
    let mut candidates: HashMap<String, Candidate> = HashMap::new();
    for (sector, qvec) in query_vecs
        .iter()
        .filter(|(s, _)| filter.sector.map_or(true, |pin| *s == pin))
    {
        let mut scans: Vec<(SectorCandidate, f64)> =
            store::candidates_by_sector(conn, filter.user_id, *sector)?
                .into_iter()
                .map(|c| {
                    let sim = sector_similarity(cosine(qvec, &c.vec), *sector);
                    (c, sim)
                })
                .collect();
        scans.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scans.truncate(pool);

        for (c, sim) in scans {
            candidates
                .entry(c.id)
                .and_modify(|existing| {
                    if sim > existing.sim {
                        existing.sim = sim;
                    }
                })
                .or_insert(Candidate {
                    sim,
                    salience: c.salience,
                    last_seen_at: c.last_seen_at,
                    via: None,
                    bm25: None,
                });
        }
    }

    // 2. One-hop waypoint expansion from the strongest candidates.
    let mut ranked: Vec<(String, f64)> = candidates
        .iter()
        .map(|(id, c)| (id.clone(), c.sim))
        .collect();
    ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    ranked.truncate(pool);

    let top_ids: Vec<&str> = ranked.iter().map(|(id, _)| id.as_str()).collect();
    let edges = waypoints::outgoing_many(conn, &top_ids)?;
    let mut expansions: Vec<(String, Candidate)> = Vec::new();
    for edge in &edges {
        if candidates.contains_key(&edge.dst_id) {
            continue;
        }
        let src_sim = candidates[&edge.src_id].sim;
        if let Some((salience, last_seen_at)) =
            visible_scoring_row(conn, &edge.dst_id, filter.user_id)?
        {
            expansions.push((
                edge.dst_id.clone(),
                Candidate {
                    sim: src_sim * edge.weight * EXPANSION_DISCOUNT,
                    salience,
                    last_seen_at,
                    via: Some(TraversedEdge {
                        from: edge.src_id.clone(),
                        weight: edge.weight,
                    }),
                    bm25: None,
                },
            ));
        }
    }
    for (id, candidate) in expansions {
        candidates.entry(id).or_insert(candidate);
    }

    // 3. BM25 blend on the hybrid tier.
    if config.tier == Tier::Hybrid {
        let bm25 = fts_scores(conn, query_text, pool * 3)?;
        let best = bm25.values().fold(0.0f64, |a, b| a.max(*b));
        if best > 0.0 {
            for (id, candidate) in candidates.iter_mut() {
                let norm = bm25.get(id).map(|s| s / best).unwrap_or(0.0);
                candidate.bm25 = Some(norm);
                candidate.sim = 0.5 * candidate.sim + 0.5 * norm;
            }
        }
    }

    // 4. Tag filter, after expansion (an untagged hit may still lead to a
    // tagged neighbor) but before scoring and truncation, so tagged
    // memories below the cutoff are not lost.
    if let Some(tag) = filter.tag {
        let ids: Vec<&str> = candidates.keys().map(String::as_str).collect();
        let tagged = ids_with_tag(conn, &ids, tag)?;
        candidates.retain(|id, _| tagged.contains(id));
    }

    // 5. Waypoint factor: the strength of each candidate's outgoing edge.
    let all_ids: Vec<&str> = candidates.keys().map(String::as_str).collect();
    let out_weights: HashMap<String, f64> = waypoints::outgoing_many(conn, &all_ids)?
        .into_iter()
        .map(|w| (w.src_id, w.weight))
        .collect();

    // 6. Compose, filter, order.
    let mut scored: Vec<(String, f64, Candidate)> = candidates
        .into_iter()
        .map(|(id, c)| {
            let recency = recency_factor(now, c.last_seen_at);
            let waypoint = out_weights.get(&id).copied().unwrap_or(0.0);
            let score =
                0.6 * c.sim + 0.2 * c.salience + 0.1 * recency + 0.1 * waypoint;
            (id, score, c)
        })
        .filter(|(_, score, _)| *score >= filter.min_score)
        .collect();
    scored.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.2.last_seen_at.cmp(&a.2.last_seen_at))
            .then_with(|| a.0.cmp(&b.0))
    });
    scored.truncate(config.limit);

    // 7. Hydrate, reinforce, explain.
    let mut hits = Vec::with_capacity(scored.len());
    for (id, score, candidate) in scored {
        let mut memory = store::get_memory(conn, &id)?;

        let new_salience = store::reinforce_memory(conn, &id, config.salience_delta, now)?;
        if let Some(via) = &candidate.via {
            waypoints::reinforce(conn, &via.from, &id, config.waypoint_delta, now)?;
        }
        // Mirror the committed reinforcement in the returned record.
        memory.last_seen_at = now.max(memory.last_seen_at + 1);
        memory.salience = new_salience;

        hits.push(RecallHit {
            memory,
            score,
            explanation: Explanation {
                components: ScoreBreakdown {
                    similarity: candidate.sim,
                    bm25: candidate.bm25,
                    salience: candidate.salience,
                    recency: recency_factor(now, candidate.last_seen_at),
                    waypoint: out_weights.get(&id).copied().unwrap_or(0.0),
                },
                via: candidate.via,
            },
        });
    }

    Ok(hits)
}

/// Clamp raw cosine into [0, 1] and apply the sector's scoring weight.
/// Synthetic vectors can go slightly negative; `(sim + 1) / 2` folds that
/// range back into the unit interval.
fn sector_similarity(raw_cosine: f64, sector: Sector) -> f64 {
    let clamped = if raw_cosine < 0.0 {
        (raw_cosine + 1.0) / 2.0
    } else {
        raw_cosine
    };
    (clamped * sector.score_weight()).min(1.0)
}

/// `exp(−Δdays / 30)` over the time since the memory was last seen.
fn recency_factor(now: i64, last_seen_at: i64) -> f64 {
    let days = (now - last_seen_at).max(0) as f64 / 86_400_000.0;
    (-days / 30.0).exp()
}

/// Salience and last_seen_at for an expansion target, if visible.
fn visible_scoring_row(
    conn: &Connection,
    id: &str,
    user_id: Option<&str>,
) -> Result<Option<(f64, i64)>> {
    use rusqlite::OptionalExtension;
    let (clause, mut values) = store::visibility_filter(user_id, 2);
    values.insert(0, rusqlite::types::Value::Text(id.to_string()));
    let sql = format!("SELECT salience, last_seen_at FROM memories WHERE id = ?1 AND {clause}");
    let row = conn
        .query_row(&sql, params_from_iter(values), |row| {
            Ok((row.get(0)?, row.get(1)?))
        })
        .optional()?;
    Ok(row)
}

/// The subset of `ids` whose tags array contains `tag`.
fn ids_with_tag(conn: &Connection, ids: &[&str], tag: &str) -> Result<HashSet<String>> {
    if ids.is_empty() {
        return Ok(HashSet::new());
    }
    let placeholders: Vec<String> = (2..=ids.len() + 1).map(|i| format!("?{i}")).collect();
    let sql = format!(
        "SELECT id FROM memories WHERE id IN ({}) AND EXISTS \
         (SELECT 1 FROM json_each(memories.tags) WHERE json_each.value = ?1)",
        placeholders.join(", ")
    );
    let mut values: Vec<rusqlite::types::Value> =
        Vec::with_capacity(ids.len() + 1);
    values.push(rusqlite::types::Value::Text(tag.to_string()));
    values.extend(ids.iter().map(|id| rusqlite::types::Value::Text(id.to_string())));

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(values), |row| row.get::<_, String>(0))?
        .collect::<std::result::Result<HashSet<_>, _>>()?;
    Ok(rows)
}

/// FTS5 BM25 scores for the query, keyed by memory id. FTS5 rank is
/// negative (more negative = better), so it is negated here.
fn fts_scores(conn: &Connection, query_text: &str, limit: usize) -> Result<HashMap<String, f64>> {
    let escaped = escape_fts_query(query_text);
    if escaped.is_empty() {
        return Ok(HashMap::new());
    }

    let mut stmt = conn.prepare(
        "SELECT id, rank FROM memories_fts WHERE memories_fts MATCH ?1 ORDER BY rank LIMIT ?2",
    )?;
    let rows = stmt
        .query_map(params![escaped, limit as i64], |row| {
            Ok((row.get::<_, String>(0)?, -row.get::<_, f64>(1)?))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows.into_iter().collect())
}

/// Escape a user query for FTS5 MATCH syntax.
///
/// Wraps each whitespace-delimited word in double quotes and joins with OR
/// so any term can match. Strips empty tokens.
fn escape_fts_query(query: &str) -> String {
    query
        .split_whitespace()
        .map(|word| {
            let clean = word.replace('"', "");
            format!("\"{clean}\"")
        })
        .filter(|w| w != "\"\"")
        .collect::<Vec<_>>()
        .join(" OR ")
}
