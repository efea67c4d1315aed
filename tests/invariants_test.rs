//! Structural invariants that must hold after any sequence of operations.

mod helpers;

use std::collections::BTreeMap;

use engram::config::DecayConfig;
use engram::db;
use engram::embedding::Tier;
use engram::memory::forget::delete_memory;
use engram::memory::maintenance::run_decay_cycle;
use engram::memory::recall::{recall_by_query, RecallConfig, RecallFilter};
use engram::memory::store::reinforce_memory;
use engram::memory::types::Sector;
use helpers::{age_memory, insert, insert_with_vectors, spike, test_conn};
use rusqlite::Connection;

/// Assert every §-level structural invariant directly against the tables.
fn assert_invariants(conn: &Connection) {
    // Every memory has a vector for its primary sector.
    let missing_primary: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM memories m WHERE NOT EXISTS \
             (SELECT 1 FROM vectors v WHERE v.memory_id = m.id AND v.sector = m.primary_sector)",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(missing_primary, 0, "memory without primary-sector vector");

    // At most one outgoing waypoint per memory (PK enforces it; verify anyway).
    let multi_out: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM (SELECT src_id FROM waypoints GROUP BY src_id HAVING COUNT(*) > 1)",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(multi_out, 0, "memory with multiple outgoing waypoints");

    // Every waypoint endpoint exists and weights are in (0, 1].
    let dangling: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM waypoints w WHERE \
             NOT EXISTS (SELECT 1 FROM memories WHERE id = w.src_id) OR \
             NOT EXISTS (SELECT 1 FROM memories WHERE id = w.dst_id) OR \
             w.weight <= 0.0 OR w.weight > 1.0",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(dangling, 0, "dangling or out-of-range waypoint");

    // Salience stays in [0, 1] and last_seen_at never precedes created_at.
    let bad_rows: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM memories WHERE \
             salience < 0.0 OR salience > 1.0 OR last_seen_at < created_at",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(bad_rows, 0, "salience or timestamp out of range");

    // Mean vectors are unit length.
    let mut stmt = conn.prepare("SELECT mean_vec FROM memories").unwrap();
    let blobs = stmt
        .query_map([], |row| row.get::<_, Option<Vec<u8>>>(0))
        .unwrap()
        .collect::<Result<Vec<_>, _>>()
        .unwrap();
    for blob in blobs.into_iter().flatten() {
        let v = engram::memory::decode_vector(&blob);
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-6, "mean_vec not unit length");
    }

    // Vector dims agree with their stored prefix.
    let mismatched: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM vectors WHERE length(v) != 4 + dim * 4",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(mismatched, 0, "vector blob length disagrees with dim");
}

#[test]
fn invariants_hold_through_a_mixed_op_sequence() {
    let mut conn = test_conn();
    let now = db::now_ms();

    // A spread of adds: single- and multi-sector, users, near-duplicates.
    let mut ids = Vec::new();
    for i in 0..8 {
        let user = if i % 3 == 0 { None } else { Some("u1") };
        let id = insert(
            &mut conn,
            &format!("memory about topic {i}"),
            Sector::TIE_ORDER[i % 5],
            user,
            spike(i % 4),
        );
        ids.push(id);
    }
    let mut multi = BTreeMap::new();
    multi.insert(Sector::Emotional, spike(1));
    multi.insert(Sector::Episodic, spike(2));
    ids.push(insert_with_vectors(
        &mut conn,
        "a multi sector memory",
        Sector::Emotional,
        Some("u1"),
        multi,
        0.75,
    ));
    assert_invariants(&conn);

    // Reinforce some of them, repeatedly.
    for id in ids.iter().step_by(2) {
        for _ in 0..5 {
            reinforce_memory(&conn, id, 0.25, db::now_ms()).unwrap();
        }
    }
    assert_invariants(&conn);

    // Age and decay everything, twice.
    for id in &ids {
        age_memory(&conn, id, 0.3, 45);
    }
    run_decay_cycle(&mut conn, &DecayConfig::default(), now).unwrap();
    run_decay_cycle(&mut conn, &DecayConfig::default(), now + 86_400_000).unwrap();
    assert_invariants(&conn);

    // Recall with reinforcement side effects.
    recall_by_query(
        &conn,
        &[(Sector::Semantic, spike(0)), (Sector::Emotional, spike(1))],
        "topic memory",
        &RecallFilter {
            user_id: Some("u1"),
            min_score: 0.0,
            ..RecallFilter::default()
        },
        &RecallConfig {
            limit: 5,
            tier: Tier::Fast,
            salience_delta: 0.1,
            waypoint_delta: 0.05,
        },
        db::now_ms(),
    )
    .unwrap();
    assert_invariants(&conn);

    // Delete a few, including waypoint endpoints.
    for id in ids.iter().take(3) {
        delete_memory(&mut conn, id).unwrap();
    }
    assert_invariants(&conn);
}

#[test]
fn near_duplicate_storms_keep_the_graph_single_edged() {
    let mut conn = test_conn();

    // Twenty memories pointing the same direction: every insert links to
    // some earlier memory, and no memory ever grows two outgoing edges.
    for i in 0..20 {
        insert(
            &mut conn,
            &format!("variation {i} of the same idea"),
            if i % 2 == 0 { Sector::Semantic } else { Sector::Emotional },
            None,
            spike(0),
        );
    }
    assert_invariants(&conn);

    let edges: i64 = conn
        .query_row("SELECT COUNT(*) FROM waypoints", [], |row| row.get(0))
        .unwrap();
    assert!(edges > 0);
}
