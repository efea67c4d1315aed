//! Decay, cold compression, and the survival of compressed memories.

mod helpers;

use engram::config::DecayConfig;
use engram::db;
use engram::embedding::Tier;
use engram::memory::maintenance::run_decay_cycle;
use engram::memory::recall::{recall_by_query, RecallConfig, RecallFilter};
use engram::memory::store::get_memory;
use engram::memory::types::Sector;
use helpers::{age_memory, insert, spike, test_conn};

fn recall_config(limit: usize) -> RecallConfig {
    RecallConfig {
        limit,
        tier: Tier::Fast,
        salience_delta: 0.1,
        waypoint_delta: 0.05,
    }
}

#[test]
fn emotional_memory_decays_to_cold_and_stays_searchable() {
    let mut conn = test_conn();
    let content = "today I felt anxious about the deploy and wrote a long postmortem \
                   describing exactly what went wrong and how it felt";
    let id = insert(&mut conn, content, Sector::Emotional, None, spike(0));
    // salience 0.4, 60 days idle, λ = 0.020 → 0.4·e^(−1.2) ≈ 0.120
    age_memory(&conn, &id, 0.4, 60);

    let outcome = run_decay_cycle(&mut conn, &DecayConfig::default(), db::now_ms()).unwrap();
    assert_eq!(outcome.compressed, 1);

    let memory = get_memory(&conn, &id).unwrap();
    assert!((memory.salience - 0.120).abs() < 0.005);
    assert!(memory.cold);
    let prefix: String = content.chars().take(64).collect();
    assert!(memory.content.starts_with(&prefix));
    assert_ne!(memory.content, content);

    // The kept vectors still answer queries; the content is the fingerprint.
    let hits = recall_by_query(
        &conn,
        &[(Sector::Emotional, spike(0))],
        "anxious deploy",
        &RecallFilter {
            min_score: 0.1,
            ..RecallFilter::default()
        },
        &recall_config(5),
        db::now_ms(),
    )
    .unwrap();

    assert_eq!(hits[0].memory.id, id);
    assert!(hits[0].memory.cold);
    assert!(hits[0].memory.content.starts_with(&prefix));
}

#[test]
fn salience_never_increases_without_reinforcement() {
    let mut conn = test_conn();
    let id = insert(&mut conn, "a fading thought", Sector::Episodic, None, spike(0));
    age_memory(&conn, &id, 0.9, 5);

    let mut last = 0.9;
    for day in 1..=4 {
        let now = db::now_ms() + day * 86_400_000;
        run_decay_cycle(&mut conn, &DecayConfig::default(), now).unwrap();
        let salience = get_memory(&conn, &id).unwrap().salience;
        assert!(salience <= last);
        assert!(salience >= 0.0);
        last = salience;
    }
}

#[test]
fn decay_then_recall_rewarns_the_memory() {
    let mut conn = test_conn();
    let id = insert(&mut conn, "an old but useful fact", Sector::Semantic, None, spike(0));
    age_memory(&conn, &id, 0.6, 90);

    run_decay_cycle(&mut conn, &DecayConfig::default(), db::now_ms()).unwrap();
    let decayed = get_memory(&conn, &id).unwrap();
    assert!(decayed.salience < 0.6);

    let hits = recall_by_query(
        &conn,
        &[(Sector::Semantic, spike(0))],
        "useful fact",
        &RecallFilter {
            min_score: 0.1,
            ..RecallFilter::default()
        },
        &recall_config(5),
        db::now_ms(),
    )
    .unwrap();
    assert_eq!(hits[0].memory.id, id);

    let rewarmed = get_memory(&conn, &id).unwrap();
    assert!(rewarmed.salience > decayed.salience);
    assert!(rewarmed.last_seen_at > decayed.last_seen_at);
}

#[test]
fn hot_memories_survive_many_cycles_uncompressed() {
    let mut conn = test_conn();
    let id = insert(&mut conn, "a reflective insight", Sector::Reflective, None, spike(0));
    age_memory(&conn, &id, 0.9, 30);

    // λ = 0.001: even repeated month-long gaps barely dent a reflective memory.
    for i in 1..=3 {
        run_decay_cycle(
            &mut conn,
            &DecayConfig::default(),
            db::now_ms() + i * 30 * 86_400_000,
        )
        .unwrap();
    }

    let memory = get_memory(&conn, &id).unwrap();
    assert!(!memory.cold);
    assert!(memory.salience > 0.6);
}
