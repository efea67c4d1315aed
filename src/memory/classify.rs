//! Rule-based sector classification.
//!
//! Each sector owns a case-insensitive pattern set (single words match on
//! token boundaries, phrases as substrings). Confidence per sector is
//! `matches / (matches + 1)`; ties break on the fixed order in
//! [`Sector::TIE_ORDER`]. Text that matches nothing defaults to `semantic`
//! at confidence 0.

use std::collections::BTreeMap;

use crate::memory::types::Sector;

/// Minimum confidence for a sector to join the candidate set.
const CANDIDATE_FLOOR: f64 = 0.2;

/// Outcome of classifying one piece of text.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub primary: Sector,
    pub confidence: f64,
    /// Every sector at or above the candidate floor, plus the primary.
    /// Sorted by descending confidence, primary first on ties.
    pub candidates: Vec<(Sector, f64)>,
}

impl Classification {
    /// The candidate sectors without their confidences.
    pub fn candidate_sectors(&self) -> Vec<Sector> {
        self.candidates.iter().map(|(s, _)| *s).collect()
    }
}

/// Static pattern configuration for one sector.
#[derive(Debug, Clone)]
pub struct SectorPatterns {
    pub sector: Sector,
    pub patterns: Vec<&'static str>,
}

/// The classifier: a pattern table that can be rebuilt at runtime without
/// touching stored data.
#[derive(Debug, Clone)]
pub struct Classifier {
    table: Vec<SectorPatterns>,
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new(default_patterns())
    }
}

impl Classifier {
    pub fn new(table: Vec<SectorPatterns>) -> Self {
        Self { table }
    }

    /// Classify `text` into a primary sector and candidate set.
    pub fn classify(&self, text: &str) -> Classification {
        let lowered = text.to_lowercase();
        let tokens: Vec<&str> = lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .collect();

        let mut confidences: BTreeMap<Sector, f64> = BTreeMap::new();
        for entry in &self.table {
            let matches = entry
                .patterns
                .iter()
                .filter(|p| pattern_matches(&lowered, &tokens, p))
                .count();
            let confidence = matches as f64 / (matches as f64 + 1.0);
            confidences.insert(entry.sector, confidence);
        }

        // Argmax with the fixed tie-break order.
        let mut primary = Sector::Semantic;
        let mut best = -1.0f64;
        for sector in Sector::TIE_ORDER {
            let c = confidences.get(&sector).copied().unwrap_or(0.0);
            if c > best {
                best = c;
                primary = sector;
            }
        }
        let confidence = best.max(0.0);

        let mut candidates: Vec<(Sector, f64)> = Sector::TIE_ORDER
            .iter()
            .filter_map(|s| {
                let c = confidences.get(s).copied().unwrap_or(0.0);
                (c >= CANDIDATE_FLOOR || *s == primary).then_some((*s, c))
            })
            .collect();
        candidates.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| ((a.0 != primary) as u8).cmp(&((b.0 != primary) as u8)))
        });

        Classification {
            primary,
            confidence,
            candidates,
        }
    }
}

/// Single-word patterns match whole tokens; multi-word patterns match as
/// substrings of the lowercased text.
fn pattern_matches(lowered: &str, tokens: &[&str], pattern: &str) -> bool {
    if pattern.contains(' ') {
        lowered.contains(pattern)
    } else {
        tokens.contains(&pattern)
    }
}

/// The pattern table shipped with the engine.
fn default_patterns() -> Vec<SectorPatterns> {
    vec![
        SectorPatterns {
            sector: Sector::Semantic,
            patterns: vec![
                "is",
                "are",
                "means",
                "definition",
                "defined",
                "fact",
                "capital of",
                "known as",
                "what is",
                "consists of",
                "refers to",
            ],
        },
        SectorPatterns {
            sector: Sector::Episodic,
            patterns: vec![
                "today",
                "yesterday",
                "tonight",
                "earlier",
                "morning",
                "meeting",
                "happened",
                "went",
                "visited",
                "told",
                "last week",
                "last night",
            ],
        },
        SectorPatterns {
            sector: Sector::Procedural,
            patterns: vec![
                "how to",
                "step",
                "steps",
                "install",
                "configure",
                "deploy",
                "build",
                "setup",
                "first",
                "then",
                "workflow",
                "process",
            ],
        },
        SectorPatterns {
            sector: Sector::Emotional,
            patterns: vec![
                "feel",
                "feels",
                "felt",
                "feeling",
                "happy",
                "sad",
                "angry",
                "anxious",
                "excited",
                "worried",
                "scared",
                "love",
                "hate",
                "frustrated",
            ],
        },
        SectorPatterns {
            sector: Sector::Reflective,
            patterns: vec![
                "realize",
                "realized",
                "learned",
                "insight",
                "reflect",
                "reflection",
                "looking back",
                "in hindsight",
                "i tend to",
                "i should have",
            ],
        },
    ]
}
