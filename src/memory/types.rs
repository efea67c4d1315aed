use serde::{Deserialize, Serialize};

/// The five cognitive sectors a memory may belong to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sector {
    Episodic,
    Semantic,
    Procedural,
    Emotional,
    Reflective,
}

impl Sector {
    /// All sectors, in the fixed tie-break order used by the classifier.
    pub const TIE_ORDER: [Sector; 5] = [
        Self::Semantic,
        Self::Episodic,
        Self::Procedural,
        Self::Emotional,
        Self::Reflective,
    ];

    /// SQL-compatible string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Episodic => "episodic",
            Self::Semantic => "semantic",
            Self::Procedural => "procedural",
            Self::Emotional => "emotional",
            Self::Reflective => "reflective",
        }
    }

    /// Per-day decay rate applied by the maintenance worker.
    pub fn decay_lambda(&self) -> f64 {
        match self {
            Self::Episodic => 0.015,
            Self::Semantic => 0.005,
            Self::Procedural => 0.008,
            Self::Emotional => 0.020,
            Self::Reflective => 0.001,
        }
    }

    /// Scoring weight applied to the similarity channel during recall.
    pub fn score_weight(&self) -> f64 {
        match self {
            Self::Episodic => 1.2,
            Self::Semantic => 1.0,
            Self::Procedural => 1.1,
            Self::Emotional => 1.3,
            Self::Reflective => 0.8,
        }
    }

    /// Sectors whose content is knowledge-like enough to justify provider
    /// embeddings on the `smart` tier.
    pub fn is_semantic_class(&self) -> bool {
        matches!(self, Self::Semantic | Self::Reflective)
    }
}

impl std::fmt::Display for Sector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Sector {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "episodic" => Ok(Self::Episodic),
            "semantic" => Ok(Self::Semantic),
            "procedural" => Ok(Self::Procedural),
            "emotional" => Ok(Self::Emotional),
            "reflective" => Ok(Self::Reflective),
            _ => Err(format!("unknown sector: {s}")),
        }
    }
}

/// A memory record, matching the `memories` table schema.
///
/// Timestamps are epoch milliseconds. `mean_vec` is the unit-length centroid
/// of the memory's per-sector vectors, used for waypoint matching.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Memory {
    pub id: String,
    pub user_id: Option<String>,
    pub content: String,
    pub primary_sector: Sector,
    pub tags: Vec<String>,
    pub meta: Option<serde_json::Value>,
    pub created_at: i64,
    pub updated_at: i64,
    pub last_seen_at: i64,
    pub salience: f64,
    pub decay_lambda: f64,
    #[serde(skip)]
    pub mean_vec: Vec<f32>,
    pub cold: bool,
}

/// A directed associative edge. Each `src_id` has at most one outgoing edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    pub src_id: String,
    pub dst_id: String,
    pub weight: f64,
}
