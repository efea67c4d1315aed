//! Deterministic synthetic embeddings.
//!
//! Each token of the input seeds a pseudo-random unit contribution from a
//! stable 64-bit hash of `sector|token`; the contributions are summed and
//! L2-normalized. Identical `(text, sector)` always produce the identical
//! vector, and texts sharing tokens land near each other, so the fast
//! tiers can answer paraphrased queries.

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::{EmbedRequest, EmbeddingProvider};
use crate::error::Result;
use crate::memory::l2_normalize;
use crate::memory::types::Sector;

/// Deterministic hash-based embedding backend. Stateless and infallible.
#[derive(Debug, Default, Clone)]
pub struct SyntheticProvider;

impl SyntheticProvider {
    pub fn new() -> Self {
        Self
    }

    /// Embed one text for one sector at the given dimension.
    pub fn embed_sector(&self, text: &str, sector: Sector, dim: usize) -> Vec<f32> {
        let lowered = text.to_lowercase();
        let tokens: Vec<&str> = lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .collect();

        let mut acc = vec![0.0f32; dim];
        if tokens.is_empty() {
            fill_from_seed(&mut acc, fnv1a64(sector.as_str()) ^ fnv1a64(&lowered));
        } else {
            let mut part = vec![0.0f32; dim];
            for token in tokens {
                let seed = fnv1a64(&format!("{}|{}", sector.as_str(), token));
                fill_from_seed(&mut part, seed);
                l2_normalize(&mut part);
                for (a, p) in acc.iter_mut().zip(&part) {
                    *a += p;
                }
            }
        }
        l2_normalize(&mut acc);
        acc
    }
}

#[async_trait]
impl EmbeddingProvider for SyntheticProvider {
    fn name(&self) -> &'static str {
        "synthetic"
    }

    async fn embed(&self, requests: &[EmbedRequest]) -> Result<Vec<Vec<f32>>> {
        Ok(requests
            .iter()
            .map(|r| self.embed_sector(&r.text, r.sector, r.dim))
            .collect())
    }
}

/// Fill a slice with uniform floats in [-1, 1] from a seeded generator.
fn fill_from_seed(out: &mut [f32], seed: u64) {
    let mut rng = StdRng::seed_from_u64(seed);
    for x in out.iter_mut() {
        *x = rng.gen_range(-1.0f32..=1.0);
    }
}

/// Stable 64-bit FNV-1a. `DefaultHasher` is not guaranteed stable across
/// releases, and vectors persisted today must match vectors computed later.
pub(crate) fn fnv1a64(input: &str) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x100_0000_01b3;
    let mut hash = OFFSET;
    for byte in input.as_bytes() {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(PRIME);
    }
    hash
}
