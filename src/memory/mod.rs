//! Core memory engine — classification, storage, recall, waypoints, and
//! lifecycle maintenance.
//!
//! The write path lives in [`store`], the read path in [`recall`], the
//! associative graph in [`waypoints`], deletion in [`forget`], statistics in
//! [`stats`], and decay/compression in [`maintenance`]. Type definitions live
//! in [`types`], the sector classifier in [`classify`].

pub mod classify;
pub mod forget;
pub mod maintenance;
pub mod recall;
pub mod stats;
pub mod store;
pub mod types;
pub mod waypoints;

/// Encode an f32 vector as a blob: 4-byte little-endian dim prefix followed
/// by little-endian IEEE-754 floats.
pub fn encode_vector(v: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(4 + v.len() * 4);
    out.extend_from_slice(&(v.len() as u32).to_le_bytes());
    for x in v {
        out.extend_from_slice(&x.to_le_bytes());
    }
    out
}

/// Decode a dim-prefixed vector blob. Returns an empty vector for blobs too
/// short to carry their declared dimension.
pub fn decode_vector(bytes: &[u8]) -> Vec<f32> {
    if bytes.len() < 4 {
        return Vec::new();
    }
    let dim = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
    let payload = &bytes[4..];
    if payload.len() < dim * 4 {
        return Vec::new();
    }
    payload[..dim * 4]
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

/// Cosine similarity between two vectors. Shorter input is treated as
/// zero-padded; zero-norm inputs yield 0.
pub fn cosine(a: &[f32], b: &[f32]) -> f64 {
    let n = a.len().min(b.len());
    let mut dot = 0.0f64;
    for i in 0..n {
        dot += a[i] as f64 * b[i] as f64;
    }
    let na: f64 = a.iter().map(|x| (*x as f64) * (*x as f64)).sum::<f64>().sqrt();
    let nb: f64 = b.iter().map(|x| (*x as f64) * (*x as f64)).sum::<f64>().sqrt();
    if na == 0.0 || nb == 0.0 {
        return 0.0;
    }
    dot / (na * nb)
}

/// L2-normalize in place. No-op on zero vectors.
pub fn l2_normalize(v: &mut [f32]) {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

/// Unit-length centroid of a set of sector vectors, truncated or zero-padded
/// to `dim`. Returns a zero vector when the input is empty.
pub fn mean_vector(vectors: &[Vec<f32>], dim: usize) -> Vec<f32> {
    let mut mean = vec![0.0f32; dim];
    if vectors.is_empty() {
        return mean;
    }
    for v in vectors {
        for (i, x) in v.iter().take(dim).enumerate() {
            mean[i] += x;
        }
    }
    let count = vectors.len() as f32;
    for x in &mut mean {
        *x /= count;
    }
    l2_normalize(&mut mean);
    mean
}
