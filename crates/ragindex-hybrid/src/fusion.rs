// Reciprocal Rank Fusion (RRF)

use std::collections::HashMap;
use std::hash::Hash;

use ragindex_core::types::{SearchHit, SourceKind, VectorHit};

/// Smoothing constant from Cormack, Clarke and Buettcher (SIGIR 2009).
pub const RRF_K: usize = 60;

/// `fused(d) = sum over lists containing d of 1 / (k + rank + 1)`, rank zero-based.
///
/// Only positions matter; input scores are ignored. Output is sorted by
/// descending fused score, equal scores keeping first-seen order (all of
/// `results_a`, then the new items of `results_b`).
pub fn reciprocal_rank_fusion<T: Clone + Eq + Hash>(results_a: &[(T, f32)], results_b: &[(T, f32)], k: usize) -> Vec<(T, f32)> {
    let k_param = k as f32;
    let mut slot: HashMap<T, usize> = HashMap::new();
    let mut combined: Vec<(T, f32)> = Vec::new();
    for list in [results_a, results_b] {
        for (rank, (item, _score)) in list.iter().enumerate() {
            let contribution = 1.0 / (k_param + rank as f32 + 1.0);
            let idx = *slot.entry(item.clone()).or_insert_with(|| {
                combined.push((item.clone(), 0.0));
                combined.len() - 1
            });
            combined[idx].1 += contribution;
        }
    }
    combined.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    combined
}

/// Fuses vector hits (ranked by ascending distance) with lexical hits.
pub fn fuse_hits(vector: &[VectorHit], lexical: &[SearchHit], k: usize) -> Vec<SearchHit> {
    let mut by_distance: Vec<&VectorHit> = vector.iter().collect();
    by_distance.sort_by(|a, b| a.distance.partial_cmp(&b.distance).unwrap_or(std::cmp::Ordering::Equal));
    let a: Vec<(String, f32)> = by_distance.iter().map(|h| (h.id.clone(), -h.distance)).collect();
    let b: Vec<(String, f32)> = lexical.iter().map(|h| (h.id.clone(), h.score)).collect();
    reciprocal_rank_fusion(&a, &b, k).into_iter().map(|(id, score)| SearchHit { id, score, source: SourceKind::Fused }).collect()
}
