use glam::Vec3;
use itertools::Itertools;

use crate::lerp;

/// Blend weights for the two terms of the quality score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetricWeights {
    /// Weight of the minimum pairwise distance term, in [0, 1].
    pub min_distance: f32,
    /// Weight of the "significant samples" term rewarding short vectors, in [0, 1].
    pub significant_samples: f32,
}

impl Default for MetricWeights {
    fn default() -> Self {
        Self {
            min_distance: 1.0,
            significant_samples: 0.0,
        }
    }
}

/// Scores a vector set by how well spread out it is.
///
/// The backbone is the minimum Euclidean distance over all unordered pairs.
/// The secondary term is the mean of `1 - magnitude`, which rewards sets
/// whose samples stay close to the origin. Each term is blended towards a
/// neutral 1.0 by its weight; the default weights reduce the score to the
/// pure minimum pairwise distance. O(n²), n is at most 64.
pub fn score(vectors: &[Vec3], weights: MetricWeights) -> f32 {
    debug_assert!(!vectors.is_empty());

    // A single vector has no pairs; the distance term stays neutral.
    if vectors.len() == 1 {
        return lerp(1.0, 1.0 - vectors[0].length(), weights.significant_samples);
    }

    let min_distance_sq = vectors
        .iter()
        .tuple_combinations()
        .map(|(a, b)| a.distance_squared(*b))
        .fold(f32::MAX, f32::min);

    let significant_samples =
        vectors.iter().map(|v| 1.0 - v.length()).sum::<f32>() / vectors.len() as f32;

    let min_distance = min_distance_sq.sqrt();

    lerp(1.0, min_distance, weights.min_distance)
        * lerp(1.0, significant_samples, weights.significant_samples)
}
