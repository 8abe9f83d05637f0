use glam::Vec3;
use rand::{distributions::Uniform, prelude::Distribution, Rng};

use crate::params::DistributionParams;

// Slack absorbing normalize/length rounding, so a vector generated exactly on
// a bound cannot fail its own distribution's checks.
const DEPTH_EPS: f32 = 1e-5;
const ANGLE_EPS: f32 = 1e-3;

/// Whether a candidate vector respects the distribution's angular and depth
/// constraints. Freshly generated sets satisfy these by construction; this
/// gatekeeps perturbed candidates during local search.
pub fn is_feasible(params: &DistributionParams, vector: Vec3) -> bool {
    if vector.y < 0.0 {
        return false;
    }
    if vector.length_squared() > 1.0 + DEPTH_EPS {
        return false;
    }

    let depth = vector.length();
    let elevation = (vector.y / depth).clamp(-1.0, 1.0).asin().to_degrees();
    if elevation < params.min_angle - ANGLE_EPS {
        return false;
    }
    if elevation > params.max_angle + ANGLE_EPS {
        return false;
    }

    if depth < params.min_depth - DEPTH_EPS {
        return false;
    }
    if depth > params.max_depth + DEPTH_EPS {
        return false;
    }

    true
}

/// Displaces a vector by an independent uniform offset in
/// `[-perturbation_dist, perturbation_dist]` per component.
pub fn perturb_point<R: Rng>(rng: &mut R, vector: Vec3, perturbation_dist: f32) -> Vec3 {
    let offset = Uniform::new(-perturbation_dist, perturbation_dist);
    vector
        + Vec3::new(
            offset.sample(rng),
            offset.sample(rng),
            offset.sample(rng),
        )
}

/// Perturbs one randomly chosen vector in place, keeping the displacement
/// only if the result stays feasible.
///
/// On success returns the touched index and the previous value so the caller
/// can re-score and roll back; on failure the slice is left untouched. This
/// is the single mutating primitive of local search.
pub fn try_perturb<R: Rng>(
    params: &DistributionParams,
    rng: &mut R,
    vectors: &mut [Vec3],
    perturbation_dist: f32,
) -> Option<(usize, Vec3)> {
    let idx = rng.gen_range(0..vectors.len());
    let previous = vectors[idx];
    let candidate = perturb_point(rng, previous, perturbation_dist);

    if is_feasible(params, candidate) {
        vectors[idx] = candidate;
        Some((idx, previous))
    } else {
        None
    }
}
