use glam::{Quat, Vec3};
use rand::{distributions::Uniform, prelude::Distribution, SeedableRng};

use crate::{
    lerp,
    params::{DistributionParams, SampleCount},
};

/// Builds the vector set for a given seed.
///
/// Each index owns an evenly spaced horizontal and vertical slot that the
/// seeded stream jitters within, so the set stays spread out for any seed
/// while the seed decides the exact directions. Depth grows with the index
/// following the falloff curve.
///
/// Deterministic: the same `(params, sample_count, seed)` triple always
/// produces the same set. The draw order (horizontal then vertical, per
/// index) is part of that contract, do not reorder the samples.
pub fn generate(params: &DistributionParams, sample_count: SampleCount, seed: u64) -> Vec<Vec3> {
    let mut rng = crate::Rng::seed_from_u64(seed);

    let n = sample_count.get();
    let count = n as f32;
    let horizontal_step = 360.0 / count;
    let vertical_step = 90.0 / (count + 1.0);

    let horizontal_jitter = Uniform::new(-horizontal_step * 0.5, horizontal_step * 0.5);
    let vertical_jitter = Uniform::new(-vertical_step * 0.5, vertical_step * 0.5);

    let mut vectors = Vec::with_capacity(n);
    for i in 0..n {
        let slot = i as f32;
        let horizontal =
            horizontal_step * 0.5 + horizontal_step * slot + horizontal_jitter.sample(&mut rng);
        let vertical = vertical_step * (slot + 1.0)
            + vertical_jitter.sample(&mut rng) * params.vertical_perturbation;
        let vertical = lerp(params.max_angle, params.min_angle, vertical / 90.0);
        let depth = lerp(
            params.min_depth,
            params.max_depth,
            ((slot + 1.0) / count).powf(params.depth_exponent),
        );

        let dir =
            Quat::from_axis_angle(Vec3::Y, (horizontal * params.revolutions).to_radians()) * Vec3::X;
        let tilt_axis = dir.cross(Vec3::Y).normalize();
        let dir = Quat::from_axis_angle(tilt_axis, vertical.to_radians()) * dir;

        vectors.push(dir.normalize() * depth);
    }

    vectors
}
