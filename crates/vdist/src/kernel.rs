//! Mapping from an optimized vector set to the uniform block a sampling
//! kernel consumes. Directions are normalized on upload; depth is
//! reconstructed shader-side from the distribution scalars.

use bytemuck::{Pod, Zeroable};
use glam::Vec3;

use crate::params::{DistributionParams, SampleCount};

pub const DIRECTION_FLOATS: usize = SampleCount::MAX * 3;

/// Pod uniform block for the shader side. The direction array is fixed at the
/// largest supported kernel size; slots past `sample_count` are zeroed.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct KernelUniforms {
    /// xyz triples of unit directions, `sample_count` entries used.
    pub directions: [f32; DIRECTION_FLOATS],
    pub sample_count: u32,
    pub rcp_sample_count: f32,
    pub min_depth: f32,
    pub max_depth: f32,
    /// Vertical slot width in radians, `(max_angle - min_angle) / (n + 1)`.
    pub vertical_angle_step: f32,
    pub depth_exponent: f32,
}

impl KernelUniforms {
    pub fn new(params: &DistributionParams, vectors: &[Vec3]) -> Self {
        assert!(
            !vectors.is_empty() && vectors.len() <= SampleCount::MAX,
            "kernel holds 1 to {} vectors, got {}",
            SampleCount::MAX,
            vectors.len()
        );

        let mut directions = [0.0; DIRECTION_FLOATS];
        for (i, v) in vectors.iter().enumerate() {
            let dir = v.normalize_or_zero();
            directions[i * 3..i * 3 + 3].copy_from_slice(&dir.to_array());
        }

        let n = vectors.len() as f32;
        let vertical_angle_step = (params.max_angle - params.min_angle) / (n + 1.0);

        Self {
            directions,
            sample_count: vectors.len() as u32,
            rcp_sample_count: 1.0 / n,
            min_depth: params.min_depth,
            max_depth: params.max_depth,
            vertical_angle_step: vertical_angle_step.to_radians(),
            depth_exponent: params.depth_exponent,
        }
    }
}
