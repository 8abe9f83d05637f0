pub mod generator;
pub mod kernel;
pub mod metric;
pub mod optimizer;
pub mod params;
pub mod perturb;
pub mod search;
pub mod utils;

pub use rand_xoshiro::Xoshiro256StarStar as Rng;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("a worker thread panicked during the search")]
    WorkerPanic,
}

/// Clamped lerp. The generator and metric rely on the clamp at both ends.
pub(crate) fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t.clamp(0.0, 1.0)
}
