use std::fmt::Display;
use std::str::FromStr;

/// Shape of a sampling kernel: where its directions may point and how deep
/// they reach. All angles are in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DistributionParams {
    /// Horizontal angle wrap count around the up axis.
    pub revolutions: f32,
    /// Lower vertical angle bound, in [1, 90].
    pub min_angle: f32,
    /// Upper vertical angle bound, in [1, 90].
    pub max_angle: f32,
    /// Scale of the random jitter applied to the vertical slot, in [0, 1].
    pub vertical_perturbation: f32,
    /// Lower radius bound, in [0, 1].
    pub min_depth: f32,
    /// Upper radius bound, in [0, 1].
    pub max_depth: f32,
    /// Radius falloff curve, in [0.01, 4].
    pub depth_exponent: f32,
}

impl Default for DistributionParams {
    fn default() -> Self {
        Self {
            revolutions: 20.0,
            min_angle: 10.0,
            max_angle: 90.0,
            vertical_perturbation: 0.5,
            min_depth: 0.1,
            max_depth: 1.0,
            depth_exponent: 0.5,
        }
    }
}

impl DistributionParams {
    /// Hand-tuned preset for screen-space ambient-occlusion kernels.
    pub fn ssao() -> Self {
        Self {
            revolutions: 20.0,
            min_angle: 5.0,
            max_angle: 37.0,
            vertical_perturbation: 0.5,
            min_depth: 0.125,
            max_depth: 1.0,
            depth_exponent: 0.9375,
        }
    }
}

/// Cardinality of a generated vector set. The enumerated values are the only
/// kernel sizes the shader side supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum SampleCount {
    X1 = 1,
    X2 = 2,
    X3 = 3,
    X4 = 4,
    X8 = 8,
    X12 = 12,
    X16 = 16,
    X32 = 32,
    X64 = 64,
}

impl SampleCount {
    pub const ALL: [SampleCount; 9] = [
        SampleCount::X1,
        SampleCount::X2,
        SampleCount::X3,
        SampleCount::X4,
        SampleCount::X8,
        SampleCount::X12,
        SampleCount::X16,
        SampleCount::X32,
        SampleCount::X64,
    ];

    /// Largest supported kernel size, must match the shader-side array bound.
    pub const MAX: usize = 64;

    pub fn get(self) -> usize {
        self as usize
    }

    pub fn from_int(value: u32) -> Option<Self> {
        Self::ALL.iter().copied().find(|s| *s as u32 == value)
    }
}

impl Display for SampleCount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "x{}", self.get())
    }
}

impl FromStr for SampleCount {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.strip_prefix('x').unwrap_or(s);
        digits
            .parse()
            .ok()
            .and_then(Self::from_int)
            .ok_or_else(|| format!("unsupported sample count `{s}`, expected one of 1,2,3,4,8,12,16,32,64"))
    }
}
