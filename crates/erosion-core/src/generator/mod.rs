//! Field generation strategies.
//!
//! A generator turns [`GenerationParams`] into a `size × size` height field in
//! `[0, 1]`. Fractal variants normalize against running bounds that persist
//! between calls; static fixtures skip normalization and serve as controlled
//! test terrain.

pub mod fixtures;
pub mod fractal;

use serde::{Deserialize, Serialize};

use crate::error::SimError;
use crate::params::GenerationParams;

pub use fixtures::{FixtureShape, StaticGenerator};
pub use fractal::{FractalGenerator, NoiseKernel, NoiseStyle};

/// Names accepted by [`builtin_generator`], default first.
pub const BUILTIN_GENERATORS: [&str; 6] = ["fbm", "ridged", "flat", "slope", "pyramid", "bowl"];

/// Running raw-value bounds used to map noise into `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormalizationState {
    pub global_min: f32,
    pub global_max: f32,
}

impl NormalizationState {
    /// Bounds before any sample has been seen.
    pub const EMPTY: Self = Self { global_min: f32::INFINITY, global_max: f32::NEG_INFINITY };

    pub fn is_empty(&self) -> bool {
        self.global_min > self.global_max
    }

    /// Widen the bounds to cover `[lo, hi]`.
    pub fn include(&mut self, lo: f32, hi: f32) {
        self.global_min = self.global_min.min(lo);
        self.global_max = self.global_max.max(hi);
    }

    pub fn range(&self) -> f32 {
        if self.is_empty() { 0.0 } else { self.global_max - self.global_min }
    }
}

impl Default for NormalizationState {
    fn default() -> Self {
        Self::EMPTY
    }
}

/// Output of one `generate` call.
#[derive(Debug, Clone)]
pub struct Generation {
    /// Row-major heights, `grid_size²` values.
    pub heights: Vec<f32>,
    /// Set when the kernel could not be built; `heights` is then all zero.
    pub fault: Option<SimError>,
}

impl Generation {
    pub fn ok(heights: Vec<f32>) -> Self {
        Self { heights, fault: None }
    }

    /// A well-formed all-zero field carrying `fault`.
    pub fn degraded(grid_size: usize, fault: SimError) -> Self {
        Self { heights: vec![0.0; grid_size * grid_size], fault: Some(fault) }
    }
}

/// A field generation strategy.
pub trait FieldGenerator: Send {
    fn name(&self) -> &str;

    fn grid_size(&self) -> usize;

    /// Reallocate for a new grid size. Clears normalization bounds.
    fn resize(&mut self, grid_size: usize);

    /// Produce a normalized field. Never panics on bad parameters: a kernel
    /// that cannot be built yields [`Generation::degraded`].
    fn generate(&mut self, params: &GenerationParams) -> Generation;

    fn reset_normalization(&mut self) {}

    /// Current running bounds; `None` for strategies that do not normalize or
    /// have not generated since the last reset.
    fn normalization(&self) -> Option<NormalizationState> {
        None
    }
}

/// Construct a built-in strategy by name.
pub fn builtin_generator(name: &str, grid_size: usize) -> Result<Box<dyn FieldGenerator>, SimError> {
    let generator: Box<dyn FieldGenerator> = match name {
        "fbm"     => Box::new(FractalGenerator::new(NoiseStyle::Fbm, grid_size)),
        "ridged"  => Box::new(FractalGenerator::new(NoiseStyle::Ridged, grid_size)),
        "flat"    => Box::new(StaticGenerator::new(FixtureShape::Flat, grid_size)),
        "slope"   => Box::new(StaticGenerator::new(FixtureShape::Slope, grid_size)),
        "pyramid" => Box::new(StaticGenerator::new(FixtureShape::Pyramid, grid_size)),
        "bowl"    => Box::new(StaticGenerator::new(FixtureShape::Bowl, grid_size)),
        other     => return Err(SimError::UnknownStrategy(other.to_string())),
    };
    Ok(generator)
}
