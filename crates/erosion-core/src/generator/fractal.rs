//! Fractal noise generators with carried-forward normalization.
//!
//! Raw pass: per cell, sum `octaves` layers of Perlin gradient noise with
//! amplitude `persistence^i` and frequency `lacunarity^i`, sampled at world
//! coordinates `(col + pan_x, row + pan_y) / scale`.
//!
//! Normalization: merge the raw min/max into the running bounds, map into
//! `[0, 1]`, then reshape with exponent `1 / hurst`.
use noise::{NoiseFn, Perlin};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::{FieldGenerator, Generation, NormalizationState};
use crate::error::SimError;
use crate::grid::is_valid_grid_size;
use crate::parallel::{fill_cells, map_cells, min_max};
use crate::params::GenerationParams;

/// Per-octave noise shaping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoiseStyle {
    /// Plain fractal Brownian motion.
    Fbm,
    /// Ridged multifractal: `(1 − |n|)²` per octave.
    Ridged,
}

/// Compiled sampling kernel for one parameter set.
pub struct NoiseKernel {
    style: NoiseStyle,
    persistence: f64,
    lacunarity: f64,
    inv_scale: f64,
    pan: [f64; 2],
    noise: Perlin,
    /// Per-octave lattice offsets; keeps octaves from sharing lattice zeros.
    offsets: Vec<[f64; 2]>,
}

impl NoiseKernel {
    pub const MAX_OCTAVES: u32 = 16;

    /// Build the kernel, or report why it cannot be built.
    pub fn new(params: &GenerationParams, style: NoiseStyle) -> Result<Self, SimError> {
        let component = match style {
            NoiseStyle::Fbm => "fbm",
            NoiseStyle::Ridged => "ridged",
        };
        if params.octaves == 0 || params.octaves > Self::MAX_OCTAVES {
            return Err(SimError::kernel(
                component,
                format!("octaves must be in 1..={}, got {}", Self::MAX_OCTAVES, params.octaves),
            ));
        }
        let positive = |v: f32| v.is_finite() && v > 0.0;
        if !positive(params.lacunarity) || !positive(params.scale) || !positive(params.hurst) {
            return Err(SimError::kernel(component, "lacunarity, scale and hurst must be positive and finite"));
        }
        if !params.persistence.is_finite() || !params.pan_offset.iter().all(|v| v.is_finite()) {
            return Err(SimError::kernel(component, "persistence and pan offset must be finite"));
        }

        let mut rng = StdRng::seed_from_u64(params.seed as u64);
        let offsets = (0..params.octaves)
            .map(|_| [rng.gen_range(-4096.0..4096.0), rng.gen_range(-4096.0..4096.0)])
            .collect();

        Ok(Self {
            style,
            persistence: params.persistence as f64,
            lacunarity: params.lacunarity as f64,
            inv_scale: 1.0 / params.scale as f64,
            pan: [params.pan_offset[0] as f64, params.pan_offset[1] as f64],
            noise: Perlin::new(params.seed),
            offsets,
        })
    }

    /// Raw (unnormalized) value at grid cell `(row, col)`.
    pub fn sample(&self, row: usize, col: usize) -> f64 {
        let x = (col as f64 + self.pan[0]) * self.inv_scale;
        let y = (row as f64 + self.pan[1]) * self.inv_scale;
        let mut value = 0.0f64;
        let mut amp = 1.0f64;
        let mut freq = 1.0f64;
        for o in &self.offsets {
            let n = self.noise.get([x * freq + o[0], y * freq + o[1]]);
            value += amp * match self.style {
                NoiseStyle::Fbm => n,
                NoiseStyle::Ridged => {
                    let r = 1.0 - n.abs();
                    r * r
                }
            };
            amp *= self.persistence;
            freq *= self.lacunarity;
        }
        value
    }
}

/// Noise-backed generator owning its normalization bounds.
pub struct FractalGenerator {
    style: NoiseStyle,
    grid_size: usize,
    bounds: NormalizationState,
}

impl FractalGenerator {
    pub fn new(style: NoiseStyle, grid_size: usize) -> Self {
        Self { style, grid_size, bounds: NormalizationState::EMPTY }
    }

    /// Raw noise field for the current grid size.
    fn raw_field(&self, kernel: &NoiseKernel) -> Vec<f32> {
        let n = self.grid_size;
        let mut raw = vec![0.0f32; n * n];
        fill_cells(&mut raw, |i| kernel.sample(i / n, i % n) as f32);
        raw
    }
}

impl FieldGenerator for FractalGenerator {
    fn name(&self) -> &str {
        match self.style {
            NoiseStyle::Fbm => "fbm",
            NoiseStyle::Ridged => "ridged",
        }
    }

    fn grid_size(&self) -> usize {
        self.grid_size
    }

    fn resize(&mut self, grid_size: usize) {
        self.grid_size = grid_size;
        self.bounds = NormalizationState::EMPTY;
    }

    fn generate(&mut self, params: &GenerationParams) -> Generation {
        if params.grid_size != self.grid_size {
            self.resize(params.grid_size);
        }
        if !is_valid_grid_size(self.grid_size) {
            return Generation { heights: Vec::new(), fault: Some(SimError::InvalidGridSize(self.grid_size)) };
        }
        let kernel = match NoiseKernel::new(params, self.style) {
            Ok(k) => k,
            Err(e) => {
                log::warn!("{}: {e}; emitting flat field", self.name());
                return Generation::degraded(self.grid_size, e);
            }
        };

        let mut field = self.raw_field(&kernel);
        let (lo, hi) = min_max(&field);
        self.bounds.include(lo, hi);

        let min = self.bounds.global_min;
        let range = self.bounds.range();
        if range > 0.0 {
            let exponent = 1.0 / params.hurst;
            map_cells(&mut field, |v| ((v - min) / range).clamp(0.0, 1.0).powf(exponent));
        } else {
            field.iter_mut().for_each(|v| *v = 0.0);
        }
        Generation::ok(field)
    }

    fn reset_normalization(&mut self) {
        self.bounds = NormalizationState::EMPTY;
    }

    fn normalization(&self) -> Option<NormalizationState> {
        (!self.bounds.is_empty()).then_some(self.bounds)
    }
}
