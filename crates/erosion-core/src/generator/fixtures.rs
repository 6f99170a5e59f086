//! Static test terrain. No noise, no normalization: the same field every call.
use super::{FieldGenerator, Generation};
use crate::error::SimError;
use crate::grid::is_valid_grid_size;
use crate::parallel::fill_cells;
use crate::params::GenerationParams;

/// Height assigned to every cell of the flat fixture.
pub const FLAT_HEIGHT: f32 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FixtureShape {
    /// Constant [`FLAT_HEIGHT`].
    Flat,
    /// Linear ramp from 0 at column 0 to 1 at the last column.
    Slope,
    /// 1 at the centre falling linearly (Chebyshev distance) to 0 at the edge.
    Pyramid,
    /// 0 at the centre rising quadratically to 1 at the corners.
    Bowl,
}

impl FixtureShape {
    /// Height at `(row, col)` of an `n × n` grid.
    pub fn height(self, row: usize, col: usize, n: usize) -> f32 {
        let half = (n.max(2) - 1) as f32 / 2.0;
        let dx = (col as f32 - half) / half;
        let dy = (row as f32 - half) / half;
        match self {
            FixtureShape::Flat    => FLAT_HEIGHT,
            FixtureShape::Slope   => col as f32 / (n.max(2) - 1) as f32,
            FixtureShape::Pyramid => 1.0 - dx.abs().max(dy.abs()),
            FixtureShape::Bowl    => ((dx * dx + dy * dy) / 2.0).min(1.0),
        }
    }
}

pub struct StaticGenerator {
    shape: FixtureShape,
    grid_size: usize,
}

impl StaticGenerator {
    pub fn new(shape: FixtureShape, grid_size: usize) -> Self {
        Self { shape, grid_size }
    }
}

impl FieldGenerator for StaticGenerator {
    fn name(&self) -> &str {
        match self.shape {
            FixtureShape::Flat => "flat",
            FixtureShape::Slope => "slope",
            FixtureShape::Pyramid => "pyramid",
            FixtureShape::Bowl => "bowl",
        }
    }

    fn grid_size(&self) -> usize {
        self.grid_size
    }

    fn resize(&mut self, grid_size: usize) {
        self.grid_size = grid_size;
    }

    fn generate(&mut self, params: &GenerationParams) -> Generation {
        self.grid_size = params.grid_size;
        let n = self.grid_size;
        if !is_valid_grid_size(n) {
            return Generation { heights: Vec::new(), fault: Some(SimError::InvalidGridSize(n)) };
        }
        let shape = self.shape;
        let mut field = vec![0.0f32; n * n];
        fill_cells(&mut field, |i| shape.height(i / n, i % n, n));
        Generation::ok(field)
    }
}
