//! Single-stage thermal erosion.
//!
//! Material slides between 4-neighbours whose height difference exceeds the
//! talus threshold. The exchange is symmetric, so the total height is
//! conserved (up to float rounding).
use super::{check_step, check_upload, CancelToken, ErosionModel, RunReport};
use crate::error::SimError;
use crate::grid::{clamped_index, is_valid_grid_size, BufferPair, Slot};
use crate::instrument::{FieldView, NoopObserver, StageObserver};
use crate::parallel::fill_cells;
use crate::params::ErosionParams;

/// Largest stable diffusion rate for a 4-neighbour stencil.
const MAX_RATE: f32 = 0.25;

#[derive(Debug, Clone, Copy)]
struct ThermalKernel {
    rate: f32,
    /// Talus threshold expressed as a normalized height difference.
    talus: f32,
}

impl ThermalKernel {
    fn new(params: &ErosionParams) -> Result<Self, SimError> {
        check_step("simple", params)?;
        if params.height_multiplier <= 0.0 {
            return Err(SimError::kernel("simple", "heightMultiplier must be positive"));
        }
        Ok(Self {
            rate: (params.solubility * params.dt).clamp(0.0, MAX_RATE),
            talus: params.min_slope * params.cell_size / params.height_multiplier,
        })
    }
}

/// Terrain-only erosion model.
pub struct SimpleErosionModel {
    size: usize,
    terrain: BufferPair<f32>,
}

impl SimpleErosionModel {
    pub fn new() -> Self {
        Self { size: 0, terrain: BufferPair::new(0) }
    }

    fn sequence<O: StageObserver + ?Sized>(
        &mut self,
        iterations: u32,
        k: &ThermalKernel,
        cancel: &CancelToken,
        observer: &mut O,
    ) -> RunReport {
        let n = self.size;
        let mut completed = 0u32;
        for i in 0..iterations {
            if cancel.is_cancelled() {
                break;
            }
            let (src, dst) = self.terrain.split(Slot::from_parity(i as usize));
            let h = &src.data;
            fill_cells(&mut dst.data, |idx| {
                let (r, c) = ((idx / n) as isize, (idx % n) as isize);
                let here = h[idx];
                let mut flux = 0.0;
                for (dr, dc) in [(-1, 0), (1, 0), (0, -1), (0, 1)] {
                    let diff = h[clamped_index(n, r + dr, c + dc)] - here;
                    if diff.abs() > k.talus {
                        flux += diff;
                    }
                }
                here + k.rate * flux
            });
            observer.after_stage("pass1_terrain", FieldView::Scalar(&dst.data));
            completed += 1;
        }
        if completed & 1 == 1 {
            self.terrain.copy_across(Slot::B);
        }
        RunReport { iterations_completed: completed, cancelled: completed < iterations }
    }
}

impl Default for SimpleErosionModel {
    fn default() -> Self {
        Self::new()
    }
}

impl ErosionModel for SimpleErosionModel {
    fn name(&self) -> &str {
        "simple"
    }

    fn grid_size(&self) -> usize {
        self.size
    }

    fn create_resources(&mut self, grid_size: usize) -> Result<(), SimError> {
        if !is_valid_grid_size(grid_size) {
            return Err(SimError::InvalidGridSize(grid_size));
        }
        self.size = grid_size;
        self.terrain = BufferPair::new(grid_size);
        Ok(())
    }

    fn upload_terrain(&mut self, terrain: &[f32]) -> Result<(), SimError> {
        check_upload(self.size, terrain)?;
        self.terrain.load(terrain);
        Ok(())
    }

    fn run(&mut self, iterations: u32, params: &ErosionParams, cancel: &CancelToken) -> Result<RunReport, SimError> {
        let kernel = ThermalKernel::new(params)?;
        Ok(self.sequence(iterations, &kernel, cancel, &mut NoopObserver))
    }

    fn run_instrumented(&mut self, params: &ErosionParams, observer: &mut dyn StageObserver) -> Result<(), SimError> {
        let kernel = ThermalKernel::new(params)?;
        self.sequence(1, &kernel, &CancelToken::default(), observer);
        Ok(())
    }

    fn terrain(&self) -> &[f32] {
        &self.terrain.slot(Slot::A).data
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::FixtureShape;
    use crate::instrument::StageRecorder;

    fn model_with(shape: FixtureShape, n: usize) -> SimpleErosionModel {
        let mut m = SimpleErosionModel::new();
        m.create_resources(n).unwrap();
        let terrain: Vec<f32> = (0..n * n).map(|i| shape.height(i / n, i % n, n)).collect();
        m.upload_terrain(&terrain).unwrap();
        m
    }

    #[test]
    fn pyramid_flattens_and_conserves_mass() {
        let mut m = model_with(FixtureShape::Pyramid, 16);
        let peak_before = m.terrain().iter().cloned().fold(f32::MIN, f32::max);
        let mass_before: f64 = m.terrain().iter().map(|&v| v as f64).sum();
        m.run(25, &ErosionParams::default(), &CancelToken::default()).unwrap();
        let peak_after = m.terrain().iter().cloned().fold(f32::MIN, f32::max);
        let mass_after: f64 = m.terrain().iter().map(|&v| v as f64).sum();
        assert!(peak_after < peak_before, "peak {peak_before} → {peak_after}");
        assert!((mass_after - mass_before).abs() < 1e-3, "mass {mass_before} → {mass_after}");
    }

    #[test]
    fn flat_ground_is_stable() {
        let mut m = model_with(FixtureShape::Flat, 8);
        m.run(7, &ErosionParams::default(), &CancelToken::default()).unwrap();
        assert!(m.terrain().iter().all(|&v| v == 0.5));
    }

    #[test]
    fn odd_and_even_runs_leave_slot_a_current() {
        let mut odd = model_with(FixtureShape::Bowl, 8);
        let mut split = model_with(FixtureShape::Bowl, 8);
        let p = ErosionParams::default();
        odd.run(3, &p, &CancelToken::default()).unwrap();
        split.run(1, &p, &CancelToken::default()).unwrap();
        split.run(2, &p, &CancelToken::default()).unwrap();
        assert_eq!(odd.terrain(), split.terrain());
    }

    #[test]
    fn instrumented_iteration_matches_batched() {
        let mut batched = model_with(FixtureShape::Pyramid, 8);
        let mut debug = model_with(FixtureShape::Pyramid, 8);
        let p = ErosionParams::default();
        batched.run(1, &p, &CancelToken::default()).unwrap();
        let mut rec = StageRecorder::new(0);
        debug.run_instrumented(&p, &mut rec).unwrap();
        assert_eq!(batched.terrain(), debug.terrain());
        let frame = rec.finish();
        assert_eq!(frame.stages.keys().collect::<Vec<_>>(), vec!["pass1_terrain"]);
    }

    #[test]
    fn no_auxiliary_state() {
        let mut m = model_with(FixtureShape::Slope, 4);
        m.reset_state();
        assert_eq!(m.auxiliary_sum(), 0.0);
        assert!(m.water().is_none());
    }
}
