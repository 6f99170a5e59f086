//! Erosion models.
//!
//! Both families share one interface: allocate per-grid resources, accept a
//! copy of the canonical terrain, run N iterations over double-buffered
//! fields, and leave slot A authoritative for the caller to read back.
//!
//! * [`hydraulic::HydraulicErosionModel`]: six stages over terrain, water,
//!   sediment and velocity.
//! * [`thermal::SimpleErosionModel`]: one diffusive stage over terrain.
pub mod hydraulic;
pub mod schedule;
pub mod thermal;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::SimError;
use crate::instrument::StageObserver;
use crate::params::ErosionParams;

pub use hydraulic::HydraulicErosionModel;
pub use thermal::SimpleErosionModel;

/// Names accepted by [`builtin_erosion_model`], default first.
pub const BUILTIN_MODELS: [&str; 2] = ["hydraulic", "simple"];

/// Stops the remaining iterations of a run. Checked only between iterations.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub(crate) fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// What a `run` call actually did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunReport {
    pub iterations_completed: u32,
    pub cancelled: bool,
}

/// An erosion model operating on its own double-buffered fields.
pub trait ErosionModel: Send {
    fn name(&self) -> &str;

    /// Edge length the resources were created for; 0 before creation.
    fn grid_size(&self) -> usize;

    /// Allocate every buffer pair for `grid_size`, zero-filled.
    fn create_resources(&mut self, grid_size: usize) -> Result<(), SimError>;

    /// Drop all buffers and allocate fresh ones.
    fn recreate_resources(&mut self, grid_size: usize) -> Result<(), SimError> {
        self.create_resources(grid_size)
    }

    /// Copy the caller's terrain into both terrain slots.
    fn upload_terrain(&mut self, terrain: &[f32]) -> Result<(), SimError>;

    /// Run up to `iterations` iterations; slot A is authoritative afterwards.
    fn run(&mut self, iterations: u32, params: &ErosionParams, cancel: &CancelToken) -> Result<RunReport, SimError>;

    /// Run exactly one iteration, reporting every stage to `observer`.
    fn run_instrumented(&mut self, params: &ErosionParams, observer: &mut dyn StageObserver) -> Result<(), SimError>;

    /// Authoritative terrain (slot A).
    fn terrain(&self) -> &[f32];

    /// Authoritative water depth, for models that carry water.
    fn water(&self) -> Option<&[f32]> {
        None
    }

    /// Zero auxiliary fields (water, sediment, velocity). Terrain is untouched.
    fn reset_state(&mut self) {}

    /// Sum of absolute auxiliary values; 0 for models without auxiliary state.
    fn auxiliary_sum(&self) -> f64 {
        0.0
    }
}

/// Construct a built-in model by name, without resources.
pub fn builtin_erosion_model(name: &str) -> Result<Box<dyn ErosionModel>, SimError> {
    match name {
        "hydraulic" => Ok(Box::new(HydraulicErosionModel::new())),
        "simple"    => Ok(Box::new(SimpleErosionModel::new())),
        other       => Err(SimError::UnknownStrategy(other.to_string())),
    }
}

/// Shared size check for `upload_terrain`.
pub(crate) fn check_upload(grid_size: usize, terrain: &[f32]) -> Result<(), SimError> {
    if grid_size == 0 || terrain.len() != grid_size * grid_size {
        return Err(SimError::GridSizeMismatch {
            expected: (terrain.len() as f64).sqrt() as usize,
            actual: grid_size,
        });
    }
    Ok(())
}

/// Shared validation of the time-step constants every kernel needs.
pub(crate) fn check_step(component: &str, params: &ErosionParams) -> Result<(), SimError> {
    let finite = [
        params.rain_amount,
        params.evap_rate,
        params.solubility,
        params.deposition_rate,
        params.capacity_factor,
        params.sea_level,
        params.height_multiplier,
        params.min_slope,
        params.velocity_damping,
        params.gravity,
    ];
    if finite.iter().any(|v| !v.is_finite()) {
        return Err(SimError::kernel(component, "erosion parameters must be finite"));
    }
    if !(params.dt.is_finite() && params.dt > 0.0) || !(params.cell_size.is_finite() && params.cell_size > 0.0) {
        return Err(SimError::kernel(component, "dt and cellSize must be positive and finite"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_models_construct_without_resources() {
        for name in BUILTIN_MODELS {
            let m = builtin_erosion_model(name).unwrap();
            assert_eq!(m.name(), name);
            assert_eq!(m.grid_size(), 0);
        }
        assert!(matches!(builtin_erosion_model("glacial"), Err(SimError::UnknownStrategy(_))));
    }

    #[test]
    fn cancel_token_is_shared_between_clones() {
        let a = CancelToken::default();
        let b = a.clone();
        b.cancel();
        assert!(a.is_cancelled());
        a.reset();
        assert!(!b.is_cancelled());
    }

    #[test]
    fn step_check_rejects_bad_constants() {
        let ok = ErosionParams::default();
        assert!(check_step("t", &ok).is_ok());
        assert!(check_step("t", &ErosionParams { dt: 0.0, ..ok.clone() }).is_err());
        assert!(check_step("t", &ErosionParams { cell_size: -1.0, ..ok.clone() }).is_err());
        assert!(check_step("t", &ErosionParams { gravity: f32::INFINITY, ..ok }).is_err());
    }

    #[test]
    fn upload_check_requires_matching_length() {
        assert!(check_upload(4, &[0.0; 16]).is_ok());
        assert_eq!(
            check_upload(8, &[0.0; 16]),
            Err(SimError::GridSizeMismatch { expected: 4, actual: 8 })
        );
        assert!(check_upload(0, &[]).is_err());
    }
}
