//! Bounded search for erosion constants that hit a target erosion rate.
//!
//! Each trial resets the model, uploads the same starting terrain, runs a
//! fixed number of batched iterations and measures how much of the mean
//! height was removed. The search samples `initial_trials` points uniformly
//! (log-uniform for solubility) and then perturbs the best point found so far
//! with a shrinking radius. Every coordinate stays inside its range.

use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::erosion::{CancelToken, ErosionModel};
use crate::error::SimError;
use crate::params::ErosionParams;

/// Erosion constants the search is allowed to change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TunedParam {
    Solubility,
    CapacityFactor,
    Gravity,
    DepositionRate,
}

impl TunedParam {
    pub const ALL: [TunedParam; 4] =
        [TunedParam::Solubility, TunedParam::CapacityFactor, TunedParam::Gravity, TunedParam::DepositionRate];

    /// Name of the matching [`ErosionParams`] field in JSON.
    pub fn name(self) -> &'static str {
        match self {
            TunedParam::Solubility     => "solubility",
            TunedParam::CapacityFactor => "capacityFactor",
            TunedParam::Gravity        => "gravity",
            TunedParam::DepositionRate => "depositionRate",
        }
    }

    /// Inclusive search range and whether it is sampled on a log scale.
    pub fn range(self) -> (f32, f32, bool) {
        match self {
            TunedParam::Solubility     => (0.001, 0.1, true),
            TunedParam::CapacityFactor => (0.01, 1.0, false),
            TunedParam::Gravity        => (1.0, 50.0, false),
            TunedParam::DepositionRate => (0.1, 0.9, false),
        }
    }

    /// Map `u ∈ [0, 1]` onto the range.
    fn from_unit(self, u: f64) -> f32 {
        let (lo, hi, log) = self.range();
        let u = u.clamp(0.0, 1.0);
        let v = if log {
            let (a, b) = ((lo as f64).ln(), (hi as f64).ln());
            (a + u * (b - a)).exp()
        } else {
            lo as f64 + u * (hi - lo) as f64
        };
        (v as f32).clamp(lo, hi)
    }

    fn set(self, params: &mut ErosionParams, value: f32) {
        match self {
            TunedParam::Solubility     => params.solubility = value,
            TunedParam::CapacityFactor => params.capacity_factor = value,
            TunedParam::Gravity        => params.gravity = value,
            TunedParam::DepositionRate => params.deposition_rate = value,
        }
    }
}

/// What the search aims for and how much work it may do.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TuningTarget {
    /// Share of the starting mean height to remove, in percent.
    pub erosion_percent: f64,
    /// Iterations per trial.
    pub iterations: u32,
    /// Total number of trials, random ones included.
    pub trials: u32,
    /// Uniformly sampled trials before local refinement starts.
    pub initial_trials: u32,
    pub seed: u64,
}

impl Default for TuningTarget {
    fn default() -> Self {
        Self { erosion_percent: 5.0, iterations: 100, trials: 50, initial_trials: 10, seed: 42 }
    }
}

/// One evaluated point.
#[derive(Debug, Clone, PartialEq)]
pub struct Trial {
    /// Values in [`TunedParam::ALL`] order.
    pub values: [f32; 4],
    pub erosion_percent: f64,
    /// `|erosion_percent - target|`.
    pub loss: f64,
}

impl Trial {
    /// `base` with this trial's values substituted.
    pub fn apply(&self, base: &ErosionParams) -> ErosionParams {
        let mut params = base.clone();
        for (param, &value) in TunedParam::ALL.iter().zip(&self.values) {
            param.set(&mut params, value);
        }
        params
    }

    /// Values keyed by JSON field name, ready to merge into a config file.
    pub fn named_values(&self) -> BTreeMap<&'static str, f32> {
        TunedParam::ALL.iter().map(|p| p.name()).zip(self.values).collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TuningResult {
    pub best: Trial,
    /// Every trial in evaluation order.
    pub trials: Vec<Trial>,
}

/// Percentage of the mean of `terrain` removed after `iterations` batched
/// iterations of `model`. The model's auxiliary state is reset first.
pub fn erosion_percent(
    model: &mut dyn ErosionModel,
    terrain: &[f32],
    iterations: u32,
    params: &ErosionParams,
) -> Result<f64, SimError> {
    let initial = mean(terrain);
    if initial <= 0.0 {
        return Err(SimError::kernel("tuning", "starting terrain has no height to erode"));
    }
    model.reset_state();
    model.upload_terrain(terrain)?;
    model.run(iterations, params, &CancelToken::default())?;
    Ok((initial - mean(model.terrain())) / initial * 100.0)
}

/// Search the [`TunedParam`] ranges for the constants whose erosion comes
/// closest to `target.erosion_percent`. Parameters outside the tuned set are
/// taken from `base`. `model` must already have resources for `terrain`.
pub fn tune(
    model: &mut dyn ErosionModel,
    terrain: &[f32],
    base: &ErosionParams,
    target: &TuningTarget,
) -> Result<TuningResult, SimError> {
    if target.trials == 0 {
        return Err(SimError::kernel("tuning", "at least one trial is required"));
    }
    let mut rng = StdRng::seed_from_u64(target.seed);
    let mut trials: Vec<Trial> = Vec::with_capacity(target.trials as usize);
    let mut best_unit = [0.5f64; 4];
    let mut best_loss = f64::INFINITY;

    for i in 0..target.trials {
        let unit = if i < target.initial_trials.max(1) {
            [rng.gen::<f64>(), rng.gen::<f64>(), rng.gen::<f64>(), rng.gen::<f64>()]
        } else {
            let progress = (i - target.initial_trials) as f64 / (target.trials - target.initial_trials).max(1) as f64;
            let radius = 0.25 * (1.0 - progress) + 0.02;
            best_unit.map(|u| (u + rng.gen_range(-radius..=radius)).clamp(0.0, 1.0))
        };

        let mut values = [0.0f32; 4];
        for (k, param) in TunedParam::ALL.iter().enumerate() {
            values[k] = param.from_unit(unit[k]);
        }
        let mut trial = Trial { values, erosion_percent: 0.0, loss: 0.0 };
        let params = trial.apply(base);
        trial.erosion_percent = erosion_percent(model, terrain, target.iterations, &params)?;
        trial.loss = (trial.erosion_percent - target.erosion_percent).abs();
        log::debug!("trial {i}: {:?} → {:.3}% (loss {:.4})", trial.named_values(), trial.erosion_percent, trial.loss);

        if trial.loss < best_loss {
            best_loss = trial.loss;
            best_unit = unit;
        }
        trials.push(trial);
    }

    let best = trials
        .iter()
        .min_by(|a, b| a.loss.total_cmp(&b.loss))
        .cloned()
        .ok_or_else(|| SimError::kernel("tuning", "no trial was evaluated"))?;
    log::info!("best of {} trials: {:.3}% (loss {:.4})", trials.len(), best.erosion_percent, best.loss);
    Ok(TuningResult { best, trials })
}

fn mean(data: &[f32]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    data.iter().map(|&v| v as f64).sum::<f64>() / data.len() as f64
}
