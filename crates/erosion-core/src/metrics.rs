//! Erosion metrics against the pristine baseline.
//!
//! Always recomputed from the full field; sums run sequentially in `f64` so
//! the same terrain yields bit-identical metrics however it was reached.
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErosionMetrics {
    /// Mean height removed below the baseline, per cell.
    pub erosion_amount: f64,
    /// Mean height added above the baseline, per cell.
    pub deposition_amount: f64,
}

impl ErosionMetrics {
    /// Compare `terrain` with `baseline` cell by cell.
    ///
    /// Mismatched or empty inputs give zero metrics.
    pub fn compute(terrain: &[f32], baseline: &[f32]) -> Self {
        if terrain.is_empty() || terrain.len() != baseline.len() {
            return Self::default();
        }
        let mut eroded = 0.0f64;
        let mut deposited = 0.0f64;
        for (&h, &b) in terrain.iter().zip(baseline) {
            let d = h as f64 - b as f64;
            if d < 0.0 {
                eroded -= d;
            } else {
                deposited += d;
            }
        }
        let n = terrain.len() as f64;
        Self { erosion_amount: eroded / n, deposition_amount: deposited / n }
    }

    /// Combined activity used for equilibrium detection.
    pub fn total(&self) -> f64 {
        self.erosion_amount + self.deposition_amount
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_loss_and_gain() {
        let base = [0.5, 0.5, 0.5, 0.5];
        let m = ErosionMetrics::compute(&[0.25, 0.5, 0.75, 1.0], &base);
        assert_eq!(m.erosion_amount, 0.0625);
        assert_eq!(m.deposition_amount, 0.1875);
        assert_eq!(m.total(), 0.25);
    }

    #[test]
    fn identical_fields_are_zero() {
        let f = [0.1, 0.2, 0.3, 0.4];
        assert_eq!(ErosionMetrics::compute(&f, &f), ErosionMetrics::default());
    }

    #[test]
    fn mismatched_lengths_are_zero() {
        assert_eq!(ErosionMetrics::compute(&[1.0], &[]), ErosionMetrics::default());
    }
}
