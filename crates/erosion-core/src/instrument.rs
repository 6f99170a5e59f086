//! Per-stage instrumentation.
//!
//! Erosion models run every stage through one sequencer that calls a
//! [`StageObserver`] after each stage. The batched path passes [`NoopObserver`];
//! the debug path passes a [`StageRecorder`] that reduces each just-written
//! buffer to [`StageStats`]. Observers only read, so both paths produce the
//! same numbers.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::grid::Vec2;

/// Borrowed view of a buffer a stage has just written.
#[derive(Debug, Clone, Copy)]
pub enum FieldView<'a> {
    Scalar(&'a [f32]),
    Vector(&'a [Vec2]),
}

/// Reduction of one buffer after one stage.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageStats {
    pub sum: f64,
    pub min: f64,
    pub max: f64,
    pub avg: f64,
    pub non_zero_count: u64,
}

impl StageStats {
    /// Metric names in the order they appear in capture documents.
    pub const METRICS: [&'static str; 5] = ["sum", "min", "max", "avg", "nonZeroCount"];

    /// Reduce a view; vector fields contribute each component separately.
    pub fn of(view: FieldView<'_>) -> Self {
        match view {
            FieldView::Scalar(data) => Self::from_values(data.iter().copied()),
            FieldView::Vector(data) => Self::from_values(data.iter().flat_map(|v| v.iter().copied())),
        }
    }

    fn from_values(values: impl Iterator<Item = f32>) -> Self {
        let mut sum = 0.0f64;
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        let mut count = 0u64;
        let mut non_zero = 0u64;
        for v in values {
            let v = v as f64;
            sum += v;
            min = min.min(v);
            max = max.max(v);
            count += 1;
            if v != 0.0 {
                non_zero += 1;
            }
        }
        if count == 0 {
            return Self { sum: 0.0, min: 0.0, max: 0.0, avg: 0.0, non_zero_count: 0 };
        }
        Self { sum, min, max, avg: sum / count as f64, non_zero_count: non_zero }
    }

    /// Value of a metric by its capture-document name.
    pub fn metric(&self, name: &str) -> Option<f64> {
        match name {
            "sum" => Some(self.sum),
            "min" => Some(self.min),
            "max" => Some(self.max),
            "avg" => Some(self.avg),
            "nonZeroCount" => Some(self.non_zero_count as f64),
            _ => None,
        }
    }
}

/// Hook invoked by the stage sequencer after every stage.
pub trait StageObserver {
    /// `label` names the stage and field, e.g. `pass3_sediment`.
    fn after_stage(&mut self, label: &'static str, field: FieldView<'_>);
}

/// Observer for the batched path.
pub struct NoopObserver;

impl StageObserver for NoopObserver {
    #[inline]
    fn after_stage(&mut self, _label: &'static str, _field: FieldView<'_>) {}
}

/// Statistics for every stage of one iteration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureFrame {
    pub iteration: u64,
    pub stages: BTreeMap<String, StageStats>,
}

/// Builds a [`CaptureFrame`], either as an observer or from stage
/// statistics read back one at a time.
pub struct StageRecorder {
    frame: CaptureFrame,
}

impl StageRecorder {
    pub fn new(iteration: u64) -> Self {
        Self { frame: CaptureFrame { iteration, stages: BTreeMap::new() } }
    }

    pub fn iteration(&self) -> u64 {
        self.frame.iteration
    }

    pub fn record(&mut self, label: &str, stats: StageStats) {
        self.frame.stages.insert(label.to_string(), stats);
    }

    pub fn finish(self) -> CaptureFrame {
        self.frame
    }
}

impl StageObserver for StageRecorder {
    fn after_stage(&mut self, label: &'static str, field: FieldView<'_>) {
        self.record(label, StageStats::of(field));
    }
}
