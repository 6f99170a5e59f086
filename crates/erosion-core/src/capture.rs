//! Capture documents: per-stage statistics recorded while eroding in debug
//! mode, together with the command history that produced them.
//!
//! On disk the statistics are columnar, one array per `"<stage>.<metric>"`
//! key with one entry per captured iteration. Older frame-keyed captures
//! (`data: [{frame, data: {stage: {metric: value}}}]`) are accepted on load
//! and converted.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::instrument::{CaptureFrame, StageStats};
use crate::params::{GenerationParams, SimulationParameters};

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("cannot access capture: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed capture: {0}")]
    Parse(#[from] serde_json::Error),
}

/// One erosion command as issued by the operator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub step: u64,
    #[serde(default)]
    pub rain: bool,
    pub iterations: u32,
    pub params: SimulationParameters,
}

/// Per-metric columns keyed `"<stage>.<metric>"`.
pub type CaptureColumns = BTreeMap<String, Vec<Option<f64>>>;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "RawCaptureDocument")]
pub struct CaptureDocument {
    pub history: Vec<HistoryEntry>,
    pub data: CaptureColumns,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generation_params: Option<GenerationParams>,
}

impl CaptureDocument {
    pub fn from_json_str(json: &str) -> Result<Self, CaptureError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json_string(&self) -> Result<String, CaptureError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, CaptureError> {
        Self::from_json_str(&std::fs::read_to_string(path)?)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), CaptureError> {
        std::fs::write(path, self.to_json_string()?)?;
        Ok(())
    }

    /// Number of captured iterations (longest column).
    pub fn frame_count(&self) -> usize {
        self.data.values().map(Vec::len).max().unwrap_or(0)
    }

    /// Value of `key` at `frame`, if recorded.
    pub fn value(&self, key: &str, frame: usize) -> Option<f64> {
        self.data.get(key).and_then(|col| col.get(frame).copied().flatten())
    }

    /// Generation parameters to rebuild the starting terrain from: the
    /// recorded ones, or those of the first command.
    pub fn setup_params(&self) -> Option<GenerationParams> {
        self.generation_params
            .clone()
            .or_else(|| self.history.first().map(|h| h.params.generation.clone()))
    }
}

/// Flatten frames into columns, one entry per frame for every key seen.
pub fn frames_to_columns(frames: &[CaptureFrame]) -> CaptureColumns {
    let mut columns = CaptureColumns::new();
    for (i, frame) in frames.iter().enumerate() {
        for (stage, stats) in &frame.stages {
            for metric in StageStats::METRICS {
                let col = columns.entry(format!("{stage}.{metric}")).or_default();
                col.resize(i, None);
                col.push(stats.metric(metric));
            }
        }
    }
    for col in columns.values_mut() {
        col.resize(frames.len(), None);
    }
    columns
}

// ── Loading ───────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawCaptureDocument {
    #[serde(default)]
    history: Vec<HistoryEntry>,
    #[serde(default)]
    data: RawCaptureData,
    #[serde(default)]
    generation_params: Option<GenerationParams>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawCaptureData {
    Columns(CaptureColumns),
    Frames(Vec<LegacyFrame>),
}

impl Default for RawCaptureData {
    fn default() -> Self {
        RawCaptureData::Columns(CaptureColumns::new())
    }
}

#[derive(Deserialize)]
struct LegacyFrame {
    frame: u64,
    data: BTreeMap<String, BTreeMap<String, f64>>,
}

impl From<RawCaptureDocument> for CaptureDocument {
    fn from(raw: RawCaptureDocument) -> Self {
        let data = match raw.data {
            RawCaptureData::Columns(columns) => columns,
            RawCaptureData::Frames(mut frames) => {
                frames.sort_by_key(|f| f.frame);
                let mut columns = CaptureColumns::new();
                for (i, frame) in frames.iter().enumerate() {
                    for (stage, metrics) in &frame.data {
                        for (metric, &value) in metrics {
                            let col = columns.entry(format!("{stage}.{metric}")).or_default();
                            col.resize(i, None);
                            col.push(Some(value));
                        }
                    }
                }
                for col in columns.values_mut() {
                    col.resize(frames.len(), None);
                }
                columns
            }
        };
        CaptureDocument { history: raw.history, data, generation_params: raw.generation_params }
    }
}

// ── Recording ─────────────────────────────────────────────────────────────────

/// Accumulates history and frames while capture is enabled.
#[derive(Debug, Clone, Default)]
pub struct CaptureLog {
    enabled: bool,
    generation_params: Option<GenerationParams>,
    history: Vec<HistoryEntry>,
    frames: Vec<CaptureFrame>,
}

impl CaptureLog {
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Flip recording on or off; returns the new state.
    pub fn toggle(&mut self) -> bool {
        self.enabled = !self.enabled;
        self.enabled
    }

    /// Remember the parameters the current terrain was generated with.
    pub fn set_generation(&mut self, params: &GenerationParams) {
        self.generation_params = Some(params.clone());
    }

    pub fn record_command(&mut self, iterations: u32, params: &SimulationParameters) {
        let step = self.history.len() as u64;
        self.history.push(HistoryEntry { step, rain: params.erosion.add_rain, iterations, params: params.clone() });
    }

    pub fn record_frame(&mut self, frame: CaptureFrame) {
        self.frames.push(frame);
    }

    pub fn frames(&self) -> &[CaptureFrame] {
        &self.frames
    }

    pub fn history(&self) -> &[HistoryEntry] {
        &self.history
    }

    pub fn clear(&mut self) {
        self.history.clear();
        self.frames.clear();
    }

    pub fn to_document(&self) -> CaptureDocument {
        CaptureDocument {
            history: self.history.clone(),
            data: frames_to_columns(&self.frames),
            generation_params: self.generation_params.clone(),
        }
    }
}

// ── Comparison ────────────────────────────────────────────────────────────────

/// Relative difference (percent) above which a metric is flagged.
pub const WARN_PERCENT: f64 = 1.0;
/// Relative difference (percent) above which a metric fails.
pub const FAIL_PERCENT: f64 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Grade {
    Ok,
    Warn,
    Fail,
    /// One side has no value for this frame.
    Missing,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricDiff {
    pub frame: usize,
    pub key: String,
    pub left: Option<f64>,
    pub right: Option<f64>,
    pub absolute: Option<f64>,
    /// `(left − right) / left` in percent; 0 when `left` is ~0.
    pub relative_percent: Option<f64>,
    pub grade: Grade,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CaptureComparison {
    pub left_frames: usize,
    pub right_frames: usize,
    pub diffs: Vec<MetricDiff>,
}

impl CaptureComparison {
    /// Frames compared: the shorter capture's length.
    pub fn frames_compared(&self) -> usize {
        self.left_frames.min(self.right_frames)
    }

    pub fn count(&self, grade: Grade) -> usize {
        self.diffs.iter().filter(|d| d.grade == grade).count()
    }

    /// True when no metric warns, fails or is missing.
    pub fn is_clean(&self) -> bool {
        self.diffs.iter().all(|d| d.grade == Grade::Ok)
    }
}

fn grade_pair(left: Option<f64>, right: Option<f64>) -> (Option<f64>, Option<f64>, Grade) {
    let (Some(l), Some(r)) = (left, right) else {
        return (None, None, Grade::Missing);
    };
    let diff = l - r;
    let rel = if l.abs() > 1e-9 { diff / l * 100.0 } else { 0.0 };
    let g = match rel.abs() {
        x if x > FAIL_PERCENT => Grade::Fail,
        x if x > WARN_PERCENT => Grade::Warn,
        _ => Grade::Ok,
    };
    (Some(diff), Some(rel), g)
}

/// Per-frame, per-metric differences over every key present in either side.
pub fn compare_captures(left: &CaptureDocument, right: &CaptureDocument) -> CaptureComparison {
    let left_frames = left.frame_count();
    let right_frames = right.frame_count();
    let mut keys: Vec<&String> = left.data.keys().chain(right.data.keys()).collect();
    keys.sort();
    keys.dedup();

    let mut diffs = Vec::new();
    for frame in 0..left_frames.min(right_frames) {
        for key in &keys {
            let (l, r) = (left.value(key, frame), right.value(key, frame));
            let (absolute, relative_percent, grade) = grade_pair(l, r);
            diffs.push(MetricDiff {
                frame,
                key: (*key).clone(),
                left: l,
                right: r,
                absolute,
                relative_percent,
                grade,
            });
        }
    }
    CaptureComparison { left_frames, right_frames, diffs }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instrument::{FieldView, StageObserver, StageRecorder};

    fn frame(iteration: u64, water: &[f32]) -> CaptureFrame {
        let mut rec = StageRecorder::new(iteration);
        rec.after_stage("pass1_water", FieldView::Scalar(water));
        rec.finish()
    }

    #[test]
    fn frames_become_columns() {
        let cols = frames_to_columns(&[frame(0, &[1.0, 1.0]), frame(1, &[2.0, 0.0])]);
        assert_eq!(cols.len(), StageStats::METRICS.len());
        assert_eq!(cols["pass1_water.sum"], vec![Some(2.0), Some(2.0)]);
        assert_eq!(cols["pass1_water.nonZeroCount"], vec![Some(2.0), Some(1.0)]);
    }

    #[test]
    fn legacy_frame_shape_is_normalized() {
        let json = r#"{
            "history": [],
            "data": [
                {"frame": 1, "data": {"pass6_water": {"sum": 3.0}}},
                {"frame": 0, "data": {"pass6_water": {"sum": 4.0}, "pass1_water": {"max": 1.0}}}
            ]
        }"#;
        let doc = CaptureDocument::from_json_str(json).unwrap();
        assert_eq!(doc.data["pass6_water.sum"], vec![Some(4.0), Some(3.0)]);
        assert_eq!(doc.data["pass1_water.max"], vec![Some(1.0), None]);
        assert_eq!(doc.frame_count(), 2);
    }

    #[test]
    fn columnar_document_survives_json() {
        let mut log = CaptureLog::default();
        log.set_generation(&GenerationParams { grid_size: 16, ..GenerationParams::default() });
        log.record_command(2, &SimulationParameters::default());
        log.record_frame(frame(0, &[0.5]));
        let doc = log.to_document();
        let back = CaptureDocument::from_json_str(&doc.to_json_string().unwrap()).unwrap();
        assert_eq!(back, doc);
        assert_eq!(back.setup_params().map(|g| g.grid_size), Some(16));
        assert!(doc.to_json_string().unwrap().contains("\"generationParams\""));
    }

    #[test]
    fn setup_falls_back_to_first_command() {
        let mut params = SimulationParameters::default();
        params.generation.grid_size = 32;
        let doc = CaptureDocument {
            history: vec![HistoryEntry { step: 0, rain: true, iterations: 1, params }],
            ..CaptureDocument::default()
        };
        assert_eq!(doc.setup_params().map(|g| g.grid_size), Some(32));
    }

    #[test]
    fn comparison_grades_relative_differences() {
        let doc = |v: f64| CaptureDocument {
            data: [("pass1_water.sum".to_string(), vec![Some(100.0), Some(v)])].into_iter().collect(),
            ..CaptureDocument::default()
        };
        let left = doc(100.0);
        assert!(compare_captures(&left, &left).is_clean());
        let cmp = compare_captures(&left, &doc(98.0));
        assert_eq!(cmp.diffs[1].grade, Grade::Warn);
        let cmp = compare_captures(&left, &doc(90.0));
        assert_eq!(cmp.diffs[1].grade, Grade::Fail);
        assert_eq!(cmp.diffs[1].absolute, Some(10.0));
        assert_eq!(cmp.count(Grade::Ok), 1);
    }

    #[test]
    fn comparison_stops_at_shorter_capture() {
        let left = CaptureDocument {
            data: [("a.sum".to_string(), vec![Some(1.0); 3])].into_iter().collect(),
            ..CaptureDocument::default()
        };
        let right = CaptureDocument {
            data: [("b.sum".to_string(), vec![Some(1.0); 2])].into_iter().collect(),
            ..CaptureDocument::default()
        };
        let cmp = compare_captures(&left, &right);
        assert_eq!(cmp.frames_compared(), 2);
        assert_eq!(cmp.count(Grade::Missing), 4);
    }

    #[test]
    fn toggle_and_clear() {
        let mut log = CaptureLog::default();
        assert!(log.toggle());
        log.record_frame(frame(0, &[1.0]));
        log.record_command(1, &SimulationParameters::default());
        log.clear();
        assert!(log.frames().is_empty() && log.history().is_empty());
        assert!(log.is_enabled());
        assert!(!log.toggle());
    }
}
