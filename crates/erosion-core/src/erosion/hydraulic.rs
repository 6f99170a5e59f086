//! Multi-stage hydraulic erosion on double-buffered grids.
//!
//! Each iteration runs six full per-cell passes in order:
//!   1. Water increment (rain, or a straight copy when rain is off).
//!   2. Flow: velocity from the height + water surface gradient.
//!   3. Erosion/deposition against the velocity-derived capacity.
//!   4. Transport: semi-Lagrangian advection of water and sediment.
//!   5. Deposition of any post-transport excess; sea cells are sinks.
//!   6. Evaporation.
//!
//! Terrain heights are normalized while water and sediment are in world
//! units: `height_multiplier` converts between the two wherever they meet.
//! Cells below `sea_level` are sinks; they never erode and every grain that
//! reaches them settles.
use super::schedule::{BindingSchedule, Field, Stage, StageBinding};
use super::{check_step, check_upload, CancelToken, ErosionModel, RunReport};
use crate::error::SimError;
use crate::grid::{clamped_index, is_valid_grid_size, BufferPair, Slot, Vec2};
use crate::instrument::{FieldView, NoopObserver, StageObserver};
use crate::parallel::{fill_cells, fill_cells2};
use crate::params::ErosionParams;

/// Constants for one run, validated once.
#[derive(Debug, Clone, Copy)]
struct HydraulicKernel {
    rain: f32,
    evaporation_factor: f32,
    solubility: f32,
    deposition_rate: f32,
    capacity_factor: f32,
    sea_level: f32,
    dt: f32,
    cell_size: f32,
    height_multiplier: f32,
    min_slope: f32,
    damping: f32,
    gravity: f32,
}

impl HydraulicKernel {
    fn new(params: &ErosionParams) -> Result<Self, SimError> {
        check_step("hydraulic", params)?;
        if params.height_multiplier <= 0.0 {
            return Err(SimError::kernel("hydraulic", "heightMultiplier must be positive"));
        }
        Ok(Self {
            rain: if params.add_rain { params.rain_amount } else { 0.0 },
            evaporation_factor: (1.0 - params.evap_rate * params.dt).max(0.0),
            solubility: params.solubility,
            deposition_rate: params.deposition_rate,
            capacity_factor: params.capacity_factor,
            sea_level: params.sea_level,
            dt: params.dt,
            cell_size: params.cell_size,
            height_multiplier: params.height_multiplier,
            min_slope: params.min_slope,
            damping: params.velocity_damping,
            gravity: params.gravity,
        })
    }

    /// Sediment a cell's water can hold.
    #[inline]
    fn capacity(&self, v: Vec2, water: f32) -> f32 {
        let speed = (v[0] * v[0] + v[1] * v[1]).sqrt();
        speed.max(self.min_slope) * water * self.capacity_factor
    }
}

/// Bilinear sample at fractional `(x, y)` with edge clamp.
#[inline]
fn sample_bilinear(data: &[f32], n: usize, x: f32, y: f32) -> f32 {
    let x0 = x.floor();
    let y0 = y.floor();
    let tx = x - x0;
    let ty = y - y0;
    let (c0, r0) = (x0 as isize, y0 as isize);
    let v00 = data[clamped_index(n, r0, c0)];
    let v10 = data[clamped_index(n, r0, c0 + 1)];
    let v01 = data[clamped_index(n, r0 + 1, c0)];
    let v11 = data[clamped_index(n, r0 + 1, c0 + 1)];
    v00 * (1.0 - tx) * (1.0 - ty) + v10 * tx * (1.0 - ty) + v01 * (1.0 - tx) * ty + v11 * tx * ty
}

/// The four double-buffered fields.
#[derive(Debug, Clone)]
struct HydraulicBuffers {
    size: usize,
    terrain: BufferPair<f32>,
    water: BufferPair<f32>,
    sediment: BufferPair<f32>,
    velocity: BufferPair<Vec2>,
}

impl HydraulicBuffers {
    fn new(size: usize) -> Self {
        Self {
            size,
            terrain: BufferPair::new(size),
            water: BufferPair::new(size),
            sediment: BufferPair::new(size),
            velocity: BufferPair::new(size),
        }
    }

    fn apply<O: StageObserver + ?Sized>(&mut self, b: &StageBinding, k: &HydraulicKernel, observer: &mut O) {
        let n = self.size;
        match b.stage {
            Stage::Water => {
                let (src, dst) = self.water.split(b.read(Field::Water));
                fill_cells(&mut dst.data, |i| src.data[i] + k.rain);
                observer.after_stage("pass1_water", FieldView::Scalar(&dst.data));
            }
            Stage::Flow => {
                let h = &self.terrain.slot(b.read(Field::Terrain)).data;
                let w = &self.water.slot(b.read(Field::Water)).data;
                let (src, dst) = self.velocity.split(b.read(Field::Velocity));
                let surface = |r: isize, c: isize| {
                    let j = clamped_index(n, r, c);
                    h[j] * k.height_multiplier + w[j]
                };
                let accel = k.dt * k.gravity;
                fill_cells(&mut dst.data, |i| {
                    let (r, c) = ((i / n) as isize, (i % n) as isize);
                    let mut gx = (surface(r, c + 1) - surface(r, c - 1)) / (2.0 * k.cell_size);
                    let mut gy = (surface(r + 1, c) - surface(r - 1, c)) / (2.0 * k.cell_size);
                    if (gx * gx + gy * gy).sqrt() < k.min_slope {
                        gx = 0.0;
                        gy = 0.0;
                    }
                    let v = src.data[i];
                    [(v[0] - accel * gx) * k.damping, (v[1] - accel * gy) * k.damping]
                });
                observer.after_stage("pass2_velocity", FieldView::Vector(&dst.data));
            }
            Stage::Erosion => {
                let w = &self.water.slot(b.read(Field::Water)).data;
                let v = &self.velocity.slot(b.read(Field::Velocity)).data;
                let (h_src, h_dst) = self.terrain.split(b.read(Field::Terrain));
                let (s_src, s_dst) = self.sediment.split(b.read(Field::Sediment));
                fill_cells2(&mut h_dst.data, &mut s_dst.data, |i| {
                    let (h, s) = (h_src.data[i], s_src.data[i]);
                    let cap = if h < k.sea_level { 0.0 } else { k.capacity(v[i], w[i]) };
                    if cap > s {
                        let taken = ((cap - s) * k.solubility).min(h * k.height_multiplier).max(0.0);
                        (h - taken / k.height_multiplier, s + taken)
                    } else {
                        let dropped = (s - cap) * k.deposition_rate;
                        (h + dropped / k.height_multiplier, s - dropped)
                    }
                });
                observer.after_stage("pass3_terrain", FieldView::Scalar(&h_dst.data));
                observer.after_stage("pass3_sediment", FieldView::Scalar(&s_dst.data));
            }
            Stage::Transport => {
                let v = &self.velocity.slot(b.read(Field::Velocity)).data;
                let (w_src, w_dst) = self.water.split(b.read(Field::Water));
                let (s_src, s_dst) = self.sediment.split(b.read(Field::Sediment));
                let step = k.dt / k.cell_size;
                fill_cells2(&mut w_dst.data, &mut s_dst.data, |i| {
                    // Back-trace at most one cell upstream.
                    let dx = (v[i][0] * step).clamp(-1.0, 1.0);
                    let dy = (v[i][1] * step).clamp(-1.0, 1.0);
                    let x = (i % n) as f32 - dx;
                    let y = (i / n) as f32 - dy;
                    (sample_bilinear(&w_src.data, n, x, y), sample_bilinear(&s_src.data, n, x, y))
                });
                observer.after_stage("pass4_water", FieldView::Scalar(&w_dst.data));
                observer.after_stage("pass4_sediment", FieldView::Scalar(&s_dst.data));
            }
            Stage::Deposition => {
                let w = &self.water.slot(b.read(Field::Water)).data;
                let v = &self.velocity.slot(b.read(Field::Velocity)).data;
                let (h_src, h_dst) = self.terrain.split(b.read(Field::Terrain));
                let (s_src, s_dst) = self.sediment.split(b.read(Field::Sediment));
                fill_cells2(&mut h_dst.data, &mut s_dst.data, |i| {
                    let (h, s) = (h_src.data[i], s_src.data[i]);
                    if h < k.sea_level {
                        return (h + s / k.height_multiplier, 0.0);
                    }
                    let cap = k.capacity(v[i], w[i]);
                    if s > cap {
                        let dropped = (s - cap) * k.deposition_rate;
                        (h + dropped / k.height_multiplier, s - dropped)
                    } else {
                        (h, s)
                    }
                });
                observer.after_stage("pass5_terrain", FieldView::Scalar(&h_dst.data));
                observer.after_stage("pass5_sediment", FieldView::Scalar(&s_dst.data));
            }
            Stage::Evaporation => {
                let (src, dst) = self.water.split(b.read(Field::Water));
                fill_cells(&mut dst.data, |i| src.data[i] * k.evaporation_factor);
                observer.after_stage("pass6_water", FieldView::Scalar(&dst.data));
            }
        }
    }

    /// Copy any field whose final value sits in slot B back into slot A.
    fn settle(&mut self, schedule: &BindingSchedule, completed: u32) {
        for f in Field::ALL {
            if schedule.authoritative(f, completed) == Slot::B {
                match f {
                    Field::Terrain  => self.terrain.copy_across(Slot::B),
                    Field::Water    => self.water.copy_across(Slot::B),
                    Field::Sediment => self.sediment.copy_across(Slot::B),
                    Field::Velocity => self.velocity.copy_across(Slot::B),
                }
            }
        }
    }
}

/// Hydraulic erosion with water, sediment and velocity state.
pub struct HydraulicErosionModel {
    buffers: HydraulicBuffers,
    schedule: BindingSchedule,
}

impl HydraulicErosionModel {
    pub fn new() -> Self {
        Self { buffers: HydraulicBuffers::new(0), schedule: BindingSchedule::new(&Stage::ORDER) }
    }

    /// Authoritative sediment concentration (slot A).
    pub fn sediment(&self) -> &[f32] {
        &self.buffers.sediment.slot(Slot::A).data
    }

    /// Authoritative velocity (slot A).
    pub fn velocity(&self) -> &[Vec2] {
        &self.buffers.velocity.slot(Slot::A).data
    }

    /// The single stage sequencer shared by the batched and debug paths.
    fn sequence<O: StageObserver + ?Sized>(
        &mut self,
        iterations: u32,
        kernel: &HydraulicKernel,
        cancel: &CancelToken,
        observer: &mut O,
    ) -> RunReport {
        let Self { buffers, schedule } = self;
        let mut completed = 0u32;
        for i in 0..iterations {
            if cancel.is_cancelled() {
                break;
            }
            for binding in schedule.for_iteration(i) {
                buffers.apply(binding, kernel, observer);
            }
            completed += 1;
        }
        buffers.settle(schedule, completed);
        RunReport { iterations_completed: completed, cancelled: completed < iterations }
    }
}

impl Default for HydraulicErosionModel {
    fn default() -> Self {
        Self::new()
    }
}

impl ErosionModel for HydraulicErosionModel {
    fn name(&self) -> &str {
        "hydraulic"
    }

    fn grid_size(&self) -> usize {
        self.buffers.size
    }

    fn create_resources(&mut self, grid_size: usize) -> Result<(), SimError> {
        if !is_valid_grid_size(grid_size) {
            return Err(SimError::InvalidGridSize(grid_size));
        }
        self.buffers = HydraulicBuffers::new(grid_size);
        self.schedule = BindingSchedule::new(&Stage::ORDER);
        Ok(())
    }

    fn upload_terrain(&mut self, terrain: &[f32]) -> Result<(), SimError> {
        check_upload(self.buffers.size, terrain)?;
        self.buffers.terrain.load(terrain);
        Ok(())
    }

    fn run(&mut self, iterations: u32, params: &ErosionParams, cancel: &CancelToken) -> Result<RunReport, SimError> {
        let kernel = HydraulicKernel::new(params)?;
        Ok(self.sequence(iterations, &kernel, cancel, &mut NoopObserver))
    }

    fn run_instrumented(&mut self, params: &ErosionParams, observer: &mut dyn StageObserver) -> Result<(), SimError> {
        let kernel = HydraulicKernel::new(params)?;
        self.sequence(1, &kernel, &CancelToken::default(), observer);
        Ok(())
    }

    fn terrain(&self) -> &[f32] {
        &self.buffers.terrain.slot(Slot::A).data
    }

    fn water(&self) -> Option<&[f32]> {
        Some(&self.buffers.water.slot(Slot::A).data)
    }

    fn reset_state(&mut self) {
        self.buffers.water.fill(0.0);
        self.buffers.sediment.fill(0.0);
        self.buffers.velocity.fill([0.0, 0.0]);
    }

    fn auxiliary_sum(&self) -> f64 {
        let scalar = |d: &[f32]| d.iter().map(|v| v.abs() as f64).sum::<f64>();
        let speed: f64 = self.velocity().iter().map(|v| (v[0].abs() + v[1].abs()) as f64).sum();
        scalar(&self.buffers.water.slot(Slot::A).data) + scalar(self.sediment()) + speed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::FixtureShape;
    use crate::instrument::StageRecorder;

    fn model_with(shape: FixtureShape, n: usize) -> HydraulicErosionModel {
        let mut m = HydraulicErosionModel::new();
        m.create_resources(n).unwrap();
        let terrain: Vec<f32> = (0..n * n).map(|i| shape.height(i / n, i % n, n)).collect();
        m.upload_terrain(&terrain).unwrap();
        m
    }

    fn rain() -> ErosionParams {
        ErosionParams { add_rain: true, ..ErosionParams::default() }
    }

    #[test]
    fn rain_accumulates_on_flat_ground() {
        let mut m = model_with(FixtureShape::Flat, 8);
        let p = ErosionParams { evap_rate: 0.0, ..rain() };
        m.run(3, &p, &CancelToken::default()).unwrap();
        let w = m.water().unwrap();
        assert!(w.iter().all(|&v| (v - 3.0 * p.rain_amount).abs() < 1e-6), "water {:?}", &w[..4]);
    }

    #[test]
    fn no_rain_and_no_water_leaves_terrain_unchanged() {
        let mut m = model_with(FixtureShape::Pyramid, 16);
        let before = m.terrain().to_vec();
        let p = ErosionParams { add_rain: false, ..ErosionParams::default() };
        m.run(5, &p, &CancelToken::default()).unwrap();
        assert_eq!(m.terrain(), &before[..]);
    }

    #[test]
    fn slope_loses_material_under_rain() {
        let mut m = model_with(FixtureShape::Slope, 32);
        let before: f32 = m.terrain().iter().sum();
        m.run(20, &rain(), &CancelToken::default()).unwrap();
        let after: f32 = m.terrain().iter().sum();
        assert!(after < before, "terrain mass should drop: {before} → {after}");
        assert!(m.sediment().iter().any(|&s| s > 0.0), "eroded material must be in suspension");
        assert!(m.terrain().iter().all(|v| v.is_finite()));
    }

    #[test]
    fn water_flows_downhill() {
        let mut m = model_with(FixtureShape::Slope, 16);
        m.run(1, &rain(), &CancelToken::default()).unwrap();
        // Heights rise with column, so flow runs towards −x.
        let v = m.velocity();
        assert!(v[5 * 16 + 8][0] < 0.0, "vx = {}", v[5 * 16 + 8][0]);
        assert!(v[5 * 16 + 8][1].abs() < 1e-6);
    }

    #[test]
    fn cancelled_run_stops_at_iteration_boundary() {
        let mut m = model_with(FixtureShape::Slope, 8);
        let cancel = CancelToken::default();
        cancel.cancel();
        let report = m.run(10, &rain(), &cancel).unwrap();
        assert_eq!(report, RunReport { iterations_completed: 0, cancelled: true });
    }

    #[test]
    fn invalid_constants_leave_state_untouched() {
        let mut m = model_with(FixtureShape::Slope, 8);
        let before = m.terrain().to_vec();
        let err = m.run(4, &ErosionParams { dt: -1.0, ..rain() }, &CancelToken::default()).unwrap_err();
        assert!(matches!(err, SimError::KernelUnavailable { .. }));
        assert_eq!(m.terrain(), &before[..]);
        assert_eq!(m.auxiliary_sum(), 0.0);
    }

    #[test]
    fn reset_state_zeroes_auxiliary_fields_only() {
        let mut m = model_with(FixtureShape::Slope, 16);
        m.run(4, &rain(), &CancelToken::default()).unwrap();
        assert!(m.auxiliary_sum() > 0.0);
        let terrain = m.terrain().to_vec();
        m.reset_state();
        assert_eq!(m.auxiliary_sum(), 0.0);
        assert_eq!(m.terrain(), &terrain[..]);
    }

    #[test]
    fn instrumented_iteration_reports_every_stage() {
        let mut m = model_with(FixtureShape::Slope, 8);
        let mut rec = StageRecorder::new(0);
        m.run_instrumented(&rain(), &mut rec).unwrap();
        let frame = rec.finish();
        let expected: Vec<&str> = Stage::ORDER.iter().flat_map(|s| s.labels().iter().copied()).collect();
        assert_eq!(frame.stages.len(), expected.len());
        for label in expected {
            assert!(frame.stages.contains_key(label), "missing {label}");
        }
        let rain_sum = frame.stages["pass1_water"].sum;
        assert!((rain_sum - 64.0 * 0.01).abs() < 1e-4, "pass1 water sum {rain_sum}");
    }

    #[test]
    fn upload_rejects_wrong_size() {
        let mut m = HydraulicErosionModel::new();
        m.create_resources(8).unwrap();
        assert!(matches!(m.upload_terrain(&[0.0; 16]), Err(SimError::GridSizeMismatch { .. })));
        assert_eq!(m.create_resources(12), Err(SimError::InvalidGridSize(12)));
    }

    #[test]
    fn bilinear_sample_is_exact_on_cell_centres() {
        let data: Vec<f32> = (0..16).map(|i| i as f32).collect();
        assert_eq!(sample_bilinear(&data, 4, 2.0, 1.0), 6.0);
        assert_eq!(sample_bilinear(&data, 4, 0.5, 0.0), 0.5);
        assert_eq!(sample_bilinear(&data, 4, -3.0, 9.0), 12.0);
    }
}
