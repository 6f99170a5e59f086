//! Operation sequencing and ownership of the canonical terrain.
//!
//! One operation (generate, or erode N iterations) runs at a time on a worker
//! thread. Requests that arrive while it runs are not queued: they merge into
//! a single pending record that is launched once the orchestrator is idle
//! again. A requested regeneration survives later merges; a later erode or
//! reset replaces an earlier one.
//!
//! Canonical state (terrain, water, baseline, iteration count, grid size)
//! changes only when an operation's final readback is applied, so a timed-out
//! or failed operation leaves the last good state in place.

use std::collections::BTreeMap;

use crate::capture::{CaptureDocument, CaptureLog};
use crate::config::SimulationConfig;
use crate::erosion::{builtin_erosion_model, CancelToken, ErosionModel, BUILTIN_MODELS};
use crate::error::SimError;
use crate::generator::{builtin_generator, FieldGenerator, BUILTIN_GENERATORS};
use crate::grid::is_valid_grid_size;
use crate::instrument::StageRecorder;
use crate::metrics::ErosionMetrics;
use crate::params::{GenerationParams, SimulationParameters};
use crate::worker::{dispatch, InFlight, Job, JobOutput, WorkerEvent};

// ── Control surface ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    Regenerate,
    Erode { iterations: u32 },
    ResetErosionState,
    SwitchGenerator(String),
    SwitchErosionModel(String),
    ToggleCapture,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GenerateSummary {
    pub generator: String,
    pub grid_size: usize,
    /// Buffers were reallocated for a new grid size.
    pub resized: bool,
    /// Normalization bounds were cleared before generating.
    pub normalization_reset: bool,
    /// Set when the generator degraded to a zero field.
    pub fault: Option<SimError>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ErodeOutcome {
    pub model: String,
    pub iterations_run: u32,
    pub total_iterations: u64,
    pub metrics: ErosionMetrics,
    /// `erosion + deposition` changed by less than the configured epsilon.
    pub equilibrium: bool,
    pub cancelled: bool,
    /// Set when the call was skipped (terrain unchanged).
    pub fault: Option<SimError>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Completion {
    Generated(GenerateSummary),
    Eroded(ErodeOutcome),
    Reset,
    CaptureToggled(bool),
}

/// What `submit` did with a request.
#[derive(Debug, Clone, PartialEq)]
pub enum Dispatch {
    /// Running on the worker; collect it with `wait`.
    Started,
    /// Merged into the single pending follow-up.
    Coalesced,
    /// Handled synchronously.
    Completed(Completion),
}

// ── Strategy registry ─────────────────────────────────────────────────────────

/// Strategies by name. A slot is empty while its strategy is on the worker.
struct Registry<T: ?Sized> {
    slots: BTreeMap<String, Option<Box<T>>>,
}

impl<T: ?Sized> Registry<T> {
    fn new() -> Self {
        Self { slots: BTreeMap::new() }
    }

    fn insert(&mut self, name: String, item: Box<T>) {
        self.slots.insert(name, Some(item));
    }

    fn contains(&self, name: &str) -> bool {
        self.slots.contains_key(name)
    }

    fn get(&self, name: &str) -> Option<&T> {
        self.slots.get(name)?.as_deref()
    }

    fn checkout(&mut self, name: &str, operation: &'static str) -> Result<Box<T>, SimError> {
        match self.slots.get_mut(name) {
            None => Err(SimError::UnknownStrategy(name.to_string())),
            Some(slot) => slot.take().ok_or(SimError::WorkerLost(operation)),
        }
    }

    /// Put a strategy back, unless its slot was re-registered meanwhile.
    fn restore(&mut self, name: &str, item: Box<T>) {
        if let Some(slot) = self.slots.get_mut(name) {
            if slot.is_none() {
                *slot = Some(item);
            }
        }
    }

    fn available_mut(&mut self) -> impl Iterator<Item = &mut T> + '_ {
        self.slots.values_mut().filter_map(|s| s.as_deref_mut())
    }

    fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.slots.keys().map(String::as_str)
    }
}

// ── Orchestrator ──────────────────────────────────────────────────────────────

/// A request after strategy switches have been applied.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Action {
    Generate,
    Erode(u32),
    ResetState,
}

/// Follow-up work collected while an operation runs. Launched in the order
/// regenerate, reset, erode.
#[derive(Debug, Clone)]
struct PendingWork {
    regenerate: bool,
    reset: bool,
    erode: Option<u32>,
    /// Parameters of the latest request.
    params: SimulationParameters,
}

impl PendingWork {
    fn merge(previous: Option<PendingWork>, action: Action, params: &SimulationParameters) -> Self {
        let mut work = previous.unwrap_or_else(|| PendingWork {
            regenerate: false,
            reset: false,
            erode: None,
            params: params.clone(),
        });
        work.params = params.clone();
        match action {
            Action::Generate => {
                work.regenerate = true;
                work.reset = false;
                work.erode = None;
            }
            // Generation resets every model anyway.
            Action::ResetState => {
                work.reset = !work.regenerate;
                work.erode = None;
            }
            Action::Erode(iterations) => work.erode = Some(iterations),
        }
        work
    }

    /// Take the next action, leaving the rest pending.
    fn next(&mut self) -> Option<Action> {
        if std::mem::take(&mut self.regenerate) {
            return Some(Action::Generate);
        }
        if std::mem::take(&mut self.reset) {
            return Some(Action::ResetState);
        }
        self.erode.take().map(Action::Erode)
    }

    fn is_empty(&self) -> bool {
        !self.regenerate && !self.reset && self.erode.is_none()
    }
}

enum OperationKind {
    Generate { params: SimulationParameters, resized: bool, normalization_reset: bool },
    Erode { params: SimulationParameters },
}

struct Operation {
    job: InFlight,
    strategy: String,
    kind: OperationKind,
}

pub struct SimulationOrchestrator {
    config: SimulationConfig,
    params: SimulationParameters,
    last_generation: Option<GenerationParams>,
    grid_size: usize,

    generators: Registry<dyn FieldGenerator>,
    models: Registry<dyn ErosionModel>,
    active_generator: String,
    active_model: String,
    /// Clear normalization before the next generation (strategy switched).
    normalization_stale: bool,

    terrain: Vec<f32>,
    water: Option<Vec<f32>>,
    baseline: Vec<f32>,
    total_iterations: u64,
    /// `erosion + deposition` after the previous erosion call.
    previous_total: f64,
    at_equilibrium: bool,

    capture: CaptureLog,
    cancel: CancelToken,
    in_flight: Option<Operation>,
    /// Timed-out operation whose strategy has not come back yet.
    abandoned: Option<Operation>,
    pending: Option<PendingWork>,
}

impl SimulationOrchestrator {
    /// Build every built-in strategy; buffers are allocated by the first
    /// generation.
    pub fn new(config: SimulationConfig) -> Result<Self, SimError> {
        let size = config.parameters.generation.grid_size;
        let mut generators = Registry::new();
        for name in BUILTIN_GENERATORS {
            generators.insert(name.to_string(), builtin_generator(name, size)?);
        }
        let mut models = Registry::new();
        for name in BUILTIN_MODELS {
            models.insert(name.to_string(), builtin_erosion_model(name)?);
        }
        if !generators.contains(&config.default_generator) {
            return Err(SimError::UnknownStrategy(config.default_generator.clone()));
        }
        if !models.contains(&config.default_erosion_model) {
            return Err(SimError::UnknownStrategy(config.default_erosion_model.clone()));
        }
        Ok(Self {
            params: config.parameters.clone(),
            active_generator: config.default_generator.clone(),
            active_model: config.default_erosion_model.clone(),
            config,
            last_generation: None,
            grid_size: 0,
            generators,
            models,
            normalization_stale: false,
            terrain: Vec::new(),
            water: None,
            baseline: Vec::new(),
            total_iterations: 0,
            previous_total: 0.0,
            at_equilibrium: false,
            capture: CaptureLog::default(),
            cancel: CancelToken::default(),
            in_flight: None,
            abandoned: None,
            pending: None,
        })
    }

    // ── Requests ──────────────────────────────────────────────────────────────

    /// Hand a request to the orchestrator without blocking on the worker.
    pub fn submit(&mut self, request: Request, params: &SimulationParameters) -> Result<Dispatch, SimError> {
        let action = match request {
            Request::Regenerate => Action::Generate,
            Request::Erode { iterations } => Action::Erode(iterations),
            Request::ResetErosionState => Action::ResetState,
            Request::ToggleCapture => {
                let on = self.capture.toggle();
                log::info!("capture {}", if on { "enabled" } else { "disabled" });
                return Ok(Dispatch::Completed(Completion::CaptureToggled(on)));
            }
            Request::SwitchGenerator(name) => {
                if !self.generators.contains(&name) {
                    return Err(SimError::UnknownStrategy(name));
                }
                log::info!("generation strategy: {} → {name}", self.active_generator);
                self.active_generator = name;
                self.normalization_stale = true;
                Action::Generate
            }
            Request::SwitchErosionModel(name) => {
                if !self.models.contains(&name) {
                    return Err(SimError::UnknownStrategy(name));
                }
                log::info!("erosion model: {} → {name}", self.active_model);
                self.active_model = name;
                self.normalization_stale = true;
                Action::Generate
            }
        };

        // Merging into leftovers of a failed wait keeps last-write-wins.
        self.pending = Some(PendingWork::merge(self.pending.take(), action, params));
        if self.in_flight.is_some() {
            log::debug!("busy; coalescing {action:?}");
            return Ok(Dispatch::Coalesced);
        }
        self.launch_pending()?.ok_or(SimError::Superseded)
    }

    /// Collect the in-flight operation, apply it, then launch the pending
    /// follow-up if there is one. When idle, pending work left behind by a
    /// failed wait is launched first. `Ok(None)` when there is nothing to do.
    pub fn wait(&mut self) -> Result<Option<Completion>, SimError> {
        if self.in_flight.is_none() {
            if let Some(Dispatch::Completed(c)) = self.launch_pending()? {
                return Ok(Some(c));
            }
        }
        let Some(op) = self.in_flight.take() else {
            return Ok(None);
        };
        let timeout = self.config.readback_timeout();
        let mut frame: Option<StageRecorder> = None;
        let output = loop {
            match op.job.next_event(timeout) {
                Ok(WorkerEvent::Stage { iteration, label, stats }) => {
                    let mut open = match frame.take() {
                        Some(open) if open.iteration() == iteration => open,
                        done => {
                            if let Some(done) = done {
                                self.capture.record_frame(done.finish());
                            }
                            StageRecorder::new(iteration)
                        }
                    };
                    open.record(label, stats);
                    frame = Some(open);
                }
                Ok(WorkerEvent::Finished(output)) => break output,
                Err(e) => {
                    if let Some(done) = frame.take() {
                        self.capture.record_frame(done.finish());
                    }
                    if matches!(e, SimError::ReadbackTimeout { .. }) {
                        log::warn!("{e}; abandoning '{}'", op.job.operation());
                        self.abandoned = Some(op);
                    }
                    return Err(e);
                }
            }
        };
        if let Some(done) = frame {
            self.capture.record_frame(done.finish());
        }
        let completion = self.apply(op, output)?;
        if let Err(e) = self.launch_pending() {
            log::warn!("follow-up request failed: {e}");
        }
        Ok(Some(completion))
    }

    /// Wait until idle, following any coalesced requests.
    pub fn drive(&mut self) -> Result<Vec<Completion>, SimError> {
        let mut done = Vec::new();
        while let Some(c) = self.wait()? {
            done.push(c);
        }
        Ok(done)
    }

    pub fn regenerate(&mut self, params: &SimulationParameters) -> Result<GenerateSummary, SimError> {
        match self.run_now(Request::Regenerate, params)? {
            Completion::Generated(summary) => Ok(summary),
            _ => Err(SimError::Superseded),
        }
    }

    pub fn erode(&mut self, iterations: u32, params: &SimulationParameters) -> Result<ErodeOutcome, SimError> {
        match self.run_now(Request::Erode { iterations }, params)? {
            Completion::Eroded(outcome) => Ok(outcome),
            _ => Err(SimError::Superseded),
        }
    }

    /// Zero water, sediment and velocity in every model. Terrain is kept.
    pub fn reset_erosion_state(&mut self) -> Result<(), SimError> {
        let params = self.params.clone();
        self.run_now(Request::ResetErosionState, &params).map(|_| ())
    }

    pub fn switch_generation_strategy(
        &mut self,
        name: &str,
        params: &SimulationParameters,
    ) -> Result<GenerateSummary, SimError> {
        match self.run_now(Request::SwitchGenerator(name.to_string()), params)? {
            Completion::Generated(summary) => Ok(summary),
            _ => Err(SimError::Superseded),
        }
    }

    pub fn switch_erosion_model(&mut self, name: &str, params: &SimulationParameters) -> Result<GenerateSummary, SimError> {
        match self.run_now(Request::SwitchErosionModel(name.to_string()), params)? {
            Completion::Generated(summary) => Ok(summary),
            _ => Err(SimError::Superseded),
        }
    }

    /// Returns whether capture is now on.
    pub fn toggle_capture(&mut self) -> bool {
        self.capture.toggle()
    }

    fn run_now(&mut self, request: Request, params: &SimulationParameters) -> Result<Completion, SimError> {
        self.drive()?;
        match self.submit(request, params)? {
            Dispatch::Completed(c) => Ok(c),
            Dispatch::Started => self.wait()?.ok_or(SimError::Superseded),
            Dispatch::Coalesced => Err(SimError::Superseded),
        }
    }

    /// Launch pending actions until one runs on the worker or none are left.
    /// Returns the last dispatch. Work blocked behind an abandoned operation
    /// stays pending; any other failure drops it.
    fn launch_pending(&mut self) -> Result<Option<Dispatch>, SimError> {
        let mut last = None;
        while self.in_flight.is_none() {
            let Some(mut work) = self.pending.take() else {
                break;
            };
            let before = work.clone();
            let Some(action) = work.next() else {
                break;
            };
            log::debug!("launching {action:?}");
            match self.launch(action, &work.params) {
                Ok(dispatch) => {
                    if !work.is_empty() {
                        self.pending = Some(work);
                    }
                    last = Some(dispatch);
                }
                Err(e @ SimError::ReadbackTimeout { .. }) => {
                    self.pending = Some(before);
                    return Err(e);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(last)
    }

    fn launch(&mut self, action: Action, params: &SimulationParameters) -> Result<Dispatch, SimError> {
        match action {
            Action::Generate => self.start_generation(params),
            Action::Erode(iterations) => self.start_erosion(iterations, params),
            Action::ResetState => {
                self.reclaim()?;
                for model in self.models.available_mut() {
                    model.reset_state();
                }
                self.water = self.models.get(&self.active_model).and_then(|m| m.water()).map(<[f32]>::to_vec);
                Ok(Dispatch::Completed(Completion::Reset))
            }
        }
    }

    // ── Operations ────────────────────────────────────────────────────────────

    fn start_generation(&mut self, params: &SimulationParameters) -> Result<Dispatch, SimError> {
        let size = params.generation.grid_size;
        if !is_valid_grid_size(size) {
            return Err(SimError::InvalidGridSize(size));
        }
        self.reclaim()?;

        // Models and canonical state follow in `apply`, once the field exists.
        let resized = size != self.grid_size;
        let mut generator_resized = false;
        for generator in self.generators.available_mut() {
            if generator.grid_size() != size {
                generator.resize(size);
                generator_resized = true;
            }
        }
        let shape_changed = self
            .last_generation
            .as_ref()
            .is_some_and(|last| last.world_shape_differs(&params.generation));
        let normalization_reset = resized || generator_resized || shape_changed || self.normalization_stale;
        if normalization_reset {
            for generator in self.generators.available_mut() {
                generator.reset_normalization();
            }
            self.normalization_stale = false;
        }

        let strategy = self.active_generator.clone();
        let generator = self.generators.checkout(&strategy, "generate")?;
        let job = dispatch(Job::Generate { generator, params: params.generation.clone() })?;
        self.in_flight = Some(Operation {
            job,
            strategy,
            kind: OperationKind::Generate { params: params.clone(), resized, normalization_reset },
        });
        Ok(Dispatch::Started)
    }

    fn start_erosion(&mut self, iterations: u32, params: &SimulationParameters) -> Result<Dispatch, SimError> {
        if self.baseline.is_empty() {
            return Err(SimError::NotGenerated);
        }
        self.reclaim()?;

        let strategy = self.active_model.clone();
        let model = self.models.checkout(&strategy, "erode")?;
        if model.grid_size() != self.grid_size {
            let fault = SimError::GridSizeMismatch { expected: self.grid_size, actual: model.grid_size() };
            log::warn!("erosion skipped: {fault}");
            self.models.restore(&strategy, model);
            return Ok(Dispatch::Completed(Completion::Eroded(self.skipped_erosion(strategy, fault))));
        }

        self.cancel.reset();
        let instrumented = self.capture.is_enabled();
        if instrumented {
            self.capture.record_command(iterations, params);
        }
        let job = dispatch(Job::Erode {
            model,
            terrain: self.terrain.clone(),
            iterations,
            params: params.erosion.clone(),
            instrumented,
            first_iteration: self.total_iterations,
            cancel: self.cancel.clone(),
        })?;
        self.in_flight = Some(Operation { job, strategy, kind: OperationKind::Erode { params: params.clone() } });
        Ok(Dispatch::Started)
    }

    fn apply(&mut self, op: Operation, output: JobOutput) -> Result<Completion, SimError> {
        let Operation { job, strategy, kind } = op;
        match (kind, output) {
            (OperationKind::Generate { params, resized, normalization_reset }, JobOutput::Generated { generator, generation }) => {
                self.generators.restore(&strategy, generator);
                if let Some(fault) = &generation.fault {
                    log::warn!("generation with '{strategy}' degraded: {fault}");
                }
                let size = params.generation.grid_size;
                if size != self.grid_size {
                    log::debug!("grid size {} → {size}", self.grid_size);
                    for model in self.models.available_mut() {
                        model.recreate_resources(size)?;
                    }
                    self.grid_size = size;
                }
                self.terrain = generation.heights;
                self.baseline = self.terrain.clone();
                self.total_iterations = 0;
                self.previous_total = 0.0;
                self.at_equilibrium = false;
                for model in self.models.available_mut() {
                    model.reset_state();
                }
                self.water = self.models.get(&self.active_model).and_then(|m| m.water()).map(<[f32]>::to_vec);
                self.capture.set_generation(&params.generation);
                self.last_generation = Some(params.generation.clone());
                self.params = params;
                log::info!("generated {0}×{0} terrain with '{strategy}'", self.grid_size);
                Ok(Completion::Generated(GenerateSummary {
                    generator: strategy,
                    grid_size: self.grid_size,
                    resized,
                    normalization_reset,
                    fault: generation.fault,
                }))
            }
            (OperationKind::Erode { params }, JobOutput::Eroded { model, result, terrain, water }) => {
                self.models.restore(&strategy, model);
                self.params = params;
                match result {
                    Ok(report) => {
                        self.terrain = terrain;
                        self.water = water;
                        self.total_iterations += report.iterations_completed as u64;
                        let metrics = self.metrics();
                        let total = metrics.total();
                        let equilibrium = report.iterations_completed > 0
                            && (total - self.previous_total).abs() < self.config.equilibrium_epsilon as f64;
                        if report.iterations_completed > 0 {
                            self.previous_total = total;
                            self.at_equilibrium = equilibrium;
                        }
                        log::info!(
                            "eroded {} iterations with '{strategy}' (total {}, erosion {:.6}, deposition {:.6})",
                            report.iterations_completed,
                            self.total_iterations,
                            metrics.erosion_amount,
                            metrics.deposition_amount
                        );
                        Ok(Completion::Eroded(ErodeOutcome {
                            model: strategy,
                            iterations_run: report.iterations_completed,
                            total_iterations: self.total_iterations,
                            metrics,
                            equilibrium,
                            cancelled: report.cancelled,
                            fault: None,
                        }))
                    }
                    Err(fault @ (SimError::KernelUnavailable { .. } | SimError::GridSizeMismatch { .. })) => {
                        log::warn!("erosion with '{strategy}' skipped: {fault}");
                        Ok(Completion::Eroded(self.skipped_erosion(strategy, fault)))
                    }
                    Err(e) => Err(e),
                }
            }
            _ => Err(SimError::WorkerLost(job.operation())),
        }
    }

    fn skipped_erosion(&self, model: String, fault: SimError) -> ErodeOutcome {
        ErodeOutcome {
            model,
            iterations_run: 0,
            total_iterations: self.total_iterations,
            metrics: self.metrics(),
            equilibrium: false,
            cancelled: false,
            fault: Some(fault),
        }
    }

    /// Recover the strategy held by a timed-out operation; its results are
    /// discarded.
    fn reclaim(&mut self) -> Result<(), SimError> {
        let Some(op) = self.abandoned.take() else {
            return Ok(());
        };
        let timeout = self.config.readback_timeout();
        loop {
            match op.job.next_event(timeout) {
                Ok(WorkerEvent::Stage { .. }) => {}
                Ok(WorkerEvent::Finished(output)) => {
                    match output {
                        JobOutput::Generated { generator, .. } => self.generators.restore(&op.strategy, generator),
                        JobOutput::Eroded { model, .. } => self.models.restore(&op.strategy, model),
                    }
                    log::info!("reclaimed '{}' from abandoned {}", op.strategy, op.job.operation());
                    return Ok(());
                }
                Err(e @ SimError::ReadbackTimeout { .. }) => {
                    self.abandoned = Some(op);
                    return Err(e);
                }
                Err(e) => return Err(e),
            }
        }
    }

    // ── Registration ──────────────────────────────────────────────────────────

    /// Add or replace a generation strategy.
    pub fn register_generator(&mut self, name: &str, mut generator: Box<dyn FieldGenerator>) {
        if self.grid_size > 0 && generator.grid_size() != self.grid_size {
            generator.resize(self.grid_size);
        }
        self.generators.insert(name.to_string(), generator);
    }

    /// Add or replace an erosion model, allocating it for the current grid.
    pub fn register_erosion_model(&mut self, name: &str, mut model: Box<dyn ErosionModel>) -> Result<(), SimError> {
        if self.grid_size > 0 {
            model.create_resources(self.grid_size)?;
        }
        self.models.insert(name.to_string(), model);
        Ok(())
    }

    // ── Accessors ─────────────────────────────────────────────────────────────

    /// Canonical terrain, row-major. Empty before the first generation.
    pub fn terrain(&self) -> &[f32] {
        &self.terrain
    }

    pub fn water(&self) -> Option<&[f32]> {
        self.water.as_deref()
    }

    /// Field as it was right after the last generation.
    pub fn baseline(&self) -> &[f32] {
        &self.baseline
    }

    /// Erosion and deposition of the current terrain against the baseline.
    pub fn metrics(&self) -> ErosionMetrics {
        ErosionMetrics::compute(&self.terrain, &self.baseline)
    }

    pub fn total_iterations(&self) -> u64 {
        self.total_iterations
    }

    pub fn at_equilibrium(&self) -> bool {
        self.at_equilibrium
    }

    /// Current grid edge length; 0 before the first generation.
    pub fn grid_size(&self) -> usize {
        self.grid_size
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Parameters of the last applied operation.
    pub fn parameters(&self) -> &SimulationParameters {
        &self.params
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Handle that stops the remaining iterations of the running erosion.
    pub fn cancel_handle(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn active_generator(&self) -> &str {
        &self.active_generator
    }

    pub fn active_erosion_model(&self) -> &str {
        &self.active_model
    }

    pub fn generator_names(&self) -> Vec<&str> {
        self.generators.names().collect()
    }

    pub fn erosion_model_names(&self) -> Vec<&str> {
        self.models.names().collect()
    }

    /// `None` if unknown or currently on the worker.
    pub fn generator(&self, name: &str) -> Option<&dyn FieldGenerator> {
        self.generators.get(name)
    }

    pub fn erosion_model(&self, name: &str) -> Option<&dyn ErosionModel> {
        self.models.get(name)
    }

    pub fn is_capturing(&self) -> bool {
        self.capture.is_enabled()
    }

    pub fn capture_document(&self) -> CaptureDocument {
        self.capture.to_document()
    }

    pub fn clear_capture(&mut self) {
        self.capture.clear();
    }
}
