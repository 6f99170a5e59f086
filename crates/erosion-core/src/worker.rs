//! Background execution of one generation or erosion operation.
//!
//! The strategy object is moved onto a short-lived worker thread together
//! with a copy of its inputs and handed back in the final event. Every event
//! is a readback: the orchestrator receives it with a bounded wait. Debug runs
//! read back after each stage, batched runs only at the end.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread;
use std::time::Duration;

use crate::erosion::{CancelToken, ErosionModel, RunReport};
use crate::error::SimError;
use crate::generator::{FieldGenerator, Generation};
use crate::instrument::{FieldView, StageObserver, StageStats};
use crate::params::{ErosionParams, GenerationParams};

pub(crate) enum Job {
    Generate {
        generator: Box<dyn FieldGenerator>,
        params: GenerationParams,
    },
    Erode {
        model: Box<dyn ErosionModel>,
        terrain: Vec<f32>,
        iterations: u32,
        params: ErosionParams,
        /// Run iteration by iteration, reading back every stage.
        instrumented: bool,
        /// Global index of the first iteration, for stage numbering.
        first_iteration: u64,
        cancel: CancelToken,
    },
}

impl Job {
    fn operation(&self) -> &'static str {
        match self {
            Job::Generate { .. } => "generate",
            Job::Erode { .. }    => "erode",
        }
    }
}

pub(crate) enum JobOutput {
    Generated {
        generator: Box<dyn FieldGenerator>,
        generation: Generation,
    },
    Eroded {
        model: Box<dyn ErosionModel>,
        result: Result<RunReport, SimError>,
        terrain: Vec<f32>,
        water: Option<Vec<f32>>,
    },
}

pub(crate) enum WorkerEvent {
    /// Statistics of one buffer right after the stage that wrote it.
    Stage { iteration: u64, label: &'static str, stats: StageStats },
    Finished(JobOutput),
}

/// Observer that reads back each stage as soon as it completes.
struct StageReadback<'a> {
    iteration: u64,
    tx: &'a Sender<WorkerEvent>,
}

impl StageObserver for StageReadback<'_> {
    fn after_stage(&mut self, label: &'static str, field: FieldView<'_>) {
        let _ = self.tx.send(WorkerEvent::Stage { iteration: self.iteration, label, stats: StageStats::of(field) });
    }
}

/// Handle on a dispatched job.
pub(crate) struct InFlight {
    rx: Receiver<WorkerEvent>,
    operation: &'static str,
}

impl InFlight {
    pub(crate) fn operation(&self) -> &'static str {
        self.operation
    }

    /// Wait up to `timeout` for the next event.
    pub(crate) fn next_event(&self, timeout: Duration) -> Result<WorkerEvent, SimError> {
        match self.rx.recv_timeout(timeout) {
            Ok(event) => Ok(event),
            Err(RecvTimeoutError::Timeout) => Err(SimError::ReadbackTimeout { operation: self.operation, timeout }),
            Err(RecvTimeoutError::Disconnected) => {
                log::error!("worker for '{}' exited without reporting", self.operation);
                Err(SimError::WorkerLost(self.operation))
            }
        }
    }
}

/// Start `job` on a new worker thread.
pub(crate) fn dispatch(job: Job) -> Result<InFlight, SimError> {
    let operation = job.operation();
    let (tx, rx) = mpsc::channel();
    thread::Builder::new()
        .name(format!("erosion-{operation}"))
        .spawn(move || execute(job, &tx))
        .map_err(|e| {
            log::error!("cannot spawn worker for '{operation}': {e}");
            SimError::WorkerLost(operation)
        })?;
    Ok(InFlight { rx, operation })
}

fn execute(job: Job, tx: &Sender<WorkerEvent>) {
    let output = match job {
        Job::Generate { mut generator, params } => {
            let generation = generator.generate(&params);
            JobOutput::Generated { generator, generation }
        }
        Job::Erode { mut model, terrain, iterations, params, instrumented, first_iteration, cancel } => {
            let result = model.upload_terrain(&terrain).and_then(|()| {
                if instrumented {
                    run_staged(model.as_mut(), iterations, &params, first_iteration, &cancel, tx)
                } else {
                    model.run(iterations, &params, &cancel)
                }
            });
            let terrain = model.terrain().to_vec();
            let water = model.water().map(<[f32]>::to_vec);
            JobOutput::Eroded { model, result, terrain, water }
        }
    };
    // The receiver is gone only if the orchestrator itself was dropped.
    let _ = tx.send(WorkerEvent::Finished(output));
}

fn run_staged(
    model: &mut dyn ErosionModel,
    iterations: u32,
    params: &ErosionParams,
    first_iteration: u64,
    cancel: &CancelToken,
    tx: &Sender<WorkerEvent>,
) -> Result<RunReport, SimError> {
    let mut completed = 0u32;
    for i in 0..iterations {
        if cancel.is_cancelled() {
            break;
        }
        let mut readback = StageReadback { iteration: first_iteration + i as u64, tx };
        model.run_instrumented(params, &mut readback)?;
        completed += 1;
    }
    Ok(RunReport { iterations_completed: completed, cancelled: completed < iterations })
}
