//! Height-field generation and iterative erosion engine.
//!
//! Pipeline:
//!   parameters → [`generator`] (noise + normalization) → canonical terrain
//!   → [`erosion`] (hydraulic or thermal, double-buffered) → [`metrics`].
//!
//! [`orchestrator::SimulationOrchestrator`] owns the canonical field and
//! sequences operations one at a time on a worker thread.

pub mod capture;
pub mod config;
pub mod erosion;
pub mod error;
pub mod generator;
pub mod grid;
pub mod instrument;
pub mod metrics;
pub mod orchestrator;
pub mod params;
pub mod tuning;

mod parallel;
mod worker;

pub use config::SimulationConfig;
pub use error::SimError;
pub use metrics::ErosionMetrics;
pub use orchestrator::{Completion, Dispatch, Request, SimulationOrchestrator};
pub use params::{ErosionParams, GenerationParams, SimulationParameters};
