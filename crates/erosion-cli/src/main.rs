//! Headless driver for the erosion engine.
//!
//! `run` generates a terrain and erodes it, `replay` re-runs the command
//! history of a capture on the slope fixture, `compare` diffs two captures
//! metric by metric, and `tune` searches erosion constants for a target
//! erosion rate.

use std::fs;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use erosion_core::capture::{compare_captures, CaptureComparison, CaptureDocument, Grade, FAIL_PERCENT};
use erosion_core::erosion::builtin_erosion_model;
use erosion_core::generator::builtin_generator;
use erosion_core::tuning::{tune, TunedParam, TuningTarget};
use erosion_core::{ErosionMetrics, SimulationConfig, SimulationOrchestrator, SimulationParameters};
use serde::Serialize;

// ── CLI ───────────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "erosion-sim", about = "Terrain generation and erosion simulator")]
struct Args {
    /// Configuration JSON; built-in defaults when omitted.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate a terrain and erode it.
    Run {
        /// Generation strategy (fbm, ridged, flat, slope, pyramid, bowl).
        #[arg(short, long)]
        generator: Option<String>,

        /// Erosion model (hydraulic, simple).
        #[arg(short, long)]
        model: Option<String>,

        #[arg(long)]
        grid_size: Option<usize>,

        #[arg(long)]
        seed: Option<u32>,

        /// Total erosion iterations.
        #[arg(short, long, default_value_t = 100)]
        iterations: u32,

        /// Iterations per erosion call.
        #[arg(short, long, default_value_t = 10)]
        batch: u32,

        /// Stop early once erosion reaches equilibrium.
        #[arg(long)]
        until_equilibrium: bool,

        /// Record per-stage statistics into this capture file.
        #[arg(long)]
        capture: Option<PathBuf>,

        /// Write the final terrain as JSON.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Re-run a capture's command history and write a fresh capture.
    Replay {
        input: PathBuf,

        #[arg(short, long)]
        output: PathBuf,

        /// Starting terrain.
        #[arg(short, long, default_value = "slope")]
        generator: String,
    },

    /// Compare two captures metric by metric.
    Compare {
        left: PathBuf,
        right: PathBuf,

        /// Print every metric, not only the ones that drift.
        #[arg(short, long)]
        verbose: bool,
    },

    /// Search solubility, capacity factor, gravity and deposition rate for
    /// a target erosion percentage.
    Tune {
        /// Share of the mean starting height to erode, in percent.
        #[arg(short, long, default_value_t = 5.0)]
        target: f64,

        /// Iterations per trial.
        #[arg(short, long, default_value_t = 100)]
        iterations: u32,

        #[arg(long, default_value_t = 64)]
        grid_size: usize,

        #[arg(long, default_value_t = 50)]
        trials: u32,

        /// Random trials before local refinement.
        #[arg(long, default_value_t = 10)]
        initial_trials: u32,

        #[arg(long, default_value_t = 42)]
        seed: u64,

        /// Starting terrain.
        #[arg(short, long, default_value = "slope")]
        generator: String,

        /// Erosion model to tune.
        #[arg(short, long, default_value = "hydraulic")]
        model: String,

        /// Write the best values as JSON, keyed like the config file.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

// ── Output ────────────────────────────────────────────────────────────────────

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TerrainDump<'a> {
    grid_size: usize,
    total_iterations: u64,
    metrics: ErosionMetrics,
    heights: &'a [f32],
    #[serde(skip_serializing_if = "Option::is_none")]
    water: Option<&'a [f32]>,
}

fn load_config(path: Option<&PathBuf>) -> Result<SimulationConfig> {
    match path {
        Some(p) => SimulationConfig::load(p).with_context(|| format!("loading config {}", p.display())),
        None => Ok(SimulationConfig::default()),
    }
}

// ── Commands ──────────────────────────────────────────────────────────────────

#[allow(clippy::too_many_arguments)]
fn run(
    mut config: SimulationConfig,
    generator: Option<String>,
    model: Option<String>,
    grid_size: Option<usize>,
    seed: Option<u32>,
    iterations: u32,
    batch: u32,
    until_equilibrium: bool,
    capture: Option<PathBuf>,
    output: Option<PathBuf>,
) -> Result<()> {
    if let Some(g) = generator {
        config.default_generator = g;
    }
    if let Some(m) = model {
        config.default_erosion_model = m;
    }
    let mut params: SimulationParameters = config.parameters.clone();
    if let Some(n) = grid_size {
        params.generation.grid_size = n;
    }
    if let Some(s) = seed {
        params.generation.seed = s;
    }

    let mut sim = SimulationOrchestrator::new(config).context("building orchestrator")?;
    if capture.is_some() {
        sim.toggle_capture();
    }
    let summary = sim.regenerate(&params).context("generating terrain")?;
    if let Some(fault) = &summary.fault {
        log::warn!("terrain degraded: {fault}");
    }
    println!("generated {0}×{0} terrain with '{1}'", summary.grid_size, summary.generator);

    let batch = batch.max(1);
    let mut remaining = iterations;
    while remaining > 0 {
        let step = remaining.min(batch);
        let outcome = sim.erode(step, &params).context("eroding")?;
        if let Some(fault) = &outcome.fault {
            bail!("erosion skipped: {fault}");
        }
        remaining -= step;
        println!(
            "{:>6}  erosion {:.6}  deposition {:.6}{}",
            outcome.total_iterations,
            outcome.metrics.erosion_amount,
            outcome.metrics.deposition_amount,
            if outcome.equilibrium { "  (equilibrium)" } else { "" }
        );
        if until_equilibrium && outcome.equilibrium {
            break;
        }
    }

    if let Some(path) = capture {
        sim.capture_document().save(&path).with_context(|| format!("writing capture {}", path.display()))?;
        println!("capture written to {}", path.display());
    }
    if let Some(path) = output {
        let dump = TerrainDump {
            grid_size: sim.grid_size(),
            total_iterations: sim.total_iterations(),
            metrics: sim.metrics(),
            heights: sim.terrain(),
            water: sim.water(),
        };
        fs::write(&path, serde_json::to_string(&dump)?).with_context(|| format!("writing {}", path.display()))?;
        println!("terrain written to {}", path.display());
    }
    Ok(())
}

fn replay(mut config: SimulationConfig, input: PathBuf, output: PathBuf, generator: String) -> Result<()> {
    let source = CaptureDocument::load(&input).with_context(|| format!("reading capture {}", input.display()))?;
    let Some(setup) = source.setup_params() else {
        bail!("{} has no generation parameters and no history", input.display());
    };

    config.default_generator = generator;
    let mut sim = SimulationOrchestrator::new(config)?;
    sim.toggle_capture();
    let mut params = source.history.first().map(|h| h.params.clone()).unwrap_or_default();
    params.generation = setup;
    sim.regenerate(&params).context("generating starting terrain")?;

    for entry in &source.history {
        let mut step = entry.params.clone();
        step.generation = params.generation.clone();
        step.erosion.add_rain = entry.rain;
        log::info!("step {}: {} iterations, rain {}", entry.step, entry.iterations, entry.rain);
        let outcome = sim.erode(entry.iterations, &step)?;
        if let Some(fault) = outcome.fault {
            bail!("step {} skipped: {fault}", entry.step);
        }
    }

    let doc = sim.capture_document();
    doc.save(&output).with_context(|| format!("writing capture {}", output.display()))?;
    println!("replayed {} commands, {} frames → {}", source.history.len(), doc.frame_count(), output.display());
    Ok(())
}

fn print_comparison(cmp: &CaptureComparison, verbose: bool) {
    if cmp.left_frames != cmp.right_frames {
        println!(
            "warning: frame counts differ ({} vs {}); comparing the first {}",
            cmp.left_frames,
            cmp.right_frames,
            cmp.frames_compared()
        );
    }
    println!("{:<35} | {:>12} | {:>12} | {:>10} | {:>10}", "METRIC", "LEFT", "RIGHT", "ABSOLUTE", "REL. DIFF");
    let mut frame = usize::MAX;
    for d in &cmp.diffs {
        if !verbose && d.grade == Grade::Ok {
            continue;
        }
        if d.frame != frame {
            frame = d.frame;
            println!("--- frame {frame} ---");
        }
        let fmt = |v: Option<f64>| v.map_or_else(|| "n/a".to_string(), |x| format!("{x:.4}"));
        println!(
            "{:<35} | {:>12} | {:>12} | {:>10} | {:>9}% {:?}",
            d.key,
            fmt(d.left),
            fmt(d.right),
            fmt(d.absolute),
            d.relative_percent.map_or_else(|| "n/a".to_string(), |x| format!("{x:.2}")),
            d.grade
        );
    }
    println!(
        "ok {}  warn {}  fail {}  missing {}",
        cmp.count(Grade::Ok),
        cmp.count(Grade::Warn),
        cmp.count(Grade::Fail),
        cmp.count(Grade::Missing)
    );
}

fn compare(left: PathBuf, right: PathBuf, verbose: bool) -> Result<()> {
    let a = CaptureDocument::load(&left).with_context(|| format!("reading {}", left.display()))?;
    let b = CaptureDocument::load(&right).with_context(|| format!("reading {}", right.display()))?;
    let cmp = compare_captures(&a, &b);
    print_comparison(&cmp, verbose);
    let failed = cmp.count(Grade::Fail);
    if failed > 0 {
        bail!("{failed} metrics differ by more than {FAIL_PERCENT}%");
    }
    Ok(())
}

fn tune_constants(
    config: SimulationConfig,
    target: TuningTarget,
    grid_size: usize,
    generator: String,
    model: String,
    output: Option<PathBuf>,
) -> Result<()> {
    let mut params = config.parameters.clone();
    params.generation.grid_size = grid_size;
    params.erosion.add_rain = true;

    let mut field = builtin_generator(&generator, grid_size)?;
    let generation = field.generate(&params.generation);
    if let Some(fault) = generation.fault {
        bail!("starting terrain '{generator}' degraded: {fault}");
    }
    let mut engine = builtin_erosion_model(&model)?;
    engine.create_resources(grid_size).with_context(|| format!("allocating '{model}' for {grid_size}×{grid_size}"))?;

    println!(
        "target: erode {}% of the mean height of '{generator}' in {} iterations with '{model}'",
        target.erosion_percent, target.iterations
    );
    let result = tune(engine.as_mut(), &generation.heights, &params.erosion, &target).context("tuning")?;
    for (i, trial) in result.trials.iter().enumerate() {
        let values: Vec<String> =
            TunedParam::ALL.iter().zip(&trial.values).map(|(p, v)| format!("{}={v:.4}", p.name())).collect();
        println!("{i:>4}  {}  → {:.2}%  loss {:.4}", values.join(" "), trial.erosion_percent, trial.loss);
    }
    println!("best: {:.2}% (loss {:.4})", result.best.erosion_percent, result.best.loss);

    let best = serde_json::to_string_pretty(&result.best.named_values())?;
    println!("{best}");
    if let Some(path) = output {
        fs::write(&path, best).with_context(|| format!("writing {}", path.display()))?;
        println!("values written to {}", path.display());
    }
    Ok(())
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    let config = load_config(args.config.as_ref())?;

    match args.command {
        Command::Run { generator, model, grid_size, seed, iterations, batch, until_equilibrium, capture, output } => {
            run(config, generator, model, grid_size, seed, iterations, batch, until_equilibrium, capture, output)
        }
        Command::Replay { input, output, generator } => replay(config, input, output, generator),
        Command::Compare { left, right, verbose } => compare(left, right, verbose),
        Command::Tune { target, iterations, grid_size, trials, initial_trials, seed, generator, model, output } => {
            let target = TuningTarget { erosion_percent: target, iterations, trials, initial_trials, seed };
            tune_constants(config, target, grid_size, generator, model, output)
        }
    }
}
